use std::str::FromStr;

use anyhow::Result;
use rocket::http::{Method, Status};
use rocket::outcome::{try_outcome, Outcome};
use rocket::request::{self, FromRequest, Request};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, put, routes, Build, FromForm, Rocket, State};
use rocket_cors::{AllowedOrigins, CorsOptions};
use serde::Deserialize;

use crate::config::Config;
use crate::errors::VoteError;
use crate::execute;
use crate::ledger::Ledger;
use crate::model::{
    Ballot, Candidate, CandidateFilter, CandidatePatch, Election, ElectionDraft, ElectionState,
    NewCandidate, NewVoter, Registration, RegistrationStatus, Voter, VoterFilter,
};
use crate::tally::{ResultQuery, SortKey, SortOrder, Tally};
use crate::validate::same_wallet;

/// Header carrying the caller's wallet address.
pub const WALLET_HEADER: &str = "X-Wallet-Address";

pub struct Caller(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = VoteError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.headers().get_one(WALLET_HEADER).map(str::trim) {
            Some(wallet) if !wallet.is_empty() => Outcome::Success(Caller(wallet.to_owned())),
            _ => Outcome::Error((Status::Unauthorized, VoteError::NotAuthorized)),
        }
    }
}

/// A caller whose wallet is on the admin allow-list.
pub struct Admin(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = VoteError;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let caller = try_outcome!(req.guard::<Caller>().await);
        match req.rocket().state::<Config>() {
            Some(config) if config.is_admin(&caller.0) => Outcome::Success(Admin(caller.0)),
            _ => {
                tracing::debug!(wallet = %caller.0, "admin route refused");
                Outcome::Error((Status::Forbidden, VoteError::NotAuthorized))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub new_state: ElectionState,
}

#[derive(Deserialize)]
pub struct Verification {
    pub verified: bool,
}

/// Raw query strings; parsed into domain types so bad values surface as 400s.
#[derive(FromForm, Default)]
pub struct ResultParams {
    sort: Option<String>,
    order: Option<String>,
    party: Option<String>,
    #[field(name = "approvedOnly")]
    approved_only: Option<bool>,
}

impl TryFrom<ResultParams> for ResultQuery {
    type Error = VoteError;

    fn try_from(p: ResultParams) -> Result<Self, Self::Error> {
        Ok(ResultQuery {
            sort: p.sort.as_deref().map(str::parse::<SortKey>).transpose()?.unwrap_or_default(),
            order: p.order.as_deref().map(str::parse::<SortOrder>).transpose()?.unwrap_or_default(),
            party: p.party.filter(|p| !p.is_empty() && p != "all"),
            approved_only: p.approved_only.unwrap_or(false),
        })
    }
}

/// `status` tab and free-text `search` for roster listings. `all` or an empty
/// value means no filter.
#[derive(FromForm, Default)]
pub struct ListParams {
    status: Option<String>,
    search: Option<String>,
}

impl ListParams {
    fn status<T: FromStr<Err = VoteError>>(&self) -> Result<Option<T>, VoteError> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            .map(str::parse)
            .transpose()
    }

    fn search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

impl TryFrom<ListParams> for VoterFilter {
    type Error = VoteError;

    fn try_from(p: ListParams) -> Result<Self, Self::Error> {
        Ok(VoterFilter {
            status: p.status()?,
            search: p.search(),
        })
    }
}

impl TryFrom<ListParams> for CandidateFilter {
    type Error = VoteError;

    fn try_from(p: ListParams) -> Result<Self, Self::Error> {
        Ok(CandidateFilter {
            status: p.status()?,
            search: p.search(),
        })
    }
}

#[get("/election")]
fn get_election(ledger: &State<Ledger>) -> Result<Json<Election>, Custom<String>> {
    execute!({ Ok(Json(ledger.election()?)) })
}

#[put("/election", data = "<draft>")]
fn put_election(
    _admin: Admin,
    draft: Json<ElectionDraft>,
    ledger: &State<Ledger>,
) -> Result<Json<Election>, Custom<String>> {
    execute!({ Ok(Json(ledger.configure(draft.into_inner())?)) })
}

#[patch("/election/state", data = "<change>")]
fn change_state(
    _admin: Admin,
    change: Json<StateChange>,
    ledger: &State<Ledger>,
) -> Result<Json<Election>, Custom<String>> {
    execute!({ Ok(Json(ledger.transition(change.new_state)?)) })
}

#[get("/candidates?<params..>")]
fn list_candidates(
    params: ListParams,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<Candidate>>, Custom<String>> {
    execute!({ Ok(Json(ledger.find_candidates(&CandidateFilter::try_from(params)?)?)) })
}

#[post("/candidates", data = "<candidate>")]
fn add_candidate(
    _admin: Admin,
    candidate: Json<NewCandidate>,
    ledger: &State<Ledger>,
) -> Result<Json<Candidate>, Custom<String>> {
    execute!({ Ok(Json(ledger.add_candidate(candidate.into_inner())?)) })
}

#[patch("/candidates/<id>", data = "<patch>")]
fn update_candidate(
    _admin: Admin,
    id: u32,
    patch: Json<CandidatePatch>,
    ledger: &State<Ledger>,
) -> Result<Json<Candidate>, Custom<String>> {
    execute!({ Ok(Json(ledger.update_candidate(id, patch.into_inner())?)) })
}

#[delete("/candidates/<id>")]
fn delete_candidate(
    _admin: Admin,
    id: u32,
    ledger: &State<Ledger>,
) -> Result<Json<Candidate>, Custom<String>> {
    execute!({ Ok(Json(ledger.remove_candidate(id)?)) })
}

#[get("/voters?<params..>")]
fn list_voters(
    _admin: Admin,
    params: ListParams,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<Voter>>, Custom<String>> {
    execute!({ Ok(Json(ledger.find_voters(&VoterFilter::try_from(params)?)?)) })
}

#[post("/voters/admin", data = "<voter>")]
fn add_voter(
    _admin: Admin,
    voter: Json<NewVoter>,
    ledger: &State<Ledger>,
) -> Result<Json<Voter>, Custom<String>> {
    execute!({ Ok(Json(ledger.add_voter(&voter.wallet_address)?)) })
}

#[post("/voters", data = "<registration>")]
fn register_voter(
    caller: Caller,
    registration: Json<Registration>,
    ledger: &State<Ledger>,
) -> Result<Json<Voter>, Custom<String>> {
    execute!({
        if !same_wallet(&caller.0, &registration.wallet_address) {
            return Err(VoteError::NotAuthorized);
        }
        Ok(Json(ledger.register(registration.into_inner())?))
    })
}

#[patch("/voters/<id>/verify", data = "<verification>")]
fn verify_voter(
    _admin: Admin,
    id: &str,
    verification: Json<Verification>,
    ledger: &State<Ledger>,
) -> Result<Json<Voter>, Custom<String>> {
    execute!({ Ok(Json(ledger.set_verified(id, verification.verified)?)) })
}

#[get("/voters/status/<wallet>")]
fn voter_status(
    wallet: &str,
    ledger: &State<Ledger>,
    config: &State<Config>,
) -> Result<Json<RegistrationStatus>, Custom<String>> {
    execute!({ Ok(Json(ledger.status(wallet, config.is_admin(wallet))?)) })
}

#[post("/votes", data = "<ballot>")]
fn submit_vote(
    caller: Caller,
    ballot: Json<Ballot>,
    ledger: &State<Ledger>,
) -> Result<Json<Tally>, Custom<String>> {
    execute!({
        let voter = ledger.voter(&ballot.voter_id)?;
        if !same_wallet(&voter.wallet_address, &caller.0) {
            return Err(VoteError::NotAuthorized);
        }
        Ok(Json(ledger.submit_vote(ballot.candidate_id, &ballot.voter_id)?))
    })
}

#[get("/results?<params..>")]
fn results(params: ResultParams, ledger: &State<Ledger>) -> Result<Json<Tally>, Custom<String>> {
    execute!({ Ok(Json(ledger.results(&ResultQuery::try_from(params)?)?)) })
}

pub fn build_rocket(ledger: Ledger, config: Config) -> Result<Rocket<Build>> {
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Put, Method::Patch, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true);

    let rocket = rocket::build()
        .manage(ledger)
        .manage(config)
        .mount(
            "/",
            routes![
                get_election,
                put_election,
                change_state,
                list_candidates,
                add_candidate,
                update_candidate,
                delete_candidate,
                list_voters,
                add_voter,
                register_voter,
                verify_voter,
                voter_status,
                submit_vote,
                results
            ],
        )
        .attach(cors.to_cors()?);
    Ok(rocket)
}
