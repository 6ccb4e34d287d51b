use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::VoteError;
use crate::model::{
    Candidate, CandidateFilter, CandidatePatch, Election, ElectionDraft, ElectionState,
    NewCandidate, PersonalInfo, Registration, RegistrationStatus, Voter, VoterFilter,
};
use crate::store::{Repository, VoteOutcome};
use crate::tally::{ResultQuery, Tally};
use crate::validate::{
    validate_candidate, validate_election, validate_registration, validate_wallet,
};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Election record, candidate roster, voter roster and tally engine over a
/// shared [`Repository`]. Clones share the same store.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Repository>,
    enforce_schedule: bool,
    clock: Clock,
}

impl Ledger {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Ledger {
            store,
            enforce_schedule: false,
            clock: Arc::new(Utc::now),
        }
    }

    /// Hold lifecycle transitions and votes to the election's start/end window.
    pub fn enforce_schedule(mut self, enforce: bool) -> Self {
        self.enforce_schedule = enforce;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // Election lifecycle

    pub fn election(&self) -> Result<Election, VoteError> {
        self.store.election()?.ok_or(VoteError::NoElection)
    }

    pub fn configure(&self, draft: ElectionDraft) -> Result<Election, VoteError> {
        validate_election(&draft)?;
        if let Some(current) = self.store.election()? {
            if !matches!(current.state, ElectionState::NotCreated | ElectionState::Created) {
                return Err(VoteError::ElectionLocked(current.state));
            }
        }
        let election = Election {
            title: draft.title.trim().to_owned(),
            description: draft.description,
            start_time: draft.start_time,
            end_time: draft.end_time,
            state: ElectionState::Created,
        };
        self.store.put_election(&election)?;
        tracing::info!(title = %election.title, "election configured");
        Ok(election)
    }

    pub fn transition(&self, next: ElectionState) -> Result<Election, VoteError> {
        let mut election = self.election()?;
        let from = election.state;
        if !from.can_transition_to(next) {
            return Err(VoteError::InvalidTransition { from, to: next });
        }
        let now = self.now();
        match next {
            ElectionState::Ongoing if from == ElectionState::Created && now < election.start_time => {
                return Err(VoteError::TooEarly);
            }
            ElectionState::Ongoing if self.enforce_schedule && !election.in_window(now) => {
                return Err(VoteError::OutsideSchedule);
            }
            ElectionState::Ended if self.enforce_schedule && now < election.end_time => {
                return Err(VoteError::OutsideSchedule);
            }
            _ => {}
        }
        election.state = next;
        self.store.put_election(&election)?;
        tracing::info!(%from, to = %next, "election state changed");
        Ok(election)
    }

    // Candidate roster

    pub fn candidates(&self) -> Result<Vec<Candidate>, VoteError> {
        Ok(self.store.candidates()?)
    }

    pub fn find_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, VoteError> {
        let mut candidates = self.store.candidates()?;
        candidates.retain(|c| filter.matches(c));
        Ok(candidates)
    }

    pub fn candidate(&self, id: u32) -> Result<Candidate, VoteError> {
        self.store.candidate(id)?.ok_or(VoteError::CandidateNotFound(id))
    }

    pub fn add_candidate(&self, candidate: NewCandidate) -> Result<Candidate, VoteError> {
        validate_candidate(&candidate)?;
        let candidate = NewCandidate {
            name: candidate.name.trim().to_owned(),
            party: candidate.party.trim().to_owned(),
            ..candidate
        };
        let c = self.store.insert_candidate(&candidate)?;
        tracing::info!(id = c.id, name = %c.name, "candidate added");
        Ok(c)
    }

    pub fn update_candidate(&self, id: u32, patch: CandidatePatch) -> Result<Candidate, VoteError> {
        let mut c = self.candidate(id)?;
        if let Some(name) = patch.name {
            c.name = name.trim().to_owned();
        }
        if let Some(party) = patch.party {
            c.party = party.trim().to_owned();
        }
        if let Some(information) = patch.information {
            c.information = information;
        }
        if let Some(image_reference) = patch.image_reference {
            c.image_reference = image_reference;
        }
        if let Some(approved) = patch.is_approved {
            c.is_approved = approved;
        }
        if c.name.is_empty() {
            return Err(VoteError::MissingField("name"));
        }
        if c.party.is_empty() {
            return Err(VoteError::MissingField("party"));
        }
        self.store
            .update_candidate(&c)?
            .ok_or(VoteError::CandidateNotFound(id))
    }

    /// Sets the approval flag. An unknown id is a no-op and yields `None`.
    pub fn set_approval(&self, id: u32, approved: bool) -> Result<Option<Candidate>, VoteError> {
        let Some(mut c) = self.store.candidate(id)? else {
            tracing::debug!(id, "approval change for unknown candidate ignored");
            return Ok(None);
        };
        c.is_approved = approved;
        let c = self.store.update_candidate(&c)?;
        tracing::info!(id, approved, "candidate approval changed");
        Ok(c)
    }

    pub fn approve(&self, id: u32) -> Result<Option<Candidate>, VoteError> {
        self.set_approval(id, true)
    }

    pub fn revoke(&self, id: u32) -> Result<Option<Candidate>, VoteError> {
        self.set_approval(id, false)
    }

    /// Deletes a candidate. Votes already counted for it are discarded.
    pub fn remove_candidate(&self, id: u32) -> Result<Candidate, VoteError> {
        let c = self
            .store
            .delete_candidate(id)?
            .ok_or(VoteError::CandidateNotFound(id))?;
        if c.vote_count > 0 {
            tracing::warn!(id, votes = c.vote_count, "deleted candidate with votes; tally discarded");
        } else {
            tracing::info!(id, "candidate removed");
        }
        Ok(c)
    }

    // Voter roster

    pub fn voters(&self) -> Result<Vec<Voter>, VoteError> {
        Ok(self.store.voters()?)
    }

    pub fn find_voters(&self, filter: &VoterFilter) -> Result<Vec<Voter>, VoteError> {
        let mut voters = self.store.voters()?;
        voters.retain(|v| filter.matches(v));
        Ok(voters)
    }

    pub fn voter(&self, id: &str) -> Result<Voter, VoteError> {
        self.store
            .voter(id)?
            .ok_or_else(|| VoteError::VoterNotFound(id.to_owned()))
    }

    pub fn register(&self, registration: Registration) -> Result<Voter, VoteError> {
        let now = self.now();
        validate_registration(
            &registration.wallet_address,
            &registration.personal_info,
            now.date_naive(),
        )?;
        let voter = self
            .store
            .insert_voter(&registration, now)?
            .ok_or(VoteError::DuplicateWallet)?;
        tracing::info!(id = %voter.id, wallet = %voter.wallet_address, "voter registered");
        Ok(voter)
    }

    /// Adds an unverified voter by wallet alone, with placeholder personal details.
    pub fn add_voter(&self, wallet: &str) -> Result<Voter, VoteError> {
        validate_wallet(wallet)?;
        let registration = Registration {
            wallet_address: wallet.trim().to_owned(),
            personal_info: PersonalInfo::pending(),
        };
        let voter = self
            .store
            .insert_voter(&registration, self.now())?
            .ok_or(VoteError::DuplicateWallet)?;
        tracing::info!(id = %voter.id, wallet = %voter.wallet_address, "voter added by admin");
        Ok(voter)
    }

    pub fn set_verified(&self, id: &str, verified: bool) -> Result<Voter, VoteError> {
        let voter = self
            .store
            .set_verified(id, verified)?
            .ok_or_else(|| VoteError::VoterNotFound(id.to_owned()))?;
        if !verified && voter.has_voted {
            tracing::warn!(id, "verification revoked after voting; counted vote stays");
        } else {
            tracing::info!(id, verified, "voter verification changed");
        }
        Ok(voter)
    }

    pub fn verify(&self, id: &str) -> Result<Voter, VoteError> {
        self.set_verified(id, true)
    }

    pub fn revoke_verification(&self, id: &str) -> Result<Voter, VoteError> {
        self.set_verified(id, false)
    }

    pub fn status(&self, wallet: &str, is_admin: bool) -> Result<RegistrationStatus, VoteError> {
        if is_admin {
            return Ok(RegistrationStatus::Admin);
        }
        let status = match self.store.voter_by_wallet(wallet)? {
            Some(v) if v.verified => RegistrationStatus::Verified,
            Some(_) => RegistrationStatus::Pending,
            None => RegistrationStatus::Unregistered,
        };
        Ok(status)
    }

    // Tally engine

    /// Applies one vote. The voter flag and the candidate count change together
    /// or not at all.
    pub fn submit_vote(&self, candidate_id: u32, voter_id: &str) -> Result<Tally, VoteError> {
        let election = self.election()?;
        if election.state != ElectionState::Ongoing {
            return Err(VoteError::NotOngoing);
        }
        if self.enforce_schedule && !election.in_window(self.now()) {
            return Err(VoteError::OutsideSchedule);
        }
        let voter = self.voter(voter_id)?;
        if !voter.verified {
            return Err(VoteError::NotVerified(voter.id));
        }
        if voter.has_voted {
            return Err(VoteError::AlreadyVoted(voter.id));
        }
        let candidate = self.candidate(candidate_id)?;
        if !candidate.is_approved {
            return Err(VoteError::NotApproved(candidate_id));
        }

        match self.store.record_vote(candidate_id, voter_id)? {
            VoteOutcome::Recorded => {}
            VoteOutcome::VoterIneligible => {
                return Err(VoteError::AlreadyVoted(voter_id.to_owned()));
            }
            VoteOutcome::CandidateUnavailable => {
                return Err(VoteError::NotApproved(candidate_id));
            }
            VoteOutcome::ElectionClosed => return Err(VoteError::NotOngoing),
        }
        tracing::info!(candidate_id, voter_id, "vote recorded");
        self.results(&ResultQuery::default())
    }

    pub fn results(&self, query: &ResultQuery) -> Result<Tally, VoteError> {
        let candidates = self.store.candidates()?;
        let voters = self.store.voters()?;
        let tally = Tally::compute(&candidates, &voters, query);
        if !tally.is_consistent() {
            tracing::debug!(orphaned = tally.orphaned_votes, "tally does not match voters");
        }
        Ok(tally)
    }
}
