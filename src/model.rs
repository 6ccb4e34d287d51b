use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::VoteError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionState {
    NotCreated,
    Created,
    Ongoing,
    Paused,
    Ended,
}

impl ElectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionState::NotCreated => "NotCreated",
            ElectionState::Created => "Created",
            ElectionState::Ongoing => "Ongoing",
            ElectionState::Paused => "Paused",
            ElectionState::Ended => "Ended",
        }
    }

    /// Edges of NotCreated -> Created -> Ongoing <-> Paused -> Ended.
    /// NotCreated -> Created only happens through configuration.
    pub fn can_transition_to(self, next: ElectionState) -> bool {
        use ElectionState::*;
        matches!(
            (self, next),
            (Created, Ongoing)
                | (Ongoing, Paused)
                | (Paused, Ongoing)
                | (Created, Ended)
                | (Ongoing, Ended)
                | (Paused, Ended)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ElectionState::Ended
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElectionState {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.to_ascii_lowercase().as_str() {
            "notcreated" => ElectionState::NotCreated,
            "created" => ElectionState::Created,
            "ongoing" => ElectionState::Ongoing,
            "paused" => ElectionState::Paused,
            "ended" => ElectionState::Ended,
            _ => return Err(VoteError::UnknownState(s.to_owned())),
        };
        Ok(state)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub title: String,
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
    pub state: ElectionState,
}

impl Election {
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }
}

/// Administrator-supplied election metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(rename = "candidateId")]
    pub id: u32,
    pub name: String,
    pub party: String,
    pub information: String,
    pub image_reference: String,
    pub vote_count: u64,
    pub is_approved: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCandidate {
    pub name: String,
    pub party: String,
    #[serde(default)]
    pub information: String,
    #[serde(default)]
    pub image_reference: String,
}

/// Partial candidate edit; absent fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePatch {
    pub name: Option<String>,
    pub party: Option<String>,
    pub information: Option<String>,
    pub image_reference: Option<String>,
    pub is_approved: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub full_name: String,
    pub national_id: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    pub date_of_birth: Option<NaiveDate>,
}

impl PersonalInfo {
    /// Placeholder for voters added by an administrator before they fill in details.
    pub fn pending() -> Self {
        PersonalInfo {
            full_name: "Pending Verification".into(),
            national_id: "Pending".into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: String,
    pub wallet_address: String,
    pub verified: bool,
    pub has_voted: bool,
    pub registration_date: DateTime<Utc>,
    pub personal_info: PersonalInfo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub wallet_address: String,
    pub personal_info: PersonalInfo,
}

/// Administrator pre-registration of a wallet.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVoter {
    pub wallet_address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Admin,
    Verified,
    Pending,
    Unregistered,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub candidate_id: u32,
    pub voter_id: String,
}

pub fn voter_id(seq: u64) -> String {
    format!("VOT{:06}", seq)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoterStatus {
    Verified,
    Unverified,
    Voted,
    NotVoted,
}

impl FromStr for VoterStatus {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.to_ascii_lowercase().as_str() {
            "verified" => VoterStatus::Verified,
            "unverified" => VoterStatus::Unverified,
            "voted" => VoterStatus::Voted,
            "not-voted" | "notvoted" => VoterStatus::NotVoted,
            _ => return Err(VoteError::InvalidQuery(format!("status={s}"))),
        };
        Ok(status)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateStatus {
    Approved,
    Pending,
}

impl FromStr for CandidateStatus {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approved" => Ok(CandidateStatus::Approved),
            "pending" => Ok(CandidateStatus::Pending),
            _ => Err(VoteError::InvalidQuery(format!("status={s}"))),
        }
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Status tab plus case-insensitive search over id and wallet.
#[derive(Clone, Debug, Default)]
pub struct VoterFilter {
    pub status: Option<VoterStatus>,
    pub search: Option<String>,
}

impl VoterFilter {
    pub fn matches(&self, v: &Voter) -> bool {
        let status = match self.status {
            None => true,
            Some(VoterStatus::Verified) => v.verified,
            Some(VoterStatus::Unverified) => !v.verified,
            Some(VoterStatus::Voted) => v.has_voted,
            Some(VoterStatus::NotVoted) => !v.has_voted,
        };
        status
            && self.search.as_deref().map_or(true, |q| {
                let q = q.to_lowercase();
                contains(&v.id, &q) || contains(&v.wallet_address, &q)
            })
    }
}

/// Approval tab plus case-insensitive search over name, party and information.
#[derive(Clone, Debug, Default)]
pub struct CandidateFilter {
    pub status: Option<CandidateStatus>,
    pub search: Option<String>,
}

impl CandidateFilter {
    pub fn matches(&self, c: &Candidate) -> bool {
        let status = match self.status {
            None => true,
            Some(CandidateStatus::Approved) => c.is_approved,
            Some(CandidateStatus::Pending) => !c.is_approved,
        };
        status
            && self.search.as_deref().map_or(true, |q| {
                let q = q.to_lowercase();
                contains(&c.name, &q) || contains(&c.party, &q) || contains(&c.information, &q)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ElectionState::*;

    #[test]
    fn lifecycle_edges() {
        assert!(Created.can_transition_to(Ongoing));
        assert!(Ongoing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Ongoing));
        assert!(Paused.can_transition_to(Ended));
        assert!(Created.can_transition_to(Ended));

        assert!(!NotCreated.can_transition_to(Ongoing));
        assert!(!Created.can_transition_to(Paused));
        assert!(!Ongoing.can_transition_to(Created));
        for next in [NotCreated, Created, Ongoing, Paused, Ended] {
            assert!(!Ended.can_transition_to(next));
        }
        assert!(Ended.is_terminal());
    }

    #[test]
    fn parse_state() {
        assert_eq!("ongoing".parse::<ElectionState>().unwrap(), Ongoing);
        assert_eq!("NotCreated".parse::<ElectionState>().unwrap(), NotCreated);
        assert!("closed".parse::<ElectionState>().is_err());
    }

    #[test]
    fn wire_names() {
        let c = Candidate {
            id: 2,
            name: "Morgan Rivera".into(),
            party: "Liberty Alliance".into(),
            information: String::new(),
            image_reference: String::new(),
            vote_count: 4,
            is_approved: true,
        };
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["candidateId"], 2);
        assert_eq!(v["voteCount"], 4);
        assert_eq!(v["isApproved"], true);

        let e: Election = serde_json::from_str(
            r#"{"title":"General","description":"","startTime":1000,"endTime":2000,"state":"Paused"}"#,
        )
        .unwrap();
        assert_eq!(e.state, Paused);
        assert_eq!(e.end_time.timestamp_millis(), 2000);
    }

    fn sample_voter(id: &str, verified: bool, has_voted: bool) -> Voter {
        Voter {
            id: id.into(),
            wallet_address: "0x64E01a30a963206345bE12DEcEcDA08d78c9a2a5".into(),
            verified,
            has_voted,
            registration_date: chrono::Utc::now(),
            personal_info: PersonalInfo::pending(),
        }
    }

    #[test]
    fn voter_filters() {
        let v = sample_voter("VOT000007", true, false);
        assert!(VoterFilter::default().matches(&v));
        let by = |status: &str, search: Option<&str>| VoterFilter {
            status: Some(status.parse().unwrap()),
            search: search.map(str::to_owned),
        };
        assert!(by("verified", None).matches(&v));
        assert!(!by("unverified", None).matches(&v));
        assert!(by("not-voted", Some("vot000007")).matches(&v));
        assert!(by("verified", Some("A08D78")).matches(&v));
        assert!(!by("verified", Some("ffff")).matches(&v));
        assert!(!by("voted", None).matches(&v));
        assert!("maybe".parse::<VoterStatus>().is_err());
    }

    #[test]
    fn candidate_filters() {
        let c = Candidate {
            id: 3,
            name: "Jordan Casey".into(),
            party: "Independent".into(),
            information: "Focused on environmental issues.".into(),
            image_reference: String::new(),
            vote_count: 0,
            is_approved: false,
        };
        let pending = CandidateFilter {
            status: Some(CandidateStatus::Pending),
            search: Some("ENVIRONMENT".into()),
        };
        assert!(pending.matches(&c));
        let approved = CandidateFilter {
            status: Some("approved".parse().unwrap()),
            search: None,
        };
        assert!(!approved.matches(&c));
        let search = CandidateFilter {
            status: None,
            search: Some("indep".into()),
        };
        assert!(search.matches(&c));
    }

    #[test]
    fn voter_ids() {
        assert_eq!(voter_id(1), "VOT000001");
        assert_eq!(voter_id(123456), "VOT123456");
    }
}
