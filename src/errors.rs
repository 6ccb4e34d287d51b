use rocket::http::Status;
use thiserror::Error;

use crate::model::ElectionState;

/// Every way an election operation can be refused.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("wallet address is already registered")]
    DuplicateWallet,
    #[error("end time must be after start time")]
    InvalidSchedule,
    #[error("voter must be at least {0} years old")]
    Underage(u32),
    #[error("unknown election state: {0}")]
    UnknownState(String),
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),
    #[error("email is not valid")]
    InvalidEmail,
    #[error("invalid query value: {0}")]
    InvalidQuery(String),

    #[error("no election found")]
    NoElection,
    #[error("candidate {0} not found")]
    CandidateNotFound(u32),
    #[error("voter {0} not found")]
    VoterNotFound(String),

    #[error("cannot move election from {from} to {to}")]
    InvalidTransition {
        from: ElectionState,
        to: ElectionState,
    },
    #[error("election can no longer be edited once {0}")]
    ElectionLocked(ElectionState),
    #[error("election cannot start before its scheduled start time")]
    TooEarly,
    #[error("election is outside its scheduled voting window")]
    OutsideSchedule,
    #[error("election is not ongoing")]
    NotOngoing,

    #[error("voter {0} is not verified")]
    NotVerified(String),
    #[error("voter {0} has already voted")]
    AlreadyVoted(String),
    #[error("candidate {0} is not approved")]
    NotApproved(u32),

    #[error("not authorized")]
    NotAuthorized,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl VoteError {
    pub fn status(&self) -> Status {
        use VoteError::*;
        match self {
            MissingField(_)
            | InvalidSchedule
            | Underage(_)
            | UnknownState(_)
            | InvalidWallet(_)
            | InvalidEmail
            | InvalidQuery(_) => Status::BadRequest,
            NoElection | CandidateNotFound(_) | VoterNotFound(_) => Status::NotFound,
            DuplicateWallet
            | InvalidTransition { .. }
            | ElectionLocked(_)
            | TooEarly
            | OutsideSchedule
            | NotOngoing
            | NotVerified(_)
            | AlreadyVoted(_)
            | NotApproved(_) => Status::Conflict,
            NotAuthorized => Status::Forbidden,
            Storage(_) => Status::InternalServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(VoteError::MissingField("name").status(), Status::BadRequest);
        assert_eq!(VoteError::CandidateNotFound(3).status(), Status::NotFound);
        assert_eq!(VoteError::AlreadyVoted("VOT000001".into()).status(), Status::Conflict);
        assert_eq!(VoteError::NotAuthorized.status(), Status::Forbidden);
        assert_eq!(VoteError::InvalidWallet("0x12".into()).status(), Status::BadRequest);
        assert_eq!(VoteError::InvalidQuery("sort=age".into()).status(), Status::BadRequest);
        assert_eq!(
            VoteError::Storage(anyhow::anyhow!("disk")).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn messages() {
        let e = VoteError::InvalidTransition {
            from: ElectionState::Ended,
            to: ElectionState::Ongoing,
        };
        assert_eq!(e.to_string(), "cannot move election from Ended to Ongoing");
        assert_eq!(VoteError::MissingField("party").to_string(), "party is required");
    }
}
