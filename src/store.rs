use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use crate::model::{
    voter_id, Candidate, Election, ElectionState, NewCandidate, Registration, Voter,
};
use crate::validate::wallet_key;

/// Result of the atomic vote write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    /// The voter is missing, unverified or already voted by the time of the write.
    VoterIneligible,
    /// The candidate vanished or lost approval by the time of the write.
    CandidateUnavailable,
    /// The election left Ongoing by the time of the write.
    ElectionClosed,
}

/// Storage capability behind the election engine.
///
/// Tallies are only ever changed by `record_vote`, which must mark the voter and
/// increment the candidate in one step. `update_candidate` never touches
/// `vote_count`.
pub trait Repository: Send + Sync {
    fn election(&self) -> Result<Option<Election>>;
    fn put_election(&self, election: &Election) -> Result<()>;

    fn candidates(&self) -> Result<Vec<Candidate>>;
    fn candidate(&self, id: u32) -> Result<Option<Candidate>>;
    /// Stores a candidate under max(id) + 1 with no votes, unapproved.
    fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate>;
    fn update_candidate(&self, candidate: &Candidate) -> Result<Option<Candidate>>;
    fn delete_candidate(&self, id: u32) -> Result<Option<Candidate>>;

    fn voters(&self) -> Result<Vec<Voter>>;
    fn voter(&self, id: &str) -> Result<Option<Voter>>;
    fn voter_by_wallet(&self, wallet: &str) -> Result<Option<Voter>>;
    /// Stores an unverified voter. `None` when the wallet is already registered.
    fn insert_voter(
        &self,
        registration: &Registration,
        registered_at: DateTime<Utc>,
    ) -> Result<Option<Voter>>;
    fn set_verified(&self, id: &str, verified: bool) -> Result<Option<Voter>>;

    /// Checks the election is Ongoing, the voter verified and not yet voted and
    /// the candidate approved, then marks and counts, all as one unit.
    fn record_vote(&self, candidate_id: u32, voter_id: &str) -> Result<VoteOutcome>;
}

#[derive(Default)]
struct Tables {
    election: Option<Election>,
    candidates: BTreeMap<u32, Candidate>,
    /// Keyed by registration sequence so listing follows registration order.
    voters: BTreeMap<u64, Voter>,
    voter_seq: u64,
}

impl Tables {
    fn voter_mut(&mut self, id: &str) -> Option<&mut Voter> {
        self.voters.values_mut().find(|v| v.id == id)
    }
}

/// Process-local store; one mutex guards every table.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| anyhow!("store lock poisoned"))
    }
}

impl Repository for MemoryStore {
    fn election(&self) -> Result<Option<Election>> {
        Ok(self.lock()?.election.clone())
    }

    fn put_election(&self, election: &Election) -> Result<()> {
        self.lock()?.election = Some(election.clone());
        Ok(())
    }

    fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.lock()?.candidates.values().cloned().collect())
    }

    fn candidate(&self, id: u32) -> Result<Option<Candidate>> {
        Ok(self.lock()?.candidates.get(&id).cloned())
    }

    fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let mut tables = self.lock()?;
        let id = tables.candidates.keys().next_back().copied().unwrap_or(0) + 1;
        let c = Candidate {
            id,
            name: candidate.name.clone(),
            party: candidate.party.clone(),
            information: candidate.information.clone(),
            image_reference: candidate.image_reference.clone(),
            vote_count: 0,
            is_approved: false,
        };
        tables.candidates.insert(id, c.clone());
        Ok(c)
    }

    fn update_candidate(&self, candidate: &Candidate) -> Result<Option<Candidate>> {
        let mut tables = self.lock()?;
        let Some(stored) = tables.candidates.get_mut(&candidate.id) else {
            return Ok(None);
        };
        stored.name = candidate.name.clone();
        stored.party = candidate.party.clone();
        stored.information = candidate.information.clone();
        stored.image_reference = candidate.image_reference.clone();
        stored.is_approved = candidate.is_approved;
        Ok(Some(stored.clone()))
    }

    fn delete_candidate(&self, id: u32) -> Result<Option<Candidate>> {
        Ok(self.lock()?.candidates.remove(&id))
    }

    fn voters(&self) -> Result<Vec<Voter>> {
        Ok(self.lock()?.voters.values().cloned().collect())
    }

    fn voter(&self, id: &str) -> Result<Option<Voter>> {
        Ok(self.lock()?.voters.values().find(|v| v.id == id).cloned())
    }

    fn voter_by_wallet(&self, wallet: &str) -> Result<Option<Voter>> {
        let key = wallet_key(wallet);
        let tables = self.lock()?;
        Ok(tables
            .voters
            .values()
            .find(|v| wallet_key(&v.wallet_address) == key)
            .cloned())
    }

    fn insert_voter(
        &self,
        registration: &Registration,
        registered_at: DateTime<Utc>,
    ) -> Result<Option<Voter>> {
        let key = wallet_key(&registration.wallet_address);
        let mut tables = self.lock()?;
        if tables
            .voters
            .values()
            .any(|v| wallet_key(&v.wallet_address) == key)
        {
            return Ok(None);
        }
        tables.voter_seq += 1;
        let seq = tables.voter_seq;
        let voter = Voter {
            id: voter_id(seq),
            wallet_address: registration.wallet_address.trim().to_owned(),
            verified: false,
            has_voted: false,
            registration_date: registered_at,
            personal_info: registration.personal_info.clone(),
        };
        tables.voters.insert(seq, voter.clone());
        Ok(Some(voter))
    }

    fn set_verified(&self, id: &str, verified: bool) -> Result<Option<Voter>> {
        let mut tables = self.lock()?;
        Ok(tables.voter_mut(id).map(|v| {
            v.verified = verified;
            v.clone()
        }))
    }

    fn record_vote(&self, candidate_id: u32, voter_id: &str) -> Result<VoteOutcome> {
        let mut tables = self.lock()?;
        if tables.election.as_ref().map(|e| e.state) != Some(ElectionState::Ongoing) {
            return Ok(VoteOutcome::ElectionClosed);
        }
        let candidate_ok = tables
            .candidates
            .get(&candidate_id)
            .map_or(false, |c| c.is_approved);
        let Some(voter) = tables.voter_mut(voter_id) else {
            return Ok(VoteOutcome::VoterIneligible);
        };
        if !voter.verified || voter.has_voted {
            return Ok(VoteOutcome::VoterIneligible);
        }
        if !candidate_ok {
            return Ok(VoteOutcome::CandidateUnavailable);
        }
        voter.has_voted = true;
        if let Some(c) = tables.candidates.get_mut(&candidate_id) {
            c.vote_count += 1;
        }
        Ok(VoteOutcome::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonalInfo;

    fn registration(n: u64) -> Registration {
        Registration {
            wallet_address: format!("0x{n:040x}"),
            personal_info: PersonalInfo::pending(),
        }
    }

    #[test]
    fn voters_list_in_registration_order_past_six_digits() {
        let store = MemoryStore::new();
        store.lock().unwrap().voter_seq = 999_998;
        for n in 1..=3 {
            store.insert_voter(&registration(n), Utc::now()).unwrap().unwrap();
        }
        let ids: Vec<String> = store.voters().unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["VOT999999", "VOT1000000", "VOT1000001"]);
        assert_eq!(store.voter("VOT1000000").unwrap().unwrap().wallet_address, format!("0x{:040x}", 2));
    }

    #[test]
    fn vote_write_requires_ongoing_election() {
        let store = MemoryStore::new();
        let voter = store.insert_voter(&registration(1), Utc::now()).unwrap().unwrap();
        store.set_verified(&voter.id, true).unwrap();
        let mut c = store.insert_candidate(&NewCandidate {
            name: "A".into(),
            party: "X".into(),
            ..Default::default()
        }).unwrap();
        c.is_approved = true;
        store.update_candidate(&c).unwrap();

        assert_eq!(store.record_vote(c.id, &voter.id).unwrap(), VoteOutcome::ElectionClosed);
        let now = Utc::now();
        let mut election = Election {
            title: "General".into(),
            description: String::new(),
            start_time: now,
            end_time: now + chrono::Duration::days(1),
            state: ElectionState::Paused,
        };
        store.put_election(&election).unwrap();
        assert_eq!(store.record_vote(c.id, &voter.id).unwrap(), VoteOutcome::ElectionClosed);
        assert!(!store.voter(&voter.id).unwrap().unwrap().has_voted);

        election.state = ElectionState::Ongoing;
        store.put_election(&election).unwrap();
        assert_eq!(store.record_vote(c.id, &voter.id).unwrap(), VoteOutcome::Recorded);
        assert_eq!(store.candidate(c.id).unwrap().unwrap().vote_count, 1);
    }
}
