use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::VoteError;
use crate::model::{Candidate, Voter};

/// `part` as a whole percentage of `whole`, rounded half up. Zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as u128 * 200 + whole as u128) / (whole as u128 * 2)) as u32
}

pub fn shares(counts: &[u64]) -> Vec<u32> {
    let total = counts.iter().sum();
    counts.iter().map(|&c| percentage(c, total)).collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Votes,
    Name,
    Party,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortKey {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "votes" => Ok(SortKey::Votes),
            "name" => Ok(SortKey::Name),
            "party" => Ok(SortKey::Party),
            _ => Err(VoteError::InvalidQuery(format!("sort={s}"))),
        }
    }
}

impl FromStr for SortOrder {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(VoteError::InvalidQuery(format!("order={s}"))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResultQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    pub party: Option<String>,
    pub approved_only: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub percentage: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyResult {
    pub party: String,
    pub votes: u64,
    pub percentage: u32,
    pub candidates: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leader {
    pub candidate_id: u32,
    pub name: String,
    pub party: String,
    pub percentage: u32,
    /// Percentage points ahead of the runner-up.
    pub margin: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub total_votes: u64,
    pub registered_voters: u64,
    pub voters_voted: u64,
    pub turnout: u32,
    pub candidates: Vec<CandidateResult>,
    pub parties: Vec<PartyResult>,
    pub leader: Option<Leader>,
    /// Voters marked as voted minus counted votes. Non-zero once a candidate
    /// holding votes has been deleted.
    pub orphaned_votes: i64,
}

impl Tally {
    pub fn compute(candidates: &[Candidate], voters: &[Voter], query: &ResultQuery) -> Tally {
        let total_votes: u64 = candidates.iter().map(|c| c.vote_count).sum();
        let registered_voters = voters.len() as u64;
        let voters_voted = voters.iter().filter(|v| v.has_voted).count() as u64;

        let mut ranked: Vec<&Candidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| b.vote_count.cmp(&a.vote_count).then(a.id.cmp(&b.id)));
        let leader = ranked.first().filter(|c| c.vote_count > 0).map(|c| {
            let percentage = percentage(c.vote_count, total_votes);
            Leader {
                candidate_id: c.id,
                name: c.name.clone(),
                party: c.party.clone(),
                percentage,
                margin: ranked
                    .get(1)
                    .map(|r| percentage - self::percentage(r.vote_count, total_votes)),
            }
        });

        let mut listed: Vec<CandidateResult> = candidates
            .iter()
            .filter(|c| !query.approved_only || c.is_approved)
            .filter(|c| query.party.as_deref().map_or(true, |p| c.party == p))
            .map(|c| CandidateResult {
                candidate: c.clone(),
                percentage: percentage(c.vote_count, total_votes),
            })
            .collect();
        listed.sort_by(|a, b| {
            let ord = compare(&a.candidate, &b.candidate, query.sort);
            let ord = match query.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then(a.candidate.id.cmp(&b.candidate.id))
        });

        Tally {
            total_votes,
            registered_voters,
            voters_voted,
            turnout: percentage(voters_voted, registered_voters),
            candidates: listed,
            parties: party_results(candidates, total_votes),
            leader,
            orphaned_votes: voters_voted as i64 - total_votes as i64,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.orphaned_votes == 0
    }
}

fn compare(a: &Candidate, b: &Candidate, key: SortKey) -> Ordering {
    match key {
        SortKey::Votes => a.vote_count.cmp(&b.vote_count),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Party => a.party.to_lowercase().cmp(&b.party.to_lowercase()),
    }
}

fn party_results(candidates: &[Candidate], total_votes: u64) -> Vec<PartyResult> {
    let mut parties = BTreeMap::<&str, (u64, usize)>::new();
    for c in candidates {
        let entry = parties.entry(c.party.as_str()).or_default();
        entry.0 += c.vote_count;
        entry.1 += 1;
    }
    let mut results: Vec<PartyResult> = parties
        .into_iter()
        .map(|(party, (votes, count))| PartyResult {
            party: party.to_owned(),
            votes,
            percentage: percentage(votes, total_votes),
            candidates: count,
        })
        .collect();
    // BTreeMap order keeps ties alphabetical
    results.sort_by(|a, b| b.votes.cmp(&a.votes));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(id: u32, name: &str, party: &str, votes: u64, approved: bool) -> Candidate {
        Candidate {
            id,
            name: name.into(),
            party: party.into(),
            information: String::new(),
            image_reference: String::new(),
            vote_count: votes,
            is_approved: approved,
        }
    }

    fn voter(n: u64, voted: bool) -> Voter {
        Voter {
            id: crate::model::voter_id(n),
            wallet_address: format!("0x{n:040x}"),
            verified: true,
            has_voted: voted,
            registration_date: Utc::now(),
            personal_info: Default::default(),
        }
    }

    #[test]
    fn shares_round_and_never_divide_by_zero() {
        assert_eq!(shares(&[3, 1]), vec![75, 25]);
        assert_eq!(shares(&[0, 0]), vec![0, 0]);
        assert_eq!(shares(&[1, 1, 1]), vec![33, 33, 33]);
        assert_eq!(shares(&[1, 7]), vec![13, 88]);
        assert_eq!(shares(&[]), Vec::<u32>::new());
    }

    #[test]
    fn leader_and_margin() {
        let candidates = [
            candidate(1, "Alex Thompson", "Progress Party", 156, true),
            candidate(2, "Morgan Rivera", "Liberty Alliance", 142, true),
            candidate(3, "Jordan Casey", "Independent", 75, true),
        ];
        let t = Tally::compute(&candidates, &[], &ResultQuery::default());
        assert_eq!(t.total_votes, 373);
        let leader = t.leader.unwrap();
        assert_eq!(leader.candidate_id, 1);
        assert_eq!(leader.percentage, 42);
        assert_eq!(leader.margin, Some(4));
        let listed: Vec<u32> = t.candidates.iter().map(|c| c.percentage).collect();
        assert_eq!(listed, vec![42, 38, 20]);
    }

    #[test]
    fn no_leader_without_votes() {
        let candidates = [candidate(1, "A", "X", 0, true), candidate(2, "B", "Y", 0, true)];
        let t = Tally::compute(&candidates, &[], &ResultQuery::default());
        assert!(t.leader.is_none());
        assert!(t.candidates.iter().all(|c| c.percentage == 0));
    }

    #[test]
    fn sorting_and_filters() {
        let candidates = [
            candidate(1, "Charlie", "Unity", 5, true),
            candidate(2, "alice", "Reform", 9, false),
            candidate(3, "Bob", "Unity", 5, true),
        ];
        let query = ResultQuery {
            sort: SortKey::Name,
            order: SortOrder::Asc,
            ..Default::default()
        };
        let t = Tally::compute(&candidates, &[], &query);
        let names: Vec<&str> = t.candidates.iter().map(|c| c.candidate.name.as_str()).collect();
        assert_eq!(names, vec!["alice", "Bob", "Charlie"]);

        let t = Tally::compute(&candidates, &[], &ResultQuery::default());
        let ids: Vec<u32> = t.candidates.iter().map(|c| c.candidate.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        let query = ResultQuery {
            party: Some("Unity".into()),
            approved_only: true,
            ..Default::default()
        };
        let t = Tally::compute(&candidates, &[], &query);
        assert_eq!(t.candidates.len(), 2);
        // shares stay relative to every vote cast
        assert_eq!(t.candidates[0].percentage, 26);
        assert_eq!(t.total_votes, 19);
    }

    #[test]
    fn sort_parameters() {
        assert_eq!("Name".parse::<SortKey>().unwrap(), SortKey::Name);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!(matches!("age".parse::<SortKey>(), Err(VoteError::InvalidQuery(_))));
        assert!(matches!("up".parse::<SortOrder>(), Err(VoteError::InvalidQuery(_))));
    }

    #[test]
    fn parties() {
        let candidates = [
            candidate(1, "A", "Unity", 3, true),
            candidate(2, "B", "Reform", 4, true),
            candidate(3, "C", "Unity", 3, true),
        ];
        let t = Tally::compute(&candidates, &[], &ResultQuery::default());
        assert_eq!(
            t.parties,
            vec![
                PartyResult { party: "Unity".into(), votes: 6, percentage: 60, candidates: 2 },
                PartyResult { party: "Reform".into(), votes: 4, percentage: 40, candidates: 1 },
            ]
        );
    }

    #[test]
    fn turnout_and_orphans() {
        let candidates = [candidate(1, "A", "X", 1, true)];
        let voters = [voter(1, true), voter(2, true), voter(3, false), voter(4, false)];
        let t = Tally::compute(&candidates, &voters, &ResultQuery::default());
        assert_eq!(t.registered_voters, 4);
        assert_eq!(t.voters_voted, 2);
        assert_eq!(t.turnout, 50);
        assert_eq!(t.orphaned_votes, 1);
        assert!(!t.is_consistent());

        let t = Tally::compute(&[], &[], &ResultQuery::default());
        assert_eq!(t.turnout, 0);
        assert!(t.is_consistent());
    }
}
