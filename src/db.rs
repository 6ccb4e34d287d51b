use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension as _, Row, TransactionBehavior};

use crate::model::{voter_id, Candidate, Election, ElectionState, NewCandidate, Registration, Voter};
use crate::store::{Repository, VoteOutcome};
use crate::validate::wallet_key;

pub const DB_FILE: &str = "vote.db";

pub fn create_db(connection: &Connection) -> Result<()> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS election(
        id_election INTEGER PRIMARY KEY NOT NULL CHECK (id_election = 1),
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT NOT NULL,
        state TEXT NOT NULL)",
        [],
    )?;
    connection.execute(
        "CREATE TABLE IF NOT EXISTS candidates(
        id_candidate INTEGER PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        party TEXT NOT NULL,
        information TEXT NOT NULL,
        image_reference TEXT NOT NULL,
        vote_count INTEGER NOT NULL,
        approved INTEGER NOT NULL)",
        [],
    )?;
    connection.execute(
        "CREATE TABLE IF NOT EXISTS voters(
        seq INTEGER PRIMARY KEY NOT NULL,
        id_voter TEXT NOT NULL UNIQUE,
        wallet TEXT NOT NULL,
        wallet_key TEXT NOT NULL UNIQUE,
        registered_at TEXT NOT NULL,
        verified INTEGER NOT NULL,
        has_voted INTEGER NOT NULL,
        personal_info TEXT NOT NULL)",
        [],
    )?;
    Ok(())
}

impl ToSql for ElectionState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for ElectionState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: crate::errors::VoteError| FromSqlError::Other(Box::new(e)))
    }
}

const CANDIDATE_COLUMNS: &str =
    "id_candidate, name, party, information, image_reference, vote_count, approved";
const VOTER_COLUMNS: &str =
    "id_voter, wallet, verified, has_voted, registered_at, personal_info";

fn candidate_row(r: &Row) -> rusqlite::Result<Candidate> {
    Ok(Candidate {
        id: r.get(0)?,
        name: r.get(1)?,
        party: r.get(2)?,
        information: r.get(3)?,
        image_reference: r.get(4)?,
        vote_count: r.get(5)?,
        is_approved: r.get(6)?,
    })
}

fn voter_row(r: &Row) -> rusqlite::Result<Voter> {
    let info = r.get::<_, String>(5)?;
    let personal_info = serde_json::from_str(&info)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Voter {
        id: r.get(0)?,
        wallet_address: r.get(1)?,
        verified: r.get(2)?,
        has_voted: r.get(3)?,
        registration_date: r.get(4)?,
        personal_info,
    })
}

fn get_candidate(connection: &Connection, id: u32) -> Result<Option<Candidate>> {
    let c = connection
        .query_row(
            &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id_candidate = ?1"),
            [id],
            candidate_row,
        )
        .optional()?;
    Ok(c)
}

fn get_voter(connection: &Connection, id: &str) -> Result<Option<Voter>> {
    let v = connection
        .query_row(
            &format!("SELECT {VOTER_COLUMNS} FROM voters WHERE id_voter = ?1"),
            [id],
            voter_row,
        )
        .optional()?;
    Ok(v)
}

/// SQLite-backed store over an r2d2 connection pool.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::new(manager)?;
        Self::with_pool(pool)
    }

    /// A private in-memory database. The pool keeps its single connection alive
    /// for the life of the store.
    pub fn memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        let connection = pool.get()?;
        create_db(&connection)?;
        drop(connection);
        Ok(SqliteStore { pool })
    }
}

impl Repository for SqliteStore {
    fn election(&self) -> Result<Option<Election>> {
        let connection = self.pool.get()?;
        let election = connection
            .query_row(
                "SELECT title, description, start_time, end_time, state
                FROM election WHERE id_election = 1",
                [],
                |r| {
                    Ok(Election {
                        title: r.get(0)?,
                        description: r.get(1)?,
                        start_time: r.get(2)?,
                        end_time: r.get(3)?,
                        state: r.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(election)
    }

    fn put_election(&self, election: &Election) -> Result<()> {
        let connection = self.pool.get()?;
        connection.execute(
            "INSERT OR REPLACE INTO election(id_election, title, description, start_time, end_time, state)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            params![
                election.title,
                election.description,
                election.start_time,
                election.end_time,
                election.state
            ],
        )?;
        Ok(())
    }

    fn candidates(&self) -> Result<Vec<Candidate>> {
        let connection = self.pool.get()?;
        let mut s = connection.prepare(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates ORDER BY id_candidate"
        ))?;
        let rows = s.query_map([], candidate_row)?;
        let candidates = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    fn candidate(&self, id: u32) -> Result<Option<Candidate>> {
        let connection = self.pool.get()?;
        get_candidate(&connection, id)
    }

    fn insert_candidate(&self, candidate: &NewCandidate) -> Result<Candidate> {
        let mut connection = self.pool.get()?;
        let db_tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = db_tx.query_row(
            "SELECT COALESCE(MAX(id_candidate), 0) + 1 FROM candidates",
            [],
            |r| r.get::<_, u32>(0),
        )?;
        db_tx.execute(
            "INSERT INTO candidates(id_candidate, name, party, information, image_reference, vote_count, approved)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
            params![
                id,
                candidate.name,
                candidate.party,
                candidate.information,
                candidate.image_reference
            ],
        )?;
        db_tx.commit()?;
        Ok(Candidate {
            id,
            name: candidate.name.clone(),
            party: candidate.party.clone(),
            information: candidate.information.clone(),
            image_reference: candidate.image_reference.clone(),
            vote_count: 0,
            is_approved: false,
        })
    }

    fn update_candidate(&self, candidate: &Candidate) -> Result<Option<Candidate>> {
        let connection = self.pool.get()?;
        let changed = connection.execute(
            "UPDATE candidates SET name = ?2, party = ?3, information = ?4,
            image_reference = ?5, approved = ?6 WHERE id_candidate = ?1",
            params![
                candidate.id,
                candidate.name,
                candidate.party,
                candidate.information,
                candidate.image_reference,
                candidate.is_approved
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        get_candidate(&connection, candidate.id)
    }

    fn delete_candidate(&self, id: u32) -> Result<Option<Candidate>> {
        let mut connection = self.pool.get()?;
        let db_tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidate = get_candidate(&db_tx, id)?;
        if candidate.is_some() {
            db_tx.execute("DELETE FROM candidates WHERE id_candidate = ?1", [id])?;
        }
        db_tx.commit()?;
        Ok(candidate)
    }

    fn voters(&self) -> Result<Vec<Voter>> {
        let connection = self.pool.get()?;
        let mut s = connection.prepare(&format!("SELECT {VOTER_COLUMNS} FROM voters ORDER BY seq"))?;
        let rows = s.query_map([], voter_row)?;
        let voters = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(voters)
    }

    fn voter(&self, id: &str) -> Result<Option<Voter>> {
        let connection = self.pool.get()?;
        get_voter(&connection, id)
    }

    fn voter_by_wallet(&self, wallet: &str) -> Result<Option<Voter>> {
        let connection = self.pool.get()?;
        let v = connection
            .query_row(
                &format!("SELECT {VOTER_COLUMNS} FROM voters WHERE wallet_key = ?1"),
                [wallet_key(wallet)],
                voter_row,
            )
            .optional()?;
        Ok(v)
    }

    fn insert_voter(
        &self,
        registration: &Registration,
        registered_at: DateTime<Utc>,
    ) -> Result<Option<Voter>> {
        let key = wallet_key(&registration.wallet_address);
        let mut connection = self.pool.get()?;
        let db_tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let dup = db_tx
            .query_row("SELECT 1 FROM voters WHERE wallet_key = ?1", [&key], |_r| Ok(()))
            .optional()?;
        if dup.is_some() {
            return Ok(None);
        }
        let seq = db_tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM voters", [], |r| {
            r.get::<_, u64>(0)
        })?;
        let voter = Voter {
            id: voter_id(seq),
            wallet_address: registration.wallet_address.trim().to_owned(),
            verified: false,
            has_voted: false,
            registration_date: registered_at,
            personal_info: registration.personal_info.clone(),
        };
        db_tx.execute(
            "INSERT INTO voters(seq, id_voter, wallet, wallet_key, registered_at, verified, has_voted, personal_info)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6)",
            params![
                seq,
                voter.id,
                voter.wallet_address,
                key,
                voter.registration_date,
                serde_json::to_string(&voter.personal_info)?
            ],
        )?;
        db_tx.commit()?;
        Ok(Some(voter))
    }

    fn set_verified(&self, id: &str, verified: bool) -> Result<Option<Voter>> {
        let connection = self.pool.get()?;
        connection.execute(
            "UPDATE voters SET verified = ?2 WHERE id_voter = ?1",
            params![id, verified],
        )?;
        get_voter(&connection, id)
    }

    fn record_vote(&self, candidate_id: u32, voter_id: &str) -> Result<VoteOutcome> {
        let mut connection = self.pool.get()?;
        let db_tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let state = db_tx
            .query_row("SELECT state FROM election WHERE id_election = 1", [], |r| {
                r.get::<_, ElectionState>(0)
            })
            .optional()?;
        if state != Some(ElectionState::Ongoing) {
            return Ok(VoteOutcome::ElectionClosed);
        }
        // check-and-set on the voter row; a dropped transaction rolls back
        let marked = db_tx.execute(
            "UPDATE voters SET has_voted = 1
            WHERE id_voter = ?1 AND verified = 1 AND has_voted = 0",
            [voter_id],
        )?;
        if marked == 0 {
            return Ok(VoteOutcome::VoterIneligible);
        }
        let counted = db_tx.execute(
            "UPDATE candidates SET vote_count = vote_count + 1
            WHERE id_candidate = ?1 AND approved = 1",
            [candidate_id],
        )?;
        if counted == 0 {
            return Ok(VoteOutcome::CandidateUnavailable);
        }
        db_tx.commit()?;
        tracing::debug!(candidate_id, voter_id, "vote committed");
        Ok(VoteOutcome::Recorded)
    }
}
