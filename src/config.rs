use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::db::{SqliteStore, DB_FILE};
use crate::ledger::Ledger;
use crate::seed::{apply_seed, load_seeds};
use crate::store::{MemoryStore, Repository};
use crate::validate::wallet_key;

#[derive(Args, Clone, Debug, Default)]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "BALLOT_DB", default_value = DB_FILE)]
    pub db: PathBuf,
    /// Keep all state in memory instead of the database file
    #[arg(long)]
    pub memory: bool,
    /// Administrator wallet addresses
    #[arg(long = "admin", env = "BALLOT_ADMINS", value_delimiter = ',')]
    pub admins: Vec<String>,
    /// Only allow voting and lifecycle changes inside the election's scheduled window
    #[arg(long, env = "BALLOT_ENFORCE_SCHEDULE")]
    pub enforce_schedule: bool,
    /// Directory scanned for `*.vote` seed files
    #[arg(long, env = "BALLOT_SEED_DIR")]
    pub seed_dir: Option<PathBuf>,
}

impl Config {
    pub fn is_admin(&self, wallet: &str) -> bool {
        let key = wallet_key(wallet);
        !key.is_empty() && self.admins.iter().any(|a| wallet_key(a) == key)
    }

    pub fn open_ledger(&self) -> Result<Ledger> {
        let store: Arc<dyn Repository> = if self.memory {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(SqliteStore::open(&self.db)?)
        };
        let ledger = Ledger::new(store).enforce_schedule(self.enforce_schedule);
        if let Some(dir) = &self.seed_dir {
            for seed in load_seeds(dir)? {
                apply_seed(&ledger, seed)?;
            }
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_match_case_insensitively() {
        let config = Config {
            admins: vec!["0xEC00000000000000000000000000000000000001".into()],
            ..Default::default()
        };
        assert!(config.is_admin("0xec00000000000000000000000000000000000001"));
        assert!(!config.is_admin("0xec00000000000000000000000000000000000002"));
        assert!(!config.is_admin(""));
    }

    #[test]
    fn memory_ledger() {
        let config = Config {
            memory: true,
            ..Default::default()
        };
        let ledger = config.open_ledger().unwrap();
        assert!(ledger.candidates().unwrap().is_empty());
    }
}
