use std::{fs, path::Path};

use anyhow::Result;
use serde::Deserialize;

use crate::ledger::Ledger;
use crate::model::{ElectionDraft, NewCandidate, Registration};

/// Initial data for an empty store, read from a `*.vote` JSON file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    pub election: Option<ElectionDraft>,
    #[serde(default)]
    pub candidates: Vec<SeedCandidate>,
    #[serde(default)]
    pub voters: Vec<SeedVoter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCandidate {
    #[serde(flatten)]
    pub candidate: NewCandidate,
    #[serde(default)]
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedVoter {
    #[serde(flatten)]
    pub registration: Registration,
    #[serde(default)]
    pub verified: bool,
}

pub fn load_seeds(dir: &Path) -> Result<Vec<Seed>> {
    let mut seeds = vec![];
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    for path in paths {
        if path.extension().map_or(false, |ext| ext == "vote") {
            let file = fs::File::open(&path)?;
            let seed = serde_json::from_reader::<_, Seed>(file)?;
            tracing::info!("Seed {} loaded", path.display());
            seeds.push(seed);
        }
    }
    Ok(seeds)
}

/// Applies a seed through the ledger so every record passes the usual checks.
/// Only runs against a store without an election or candidates.
pub fn apply_seed(ledger: &Ledger, seed: Seed) -> Result<bool> {
    if ledger.election().is_ok() || !ledger.candidates()?.is_empty() {
        tracing::info!("store already populated, seed skipped");
        return Ok(false);
    }
    if let Some(draft) = seed.election {
        ledger.configure(draft)?;
    }
    for c in seed.candidates {
        let added = ledger.add_candidate(c.candidate)?;
        if c.approved {
            ledger.approve(added.id)?;
        }
    }
    for v in seed.voters {
        let voter = ledger.register(v.registration)?;
        if v.verified {
            ledger.verify(&voter.id)?;
        }
    }
    Ok(true)
}
