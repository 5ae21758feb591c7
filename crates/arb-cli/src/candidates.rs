//! Candidate source: newline-delimited JSON triangles.
//!
//! One candidate per line:
//! `{"trade": "0x…", "base": "0x…", "buy": {"dex": "…", "pair": "0x…"}, "sell": {…}}`.
//! Malformed lines and candidates over unknown or disabled venues are
//! skipped with a warning; the file is re-read every cycle so edits take
//! effect without a restart.

use std::collections::HashSet;
use std::path::PathBuf;

use eyre::{Context, Result};
use tracing::{debug, warn};

use arb_rpc::types::Candidate;

/// Reads candidate triangles from a `.jsonl` file.
pub struct JsonlCandidates {
    path: PathBuf,
    enabled: HashSet<String>,
}

impl JsonlCandidates {
    /// Source over `path`, filtered to the venue names in `enabled`.
    pub fn new(path: impl Into<PathBuf>, enabled: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: path.into(),
            enabled: enabled.into_iter().collect(),
        }
    }

    /// Loads and filters the current candidate set.
    ///
    /// # Errors
    /// Returns error when the file cannot be read at all; individual bad
    /// lines are skipped.
    pub fn load(&self) -> Result<Vec<Candidate>> {
        let raw = std::fs::read_to_string(&self.path)
            .wrap_err_with(|| format!("failed to read candidates {}", self.path.display()))?;

        let mut candidates = Vec::new();
        let mut skipped = 0usize;

        for (number, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Candidate>(line) {
                Ok(candidate) => {
                    if self.accept(&candidate) {
                        candidates.push(candidate);
                    } else {
                        skipped += 1;
                    }
                }
                Err(err) => {
                    skipped += 1;
                    warn!(line = number + 1, error = %err, "skipping malformed candidate line");
                }
            }
        }

        debug!(
            loaded = candidates.len(),
            skipped,
            path = %self.path.display(),
            "candidate file read"
        );
        Ok(candidates)
    }

    fn accept(&self, candidate: &Candidate) -> bool {
        if candidate.buy.dex == candidate.sell.dex {
            return false;
        }
        if candidate.base == candidate.trade {
            return false;
        }
        self.enabled.contains(&candidate.buy.dex) && self.enabled.contains(&candidate.sell.dex)
    }
}
