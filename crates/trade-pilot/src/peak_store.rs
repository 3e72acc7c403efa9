//! Persisted peak-profit store, keyed by broker ticket.
//!
//! A small JSON file survives restarts so peak-protection keeps working
//! across agent sessions. Writes go through a temp file and rename so a
//! crash mid-write never leaves a torn store behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

pub struct PeakStore {
    path: PathBuf,
    peaks: HashMap<u64, f64>,
}

impl PeakStore {
    /// Load from disk. A missing file is an empty store; a corrupt file is
    /// logged and replaced on the next write.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let peaks = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, f64>>(&raw) {
                Ok(map) => map
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<u64>().ok().map(|t| (t, v)))
                    .collect(),
                Err(e) => {
                    warn!("Peak store {} is corrupt ({}), starting empty", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, peaks }
    }

    pub fn get(&self, ticket: u64) -> Option<f64> {
        self.peaks.get(&ticket).copied()
    }

    /// Fold a profit observation into the running peak and persist when it
    /// moves. New tickets start at 0 so a losing open never records a
    /// negative peak.
    pub fn record(&mut self, ticket: u64, profit: f64) -> f64 {
        let current = self.peaks.get(&ticket).copied().unwrap_or(0.0);
        let peak = current.max(profit).max(0.0);
        let changed = self.peaks.insert(ticket, peak) != Some(peak);
        if changed {
            if let Err(e) = self.persist() {
                warn!("Failed to persist peak store: {e:#}");
            }
        }
        peak
    }

    /// Drop a ticket's entry (position closed or gone from the broker).
    pub fn remove(&mut self, ticket: u64) {
        if self.peaks.remove(&ticket).is_some() {
            if let Err(e) = self.persist() {
                warn!("Failed to persist peak store: {e:#}");
            }
        }
    }

    /// Drop every ticket not present in `live`.
    pub fn retain_tickets(&mut self, live: &[u64]) {
        let before = self.peaks.len();
        self.peaks.retain(|t, _| live.contains(t));
        if self.peaks.len() != before {
            if let Err(e) = self.persist() {
                warn!("Failed to persist peak store: {e:#}");
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let as_strings: HashMap<String, f64> =
            self.peaks.iter().map(|(t, p)| (t.to_string(), *p)).collect();
        let json = serde_json::to_string_pretty(&as_strings)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}
