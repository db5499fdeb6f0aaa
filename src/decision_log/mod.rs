//! Append-only decision log.
//!
//! One JSON file per event under `decisions/<agent_id>/`, named by a
//! microsecond-resolution timestamp so lexicographic order is chronological
//! order.  Readers locate the most recent entry by filename max.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde_json::Value;

/// Writer/reader over the `decisions/` tree.
#[derive(Clone)]
pub struct DecisionLog {
    root: PathBuf,
}

impl DecisionLog {
    /// `root` is the directory that will contain per-agent subdirectories.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one entry for `agent_id`.  Returns the path written.
    ///
    /// Filenames are `YYYYMMDD_HHMMSS_ffffff.json`; in the (unlikely) event of
    /// a same-microsecond collision a numeric suffix disambiguates.
    pub fn append(&self, agent_id: &str, entry: &Value) -> std::io::Result<PathBuf> {
        let dir = self.root.join(agent_id);
        fs::create_dir_all(&dir)?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let mut path = dir.join(format!("{stamp}.json"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}_{suffix}.json"));
            suffix += 1;
        }

        let body = serde_json::to_string_pretty(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&path, body)?;
        Ok(path)
    }

    /// Path of the most recent entry for `agent_id`, if any.
    pub fn latest(&self, agent_id: &str) -> Option<PathBuf> {
        let dir = self.root.join(agent_id);
        let entries = fs::read_dir(&dir).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .max()
    }

    /// Parse the most recent entry for `agent_id`.
    pub fn read_latest(&self, agent_id: &str) -> Option<Value> {
        let path = self.latest(agent_id)?;
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Number of entries recorded for `agent_id`.
    pub fn count(&self, agent_id: &str) -> usize {
        fs::read_dir(self.root.join(agent_id))
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }
}
