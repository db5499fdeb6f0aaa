//! The agents file (`agents.yaml`): load, save, patch, remove.
//!
//! The file is the single source of truth for which specialist agents exist.
//! Save/patch/remove rewrite it in place atomically (tmp + rename) so a crash
//! mid-write never leaves a truncated file.  Duplicate ids are rejected.
//!
//! ```yaml
//! agents:
//!   - id: heating
//!     name: Heating Agent
//!     instruction: Keep the bedroom between 19 and 21 degrees overnight.
//!     entities: [climate.bedroom]
//!     decision_interval: 120
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{agent::AgentSpec, error::ConfigError};

// ─── AgentsFile ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<AgentSpec>,
}

// ─── AgentConfigStore ────────────────────────────────────────────────────────

/// Owns the agents file on disk.
pub struct AgentConfigStore {
    path: PathBuf,
}

impl AgentConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all agent specs.  A missing file yields an empty set.
    pub fn load(&self) -> Result<Vec<AgentSpec>, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        let file: AgentsFile =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(file.agents)
    }

    /// Add a new agent.  Rejects an id that already exists.
    pub fn save(&self, spec: AgentSpec) -> Result<(), ConfigError> {
        let mut agents = self.load()?;
        if agents.iter().any(|a| a.id == spec.id) {
            return Err(ConfigError::DuplicateAgent(spec.id));
        }
        agents.push(spec);
        self.write(&agents)
    }

    /// Replace an existing agent's spec.  The id must already exist.
    pub fn update(&self, spec: AgentSpec) -> Result<(), ConfigError> {
        let mut agents = self.load()?;
        let Some(slot) = agents.iter_mut().find(|a| a.id == spec.id) else {
            return Err(ConfigError::UnknownAgent(spec.id));
        };
        *slot = spec;
        self.write(&agents)
    }

    /// Remove an agent by id.
    pub fn remove(&self, id: &str) -> Result<(), ConfigError> {
        let mut agents = self.load()?;
        let before = agents.len();
        agents.retain(|a| a.id != id);
        if agents.len() == before {
            return Err(ConfigError::UnknownAgent(id.to_string()));
        }
        self.write(&agents)
    }

    fn write(&self, agents: &[AgentSpec]) -> Result<(), ConfigError> {
        let io_err = |e: std::io::Error| ConfigError::Io {
            path: self.path.display().to_string(),
            source: e,
        };

        let file = AgentsFile {
            agents: agents.to_vec(),
        };
        let content = serde_yaml::to_string(&file).map_err(|e| ConfigError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, &content).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spec(id: &str) -> AgentSpec {
        AgentSpec {
            id: id.to_string(),
            name: format!("{id} agent"),
            instruction: "do the thing".to_string(),
            entities: vec![format!("climate.{id}")],
            model: None,
            decision_interval: 120,
            knowledge: String::new(),
        }
    }

    fn store(dir: &TempDir) -> AgentConfigStore {
        AgentConfigStore::new(dir.path().join("agents.yaml"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(spec("heating")).unwrap();
        s.save(spec("lighting")).unwrap();

        let agents = s.load().unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, "heating");
        assert_eq!(agents[1].entities, vec!["climate.lighting"]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(spec("heating")).unwrap();
        let err = s.save(spec("heating")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAgent(id) if id == "heating"));
        // The file is untouched.
        assert_eq!(s.load().unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(spec("heating")).unwrap();

        let mut updated = spec("heating");
        updated.instruction = "hold 19 degrees".to_string();
        s.update(updated).unwrap();

        let agents = s.load().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].instruction, "hold 19 degrees");
    }

    #[test]
    fn update_unknown_id_errors() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).update(spec("ghost")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent(_)));
    }

    #[test]
    fn remove_deletes_only_the_target() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        s.save(spec("heating")).unwrap();
        s.save(spec("cooling")).unwrap();

        s.remove("heating").unwrap();
        let agents = s.load().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "cooling");

        assert!(matches!(
            s.remove("heating").unwrap_err(),
            ConfigError::UnknownAgent(_)
        ));
    }

    #[test]
    fn yaml_defaults_apply() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agents.yaml");
        fs::write(
            &path,
            r#"
agents:
  - id: lighting
    name: Lighting Agent
    instruction: Turn lights off after midnight.
"#,
        )
        .unwrap();

        let agents = AgentConfigStore::new(path).load().unwrap();
        assert_eq!(agents.len(), 1);
        assert!(agents[0].entities.is_empty());
        assert_eq!(agents[0].decision_interval, 120);
        assert!(agents[0].model.is_none());
    }
}
