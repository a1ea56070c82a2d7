//! Config: loads `.fuel/config.yaml` (§4.2).
//!
//! Unlike the layered CLI-flag/env/file/default resolution chain a global, per-operator
//! config would need, this file is workspace-local and has exactly one source plus a
//! handful of env var overrides used for test convenience (§6). A missing file yields
//! [`ConfigFile::default()`] so a freshly `init`'d workspace has sane defaults without the
//! operator writing anything.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cap on simultaneous running children for an agent with no explicit
/// `max_concurrent` (§4.2, §9 open question: "the default is 2").
const DEFAULT_MAX_CONCURRENT: u32 = 2;
const DEFAULT_MAX_AGENT_ATTEMPTS: u32 = 3;
const DEFAULT_COOLDOWN_SECONDS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as YAML: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub max_concurrent: Option<u32>,
    pub session_resume_flag: Option<String>,
}

impl AgentConfig {
    pub fn max_concurrent(&self) -> u32 {
        self.max_concurrent.unwrap_or(DEFAULT_MAX_CONCURRENT)
    }
}

/// Either a bare agent name or `{agent, model}` (§4.2 `complexity.<level>`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComplexityMapping {
    Bare(String),
    WithModel { agent: String, model: Option<String> },
}

impl ComplexityMapping {
    pub fn agent(&self) -> &str {
        match self {
            Self::Bare(agent) => agent,
            Self::WithModel { agent, .. } => agent,
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Bare(_) => None,
            Self::WithModel { model, .. } => model.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReviewConfig {
    pub agent: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub max_agent_attempts: Option<u32>,
    pub cooldown_seconds: Option<u64>,
}

fn default_port() -> u16 {
    7117
}

impl Default for ConsumeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_agent_attempts: None,
            cooldown_seconds: None,
        }
    }
}

impl ConsumeConfig {
    pub fn max_agent_attempts(&self) -> u32 {
        self.max_agent_attempts.unwrap_or(DEFAULT_MAX_AGENT_ATTEMPTS)
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds.unwrap_or(DEFAULT_COOLDOWN_SECONDS)
    }

    /// `FUEL_CONSUME_PORT` overrides the configured port, for test convenience (§6).
    pub fn resolved_port(&self) -> u16 {
        std::env::var("FUEL_CONSUME_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub complexity: HashMap<String, ComplexityMapping>,
    pub primary: Option<String>,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub consume: ConsumeConfig,
}

impl ConfigFile {
    /// Look up the `(agent, model)` pair for a task's complexity, falling back to
    /// `primary` when the complexity has no explicit mapping (§4.5 step 1).
    pub fn agent_for_complexity(&self, complexity: &str) -> Option<(String, Option<String>)> {
        if let Some(mapping) = self.complexity.get(complexity) {
            return Some((mapping.agent().to_owned(), mapping.model().map(str::to_owned)));
        }
        self.primary.as_ref().map(|agent| (agent.clone(), None))
    }

    pub fn agent_config(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }
}

/// `load()`: returns the full config (§4.2). A missing file is not an error; it yields
/// defaults.
pub fn load(config_path: &Path) -> Result<ConfigFile, ConfigError> {
    if !config_path.exists() {
        return Ok(ConfigFile::default());
    }

    let raw = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
        path: config_path.display().to_string(),
        source,
    })?;

    if raw.trim().is_empty() {
        return Ok(ConfigFile::default());
    }

    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: config_path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert!(cfg.agents.is_empty());
        assert_eq!(cfg.consume.max_agent_attempts(), 3);
        assert_eq!(cfg.consume.cooldown_seconds(), 300);
    }

    #[test]
    fn parses_full_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
agents:
  claude:
    command: claude
    args: ["-p"]
    max_concurrent: 3
complexity:
  trivial: claude
  complex:
    agent: claude
    model: opus
primary: claude
review:
  agent: claude
  skip: false
consume:
  port: 7117
  max_agent_attempts: 5
  cooldown_seconds: 60
"#,
        )
        .unwrap();

        let cfg = load(&path).unwrap();
        assert_eq!(cfg.agents["claude"].max_concurrent(), 3);
        assert_eq!(cfg.agent_for_complexity("trivial").unwrap().0, "claude");
        let (agent, model) = cfg.agent_for_complexity("complex").unwrap();
        assert_eq!(agent, "claude");
        assert_eq!(model.as_deref(), Some("opus"));
        assert_eq!(cfg.consume.max_agent_attempts(), 5);
        assert_eq!(cfg.consume.cooldown_seconds(), 60);
    }

    #[test]
    fn unknown_complexity_falls_back_to_primary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "primary: fallback-agent\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.agent_for_complexity("moderate").unwrap().0, "fallback-agent");
    }

    #[test]
    fn default_max_concurrent_is_two() {
        let agent = AgentConfig {
            command: "echo".into(),
            args: vec![],
            max_concurrent: None,
            session_resume_flag: None,
        };
        assert_eq!(agent.max_concurrent(), DEFAULT_MAX_CONCURRENT);
    }
}
