use std::env;
use std::path::{Path, PathBuf};

/// Database configuration: the path to the workspace-local sqlite file.
///
/// Reads from the `FUEL_DATABASE_PATH` environment variable when set (used by tests and the
/// narrow CLI surface), falling back to the path supplied at construction (normally
/// `<workspace>/.fuel/agent.db`, derived from `FuelContext` in `fuel-core`).
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub db_path: PathBuf,
}

impl DbConfig {
    /// Build a config pointing at an explicit path.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Build a config from the environment, overriding `default_path` if
    /// `FUEL_DATABASE_PATH` is set.
    pub fn from_env_or(default_path: impl Into<PathBuf>) -> Self {
        match env::var("FUEL_DATABASE_PATH") {
            Ok(path) => Self::new(path),
            Err(_) => Self::new(default_path),
        }
    }

    /// A `sqlite:` connection URL suitable for `SqlitePoolOptions::connect`.
    ///
    /// `mode=rwc` creates the file on first connect, matching sqlite's usual
    /// implicit-creation behavior for a workspace that has just been `init`'d.
    pub fn connection_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.db_path.display())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_has_rwc_mode() {
        let cfg = DbConfig::new("/tmp/workspace/.fuel/agent.db");
        assert_eq!(
            cfg.connection_url(),
            "sqlite:/tmp/workspace/.fuel/agent.db?mode=rwc"
        );
    }

    #[test]
    fn path_roundtrips() {
        let cfg = DbConfig::new("/tmp/x/agent.db");
        assert_eq!(cfg.path(), Path::new("/tmp/x/agent.db"));
    }
}
