//! [`FuelContext`]: the one piece of shared state every component is handed explicitly.
//!
//! §9: "Do not introduce process-wide singletons; pass the `FuelContext` (a small struct
//! of paths) explicitly to everything that needs it."

use std::path::{Path, PathBuf};

/// Paths rooted at an operator's project root. Cheap to construct and clone; every
/// component that needs a path derives it from here rather than hard-coding `.fuel/...`.
#[derive(Debug, Clone)]
pub struct FuelContext {
    pub root: PathBuf,
    pub fuel_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub pid_path: PathBuf,
    pub lock_path: PathBuf,
    pub processes_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub reality_path: PathBuf,
}

impl FuelContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let fuel_dir = root.join(".fuel");
        Self {
            db_path: fuel_dir.join("agent.db"),
            config_path: fuel_dir.join("config.yaml"),
            pid_path: fuel_dir.join("consume.pid"),
            lock_path: fuel_dir.join("consume.pid.lock"),
            processes_dir: fuel_dir.join("processes"),
            plans_dir: fuel_dir.join("plans"),
            prompts_dir: fuel_dir.join("prompts"),
            reality_path: fuel_dir.join("reality.md"),
            fuel_dir,
            root,
        }
    }

    pub fn agents_md_path(&self) -> PathBuf {
        self.root.join("AGENTS.md")
    }

    pub fn gitignore_path(&self) -> PathBuf {
        self.root.join(".gitignore")
    }

    /// Create the `.fuel/` workspace layout (§6). Idempotent: existing files/directories
    /// are left untouched.
    pub fn init_layout(&self) -> std::io::Result<()> {
        for dir in [
            &self.fuel_dir,
            &self.processes_dir,
            &self.plans_dir,
            &self.prompts_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if !self.config_path.exists() {
            std::fs::write(&self.config_path, "")?;
        }
        if !self.reality_path.exists() {
            std::fs::write(&self.reality_path, "# Reality\n")?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_well_known_paths() {
        let ctx = FuelContext::new("/workspace");
        assert_eq!(ctx.db_path, Path::new("/workspace/.fuel/agent.db"));
        assert_eq!(ctx.config_path, Path::new("/workspace/.fuel/config.yaml"));
        assert_eq!(ctx.pid_path, Path::new("/workspace/.fuel/consume.pid"));
        assert_eq!(ctx.lock_path, Path::new("/workspace/.fuel/consume.pid.lock"));
    }

    #[test]
    fn init_layout_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FuelContext::new(dir.path());
        ctx.init_layout().unwrap();
        ctx.init_layout().unwrap();
        assert!(ctx.config_path.exists());
        assert!(ctx.plans_dir.is_dir());
    }
}
