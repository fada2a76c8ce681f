//! # Index Configuration
//!
//! ```ignore
//! use ray_index::IndexConfig;
//!
//! let config = IndexConfig::new("/var/lib/ray")
//!     .with_retained_baselines(5)
//!     .with_audit(AuditOptions::default());
//! config.validate()?;
//! ```

use crate::domain::audit::AuditOptions;
use crate::domain::errors::IndexError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the index engine.
///
/// Every switch is explicit; nothing is read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base directory for everything below.
    pub root: PathBuf,

    /// Stash directory (default: `<root>/stash`).
    pub stash_dir: Option<PathBuf>,

    /// Baselines directory (default: `<root>/baselines`).
    pub baselines_dir: Option<PathBuf>,

    /// How many published baselines to keep for rollback, including the
    /// current one (default: 3).
    pub retained_baselines: usize,

    /// Audit switches passed to every build.
    pub audit: AuditOptions,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("ray-data"),
            stash_dir: None,
            baselines_dir: None,
            retained_baselines: 3,
            audit: AuditOptions::default(),
        }
    }
}

impl IndexConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = std::fs::read(path).map_err(IndexError::at(path))?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| IndexError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.stash_dir
            .clone()
            .unwrap_or_else(|| self.root.join("stash"))
    }

    pub fn baselines_dir(&self) -> PathBuf {
        self.baselines_dir
            .clone()
            .unwrap_or_else(|| self.root.join("baselines"))
    }

    pub fn with_stash_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stash_dir = Some(dir.into());
        self
    }

    pub fn with_baselines_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.baselines_dir = Some(dir.into());
        self
    }

    pub fn with_retained_baselines(mut self, count: usize) -> Self {
        self.retained_baselines = count;
        self
    }

    pub fn with_audit(mut self, audit: AuditOptions) -> Self {
        self.audit = audit;
        self
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.retained_baselines == 0 {
            return Err(IndexError::InvalidConfig(
                "retained_baselines must be at least 1".to_string(),
            ));
        }
        if self.stash_dir() == self.baselines_dir() {
            return Err(IndexError::InvalidConfig(
                "stash and baselines must live in different directories".to_string(),
            ));
        }
        Ok(())
    }
}
