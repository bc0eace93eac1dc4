//! Per-run output directory layout.
//!
//! ```text
//! <log_dir>/<YYYYMMDD-HHMMSS>/
//!     config.json
//!     tensorboard/train/scalars.jsonl
//!     tensorboard/test/scalars.jsonl
//!     checkpoint/cp-000000.ckpt
//! ```

use burn::config::Config;
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::TrainingConfig;
use crate::error::Result;

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirs {
    root: PathBuf,
}

impl RunDirs {
    /// Resolve the run directory: one trailing `/` is dropped from `log_dir`
    /// and the start time is appended.
    pub fn new<Tz>(log_dir: &str, now: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let base = log_dir.strip_suffix('/').unwrap_or(log_dir);
        let root = format!("{}/{}", base, now.format("%Y%m%d-%H%M%S"));
        Self { root: PathBuf::from(root) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn summary_train(&self) -> PathBuf {
        self.root.join("tensorboard").join("train")
    }

    pub fn summary_test(&self) -> PathBuf {
        self.root.join("tensorboard").join("test")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoint")
    }

    /// Create the directories and record the resolved configuration.
    ///
    /// Fails if the run directory already exists, so two runs started in the
    /// same second never share summaries or checkpoints.
    pub fn create(&self, config: &TrainingConfig) -> Result<()> {
        if let Some(parent) = self.root.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir(&self.root).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                io::Error::new(
                    e.kind(),
                    format!("Run directory {} already exists", self.root.display()),
                )
            } else {
                e
            }
        })?;
        std::fs::create_dir_all(self.summary_train())?;
        std::fs::create_dir_all(self.summary_test())?;
        std::fs::create_dir_all(self.checkpoint_dir())?;

        let path = self.root.join(CONFIG_FILE);
        config.save(&path)?;
        tracing::info!("Writing run output to {}", self.root.display());
        Ok(())
    }
}
