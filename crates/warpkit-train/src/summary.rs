//! Scalar summaries written as JSON lines.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

pub const SCALARS_FILE: &str = "scalars.jsonl";

#[derive(Debug, Serialize)]
struct ScalarEvent<'a> {
    step: usize,
    tag: &'a str,
    value: f64,
    wall_time: f64,
}

/// Appends `{"step", "tag", "value", "wall_time"}` records to `<dir>/scalars.jsonl`.
pub struct SummaryWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SummaryWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCALARS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let event = ScalarEvent {
            step,
            tag,
            value,
            wall_time,
        };
        serde_json::to_writer(&mut self.writer, &event).map_err(std::io::Error::from)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}
