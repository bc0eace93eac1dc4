//! Model checkpoints named `cp-{epoch:06d}.ckpt`.

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::Backend;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};

pub fn checkpoint_path(dir: impl AsRef<Path>, epoch: usize) -> PathBuf {
    dir.as_ref().join(format!("cp-{epoch:06}.ckpt"))
}

/// Epoch encoded in a checkpoint file name.
pub fn checkpoint_epoch(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix("cp-")?.strip_suffix(".ckpt")?.parse().ok()
}

fn recorder() -> NamedMpkBytesRecorder<FullPrecisionSettings> {
    NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
}

/// Saves model weights every `save_period` epochs.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    save_period: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, save_period: usize) -> Self {
        Self {
            dir: dir.into(),
            save_period: save_period.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_save(&self, epoch: usize) -> bool {
        epoch % self.save_period == 0
    }

    /// Write the model record for `epoch`, returning the file written.
    pub fn save<B: Backend, M: Module<B>>(&self, model: &M, epoch: usize) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = checkpoint_path(&self.dir, epoch);
        let bytes = Recorder::<B>::record(&recorder(), model.clone().into_record(), ())
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Load weights saved by [`CheckpointManager::save`] into `model`.
    pub fn restore<B: Backend, M: Module<B>>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;
        let record = Recorder::<B>::load(&recorder(), bytes, device)
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;
        Ok(model.load_record(record))
    }

    /// Highest-epoch checkpoint in `dir`, if any.
    pub fn latest(dir: impl AsRef<Path>) -> Result<Option<(usize, PathBuf)>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Ok(None);
        }
        let mut best: Option<(usize, PathBuf)> = None;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(epoch) = checkpoint_epoch(&path) {
                if best.as_ref().map_or(true, |(e, _)| epoch > *e) {
                    best = Some((epoch, path));
                }
            }
        }
        Ok(best)
    }
}
