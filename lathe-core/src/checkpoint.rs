//! Checkpoint records and their on-disk layout.
//!
//! A run directory holds `config.json`, one
//! `checkpoint-epoch{NNN}-loss-{L.LLLL}.pth.tar` file per periodic save, and
//! `model_best.pth.tar` for the best epoch so far. Files are JSON-encoded
//! [`Checkpoint`] records.

use crate::config::Config;
use crate::error::CheckpointError;
use crate::history::{TrainingHistory, scalar};
use crate::optim::OptimizerState;
use crate::persistence;
use crate::tensor::Parameters;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/// Filename of the best-model checkpoint.
pub const BEST_FILENAME: &str = "model_best.pth.tar";

/// Filename of the configuration snapshot.
pub const CONFIG_FILENAME: &str = "config.json";

/// Everything needed to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub arch: String,
    pub epoch: usize,
    /// Training history up to and including `epoch`, if one was attached.
    pub logger: Option<TrainingHistory>,
    pub state_dict: Parameters,
    pub optimizer: OptimizerState,
    #[serde(with = "scalar")]
    pub monitor_best: f64,
    pub config: Config,
}

/// Periodic checkpoint filename for an epoch and its loss.
pub fn checkpoint_filename(epoch: usize, loss: f64) -> String {
    format!("checkpoint-epoch{epoch:03}-loss-{loss:.4}.pth.tar")
}

impl Checkpoint {
    /// Write the checkpoint to `path`.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        persistence::atomic_write_json(path, self).map_err(|source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the checkpoint under its periodic name, then move it onto the
    /// best-model file in the same directory, replacing any previous best.
    pub fn save_best(&self, staging: &Path) -> Result<PathBuf, CheckpointError> {
        self.save(staging)?;
        let best = staging.with_file_name(BEST_FILENAME);
        persistence::replace(staging, &best).map_err(|source| CheckpointError::Write {
            path: best.clone(),
            source,
        })?;
        Ok(best)
    }

    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        persistence::read_json(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CheckpointError::NotFound {
                path: path.to_path_buf(),
            },
            _ => CheckpointError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })
    }
}

/// Checkpoint files in a run directory, oldest epoch first. The best-model
/// file is not included.
pub fn list_checkpoints(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("checkpoint-epoch") && n.ends_with(".pth.tar"))
        })
        .collect();
    files.sort();
    Ok(files)
}
