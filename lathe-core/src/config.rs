//! Experiment configuration.
//!
//! Configuration is read from a JSON file with key order preserved, then
//! scalar settings may be overridden from `LATHE_`-prefixed environment
//! variables (nested with `__`, e.g. `LATHE_TRAINER__EPOCHS=5`) extracted
//! through `figment`. Required keys have no defaults: a missing key fails the
//! load.

use crate::error::ConfigError;
use crate::persistence;
use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Constructor keyword arguments, in the order they were written.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "LATHE_";

/// Full experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Experiment name; the checkpoint directory is `save_dir/name/<run>`.
    pub name: String,
    /// Request a CUDA device.
    pub cuda: bool,
    /// CUDA device index used when `cuda` is set.
    pub gpu: usize,
    pub trainer: TrainerConfig,
    pub optimizer: OptimizerConfig,
    pub dataset: DatasetConfig,
    pub model: ComponentConfig,
}

/// Epoch loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub epochs: usize,
    /// Save a periodic checkpoint every `save_freq` epochs.
    pub save_freq: usize,
    /// 0 = quiet, 1+ = log every epoch log entry.
    pub verbosity: u8,
    /// Epoch log key compared to decide the best model.
    pub monitor: String,
    pub monitor_mode: MonitorMode,
    pub save_dir: PathBuf,
}

/// Whether a smaller or larger monitored value is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    Max,
}

impl MonitorMode {
    /// The value every real metric improves on.
    pub fn initial_best(self) -> f64 {
        match self {
            MonitorMode::Min => f64::INFINITY,
            MonitorMode::Max => f64::NEG_INFINITY,
        }
    }

    /// Strict improvement; ties never count.
    pub fn is_improvement(self, value: f64, best: f64) -> bool {
        match self {
            MonitorMode::Min => value < best,
            MonitorMode::Max => value > best,
        }
    }
}

/// A component selected by dotted type path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub kwargs: Kwargs,
}

impl ComponentConfig {
    pub fn new(type_name: impl Into<String>, kwargs: Kwargs) -> Self {
        Self {
            type_name: type_name.into(),
            kwargs,
        }
    }
}

/// Dataset selection plus its preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub kwargs: Kwargs,
    pub transforms: Vec<ComponentConfig>,
}

/// Optimizer selection, resolved from the built-in optimizer namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub kwargs: Kwargs,
    /// Absent means no scheduler is requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_scheduler: Option<SchedulerConfig>,
}

/// Learning-rate scheduler selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub kwargs: Kwargs,
    /// Step the scheduler on epochs divisible by this value.
    pub step_freq: usize,
}

/// Scalar settings that may be overridden from the environment.
#[derive(Debug, Default, Deserialize)]
struct Overrides {
    name: Option<String>,
    cuda: Option<bool>,
    gpu: Option<usize>,
    #[serde(default)]
    trainer: TrainerOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct TrainerOverrides {
    epochs: Option<usize>,
    save_freq: Option<usize>,
    verbosity: Option<u8>,
    monitor: Option<String>,
    save_dir: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from JSON text.
    pub fn from_json_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Check values that the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty"));
        }
        if self.trainer.epochs == 0 {
            return Err(invalid("trainer.epochs", "must be at least 1"));
        }
        if self.trainer.save_freq == 0 {
            return Err(invalid("trainer.save_freq", "must be at least 1"));
        }
        if self.trainer.monitor.trim().is_empty() {
            return Err(invalid("trainer.monitor", "must not be empty"));
        }
        if let Some(scheduler) = &self.optimizer.lr_scheduler {
            if scheduler.step_freq == 0 {
                return Err(invalid(
                    "optimizer.lr_scheduler.step_freq",
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }

    /// Apply `LATHE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let overrides: Overrides = Figment::new()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        if let Some(name) = overrides.name {
            self.name = name;
        }
        if let Some(cuda) = overrides.cuda {
            self.cuda = cuda;
        }
        if let Some(gpu) = overrides.gpu {
            self.gpu = gpu;
        }
        let t = overrides.trainer;
        if let Some(epochs) = t.epochs {
            self.trainer.epochs = epochs;
        }
        if let Some(save_freq) = t.save_freq {
            self.trainer.save_freq = save_freq;
        }
        if let Some(verbosity) = t.verbosity {
            self.trainer.verbosity = verbosity;
        }
        if let Some(monitor) = t.monitor {
            self.trainer.monitor = monitor;
        }
        if let Some(save_dir) = t.save_dir {
            self.trainer.save_dir = save_dir;
        }
        Ok(())
    }

    /// Pretty JSON with 4-space indentation, keys in insertion order.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }

    /// Write the configuration snapshot to `path`.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), crate::error::LatheError> {
        let bytes = self.to_pretty_json()?;
        persistence::atomic_write(path, &bytes)?;
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Load configuration: JSON file, then environment overrides, then validation.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: serde_json::Error::io(e),
    })?;
    let mut config = Config::from_json_str(&text, path)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}
