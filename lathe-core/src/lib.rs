//! # lathe-core — scaffold for machine-learning experiments
//!
//! A configuration names every component of a run: dataset (plus its
//! transform pipeline), model, optimizer and learning-rate scheduler. Datasets
//! and models are selected from registries keyed by dotted paths; optimizers
//! and schedulers from a fixed built-in namespace. The [`Trainer`] drives the
//! epoch loop around a user-supplied [`EpochHook`], tracks the best monitored
//! metric, writes periodic and best-model checkpoints, and resumes from them.

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod device;
pub mod error;
pub mod history;
pub mod model;
pub mod optim;
pub mod persistence;
pub mod registry;
pub mod templates;
pub mod tensor;
pub mod trainer;

pub use checkpoint::Checkpoint;
pub use config::{Config, MonitorMode, load_config};
pub use device::{Device, DeviceProbe, resolve_device};
pub use error::{LatheError, Result};
pub use history::{EpochLog, TrainingHistory};
pub use model::{Model, ModelRegistry};
pub use optim::{LrScheduler, Optimizer};
pub use registry::ComponentRegistry;
pub use tensor::{Parameters, Tensor};
pub use trainer::{EpochContext, EpochHook, Trainer, TrainerOptions, TrainingSummary};
