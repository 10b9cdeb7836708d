//! Error types for the Lathe training core.
//!
//! Uses `thiserror` for structured error variants covering configuration,
//! component resolution, models, optimizers, datasets, checkpoints, and the
//! training loop itself.

use std::path::PathBuf;

/// Top-level error type for the Lathe core library.
#[derive(Debug, thiserror::Error)]
pub enum LatheError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Optimizer error: {0}")]
    Optim(#[from] OptimError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Trainer error: {0}")]
    Trainer(#[from] TrainerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid environment override: {0}")]
    Override(#[from] Box<figment::Error>),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from turning a configured name into a constructed component.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Malformed component path '{path}': expected 'module.Name'")]
    MalformedPath { path: String },

    #[error("No module named {module} found")]
    ModuleNotFound { module: String },

    #[error("No component '{name}' found in module '{module}'")]
    AttributeNotFound { module: String, name: String },

    #[error("{kind} '{name}' not found")]
    TypeNotFound { kind: &'static str, name: String },

    #[error("Component '{path}' is already registered")]
    AlreadyRegistered { path: String },

    #[error("Invalid kwargs for '{component}': {source}")]
    InvalidKwargs {
        component: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to construct '{component}': {message}")]
    Construction { component: String, message: String },
}

/// Errors from model parameter handling.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Shape {shape:?} does not match {len} values")]
    ShapeMismatch { shape: Vec<usize>, len: usize },

    #[error("State dict mismatch: {message}")]
    StateMismatch { message: String },

    #[error("Forward pass failed: {message}")]
    Forward { message: String },
}

/// Errors from optimizers and their persisted state.
#[derive(Debug, thiserror::Error)]
pub enum OptimError {
    #[error("Gradient for unknown parameter '{name}'")]
    UnknownParameter { name: String },

    #[error("Gradient shape {grad:?} does not match parameter '{name}' shape {param:?}")]
    GradientShape {
        name: String,
        param: Vec<usize>,
        grad: Vec<usize>,
    },

    #[error("Optimizer state is for '{found}', expected '{expected}'")]
    StateType { expected: String, found: String },
}

/// Errors from datasets.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Dataset load failed: {message}")]
    Load { message: String },
}

/// Errors from checkpoint persistence.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Checkpoint not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to write checkpoint {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read checkpoint {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Errors raised by the epoch loop.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("Epoch {epoch} failed: {source}")]
    EpochFailed {
        epoch: usize,
        #[source]
        source: Box<LatheError>,
    },

    #[error("Epoch {epoch} log is missing metric '{metric}'")]
    MissingMetric { epoch: usize, metric: String },
}

/// Result alias for the Lathe core.
pub type Result<T> = std::result::Result<T, LatheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_distinct() {
        let module = ResolveError::ModuleNotFound {
            module: "models.vision".into(),
        };
        let attr = ResolveError::AttributeNotFound {
            module: "models.vision".into(),
            name: "ResNet".into(),
        };
        assert_eq!(module.to_string(), "No module named models.vision found");
        assert_eq!(
            attr.to_string(),
            "No component 'ResNet' found in module 'models.vision'"
        );
    }

    #[test]
    fn test_from_conversions() {
        let err: LatheError = TrainerError::MissingMetric {
            epoch: 3,
            metric: "loss".into(),
        }
        .into();
        assert!(matches!(
            err,
            LatheError::Trainer(TrainerError::MissingMetric { epoch: 3, .. })
        ));
        assert!(err.to_string().contains("missing metric 'loss'"));
    }
}
