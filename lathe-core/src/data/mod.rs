//! Datasets and the preprocessing pipeline applied to their samples.

pub mod dataset;
pub mod transforms;

pub use dataset::{Dataset, DatasetRegistry, Sample, default_dataset_registry, get_dataset};
pub use transforms::{Compose, Transform, TransformRegistry, default_transform_registry, get_composed_transforms};
