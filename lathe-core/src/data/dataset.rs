//! Dataset abstraction and configured dataset construction.

use crate::config::DatasetConfig;
use crate::data::transforms::{Compose, TransformRegistry, get_composed_transforms};
use crate::error::{DatasetError, ResolveError};
use crate::registry::ComponentRegistry;
use crate::tensor::Tensor;
use tracing::debug;

/// One input/target pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Tensor,
    pub target: Tensor,
}

/// Indexable collection of samples.
pub trait Dataset: Send {
    fn len(&self) -> usize;

    fn get(&self, index: usize) -> Result<Sample, DatasetError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dataset factories receive the composed transform built from
/// `dataset.transforms` alongside their kwargs.
pub type DatasetRegistry = ComponentRegistry<Compose, Box<dyn Dataset>>;

/// Construct the dataset named by a `dataset` config section.
///
/// Resolves the dataset type before building transforms, so an unknown dataset
/// is reported even when the transform list is also wrong.
pub fn get_dataset(
    config: &DatasetConfig,
    datasets: &DatasetRegistry,
    transforms: &TransformRegistry,
) -> Result<Box<dyn Dataset>, ResolveError> {
    let factory = datasets.resolve(&config.type_name)?;
    let transform = get_composed_transforms(&config.transforms, transforms)?;
    debug!(
        dataset = %config.type_name,
        transforms = ?transform.names(),
        "Constructing dataset"
    );
    factory(transform, &config.kwargs)
}

/// Registry pre-populated with the project templates.
pub fn default_dataset_registry() -> Result<DatasetRegistry, ResolveError> {
    let mut registry = DatasetRegistry::new("dataset");
    crate::templates::register_datasets(&mut registry)?;
    Ok(registry)
}
