//! Starting points for a project's own dataset and model.
//!
//! Both are registered under `templates.*` so a fresh configuration resolves
//! before any real component exists. Copy one, fill in the bodies, and
//! register it under your own module path.

use crate::data::{Compose, Dataset, DatasetRegistry, Sample};
use crate::error::{DatasetError, ModelError, ResolveError};
use crate::model::{Model, ModelRegistry};
use crate::registry::parse_kwargs;
use crate::tensor::{Parameters, Tensor};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomDatasetArgs {
    root: PathBuf,
}

/// Template dataset rooted at a directory. Holds no samples.
#[derive(Debug)]
pub struct CustomDataset {
    pub root: PathBuf,
    pub transform: Compose,
}

impl CustomDataset {
    pub fn new(root: PathBuf, transform: Compose) -> Self {
        Self { root, transform }
    }
}

impl Dataset for CustomDataset {
    fn len(&self) -> usize {
        0
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        Err(DatasetError::IndexOutOfRange { index, len: 0 })
    }
}

/// Template model with no parameters; `forward` returns its input.
#[derive(Debug, Default)]
pub struct CustomModel {
    params: Parameters,
}

impl Model for CustomModel {
    fn arch(&self) -> &str {
        "CustomModel"
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        Ok(input.clone())
    }
}

pub(crate) fn register_models(registry: &mut ModelRegistry) -> Result<(), ResolveError> {
    registry.register("templates.CustomModel", |_, kwargs| {
        parse_kwargs::<serde::de::IgnoredAny>("CustomModel", kwargs)?;
        Ok(Box::new(CustomModel::default()))
    })
}

pub(crate) fn register_datasets(registry: &mut DatasetRegistry) -> Result<(), ResolveError> {
    registry.register("templates.CustomDataset", |transform, kwargs| {
        let args: CustomDatasetArgs = parse_kwargs("CustomDataset", kwargs)?;
        Ok(Box::new(CustomDataset::new(args.root, transform)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComponentConfig;
    use crate::model::{default_model_registry, get_model_instance};

    #[test]
    fn test_custom_model_resolves() {
        let config = ComponentConfig::new("templates.CustomModel", Default::default());
        let model = get_model_instance(&config, &default_model_registry().unwrap()).unwrap();
        assert_eq!(model.arch(), "CustomModel");
        assert!(model.parameters().is_empty());
        let x = Tensor::vector(vec![1.0, 2.0]);
        assert_eq!(model.forward(&x).unwrap(), x);
    }

    #[test]
    fn test_registering_templates_twice_is_reported() {
        let mut models = default_model_registry().unwrap();
        assert!(matches!(
            register_models(&mut models),
            Err(ResolveError::AlreadyRegistered { ref path }) if path == "templates.CustomModel"
        ));
        let mut datasets = crate::data::default_dataset_registry().unwrap();
        assert!(matches!(
            register_datasets(&mut datasets),
            Err(ResolveError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn test_custom_dataset_is_empty() {
        let ds = CustomDataset::new(PathBuf::from("data/"), Compose::identity());
        assert!(ds.is_empty());
        assert!(ds.get(0).is_err());
    }
}
