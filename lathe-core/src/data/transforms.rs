//! Preprocessing transforms and the composer that chains them.

use crate::config::ComponentConfig;
use crate::error::ResolveError;
use crate::registry::{ComponentRegistry, parse_kwargs};
use crate::tensor::Tensor;
use serde::Deserialize;
use std::fmt;

/// A per-sample preprocessing step.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, input: Tensor) -> Tensor;
}

/// Transforms applied in order.
#[derive(Default)]
pub struct Compose {
    steps: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(steps: Vec<Box<dyn Transform>>) -> Self {
        Self { steps }
    }

    /// A pipeline that returns its input untouched.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn apply(&self, input: Tensor) -> Tensor {
        self.steps.iter().fold(input, |acc, step| step.apply(acc))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose").field("steps", &self.names()).finish()
    }
}

pub type TransformRegistry = ComponentRegistry<(), Box<dyn Transform>>;

/// Build a pipeline from a list of `{type, kwargs}` entries.
pub fn get_composed_transforms(
    configs: &[ComponentConfig],
    registry: &TransformRegistry,
) -> Result<Compose, ResolveError> {
    let steps = configs
        .iter()
        .map(|config| registry.build(config))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Compose::new(steps))
}

/// `(x - mean) / std`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Normalize {
    pub mean: f32,
    pub std: f32,
}

impl Transform for Normalize {
    fn name(&self) -> &str {
        "Normalize"
    }

    fn apply(&self, input: Tensor) -> Tensor {
        let (mean, std) = (self.mean, self.std);
        input.map(|x| (x - mean) / std)
    }
}

/// `x * factor`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scale {
    pub factor: f32,
}

impl Transform for Scale {
    fn name(&self) -> &str {
        "Scale"
    }

    fn apply(&self, input: Tensor) -> Tensor {
        let factor = self.factor;
        input.map(|x| x * factor)
    }
}

/// Clamp every value into `[min, max]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Clamp {
    pub min: f32,
    pub max: f32,
}

impl Transform for Clamp {
    fn name(&self) -> &str {
        "Clamp"
    }

    fn apply(&self, input: Tensor) -> Tensor {
        let (min, max) = (self.min, self.max);
        input.map(|x| x.clamp(min, max))
    }
}

/// Registry holding the built-in `transforms.*` entries.
pub fn default_transform_registry() -> Result<TransformRegistry, ResolveError> {
    let mut registry = TransformRegistry::new("transform");
    let builtins: [(&str, fn(&crate::config::Kwargs) -> Result<Box<dyn Transform>, ResolveError>); 3] = [
        ("transforms.Normalize", |kw| {
            let t: Normalize = parse_kwargs("Normalize", kw)?;
            if t.std == 0.0 {
                return Err(ResolveError::Construction {
                    component: "Normalize".into(),
                    message: "std must be non-zero".into(),
                });
            }
            Ok(Box::new(t))
        }),
        ("transforms.Scale", |kw| {
            Ok(Box::new(parse_kwargs::<Scale>("Scale", kw)?))
        }),
        ("transforms.Clamp", |kw| {
            let t: Clamp = parse_kwargs("Clamp", kw)?;
            if t.min > t.max {
                return Err(ResolveError::Construction {
                    component: "Clamp".into(),
                    message: format!("min {} exceeds max {}", t.min, t.max),
                });
            }
            Ok(Box::new(t))
        }),
    ];
    for (path, build) in builtins {
        registry.register(path, move |_, kw| build(kw))?;
    }
    Ok(registry)
}
