//! Model abstraction and configured model construction.

use crate::config::ComponentConfig;
use crate::device::Device;
use crate::error::{ModelError, ResolveError};
use crate::registry::ComponentRegistry;
use crate::tensor::{Parameters, Tensor};

/// A trainable model: named parameters plus a forward pass.
pub trait Model: Send {
    /// Architecture name recorded in checkpoints.
    fn arch(&self) -> &str;

    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError>;

    /// Home every parameter on `device`.
    fn to_device(&mut self, device: Device) {
        self.parameters_mut().to_device(device);
    }

    fn state_dict(&self) -> Parameters {
        self.parameters().clone()
    }

    fn load_state_dict(&mut self, state: Parameters) -> Result<(), ModelError> {
        self.parameters_mut().load(state)
    }
}

/// Registry of model factories keyed by dotted type path.
pub type ModelRegistry = ComponentRegistry<(), Box<dyn Model>>;

/// Construct the model named by a `model` config entry.
pub fn get_model_instance(
    config: &ComponentConfig,
    registry: &ModelRegistry,
) -> Result<Box<dyn Model>, ResolveError> {
    registry.build(config)
}

/// Registry pre-populated with the project templates.
pub fn default_model_registry() -> Result<ModelRegistry, ResolveError> {
    let mut registry = ModelRegistry::new("model");
    crate::templates::register_models(&mut registry)?;
    Ok(registry)
}
