//! Optimizers, learning-rate schedulers, and their resolution by name.
//!
//! Optimizers are bound to a model's parameter set when constructed: they
//! remember each parameter's name and shape, and reject gradients that do not
//! match. Their mutable state lives in an [`OptimizerState`] so it can be
//! checkpointed and restored uniformly.

pub mod adam;
pub mod resolver;
pub mod scheduler;
pub mod sgd;

pub use adam::{Adam, AdamW};
pub use resolver::{OPTIMIZERS, SCHEDULERS, get_optimizer};
pub use scheduler::{CosineAnnealingLR, ExponentialLR, LrScheduler, MultiStepLR, StepLR};
pub use sgd::Sgd;

use crate::device::Device;
use crate::error::OptimError;
use crate::tensor::{Parameters, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A gradient-based parameter update rule.
pub trait Optimizer: Send {
    /// Type name as written in configuration (`"SGD"`, `"Adam"`, ...).
    fn name(&self) -> &'static str;

    fn lr(&self) -> f64;

    fn set_lr(&mut self, lr: f64);

    /// Apply one update. `grads` may cover a subset of the bound parameters.
    fn step(&mut self, params: &mut Parameters, grads: &Parameters) -> Result<(), OptimError>;

    fn state_dict(&self) -> OptimizerState;

    fn load_state_dict(&mut self, state: OptimizerState) -> Result<(), OptimError>;

    /// Re-home every tensor-valued buffer on `device`.
    fn to_device(&mut self, device: Device);
}

/// Serializable optimizer state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Optimizer type that produced this state.
    pub optimizer: String,
    pub lr: f64,
    /// Number of `step` calls so far.
    pub step: u64,
    /// Per-parameter buffers, e.g. `momentum_buffer` or `exp_avg`.
    pub buffers: BTreeMap<String, BTreeMap<String, Tensor>>,
}

impl OptimizerState {
    pub(crate) fn new(optimizer: &str, lr: f64) -> Self {
        Self {
            optimizer: optimizer.to_string(),
            lr,
            step: 0,
            buffers: BTreeMap::new(),
        }
    }

    pub fn to_device(&mut self, device: Device) {
        for tensor in self.buffers.values_mut().flat_map(BTreeMap::values_mut) {
            tensor.move_to(device);
        }
    }

    /// Buffer `key` for `param`, created as zeros shaped like `like` on first use.
    pub(crate) fn buffer(&mut self, param: &str, key: &str, like: &Tensor) -> &mut Tensor {
        self.buffers
            .entry(param.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Tensor::zeros_like(like))
    }
}

/// Parameter names and shapes an optimizer was constructed against.
#[derive(Debug, Clone, Default)]
pub(crate) struct Binding {
    shapes: BTreeMap<String, Vec<usize>>,
}

impl Binding {
    pub(crate) fn new(params: &Parameters) -> Self {
        Self {
            shapes: params
                .iter()
                .map(|(name, t)| (name.to_string(), t.shape().to_vec()))
                .collect(),
        }
    }

    fn check(&self, name: &str, shape: &[usize]) -> Result<(), OptimError> {
        let expected = self
            .shapes
            .get(name)
            .ok_or_else(|| OptimError::UnknownParameter {
                name: name.to_string(),
            })?;
        if expected.as_slice() != shape {
            return Err(OptimError::GradientShape {
                name: name.to_string(),
                param: expected.clone(),
                grad: shape.to_vec(),
            });
        }
        Ok(())
    }

    /// Every gradient must name a bound parameter of the same shape.
    pub(crate) fn check_grads(&self, params: &Parameters, grads: &Parameters) -> Result<(), OptimError> {
        for (name, grad) in grads.iter() {
            self.check(name, grad.shape())?;
            if params.get(name).is_none() {
                return Err(OptimError::UnknownParameter {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate restored state against this binding.
    pub(crate) fn check_state(&self, expected: &str, state: &OptimizerState) -> Result<(), OptimError> {
        if state.optimizer != expected {
            return Err(OptimError::StateType {
                expected: expected.to_string(),
                found: state.optimizer.clone(),
            });
        }
        for (name, buffers) in &state.buffers {
            for tensor in buffers.values() {
                self.check(name, tensor.shape())?;
            }
        }
        Ok(())
    }
}
