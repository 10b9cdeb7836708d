//! Stochastic gradient descent with optional momentum, dampening, Nesterov
//! momentum and L2 weight decay.

use super::{Binding, Optimizer, OptimizerState};
use crate::config::Kwargs;
use crate::device::Device;
use crate::error::{OptimError, ResolveError};
use crate::registry::parse_kwargs;
use crate::tensor::Parameters;
use serde::Deserialize;

const MOMENTUM_BUFFER: &str = "momentum_buffer";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SgdArgs {
    pub lr: f64,
    #[serde(default)]
    pub momentum: f64,
    #[serde(default)]
    pub dampening: f64,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default)]
    pub nesterov: bool,
}

pub struct Sgd {
    args: SgdArgs,
    binding: Binding,
    state: OptimizerState,
}

impl Sgd {
    pub const NAME: &'static str = "SGD";

    pub fn new(params: &Parameters, args: SgdArgs) -> Result<Self, ResolveError> {
        if args.lr < 0.0 {
            return Err(construction(format!("invalid learning rate {}", args.lr)));
        }
        if args.nesterov && (args.momentum <= 0.0 || args.dampening != 0.0) {
            return Err(construction(
                "Nesterov momentum requires a momentum and zero dampening".into(),
            ));
        }
        Ok(Self {
            state: OptimizerState::new(Self::NAME, args.lr),
            binding: Binding::new(params),
            args,
        })
    }

    pub fn from_kwargs(params: &Parameters, kwargs: &Kwargs) -> Result<Self, ResolveError> {
        Self::new(params, parse_kwargs(Self::NAME, kwargs)?)
    }
}

fn construction(message: String) -> ResolveError {
    ResolveError::Construction {
        component: Sgd::NAME.to_string(),
        message,
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn lr(&self) -> f64 {
        self.state.lr
    }

    fn set_lr(&mut self, lr: f64) {
        self.state.lr = lr;
    }

    fn step(&mut self, params: &mut Parameters, grads: &Parameters) -> Result<(), OptimError> {
        self.binding.check_grads(params, grads)?;
        let lr = self.state.lr as f32;
        let momentum = self.args.momentum as f32;
        let dampening = self.args.dampening as f32;
        let weight_decay = self.args.weight_decay as f32;

        for (name, grad) in grads.iter() {
            let Some(param) = params.get_mut(name) else {
                continue;
            };
            let mut update: Vec<f32> = grad
                .data()
                .iter()
                .zip(param.data())
                .map(|(g, p)| g + weight_decay * p)
                .collect();

            if momentum != 0.0 {
                let fresh = !self
                    .state
                    .buffers
                    .get(name)
                    .is_some_and(|b| b.contains_key(MOMENTUM_BUFFER));
                let buf = self.state.buffer(name, MOMENTUM_BUFFER, grad);
                for (b, d) in buf.data_mut().iter_mut().zip(&update) {
                    *b = if fresh {
                        *d
                    } else {
                        momentum * *b + (1.0 - dampening) * d
                    };
                }
                if self.args.nesterov {
                    for (d, b) in update.iter_mut().zip(buf.data()) {
                        *d += momentum * b;
                    }
                } else {
                    update.copy_from_slice(buf.data());
                }
            }

            for (p, d) in param.data_mut().iter_mut().zip(&update) {
                *p -= lr * d;
            }
        }
        self.state.step += 1;
        Ok(())
    }

    fn state_dict(&self) -> OptimizerState {
        self.state.clone()
    }

    fn load_state_dict(&mut self, state: OptimizerState) -> Result<(), OptimError> {
        self.binding.check_state(Self::NAME, &state)?;
        self.state = state;
        Ok(())
    }

    fn to_device(&mut self, device: Device) {
        self.state.to_device(device);
    }
}
