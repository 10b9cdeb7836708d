//! Adam and AdamW.
//!
//! Both keep bias-corrected first and second moment estimates per parameter.
//! Adam folds weight decay into the gradient; AdamW decays the weights
//! directly before the moment update.

use super::{Binding, Optimizer, OptimizerState};
use crate::config::Kwargs;
use crate::device::Device;
use crate::error::{OptimError, ResolveError};
use crate::registry::parse_kwargs;
use crate::tensor::Parameters;
use serde::Deserialize;

const EXP_AVG: &str = "exp_avg";
const EXP_AVG_SQ: &str = "exp_avg_sq";

fn default_lr() -> f64 {
    1e-3
}

fn default_betas() -> [f64; 2] {
    [0.9, 0.999]
}

fn default_eps() -> f64 {
    1e-8
}

fn default_adamw_decay() -> f64 {
    1e-2
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdamArgs {
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_betas")]
    pub betas: [f64; 2],
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default)]
    pub weight_decay: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdamWArgs {
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_betas")]
    pub betas: [f64; 2],
    #[serde(default = "default_eps")]
    pub eps: f64,
    #[serde(default = "default_adamw_decay")]
    pub weight_decay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decay {
    L2,
    Decoupled,
}

/// Shared moment-estimate machinery.
struct Moments {
    name: &'static str,
    betas: [f64; 2],
    eps: f64,
    weight_decay: f64,
    decay: Decay,
    binding: Binding,
    state: OptimizerState,
}

impl Moments {
    fn new(
        name: &'static str,
        params: &Parameters,
        lr: f64,
        betas: [f64; 2],
        eps: f64,
        weight_decay: f64,
        decay: Decay,
    ) -> Result<Self, ResolveError> {
        let fail = |message: String| ResolveError::Construction {
            component: name.to_string(),
            message,
        };
        if lr < 0.0 {
            return Err(fail(format!("invalid learning rate {lr}")));
        }
        if eps < 0.0 {
            return Err(fail(format!("invalid epsilon {eps}")));
        }
        for beta in betas {
            if !(0.0..1.0).contains(&beta) {
                return Err(fail(format!("invalid beta {beta}, expected [0, 1)")));
            }
        }
        Ok(Self {
            name,
            betas,
            eps,
            weight_decay,
            decay,
            binding: Binding::new(params),
            state: OptimizerState::new(name, lr),
        })
    }

    fn step(&mut self, params: &mut Parameters, grads: &Parameters) -> Result<(), OptimError> {
        self.binding.check_grads(params, grads)?;
        self.state.step += 1;
        let t = self.state.step as i32;
        let lr = self.state.lr as f32;
        let [b1, b2] = self.betas;
        let correction1 = (1.0 - b1.powi(t)) as f32;
        let correction2 = (1.0 - b2.powi(t)) as f32;
        let (b1, b2) = (b1 as f32, b2 as f32);
        let eps = self.eps as f32;
        let wd = self.weight_decay as f32;

        for (name, grad) in grads.iter() {
            let Some(param) = params.get_mut(name) else {
                continue;
            };
            if self.decay == Decay::Decoupled && wd != 0.0 {
                for p in param.data_mut() {
                    *p *= 1.0 - lr * wd;
                }
            }
            let g: Vec<f32> = match self.decay {
                Decay::L2 => grad
                    .data()
                    .iter()
                    .zip(param.data())
                    .map(|(g, p)| g + wd * p)
                    .collect(),
                Decay::Decoupled => grad.data().to_vec(),
            };

            let m = self.state.buffer(name, EXP_AVG, grad);
            for (m, g) in m.data_mut().iter_mut().zip(&g) {
                *m = b1 * *m + (1.0 - b1) * g;
            }
            let m_hat: Vec<f32> = m.data().iter().map(|m| m / correction1).collect();

            let v = self.state.buffer(name, EXP_AVG_SQ, grad);
            for (v, g) in v.data_mut().iter_mut().zip(&g) {
                *v = b2 * *v + (1.0 - b2) * g * g;
            }

            for ((p, m_hat), v) in param.data_mut().iter_mut().zip(&m_hat).zip(v.data()) {
                let v_hat = v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        }
        Ok(())
    }

    fn load(&mut self, state: OptimizerState) -> Result<(), OptimError> {
        self.binding.check_state(self.name, &state)?;
        self.state = state;
        Ok(())
    }
}

pub struct Adam {
    inner: Moments,
}

impl Adam {
    pub const NAME: &'static str = "Adam";

    pub fn new(params: &Parameters, args: AdamArgs) -> Result<Self, ResolveError> {
        Ok(Self {
            inner: Moments::new(
                Self::NAME,
                params,
                args.lr,
                args.betas,
                args.eps,
                args.weight_decay,
                Decay::L2,
            )?,
        })
    }

    pub fn from_kwargs(params: &Parameters, kwargs: &Kwargs) -> Result<Self, ResolveError> {
        Self::new(params, parse_kwargs(Self::NAME, kwargs)?)
    }
}

pub struct AdamW {
    inner: Moments,
}

impl AdamW {
    pub const NAME: &'static str = "AdamW";

    pub fn new(params: &Parameters, args: AdamWArgs) -> Result<Self, ResolveError> {
        Ok(Self {
            inner: Moments::new(
                Self::NAME,
                params,
                args.lr,
                args.betas,
                args.eps,
                args.weight_decay,
                Decay::Decoupled,
            )?,
        })
    }

    pub fn from_kwargs(params: &Parameters, kwargs: &Kwargs) -> Result<Self, ResolveError> {
        Self::new(params, parse_kwargs(Self::NAME, kwargs)?)
    }
}

macro_rules! impl_moment_optimizer {
    ($ty:ty) => {
        impl Optimizer for $ty {
            fn name(&self) -> &'static str {
                <$ty>::NAME
            }

            fn lr(&self) -> f64 {
                self.inner.state.lr
            }

            fn set_lr(&mut self, lr: f64) {
                self.inner.state.lr = lr;
            }

            fn step(
                &mut self,
                params: &mut Parameters,
                grads: &Parameters,
            ) -> Result<(), OptimError> {
                self.inner.step(params, grads)
            }

            fn state_dict(&self) -> OptimizerState {
                self.inner.state.clone()
            }

            fn load_state_dict(&mut self, state: OptimizerState) -> Result<(), OptimError> {
                self.inner.load(state)
            }

            fn to_device(&mut self, device: Device) {
                self.inner.state.to_device(device);
            }
        }
    };
}

impl_moment_optimizer!(Adam);
impl_moment_optimizer!(AdamW);
