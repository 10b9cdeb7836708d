//! Learning rate schedulers.
//!
//! Each scheduler captures the optimizer's learning rate at construction as
//! its base rate. `step(epoch, optimizer)` computes the closed-form rate for
//! that epoch and writes it into the optimizer, so stepping with the same epoch
//! twice is idempotent and a resumed run picks up the right rate.

use super::Optimizer;
use crate::config::Kwargs;
use crate::error::ResolveError;
use crate::registry::parse_kwargs;
use serde::Deserialize;

/// Learning rate scheduler trait.
pub trait LrScheduler: Send {
    fn name(&self) -> &'static str;

    /// Set the optimizer's learning rate for `epoch`.
    fn step(&mut self, epoch: usize, optimizer: &mut dyn Optimizer);

    /// Learning rate produced by the most recent `step`, or the base rate.
    fn get_lr(&self) -> f64;
}

fn default_gamma() -> f64 {
    0.1
}

/// Multiplies the rate by `gamma` every `step_size` epochs.
///
/// `lr = base * gamma^(epoch / step_size)`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepLRArgs {
    pub step_size: usize,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

#[derive(Debug, Clone)]
pub struct StepLR {
    base_lr: f64,
    last_lr: f64,
    args: StepLRArgs,
}

impl StepLR {
    pub const NAME: &'static str = "StepLR";

    pub fn new(optimizer: &dyn Optimizer, args: StepLRArgs) -> Result<Self, ResolveError> {
        if args.step_size == 0 {
            return Err(construction(Self::NAME, "step_size must be at least 1"));
        }
        let base_lr = optimizer.lr();
        Ok(Self {
            base_lr,
            last_lr: base_lr,
            args,
        })
    }

    fn lr_at(&self, epoch: usize) -> f64 {
        self.base_lr * self.args.gamma.powi((epoch / self.args.step_size) as i32)
    }
}

/// Multiplies the rate by `gamma` once per milestone reached.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiStepLRArgs {
    pub milestones: Vec<usize>,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

#[derive(Debug, Clone)]
pub struct MultiStepLR {
    base_lr: f64,
    last_lr: f64,
    args: MultiStepLRArgs,
}

impl MultiStepLR {
    pub const NAME: &'static str = "MultiStepLR";

    pub fn new(optimizer: &dyn Optimizer, args: MultiStepLRArgs) -> Result<Self, ResolveError> {
        if args.milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(construction(
                Self::NAME,
                "milestones must be strictly increasing",
            ));
        }
        let base_lr = optimizer.lr();
        Ok(Self {
            base_lr,
            last_lr: base_lr,
            args,
        })
    }

    fn lr_at(&self, epoch: usize) -> f64 {
        let reached = self.args.milestones.iter().filter(|&&m| m <= epoch).count();
        self.base_lr * self.args.gamma.powi(reached as i32)
    }
}

/// `lr = base * gamma^epoch`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExponentialLRArgs {
    pub gamma: f64,
}

#[derive(Debug, Clone)]
pub struct ExponentialLR {
    base_lr: f64,
    last_lr: f64,
    args: ExponentialLRArgs,
}

impl ExponentialLR {
    pub const NAME: &'static str = "ExponentialLR";

    pub fn new(optimizer: &dyn Optimizer, args: ExponentialLRArgs) -> Result<Self, ResolveError> {
        let base_lr = optimizer.lr();
        Ok(Self {
            base_lr,
            last_lr: base_lr,
            args,
        })
    }

    fn lr_at(&self, epoch: usize) -> f64 {
        self.base_lr * self.args.gamma.powi(epoch as i32)
    }
}

/// Cosine decay from the base rate to `eta_min` over `T_max` epochs.
///
/// `lr = eta_min + (base - eta_min) * (1 + cos(pi * epoch / T_max)) / 2`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CosineAnnealingLRArgs {
    #[serde(rename = "T_max")]
    pub t_max: usize,
    #[serde(default)]
    pub eta_min: f64,
}

#[derive(Debug, Clone)]
pub struct CosineAnnealingLR {
    base_lr: f64,
    last_lr: f64,
    args: CosineAnnealingLRArgs,
}

impl CosineAnnealingLR {
    pub const NAME: &'static str = "CosineAnnealingLR";

    pub fn new(
        optimizer: &dyn Optimizer,
        args: CosineAnnealingLRArgs,
    ) -> Result<Self, ResolveError> {
        if args.t_max == 0 {
            return Err(construction(Self::NAME, "T_max must be at least 1"));
        }
        let base_lr = optimizer.lr();
        Ok(Self {
            base_lr,
            last_lr: base_lr,
            args,
        })
    }

    fn lr_at(&self, epoch: usize) -> f64 {
        let progress = epoch as f64 / self.args.t_max as f64;
        let eta_min = self.args.eta_min;
        eta_min + (self.base_lr - eta_min) * (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0
    }
}

macro_rules! impl_closed_form {
    ($ty:ident) => {
        impl $ty {
            pub fn from_kwargs(
                optimizer: &dyn Optimizer,
                kwargs: &Kwargs,
            ) -> Result<Self, ResolveError> {
                Self::new(optimizer, parse_kwargs(Self::NAME, kwargs)?)
            }
        }

        impl LrScheduler for $ty {
            fn name(&self) -> &'static str {
                Self::NAME
            }

            fn step(&mut self, epoch: usize, optimizer: &mut dyn Optimizer) {
                self.last_lr = self.lr_at(epoch);
                optimizer.set_lr(self.last_lr);
            }

            fn get_lr(&self) -> f64 {
                self.last_lr
            }
        }
    };
}

impl_closed_form!(StepLR);
impl_closed_form!(MultiStepLR);
impl_closed_form!(ExponentialLR);
impl_closed_form!(CosineAnnealingLR);

fn construction(component: &str, message: &str) -> ResolveError {
    ResolveError::Construction {
        component: component.to_string(),
        message: message.to_string(),
    }
}
