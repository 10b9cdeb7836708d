//! Resolve optimizer and scheduler types from the built-in namespace.

use super::{
    Adam, AdamW, CosineAnnealingLR, ExponentialLR, LrScheduler, MultiStepLR, Optimizer, Sgd,
    StepLR,
};
use crate::config::{OptimizerConfig, SchedulerConfig};
use crate::error::ResolveError;
use crate::tensor::Parameters;
use tracing::debug;

/// Optimizer type names accepted in `optimizer.type`.
pub const OPTIMIZERS: &[&str] = &[Sgd::NAME, Adam::NAME, AdamW::NAME];

/// Scheduler type names accepted in `optimizer.lr_scheduler.type`.
pub const SCHEDULERS: &[&str] = &[
    StepLR::NAME,
    MultiStepLR::NAME,
    ExponentialLR::NAME,
    CosineAnnealingLR::NAME,
];

/// Build the optimizer bound to `params`, then the scheduler bound to it.
///
/// An absent `lr_scheduler` section yields `None`; a present section naming an
/// unknown type is an error.
pub fn get_optimizer(
    params: &Parameters,
    config: &OptimizerConfig,
) -> Result<(Box<dyn Optimizer>, Option<Box<dyn LrScheduler>>), ResolveError> {
    let optimizer: Box<dyn Optimizer> = match config.type_name.as_str() {
        Sgd::NAME => Box::new(Sgd::from_kwargs(params, &config.kwargs)?),
        Adam::NAME => Box::new(Adam::from_kwargs(params, &config.kwargs)?),
        AdamW::NAME => Box::new(AdamW::from_kwargs(params, &config.kwargs)?),
        other => {
            return Err(ResolveError::TypeNotFound {
                kind: "Optimizer",
                name: other.to_string(),
            });
        }
    };
    debug!(
        optimizer = optimizer.name(),
        lr = optimizer.lr(),
        params = params.len(),
        "Constructed optimizer"
    );

    let scheduler = config
        .lr_scheduler
        .as_ref()
        .map(|sched| get_scheduler(optimizer.as_ref(), sched))
        .transpose()?;

    Ok((optimizer, scheduler))
}

/// Build a scheduler bound to `optimizer`.
pub fn get_scheduler(
    optimizer: &dyn Optimizer,
    config: &SchedulerConfig,
) -> Result<Box<dyn LrScheduler>, ResolveError> {
    let scheduler: Box<dyn LrScheduler> = match config.type_name.as_str() {
        StepLR::NAME => Box::new(StepLR::from_kwargs(optimizer, &config.kwargs)?),
        MultiStepLR::NAME => Box::new(MultiStepLR::from_kwargs(optimizer, &config.kwargs)?),
        ExponentialLR::NAME => Box::new(ExponentialLR::from_kwargs(optimizer, &config.kwargs)?),
        CosineAnnealingLR::NAME => {
            Box::new(CosineAnnealingLR::from_kwargs(optimizer, &config.kwargs)?)
        }
        other => {
            return Err(ResolveError::TypeNotFound {
                kind: "Learning rate scheduler",
                name: other.to_string(),
            });
        }
    };
    debug!(
        scheduler = scheduler.name(),
        step_freq = config.step_freq,
        "Constructed learning rate scheduler"
    );
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Kwargs;
    use crate::tensor::Tensor;
    use serde_json::json;

    fn kwargs(value: serde_json::Value) -> Kwargs {
        value.as_object().cloned().unwrap()
    }

    fn params() -> Parameters {
        let mut p = Parameters::new();
        p.insert("weight", Tensor::zeros(&[3]));
        p
    }

    fn optimizer_config(type_name: &str, scheduler: Option<SchedulerConfig>) -> OptimizerConfig {
        OptimizerConfig {
            type_name: type_name.into(),
            kwargs: kwargs(json!({"lr": 0.1})),
            lr_scheduler: scheduler,
        }
    }

    fn step_lr() -> SchedulerConfig {
        SchedulerConfig {
            type_name: "StepLR".into(),
            kwargs: kwargs(json!({"step_size": 1})),
            step_freq: 1,
        }
    }

    #[test]
    fn test_resolves_each_optimizer() {
        for name in OPTIMIZERS {
            let (opt, sched) = get_optimizer(&params(), &optimizer_config(name, None)).unwrap();
            assert_eq!(opt.name(), *name);
            assert_eq!(opt.lr(), 0.1);
            assert!(sched.is_none());
        }
    }

    #[test]
    fn test_scheduler_bound_to_optimizer_lr() {
        let (_, sched) = get_optimizer(&params(), &optimizer_config("SGD", Some(step_lr()))).unwrap();
        let sched = sched.unwrap();
        assert_eq!(sched.name(), "StepLR");
        assert_eq!(sched.get_lr(), 0.1);
    }

    #[test]
    fn test_unknown_optimizer() {
        let err = get_optimizer(&params(), &optimizer_config("RMSprop", None))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ResolveError::TypeNotFound { kind: "Optimizer", ref name } if name == "RMSprop"
        ));
        assert_eq!(err.to_string(), "Optimizer 'RMSprop' not found");
    }

    #[test]
    fn test_unknown_scheduler() {
        let mut sched = step_lr();
        sched.type_name = "OneCycleLR".into();
        let err = get_optimizer(&params(), &optimizer_config("Adam", Some(sched)))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ResolveError::TypeNotFound { kind: "Learning rate scheduler", .. }
        ));
    }

    #[test]
    fn test_every_scheduler_name_resolves() {
        let args = [
            json!({"step_size": 2}),
            json!({"milestones": [2]}),
            json!({"gamma": 0.9}),
            json!({"T_max": 10}),
        ];
        let (opt, _) = get_optimizer(&params(), &optimizer_config("SGD", None)).unwrap();
        for (name, kw) in SCHEDULERS.iter().zip(args) {
            let config = SchedulerConfig {
                type_name: name.to_string(),
                kwargs: kwargs(kw),
                step_freq: 1,
            };
            assert_eq!(get_scheduler(opt.as_ref(), &config).unwrap().name(), *name);
        }
    }
}
