//! Shared fixtures for trainer integration tests.

#![allow(dead_code)]

use lathe_core::error::ModelError;
use lathe_core::{Config, EpochContext, EpochHook, EpochLog, Model, Parameters, Result, Tensor};
use serde_json::json;
use std::path::Path;

/// One-weight model; the weight counts optimizer steps taken.
pub struct Counter {
    params: Parameters,
}

impl Counter {
    pub fn boxed() -> Box<dyn Model> {
        let mut params = Parameters::new();
        params.insert("w", Tensor::vector(vec![0.0]));
        Box::new(Self { params })
    }
}

impl Model for Counter {
    fn arch(&self) -> &str {
        "Counter"
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    fn forward(&self, input: &Tensor) -> std::result::Result<Tensor, ModelError> {
        Ok(input.clone())
    }
}

/// Returns a fixed loss per epoch and records what it observed.
#[derive(Debug, Default)]
pub struct ScriptedHook {
    losses: Vec<f64>,
    pub epochs_seen: Vec<usize>,
    pub lr_seen: Vec<f64>,
}

impl ScriptedHook {
    /// `losses[i]` is reported for epoch `i + 1`.
    pub fn new(losses: &[f64]) -> Self {
        Self {
            losses: losses.to_vec(),
            ..Default::default()
        }
    }
}

impl EpochHook for ScriptedHook {
    fn train_epoch(&mut self, epoch: usize, ctx: EpochContext<'_>) -> Result<EpochLog> {
        self.epochs_seen.push(epoch);
        self.lr_seen.push(ctx.optimizer.lr());

        // Unit gradient so SGD moves the weight by -lr each epoch.
        let mut grads = Parameters::new();
        grads.insert("w", Tensor::vector(vec![1.0]));
        ctx.optimizer.step(ctx.model.parameters_mut(), &grads)?;

        let loss = self.losses[epoch - 1];
        Ok(EpochLog::new().with("loss", loss).with("score", -loss))
    }
}

/// Config with plain SGD (no momentum) and no scheduler.
pub fn config(save_dir: &Path, epochs: usize, save_freq: usize, monitor_mode: &str) -> Config {
    serde_json::from_value(json!({
        "name": "Scripted",
        "cuda": false,
        "gpu": 0,
        "trainer": {
            "epochs": epochs,
            "save_freq": save_freq,
            "verbosity": 1,
            "monitor": "loss",
            "monitor_mode": monitor_mode,
            "save_dir": save_dir
        },
        "optimizer": {
            "type": "SGD",
            "kwargs": {"lr": 0.1}
        },
        "dataset": {
            "type": "templates.CustomDataset",
            "kwargs": {"root": "data/"},
            "transforms": []
        },
        "model": {
            "type": "templates.CustomModel",
            "kwargs": {}
        }
    }))
    .expect("fixture config is valid")
}
