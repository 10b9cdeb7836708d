//! The epoch loop: best-model tracking, checkpoints, resumption, and
//! learning-rate stepping around a user-supplied per-epoch hook.

use crate::checkpoint::{self, BEST_FILENAME, CONFIG_FILENAME, Checkpoint};
use crate::config::{Config, MonitorMode};
use crate::device::Device;
use crate::error::{LatheError, Result, TrainerError};
use crate::history::{EpochLog, TrainingHistory};
use crate::model::Model;
use crate::optim::{LrScheduler, Optimizer, get_optimizer};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a per-epoch hook can touch.
pub struct EpochContext<'a> {
    pub model: &'a mut dyn Model,
    pub optimizer: &'a mut dyn Optimizer,
    pub device: Device,
}

/// The computation for one epoch.
///
/// Implementations run the forward and backward passes over their data and
/// return the epoch's metrics. The log must contain `loss` and the monitored
/// metric.
pub trait EpochHook {
    fn train_epoch(&mut self, epoch: usize, ctx: EpochContext<'_>) -> Result<EpochLog>;
}

impl<F> EpochHook for F
where
    F: FnMut(usize, EpochContext<'_>) -> Result<EpochLog>,
{
    fn train_epoch(&mut self, epoch: usize, ctx: EpochContext<'_>) -> Result<EpochLog> {
        self(epoch, ctx)
    }
}

/// Construction options beyond the configuration.
#[derive(Debug, Clone, Default)]
pub struct TrainerOptions {
    /// Device resolved beforehand, see [`crate::device::resolve_device`].
    pub device: Device,
    /// Checkpoint to resume from.
    pub resume: Option<PathBuf>,
    /// History that receives every epoch log and is saved with checkpoints.
    pub history: Option<TrainingHistory>,
    /// Run directory name under `save_dir/name`; defaults to `MMDD_HHMM`.
    pub run_id: Option<String>,
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs_run: usize,
    pub monitor_best: f64,
    /// Epoch of the last new best in this run, if any.
    pub best_epoch: Option<usize>,
    /// Every checkpoint file written, in order.
    pub checkpoints: Vec<PathBuf>,
}

/// Drives training for a configured experiment.
pub struct Trainer<H> {
    config: Config,
    model: Box<dyn Model>,
    hook: H,
    optimizer: Box<dyn Optimizer>,
    lr_scheduler: Option<Box<dyn LrScheduler>>,
    lr_step_freq: usize,
    history: Option<TrainingHistory>,
    device: Device,

    name: String,
    epochs: usize,
    save_freq: usize,
    verbosity: u8,
    monitor: String,
    monitor_mode: MonitorMode,

    monitor_best: f64,
    start_epoch: usize,
    checkpoint_dir: PathBuf,
}

impl<H: EpochHook> Trainer<H> {
    /// Bind the model to the device, build optimizer and scheduler, create the
    /// run directory with its config snapshot, and resume if requested.
    pub fn new(
        mut model: Box<dyn Model>,
        hook: H,
        config: Config,
        options: TrainerOptions,
    ) -> Result<Self> {
        config.validate()?;

        let device = options.device;
        model.to_device(device);

        let (optimizer, lr_scheduler) = get_optimizer(model.parameters(), &config.optimizer)?;
        let lr_step_freq = config
            .optimizer
            .lr_scheduler
            .as_ref()
            .map_or(1, |s| s.step_freq);

        let trainer_cfg = &config.trainer;
        let run_id = options
            .run_id
            .unwrap_or_else(|| chrono::Local::now().format("%m%d_%H%M").to_string());
        let checkpoint_dir = trainer_cfg.save_dir.join(&config.name).join(run_id);
        std::fs::create_dir_all(&checkpoint_dir)?;
        config.save_snapshot(&checkpoint_dir.join(CONFIG_FILENAME))?;

        let mut trainer = Self {
            name: config.name.clone(),
            epochs: trainer_cfg.epochs,
            save_freq: trainer_cfg.save_freq,
            verbosity: trainer_cfg.verbosity,
            monitor: trainer_cfg.monitor.clone(),
            monitor_mode: trainer_cfg.monitor_mode,
            monitor_best: trainer_cfg.monitor_mode.initial_best(),
            start_epoch: 1,
            checkpoint_dir,
            config,
            model,
            hook,
            optimizer,
            lr_scheduler,
            lr_step_freq,
            history: options.history,
            device,
        };
        info!(
            experiment = %trainer.name,
            device = %device,
            dir = %trainer.checkpoint_dir.display(),
            "Trainer initialized"
        );

        if let Some(path) = options.resume {
            trainer.resume_checkpoint(&path)?;
        }
        Ok(trainer)
    }

    /// Run epochs `start_epoch..=epochs`.
    ///
    /// Any hook failure aborts the run; checkpoints already written stay on
    /// disk.
    pub fn train(&mut self) -> Result<TrainingSummary> {
        let mut summary = TrainingSummary {
            epochs_run: 0,
            monitor_best: self.monitor_best,
            best_epoch: None,
            checkpoints: Vec::new(),
        };

        for epoch in self.start_epoch..=self.epochs {
            let ctx = EpochContext {
                model: self.model.as_mut(),
                optimizer: self.optimizer.as_mut(),
                device: self.device,
            };
            let log = self
                .hook
                .train_epoch(epoch, ctx)
                .map_err(|source| TrainerError::EpochFailed {
                    epoch,
                    source: Box::new(source),
                })?;
            let loss = require(&log, epoch, "loss")?;
            let monitored = require(&log, epoch, &self.monitor)?;

            if let Some(history) = self.history.as_mut() {
                history.add_entry(log.clone());
                if self.verbosity >= 1 {
                    for (key, value) in log.iter() {
                        info!("    {key:15}: {value}");
                    }
                }
            }

            if self.is_new_best(monitored) {
                self.monitor_best = monitored;
                summary.best_epoch = Some(epoch);
                let path = self.save_checkpoint(epoch, loss, true)?;
                summary.checkpoints.push(path);
            }

            if epoch % self.save_freq == 0 {
                let path = self.save_checkpoint(epoch, loss, false)?;
                summary.checkpoints.push(path);
            }

            if let Some(scheduler) = self.lr_scheduler.as_mut() {
                if epoch % self.lr_step_freq == 0 {
                    scheduler.step(epoch, self.optimizer.as_mut());
                    info!(epoch, "New Learning Rate: {:.6}", scheduler.get_lr());
                }
            }

            summary.epochs_run += 1;
        }

        summary.monitor_best = self.monitor_best;
        Ok(summary)
    }

    /// Strict improvement over the best monitored value so far.
    pub fn is_new_best(&self, value: f64) -> bool {
        self.monitor_mode.is_improvement(value, self.monitor_best)
    }

    fn snapshot(&self, epoch: usize) -> Checkpoint {
        Checkpoint {
            arch: self.model.arch().to_string(),
            epoch,
            logger: self.history.clone(),
            state_dict: self.model.state_dict(),
            optimizer: self.optimizer.state_dict(),
            monitor_best: self.monitor_best,
            config: self.config.clone(),
        }
    }

    /// Save a checkpoint for `epoch`; a best-flagged save ends up as
    /// `model_best.pth.tar`. Returns the final path.
    pub fn save_checkpoint(&self, epoch: usize, loss: f64, save_best: bool) -> Result<PathBuf> {
        let state = self.snapshot(epoch);
        let path = self
            .checkpoint_dir
            .join(checkpoint::checkpoint_filename(epoch, loss));
        if save_best {
            let best = state.save_best(&path)?;
            info!(epoch, "Saving current best: {BEST_FILENAME} ...");
            Ok(best)
        } else {
            state.save(&path)?;
            info!(epoch, "Saving checkpoint: {} ...", path.display());
            Ok(path)
        }
    }

    /// Restore run state from a checkpoint.
    ///
    /// The checkpoint's configuration replaces the current one; loop settings
    /// read at construction are kept.
    pub fn resume_checkpoint(&mut self, path: &Path) -> Result<()> {
        info!("Loading checkpoint: {} ...", path.display());
        let checkpoint = Checkpoint::load(path)?;

        if checkpoint.arch != self.model.arch() {
            warn!(
                saved = %checkpoint.arch,
                current = %self.model.arch(),
                "Checkpoint architecture differs from the model being trained"
            );
        }

        self.model.load_state_dict(checkpoint.state_dict)?;
        self.model.to_device(self.device);
        self.optimizer.load_state_dict(checkpoint.optimizer)?;
        self.optimizer.to_device(self.device);

        self.start_epoch = checkpoint.epoch + 1;
        self.monitor_best = checkpoint.monitor_best;
        self.history = checkpoint.logger;
        self.config = checkpoint.config;

        info!(
            "Checkpoint '{}' (epoch {}) loaded",
            path.display(),
            self.start_epoch
        );
        Ok(())
    }

    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    pub fn monitor_best(&self) -> f64 {
        self.monitor_best
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn into_parts(self) -> (Box<dyn Model>, H) {
        (self.model, self.hook)
    }
}

fn require(log: &EpochLog, epoch: usize, metric: &str) -> std::result::Result<f64, LatheError> {
    log.get(metric).ok_or_else(|| {
        TrainerError::MissingMetric {
            epoch,
            metric: metric.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::tensor::{Parameters, Tensor};
    use tempfile::TempDir;

    struct Scalar {
        params: Parameters,
    }

    impl Scalar {
        fn boxed() -> Box<dyn Model> {
            let mut params = Parameters::new();
            params.insert("w", Tensor::vector(vec![0.0]));
            Box::new(Self { params })
        }
    }

    impl Model for Scalar {
        fn arch(&self) -> &str {
            "Scalar"
        }

        fn parameters(&self) -> &Parameters {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut Parameters {
            &mut self.params
        }

        fn forward(&self, input: &Tensor) -> std::result::Result<Tensor, ModelError> {
            let w = self.params.get("w").map_or(0.0, |t| t.data()[0]);
            Ok(input.map(|x| x * w))
        }
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = crate::config::tests::sample();
        config.trainer.save_dir = dir.path().to_path_buf();
        config.optimizer.lr_scheduler = None;
        config
    }

    fn hook<F>(f: F) -> F
    where
        F: FnMut(usize, EpochContext<'_>) -> Result<EpochLog>,
    {
        f
    }

    fn constant_loss() -> impl EpochHook {
        hook(|_, _| Ok(EpochLog::new().with("loss", 1.0)))
    }

    fn options(run_id: &str) -> TrainerOptions {
        TrainerOptions {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_writes_config_snapshot() {
        let dir = TempDir::new().unwrap();
        let trainer =
            Trainer::new(Scalar::boxed(), constant_loss(), config(&dir), options("run")).unwrap();

        let expected = dir.path().join("Mnist_LeNet").join("run");
        assert_eq!(trainer.checkpoint_dir(), expected);
        let snapshot: Config =
            serde_json::from_slice(&std::fs::read(expected.join(CONFIG_FILENAME)).unwrap()).unwrap();
        assert_eq!(&snapshot, trainer.config());
        assert_eq!(trainer.start_epoch(), 1);
        assert_eq!(trainer.monitor_best(), f64::INFINITY);
    }

    #[test]
    fn test_max_mode_starts_at_negative_infinity() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.trainer.monitor_mode = MonitorMode::Max;
        let trainer = Trainer::new(Scalar::boxed(), constant_loss(), config, options("run")).unwrap();
        assert_eq!(trainer.monitor_best(), f64::NEG_INFINITY);
        assert!(trainer.is_new_best(-1e300));
    }

    #[test]
    fn test_invalid_config_rejected_before_any_io() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.trainer.save_freq = 0;
        let err = Trainer::new(Scalar::boxed(), constant_loss(), config, options("run"))
            .err()
            .unwrap();
        assert!(matches!(err, LatheError::Config(_)));
        assert!(!dir.path().join("Mnist_LeNet").exists());
    }

    #[test]
    fn test_missing_monitor_metric_aborts() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.trainer.monitor = "val_loss".into();
        let mut trainer =
            Trainer::new(Scalar::boxed(), constant_loss(), config, options("run")).unwrap();
        let err = trainer.train().unwrap_err();
        assert!(matches!(
            err,
            LatheError::Trainer(TrainerError::MissingMetric { epoch: 1, ref metric }) if metric == "val_loss"
        ));
    }

    #[test]
    fn test_hook_error_propagates_with_epoch() {
        let dir = TempDir::new().unwrap();
        let failing = hook(|epoch, _| {
            if epoch == 2 {
                Err(ModelError::Forward {
                    message: "diverged".into(),
                }
                .into())
            } else {
                Ok(EpochLog::new().with("loss", 1.0))
            }
        });
        let mut trainer =
            Trainer::new(Scalar::boxed(), failing, config(&dir), options("run")).unwrap();
        let err = trainer.train().unwrap_err();
        assert!(matches!(
            err,
            LatheError::Trainer(TrainerError::EpochFailed { epoch: 2, .. })
        ));
        // The best checkpoint from epoch 1 is still on disk.
        assert!(trainer.checkpoint_dir().join(BEST_FILENAME).exists());
    }

    #[test]
    fn test_hook_sees_bound_model_and_device() {
        let dir = TempDir::new().unwrap();
        let descend = hook(|_, ctx| {
            assert_eq!(ctx.device, Device::Cuda(0));
            let w = ctx.model.parameters().get("w").unwrap();
            assert_eq!(w.device(), Device::Cuda(0));
            let mut grads = Parameters::new();
            grads.insert("w", Tensor::vector(vec![-1.0]));
            ctx.optimizer.step(ctx.model.parameters_mut(), &grads)?;
            Ok(EpochLog::new().with("loss", 1.0))
        });
        let opts = TrainerOptions {
            device: Device::Cuda(0),
            ..options("run")
        };
        let mut trainer = Trainer::new(Scalar::boxed(), descend, config(&dir), opts).unwrap();
        trainer.train().unwrap();
        // SGD lr 0.1, momentum 0.9 over three epochs of gradient -1.
        let w = trainer.model().parameters().get("w").unwrap().data()[0];
        assert!(w > 0.0);
    }
}
