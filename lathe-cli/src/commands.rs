//! CLI subcommand handlers.

use crate::Commands;
use crate::demo::{self, RegressionHook};
use lathe_core::checkpoint::{self, Checkpoint};
use lathe_core::data::{
    DatasetRegistry, TransformRegistry, default_dataset_registry, default_transform_registry,
    get_dataset,
};
use lathe_core::device::VisibleDevices;
use lathe_core::model::{default_model_registry, get_model_instance};
use lathe_core::optim::{OPTIMIZERS, SCHEDULERS};
use lathe_core::{ModelRegistry, Trainer, TrainerOptions, TrainingHistory, TrainingSummary};
use std::path::{Path, PathBuf};
use tracing::info;

/// Seed for the demo hook's batch shuffling.
const SHUFFLE_SEED: u64 = 0;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Train {
            config,
            resume,
            run_id,
        } => {
            let summary = train(&config, resume, run_id)?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Inspect { checkpoint } => inspect(&checkpoint),
        Commands::Components => {
            list_components()?;
            Ok(())
        }
    }
}

/// Registries holding the templates, the built-in transforms and the demo.
pub fn registries() -> anyhow::Result<(ModelRegistry, DatasetRegistry, TransformRegistry)> {
    let mut models = default_model_registry()?;
    let mut datasets = default_dataset_registry()?;
    demo::register(&mut models, &mut datasets)?;
    Ok((models, datasets, default_transform_registry()?))
}

/// Build every configured component and run the trainer.
pub fn train(
    config_path: &Path,
    resume: Option<PathBuf>,
    run_id: Option<String>,
) -> anyhow::Result<TrainingSummary> {
    let config = lathe_core::load_config(config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    info!(config = %config_path.display(), experiment = %config.name, "Loaded configuration");

    let device = lathe_core::resolve_device(config.cuda, config.gpu, &VisibleDevices::from_env());
    let (models, datasets, transforms) = registries()?;
    let dataset = get_dataset(&config.dataset, &datasets, &transforms)?;
    let model = get_model_instance(&config.model, &models)?;
    info!(
        arch = model.arch(),
        samples = dataset.len(),
        params = model.parameters().numel(),
        "Built model and dataset"
    );

    let hook = RegressionHook::new(dataset, SHUFFLE_SEED);
    let options = TrainerOptions {
        device,
        resume,
        history: Some(TrainingHistory::new()),
        run_id,
    };
    let mut trainer = Trainer::new(model, hook, config, options)?;
    let summary = trainer.train()?;
    info!(
        dir = %trainer.checkpoint_dir().display(),
        epochs = summary.epochs_run,
        "Training finished"
    );
    Ok(summary)
}

fn print_summary(summary: &TrainingSummary) {
    println!("Epochs run:   {}", summary.epochs_run);
    println!("Monitor best: {}", summary.monitor_best);
    match summary.best_epoch {
        Some(epoch) => println!("Best epoch:   {epoch}"),
        None => println!("Best epoch:   (no improvement this run)"),
    }
    for path in &summary.checkpoints {
        println!("  saved {}", path.display());
    }
}

/// Print a checkpoint's contents, or list the checkpoints in a run directory.
fn inspect(path: &Path) -> anyhow::Result<()> {
    if path.is_dir() {
        let files = checkpoint::list_checkpoints(path)?;
        if files.is_empty() {
            println!("No checkpoints in {}", path.display());
        }
        for file in files {
            println!("{}", file.display());
        }
        let best = path.join(checkpoint::BEST_FILENAME);
        if best.exists() {
            println!("{} (best)", best.display());
        }
        return Ok(());
    }

    let ckpt = Checkpoint::load(path)?;
    println!("Checkpoint:   {}", path.display());
    println!("Experiment:   {}", ckpt.config.name);
    println!("Arch:         {}", ckpt.arch);
    println!("Epoch:        {}", ckpt.epoch);
    println!("Monitor best: {} ({})", ckpt.monitor_best, ckpt.config.trainer.monitor);
    println!(
        "Optimizer:    {} (lr {}, {} steps)",
        ckpt.optimizer.optimizer, ckpt.optimizer.lr, ckpt.optimizer.step
    );
    println!("Parameters:");
    for (name, tensor) in ckpt.state_dict.iter() {
        println!("  {name:15} {:?}", tensor.shape());
    }
    if let Some(last) = ckpt.logger.as_ref().and_then(|h| h.last()) {
        println!("Last epoch log:");
        for (key, value) in last.iter() {
            println!("    {key:15}: {value}");
        }
    }
    Ok(())
}

fn list_components() -> anyhow::Result<()> {
    let (models, datasets, transforms) = registries()?;
    println!("Models:");
    for path in models.list_paths() {
        println!("  {path}");
    }
    println!("Datasets:");
    for path in datasets.list_paths() {
        println!("  {path}");
    }
    println!("Transforms:");
    for path in transforms.list_paths() {
        println!("  {path}");
    }
    println!("Optimizers:   {}", OPTIMIZERS.join(", "));
    println!("Schedulers:   {}", SCHEDULERS.join(", "));
    Ok(())
}
