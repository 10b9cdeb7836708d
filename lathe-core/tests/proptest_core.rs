//! Property-based tests for best-model tracking and checkpoint cadence.

mod common;

use common::{Counter, ScriptedHook, config};
use lathe_core::checkpoint::{BEST_FILENAME, checkpoint_filename, list_checkpoints};
use lathe_core::{MonitorMode, Trainer, TrainerOptions};
use proptest::prelude::*;
use tempfile::TempDir;

fn loss_sequences() -> impl Strategy<Value = Vec<f64>> {
    // A small value pool makes ties common.
    prop::collection::vec(prop::sample::select(vec![0.25, 0.5, 1.0, 2.0, 4.0]), 1..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn checkpoints_follow_best_and_save_freq(
        losses in loss_sequences(),
        save_freq in 1usize..4,
        max_mode in any::<bool>(),
    ) {
        let dir = TempDir::new().unwrap();
        let mode = if max_mode { "max" } else { "min" };
        let cfg = config(dir.path(), losses.len(), save_freq, mode);
        let options = TrainerOptions { run_id: Some("prop".into()), ..Default::default() };
        let mut trainer =
            Trainer::new(Counter::boxed(), ScriptedHook::new(&losses), cfg, options).unwrap();
        let summary = trainer.train().unwrap();
        let run_dir = trainer.checkpoint_dir().to_path_buf();

        let monitor_mode = if max_mode { MonitorMode::Max } else { MonitorMode::Min };
        let mut best = monitor_mode.initial_best();
        let mut best_epoch = None;
        let mut expected = Vec::new();
        let mut periodic = Vec::new();
        for (i, &loss) in losses.iter().enumerate() {
            let epoch = i + 1;
            if monitor_mode.is_improvement(loss, best) {
                best = loss;
                best_epoch = Some(epoch);
                expected.push(run_dir.join(BEST_FILENAME));
            }
            if epoch % save_freq == 0 {
                let path = run_dir.join(checkpoint_filename(epoch, loss));
                expected.push(path.clone());
                periodic.push(path);
            }
        }

        prop_assert_eq!(summary.checkpoints, expected);
        prop_assert_eq!(summary.best_epoch, best_epoch);
        prop_assert_eq!(summary.monitor_best, best);
        prop_assert_eq!(summary.epochs_run, losses.len());
        // Exactly the multiples of save_freq are on disk; the best file only if some epoch improved.
        prop_assert_eq!(list_checkpoints(&run_dir).unwrap(), periodic);
        prop_assert_eq!(run_dir.join(BEST_FILENAME).exists(), best_epoch.is_some());
    }

    #[test]
    fn strict_improvement_only(value in -1e6f64..1e6, delta in 0.0f64..1e3) {
        prop_assert!(!MonitorMode::Min.is_improvement(value + delta, value));
        prop_assert!(!MonitorMode::Max.is_improvement(value - delta, value));
        prop_assert!(MonitorMode::Min.is_improvement(value, f64::INFINITY));
        prop_assert!(MonitorMode::Max.is_improvement(value, f64::NEG_INFINITY));
    }
}

proptest! {
    #[test]
    fn checkpoint_filename_layout(epoch in 0usize..5000, loss in 0.0f64..100.0) {
        let name = checkpoint_filename(epoch, loss);
        prop_assert!(name.starts_with("checkpoint-epoch"));
        prop_assert!(name.ends_with(".pth.tar"));
        let digits = &name["checkpoint-epoch".len()..name.find("-loss-").unwrap()];
        prop_assert!(digits.len() >= 3);
        prop_assert_eq!(digits.parse::<usize>().unwrap(), epoch);
        let suffix = format!("-loss-{:.4}.pth.tar", loss);
        prop_assert!(name.ends_with(&suffix));
    }
}
