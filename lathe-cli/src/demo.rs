//! Synthetic linear regression: a dataset, a model and an epoch hook that
//! together exercise the full training pipeline without external data.
//!
//! Registered under `demo.SyntheticRegression` and `demo.LinearRegression`.

use lathe_core::data::{Compose, Dataset, DatasetRegistry, Sample};
use lathe_core::error::{DatasetError, ModelError, ResolveError};
use lathe_core::registry::parse_kwargs;
use lathe_core::{EpochContext, EpochHook, EpochLog, Model, ModelRegistry, Parameters, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::debug;

fn default_samples() -> usize {
    256
}

fn default_features() -> usize {
    4
}

fn default_noise() -> f32 {
    0.05
}

fn default_seed() -> u64 {
    42
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyntheticRegressionArgs {
    #[serde(default = "default_samples")]
    pub n_samples: usize,
    #[serde(default = "default_features")]
    pub n_features: usize,
    /// Half-width of the uniform noise added to each target.
    #[serde(default = "default_noise")]
    pub noise: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// `y = w . x + b + noise` with `x` drawn from `[-1, 1)`.
///
/// The generating weights are drawn from the same seeded generator, so a seed
/// fully determines the dataset.
pub struct SyntheticRegression {
    inputs: Vec<Tensor>,
    targets: Vec<f32>,
    transform: Compose,
}

impl SyntheticRegression {
    pub fn new(args: &SyntheticRegressionArgs, transform: Compose) -> Self {
        let mut rng = StdRng::seed_from_u64(args.seed);
        let weights: Vec<f32> = (0..args.n_features)
            .map(|_| rng.gen_range(-2.0..2.0))
            .collect();
        let bias: f32 = rng.gen_range(-1.0..1.0);

        let mut inputs = Vec::with_capacity(args.n_samples);
        let mut targets = Vec::with_capacity(args.n_samples);
        for _ in 0..args.n_samples {
            let x: Vec<f32> = (0..args.n_features)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect();
            let noise = if args.noise > 0.0 {
                rng.gen_range(-args.noise..args.noise)
            } else {
                0.0
            };
            let y = dot(&weights, &x) + bias + noise;
            inputs.push(Tensor::vector(x));
            targets.push(y);
        }
        debug!(
            samples = args.n_samples,
            features = args.n_features,
            seed = args.seed,
            "Generated synthetic regression data"
        );
        Self {
            inputs,
            targets,
            transform,
        }
    }
}

impl Dataset for SyntheticRegression {
    fn len(&self) -> usize {
        self.inputs.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DatasetError> {
        let (input, target) = self
            .inputs
            .get(index)
            .zip(self.targets.get(index))
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.inputs.len(),
            })?;
        Ok(Sample {
            input: self.transform.apply(input.clone()),
            target: Tensor::scalar(*target),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearRegressionArgs {
    pub in_features: usize,
}

/// `weight . x + bias`, zero-initialised.
pub struct LinearRegression {
    params: Parameters,
}

impl LinearRegression {
    pub const ARCH: &'static str = "LinearRegression";

    pub fn new(in_features: usize) -> Self {
        let mut params = Parameters::new();
        params.insert("weight", Tensor::zeros(&[in_features]));
        params.insert("bias", Tensor::zeros(&[1]));
        Self { params }
    }
}

impl Model for LinearRegression {
    fn arch(&self) -> &str {
        Self::ARCH
    }

    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let (weight, bias) = linear_params(&self.params)?;
        if input.numel() != weight.numel() {
            return Err(ModelError::Forward {
                message: format!(
                    "expected {} input features, got {}",
                    weight.numel(),
                    input.numel()
                ),
            });
        }
        Ok(Tensor::scalar(dot(weight.data(), input.data()) + bias.data()[0]))
    }
}

fn linear_params(params: &Parameters) -> Result<(&Tensor, &Tensor), ModelError> {
    match (params.get("weight"), params.get("bias")) {
        (Some(w), Some(b)) if b.numel() == 1 => Ok((w, b)),
        _ => Err(ModelError::StateMismatch {
            message: "linear model needs 'weight' and a one-element 'bias'".into(),
        }),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Mini-batch gradient descent on mean squared error.
///
/// Gradients are computed in closed form for a linear model, so the model
/// must carry `weight` and `bias` parameters.
pub struct RegressionHook {
    dataset: Box<dyn Dataset>,
    batch_size: usize,
    rng: StdRng,
}

impl RegressionHook {
    pub fn new(dataset: Box<dyn Dataset>, seed: u64) -> Self {
        Self {
            dataset,
            batch_size: default_batch_size(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl EpochHook for RegressionHook {
    fn train_epoch(&mut self, epoch: usize, ctx: EpochContext<'_>) -> lathe_core::Result<EpochLog> {
        let len = self.dataset.len();
        if len == 0 {
            return Err(DatasetError::Load {
                message: "dataset has no samples".into(),
            }
            .into());
        }
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);

        let mut squared = 0.0f64;
        let mut absolute = 0.0f64;
        for batch in order.chunks(self.batch_size) {
            let (weight, _) = linear_params(ctx.model.parameters())?;
            let mut grad_w = vec![0.0f32; weight.numel()];
            let mut grad_b = 0.0f32;
            let scale = 2.0 / batch.len() as f32;

            for &index in batch {
                let sample = self.dataset.get(index)?;
                let pred = ctx.model.forward(&sample.input)?.data()[0];
                let err = pred - sample.target.data()[0];
                squared += f64::from(err * err);
                absolute += f64::from(err.abs());
                for (g, x) in grad_w.iter_mut().zip(sample.input.data()) {
                    *g += scale * err * x;
                }
                grad_b += scale * err;
            }

            let mut grads = Parameters::new();
            grads.insert("weight", Tensor::vector(grad_w));
            grads.insert("bias", Tensor::vector(vec![grad_b]));
            ctx.optimizer.step(ctx.model.parameters_mut(), &grads)?;
        }

        let n = len as f64;
        debug!(epoch, batches = len.div_ceil(self.batch_size), "Epoch finished");
        Ok(EpochLog::new()
            .with("loss", squared / n)
            .with("mae", absolute / n))
    }
}

/// Add the demo components to the given registries.
pub fn register(models: &mut ModelRegistry, datasets: &mut DatasetRegistry) -> Result<(), ResolveError> {
    models.register("demo.LinearRegression", |_, kwargs| {
        let args: LinearRegressionArgs = parse_kwargs(LinearRegression::ARCH, kwargs)?;
        Ok(Box::new(LinearRegression::new(args.in_features)))
    })?;
    datasets.register("demo.SyntheticRegression", |transform, kwargs| {
        let args: SyntheticRegressionArgs = parse_kwargs("SyntheticRegression", kwargs)?;
        Ok(Box::new(SyntheticRegression::new(&args, transform)))
    })?;
    Ok(())
}
