// Demonstration: train a feature-acquisition agent on a synthetic dataset.
//
// Build/run from this repo root:
//   cargo run --example acquisition_demo -- --episodes 3000 --seed 7
//   cargo run --example acquisition_demo -- --config run.json --save-dir ddqn_models
//   cargo run --features nn --example acquisition_demo -- --mlp
//
// Logging is controlled through RUST_LOG (e.g. RUST_LOG=feature_acquisition=debug).

use std::env;
use std::path::PathBuf;
use std::process;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use feature_acquisition::{
    predictor::{pretrain_predictor, PretrainConfig},
    trace_episode, Dataset, DoubleDqnAgent, FeatureAcquisitionEnv, LinearQFunction, Mode,
    Predictor, QFunction, SoftmaxRegression, SplitConfig, Trainer, TrainingConfig,
};

const N_FEATURES: usize = 10;
const N_CLASSES: usize = 3;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> feature_acquisition::Result<()> {
    let args: Vec<String> = env::args().collect();

    let mut config = match arg_value(&args, "--config") {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig {
            val_interval: 200,
            patience: 20,
            max_episode: 1500,
            batch_size: 32,
            lr: 1e-2,
            predictor_lr: 5e-2,
            train_predictor: true,
            ..TrainingConfig::default()
        },
    };
    if let Some(dir) = arg_value(&args, "--save-dir") {
        config.save_dir = PathBuf::from(dir);
    }
    if let Some(limit) = arg_value(&args, "--episodes").and_then(|s| s.parse().ok()) {
        config.max_episodes = Some(limit);
    }
    if let Some(seed) = arg_value(&args, "--seed").and_then(|s| s.parse().ok()) {
        config.seed = seed;
    }
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let dataset = synthetic_dataset(1500, &mut rng)?;
    println!(
        "Dataset: {} train / {} val / {} test, {} features, {} classes",
        dataset.train.len(),
        dataset.val.len(),
        dataset.test.len(),
        dataset.n_features(),
        dataset.n_classes()
    );

    if args.iter().any(|a| a == "--mlp") {
        return run_mlp(dataset, config, &mut rng);
    }

    let predictor = SoftmaxRegression::with_rng(
        N_FEATURES,
        N_CLASSES,
        config.predictor_lr_schedule(),
        config.predictor_weight_decay,
        &mut rng,
    );
    let online = LinearQFunction::with_rng(
        2 * N_FEATURES,
        N_FEATURES + 1,
        config.agent_lr_schedule(),
        config.weight_decay,
        &mut rng,
    );
    let target = online.clone();
    train_and_report(dataset, predictor, online, target, config, &mut rng)
}

#[cfg(feature = "nn")]
fn run_mlp(
    dataset: Dataset,
    config: TrainingConfig,
    rng: &mut StdRng,
) -> feature_acquisition::Result<()> {
    use feature_acquisition::predictor::MlpPredictor;
    use feature_acquisition::qfunction::MlpQFunction;
    use tch::Device;

    let predictor = MlpPredictor::new(
        N_FEATURES,
        config.predictor_hidden_dim,
        N_CLASSES,
        config.predictor_lr_schedule(),
        config.predictor_weight_decay,
        Device::cuda_if_available(),
    )?;
    let q = |config: &TrainingConfig| {
        MlpQFunction::new(
            2 * N_FEATURES,
            config.hidden_dim,
            N_FEATURES + 1,
            config.agent_lr_schedule(),
            config.weight_decay,
            Device::cuda_if_available(),
        )
    };
    let online = q(&config)?;
    let target = q(&config)?;
    train_and_report(dataset, predictor, online, target, config, rng)
}

#[cfg(not(feature = "nn"))]
fn run_mlp(
    _dataset: Dataset,
    _config: TrainingConfig,
    _rng: &mut StdRng,
) -> feature_acquisition::Result<()> {
    eprintln!(
        "--mlp requires the 'nn' feature.\n\
Run:\n\
  cargo run --features nn --example acquisition_demo -- --mlp"
    );
    process::exit(2);
}

fn train_and_report<P, Q>(
    dataset: Dataset,
    mut predictor: P,
    online: Q,
    target: Q,
    config: TrainingConfig,
    rng: &mut StdRng,
) -> feature_acquisition::Result<()>
where
    P: Predictor,
    Q: QFunction,
{
    let pretrain = pretrain_predictor(&mut predictor, &dataset, &PretrainConfig::default(), rng)?;
    println!(
        "Pretrained predictor: {} epochs, masked val accuracy {:.3}",
        pretrain.epochs_run, pretrain.best_val_accuracy
    );

    let env = FeatureAcquisitionEnv::new(dataset, predictor, config.env_config(), rng.gen())?;
    let agent = DoubleDqnAgent::new(online, target, rng.gen())?;
    let mut trainer = Trainer::new(env, agent, config)?;
    let report = trainer.train()?;
    println!("{report}");

    let (mut env, mut agent) = trainer.into_parts();
    let samples = env.dataset().test.len().min(5);
    for index in 0..samples {
        let trace = trace_episode(&mut env, &mut agent, Mode::Test, index)?;
        print!("{trace}");
    }
    Ok(())
}

/// Three Gaussian clusters; only features 0, 3 and 7 carry class signal.
fn synthetic_dataset(n: usize, rng: &mut StdRng) -> feature_acquisition::Result<Dataset> {
    let informative = [0, 3, 7];
    let mut features = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let class = rng.gen_range(0..N_CLASSES);
        let row: Vec<f64> = (0..N_FEATURES)
            .map(|f| {
                let noise = rng.gen_range(-0.5..0.5);
                match informative.iter().position(|&i| i == f) {
                    Some(k) if k == class => 1.0 + noise,
                    Some(_) => noise * 0.5,
                    None => noise,
                }
            })
            .collect();
        features.push(row);
        labels.push(class);
    }

    let mut dataset = Dataset::split(features, labels, N_CLASSES, SplitConfig::default(), rng)?;
    dataset.train.oversample_minority(rng);
    let names = (0..N_FEATURES)
        .map(|f| {
            if informative.contains(&f) {
                format!("signal_{f}")
            } else {
                format!("noise_{f}")
            }
        })
        .collect();
    dataset.with_feature_names(names)
}

fn arg_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
