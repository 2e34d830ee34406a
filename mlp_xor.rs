use std::path::PathBuf;

use cg_backprop::architecture::{load_architecture, ArchitectureConfig};
use cg_backprop::config::load_config;
use cg_backprop::utils::{Activation, SimpleRng};
use cg_backprop::{train, Loss, TrainingConfig};
use clap::Parser;
use log::info;
use ndarray::{array, Array2};

// XOR with a 2-2-1 sigmoid network trained by conjugate gradient.
#[derive(Parser, Debug)]
#[command(name = "mlp_xor", about = "Train a small sigmoid network on XOR")]
struct Args {
    /// Training iterations (default 10, or the value from --config)
    #[arg(long)]
    iterations: Option<usize>,

    /// Loss to minimize: cross_entropy or lin_squared_err
    #[arg(long)]
    loss: Option<Loss>,

    /// Seed for initialization and shuffling (clock-seeded when absent)
    #[arg(long)]
    seed: Option<u64>,

    /// Training configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Architecture JSON file replacing the default 2-2-1 network
    #[arg(long)]
    architecture: Option<PathBuf>,
}

fn xor_data() -> (Array2<f64>, Array2<f64>) {
    let inputs = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
    let targets = array![[0.0], [1.0], [1.0], [0.0]];
    (inputs, targets)
}

fn training_config(args: &Args) -> cg_backprop::Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => TrainingConfig {
            max_iterations: 10,
            loss: Loss::CrossEntropy,
            ..TrainingConfig::default()
        },
    };
    if let Some(iterations) = args.iterations {
        config.max_iterations = iterations;
    }
    if let Some(loss) = args.loss {
        config.loss = loss;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn architecture(args: &Args, loss: Loss) -> cg_backprop::Result<ArchitectureConfig> {
    match &args.architecture {
        Some(path) => load_architecture(path),
        None => Ok(ArchitectureConfig::from_sizes(
            vec![2, 2, 1],
            vec![Activation::Sigmoid, Activation::Sigmoid, loss.required_activation()],
        )),
    }
}

fn main() -> cg_backprop::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = training_config(&args)?;
    let mut rng = match config.seed {
        Some(seed) => SimpleRng::new(seed),
        None => SimpleRng::from_time(),
    };
    let mut network = architecture(&args, config.loss)?.build_network(&mut rng)?;
    info!(
        "Network with {} layers and {} parameters, loss {}",
        network.num_layers(),
        network.parameter_count(),
        config.loss
    );

    let (inputs, targets) = xor_data();
    let report = train(&mut network, inputs.view(), targets.view(), &config)?;
    if let Some(last) = report.batch_losses.last() {
        info!("Final batch loss: {last:.6}");
    }

    let predictions = network.forward(inputs.view())?;
    for (input, (target, prediction)) in inputs
        .rows()
        .into_iter()
        .zip(targets.rows().into_iter().zip(predictions.rows()))
    {
        info!(
            "Input: {:.1}, {:.1}, Expected Output: {:.1}, Predicted Output: {:.3}",
            input[0], input[1], target[0], prediction[0]
        );
    }

    Ok(())
}
