use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::{LevelFilter, info};

use arena_mlp::train::{self, FitConfig};
use arena_mlp::{Arena, CostFunction, Lfsr113, Network, TrainConfig, format, mnist};

fn cli() -> Command {
    Command::new("arena-mlp")
        .version(clap::crate_version!())
        .about("Train a sigmoid MLP on MNIST with mini-batch gradient descent")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON config file; flags below override its values")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("save")
                .short('s')
                .long("save")
                .help("Write the trained network to this file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("load")
                .short('l')
                .long("load")
                .help("Start from a saved network instead of a random one")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("hidden_layer")
                .long("hidden-layer")
                .help("Hidden layer width of a new network [default: 100]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("epochs")
                .long("epochs")
                .help("Number of training epochs [default: 0]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .help("Mini-batch size; must divide the training set size [default: 10]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("learning_rate")
                .long("learning-rate")
                .help("Learning rate [default: 1.0]")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("regularization")
                .long("regularization")
                .help("L2 regularization strength [default: 5.0]")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("cost")
                .long("cost")
                .help("Cost function of a new network [default: cross_entropy]")
                .value_parser(["quadratic", "cross_entropy"]),
        )
        .arg(
            Arg::new("data_dir")
                .short('d')
                .long("data-dir")
                .help("Directory with the MNIST IDX files [default: .]")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("training_size")
                .long("training-size")
                .help("Examples of the training file to train on [default: 50000]")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Random seed [default: 987654321]")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("arena_mb")
                .long("arena-mb")
                .help("Arena capacity in MiB [default: 1024]")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn apply_overrides(config: &mut TrainConfig, matches: &ArgMatches) {
    if let Some(path) = matches.get_one::<PathBuf>("save") {
        config.save_network = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("load") {
        config.load_network = Some(path.clone());
    }
    if let Some(&width) = matches.get_one::<usize>("hidden_layer") {
        config.hidden_layer = width;
    }
    if let Some(&epochs) = matches.get_one::<usize>("epochs") {
        config.epochs = epochs;
    }
    if let Some(&size) = matches.get_one::<usize>("batch") {
        config.batch_size = size;
    }
    if let Some(&rate) = matches.get_one::<f32>("learning_rate") {
        config.learning_rate = rate;
    }
    if let Some(&lambda) = matches.get_one::<f32>("regularization") {
        config.regularization = lambda;
    }
    if let Some(cost) = matches.get_one::<String>("cost") {
        config.cost = match cost.as_str() {
            "quadratic" => CostFunction::Quadratic,
            _ => CostFunction::CrossEntropy,
        };
    }
    if let Some(dir) = matches.get_one::<PathBuf>("data_dir") {
        config.data_dir = dir.clone();
    }
    if let Some(&size) = matches.get_one::<usize>("training_size") {
        config.training_size = size;
    }
    if let Some(&seed) = matches.get_one::<u32>("seed") {
        config.seed = seed;
    }
    if let Some(&mb) = matches.get_one::<usize>("arena_mb") {
        config.arena_megabytes = mb;
    }
}

fn run(config: &TrainConfig) -> Result<()> {
    let mut arena = Arena::with_megabytes(config.arena_megabytes);
    let mut rng = Lfsr113::new(config.seed);

    let (train_file, test) = mnist::load_standard(&config.data_dir)
        .with_context(|| format!("loading MNIST from {}", config.data_dir.display()))?;
    if train_file.len() < config.training_size {
        bail!(
            "training file has {} examples, fewer than training_size {}",
            train_file.len(),
            config.training_size
        );
    }
    let (train_set, held_out) = train_file.split_at(config.training_size);
    info!(
        "{} training examples ({} held out), {} test examples",
        train_set.len(),
        held_out.len(),
        test.len()
    );

    let network = match &config.load_network {
        Some(path) => format::load_network_file(&mut arena, path)
            .with_context(|| format!("loading network {}", path.display()))?,
        None => Network::new(
            &mut arena,
            &mut rng,
            &[train_set.input_dim(), config.hidden_layer, mnist::CLASSES],
            config.cost,
        )?,
    };
    info!(
        "network {:?} ({:?}), {} parameters",
        network.layers(),
        network.cost(),
        network.parameter_count()
    );

    let report = train::fit(
        &mut arena,
        &mut rng,
        &network,
        &train_set,
        &test,
        FitConfig::from(config),
    )?;
    info!(
        "final success rate {:.2}% after {} epoch(s)",
        100.0 * report.final_success_rate(),
        report.epochs.len()
    );

    if let Some(path) = &config.save_network {
        format::save_network_file(path, &arena, &network)
            .with_context(|| format!("saving network {}", path.display()))?;
    }

    arena.check_empty();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("ARENA_MLP_LOG", "info"))
        .init();

    let matches = cli().get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => TrainConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => TrainConfig::default(),
    };
    apply_overrides(&mut config, &matches);
    config.validate().context("invalid configuration")?;

    run(&config)
}
