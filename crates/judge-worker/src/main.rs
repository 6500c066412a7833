// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::path::PathBuf;

use bollard::Docker;
use clap::{Parser, Subcommand};
use influence_estimator::{estimate, DiffusionModel, EstimateRequest};
use judge_worker::config::Config;
use judge_worker::control_plane;

/// CARP/IMP judging worker. With no subcommand, connects to the dispatcher and runs the judge
/// slot pool until killed (§6 CLI surface: configuration comes from environment / config file,
/// not flags).
#[derive(Parser)]
#[command(name = "judge-worker", version)]
struct Cli {
    /// Overrides the config file path ($JUDGE_WORKER_CONFIG, default ./judge-worker.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Influence Spread Estimation: standalone invocation of the reference solver (C4), grounded
    /// in the original implementation's `ie.py` script.
    Ise {
        /// Path to the network file (network file format: `V E` then `E` `u v w` lines).
        network: PathBuf,
        /// Path to the seeds file (one external vertex id per line).
        seeds: PathBuf,
        /// Expected seed count; 0 disables the count check.
        #[arg(long, default_value_t = 0)]
        seed_count: usize,
        /// Diffusion model: IC or LT.
        #[arg(long, default_value = "IC")]
        model: String,
        /// Sampler worker count; defaults to the host's CPU count.
        #[arg(long)]
        workers: Option<usize>,
        /// RNG seed for reproducible estimates.
        #[arg(long, default_value_t = 0)]
        random_seed: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Ise {
            network,
            seeds,
            seed_count,
            model,
            workers,
            random_seed,
        }) => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
            run_ise(network, seeds, seed_count, &model, workers, random_seed);
        }
        None => {
            let config_path = Config::resolve_path(cli.config.as_deref());
            let config = Config::load(&config_path).unwrap_or_else(|err| {
                eprintln!("failed to load configuration from {}: {err}", config_path.display());
                std::process::exit(1);
            });

            env_logger::Builder::from_env(
                env_logger::Env::default().default_filter_or(config.log_level.clone()),
            )
            .init();

            let docker = Docker::connect_with_local_defaults().unwrap_or_else(|err| {
                log::error!("failed to connect to the container runtime: {err}");
                std::process::exit(1);
            });
            let worker_uid = uuid::Uuid::new_v4().to_string();
            log::info!("starting judge-worker {worker_uid}");
            control_plane::run(config, docker, worker_uid).await;
        }
    }
}

fn run_ise(
    network_path: PathBuf,
    seeds_path: PathBuf,
    seed_count: usize,
    model: &str,
    workers: Option<usize>,
    random_seed: u64,
) {
    let network = std::fs::read_to_string(&network_path).unwrap_or_else(|err| {
        eprintln!("failed to read {}: {err}", network_path.display());
        std::process::exit(1);
    });
    let seeds = std::fs::read_to_string(&seeds_path).unwrap_or_else(|err| {
        eprintln!("failed to read {}: {err}", seeds_path.display());
        std::process::exit(1);
    });
    let model = match model.to_uppercase().as_str() {
        "IC" => DiffusionModel::IndependentCascade,
        "LT" => DiffusionModel::LinearThreshold,
        other => {
            eprintln!("unknown model {other:?}, expected IC or LT");
            std::process::exit(1);
        }
    };

    let result = estimate(EstimateRequest {
        network: &network,
        seeds: &seeds,
        seed_count,
        model,
        worker_count: workers.unwrap_or_else(num_cpus::get),
        random_seed,
    });

    match result {
        Ok(spread) => println!("{spread:.4}"),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
