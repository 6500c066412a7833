// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::io::Cursor;
use std::sync::Arc;

use crate::errors::SolutionError;
use crate::graph::{read_network, read_seeds};
use crate::pool::SamplerPool;
use crate::sample::DiffusionModel;

/// Total Monte Carlo sample count per estimate, matching the dispatcher's expectations for
/// result stability.
pub const SAMPLE_COUNT: usize = 10_000;

/// Parameters for one influence-spread estimate.
pub struct EstimateRequest<'a> {
    pub network: &'a str,
    pub seeds: &'a str,
    pub seed_count: usize,
    pub model: DiffusionModel,
    pub worker_count: usize,
    pub random_seed: u64,
}

/// Estimates `σ(S)`, the expected activation count of the seed set encoded in `request.seeds`,
/// under `request.model`, by partitioning [`SAMPLE_COUNT`] Monte Carlo samples across a pool of
/// long-lived sampler threads. Blocks the calling thread for the duration of the sampling.
pub fn estimate(request: EstimateRequest<'_>) -> Result<f64, SolutionError> {
    let graph = read_network(Cursor::new(request.network))?;
    let seeds = read_seeds(Cursor::new(request.seeds), request.seed_count, &graph)?;
    log::debug!(
        "estimating spread for {} seeds over {} vertices with {} workers",
        seeds.len(),
        graph.vertex_count(),
        request.worker_count
    );

    let pool = SamplerPool::start(
        Arc::new(graph),
        request.model,
        request.worker_count,
        request.random_seed,
    );
    let samples = pool.sample_all(&seeds, SAMPLE_COUNT);
    pool.shutdown();

    let sum: f64 = samples.iter().map(|&s| s as f64).sum();
    let spread = sum / samples.len() as f64;
    log::debug!("estimated spread {spread:.2} from {} samples", samples.len());
    Ok(spread)
}

/// Async wrapper used by [`crate`] callers running inside a Tokio control plane: offloads the
/// CPU-bound estimate to a blocking-task slot so the reactor is never stalled by it.
pub async fn estimate_async(
    network: String,
    seeds: String,
    seed_count: usize,
    model: DiffusionModel,
    worker_count: usize,
    random_seed: u64,
) -> Result<f64, SolutionError> {
    tokio::task::spawn_blocking(move || {
        estimate(EstimateRequest {
            network: &network,
            seeds: &seeds,
            seed_count,
            model,
            worker_count,
            random_seed,
        })
    })
    .await
    .map_err(|e| SolutionError::new(format!("Estimator worker panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_NETWORK: &str = "4 3\n0 1 1.0\n1 2 1.0\n2 3 1.0\n";

    #[test]
    fn estimate_is_at_least_seed_count() {
        let result = estimate(EstimateRequest {
            network: CHAIN_NETWORK,
            seeds: "0\n",
            seed_count: 1,
            model: DiffusionModel::IndependentCascade,
            worker_count: 2,
            random_seed: 1,
        })
        .unwrap();
        assert!(result >= 1.0);
    }

    #[test]
    fn estimate_on_fully_deterministic_chain_matches_vertex_count() {
        let result = estimate(EstimateRequest {
            network: CHAIN_NETWORK,
            seeds: "0\n",
            seed_count: 1,
            model: DiffusionModel::IndependentCascade,
            worker_count: 4,
            random_seed: 99,
        })
        .unwrap();
        assert!((result - 4.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_propagates_solution_errors() {
        let err = estimate(EstimateRequest {
            network: CHAIN_NETWORK,
            seeds: "99\n",
            seed_count: 1,
            model: DiffusionModel::IndependentCascade,
            worker_count: 2,
            random_seed: 1,
        })
        .unwrap_err();
        assert_eq!(err.reason(), "Node not in the network.");
    }

    #[test]
    fn larger_seed_set_is_monotone_non_decreasing() {
        // Star graph: vertex 0 fans out to 1..=50 with moderate, fixed edge weights.
        let mut network = String::from("51 50\n");
        for i in 1..=50 {
            network.push_str(&format!("0 {i} 0.3\n"));
        }
        let one_seed = estimate(EstimateRequest {
            network: &network,
            seeds: "0\n",
            seed_count: 1,
            model: DiffusionModel::IndependentCascade,
            worker_count: 4,
            random_seed: 7,
        })
        .unwrap();
        let two_seeds = estimate(EstimateRequest {
            network: &network,
            seeds: "0\n1\n",
            seed_count: 2,
            model: DiffusionModel::IndependentCascade,
            worker_count: 4,
            random_seed: 7,
        })
        .unwrap();
        // 95% empirical tolerance band: allow a small slack for Monte Carlo noise.
        assert!(two_seeds >= one_seed - 0.5);
    }

    #[tokio::test]
    async fn estimate_async_offloads_to_blocking_pool() {
        let result = estimate_async(
            CHAIN_NETWORK.to_string(),
            "0\n".to_string(),
            1,
            DiffusionModel::IndependentCascade,
            2,
            1,
        )
        .await
        .unwrap();
        assert!(result >= 1.0);
    }
}
