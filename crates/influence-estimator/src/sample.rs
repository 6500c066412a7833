// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use rand::Rng;

use crate::graph::Graph;

/// Diffusion model selection. Dispatched once per sampling worker (see [`crate::pool`]), not once
/// per sample: a worker is handed a single `DiffusionModel` for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum DiffusionModel {
    #[strum(serialize = "IC")]
    IndependentCascade,
    #[strum(serialize = "LT")]
    LinearThreshold,
}

/// Draws one Independent Cascade sample: activate `seeds`, then repeatedly let each newly active
/// vertex attempt to activate its out-neighbours with probability equal to the edge weight.
///
/// Frontier-based BFS: a vertex is evaluated for activation by each of its active in-neighbours at
/// most once per round, and once active it is never re-queued.
pub fn one_ic_sample(graph: &Graph, seeds: &[usize], rng: &mut impl Rng) -> usize {
    let mut active = vec![false; graph.vertex_count()];
    for &s in seeds {
        active[s] = true;
    }
    let mut influence_area = seeds.len();
    let mut frontier: Vec<usize> = seeds.to_vec();

    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for &vertex in &frontier {
            for &(neighbour, weight) in graph.out_neighbours(vertex) {
                if !active[neighbour] && rng.random::<f64>() <= weight {
                    active[neighbour] = true;
                    next_frontier.push(neighbour);
                }
            }
        }
        influence_area += next_frontier.len();
        frontier = next_frontier;
    }
    influence_area
}

/// Draws one Linear Threshold sample: every vertex is given a fixed uniform threshold up front: a
/// vertex activates once the summed weight of its active in-neighbours meets or exceeds it.
pub fn one_lt_sample(graph: &Graph, seeds: &[usize], rng: &mut impl Rng) -> usize {
    let vertex_count = graph.vertex_count();
    let mut active = vec![false; vertex_count];
    for &s in seeds {
        active[s] = true;
    }
    let thresholds: Vec<f64> = (0..vertex_count).map(|_| rng.random::<f64>()).collect();

    let mut influence_area = seeds.len();
    let mut frontier: Vec<usize> = seeds.to_vec();

    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        for &vertex in &frontier {
            for &(neighbour, _) in graph.out_neighbours(vertex) {
                if active[neighbour] {
                    continue;
                }
                let impact: f64 = graph
                    .in_neighbours(neighbour)
                    .iter()
                    .filter(|&&(source, _)| active[source])
                    .map(|&(_, weight)| weight)
                    .sum();
                if impact >= thresholds[neighbour] {
                    active[neighbour] = true;
                    next_frontier.push(neighbour);
                }
            }
        }
        influence_area += next_frontier.len();
        frontier = next_frontier;
    }
    influence_area
}

/// Draws one sample under the given model.
pub fn one_sample(model: DiffusionModel, graph: &Graph, seeds: &[usize], rng: &mut impl Rng) -> usize {
    match model {
        DiffusionModel::IndependentCascade => one_ic_sample(graph, seeds, rng),
        DiffusionModel::LinearThreshold => one_lt_sample(graph, seeds, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn line_graph(n: usize, weight: f64) -> Graph {
        let mut g = Graph::with_capacity(n);
        for i in 0..(n - 1) as i64 {
            g.add_edge(i, i + 1, weight);
        }
        g.prune();
        g
    }

    #[test]
    fn ic_sample_is_at_least_seed_count() {
        let graph = line_graph(5, 0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let sample = one_ic_sample(&graph, &[0], &mut rng);
        assert!(sample >= 1);
        assert!(sample <= graph.vertex_count());
    }

    #[test]
    fn ic_sample_with_weight_one_activates_whole_chain() {
        let graph = line_graph(5, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let sample = one_ic_sample(&graph, &[0], &mut rng);
        assert_eq!(sample, 5);
    }

    #[test]
    fn ic_sample_with_weight_zero_activates_only_seeds() {
        let graph = line_graph(5, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        let sample = one_ic_sample(&graph, &[0], &mut rng);
        assert_eq!(sample, 1);
    }

    #[test]
    fn lt_sample_with_dominant_weight_activates_whole_chain() {
        let graph = line_graph(5, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let sample = one_lt_sample(&graph, &[0], &mut rng);
        assert_eq!(sample, 5);
    }

    #[test]
    fn parses_model_names() {
        use std::str::FromStr;
        assert_eq!(
            DiffusionModel::from_str("IC").unwrap(),
            DiffusionModel::IndependentCascade
        );
        assert_eq!(
            DiffusionModel::from_str("LT").unwrap(),
            DiffusionModel::LinearThreshold
        );
    }
}
