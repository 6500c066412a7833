// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::graph::Graph;
use crate::sample::{DiffusionModel, one_sample};

/// One unit of sampling work: estimate `count` independent samples of `seeds`.
struct Task {
    seeds: Vec<usize>,
    count: usize,
}

/// A pool of long-lived sampler threads, each bound to one [`DiffusionModel`] for its entire
/// lifetime (dispatch happens once per worker, not once per sample).
///
/// Mirrors the original subprocess pool's shape — persistent workers drain a task queue and
/// terminate on a sentinel — but uses OS threads rather than OS processes: Rust has no
/// interpreter lock forcing CPU-bound work out of a single process, so threads sharing the graph
/// behind an `Arc` are both simpler and cheaper than subprocess IPC would be.
pub struct SamplerPool {
    task_senders: Vec<mpsc::Sender<Task>>,
    result_receiver: mpsc::Receiver<Vec<usize>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl SamplerPool {
    /// Spawns `worker_count` sampler threads sharing `graph`, each seeded independently from
    /// `base_seed` so that runs are reproducible given a fixed seed but workers don't draw
    /// identical sample streams.
    pub fn start(graph: Arc<Graph>, model: DiffusionModel, worker_count: usize, base_seed: u64) -> Self {
        let worker_count = worker_count.max(1);
        let (result_tx, result_receiver) = mpsc::channel();
        let mut task_senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for worker_idx in 0..worker_count {
            let (task_tx, task_rx) = mpsc::channel::<Task>();
            let graph = Arc::clone(&graph);
            let result_tx = result_tx.clone();
            let worker_seed = base_seed.wrapping_add(worker_idx as u64).wrapping_mul(0x9E37_79B9);
            let handle = thread::Builder::new()
                .name(format!("ise-sampler-{worker_idx}"))
                .spawn(move || {
                    let mut rng = StdRng::seed_from_u64(worker_seed);
                    while let Ok(task) = task_rx.recv() {
                        let samples: Vec<usize> = (0..task.count)
                            .map(|_| one_sample(model, &graph, &task.seeds, &mut rng))
                            .collect();
                        // The receiving end (finish/multi_sample) outlives every worker; a send
                        // failure here would mean the coordinator already stopped listening,
                        // which only happens after it has sent every worker its sentinel.
                        let _ = result_tx.send(samples);
                    }
                })
                .expect("failed to spawn sampler thread");
            task_senders.push(task_tx);
            handles.push(handle);
        }

        SamplerPool {
            task_senders,
            result_receiver,
            handles,
        }
    }

    /// Distributes `total_samples` across the pool (`ceil(total / worker_count)` per worker) and
    /// blocks until every worker has reported its batch.
    pub fn sample_all(&self, seeds: &[usize], total_samples: usize) -> Vec<usize> {
        let worker_count = self.task_senders.len();
        let per_worker = total_samples.div_ceil(worker_count);
        for sender in &self.task_senders {
            let _ = sender.send(Task {
                seeds: seeds.to_vec(),
                count: per_worker,
            });
        }
        let mut result = Vec::with_capacity(per_worker * worker_count);
        for _ in 0..worker_count {
            if let Ok(batch) = self.result_receiver.recv() {
                result.extend(batch);
            }
        }
        result
    }

    /// Closes every worker's task channel (the sentinel) and joins the threads.
    pub fn shutdown(self) {
        drop(self.task_senders);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_graph(n: usize, weight: f64) -> Graph {
        let mut g = Graph::with_capacity(n);
        for i in 0..(n - 1) as i64 {
            g.add_edge(i, i + 1, weight);
        }
        g.prune();
        g
    }

    #[test]
    fn pool_distributes_work_across_workers_and_shuts_down_cleanly() {
        let graph = Arc::new(line_graph(4, 1.0));
        let pool = SamplerPool::start(graph, DiffusionModel::IndependentCascade, 3, 42);
        let samples = pool.sample_all(&[0], 100);
        assert_eq!(samples.len(), 102); // ceil(100/3) * 3
        assert!(samples.iter().all(|&s| s == 4));
        pool.shutdown();
    }

    #[test]
    fn single_worker_handles_whole_batch() {
        let graph = Arc::new(line_graph(3, 0.0));
        let pool = SamplerPool::start(graph, DiffusionModel::LinearThreshold, 1, 1);
        let samples = pool.sample_all(&[0], 10);
        assert_eq!(samples.len(), 10);
        pool.shutdown();
    }
}
