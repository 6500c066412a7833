// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Monte Carlo influence-spread estimator (the "reference solver", component C4).
//!
//! Given a diffusion network and a seed set, estimates the expected number of vertices activated
//! under the Independent Cascade or Linear Threshold model. Used by the judging worker to score
//! IMP submissions, and exposed standalone as the `ise` CLI subcommand.

pub mod errors;
pub mod estimate;
pub mod graph;
pub mod pool;
pub mod sample;

pub use errors::SolutionError;
pub use estimate::{estimate, estimate_async, EstimateRequest, SAMPLE_COUNT};
pub use graph::{read_network, read_seeds, Graph};
pub use sample::{one_sample, DiffusionModel};
