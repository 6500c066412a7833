// Copyright 2026 CARP Judge Worker contributors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::io::BufRead;

use crate::errors::SolutionError;

/// A directed, weighted multigraph with vertices addressed by dense `0..vertex_count()` indices.
///
/// External vertex ids (as they appear in the network/seeds file) are mapped to dense indices
/// lazily, in first-seen order, as edges are ingested. Every edge is stored once in the source
/// vertex's outgoing adjacency and once in the target vertex's incoming adjacency; no other
/// structure cross-references a vertex.
#[derive(Debug, Clone)]
pub struct Graph {
    out_adjacency: Vec<Vec<(usize, f64)>>,
    in_adjacency: Vec<Vec<(usize, f64)>>,
    index_of: HashMap<i64, usize>,
    /// Vertices that appeared in at least one edge and have a non-empty outgoing adjacency.
    reachable: Vec<usize>,
}

impl Graph {
    /// Builds an empty graph sized to hold up to `declared_vertex_count` vertices without
    /// reallocating, though the actual vertex count is driven entirely by distinct ids seen in
    /// `add_edge`.
    pub fn with_capacity(declared_vertex_count: usize) -> Self {
        Graph {
            out_adjacency: Vec::with_capacity(declared_vertex_count),
            in_adjacency: Vec::with_capacity(declared_vertex_count),
            index_of: HashMap::with_capacity(declared_vertex_count),
            reachable: Vec::new(),
        }
    }

    fn index_for(&mut self, external_id: i64) -> usize {
        if let Some(&idx) = self.index_of.get(&external_id) {
            return idx;
        }
        let idx = self.out_adjacency.len();
        self.out_adjacency.push(Vec::new());
        self.in_adjacency.push(Vec::new());
        self.index_of.insert(external_id, idx);
        idx
    }

    pub fn add_edge(&mut self, source: i64, target: i64, weight: f64) {
        let si = self.index_for(source);
        let ti = self.index_for(target);
        self.out_adjacency[si].push((ti, weight));
        self.in_adjacency[ti].push((si, weight));
    }

    /// Drops vertices with no outgoing edges from the candidate "reachable" set. Mirrors the
    /// original pruning pass: vertices that can never activate anything downstream are removed
    /// from consideration without altering the adjacency arrays themselves.
    pub fn prune(&mut self) {
        self.reachable = (0..self.out_adjacency.len())
            .filter(|&v| !self.out_adjacency[v].is_empty())
            .collect();
    }

    pub fn vertex_count(&self) -> usize {
        self.out_adjacency.len()
    }

    pub fn out_neighbours(&self, vertex: usize) -> &[(usize, f64)] {
        &self.out_adjacency[vertex]
    }

    pub fn in_neighbours(&self, vertex: usize) -> &[(usize, f64)] {
        &self.in_adjacency[vertex]
    }

    /// Maps an external vertex id to its dense index, as `read_seeds` needs.
    pub fn dense_index(&self, external_id: i64) -> Option<usize> {
        self.index_of.get(&external_id).copied()
    }
}

/// Parses the network file format: a `V E` header line followed by `E` `u v w` edge lines.
///
/// `V` is advisory capacity only; the graph's actual vertex set is whatever ids are seen in the
/// edge lines (matching the original reader, which never validates `V`/`E` against what follows).
pub fn read_network<R: BufRead>(reader: R) -> Result<Graph, SolutionError> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| SolutionError::new("Empty network file."))?
        .map_err(|e| SolutionError::new(format!("Failed to read network header: {e}")))?;
    let mut header_fields = header.split_whitespace();
    let declared_vertices: usize = header_fields
        .next()
        .ok_or_else(|| SolutionError::new("Missing vertex count in network header."))?
        .parse()
        .map_err(|_| SolutionError::new("Vaule Error! Not int."))?;

    let mut graph = Graph::with_capacity(declared_vertices);
    for line in lines {
        let line = line.map_err(|e| SolutionError::new(format!("Failed to read network line: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let u: i64 = fields
            .next()
            .ok_or_else(|| SolutionError::new("Missing source vertex in edge line."))?
            .parse()
            .map_err(|_| SolutionError::new("Vaule Error! Not int."))?;
        let v: i64 = fields
            .next()
            .ok_or_else(|| SolutionError::new("Missing target vertex in edge line."))?
            .parse()
            .map_err(|_| SolutionError::new("Vaule Error! Not int."))?;
        let w: f64 = fields
            .next()
            .ok_or_else(|| SolutionError::new("Missing weight in edge line."))?
            .parse()
            .map_err(|_| SolutionError::new("Vaule Error! Not int."))?;
        if !w.is_finite() || w < 0.0 {
            return Err(SolutionError::new("Edge weight must be a finite non-negative real."));
        }
        graph.add_edge(u, v, w);
    }
    graph.prune();
    Ok(graph)
}

/// Parses the seeds file format: one external vertex id per line, trailing blank lines allowed.
/// Validates the seed count against `expected_seed_count` when it is non-zero.
pub fn read_seeds<R: BufRead>(
    reader: R,
    expected_seed_count: usize,
    graph: &Graph,
) -> Result<Vec<usize>, SolutionError> {
    let mut seeds = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| SolutionError::new(format!("Failed to read seeds line: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let external_id: i64 = line
            .trim()
            .parse()
            .map_err(|_| SolutionError::new("Vaule Error! Not int."))?;
        let idx = graph
            .dense_index(external_id)
            .ok_or_else(|| SolutionError::new("Node not in the network."))?;
        seeds.push(idx);
    }
    if expected_seed_count != 0 && seeds.len() != expected_seed_count {
        return Err(SolutionError::new("Wrong number of seeds"));
    }
    Ok(seeds)
}
