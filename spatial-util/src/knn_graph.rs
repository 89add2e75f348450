use dashmap::DashMap;
use indicatif::ParallelProgressIterator;
use log::info;
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;

use crate::utils::create_jobs;

type Mat = DMatrix<f32>;

/// How directed k-nearest-neighbor lists become undirected edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// Keep (i, j) when either endpoint lists the other; node degree is
    /// bounded by 2k.
    Union,
    /// Keep (i, j) only when both endpoints list each other; node degree
    /// is bounded by k.
    Mutual,
}

pub struct KnnGraphArgs {
    pub knn: usize,
    pub block_size: usize,
    pub mode: GraphMode,
}

impl Default for KnnGraphArgs {
    fn default() -> Self {
        Self {
            knn: 10,
            block_size: 1000,
            mode: GraphMode::Union,
        }
    }
}

/// Per-sample spatial neighborhood graph.
#[derive(Debug)]
pub struct KnnGraph {
    /// Symmetric CSC adjacency matrix (n_nodes x n_nodes), edge distances
    /// as values
    pub adjacency: CscMatrix<f32>,
    /// Sorted edge list (i < j), deduplicated
    pub edges: Vec<(usize, usize)>,
    /// Edge distances, parallel to `edges`
    pub distances: Vec<f32>,
    /// Number of nodes
    pub n_nodes: usize,
}

impl KnnGraph {
    /// Build a KNN graph from row vectors (entities x coordinates).
    ///
    /// Exact brute-force search with deterministic tie-breaking: neighbor
    /// lists are ordered by (distance, index), so equal distances resolve
    /// to the lower index. No self-loops.
    pub fn from_rows(points: &Mat, args: &KnnGraphArgs) -> anyhow::Result<KnnGraph> {
        let nn = points.nrows();

        if args.knn < 1 {
            anyhow::bail!("knn must be at least 1, got {}", args.knn);
        }
        if nn < 2 {
            anyhow::bail!("need at least 2 points to build a graph, got {}", nn);
        }

        let k = args.knn.min(nn - 1);

        let jobs = create_jobs(nn, Some(args.block_size));
        let njobs = jobs.len() as u64;

        /////////////////////////////////////////////////////////////////
        // step 1: searching nearest neighbours in spatial coordinates //
        /////////////////////////////////////////////////////////////////

        let triplets: DashMap<(usize, usize), f32> = DashMap::new();

        jobs.into_par_iter()
            .progress_count(njobs)
            .for_each(|(lb, ub)| {
                for i in lb..ub {
                    let mut cands: Vec<(f32, usize)> = (0..nn)
                        .filter(|&j| j != i)
                        .map(|j| {
                            let mut d2 = 0.0;
                            for c in 0..points.ncols() {
                                let diff = points[(i, c)] - points[(j, c)];
                                d2 += diff * diff;
                            }
                            (d2.sqrt(), j)
                        })
                        .collect();

                    cands.sort_unstable_by(|a, b| {
                        a.0.partial_cmp(&b.0)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(a.1.cmp(&b.1))
                    });

                    for &(d_ij, j) in cands.iter().take(k) {
                        triplets.insert((i, j), d_ij);
                    }
                }
            });

        info!("{} triplets by spatial kNN matching", triplets.len());

        //////////////////////////////////////////////////
        // step 2: symmetrization (union or reciprocal) //
        //////////////////////////////////////////////////

        let mut edges: Vec<((usize, usize), f32)> = match args.mode {
            GraphMode::Mutual => triplets
                .par_iter()
                .filter_map(|entry| {
                    let &(i, j) = entry.key();
                    if i < j && triplets.contains_key(&(j, i)) {
                        Some(((i, j), *entry.value()))
                    } else {
                        None
                    }
                })
                .collect(),
            GraphMode::Union => triplets
                .par_iter()
                .filter_map(|entry| {
                    let &(i, j) = entry.key();
                    if i < j {
                        Some(((i, j), *entry.value()))
                    } else if !triplets.contains_key(&(j, i)) {
                        // only the i -> j direction exists; canonicalize
                        Some(((j, i), *entry.value()))
                    } else {
                        None
                    }
                })
                .collect(),
        };

        edges.par_sort_by_key(|&(ij, _)| ij);
        edges.dedup();

        if edges.is_empty() {
            anyhow::bail!("empty edge set after {:?} symmetrization", args.mode);
        }

        info!("{} edges after {:?} symmetrization", edges.len(), args.mode);

        ///////////////////////////////////////////////
        // step 3: construct sparse network backbone //
        ///////////////////////////////////////////////

        let mut coo = CooMatrix::new(nn, nn);
        for &((i, j), v) in edges.iter() {
            coo.push(i, j, v);
            coo.push(j, i, v);
        }

        let adjacency = CscMatrix::from(&coo);

        let (edge_pairs, distances): (Vec<_>, Vec<_>) = edges.into_iter().unzip();

        Ok(KnnGraph {
            adjacency,
            edges: edge_pairs,
            distances,
            n_nodes: nn,
        })
    }

    /// Get neighbors of a node from the CSC adjacency matrix
    pub fn neighbors(&self, node: usize) -> &[usize] {
        let offsets = self.adjacency.col_offsets();
        let start = offsets[node];
        let end = offsets[node + 1];
        &self.adjacency.row_indices()[start..end]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Symmetrically normalized propagation operator with self-loops,
    /// `A_hat = D^{-1/2} (A + I) D^{-1/2}` over binary edge weights.
    pub fn propagation_operator(&self) -> CscMatrix<f32> {
        let nn = self.n_nodes;

        let mut degree = vec![1.0f32; nn]; // self-loop counts
        for &(i, j) in &self.edges {
            degree[i] += 1.0;
            degree[j] += 1.0;
        }

        let inv_sqrt: Vec<f32> = degree.iter().map(|&d| 1.0 / d.sqrt()).collect();

        let mut coo = CooMatrix::new(nn, nn);
        for i in 0..nn {
            coo.push(i, i, inv_sqrt[i] * inv_sqrt[i]);
        }
        for &(i, j) in &self.edges {
            let w = inv_sqrt[i] * inv_sqrt[j];
            coo.push(i, j, w);
            coo.push(j, i, w);
        }

        CscMatrix::from(&coo)
    }
}
