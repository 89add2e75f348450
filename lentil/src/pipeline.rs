use candle_core::Device;
use std::time::Instant;

use crate::align_common::*;
use crate::config::{AlignConfig, PrematchPolicy};
use crate::joint_features::{joint_reduced_features, JointFeatureArgs};
use crate::lgcn::{propagate, LgcnProjector};
use crate::matcher::{align_embeddings, MatchSet, MatcherArgs};
use crate::sample::Sample;
use crate::score::{alignment_scores, ScoreInputs, ScoreReport};
use crate::train::{embed_samples, fit_contrastive, FitConfig};

/// Everything one run hands to the persistence layer.
#[derive(Debug)]
pub struct AlignmentOutput {
    pub embedding_1: Mat,
    pub embedding_2: Mat,
    pub graph_1: KnnGraph,
    pub graph_2: KnnGraph,
    pub matches: MatchSet,
    pub report: ScoreReport,
    pub prematch: Option<IcpResult>,
}

/// Run the full alignment pipeline on two samples.
///
/// Stages run strictly in order; each consumes only finished predecessors.
/// Sample 2's coordinates are overwritten in place when the rigid prematch
/// is enabled, the single mutation the pipeline performs.
pub fn run_alignment(
    sample_1: &mut Sample,
    sample_2: &mut Sample,
    config: &AlignConfig,
) -> anyhow::Result<AlignmentOutput> {
    let started = Instant::now();

    // 1. validate configuration against both samples
    config.validate()?;
    validate_samples(sample_1, sample_2, config)?;

    // 2. rigid prematch (explicit policy, never inferred from metadata)
    let prematch = match config.prematch {
        PrematchPolicy::Skip => None,
        PrematchPolicy::Rigid => Some(rigid_prematch(sample_1, sample_2, config)?),
    };

    // 3. per-sample spatial graphs
    info!("building spatial graphs (k = {})", config.knn);
    let graph_args = KnnGraphArgs {
        knn: config.knn,
        block_size: config.block_size,
        mode: config.graph_mode(),
    };
    let graph_1 = KnnGraph::from_rows(sample_1.coordinates(), &graph_args)
        .map_err(|e| AlignError::geometry("spatial_graph", &sample_1.name, e))?;
    let graph_2 = KnnGraph::from_rows(sample_2.coordinates(), &graph_args)
        .map_err(|e| AlignError::geometry("spatial_graph", &sample_2.name, e))?;

    // 4. joint reduction, propagation, and contrastive fitting
    let (reduced_1, reduced_2) = joint_reduced_features(
        sample_1,
        sample_2,
        &JointFeatureArgs {
            proj_dim: config.proj_dim,
            seed: config.seed,
        },
    )?;

    info!("propagating features over {} hops", config.depth);
    let propagated_1 = propagate(&graph_1.propagation_operator(), &reduced_1, config.depth);
    let propagated_2 = propagate(&graph_2.propagation_operator(), &reduced_2, config.depth);

    let device = Device::Cpu;
    let projector = LgcnProjector::new(
        propagated_1.ncols(),
        config.hidden_dim,
        config.latent_dim,
        config.seed,
        &device,
    )?;

    let inputs = [(&propagated_1, &graph_1), (&propagated_2, &graph_2)];
    let outcome = fit_contrastive(
        &projector,
        &inputs,
        &FitConfig {
            learning_rate: config.learning_rate,
            batch_size: config.batch_size,
            num_epochs: config.epochs,
            tol: config.tol,
            temperature: config.temperature,
            seed: config.seed,
            device: device.clone(),
            verbose: false,
            show_progress: true,
        },
    )?;
    info!(
        "aligner fitted over {} epochs (converged: {}, D = {})",
        outcome.loss_trace.len(),
        outcome.converged,
        projector.dim_latent()
    );

    let mut embeddings = embed_samples(&projector, &inputs, &device)?.into_iter();
    let (Some(embedding_1), Some(embedding_2)) = (embeddings.next(), embeddings.next()) else {
        anyhow::bail!("embedding both samples produced fewer than two matrices");
    };

    // 5. probabilistic matching
    let (_prob, matches) = align_embeddings(
        &embedding_1,
        &embedding_2,
        &MatcherArgs {
            temperature: config.temperature,
            mode: config.match_mode,
        },
    )?;

    // 6. scoring over the configured label kinds
    let scores = score_if_labelled(sample_1, sample_2, &matches, config)?;

    let report = ScoreReport {
        global_score: scores.as_ref().map(|s| s.global_score),
        celltype_score: scores.as_ref().and_then(|s| s.celltype_score),
        region_score: scores.as_ref().and_then(|s| s.region_score),
        run_time: started.elapsed().as_secs_f64(),
        angle_delta: prematch.as_ref().map(|p| p.transform.angle()),
        euclidean_error: prematch.as_ref().map(|p| p.mean_squared_error),
    };

    Ok(AlignmentOutput {
        embedding_1,
        embedding_2,
        graph_1,
        graph_2,
        matches,
        report,
        prematch,
    })
}

fn validate_samples(
    sample_1: &Sample,
    sample_2: &Sample,
    config: &AlignConfig,
) -> Result<(), AlignError> {
    if sample_1.num_features() != sample_2.num_features() {
        return Err(AlignError::config(
            "features",
            format!(
                "feature dimensionality differs: {} vs {}",
                sample_1.num_features(),
                sample_2.num_features()
            ),
        ));
    }

    for column in [&config.biology_label, &config.topology_label]
        .into_iter()
        .flatten()
    {
        for sample in [sample_1, sample_2] {
            if sample.labels(column).is_none() {
                return Err(AlignError::config(
                    "labels",
                    format!(
                        "label column '{}' missing from sample '{}'",
                        column, sample.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Boundary extraction + ICP; overwrites sample 2's coordinates with the
/// registered set. Geometry failures abort the run; the pipeline never
/// falls back to un-prematched coordinates on its own.
fn rigid_prematch(
    sample_1: &Sample,
    sample_2: &mut Sample,
    config: &AlignConfig,
) -> anyhow::Result<IcpResult> {
    let shape_args = AlphaShapeArgs {
        alpha: config.alpha,
        only_outer: true,
    };

    info!("extracting boundaries (alpha = {})", config.alpha);
    let boundary_1 = alpha_shape(sample_1.coordinates(), &shape_args)
        .map_err(|e| AlignError::geometry("boundary", &sample_1.name, e))?;
    let boundary_2 = alpha_shape(sample_2.coordinates(), &shape_args)
        .map_err(|e| AlignError::geometry("boundary", &sample_2.name, e))?;

    let rows_of = |sample: &Sample, indices: &[usize]| -> Mat {
        Mat::from_fn(indices.len(), 2, |i, j| {
            sample.coordinates()[(indices[i], j)]
        })
    };

    let result = icp(
        &rows_of(sample_2, &boundary_2.points),
        &rows_of(sample_1, &boundary_1.points),
        &IcpArgs {
            max_iter: config.max_icp_iter,
            tol: config.tol,
            block_size: config.block_size,
        },
    )
    .map_err(|e| AlignError::geometry("icp", &sample_2.name, e))?;

    info!(
        "prematch: angle = {:.4} rad, mse = {:.3e}, converged = {}",
        result.transform.angle(),
        result.mean_squared_error,
        result.converged
    );

    let registered = result.transform.apply(sample_2.coordinates());
    sample_2.set_coordinates(registered)?;

    Ok(result)
}

fn score_if_labelled(
    sample_1: &Sample,
    sample_2: &Sample,
    matches: &MatchSet,
    config: &AlignConfig,
) -> anyhow::Result<Option<crate::score::Scores>> {
    let pair = |column: &Option<Box<str>>| {
        column.as_ref().and_then(|c| {
            match (sample_1.labels(c), sample_2.labels(c)) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => None,
            }
        })
    };

    let inputs = ScoreInputs {
        biology: pair(&config.biology_label),
        topology: pair(&config.topology_label),
    };

    if inputs.biology.is_none() && inputs.topology.is_none() {
        info!("no label columns configured; skipping the scorer");
        return Ok(None);
    }

    Ok(Some(alignment_scores(&matches.matches, &inputs)?))
}
