use candle_core::{Device, Tensor};
use candle_nn::{ops, AdamW, Optimizer};
use indicatif::{ProgressBar, ProgressDrawTarget};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::align_common::*;
use crate::lgcn::LgcnProjector;

pub struct FitConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    /// epoch-loss improvement below this counts as converged
    pub tol: f32,
    pub temperature: f32,
    pub seed: u64,
    pub device: Device,
    pub verbose: bool,
    pub show_progress: bool,
}

pub struct FitOutcome {
    pub loss_trace: Vec<f32>,
    pub converged: bool,
}

/// Fit the shared projector with a contrastive objective over both
/// samples' spatial graphs.
///
/// Anchors are entities of either sample; the positive of an anchor is a
/// uniformly drawn spatial-graph neighbor from the anchor's own sample,
/// and the other positives in the minibatch serve as negatives
/// (temperature-scaled cosine InfoNCE). Labels never enter this stage;
/// they are reserved for post-hoc scoring.
///
/// Hitting the epoch limit while the loss is still improving by more than
/// `tol` is reported through `converged = false`, never as an error.
pub fn fit_contrastive(
    projector: &LgcnProjector,
    inputs: &[(&Mat, &KnnGraph)],
    config: &FitConfig,
) -> anyhow::Result<FitOutcome> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    /////////////////////////////////////////////////
    // step 1: collect anchors with their neighbor //
    // lists, tagged by the owning sample          //
    /////////////////////////////////////////////////

    let mut anchors: Vec<(usize, usize)> = vec![];
    let mut neighbor_lists: Vec<Vec<Vec<usize>>> = vec![];

    for (s, (x, graph)) in inputs.iter().enumerate() {
        if x.nrows() != graph.num_nodes() {
            anyhow::bail!(
                "propagated features and graph disagree: {} rows vs {} nodes",
                x.nrows(),
                graph.num_nodes()
            );
        }
        if x.ncols() != projector.dim_in() {
            anyhow::bail!(
                "propagated features have {} columns, projector expects {}",
                x.ncols(),
                projector.dim_in()
            );
        }
        let lists: Vec<Vec<usize>> = (0..graph.num_nodes())
            .map(|node| graph.neighbors(node).to_vec())
            .collect();
        for (node, list) in lists.iter().enumerate() {
            if !list.is_empty() {
                anchors.push((s, node));
            }
        }
        neighbor_lists.push(lists);
    }

    if anchors.len() < 2 {
        anyhow::bail!("not enough connected entities to fit the aligner");
    }

    let mut adam = AdamW::new_lr(
        projector.trainable_vars(),
        config.learning_rate.into(),
    )?;

    let pb = ProgressBar::new(config.num_epochs as u64);
    if !config.show_progress || config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    //////////////////////////////////////
    // step 2: minibatch contrastive    //
    // updates until the loss flattens  //
    //////////////////////////////////////

    let mut loss_trace: Vec<f32> = vec![];
    let mut converged = false;

    for epoch in 0..config.num_epochs {
        anchors.shuffle(&mut rng);

        let mut loss_tot = 0f32;
        let mut n_batches = 0usize;

        for batch in anchors.chunks(config.batch_size) {
            if batch.len() < 2 {
                continue;
            }

            let dim = projector.dim_in();
            let mut x_anchor = Vec::with_capacity(batch.len() * dim);
            let mut x_pos = Vec::with_capacity(batch.len() * dim);

            for &(s, node) in batch {
                let list = &neighbor_lists[s][node];
                let pos = list[rng.random_range(0..list.len())];
                let x = inputs[s].0;
                for j in 0..dim {
                    x_anchor.push(x[(node, j)]);
                }
                for j in 0..dim {
                    x_pos.push(x[(pos, j)]);
                }
            }

            let x_anchor = Tensor::from_vec(x_anchor, (batch.len(), dim), &config.device)?;
            let x_pos = Tensor::from_vec(x_pos, (batch.len(), dim), &config.device)?;

            let loss = info_nce(
                &projector.forward(&x_anchor)?,
                &projector.forward(&x_pos)?,
                config.temperature,
            )?;
            adam.backward_step(&loss)?;

            loss_tot += loss.to_scalar::<f32>()?;
            n_batches += 1;
        }

        let epoch_loss = loss_tot / n_batches.max(1) as f32;
        pb.inc(1);

        if config.verbose {
            info!("[{}] contrastive loss: {}", epoch + 1, epoch_loss);
        }

        if let Some(&prev) = loss_trace.last() {
            if (prev - epoch_loss).abs() < config.tol {
                loss_trace.push(epoch_loss);
                converged = true;
                break;
            }
        }
        loss_trace.push(epoch_loss);
    }
    pb.finish_and_clear();

    if !converged {
        warn!(
            "aligner hit the epoch limit ({}) before the loss flattened",
            config.num_epochs
        );
    }

    Ok(FitOutcome {
        loss_trace,
        converged,
    })
}

/// Temperature-scaled cosine InfoNCE: each anchor must pick out its own
/// positive among the batch.
fn info_nce(z_anchor: &Tensor, z_pos: &Tensor, temperature: f32) -> candle_core::Result<Tensor> {
    let za = l2_normalize_rows(z_anchor)?;
    let zp = l2_normalize_rows(z_pos)?;

    let logits = (za.matmul(&zp.t()?)? / temperature as f64)?;
    let log_p = ops::log_softmax(&logits, 1)?;

    let nn = logits.dims()[0];
    let mut diag = vec![0f32; nn * nn];
    for i in 0..nn {
        diag[i * nn + i] = 1.0;
    }
    let eye = Tensor::from_vec(diag, (nn, nn), logits.device())?;

    (log_p * eye)?.sum_all()?.neg()? / nn as f64
}

fn l2_normalize_rows(z: &Tensor) -> candle_core::Result<Tensor> {
    let norm = (z.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-8)?;
    z.broadcast_div(&norm)
}

/// Produce both samples' embeddings with the fitted projector; row order
/// is preserved and the latent dimensionality is shared by construction.
pub fn embed_samples(
    projector: &LgcnProjector,
    propagated: &[(&Mat, &KnnGraph)],
    device: &Device,
) -> anyhow::Result<Vec<Mat>> {
    propagated
        .iter()
        .map(|(x, _)| projector.project_rows(x, device))
        .collect()
}
