use clap::Args;

use crate::align_common::*;
use crate::output::{write_boundary, write_transform};

#[derive(Args, Debug)]
pub struct RunPrematchArgs {
    /// Coordinate file of the target sample (n x 2)
    #[arg(long, required = true)]
    coord_1: Box<str>,

    /// Coordinate file of the sample to be registered
    #[arg(long, required = true)]
    coord_2: Box<str>,

    /// α-shape scale for boundary extraction
    #[arg(long, default_value_t = 0.5)]
    alpha: f32,

    /// Maximum ICP iterations
    #[arg(long, default_value_t = 50)]
    max_iter: usize,

    /// Convergence tolerance on the mean squared distance
    #[arg(long, default_value_t = 1e-6)]
    tol: f32,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// Boundary-based rigid registration on its own: useful to inspect the
/// recovered transform before committing to a full pipeline run.
pub fn run_prematch(args: &RunPrematchArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let coords_1 = read_delim_matrix(&args.coord_1, &['\t', ',', ' '], None)?;
    let coords_2 = read_delim_matrix(&args.coord_2, &['\t', ',', ' '], None)?;

    let shape_args = AlphaShapeArgs {
        alpha: args.alpha,
        only_outer: true,
    };
    let boundary_1 = alpha_shape(&coords_1, &shape_args)
        .map_err(|e| AlignError::geometry("boundary", "sample_1", e))?;
    let boundary_2 = alpha_shape(&coords_2, &shape_args)
        .map_err(|e| AlignError::geometry("boundary", "sample_2", e))?;

    let rows_of = |coords: &Mat, indices: &[usize]| -> Mat {
        Mat::from_fn(indices.len(), 2, |i, j| coords[(indices[i], j)])
    };

    let result = icp(
        &rows_of(&coords_2, &boundary_2.points),
        &rows_of(&coords_1, &boundary_1.points),
        &IcpArgs {
            max_iter: args.max_iter,
            tol: args.tol,
            block_size: 1000,
        },
    )
    .map_err(|e| AlignError::geometry("icp", "sample_2", e))?;

    info!(
        "recovered angle = {:.4} rad, mse = {:.3e}, converged = {}",
        result.transform.angle(),
        result.mean_squared_error,
        result.converged
    );

    let registered = result.transform.apply(&coords_2);

    write_transform(&args.out, &result.transform)?;
    write_boundary(&args.out, "boundary_1", &boundary_1)?;
    write_boundary(&args.out, "boundary_2", &boundary_2)?;
    write_delim_matrix(
        &format!("{}.registered_2.tsv.gz", args.out),
        &registered,
        "\t",
        None,
    )?;

    Ok(())
}
