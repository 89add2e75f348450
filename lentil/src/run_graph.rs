use clap::Args;

use crate::align_common::*;
use crate::output::write_graph;

#[derive(Args, Debug)]
pub struct RunGraphArgs {
    /// Coordinate file (n x 2, tsv/csv, `.gz` ok)
    #[arg(long, required = true)]
    coord: Box<str>,

    /// #k-nearest neighbours
    #[arg(long, short, default_value_t = 10)]
    knn: usize,

    /// Keep only reciprocal edges (degree bounded by k)
    #[arg(long, default_value_t = false)]
    reciprocal: bool,

    /// block_size (#entities) for parallel processing
    #[arg(long, default_value_t = 1000)]
    block_size: usize,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_graph(args: &RunGraphArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let coords = read_delim_matrix(&args.coord, &['\t', ',', ' '], None)?;

    let graph = KnnGraph::from_rows(
        &coords,
        &KnnGraphArgs {
            knn: args.knn,
            block_size: args.block_size,
            mode: if args.reciprocal {
                GraphMode::Mutual
            } else {
                GraphMode::Union
            },
        },
    )?;

    info!(
        "spatial graph: {} nodes, {} edges",
        graph.num_nodes(),
        graph.num_edges()
    );

    write_graph(&args.out, "graph", &graph)
}
