mod align_common;
mod config;
mod error;
mod joint_features;
mod lgcn;
mod matcher;
mod output;
mod pipeline;
mod run_align;
mod run_graph;
mod run_prematch;
mod sample;
mod score;
mod train;

use clap::{Parser, Subcommand};
use run_align::*;
use run_graph::*;
use run_prematch::*;

/// LENTIL
#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Latent Embedding alignmeNT of tIssue sLices\n\n\
                  LENTIL matches cells/spots across two spatially-resolved transcriptomics\n\
                  (SRT) samples that share no coordinate system. It combines boundary-based\n\
                  rigid prematching, per-sample spatial KNN graphs, a contrastively fitted\n\
                  graph embedding shared by both samples, probabilistic cross-sample\n\
                  matching, and label-agreement scoring.\n\n\
                  Inputs are delimited text matrices (`.gz` handled transparently):\n\
                  coordinates (n x 2), features (n x f), one label per line for label files.",
    term_width = 80
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Full alignment pipeline",
        long_about = "Run the full alignment pipeline on two samples.\n\n\
                      Pipeline stages:\n\
                      1. Validate configuration against both samples\n\
                      2. Rigid prematch (optional): α-shape boundaries + ICP, sample 2\n\
                         coordinates overwritten with the registered set\n\
                      3. Per-sample spatial KNN graphs\n\
                      4. Joint feature reduction (randomized SVD over stacked samples),\n\
                         graph propagation, contrastive fitting of the shared projector\n\
                      5. Probabilistic matching (softmax over embedding distances)\n\
                      6. Label-agreement scoring (biology / topology / joint)\n\n\
                      Outputs:\n\
                      - {out}.latent_1.tsv.gz, {out}.latent_2.tsv.gz: embeddings\n\
                      - {out}.graph_1.tsv.gz, {out}.graph_2.tsv.gz: spatial edge lists\n\
                      - {out}.matches.tsv.gz (+ {out}.unmatched.tsv.gz): correspondences\n\
                      - {out}.score.json: score report"
    )]
    Run(RunAlignArgs),

    #[command(
        about = "Boundary extraction + rigid ICP only",
        long_about = "Extract α-shape boundaries of both samples and register sample 2's\n\
                      boundary onto sample 1's by ICP.\n\n\
                      Outputs:\n\
                      - {out}.transform.tsv: 2x3 rigid transform (rotation | translation)\n\
                      - {out}.boundary_1.tsv.gz, {out}.boundary_2.tsv.gz: boundary edges\n\
                      - {out}.registered_2.tsv.gz: transformed sample 2 coordinates"
    )]
    Prematch(RunPrematchArgs),

    #[command(
        about = "Spatial KNN graph only",
        long_about = "Build the spatial k-nearest-neighbour graph of one sample.\n\n\
                      Outputs:\n\
                      - {out}.graph.tsv.gz: edge list with distances"
    )]
    Graph(RunGraphArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Run(args) => {
            run_align(args)?;
        }
        Commands::Prematch(args) => {
            run_prematch(args)?;
        }
        Commands::Graph(args) => {
            run_graph(args)?;
        }
    }

    Ok(())
}
