use clap::Args;

use crate::align_common::*;
use crate::config::{AlignConfig, MatchMode, PrematchPolicy};
use crate::output::write_artifacts;
use crate::pipeline::run_alignment;
use crate::sample::Sample;

#[derive(Args, Debug)]
pub struct RunAlignArgs {
    /// Coordinate file of sample 1 (n x 2, tsv/csv, `.gz` ok)
    #[arg(long, required = true)]
    coord_1: Box<str>,

    /// Feature matrix file of sample 1 (n x f)
    #[arg(long, required = true)]
    feat_1: Box<str>,

    /// Coordinate file of sample 2
    #[arg(long, required = true)]
    coord_2: Box<str>,

    /// Feature matrix file of sample 2
    #[arg(long, required = true)]
    feat_2: Box<str>,

    /// Biological label files, one per sample (comma-separated)
    #[arg(long, value_delimiter(','))]
    biology_files: Option<Vec<Box<str>>>,

    /// Topological label files, one per sample (comma-separated)
    #[arg(long, value_delimiter(','))]
    topology_files: Option<Vec<Box<str>>>,

    /// Column name for the biological labels
    #[arg(long, default_value = "celltype")]
    biology_label: Box<str>,

    /// Column name for the topological labels
    #[arg(long, default_value = "region")]
    topology_label: Box<str>,

    /// Output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// JSON run configuration (CLI flags take precedence)
    #[arg(long)]
    config: Option<Box<str>>,

    /// Named dataset profile from the configuration file
    #[arg(long)]
    dataset: Option<Box<str>>,

    /// #k-nearest neighbours for the spatial graphs
    #[arg(long)]
    knn: Option<usize>,

    /// α-shape scale for boundary extraction
    #[arg(long)]
    alpha: Option<f32>,

    /// Latent dimensionality of the shared embedding space
    #[arg(long, short = 'd')]
    latent_dim: Option<usize>,

    /// Graph propagation depth
    #[arg(long)]
    depth: Option<usize>,

    /// Rank of the joint feature reduction
    #[arg(long, short = 'p')]
    proj_dim: Option<usize>,

    /// Softmax temperature for matching
    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f32>,

    /// Rigid prematch policy
    #[arg(long, value_enum)]
    prematch: Option<PrematchPolicy>,

    /// Enforce one-to-one correspondence
    #[arg(long, default_value_t = false)]
    one_to_one: bool,

    /// Keep only reciprocal spatial edges
    #[arg(long, default_value_t = false)]
    reciprocal_graph: bool,

    /// #threads for the rayon pool (defaults to all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_align(args: &RunAlignArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or_else(num_cpus::get))
        .build_global()?;

    let config = build_config(args)?;
    config.validate()?;

    // 1. load both samples with any label columns
    let labels_for = |files: &Option<Vec<Box<str>>>,
                      column: &str,
                      which: usize|
     -> Option<(Box<str>, Box<str>)> {
        files
            .as_ref()
            .and_then(|f| f.get(which))
            .map(|file| (column.into(), file.clone()))
    };

    let load = |name: &str, coord: &str, feat: &str, which: usize| -> anyhow::Result<Sample> {
        let mut label_files = vec![];
        if let Some(pair) = labels_for(&args.biology_files, &args.biology_label, which) {
            label_files.push(pair);
        }
        if let Some(pair) = labels_for(&args.topology_files, &args.topology_label, which) {
            label_files.push(pair);
        }
        Sample::from_files(name, coord, feat, &label_files)
    };

    let mut sample_1 = load("sample_1", &args.coord_1, &args.feat_1, 0)?;
    let mut sample_2 = load("sample_2", &args.coord_2, &args.feat_2, 1)?;

    // 2. run the pipeline and write the artifact bundle
    let output = run_alignment(&mut sample_1, &mut sample_2, &config)?;

    if let Some(prematch) = &output.prematch {
        info!(
            "prematch registration error: {:.3e} ({} iterations)",
            prematch.mean_squared_error, prematch.iterations
        );
    }
    if let Some(global) = output.report.global_score {
        info!("global alignment score: {:.4}", global);
    }

    write_artifacts(&args.out, &output)
}

fn build_config(args: &RunAlignArgs) -> anyhow::Result<AlignConfig> {
    let mut config = match &args.config {
        Some(path) => AlignConfig::from_json_file(path)?,
        None => AlignConfig::default(),
    };

    if let Some(dataset) = &args.dataset {
        config = config.with_profile(dataset)?;
    }

    macro_rules! override_with {
        ($($field:ident),*) => {
            $(if let Some(value) = args.$field {
                config.$field = value;
            })*
        };
    }
    override_with!(knn, alpha, latent_dim, depth, proj_dim, temperature, seed, epochs, batch_size, learning_rate);

    if let Some(prematch) = args.prematch {
        config.prematch = prematch;
    }
    if args.one_to_one {
        config.match_mode = MatchMode::OneToOne;
    }
    if args.reciprocal_graph {
        config.reciprocal_graph = true;
    }

    if args.biology_files.is_some() {
        config.biology_label = Some(args.biology_label.clone());
    }
    if args.topology_files.is_some() {
        config.topology_label = Some(args.topology_label.clone());
    }

    for (files, flag) in [
        (&args.biology_files, "--biology-files"),
        (&args.topology_files, "--topology-files"),
    ] {
        if let Some(files) = files {
            if files.len() != 2 {
                return Err(AlignError::config(
                    "labels",
                    format!("{} expects exactly two files, got {}", flag, files.len()),
                )
                .into());
            }
        }
    }

    Ok(config)
}
