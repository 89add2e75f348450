use std::io::Write;

use crate::align_common::*;
use crate::matcher::MatchSet;
use crate::pipeline::AlignmentOutput;
use crate::score::ScoreReport;

/// `{out}.{name}.tsv.gz`
fn tsv_gz_path(header: &str, name: &str) -> String {
    format!("{}.{}.tsv.gz", header, name)
}

pub fn write_embedding(header: &str, name: &str, embedding: &Mat) -> anyhow::Result<()> {
    write_delim_matrix(&tsv_gz_path(header, name), embedding, "\t", None)
}

pub fn write_graph(header: &str, name: &str, graph: &KnnGraph) -> anyhow::Result<()> {
    let path = tsv_gz_path(header, name);
    let mut writer = open_buf_writer(&path)?;
    writeln!(writer, "from\tto\tdistance")?;
    for (&(i, j), &d) in graph.edges.iter().zip(graph.distances.iter()) {
        writeln!(writer, "{}\t{}\t{}", i, j, d)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_matches(header: &str, matches: &MatchSet) -> anyhow::Result<()> {
    let path = tsv_gz_path(header, "matches");
    let mut writer = open_buf_writer(&path)?;
    writeln!(writer, "source\ttarget\tconfidence")?;
    for m in &matches.matches {
        writeln!(writer, "{}\t{}\t{}", m.source, m.target, m.confidence)?;
    }
    writer.flush()?;

    // unmatched entities are part of the record, not an afterthought
    if !matches.unmatched_source.is_empty() || !matches.unmatched_target.is_empty() {
        let path = tsv_gz_path(header, "unmatched");
        let mut writer = open_buf_writer(&path)?;
        writeln!(writer, "sample\tindex")?;
        for &i in &matches.unmatched_source {
            writeln!(writer, "1\t{}", i)?;
        }
        for &j in &matches.unmatched_target {
            writeln!(writer, "2\t{}", j)?;
        }
        writer.flush()?;
    }
    Ok(())
}

pub fn write_score_report(header: &str, report: &ScoreReport) -> anyhow::Result<()> {
    let path = format!("{}.score.json", header);
    let mut writer = open_buf_writer(&path)?;
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_transform(header: &str, transform: &RigidTransform) -> anyhow::Result<()> {
    let path = format!("{}.transform.tsv", header);
    let mut writer = open_buf_writer(&path)?;
    writeln!(
        writer,
        "{}\t{}\t{}",
        transform.rotation[(0, 0)],
        transform.rotation[(0, 1)],
        transform.translation[0]
    )?;
    writeln!(
        writer,
        "{}\t{}\t{}",
        transform.rotation[(1, 0)],
        transform.rotation[(1, 1)],
        transform.translation[1]
    )?;
    writer.flush()?;
    Ok(())
}

pub fn write_boundary(header: &str, name: &str, boundary: &BoundarySet) -> anyhow::Result<()> {
    let path = tsv_gz_path(header, name);
    let mut writer = open_buf_writer(&path)?;
    writeln!(writer, "from\tto")?;
    for &(i, j) in &boundary.edges {
        writeln!(writer, "{}\t{}", i, j)?;
    }
    writer.flush()?;
    Ok(())
}

/// Emit the full artifact bundle of one pipeline run.
pub fn write_artifacts(header: &str, output: &AlignmentOutput) -> anyhow::Result<()> {
    write_embedding(header, "latent_1", &output.embedding_1)?;
    write_embedding(header, "latent_2", &output.embedding_2)?;
    write_graph(header, "graph_1", &output.graph_1)?;
    write_graph(header, "graph_2", &output.graph_2)?;
    write_matches(header, &output.matches)?;
    write_score_report(header, &output.report)?;
    info!("wrote artifacts under {}.*", header);
    Ok(())
}
