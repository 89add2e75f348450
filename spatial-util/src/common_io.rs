use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::DMatrix;

/// Open a buffered reader, transparently decoding `.gz` files.
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)?;
    if input_file.ends_with(".gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open a buffered writer, transparently encoding `.gz` files.
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    let file = File::create(output_file)?;
    if output_file.ends_with(".gz") {
        Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Read all lines of a (possibly gzipped) text file.
pub fn read_lines(input_file: &str) -> anyhow::Result<Vec<Box<str>>> {
    let reader = open_buf_reader(input_file)?;
    let mut ret = vec![];
    for line in reader.lines() {
        ret.push(line?.into_boxed_str());
    }
    Ok(ret)
}

/// Read a delimited numeric matrix, one row per line.
///
/// * `input_file` - path, `.gz` handled transparently
/// * `delim` - field separators
/// * `skip` - number of header lines to skip
pub fn read_delim_matrix(
    input_file: &str,
    delim: &[char],
    skip: Option<usize>,
) -> anyhow::Result<DMatrix<f32>> {
    let reader = open_buf_reader(input_file)?;
    let mut rows: Vec<Vec<f32>> = vec![];
    let skip = skip.unwrap_or(0);

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i < skip || line.is_empty() {
            continue;
        }
        let row = line
            .split(|c| delim.contains(&c))
            .filter(|w| !w.is_empty())
            .map(|w| {
                w.parse::<f32>()
                    .map_err(|_| anyhow::anyhow!("unparsable field '{}' on line {}", w, i + 1))
            })
            .collect::<anyhow::Result<Vec<f32>>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                anyhow::bail!(
                    "ragged matrix in {}: line {} has {} fields, expected {}",
                    input_file,
                    i + 1,
                    row.len(),
                    first.len()
                );
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        anyhow::bail!("empty matrix file: {}", input_file);
    }

    let nrows = rows.len();
    let ncols = rows[0].len();
    Ok(DMatrix::from_row_iterator(
        nrows,
        ncols,
        rows.into_iter().flatten(),
    ))
}

/// Write a numeric matrix as delimited text, one row per line.
pub fn write_delim_matrix(
    output_file: &str,
    data: &DMatrix<f32>,
    delim: &str,
    column_names: Option<&[Box<str>]>,
) -> anyhow::Result<()> {
    let mut writer = open_buf_writer(output_file)?;

    if let Some(names) = column_names {
        writeln!(writer, "{}", names.join(delim))?;
    }

    for i in 0..data.nrows() {
        let row = (0..data.ncols())
            .map(|j| data[(i, j)].to_string())
            .collect::<Vec<_>>()
            .join(delim);
        writeln!(writer, "{}", row)?;
    }
    writer.flush()?;
    Ok(())
}
