use crate::align_common::*;

/// One spatial sample: entity coordinates, molecular features, optional
/// categorical label columns. Entity identity is the row index; two
/// samples never share an index space.
pub struct Sample {
    pub name: Box<str>,
    coordinates: Mat,
    features: Mat,
    labels: HashMap<Box<str>, Vec<Box<str>>>,
}

impl Sample {
    pub fn new(name: &str, coordinates: Mat, features: Mat) -> anyhow::Result<Self> {
        if coordinates.nrows() != features.nrows() {
            anyhow::bail!(
                "sample '{}': {} coordinate rows but {} feature rows",
                name,
                coordinates.nrows(),
                features.nrows()
            );
        }
        if coordinates.ncols() != 2 {
            anyhow::bail!(
                "sample '{}': expected 2D coordinates, got {} columns",
                name,
                coordinates.ncols()
            );
        }
        Ok(Self {
            name: name.into(),
            coordinates,
            features,
            labels: HashMap::new(),
        })
    }

    /// Load a sample from delimited files: coordinates (n x 2) and
    /// features (n x f), plus optional one-label-per-line columns.
    pub fn from_files(
        name: &str,
        coord_file: &str,
        feature_file: &str,
        label_files: &[(Box<str>, Box<str>)],
    ) -> anyhow::Result<Self> {
        info!("reading sample '{}' from {}", name, coord_file);

        let coordinates = read_delim_matrix(coord_file, &['\t', ',', ' '], None)?;
        let features = read_delim_matrix(feature_file, &['\t', ',', ' '], None)?;

        let mut sample = Self::new(name, coordinates, features)?;
        for (column, file) in label_files {
            let labels = read_lines(file)?;
            sample.attach_labels(column, labels)?;
        }
        Ok(sample)
    }

    pub fn num_entities(&self) -> usize {
        self.coordinates.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn coordinates(&self) -> &Mat {
        &self.coordinates
    }

    pub fn features(&self) -> &Mat {
        &self.features
    }

    /// Overwrite coordinates; reserved for the rigid registrar, the only
    /// mutating stage of the pipeline.
    pub fn set_coordinates(&mut self, coordinates: Mat) -> anyhow::Result<()> {
        if coordinates.nrows() != self.num_entities() || coordinates.ncols() != 2 {
            anyhow::bail!(
                "sample '{}': replacement coordinates have shape {} x {}",
                self.name,
                coordinates.nrows(),
                coordinates.ncols()
            );
        }
        self.coordinates = coordinates;
        Ok(())
    }

    pub fn attach_labels(&mut self, column: &str, labels: Vec<Box<str>>) -> anyhow::Result<()> {
        if labels.len() != self.num_entities() {
            anyhow::bail!(
                "sample '{}': label column '{}' has {} entries for {} entities",
                self.name,
                column,
                labels.len(),
                self.num_entities()
            );
        }
        self.labels.insert(column.into(), labels);
        Ok(())
    }

    pub fn labels(&self, column: &str) -> Option<&[Box<str>]> {
        self.labels.get(column).map(|v| v.as_slice())
    }
}
