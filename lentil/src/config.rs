use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::align_common::*;

/// Whether the rigid prematch stage runs. An explicit policy field, not an
/// implicit marker sniffed off sample metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PrematchPolicy {
    Skip,
    Rigid,
}

/// Discrete assignment semantics for the probabilistic matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Every source entity keeps its highest-probability target; targets
    /// may repeat.
    BestPerSource,
    /// Globally greedy one-to-one assignment; surplus entities of the
    /// larger sample are reported as unmatched.
    OneToOne,
}

/// Per-dataset defaults: label column names and geometry parameters.
/// Profiles are data, loaded with the configuration file; dataset
/// identities are never inferred from file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    #[serde(default)]
    pub biology_label: Option<Box<str>>,
    #[serde(default)]
    pub topology_label: Option<Box<str>>,
    #[serde(default)]
    pub alpha: Option<f32>,
    #[serde(default)]
    pub spot_size: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// #nearest neighbours for the per-sample spatial graphs
    pub knn: usize,
    /// α-shape scale for boundary extraction
    pub alpha: f32,
    /// shared latent dimensionality D
    pub latent_dim: usize,
    /// hidden width of the projection network
    pub hidden_dim: usize,
    /// graph propagation depth (number of hops folded into each entity)
    pub depth: usize,
    /// rank of the joint feature reduction
    pub proj_dim: usize,
    /// softmax temperature for matching probabilities
    pub temperature: f32,
    /// seed for every stochastic step of the run
    pub seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// convergence tolerance (ICP improvement, epoch-loss improvement)
    pub tol: f32,
    pub max_icp_iter: usize,
    /// block size (#entities) for parallel processing
    pub block_size: usize,
    pub prematch: PrematchPolicy,
    pub match_mode: MatchMode,
    /// keep only reciprocal spatial edges (degree bounded by k)
    pub reciprocal_graph: bool,
    /// label column scored as biological agreement
    pub biology_label: Option<Box<str>>,
    /// label column scored as topological agreement
    pub topology_label: Option<Box<str>>,
    /// physical spot diameter, carried for downstream consumers
    pub spot_size: Option<f32>,
    /// named per-dataset defaults, applied by `with_profile`
    pub profiles: HashMap<Box<str>, DatasetProfile>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            knn: 10,
            alpha: 0.5,
            latent_dim: 32,
            hidden_dim: 64,
            depth: 2,
            proj_dim: 50,
            temperature: 0.1,
            seed: 42,
            epochs: 100,
            batch_size: 256,
            learning_rate: 1e-3,
            tol: 1e-4,
            max_icp_iter: 50,
            block_size: 1000,
            prematch: PrematchPolicy::Skip,
            match_mode: MatchMode::BestPerSource,
            reciprocal_graph: false,
            biology_label: None,
            topology_label: None,
            spot_size: None,
            profiles: HashMap::new(),
        }
    }
}

impl AlignConfig {
    pub fn from_json_file(path: &str) -> anyhow::Result<Self> {
        let reader = open_buf_reader(path)?;
        let config: AlignConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Overlay a named dataset profile onto this configuration.
    pub fn with_profile(mut self, name: &str) -> anyhow::Result<Self> {
        let profile = self
            .profiles
            .get(name)
            .ok_or_else(|| AlignError::config("profile", format!("unknown dataset profile '{}'", name)))?
            .clone();

        if profile.biology_label.is_some() {
            self.biology_label = profile.biology_label;
        }
        if profile.topology_label.is_some() {
            self.topology_label = profile.topology_label;
        }
        if let Some(alpha) = profile.alpha {
            self.alpha = alpha;
        }
        if profile.spot_size.is_some() {
            self.spot_size = profile.spot_size;
        }
        Ok(self)
    }

    /// Range checks on the scalar parameters; cross-sample checks live in
    /// the pipeline where both samples are visible.
    pub fn validate(&self) -> Result<(), AlignError> {
        if self.knn < 1 {
            return Err(AlignError::config("knn", "must be at least 1"));
        }
        if self.alpha <= 0.0 {
            return Err(AlignError::config("alpha", "must be positive"));
        }
        if self.latent_dim < 2 {
            return Err(AlignError::config("latent_dim", "must be at least 2"));
        }
        if self.depth < 1 {
            return Err(AlignError::config("depth", "must be at least 1"));
        }
        if self.proj_dim < self.latent_dim {
            return Err(AlignError::config(
                "proj_dim",
                "must be at least latent_dim",
            ));
        }
        if self.temperature <= 0.0 {
            return Err(AlignError::config("temperature", "must be positive"));
        }
        if self.batch_size < 2 {
            return Err(AlignError::config("batch_size", "must be at least 2"));
        }
        Ok(())
    }

    pub fn graph_mode(&self) -> GraphMode {
        if self.reciprocal_graph {
            GraphMode::Mutual
        } else {
            GraphMode::Union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AlignConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        let mut config = AlignConfig::default();
        config.knn = 0;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::default();
        config.alpha = -1.0;
        assert!(config.validate().is_err());

        let mut config = AlignConfig::default();
        config.proj_dim = config.latent_dim - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_overlay() -> anyhow::Result<()> {
        let json = r#"{
            "alpha": 1.0,
            "profiles": {
                "visium": {
                    "biology_label": "celltype",
                    "topology_label": "region",
                    "alpha": 2.0,
                    "spot_size": 55.0
                }
            }
        }"#;
        let config: AlignConfig = serde_json::from_str(json)?;
        assert_eq!(config.alpha, 1.0);

        let config = config.with_profile("visium")?;
        assert_eq!(config.alpha, 2.0);
        assert_eq!(config.biology_label.as_deref(), Some("celltype"));
        assert_eq!(config.spot_size, Some(55.0));

        assert!(AlignConfig::default().with_profile("nope").is_err());
        Ok(())
    }
}
