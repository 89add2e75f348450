use thiserror::Error;

/// Structured pipeline failures: each variant names the stage, the sample,
/// or the parameter at fault so callers never see a bare numeric crash.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("geometry failure in {stage} for sample '{sample}': {reason}")]
    Geometry {
        stage: &'static str,
        sample: Box<str>,
        reason: String,
    },

    #[error("configuration error ({parameter}): {reason}")]
    Config {
        parameter: &'static str,
        reason: String,
    },
}

impl AlignError {
    pub fn geometry(
        stage: &'static str,
        sample: &str,
        err: impl std::fmt::Display,
    ) -> Self {
        Self::Geometry {
            stage,
            sample: sample.into(),
            reason: err.to_string(),
        }
    }

    pub fn config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            parameter,
            reason: reason.into(),
        }
    }
}
