use crate::align_common::*;
use crate::sample::Sample;

const ROW_NORM_SCALE: f32 = 1e4;

pub struct JointFeatureArgs {
    pub proj_dim: usize,
    pub seed: u64,
}

/// Project both samples' molecular features into one shared reduced space.
///
/// Each feature matrix is total-count normalized per entity, `log1p`
/// transformed, stacked vertically, z-scaled per feature across the joint
/// rows, and reduced by randomized SVD. The joint decomposition is what
/// makes the two samples commensurable before any graph propagation.
///
/// Returns per-sample reduced matrices (n1 x k, n2 x k) with row order
/// preserved.
pub fn joint_reduced_features(
    sample_1: &Sample,
    sample_2: &Sample,
    args: &JointFeatureArgs,
) -> anyhow::Result<(Mat, Mat)> {
    if sample_1.num_features() != sample_2.num_features() {
        return Err(AlignError::config(
            "features",
            format!(
                "feature dimensionality differs: '{}' has {}, '{}' has {}",
                sample_1.name,
                sample_1.num_features(),
                sample_2.name,
                sample_2.num_features()
            ),
        )
        .into());
    }

    let n_1 = sample_1.num_entities();
    let n_2 = sample_2.num_entities();

    let preprocess = |x: &Mat| -> Mat {
        let mut x = x.clone();
        normalize_rows_inplace(&mut x, ROW_NORM_SCALE);
        log1p_inplace(&mut x);
        x
    };

    let mut joint = concatenate_vertical(&[
        preprocess(sample_1.features()),
        preprocess(sample_2.features()),
    ])?;
    scale_columns_inplace(&mut joint);

    let rank = args.proj_dim.min(joint.nrows()).min(joint.ncols());
    info!(
        "joint reduction: {} x {} -> rank {}",
        joint.nrows(),
        joint.ncols(),
        rank
    );

    let (uu, ss, _) = joint.rsvd(rank, args.seed)?;

    // PCA-style scores: U scaled by the singular values
    let scores = uu * Mat::from_diagonal(&ss);

    let reduced_1 = scores.rows(0, n_1).into_owned();
    let reduced_2 = scores.rows(n_1, n_2).into_owned();

    Ok((reduced_1, reduced_2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with_features(name: &str, features: Mat) -> Sample {
        let n = features.nrows();
        let coords = Mat::from_fn(n, 2, |i, j| (i * 2 + j) as f32);
        Sample::new(name, coords, features).unwrap()
    }

    #[test]
    fn test_shared_space_shapes() -> anyhow::Result<()> {
        let f1 = Mat::from_fn(12, 8, |i, j| ((i + 1) * (j + 2) % 7) as f32);
        let f2 = Mat::from_fn(9, 8, |i, j| ((i + 3) * (j + 1) % 5) as f32);

        let (r1, r2) = joint_reduced_features(
            &sample_with_features("s1", f1),
            &sample_with_features("s2", f2),
            &JointFeatureArgs {
                proj_dim: 4,
                seed: 42,
            },
        )?;

        assert_eq!(r1.nrows(), 12);
        assert_eq!(r2.nrows(), 9);
        assert_eq!(r1.ncols(), 4);
        assert_eq!(r2.ncols(), 4);
        Ok(())
    }

    #[test]
    fn test_identical_samples_get_identical_rows() -> anyhow::Result<()> {
        let ff = Mat::from_fn(10, 6, |i, j| ((i * 3 + j * 5) % 11) as f32 + 1.0);

        let (r1, r2) = joint_reduced_features(
            &sample_with_features("a", ff.clone()),
            &sample_with_features("b", ff),
            &JointFeatureArgs {
                proj_dim: 3,
                seed: 7,
            },
        )?;

        // identical inputs occupy identical positions in the shared space
        for i in 0..10 {
            for j in 0..3 {
                approx::assert_abs_diff_eq!(r1[(i, j)], r2[(i, j)], epsilon = 1e-4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_mismatched_feature_dims_rejected() {
        let f1 = Mat::zeros(5, 4);
        let f2 = Mat::zeros(5, 3);
        let result = joint_reduced_features(
            &sample_with_features("s1", f1),
            &sample_with_features("s2", f2),
            &JointFeatureArgs {
                proj_dim: 2,
                seed: 1,
            },
        );
        assert!(result.is_err());
    }
}
