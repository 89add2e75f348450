use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

type Mat = DMatrix<f32>;

/// Sample a `dd x nn` matrix from N(0,1) with an explicit generator.
pub fn rnorm(dd: usize, nn: usize, rng: &mut StdRng) -> Mat {
    let rvec = (0..(dd * nn))
        .map(|_| rng.sample(StandardNormal))
        .collect::<Vec<f32>>();
    Mat::from_vec(dd, nn, rvec)
}

/// Normalize each row to a fixed total: `Y[i,] = X[i,] * scale / sum(X[i,])`.
/// Rows summing to zero are left untouched.
pub fn normalize_rows_inplace(xx: &mut Mat, scale: f32) {
    for mut row in xx.row_iter_mut() {
        let denom = row.sum();
        if denom > 0.0 {
            row *= scale / denom;
        }
    }
}

/// `Y = log(1 + X)` element-wise.
pub fn log1p_inplace(xx: &mut Mat) {
    xx.apply(|x| *x = x.ln_1p());
}

/// Z-score each column: subtract the mean, divide by the standard
/// deviation (columns with zero variance are only centred).
pub fn scale_columns_inplace(xx: &mut Mat) {
    let nn = xx.nrows().max(1) as f32;
    for mut col in xx.column_iter_mut() {
        let mean = col.sum() / nn;
        col.add_scalar_mut(-mean);
        let sd = (col.dot(&col) / nn).sqrt();
        if sd > 0.0 {
            col /= sd;
        }
    }
}

/// Stack matrices vertically; all inputs must share the column count.
pub fn concatenate_vertical(mats: &[Mat]) -> anyhow::Result<Mat> {
    let ncols = match mats.first() {
        Some(x) => x.ncols(),
        None => anyhow::bail!("nothing to concatenate"),
    };

    if mats.iter().any(|x| x.ncols() != ncols) {
        anyhow::bail!("mismatched column counts in vertical concatenation");
    }

    let nrows = mats.iter().map(|x| x.nrows()).sum::<usize>();
    let mut ret = Mat::zeros(nrows, ncols);

    let mut lb = 0;
    for x in mats {
        ret.rows_mut(lb, x.nrows()).copy_from(x);
        lb += x.nrows();
    }
    Ok(ret)
}

/// Pairwise squared Euclidean distances between the rows of `aa` (n1 x d)
/// and the rows of `bb` (n2 x d), returned as an n1 x n2 matrix.
///
/// Computed from explicit differences, so identical rows are at exactly
/// zero distance.
pub fn row_sq_distances(aa: &Mat, bb: &Mat) -> anyhow::Result<Mat> {
    use rayon::prelude::*;

    if aa.ncols() != bb.ncols() {
        anyhow::bail!(
            "dimension mismatch: {} vs {} columns",
            aa.ncols(),
            bb.ncols()
        );
    }

    let (n_1, n_2, dd) = (aa.nrows(), bb.nrows(), aa.ncols());

    let rows: Vec<Vec<f32>> = (0..n_1)
        .into_par_iter()
        .map(|i| {
            (0..n_2)
                .map(|j| {
                    let mut d2 = 0.0;
                    for c in 0..dd {
                        let diff = aa[(i, c)] - bb[(j, c)];
                        d2 += diff * diff;
                    }
                    d2
                })
                .collect()
        })
        .collect();

    Ok(Mat::from_row_iterator(
        n_1,
        n_2,
        rows.into_iter().flatten(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn test_rnorm_seeded_reproducible() {
        let mut rng1 = StdRng::seed_from_u64(42);
        let mut rng2 = StdRng::seed_from_u64(42);
        assert_eq!(rnorm(5, 3, &mut rng1), rnorm(5, 3, &mut rng2));
    }

    #[test]
    fn test_normalize_rows() {
        let mut xx = Mat::from_row_slice(2, 2, &[1.0, 3.0, 0.0, 0.0]);
        normalize_rows_inplace(&mut xx, 4.0);
        assert_abs_diff_eq!(xx[(0, 0)], 1.0);
        assert_abs_diff_eq!(xx[(0, 1)], 3.0);
        // zero row untouched
        assert_eq!(xx[(1, 0)], 0.0);
    }

    #[test]
    fn test_scale_columns() {
        let mut xx = Mat::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        scale_columns_inplace(&mut xx);
        assert_abs_diff_eq!(xx.column(0).sum(), 0.0, epsilon = 1e-5);
        let var = xx.column(0).dot(&xx.column(0)) / 4.0;
        assert_abs_diff_eq!(var, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_concatenate_vertical() -> anyhow::Result<()> {
        let aa = Mat::from_row_slice(1, 2, &[1.0, 2.0]);
        let bb = Mat::from_row_slice(2, 2, &[3.0, 4.0, 5.0, 6.0]);
        let cc = concatenate_vertical(&[aa, bb])?;
        assert_eq!(cc.nrows(), 3);
        assert_eq!(cc[(2, 1)], 6.0);
        Ok(())
    }

    #[test]
    fn test_row_sq_distances() -> anyhow::Result<()> {
        let aa = Mat::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0]);
        let bb = Mat::from_row_slice(2, 2, &[0.0, 0.0, 0.0, 2.0]);
        let dd = row_sq_distances(&aa, &bb)?;
        assert_abs_diff_eq!(dd[(0, 0)], 0.0);
        assert_abs_diff_eq!(dd[(0, 1)], 4.0);
        assert_abs_diff_eq!(dd[(1, 0)], 1.0);
        assert_abs_diff_eq!(dd[(1, 1)], 5.0);
        Ok(())
    }
}
