use log::{info, warn};
use nalgebra::{DMatrix, DVector, RowDVector};
use rayon::prelude::*;

use crate::utils::create_jobs;

type Mat = DMatrix<f32>;
type DVec = DVector<f32>;

const COLLINEAR_TOL: f32 = 1e-6;

/// A rigid (rotation + translation, no scaling) transform of 2D points.
///
/// Points are rows, so `apply` computes `P * R^T + 1 t^T`.
#[derive(Debug, Clone)]
pub struct RigidTransform {
    pub rotation: Mat,
    pub translation: DVec,
}

impl RigidTransform {
    pub fn identity() -> Self {
        let mut rotation = Mat::zeros(2, 2);
        rotation.fill_with_identity();
        Self {
            rotation,
            translation: DVec::zeros(2),
        }
    }

    /// Transform each row of `points` (n x 2).
    pub fn apply(&self, points: &Mat) -> Mat {
        let mut ret = points * self.rotation.transpose();
        for mut row in ret.row_iter_mut() {
            row += RowDVector::from_iterator(2, self.translation.iter().cloned());
        }
        ret
    }

    /// `other` applied after `self`: `x -> R_o (R_s x + t_s) + t_o`.
    pub fn then(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: &other.rotation * &self.rotation,
            translation: &other.rotation * &self.translation + &other.translation,
        }
    }

    /// Rotation angle in radians, in (-π, π].
    pub fn angle(&self) -> f32 {
        self.rotation[(1, 0)].atan2(self.rotation[(0, 0)])
    }

    /// Departure of the rotation block from orthogonality, `|R^T R - I|`.
    pub fn orthogonality_error(&self) -> f32 {
        let mut eye = Mat::zeros(2, 2);
        eye.fill_with_identity();
        (self.rotation.transpose() * &self.rotation - eye).norm()
    }
}

pub struct IcpArgs {
    pub max_iter: usize,
    /// Stop when the mean squared distance improves by less than this.
    pub tol: f32,
    pub block_size: usize,
}

impl Default for IcpArgs {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tol: 1e-6,
            block_size: 1000,
        }
    }
}

#[derive(Debug)]
pub struct IcpResult {
    pub transform: RigidTransform,
    pub mean_squared_error: f32,
    pub iterations: usize,
    pub converged: bool,
}

/// Iterative closest point: estimate the rigid transform taking `source`
/// onto `target` (both n x 2, cardinalities may differ).
///
/// Alternates exact nearest-neighbor correspondence with a Kabsch
/// least-squares update until the mean squared distance stops improving.
/// Hitting `max_iter` is reported through `converged = false`, not as an
/// error; the caller decides acceptability.
pub fn icp(source: &Mat, target: &Mat, args: &IcpArgs) -> anyhow::Result<IcpResult> {
    check_geometry(source, "source")?;
    check_geometry(target, "target")?;

    let mut moving = source.clone();
    let mut transform = RigidTransform::identity();
    let mut best = (RigidTransform::identity(), f32::INFINITY);
    let mut prev_error = f32::INFINITY;
    let mut iterations = 0;
    let mut converged = false;

    for iter in 0..args.max_iter {
        iterations = iter + 1;

        let pairs = nearest_neighbors(&moving, target, args.block_size);

        let matched = Mat::from_fn(moving.nrows(), 2, |i, j| target[(pairs[i].0, j)]);
        let step = kabsch(&moving, &matched)?;

        moving = step.apply(&moving);
        transform = transform.then(&step);

        let error = mean_squared_error(&moving, target, args.block_size);
        if error < best.1 {
            best = (transform.clone(), error);
        }

        if prev_error - error < args.tol {
            converged = true;
            break;
        }
        prev_error = error;
    }

    let (transform, mean_squared_error) = best;

    if converged {
        info!(
            "icp converged after {} iterations (mse = {:.3e})",
            iterations, mean_squared_error
        );
    } else {
        warn!(
            "icp hit the iteration limit ({}) with mse = {:.3e}",
            args.max_iter, mean_squared_error
        );
    }

    Ok(IcpResult {
        transform,
        mean_squared_error,
        iterations,
        converged,
    })
}

/// Least-squares rigid transform between matched row sets (Kabsch).
///
/// Centroids are removed, the 2x2 cross-covariance is decomposed by SVD,
/// and a reflection (det < 0) is corrected by flipping the last right
/// singular vector so the result is a proper rotation.
pub fn kabsch(source: &Mat, target: &Mat) -> anyhow::Result<RigidTransform> {
    if source.nrows() != target.nrows() {
        anyhow::bail!(
            "kabsch needs matched point sets, got {} vs {}",
            source.nrows(),
            target.nrows()
        );
    }

    let nn = source.nrows() as f32;
    let centroid_src = source.row_sum() / nn;
    let centroid_tgt = target.row_sum() / nn;

    let mut src_c = source.clone();
    let mut tgt_c = target.clone();
    for mut row in src_c.row_iter_mut() {
        row -= &centroid_src;
    }
    for mut row in tgt_c.row_iter_mut() {
        row -= &centroid_tgt;
    }

    // cross-covariance H = Xs^T Xt, rotation R = V U^T
    let hh = src_c.transpose() * &tgt_c;
    let svd = hh.svd(true, true);
    let (Some(uu), Some(v_t)) = (svd.u, svd.v_t) else {
        anyhow::bail!("svd failed on the cross-covariance matrix");
    };

    let mut vv = v_t.transpose();
    let mut rotation = &vv * uu.transpose();

    if rotation.determinant() < 0.0 {
        let ncols = vv.ncols();
        let mut last = vv.column_mut(ncols - 1);
        last.neg_mut();
        rotation = &vv * uu.transpose();
    }

    let centroid_src = DVec::from_iterator(2, centroid_src.iter().cloned());
    let centroid_tgt = DVec::from_iterator(2, centroid_tgt.iter().cloned());
    let translation = centroid_tgt - &rotation * centroid_src;

    Ok(RigidTransform {
        rotation,
        translation,
    })
}

/// For every row of `query`, the nearest row of `target` and its squared
/// distance; ties broken by the lower target index.
fn nearest_neighbors(query: &Mat, target: &Mat, block_size: usize) -> Vec<(usize, f32)> {
    let jobs = create_jobs(query.nrows(), Some(block_size));

    jobs.into_par_iter()
        .flat_map(|(lb, ub)| {
            (lb..ub)
                .map(|i| {
                    let mut best = (0usize, f32::INFINITY);
                    for j in 0..target.nrows() {
                        let dx = query[(i, 0)] - target[(j, 0)];
                        let dy = query[(i, 1)] - target[(j, 1)];
                        let d2 = dx * dx + dy * dy;
                        if d2 < best.1 {
                            best = (j, d2);
                        }
                    }
                    best
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn mean_squared_error(query: &Mat, target: &Mat, block_size: usize) -> f32 {
    let pairs = nearest_neighbors(query, target, block_size);
    pairs.iter().map(|&(_, d2)| d2).sum::<f32>() / pairs.len().max(1) as f32
}

/// Registration is underdetermined with fewer than 3 non-collinear points.
fn check_geometry(points: &Mat, which: &str) -> anyhow::Result<()> {
    if points.ncols() != 2 {
        anyhow::bail!(
            "{} points must be 2D, got {} columns",
            which,
            points.ncols()
        );
    }
    if points.nrows() < 3 {
        anyhow::bail!(
            "insufficient geometry: {} has {} points, need at least 3",
            which,
            points.nrows()
        );
    }

    let nn = points.nrows() as f32;
    let centroid = points.row_sum() / nn;
    let mut centred = points.clone();
    for mut row in centred.row_iter_mut() {
        row -= &centroid;
    }

    let svd = centred.svd(false, false);
    let sv = &svd.singular_values;
    if sv.len() < 2 || sv[1] <= COLLINEAR_TOL * sv[0].max(1.0) {
        anyhow::bail!(
            "insufficient geometry: {} points are collinear, rotation is underdetermined",
            which
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn l_shape(n: usize) -> Mat {
        // two arms of an L, asymmetric on purpose
        let mut rows = vec![];
        for i in 0..n {
            rows.push(i as f32 * 0.5);
            rows.push(0.0);
        }
        for i in 1..n {
            rows.push(0.0);
            rows.push(i as f32 * 0.3);
        }
        Mat::from_row_slice(2 * n - 1, 2, &rows)
    }

    fn rotate_translate(points: &Mat, theta: f32, tx: f32, ty: f32) -> Mat {
        let rot = Mat::from_row_slice(2, 2, &[theta.cos(), -theta.sin(), theta.sin(), theta.cos()]);
        let transform = RigidTransform {
            rotation: rot,
            translation: DVec::from_column_slice(&[tx, ty]),
        };
        transform.apply(points)
    }

    #[test]
    fn test_identity_registration() -> anyhow::Result<()> {
        let points = l_shape(10);
        let result = icp(&points, &points, &IcpArgs::default())?;

        assert!(result.converged);
        assert_abs_diff_eq!(result.mean_squared_error, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(result.transform.angle(), 0.0, epsilon = 1e-4);
        assert!(result.transform.orthogonality_error() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_recover_known_transform() -> anyhow::Result<()> {
        let target = l_shape(12);
        let theta = 0.1f32;
        // source = target moved away; icp should find the inverse motion
        let source = rotate_translate(&target, theta, 0.3, -0.2);

        let result = icp(&source, &target, &IcpArgs::default())?;

        assert!(result.mean_squared_error < 1e-6);
        assert_abs_diff_eq!(result.transform.angle(), -theta, epsilon = 1e-3);

        // applying the recovered transform lands on the target cloud
        let moved = result.transform.apply(&source);
        let first_err: f32 = (moved.row(0) - target.row(0)).norm();
        assert!(first_err < 1e-2);
        Ok(())
    }

    #[test]
    fn test_error_non_increasing() -> anyhow::Result<()> {
        let target = l_shape(12);
        let source = rotate_translate(&target, 0.4, 1.0, 0.5);

        let mut errors = vec![];
        let mut moving = source.clone();
        for _ in 0..8 {
            let result = icp(
                &moving,
                &target,
                &IcpArgs {
                    max_iter: 1,
                    tol: 0.0,
                    block_size: 100,
                },
            )?;
            moving = result.transform.apply(&moving);
            errors.push(result.mean_squared_error);
        }

        for w in errors.windows(2) {
            assert!(w[1] <= w[0] + 1e-6, "error increased: {:?}", errors);
        }
        Ok(())
    }

    #[test]
    fn test_collinear_points_rejected() {
        let line = Mat::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let target = l_shape(5);
        assert!(icp(&line, &target, &IcpArgs::default()).is_err());
    }

    #[test]
    fn test_too_few_points_rejected() {
        let two = Mat::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0]);
        let target = l_shape(5);
        assert!(icp(&two, &target, &IcpArgs::default()).is_err());
    }

    #[test]
    fn test_kabsch_exact_on_matched_pairs() -> anyhow::Result<()> {
        let src = l_shape(8);
        let tgt = rotate_translate(&src, -0.3, 2.0, 1.0);

        let transform = kabsch(&src, &tgt)?;
        let moved = transform.apply(&src);

        for i in 0..src.nrows() {
            assert_abs_diff_eq!(moved[(i, 0)], tgt[(i, 0)], epsilon = 1e-4);
            assert_abs_diff_eq!(moved[(i, 1)], tgt[(i, 1)], epsilon = 1e-4);
        }
        assert!(transform.orthogonality_error() < 1e-5);
        Ok(())
    }
}
