use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dmatrix_util::rnorm;

type Mat = DMatrix<f32>;
type DVec = DVector<f32>;

const OVERSAMPLE: usize = 5;
const POWER_ITER: usize = 5;

/// Randomized truncated SVD, `X ~ U * diag(S) * V^T`.
///
/// Halko et al. (2009) randomized subspace iteration: sketch the range with
/// a Gaussian test matrix, re-orthonormalize by QR at every power step, then
/// take the exact SVD of the small projected matrix.
pub trait RSVD {
    fn rsvd(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, DVec, Mat)>;
}

impl RSVD for Mat {
    fn rsvd(&self, rank: usize, seed: u64) -> anyhow::Result<(Mat, DVec, Mat)> {
        let nr = self.nrows();
        let nc = self.ncols();

        if rank == 0 {
            anyhow::bail!("rsvd rank must be at least 1");
        }

        let rank = rank.min(nr).min(nc);
        let sketch = (rank + OVERSAMPLE).min(nr).min(nc);

        let mut rng = StdRng::seed_from_u64(seed);

        ///////////////////////////////////////////////////
        // step 1: random sketch of the range of X       //
        ///////////////////////////////////////////////////

        let omega = rnorm(nc, sketch, &mut rng);
        let mut qq = (self * omega).qr().q();

        for _ in 0..POWER_ITER {
            let ww = (self.transpose() * &qq).qr().q();
            qq = (self * ww).qr().q();
        }

        ///////////////////////////////////////////////////
        // step 2: exact SVD of the projected matrix     //
        ///////////////////////////////////////////////////

        let bb = qq.transpose() * self;
        let svd = bb.svd(true, true);

        let (Some(svd_u), Some(svd_vt)) = (svd.u, svd.v_t) else {
            anyhow::bail!("svd failed on the projected matrix");
        };

        let kk = rank.min(svd.singular_values.len());

        let u_vectors = &qq * svd_u.columns(0, kk).into_owned();
        let v_vectors = svd_vt.transpose().columns(0, kk).into_owned();
        let singular_values = svd.singular_values.rows(0, kk).into_owned();

        Ok((u_vectors, singular_values, v_vectors))
    }
}
