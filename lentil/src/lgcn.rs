use candle_core::{Device, Tensor, Var};
use candle_nn::{Linear, Module};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::align_common::*;

/// Light graph convolution: `depth` rounds of multiplication by the
/// normalized operator Â, averaged over all hops (hop 0 included). No
/// learnable parameters; depth is the caller's smoothing dial.
pub fn propagate(a_hat: &CscMat, x: &Mat, depth: usize) -> Mat {
    let mut acc = x.clone();
    let mut cur = x.clone();

    for _ in 0..depth {
        cur = spmm(a_hat, &cur);
        acc += &cur;
    }
    acc / (depth as f32 + 1.0)
}

/// Sparse-dense product `A * X` over the CSC triplets.
fn spmm(a: &CscMat, x: &Mat) -> Mat {
    let mut out = Mat::zeros(x.nrows(), x.ncols());
    for (i, j, v) in a.triplet_iter() {
        for c in 0..x.ncols() {
            out[(i, c)] += v * x[(j, c)];
        }
    }
    out
}

/// Two-layer MLP mapping propagated features into the shared latent space.
/// One instance is shared by both samples within a run; parameters are
/// initialized from the run seed so identical runs produce identical
/// embeddings.
pub struct LgcnProjector {
    fc1: Linear,
    fc2: Linear,
    vars: Vec<Var>,
    dim_in: usize,
    dim_latent: usize,
}

impl LgcnProjector {
    pub fn new(
        dim_in: usize,
        dim_hidden: usize,
        dim_latent: usize,
        seed: u64,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);

        let w1 = seeded_kaiming(dim_hidden, dim_in, &mut rng, device)?;
        let b1 = Var::from_tensor(&Tensor::zeros(dim_hidden, candle_core::DType::F32, device)?)?;
        let w2 = seeded_kaiming(dim_latent, dim_hidden, &mut rng, device)?;
        let b2 = Var::from_tensor(&Tensor::zeros(dim_latent, candle_core::DType::F32, device)?)?;

        let fc1 = Linear::new(w1.as_tensor().clone(), Some(b1.as_tensor().clone()));
        let fc2 = Linear::new(w2.as_tensor().clone(), Some(b2.as_tensor().clone()));

        Ok(Self {
            fc1,
            fc2,
            vars: vec![w1, b1, w2, b2],
            dim_in,
            dim_latent,
        })
    }

    pub fn forward(&self, x_nd: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.fc1.forward(x_nd)?.relu()?;
        self.fc2.forward(&h)
    }

    pub fn trainable_vars(&self) -> Vec<Var> {
        self.vars.clone()
    }

    pub fn dim_in(&self) -> usize {
        self.dim_in
    }

    pub fn dim_latent(&self) -> usize {
        self.dim_latent
    }

    /// Map a full propagated feature matrix (rows = entities) into the
    /// latent space.
    pub fn project_rows(&self, x: &Mat, device: &Device) -> anyhow::Result<Mat> {
        let x_nd = mat_to_tensor(x, device)?;
        let z_nk = self.forward(&x_nd)?;
        tensor_to_mat(&z_nk)
    }
}

/// Kaiming-normal weight matrix (out x in) drawn from an explicit rng.
fn seeded_kaiming(
    dim_out: usize,
    dim_in: usize,
    rng: &mut StdRng,
    device: &Device,
) -> anyhow::Result<Var> {
    let std = (2.0 / dim_in as f32).sqrt();
    let data: Vec<f32> = (0..dim_out * dim_in)
        .map(|_| {
            let z: f32 = rng.sample(StandardNormal);
            z * std
        })
        .collect();
    let tensor = Tensor::from_vec(data, (dim_out, dim_in), device)?;
    Ok(Var::from_tensor(&tensor)?)
}

/// Row-major copy of a dense matrix into a 2D tensor.
pub fn mat_to_tensor(x: &Mat, device: &Device) -> anyhow::Result<Tensor> {
    let (n, d) = (x.nrows(), x.ncols());
    let mut data = Vec::with_capacity(n * d);
    for i in 0..n {
        for j in 0..d {
            data.push(x[(i, j)]);
        }
    }
    Ok(Tensor::from_vec(data, (n, d), device)?)
}

pub fn tensor_to_mat(t: &Tensor) -> anyhow::Result<Mat> {
    let rows = t.to_vec2::<f32>()?;
    let n = rows.len();
    let d = rows.first().map(|r| r.len()).unwrap_or(0);
    Ok(Mat::from_row_iterator(n, d, rows.into_iter().flatten()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spatial_util::knn_graph::{KnnGraph, KnnGraphArgs};

    #[test]
    fn test_propagation_smooths_neighbors() -> anyhow::Result<()> {
        // 4 points on a line; one-hot feature on node 0
        let coords = Mat::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let graph = KnnGraph::from_rows(
            &coords,
            &KnnGraphArgs {
                knn: 1,
                block_size: 10,
                mode: spatial_util::knn_graph::GraphMode::Union,
            },
        )?;

        let x = Mat::from_fn(4, 1, |i, _| if i == 0 { 1.0 } else { 0.0 });
        let propagated = propagate(&graph.propagation_operator(), &x, 2);

        // mass reaches the neighbor, stays concentrated at the origin
        assert!(propagated[(0, 0)] > propagated[(1, 0)]);
        assert!(propagated[(1, 0)] > 0.0);
        Ok(())
    }

    #[test]
    fn test_depth_zero_is_identity() {
        let mut coo = nalgebra_sparse::CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0f32);
        coo.push(1, 1, 1.0f32);
        let a_hat = CscMat::from(&coo);

        let x = Mat::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(propagate(&a_hat, &x, 0), x);
    }

    #[test]
    fn test_projector_deterministic() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let x = Mat::from_fn(5, 6, |i, j| (i + j) as f32 * 0.1);

        let p1 = LgcnProjector::new(6, 8, 4, 42, &device)?;
        let p2 = LgcnProjector::new(6, 8, 4, 42, &device)?;

        let z1 = p1.project_rows(&x, &device)?;
        let z2 = p2.project_rows(&x, &device)?;
        assert_eq!(z1, z2);
        assert_eq!(z1.ncols(), 4);
        Ok(())
    }

    #[test]
    fn test_tensor_roundtrip() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let x = Mat::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = mat_to_tensor(&x, &device)?;
        assert_eq!(t.dims(), &[2, 3]);
        let y = tensor_to_mat(&t)?;
        assert_eq!(x, y);
        Ok(())
    }
}
