#![allow(dead_code)]

pub type Mat = nalgebra::DMatrix<f32>;
pub type DVec = nalgebra::DVector<f32>;
pub type CscMat = nalgebra_sparse::CscMatrix<f32>;

pub use spatial_util::alpha_shape::{alpha_shape, AlphaShapeArgs, BoundarySet};
pub use spatial_util::common_io::{
    open_buf_reader, open_buf_writer, read_delim_matrix, read_lines, write_delim_matrix,
};
pub use spatial_util::dmatrix_util::{
    concatenate_vertical, log1p_inplace, normalize_rows_inplace, row_sq_distances,
    scale_columns_inplace,
};
pub use spatial_util::icp::{icp, IcpArgs, IcpResult, RigidTransform};
pub use spatial_util::knn_graph::{GraphMode, KnnGraph, KnnGraphArgs};
pub use spatial_util::rsvd::RSVD;

pub use log::{info, warn};
pub use std::collections::HashMap;

pub use crate::error::AlignError;
