pub mod alpha_shape;
pub mod common_io;
pub mod dmatrix_util;
pub mod icp;
pub mod knn_graph;
pub mod rsvd;
pub mod utils;
