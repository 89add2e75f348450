use spatial_util::knn_graph::{GraphMode, KnnGraph, KnnGraphArgs};

fn grid(nx: usize, ny: usize) -> nalgebra::DMatrix<f32> {
    let mut rows = vec![];
    for i in 0..nx {
        for j in 0..ny {
            rows.push(i as f32);
            rows.push(j as f32);
        }
    }
    nalgebra::DMatrix::from_row_slice(nx * ny, 2, &rows)
}

#[test]
fn grid_graph_invariants() -> anyhow::Result<()> {
    let coords = grid(8, 8);
    let k = 4;

    let graph = KnnGraph::from_rows(
        &coords,
        &KnnGraphArgs {
            knn: k,
            block_size: 16,
            mode: GraphMode::Mutual,
        },
    )?;

    assert_eq!(graph.num_nodes(), 64);

    for node in 0..graph.num_nodes() {
        let neighbors = graph.neighbors(node);
        assert!(neighbors.len() <= k, "degree over k at node {}", node);
        assert!(!neighbors.contains(&node), "self-loop at node {}", node);
        for &other in neighbors {
            assert!(graph.neighbors(other).contains(&node));
        }
    }
    Ok(())
}

#[test]
fn propagation_operator_mixes_neighbors() -> anyhow::Result<()> {
    let coords = grid(5, 5);
    let graph = KnnGraph::from_rows(
        &coords,
        &KnnGraphArgs {
            knn: 4,
            block_size: 10,
            mode: GraphMode::Union,
        },
    )?;

    let a_hat = graph.propagation_operator();

    // one smoothing pass over a one-hot signal spreads mass to neighbors
    let mut x = nalgebra::DMatrix::<f32>::zeros(25, 1);
    x[(12, 0)] = 1.0;

    let mut y = nalgebra::DMatrix::<f32>::zeros(25, 1);
    for (i, j, v) in a_hat.triplet_iter() {
        y[(i, 0)] += v * x[(j, 0)];
    }

    assert!(y[(12, 0)] > 0.0);
    let spread = (0..25).filter(|&i| y[(i, 0)] > 0.0).count();
    assert!(spread > 1, "propagation did not reach neighbors");
    Ok(())
}
