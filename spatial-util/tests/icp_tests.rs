use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use spatial_util::icp::{icp, IcpArgs, RigidTransform};

fn noisy_blob(n: usize) -> DMatrix<f32> {
    // deterministic pseudo-random cloud, no rotational symmetry
    let mut rows = vec![];
    for i in 0..n {
        let x = ((i * 37 + 11) % 101) as f32 / 10.0;
        let y = ((i * 53 + 29) % 89) as f32 / 10.0 + 0.02 * x * x;
        rows.push(x);
        rows.push(y);
    }
    DMatrix::from_row_slice(n, 2, &rows)
}

#[test]
fn registration_of_rotated_copy() -> anyhow::Result<()> {
    let target = noisy_blob(60);

    let theta = 0.05f32;
    let rot = DMatrix::from_row_slice(
        2,
        2,
        &[theta.cos(), -theta.sin(), theta.sin(), theta.cos()],
    );
    let offset = RigidTransform {
        rotation: rot,
        translation: DVector::from_column_slice(&[0.3, -0.15]),
    };
    let source = offset.apply(&target);

    let result = icp(&source, &target, &IcpArgs::default())?;

    assert!(result.mean_squared_error < 1e-4);
    assert_abs_diff_eq!(result.transform.angle(), -theta, epsilon = 1e-2);
    assert!(result.transform.orthogonality_error() < 1e-3);
    Ok(())
}

#[test]
fn different_cardinalities_are_fine() -> anyhow::Result<()> {
    let target = noisy_blob(80);
    let source = target.rows(0, 50).into_owned();

    let result = icp(&source, &target, &IcpArgs::default())?;
    assert!(result.mean_squared_error < 1e-6);
    Ok(())
}
