use std::collections::HashMap;

use delaunator::{triangulate, Point};
use log::info;
use nalgebra::DMatrix;

type Mat = DMatrix<f32>;

/// Outer boundary of a 2D point cloud under the α-shape criterion.
///
/// Indices refer to rows of the input coordinate matrix. `edges` is an
/// unordered set of boundary segments; no sequential polygon tracing is
/// implied.
#[derive(Debug, Clone)]
pub struct BoundarySet {
    pub points: Vec<usize>,
    pub edges: Vec<(usize, usize)>,
}

pub struct AlphaShapeArgs {
    /// Shape parameter; triangles with circumradius < 1/α are retained.
    pub alpha: f32,
    /// Keep only edges on the outer rim (used by exactly one triangle).
    pub only_outer: bool,
}

impl Default for AlphaShapeArgs {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            only_outer: true,
        }
    }
}

/// Extract the α-shape boundary of `coords` (n x 2, one point per row).
///
/// Duplicated coordinates are collapsed before triangulation and reported
/// under the first original index. An α that retains no triangle is an
/// error, never an empty boundary.
pub fn alpha_shape(coords: &Mat, args: &AlphaShapeArgs) -> anyhow::Result<BoundarySet> {
    if args.alpha <= 0.0 {
        anyhow::bail!("alpha must be positive, got {}", args.alpha);
    }
    if coords.ncols() != 2 {
        anyhow::bail!("alpha shape expects 2D coordinates, got {} columns", coords.ncols());
    }

    //////////////////////////////////////////////////////
    // step 1: deduplicate points, keep original indices //
    //////////////////////////////////////////////////////

    let mut seen: HashMap<(u64, u64), usize> = HashMap::new();
    let mut points: Vec<Point> = vec![];
    let mut original: Vec<usize> = vec![];

    for i in 0..coords.nrows() {
        let (x, y) = (coords[(i, 0)] as f64, coords[(i, 1)] as f64);
        let key = (x.to_bits(), y.to_bits());
        if seen.contains_key(&key) {
            continue;
        }
        seen.insert(key, points.len());
        points.push(Point { x, y });
        original.push(i);
    }

    if points.len() < 3 {
        anyhow::bail!(
            "alpha shape needs at least 3 distinct points, got {}",
            points.len()
        );
    }

    /////////////////////////////////////////////////////
    // step 2: Delaunay triangulation + α filter       //
    /////////////////////////////////////////////////////

    let triangulation = triangulate(&points);
    if triangulation.triangles.is_empty() {
        anyhow::bail!("degenerate point set: no Delaunay triangles");
    }

    let r_max = 1.0 / args.alpha as f64;
    let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
    let mut n_kept = 0usize;

    for tri in triangulation.triangles.chunks(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        if circumradius(&points[a], &points[b], &points[c]) >= r_max {
            continue;
        }
        n_kept += 1;
        for (u, v) in [(a, b), (b, c), (c, a)] {
            let key = (u.min(v), u.max(v));
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }

    if n_kept == 0 {
        anyhow::bail!(
            "alpha = {} retained no triangles; boundary is undefined",
            args.alpha
        );
    }

    info!(
        "alpha shape kept {} / {} triangles",
        n_kept,
        triangulation.triangles.len() / 3
    );

    ///////////////////////////////////////////////
    // step 3: collect boundary edges and points //
    ///////////////////////////////////////////////

    let mut edges: Vec<(usize, usize)> = edge_count
        .into_iter()
        .filter(|&(_, count)| !args.only_outer || count == 1)
        .map(|((u, v), _)| {
            let (i, j) = (original[u], original[v]);
            (i.min(j), i.max(j))
        })
        .collect();
    edges.sort_unstable();

    let mut boundary_points: Vec<usize> = edges
        .iter()
        .flat_map(|&(i, j)| [i, j])
        .collect();
    boundary_points.sort_unstable();
    boundary_points.dedup();

    Ok(BoundarySet {
        points: boundary_points,
        edges,
    })
}

/// Circumradius of the triangle (p1, p2, p3); infinite when degenerate.
fn circumradius(p1: &Point, p2: &Point, p3: &Point) -> f64 {
    let a = ((p2.x - p3.x).powi(2) + (p2.y - p3.y).powi(2)).sqrt();
    let b = ((p1.x - p3.x).powi(2) + (p1.y - p3.y).powi(2)).sqrt();
    let c = ((p1.x - p2.x).powi(2) + (p1.y - p2.y).powi(2)).sqrt();

    let cross = (p2.x - p1.x) * (p3.y - p1.y) - (p3.x - p1.x) * (p2.y - p1.y);
    let area = 0.5 * cross.abs();

    if area <= f64::EPSILON {
        return f64::INFINITY;
    }
    a * b * c / (4.0 * area)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points on a unit circle plus interior points.
    fn ring_with_interior(n_ring: usize) -> Mat {
        let mut rows = vec![];
        for i in 0..n_ring {
            let t = 2.0 * std::f32::consts::PI * (i as f32) / (n_ring as f32);
            rows.push(t.cos());
            rows.push(t.sin());
        }
        // interior
        rows.extend_from_slice(&[0.0, 0.0, 0.2, 0.1, -0.1, 0.3]);
        Mat::from_row_slice(n_ring + 3, 2, &rows)
    }

    #[test]
    fn test_large_alpha_matches_convex_hull() -> anyhow::Result<()> {
        let coords = ring_with_interior(12);
        // generous radius bound: every triangle retained
        let boundary = alpha_shape(
            &coords,
            &AlphaShapeArgs {
                alpha: 1e-3,
                only_outer: true,
            },
        )?;

        // the hull of a ring is the ring itself; interior points excluded
        assert_eq!(boundary.points, (0..12).collect::<Vec<_>>());
        assert_eq!(boundary.edges.len(), 12);
        Ok(())
    }

    #[test]
    fn test_overly_strict_alpha_fails() {
        let coords = ring_with_interior(12);
        let result = alpha_shape(
            &coords,
            &AlphaShapeArgs {
                alpha: 1e6,
                only_outer: true,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_alpha_fails() {
        let coords = ring_with_interior(8);
        assert!(alpha_shape(
            &coords,
            &AlphaShapeArgs {
                alpha: 0.0,
                only_outer: true
            }
        )
        .is_err());
    }

    #[test]
    fn test_duplicates_are_collapsed() -> anyhow::Result<()> {
        let mut rows = vec![];
        for i in 0..8 {
            let t = 2.0 * std::f32::consts::PI * (i as f32) / 8.0;
            rows.push(t.cos());
            rows.push(t.sin());
        }
        // duplicate of point 0 appended at the end
        rows.push(1.0);
        rows.push(0.0);
        let coords = Mat::from_row_slice(9, 2, &rows);

        let boundary = alpha_shape(
            &coords,
            &AlphaShapeArgs {
                alpha: 0.5,
                only_outer: true,
            },
        )?;
        // the duplicate is reported under its first index only
        assert!(boundary.points.contains(&0));
        assert!(!boundary.points.contains(&8));
        Ok(())
    }

    #[test]
    fn test_too_few_points_fail() {
        let coords = Mat::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]);
        assert!(alpha_shape(&coords, &AlphaShapeArgs::default()).is_err());
    }
}
