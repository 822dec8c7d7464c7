//! Closed-form least-squares similarity fit and degeneracy checks.

use crate::transform::Transform;

pub type Point = (f64, f64);

/// Relative eigenvalue ratio below which a point cloud counts as a line.
const COLLINEAR_RATIO: f64 = 1e-9;
/// Points closer than this are treated as coincident.
const COINCIDENT_EPS: f64 = 1e-9;

fn centroid(points: &[Point]) -> Point {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Least-squares similarity mapping `src[i]` onto `dst[i]`.
///
/// Returns `None` for fewer than two pairs, mismatched lengths or when all
/// source points coincide.
pub fn fit_similarity(src: &[Point], dst: &[Point]) -> Option<Transform> {
    if src.len() < 2 || src.len() != dst.len() {
        return None;
    }

    let cs = centroid(src);
    let cd = centroid(dst);

    let (mut num_a, mut num_b, mut den) = (0.0, 0.0, 0.0);
    for (s, d) in src.iter().zip(dst) {
        let (xs, ys) = (s.0 - cs.0, s.1 - cs.1);
        let (xd, yd) = (d.0 - cd.0, d.1 - cd.1);
        num_a += xs * xd + ys * yd;
        num_b += xs * yd - ys * xd;
        den += xs * xs + ys * ys;
    }

    if den <= COINCIDENT_EPS * COINCIDENT_EPS {
        return None;
    }

    let a = num_a / den;
    let b = num_b / den;
    let tx = cd.0 - (a * cs.0 - b * cs.1);
    let ty = cd.1 - (b * cs.0 + a * cs.1);
    let transform = Transform::from_params(a, b, tx, ty);
    transform.is_finite().then_some(transform)
}

/// Why a point set cannot constrain a similarity, if it cannot.
pub fn degeneracy(points: &[Point]) -> Option<&'static str> {
    if points.len() < 2 {
        return Some("fewer than two points");
    }

    let c = centroid(points);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let (dx, dy) = (x - c.0, y - c.1);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    let trace = sxx + syy;
    if trace <= COINCIDENT_EPS * COINCIDENT_EPS * points.len() as f64 {
        return Some("all points coincide");
    }

    let disc = ((sxx - syy) * (sxx - syy) + 4.0 * sxy * sxy).sqrt();
    let major = 0.5 * (trace + disc);
    let minor = 0.5 * (trace - disc);
    if minor <= COLLINEAR_RATIO * major {
        return Some("all points are collinear");
    }
    None
}

pub fn reprojection_error(transform: &Transform, src: Point, dst: Point) -> f64 {
    let (x, y) = transform.apply(src.0, src.1);
    (x - dst.0).hypot(y - dst.1)
}
