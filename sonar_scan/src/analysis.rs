//! Geometry summary of a finished sweep.
//!
//! Valid readings are projected onto the scan plane and closed with the
//! sensor origin; the summary is taken from the convex hull of that set.

use sonar_common::consts::MIN_ANALYSIS_POINTS;
use sonar_common::session::{AnalysisSummary, is_valid_distance, project};

/// A point on the scan plane [cm].
pub type Point = (f64, f64);

/// Summarise an `(angle, distance)` profile.
///
/// Returns `None` when fewer than [`MIN_ANALYSIS_POINTS`] readings are
/// valid.
pub fn analyze(profile: &[(f64, f64)], max_range_cm: f64) -> Option<AnalysisSummary> {
    let points: Vec<Point> = profile
        .iter()
        .filter(|(_, d)| is_valid_distance(*d, max_range_cm))
        .map(|&(angle, d)| project(angle, d))
        .collect();
    if points.len() < MIN_ANALYSIS_POINTS {
        return None;
    }

    let (min_x, max_x, max_y) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(min_x, max_x, max_y), &(x, y)| (min_x.min(x), max_x.max(x), max_y.max(y)),
    );

    let mut with_origin = points;
    with_origin.push((0.0, 0.0));
    let hull = convex_hull(with_origin);

    Some(AnalysisSummary {
        area_cm2: polygon_area(&hull),
        perimeter_cm: polygon_perimeter(&hull),
        max_width_cm: max_x - min_x,
        max_depth_cm: max_y.max(0.0),
    })
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Counter-clockwise hull (Andrew's monotone chain), collinear points
/// dropped.
pub fn convex_hull(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<Point> = Vec::with_capacity(points.len());
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    // Each chain ends where the other starts.
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Shoelace area.
pub fn polygon_area(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum();
    twice.abs() / 2.0
}

/// Closed perimeter.
pub fn polygon_perimeter(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let (a, b) = (polygon[i], polygon[(i + 1) % n]);
            (b.0 - a.0).hypot(b.1 - a.1)
        })
        .sum()
}

// ─── Tests ──────────────────────────────────────────────────────────
