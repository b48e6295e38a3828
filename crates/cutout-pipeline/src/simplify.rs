//! Contour simplification and point classification.
//!
//! Douglas-Peucker reduces the traced pixel chain to its structural
//! points: points within `tolerance` pixels of the chord between their
//! segment endpoints are removed. Retained points are then classified
//! by local turning angle and shifted from ROI-local into global image
//! coordinates.

use crate::types::{ContourPath, ContourPoint, Point, PointClass};

/// Turning angle above which a point is a corner.
const CORNER_TURN_DEGREES: f64 = 60.0;
/// Turning angle above which a point is a curve.
const CURVE_TURN_DEGREES: f64 = 30.0;

/// Simplify a point sequence with the Douglas-Peucker algorithm.
///
/// Never increases the point count and always preserves the first and
/// last input points. Sequences with fewer than 3 points are returned
/// unchanged (nothing to simplify).
#[must_use = "returns the simplified points"]
pub fn simplify_points(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;

    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect()
}

/// Recursive step of the Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` farthest from the chord
/// between them. If that distance exceeds `tolerance`, the point is
/// kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line through `a` and `b`.
///
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

/// Turning angle at `b` between segments `a->b` and `b->c`, in degrees.
fn turning_angle(a: Point, b: Point, c: Point) -> f64 {
    let v1 = (b.x - a.x, b.y - a.y);
    let v2 = (c.x - b.x, c.y - b.y);
    let len1 = v1.0.hypot(v1.1);
    let len2 = v2.0.hypot(v2.1);
    if len1 == 0.0 || len2 == 0.0 {
        return 0.0;
    }
    let cos = (v1.0.mul_add(v2.0, v1.1 * v2.1) / (len1 * len2)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Classify simplified points by local turning angle.
///
/// Interior points turn into corners above [`CORNER_TURN_DEGREES`],
/// curves above [`CURVE_TURN_DEGREES`], and edges otherwise; the first
/// and last points are endpoints.
fn classify(points: &[Point]) -> Vec<ContourPoint> {
    let last = points.len().saturating_sub(1);
    points
        .iter()
        .enumerate()
        .map(|(i, &point)| {
            let class = if i == 0 || i == last {
                PointClass::Endpoint
            } else {
                let turn = turning_angle(points[i - 1], point, points[i + 1]);
                if turn > CORNER_TURN_DEGREES {
                    PointClass::Corner
                } else if turn > CURVE_TURN_DEGREES {
                    PointClass::Curve
                } else {
                    PointClass::Edge
                }
            };
            ContourPoint { point, class }
        })
        .collect()
}

/// Simplify a traced ROI-local pixel chain, classify the survivors, and
/// convert them to global image coordinates.
#[must_use = "returns the simplified, classified contour"]
pub fn simplify_and_classify(
    raw: &[(u32, u32)],
    tolerance: f64,
    roi_origin: (u32, u32),
) -> ContourPath {
    let points: Vec<Point> = raw
        .iter()
        .map(|&(x, y)| Point::new(f64::from(x), f64::from(y)))
        .collect();
    let reduced = simplify_points(&points, tolerance);
    let classified = classify(&reduced)
        .into_iter()
        .map(|cp| ContourPoint {
            point: Point::new(
                cp.point.x + f64::from(roi_origin.0),
                cp.point.y + f64::from(roi_origin.1),
            ),
            class: cp.class,
        })
        .collect();
    ContourPath::new(classified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collinear_points_collapse_to_endpoints() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
            Point::new(4.0, 4.0),
        ];
        let result = simplify_points(&points, 0.1);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], Point::new(0.0, 0.0));
        assert_eq!(result[1], Point::new(4.0, 4.0));
    }

    #[test]
    fn simplification_never_increases_point_count() {
        let points: Vec<Point> = (0..50)
            .map(|i| {
                let x = f64::from(i);
                Point::new(x, (x * 0.7).sin() * 3.0)
            })
            .collect();
        for tolerance in [0.0, 0.5, 1.0, 5.0] {
            let result = simplify_points(&points, tolerance);
            assert!(result.len() <= points.len());
            assert_eq!(result[0], points[0]);
            assert_eq!(result[result.len() - 1], points[points.len() - 1]);
        }
    }

    #[test]
    fn zero_tolerance_preserves_zigzag() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 2.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 2.0),
            Point::new(4.0, 0.0),
        ];
        let result = simplify_points(&points, 0.0);
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn short_input_unchanged() {
        let points = vec![Point::new(0.0, 0.0), Point::new(5.0, 0.0)];
        assert_eq!(simplify_points(&points, 2.0), points);
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }

    #[test]
    fn right_angle_is_a_corner() {
        let turn = turning_angle(
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(5.0, 5.0),
        );
        assert!((turn - 90.0).abs() < 1e-9);
    }

    #[test]
    fn classification_tags_endpoints_and_corners() {
        // Open L shape: 9 collinear-free points won't survive RDP, so
        // classify a hand-picked simplified sequence directly.
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ];
        let classified = classify(&points);
        assert_eq!(classified[0].class, PointClass::Endpoint);
        assert_eq!(classified[1].class, PointClass::Corner);
        assert_eq!(classified[2].class, PointClass::Endpoint);
    }

    #[test]
    fn shallow_turn_is_a_curve() {
        // 45 degree turn: between the 30 degree curve threshold and the
        // 60 degree corner threshold.
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 10.0),
        ];
        let classified = classify(&points);
        assert_eq!(classified[1].class, PointClass::Curve);
    }

    #[test]
    fn straight_run_is_an_edge() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.1),
            Point::new(20.0, 0.0),
        ];
        let classified = classify(&points);
        assert_eq!(classified[1].class, PointClass::Edge);
    }

    #[test]
    fn simplify_and_classify_converts_to_global_coordinates() {
        let raw: Vec<(u32, u32)> = vec![(0, 0), (5, 0), (5, 5)];
        let path = simplify_and_classify(&raw, 1.0, (100, 200));
        assert_eq!(path.len(), 3);
        let first = path.points()[0].point;
        assert!((first.x - 100.0).abs() < f64::EPSILON);
        assert!((first.y - 200.0).abs() < f64::EPSILON);
        let corner = path.points()[1];
        assert_eq!(corner.class, PointClass::Corner);
        assert!((corner.point.x - 105.0).abs() < f64::EPSILON);
    }
}
