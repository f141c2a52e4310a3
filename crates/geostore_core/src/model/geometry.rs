//! Planar geometry kernels used by lines and spatial queries.
//!
//! All functions work on `(x, y)` only; elevation never affects distances.

use super::geo_object::Position;

/// Closest point of a polyline to a query position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Index of the segment's first vertex in the input slice.
    pub segment: usize,
    /// Closest position on that segment.
    pub position: Position,
    pub distance: f64,
}

/// Projects `p` onto segment `a..b`, clamped to the segment's extent.
pub fn project_onto_segment(p: Position, a: Position, b: Position) -> Position {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return a;
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / length_sq).clamp(0.0, 1.0);
    Position::new(a.x + t * dx, a.y + t * dy)
}

/// Finds the nearest point on the polyline through `vertices`.
///
/// Exact distance ties keep the earliest segment. A single vertex is treated
/// as a degenerate segment; an empty slice has no answer.
pub fn nearest_on_polyline(p: Position, vertices: &[Position]) -> Option<SegmentHit> {
    match vertices {
        [] => None,
        [only] => Some(SegmentHit {
            segment: 0,
            position: *only,
            distance: p.distance_to(*only),
        }),
        _ => {
            let mut best: Option<SegmentHit> = None;
            for (index, pair) in vertices.windows(2).enumerate() {
                let position = project_onto_segment(p, pair[0], pair[1]);
                let distance = p.distance_to(position);
                if best.map_or(true, |hit| distance < hit.distance) {
                    best = Some(SegmentHit {
                        segment: index,
                        position,
                        distance,
                    });
                }
            }
            best
        }
    }
}

/// Even-odd ray-crossing test against the ring through `vertices`.
///
/// The ring is closed implicitly (last vertex connects to the first), so a
/// repeated closing vertex is harmless. Points exactly on an edge may fall
/// either way; callers that need boundary hits use [`nearest_on_polyline`].
pub fn ring_contains(p: Position, vertices: &[Position]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (vi, vj) = (vertices[i], vertices[j]);
        if (vi.y > p.y) != (vj.y > p.y) {
            let crossing_x = (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
            if p.x < crossing_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Planar distance between the first and last vertex.
pub fn endpoint_gap(vertices: &[Position]) -> f64 {
    match (vertices.first(), vertices.last()) {
        (Some(first), Some(last)) => first.distance_to(*last),
        _ => 0.0,
    }
}

pub fn polyline_length(vertices: &[Position]) -> f64 {
    vertices
        .windows(2)
        .map(|pair| pair[0].distance_to(pair[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{
        endpoint_gap, nearest_on_polyline, polyline_length, project_onto_segment, ring_contains,
    };
    use crate::model::geo_object::Position;

    fn p(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn projection_is_clamped_to_segment() {
        assert_eq!(project_onto_segment(p(5.0, 3.0), p(0.0, 0.0), p(10.0, 0.0)), p(5.0, 0.0));
        assert_eq!(project_onto_segment(p(-4.0, 3.0), p(0.0, 0.0), p(10.0, 0.0)), p(0.0, 0.0));
        assert_eq!(project_onto_segment(p(14.0, 3.0), p(0.0, 0.0), p(10.0, 0.0)), p(10.0, 0.0));
        assert_eq!(project_onto_segment(p(1.0, 1.0), p(2.0, 2.0), p(2.0, 2.0)), p(2.0, 2.0));
    }

    #[test]
    fn nearest_point_scans_all_segments() {
        let line = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0)];
        let hit = nearest_on_polyline(p(5.0, 1.0), &line).unwrap();
        assert_eq!(hit.segment, 0);
        assert_eq!(hit.distance, 1.0);

        let hit = nearest_on_polyline(p(12.0, 6.0), &line).unwrap();
        assert_eq!(hit.segment, 1);
        assert_eq!(hit.position, p(10.0, 6.0));
        assert_eq!(hit.distance, 2.0);
    }

    #[test]
    fn nearest_point_ties_keep_lowest_segment() {
        // Corner vertex (10, 0) is equally close through both segments.
        let line = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0)];
        let hit = nearest_on_polyline(p(11.0, -1.0), &line).unwrap();
        assert_eq!(hit.segment, 0);
        assert_eq!(hit.position, p(10.0, 0.0));
    }

    #[test]
    fn ring_contains_uses_even_odd_rule() {
        let square = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0), p(0.0, 0.0)];
        assert!(ring_contains(p(5.0, 5.0), &square));
        assert!(!ring_contains(p(15.0, 5.0), &square));
        assert!(!ring_contains(p(5.0, -0.5), &square));

        let concave = [p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(5.0, 2.0), p(0.0, 10.0)];
        assert!(!ring_contains(p(5.0, 8.0), &concave));
        assert!(ring_contains(p(2.0, 2.0), &concave));
    }

    #[test]
    fn length_and_gap_are_planar() {
        let line = [p(0.0, 0.0), p(3.0, 4.0), p(3.0, 0.0)];
        assert_eq!(polyline_length(&line), 9.0);
        assert_eq!(endpoint_gap(&line), 3.0);
        assert_eq!(endpoint_gap(&[]), 0.0);
    }
}
