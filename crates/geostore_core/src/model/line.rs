//! Line domain model and its geometric helpers.
//!
//! # Responsibility
//! - Hold a line's vertices in rank order.
//! - Answer nearest-point, containment and length questions.
//!
//! # Invariants
//! - `vertices` holds ranks `0..n` in order, without gaps.
//! - A line has at least 2 vertices.
//! - A closed line's first and last vertex coincide in `(x, y)` within tolerance.

use super::geo_object::{
    Coordinate, Extent, GeoKind, GeoMeta, GeoObject, GeometryError, LineId, ObjectId, Position,
};
use super::geometry::{endpoint_gap, nearest_on_polyline, polyline_length, ring_contains};
use super::point::Point;
use super::stratigraphy::UnitId;
use serde::{Deserialize, Serialize};

/// Nearest location on a line to a query position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    pub position: Position,
    pub distance: f64,
    /// Rank of the vertex that starts the closest segment.
    pub segment_start_rank: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub closed: bool,
    /// Stratigraphic unit of the line, shared by all of its vertices.
    pub horizon_id: Option<UnitId>,
    /// Owned vertices in rank order.
    pub vertices: Vec<Point>,
    pub meta: GeoMeta,
}

impl Line {
    pub fn positions(&self) -> Vec<Position> {
        self.vertices.iter().map(|v| v.coordinate.position()).collect()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.vertices.iter().map(|v| v.coordinate).collect()
    }

    pub fn ranks(&self) -> Vec<i64> {
        self.vertices.iter().filter_map(Point::rank).collect()
    }

    /// Planar length along the vertices.
    pub fn length(&self) -> f64 {
        polyline_length(&self.positions())
    }

    /// Projects `query` onto every segment and keeps the closest hit.
    ///
    /// Ties resolve to the segment with the lowest starting rank.
    pub fn nearest_point(&self, query: Position) -> Option<NearestPoint> {
        let hit = nearest_on_polyline(query, &self.positions())?;
        let segment_start_rank = self.vertices.get(hit.segment).and_then(Point::rank)?;
        Some(NearestPoint {
            position: hit.position,
            distance: hit.distance,
            segment_start_rank,
        })
    }

    /// Interior test for closed lines; open lines contain nothing.
    pub fn contains(&self, query: Position) -> bool {
        self.closed && ring_contains(query, &self.positions())
    }

    /// Distance used by spatial queries: zero inside a closed line,
    /// otherwise the nearest-point distance.
    pub fn distance_to(&self, query: Position) -> Option<f64> {
        line_distance(query, &self.positions(), self.closed)
    }
}

impl GeoObject for Line {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> GeoKind {
        GeoKind::Line
    }

    /// Anchor of a line is its first vertex.
    fn position(&self) -> Position {
        self.vertices
            .first()
            .map(|v| v.coordinate.position())
            .unwrap_or(Position::new(0.0, 0.0))
    }

    fn meta(&self) -> &GeoMeta {
        &self.meta
    }

    fn extent(&self) -> Extent {
        Extent::covering(self.positions()).unwrap_or_else(|| Extent::around(self.position()))
    }
}

/// Distance from `query` to the line through `positions` (vertices in rank order).
pub(crate) fn line_distance(query: Position, positions: &[Position], closed: bool) -> Option<f64> {
    if closed && ring_contains(query, positions) {
        return Some(0.0);
    }
    nearest_on_polyline(query, positions).map(|hit| hit.distance)
}

/// Checks vertex count and closure for a vertex sequence in rank order.
pub fn validate_shape(
    positions: &[Position],
    closed: bool,
    tolerance: f64,
) -> Result<(), GeometryError> {
    if positions.len() < 2 {
        return Err(GeometryError::TooFewVertices {
            count: positions.len(),
        });
    }
    if closed {
        let gap = endpoint_gap(positions);
        if gap > tolerance {
            return Err(GeometryError::OpenEndpoints { gap, tolerance });
        }
    }
    Ok(())
}
