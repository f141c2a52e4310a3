//! Wells and their depth-ordered log records.
//!
//! # Responsibility
//! - Model wells with marker and property logs.
//! - Derive stratigraphic intervals from consecutive markers.
//!
//! # Invariants
//! - Markers and properties are each sorted by non-decreasing depth; equal
//!   depths keep insertion order.
//! - Depths are measured downwards from `top_z` and are never negative.
//! - When `bottom_depth` is set, no log record lies below it.

use super::geo_object::{GeoKind, GeoMeta, GeoObject, ObjectId, Position, WellId};
use super::stratigraphy::UnitId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MarkerId = Uuid;
pub type PropertyId = Uuid;

/// Records that live at a depth inside a well.
pub trait DepthOrdered {
    fn depth(&self) -> f64;
}

impl DepthOrdered for f64 {
    fn depth(&self) -> f64 {
        *self
    }
}

/// Named depth point (e.g. a formation top), optionally classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub well_id: WellId,
    pub depth: f64,
    pub unit_id: Option<UnitId>,
    pub comment: String,
}

impl Marker {
    /// Absolute elevation of this marker inside `well`.
    pub fn elevation(&self, well: &Well) -> f64 {
        well.top_z - self.depth
    }
}

impl DepthOrdered for Marker {
    fn depth(&self) -> f64 {
        self.depth
    }
}

/// Numeric measurement at depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyLog {
    pub id: PropertyId,
    pub well_id: WellId,
    pub depth: f64,
    pub name: String,
    pub value: f64,
    /// Unit of measure, e.g. `API` or `ohm.m`.
    pub uom: String,
}

impl DepthOrdered for PropertyLog {
    fn depth(&self) -> f64 {
        self.depth
    }
}

/// One entry of a well's merged log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord {
    Marker(Marker),
    Property(PropertyLog),
}

impl DepthOrdered for LogRecord {
    fn depth(&self) -> f64 {
        match self {
            Self::Marker(marker) => marker.depth,
            Self::Property(property) => property.depth,
        }
    }
}

/// Depth span between consecutive markers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start_depth: f64,
    /// `None` means open-ended (last marker of a well without bottom depth).
    pub end_depth: Option<f64>,
    /// Unit of the shallower marker.
    pub unit_id: Option<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Well {
    pub id: WellId,
    /// Abbreviated well name; the full name is `meta.name`.
    pub short_name: String,
    pub position: Position,
    /// Elevation of depth zero.
    pub top_z: f64,
    /// Drilled depth, when known.
    pub bottom_depth: Option<f64>,
    pub markers: Vec<Marker>,
    pub properties: Vec<PropertyLog>,
    pub meta: GeoMeta,
}

impl Well {
    pub fn intervals(&self) -> Vec<Interval> {
        derive_intervals(&self.markers, self.bottom_depth)
    }

    /// Markers and properties merged by depth; markers first on equal depth.
    pub fn logs(&self) -> Vec<LogRecord> {
        merge_logs(&self.markers, &self.properties)
    }

    pub fn deepest_record(&self) -> Option<f64> {
        let marker = self.markers.last().map(|m| m.depth);
        let property = self.properties.last().map(|p| p.depth);
        match (marker, property) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether the well has a log (any property record) named `name`.
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p.name == name)
    }

    /// Records of the log named `name`, in depth order.
    pub fn property_log(&self, name: &str) -> Vec<&PropertyLog> {
        self.properties.iter().filter(|p| p.name == name).collect()
    }

    /// Distinct log names, sorted.
    pub fn log_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.properties.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// First marker at exactly `depth`.
    pub fn marker_at_depth(&self, depth: f64) -> Option<&Marker> {
        self.markers.iter().find(|marker| marker.depth == depth)
    }

    /// First record of log `name` at exactly `depth`.
    pub fn property_at_depth(&self, name: &str, depth: f64) -> Option<&PropertyLog> {
        self.properties
            .iter()
            .find(|property| property.name == name && property.depth == depth)
    }
}

impl GeoObject for Well {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> GeoKind {
        GeoKind::Well
    }

    fn position(&self) -> Position {
        self.position
    }

    fn meta(&self) -> &GeoMeta {
        &self.meta
    }
}

/// Index where a record at `depth` goes so that order stays stable.
///
/// Binary search: equal depths are placed after existing ones.
pub fn insertion_index<T: DepthOrdered>(sorted: &[T], depth: f64) -> usize {
    sorted.partition_point(|record| record.depth() <= depth)
}

pub fn is_depth_sorted<T: DepthOrdered>(records: &[T]) -> bool {
    records.windows(2).all(|pair| pair[0].depth() <= pair[1].depth())
}

/// Builds `(start, end, unit)` spans from markers in depth order.
pub fn derive_intervals(markers: &[Marker], bottom_depth: Option<f64>) -> Vec<Interval> {
    markers
        .iter()
        .enumerate()
        .map(|(index, marker)| Interval {
            start_depth: marker.depth,
            end_depth: markers.get(index + 1).map(|next| next.depth).or(bottom_depth),
            unit_id: marker.unit_id,
        })
        .collect()
}

pub fn merge_logs(markers: &[Marker], properties: &[PropertyLog]) -> Vec<LogRecord> {
    let mut merged = Vec::with_capacity(markers.len() + properties.len());
    let (mut m, mut p) = (0usize, 0usize);
    while m < markers.len() || p < properties.len() {
        let take_marker = match (markers.get(m), properties.get(p)) {
            (Some(marker), Some(property)) => marker.depth <= property.depth,
            (Some(_), None) => true,
            _ => false,
        };
        if take_marker {
            merged.push(LogRecord::Marker(markers[m].clone()));
            m += 1;
        } else {
            merged.push(LogRecord::Property(properties[p].clone()));
            p += 1;
        }
    }
    merged
}
