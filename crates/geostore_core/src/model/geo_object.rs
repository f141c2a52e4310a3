//! Geo-object base contract.
//!
//! # Responsibility
//! - Define identities, planar/3-D coordinates, extents and metadata shared by
//!   points, lines and wells.
//! - Validate coordinates and tag keys before they reach storage.
//!
//! # Invariants
//! - Identities are stable v4 UUIDs and never reassigned.
//! - Coordinates are always finite; an object never has an undefined position.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identity of any geo object row (`geo_objects.id`).
pub type ObjectId = Uuid;
pub type PointId = Uuid;
pub type LineId = Uuid;
pub type WellId = Uuid;

/// Free-form key/value metadata, iterated in key order.
pub type Tags = BTreeMap<String, String>;

static TAG_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:-]{0,63}$").expect("tag key pattern is valid")
});

/// Concrete kind behind a geo object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoKind {
    Point,
    Line,
    Well,
}

impl GeoKind {
    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Well => "well",
        }
    }

    pub(crate) fn from_db(value: &str) -> Option<Self> {
        match value {
            "point" => Some(Self::Point),
            "line" => Some(Self::Line),
            "well" => Some(Self::Well),
            _ => None,
        }
    }
}

impl Display for GeoKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db())
    }
}

/// Horizontal position in the project coordinate reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Position plus elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<(f64, f64, f64)> for Coordinate {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self::new(x, y, z)
    }
}

/// Inclusive axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Builds an extent, rejecting non-finite or inverted bounds.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Option<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return None;
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn around(position: Position) -> Self {
        Self {
            min_x: position.x,
            min_y: position.y,
            max_x: position.x,
            max_y: position.y,
        }
    }

    /// Smallest extent covering every position; `None` for an empty input.
    pub fn covering<I: IntoIterator<Item = Position>>(positions: I) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::around(first), |extent, p| extent.include(p)))
    }

    pub fn include(self, p: Position) -> Self {
        Self {
            min_x: self.min_x.min(p.x),
            min_y: self.min_y.min(p.y),
            max_x: self.max_x.max(p.x),
            max_y: self.max_y.max(p.y),
        }
    }

    pub fn contains(&self, p: Position) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Grows every side by `margin`.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

/// Descriptive metadata carried by every geo object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoMeta {
    pub name: String,
    pub comment: String,
    pub tags: Tags,
}

impl GeoMeta {
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}

/// Shared identity + position capability of points, lines and wells.
pub trait GeoObject {
    fn id(&self) -> ObjectId;
    fn kind(&self) -> GeoKind;
    fn position(&self) -> Position;
    fn meta(&self) -> &GeoMeta;

    fn extent(&self) -> Extent {
        Extent::around(self.position())
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.meta().tags.get(key).map(String::as_str)
    }
}

/// Validation failures for geometric input.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    NonFiniteCoordinate { x: f64, y: f64, z: f64 },
    TooFewVertices { count: usize },
    OpenEndpoints { gap: f64, tolerance: f64 },
    NegativeRank(i64),
    /// A line vertex can only be changed through its line.
    OwnedVertex { line_id: LineId },
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteCoordinate { x, y, z } => {
                write!(f, "coordinate ({x}, {y}, {z}) is not finite")
            }
            Self::TooFewVertices { count } => {
                write!(f, "a line needs at least 2 vertices, got {count}")
            }
            Self::OpenEndpoints { gap, tolerance } => write!(
                f,
                "closed line endpoints are {gap} apart, tolerance is {tolerance}"
            ),
            Self::NegativeRank(rank) => write!(f, "vertex rank {rank} is negative"),
            Self::OwnedVertex { line_id } => {
                write!(f, "point is a vertex of line {line_id}")
            }
        }
    }
}

impl Error for GeometryError {}

pub fn validate_coordinate(coordinate: Coordinate) -> Result<(), GeometryError> {
    if coordinate.is_finite() {
        return Ok(());
    }
    Err(GeometryError::NonFiniteCoordinate {
        x: coordinate.x,
        y: coordinate.y,
        z: coordinate.z,
    })
}

pub fn is_valid_tag_key(key: &str) -> bool {
    TAG_KEY_PATTERN.is_match(key)
}
