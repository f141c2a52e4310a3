//! Point domain model and typed point attributes.
//!
//! # Invariants
//! - A point is either standalone (`vertex == None`) or owned by exactly one line.
//! - A vertex carries the horizon of its line.
//! - Property names are unique per point.

use super::geo_object::{Coordinate, GeoKind, GeoMeta, GeoObject, LineId, ObjectId, PointId, Position};
use super::stratigraphy::UnitId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Membership of a point in a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexSlot {
    pub line_id: LineId,
    /// Traversal position inside the owning line.
    pub rank: i64,
}

/// Value of a point attribute; the variant fixes the stored type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::String(_) => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

/// Named, typed attribute of a point, e.g. a derived thickness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointProperty {
    pub name: String,
    pub value: PropertyValue,
    /// Unit of the value, e.g. `m`; empty when dimensionless.
    pub unit: String,
}

/// Surveyed point, standalone or as a line vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub coordinate: Coordinate,
    pub vertex: Option<VertexSlot>,
    /// Stratigraphic unit the point belongs to.
    pub horizon_id: Option<UnitId>,
    /// Attributes in name order.
    pub properties: Vec<PointProperty>,
    pub meta: GeoMeta,
}

impl Point {
    pub fn is_standalone(&self) -> bool {
        self.vertex.is_none()
    }

    pub fn rank(&self) -> Option<i64> {
        self.vertex.map(|slot| slot.rank)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn property(&self, name: &str) -> Option<&PointProperty> {
        self.properties.iter().find(|property| property.name == name)
    }
}

impl GeoObject for Point {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kind(&self) -> GeoKind {
        GeoKind::Point
    }

    fn position(&self) -> Position {
        self.coordinate.position()
    }

    fn meta(&self) -> &GeoMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::{Point, PointProperty, PropertyValue};
    use crate::model::geo_object::{Coordinate, GeoMeta};
    use uuid::Uuid;

    #[test]
    fn properties_are_found_by_name() {
        let point = Point {
            id: Uuid::new_v4(),
            coordinate: Coordinate::new(1.0, 2.0, 3.0),
            vertex: None,
            horizon_id: None,
            properties: vec![PointProperty {
                name: "thickness".to_string(),
                value: PropertyValue::Float(12.5),
                unit: "m".to_string(),
            }],
            meta: GeoMeta::default(),
        };

        assert!(point.has_property("thickness"));
        assert!(!point.has_property("faulted"));
        assert_eq!(
            point.property("thickness").and_then(|p| p.value.as_f64()),
            Some(12.5)
        );
    }

    #[test]
    fn values_render_without_type_decoration() {
        assert_eq!(PropertyValue::Int(3).to_string(), "3");
        assert_eq!(PropertyValue::String("sand".to_string()).to_string(), "sand");
        assert_eq!(PropertyValue::String("x".to_string()).as_f64(), None);
        assert_eq!(PropertyValue::Int(2).type_name(), "int");
    }
}
