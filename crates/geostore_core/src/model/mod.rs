//! Geological domain model.
//!
//! # Responsibility
//! - Define the entities persisted by the store: points, lines, wells with
//!   their logs, and the stratigraphic hierarchy.
//! - Keep pure geometric and ordering logic free of storage concerns.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Ownership is exclusive: vertices belong to one line, logs to one well.

pub mod geo_object;
pub mod geometry;
pub mod line;
pub mod point;
pub mod stratigraphy;
pub mod well;
