//! Read-only spatial, stratigraphic and depth queries.
//!
//! # Responsibility
//! - Filter stored entities by location, hierarchy membership and depth.
//! - Return fully hydrated entities through lazy cursors.
//!
//! # Invariants
//! - No query writes to the store.
//! - Bounds are inclusive; results are deterministic (`id ASC`, or
//!   `distance ASC, id ASC` for distance queries).
//! - Bounding-box and horizon point results are standalone points; vertices
//!   are reached through their lines.
//! - Each base marker closes at most one thickness section.

mod cursor;

pub use cursor::{HydratingCursor, PagedCursor};

use crate::db::Session;
use crate::model::geo_object::{Extent, LineId, Position, WellId};
use crate::model::line::{line_distance, Line};
use crate::model::point::Point;
use crate::model::stratigraphy::UnitId;
use crate::model::well::{Marker, PropertyLog, Well};
use crate::repo::line_repo::{load_line, load_line_shape};
use crate::repo::point_repo::{hydrate_point, load_point, parse_point_row, POINT_SELECT};
use crate::repo::strat_repo::ensure_unit_exists;
use crate::repo::well_repo::{ensure_well_exists, load_well, parse_property_row, PROPERTY_SELECT};
use crate::repo::{ensure_range, parse_uuid, RepoError, RepoResult};
use cursor::{Hydrate, PageFetch};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

pub type PointCursor<'s> = PagedCursor<'s, String, Point>;
pub type LineCursor<'s> = PagedCursor<'s, String, Line>;
pub type WellCursor<'s> = PagedCursor<'s, String, Well>;
pub type PropertyCursor<'s> = PagedCursor<'s, i64, PropertyLog>;

/// A line within the search distance.
#[derive(Debug, Clone, PartialEq)]
pub struct LineHit {
    pub line: Line,
    pub distance: f64,
}

/// A well within the search radius.
#[derive(Debug, Clone, PartialEq)]
pub struct WellHit {
    pub well: Well,
    pub distance: f64,
}

/// Thickness between a top-unit marker and the base-unit marker closing it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThicknessSample {
    pub well_id: WellId,
    pub position: Position,
    /// Elevation of the top marker.
    pub elevation: f64,
    pub thickness: f64,
    /// The section spans from the first top to the last base of the well.
    pub summarised: bool,
    /// The well holds more than one top/base pair of markers.
    pub multiple_markers: bool,
    /// Fault markers inside the section; set only when faulted sections are included.
    pub faulted: Option<usize>,
}

/// Tuning for [`QueryEngine::unit_thickness_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThicknessOptions {
    /// Only wells whose head lies inside the extent.
    pub extent: Option<Extent>,
    /// One section per well from the first top to the last base.
    pub summarise_multiple: bool,
    /// Unit whose markers denote faults.
    pub fault_unit: Option<UnitId>,
    /// Keep sections crossed by a fault marker and report the fault count.
    pub include_faulted: bool,
}

/// Query entry point bound to one session.
pub struct QueryEngine<'s> {
    session: &'s Session,
}

impl<'s> QueryEngine<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Standalone points with `min <= (x, y) <= max`.
    pub fn points_in_bounding_box(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> RepoResult<PointCursor<'s>> {
        ensure_box(min_x, min_y, max_x, max_y)?;
        let fetch: PageFetch<'s, String, Point> =
            Box::new(move |conn: &Connection, after: Option<&String>, limit: u32| {
                let mut sql = format!(
                    "{POINT_SELECT}
                     WHERE line_id IS NULL
                       AND x >= ? AND x <= ? AND y >= ? AND y <= ?"
                );
                let mut binds = box_binds(min_x, min_y, max_x, max_y);
                push_keyset(&mut sql, &mut binds, "id", after);
                push_limit(&mut sql, &mut binds, "id", limit);
                let rows = fetch_rows(conn, &sql, binds, parse_point_row)?;
                rows.into_iter()
                    .map(|row| {
                        let key = row.id.to_string();
                        Ok::<_, RepoError>((key, hydrate_point(conn, row)?))
                    })
                    .collect::<RepoResult<Vec<_>>>()
            });
        Ok(PagedCursor::new(self.session, fetch))
    }

    /// Lines with at least one vertex inside the box.
    pub fn lines_in_bounding_box(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> RepoResult<LineCursor<'s>> {
        ensure_box(min_x, min_y, max_x, max_y)?;
        let fetch: PageFetch<'s, String, Line> =
            Box::new(move |conn: &Connection, after: Option<&String>, limit: u32| {
                let mut sql = String::from(
                    "SELECT DISTINCT line_id
                     FROM points
                     WHERE line_id IS NOT NULL
                       AND x >= ? AND x <= ? AND y >= ? AND y <= ?",
                );
                let mut binds = box_binds(min_x, min_y, max_x, max_y);
                push_keyset(&mut sql, &mut binds, "line_id", after);
                push_limit(&mut sql, &mut binds, "line_id", limit);
                let ids = fetch_rows(conn, &sql, binds, |row| id_column(row, "points.line_id"))?;
                hydrate_page(ids, |id| load_line(conn, id))
            });
        Ok(PagedCursor::new(self.session, fetch))
    }

    pub fn wells_in_bounding_box(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> RepoResult<WellCursor<'s>> {
        ensure_box(min_x, min_y, max_x, max_y)?;
        let fetch: PageFetch<'s, String, Well> =
            Box::new(move |conn: &Connection, after: Option<&String>, limit: u32| {
                let mut sql = String::from(
                    "SELECT id FROM wells WHERE x >= ? AND x <= ? AND y >= ? AND y <= ?",
                );
                let mut binds = box_binds(min_x, min_y, max_x, max_y);
                push_keyset(&mut sql, &mut binds, "id", after);
                push_limit(&mut sql, &mut binds, "id", limit);
                let ids = fetch_rows(conn, &sql, binds, |row| id_column(row, "wells.id"))?;
                hydrate_page(ids, |id| load_well(conn, id))
            });
        Ok(PagedCursor::new(self.session, fetch))
    }

    /// Wells reaching `min_depth`: by bottom depth or by any log record.
    pub fn wells_deeper_than(&self, min_depth: f64) -> RepoResult<WellCursor<'s>> {
        ensure_range("depth", 0.0, min_depth)?;
        let fetch: PageFetch<'s, String, Well> =
            Box::new(move |conn: &Connection, after: Option<&String>, limit: u32| {
                let mut sql = String::from(
                    "SELECT id FROM wells
                     WHERE (bottom_depth >= ?
                         OR EXISTS (SELECT 1 FROM well_markers m WHERE m.well_id = wells.id AND m.depth >= ?)
                         OR EXISTS (SELECT 1 FROM well_properties p WHERE p.well_id = wells.id AND p.depth >= ?))",
                );
                let mut binds = vec![Value::Real(min_depth); 3];
                push_keyset(&mut sql, &mut binds, "id", after);
                push_limit(&mut sql, &mut binds, "id", limit);
                let ids = fetch_rows(conn, &sql, binds, |row| id_column(row, "wells.id"))?;
                hydrate_page(ids, |id| load_well(conn, id))
            });
        Ok(PagedCursor::new(self.session, fetch))
    }

    /// Properties of one well with `min_depth <= depth <= max_depth`, in log order.
    pub fn properties_in_depth_range(
        &self,
        well_id: WellId,
        min_depth: f64,
        max_depth: f64,
    ) -> RepoResult<PropertyCursor<'s>> {
        ensure_range("depth", min_depth, max_depth)?;
        ensure_well_exists(self.session.conn(), well_id)?;
        let fetch: PageFetch<'s, i64, PropertyLog> =
            Box::new(move |conn: &Connection, after: Option<&i64>, limit: u32| {
                let mut sql = format!(
                    "{PROPERTY_SELECT}
                     WHERE well_id = ? AND depth >= ? AND depth <= ?"
                );
                let mut binds = vec![
                    Value::Text(well_id.to_string()),
                    Value::Real(min_depth),
                    Value::Real(max_depth),
                ];
                if let Some(after) = after {
                    sql.push_str(" AND sort_order > ?");
                    binds.push(Value::Integer(*after));
                }
                push_limit(&mut sql, &mut binds, "sort_order", limit);
                fetch_rows(conn, &sql, binds, |row| {
                    let sort_order: i64 = row.get(6)?;
                    Ok((sort_order, parse_property_row(row)?))
                })
            });
        Ok(PagedCursor::new(self.session, fetch))
    }

    /// Lines within `max_distance` of `(x, y)`, nearest first.
    ///
    /// A query point inside a closed line is at distance 0.
    pub fn lines_near(
        &self,
        x: f64,
        y: f64,
        max_distance: f64,
    ) -> RepoResult<HydratingCursor<'s, (LineId, f64), LineHit>> {
        let query = finite_position(x, y)?;
        ensure_range("distance", 0.0, max_distance)?;
        let started_at = Instant::now();

        let window = Extent::around(query).expanded(max_distance);
        let (candidates, ranked) = self.session.read(|s| {
            let conn = s.conn();
            let candidates = fetch_rows(
                conn,
                "SELECT id FROM lines
                 WHERE max_x >= ? AND min_x <= ? AND max_y >= ? AND min_y <= ?;",
                box_binds(window.min_x, window.min_y, window.max_x, window.max_y),
                |row| id_column(row, "lines.id"),
            )?;
            let mut ranked = Vec::new();
            for id in &candidates {
                let Some((positions, closed)) = load_line_shape(conn, *id)? else {
                    continue;
                };
                if let Some(distance) = line_distance(query, &positions, closed) {
                    if distance <= max_distance {
                        ranked.push((*id, distance));
                    }
                }
            }
            Ok::<_, RepoError>((candidates.len(), ranked))
        })?;
        let ranked = rank_by_distance(ranked);
        debug!(
            "event=query_lines_near module=query status=ok candidates={} matches={} duration_ms={}",
            candidates,
            ranked.len(),
            started_at.elapsed().as_millis()
        );

        let hydrate: Hydrate<'s, (LineId, f64), LineHit> =
            Box::new(|conn: &Connection, (id, distance): (LineId, f64)| {
                Ok::<_, RepoError>(load_line(conn, id)?
                    .map(|line| LineHit { line, distance })
                    .into_iter()
                    .collect::<Vec<_>>())
            });
        Ok(HydratingCursor::new(self.session, ranked, hydrate))
    }

    /// Wells within `radius` of `(x, y)`, nearest first.
    pub fn wells_in_radius(
        &self,
        x: f64,
        y: f64,
        radius: f64,
    ) -> RepoResult<HydratingCursor<'s, (WellId, f64), WellHit>> {
        let query = finite_position(x, y)?;
        ensure_range("radius", 0.0, radius)?;

        let window = Extent::around(query).expanded(radius);
        let ranked = self.session.read(|s| {
            fetch_rows(
                s.conn(),
                "SELECT id, x, y FROM wells
                 WHERE x >= ? AND x <= ? AND y >= ? AND y <= ?;",
                box_binds(window.min_x, window.min_y, window.max_x, window.max_y),
                |row| {
                    let id = id_column(row, "wells.id")?;
                    Ok((id, Position::new(row.get(1)?, row.get(2)?)))
                },
            )
        })?;
        let ranked = rank_by_distance(
            ranked
                .into_iter()
                .map(|(id, position)| (id, query.distance_to(position)))
                .filter(|(_, distance)| *distance <= radius)
                .collect(),
        );

        let hydrate: Hydrate<'s, (WellId, f64), WellHit> =
            Box::new(|conn: &Connection, (id, distance): (WellId, f64)| {
                Ok::<_, RepoError>(load_well(conn, id)?
                    .map(|well| WellHit { well, distance })
                    .into_iter()
                    .collect::<Vec<_>>())
            });
        Ok(HydratingCursor::new(self.session, ranked, hydrate))
    }

    /// Wells with a marker of `unit_id`, or of any unit below it when
    /// `include_descendants` is set.
    pub fn wells_by_unit(
        &self,
        unit_id: UnitId,
        include_descendants: bool,
    ) -> RepoResult<HydratingCursor<'s, WellId, Well>> {
        let ids = self.session.read(|s| {
            let conn = s.conn();
            ensure_unit_exists(conn, unit_id)?;
            let sql = if include_descendants {
                "WITH RECURSIVE subtree(id) AS (
                    SELECT id FROM strat_units WHERE id = ?
                    UNION
                    SELECT child.id
                    FROM strat_units child
                    INNER JOIN subtree parent ON child.parent_id = parent.id
                )
                SELECT DISTINCT well_id
                FROM well_markers
                WHERE unit_id IN (SELECT id FROM subtree)
                ORDER BY well_id ASC;"
            } else {
                "SELECT DISTINCT well_id
                 FROM well_markers
                 WHERE unit_id = ?
                 ORDER BY well_id ASC;"
            };
            fetch_rows(
                conn,
                sql,
                vec![Value::Text(unit_id.to_string())],
                |row| id_column(row, "well_markers.well_id"),
            )
        })?;

        let hydrate: Hydrate<'s, WellId, Well> =
            Box::new(|conn: &Connection, id: WellId| {
                Ok::<_, RepoError>(load_well(conn, id)?.into_iter().collect::<Vec<_>>())
            });
        Ok(HydratingCursor::new(self.session, ids, hydrate))
    }

    /// Thickness samples between `top_unit` and `base_unit` markers, per well
    /// in id order, optionally restricted to wells inside `extent`.
    pub fn unit_thickness(
        &self,
        top_unit: UnitId,
        base_unit: UnitId,
        extent: Option<Extent>,
    ) -> RepoResult<HydratingCursor<'s, WellId, ThicknessSample>> {
        self.unit_thickness_with(
            top_unit,
            base_unit,
            ThicknessOptions {
                extent,
                ..ThicknessOptions::default()
            },
        )
    }

    /// [`Self::unit_thickness`] with summarising and fault handling.
    ///
    /// Sections crossed by a marker of `fault_unit` are dropped unless
    /// `include_faulted` is set.
    pub fn unit_thickness_with(
        &self,
        top_unit: UnitId,
        base_unit: UnitId,
        options: ThicknessOptions,
    ) -> RepoResult<HydratingCursor<'s, WellId, ThicknessSample>> {
        if top_unit == base_unit {
            return Err(RepoError::IdenticalUnits { unit_id: top_unit });
        }
        let extent = options.extent;
        let ids = self.session.read(|s| {
            let conn = s.conn();
            ensure_unit_exists(conn, top_unit)?;
            ensure_unit_exists(conn, base_unit)?;
            if let Some(fault_unit) = options.fault_unit {
                ensure_unit_exists(conn, fault_unit)?;
            }
            let mut sql = String::from(
                "SELECT DISTINCT wells.id
                 FROM wells
                 INNER JOIN well_markers ON well_markers.well_id = wells.id
                 WHERE well_markers.unit_id = ?",
            );
            let mut binds = vec![Value::Text(top_unit.to_string())];
            if let Some(extent) = extent {
                sql.push_str(
                    " AND wells.x >= ? AND wells.x <= ? AND wells.y >= ? AND wells.y <= ?",
                );
                binds.extend(box_binds(
                    extent.min_x,
                    extent.min_y,
                    extent.max_x,
                    extent.max_y,
                ));
            }
            sql.push_str(" ORDER BY wells.id ASC;");
            fetch_rows(conn, &sql, binds, |row| id_column(row, "wells.id"))
        })?;

        let hydrate: Hydrate<'s, WellId, ThicknessSample> =
            Box::new(move |conn: &Connection, id: WellId| {
                Ok::<_, RepoError>(load_well(conn, id)?
                    .map(|well| thickness_samples(&well, top_unit, base_unit, &options))
                    .unwrap_or_default())
            });
        Ok(HydratingCursor::new(self.session, ids, hydrate))
    }

    /// Standalone points assigned to `unit_id`, or to any unit below it when
    /// `include_descendants` is set.
    pub fn points_by_horizon(
        &self,
        unit_id: UnitId,
        include_descendants: bool,
    ) -> RepoResult<HydratingCursor<'s, Uuid, Point>> {
        let ids = self.horizon_members(
            unit_id,
            include_descendants,
            "SELECT id FROM points WHERE line_id IS NULL AND horizon_id",
            "points.id",
        )?;
        let hydrate: Hydrate<'s, Uuid, Point> = Box::new(|conn: &Connection, id: Uuid| {
            Ok::<_, RepoError>(load_point(conn, id)?.into_iter().collect::<Vec<_>>())
        });
        Ok(HydratingCursor::new(self.session, ids, hydrate))
    }

    /// Lines assigned to `unit_id`, or to any unit below it when
    /// `include_descendants` is set.
    pub fn lines_by_horizon(
        &self,
        unit_id: UnitId,
        include_descendants: bool,
    ) -> RepoResult<HydratingCursor<'s, LineId, Line>> {
        let ids = self.horizon_members(
            unit_id,
            include_descendants,
            "SELECT id FROM lines WHERE horizon_id",
            "lines.id",
        )?;
        let hydrate: Hydrate<'s, LineId, Line> = Box::new(|conn: &Connection, id: LineId| {
            Ok::<_, RepoError>(load_line(conn, id)?.into_iter().collect::<Vec<_>>())
        });
        Ok(HydratingCursor::new(self.session, ids, hydrate))
    }

    /// Ids selected by `select` (ending in the horizon column) in id order.
    fn horizon_members(
        &self,
        unit_id: UnitId,
        include_descendants: bool,
        select: &str,
        column: &'static str,
    ) -> RepoResult<Vec<Uuid>> {
        self.session.read(|s| {
            let conn = s.conn();
            ensure_unit_exists(conn, unit_id)?;
            let sql = if include_descendants {
                format!(
                    "WITH RECURSIVE subtree(id) AS (
                        SELECT id FROM strat_units WHERE id = ?
                        UNION
                        SELECT child.id
                        FROM strat_units child
                        INNER JOIN subtree parent ON child.parent_id = parent.id
                    )
                    {select} IN (SELECT id FROM subtree)
                    ORDER BY id ASC;"
                )
            } else {
                format!("{select} = ? ORDER BY id ASC;")
            };
            fetch_rows(
                conn,
                &sql,
                vec![Value::Text(unit_id.to_string())],
                |row| id_column(row, column),
            )
        })
    }
}

/// Thickness sections of one well, in depth order.
///
/// Each `base_unit` marker closes the section opened by the latest
/// `top_unit` marker above it and is used at most once. With
/// `summarise_multiple` a well holding more than two top/base markers yields
/// a single section from its first top to its last base.
pub fn thickness_samples(
    well: &Well,
    top_unit: UnitId,
    base_unit: UnitId,
    options: &ThicknessOptions,
) -> Vec<ThicknessSample> {
    let relevant = well
        .markers
        .iter()
        .filter(|marker| marker.unit_id == Some(top_unit) || marker.unit_id == Some(base_unit))
        .count();
    let multiple_markers = relevant > 2;

    let sections: Vec<(&Marker, &Marker, bool)> = if options.summarise_multiple && multiple_markers {
        let first_top = well.markers.iter().position(|m| m.unit_id == Some(top_unit));
        let last_base = well.markers.iter().rposition(|m| m.unit_id == Some(base_unit));
        match (first_top, last_base) {
            (Some(top), Some(base)) if top < base => {
                vec![(&well.markers[top], &well.markers[base], true)]
            }
            _ => Vec::new(),
        }
    } else {
        let mut sections = Vec::new();
        let mut pending: Option<&Marker> = None;
        for marker in &well.markers {
            if marker.unit_id == Some(top_unit) {
                pending = Some(marker);
            } else if marker.unit_id == Some(base_unit) {
                if let Some(top) = pending.take() {
                    sections.push((top, marker, false));
                }
            }
        }
        sections
    };

    sections
        .into_iter()
        .filter_map(|(top, base, summarised)| {
            let faults = options
                .fault_unit
                .map(|fault_unit| count_faults(well, fault_unit, top.depth, base.depth))
                .unwrap_or(0);
            if faults > 0 && !options.include_faulted {
                return None;
            }
            Some(ThicknessSample {
                well_id: well.id,
                position: well.position,
                elevation: top.elevation(well),
                thickness: base.depth - top.depth,
                summarised,
                multiple_markers,
                faulted: options.include_faulted.then_some(faults),
            })
        })
        .collect()
}

/// Fault markers with `top <= depth <= base`.
fn count_faults(well: &Well, fault_unit: UnitId, top: f64, base: f64) -> usize {
    well.markers
        .iter()
        .filter(|marker| marker.unit_id == Some(fault_unit))
        .filter(|marker| marker.depth >= top && marker.depth <= base)
        .count()
}

fn ensure_box(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> RepoResult<()> {
    ensure_range("x", min_x, max_x)?;
    ensure_range("y", min_y, max_y)
}

fn finite_position(x: f64, y: f64) -> RepoResult<Position> {
    for value in [x, y] {
        if !value.is_finite() {
            return Err(RepoError::InvalidNumber {
                what: "query coordinate",
                value,
            });
        }
    }
    Ok(Position::new(x, y))
}

/// Sorts by distance, then id.
fn rank_by_distance(mut ranked: Vec<(Uuid, f64)>) -> Vec<(Uuid, f64)> {
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn box_binds(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<Value> {
    vec![
        Value::Real(min_x),
        Value::Real(max_x),
        Value::Real(min_y),
        Value::Real(max_y),
    ]
}

fn push_keyset(sql: &mut String, binds: &mut Vec<Value>, column: &str, after: Option<&String>) {
    if let Some(after) = after {
        sql.push_str(&format!(" AND {column} > ?"));
        binds.push(Value::Text(after.clone()));
    }
}

fn push_limit(sql: &mut String, binds: &mut Vec<Value>, column: &str, limit: u32) {
    sql.push_str(&format!(" ORDER BY {column} ASC LIMIT ?;"));
    binds.push(Value::Integer(i64::from(limit)));
}

fn fetch_rows<T, F>(conn: &Connection, sql: &str, binds: Vec<Value>, parse: F) -> RepoResult<Vec<T>>
where
    F: Fn(&Row<'_>) -> RepoResult<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut parsed = Vec::new();
    while let Some(row) = rows.next()? {
        parsed.push(parse(row)?);
    }
    Ok(parsed)
}

fn id_column(row: &Row<'_>, column: &'static str) -> RepoResult<Uuid> {
    let text: String = row.get(0)?;
    parse_uuid(&text, column)
}

/// Loads each id of a page, keyed by its text form; vanished ids are skipped.
fn hydrate_page<T, F>(ids: Vec<Uuid>, load: F) -> RepoResult<Vec<(String, T)>>
where
    F: Fn(Uuid) -> RepoResult<Option<T>>,
{
    let mut page = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = load(id)? {
            page.push((id.to_string(), item));
        }
    }
    Ok(page)
}
