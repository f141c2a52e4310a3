//! Line repository: polylines and their owned vertices.
//!
//! # Responsibility
//! - Create lines with ranked vertices and mutate them through the line id.
//! - Keep the cached line extent in sync with the vertices.
//! - Push the line's horizon down to every vertex.
//!
//! # Invariants
//! - Vertex ranks of a line are exactly `0..n`; reads return them in order.
//! - After every committed mutation a line has at least 2 vertices and, when
//!   closed, endpoints within the configured tolerance.
//! - Deleting a line deletes its vertices.

use super::object_repo::{delete_geo_objects, insert_geo_object, load_meta, touch};
use super::point_repo::{hydrate_point, insert_point_row, parse_point_row, POINT_SELECT};
use super::strat_repo::ensure_unit_exists;
use super::{
    bool_to_int, int_to_bool, parse_optional_uuid, parse_uuid, EntityKind, RepoError, RepoResult,
};
use crate::db::Session;
use crate::model::geo_object::{
    validate_coordinate, Coordinate, Extent, GeoKind, GeoMeta, GeometryError, LineId, PointId,
    Position,
};
use crate::model::line::{validate_shape, Line};
use crate::model::point::{Point, VertexSlot};
use crate::model::stratigraphy::UnitId;
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub trait LineRepository {
    /// Creates a line with vertices ranked `0..n` in the given order.
    fn create_line(
        &self,
        vertices: &[Coordinate],
        closed: bool,
        meta: GeoMeta,
    ) -> RepoResult<LineId>;
    /// Creates a line whose vertices all belong to `horizon_id`.
    fn create_line_with_horizon(
        &self,
        vertices: &[Coordinate],
        closed: bool,
        horizon_id: Option<UnitId>,
        meta: GeoMeta,
    ) -> RepoResult<LineId>;
    /// Loads one line with its vertices in rank order.
    fn get_line(&self, id: LineId) -> RepoResult<Option<Line>>;
    /// Appends a vertex after the last one.
    fn append_vertex(&self, line_id: LineId, coordinate: Coordinate) -> RepoResult<PointId>;
    /// Inserts a vertex at `rank`.
    ///
    /// A rank past the end appends. With `shift`, vertices at `rank` and above
    /// move up by one; without it an occupied rank fails with `RankConflict`.
    fn insert_vertex(
        &self,
        line_id: LineId,
        rank: i64,
        coordinate: Coordinate,
        shift: bool,
    ) -> RepoResult<PointId>;
    /// Removes the vertex at `rank`; later vertices move down by one.
    fn remove_vertex(&self, line_id: LineId, rank: i64) -> RepoResult<()>;
    fn set_closed(&self, line_id: LineId, closed: bool) -> RepoResult<()>;
    /// Assigns or clears the horizon of a line and all of its vertices.
    fn set_line_horizon(&self, line_id: LineId, horizon_id: Option<UnitId>) -> RepoResult<()>;
    /// Deletes a line and all of its vertices.
    fn delete_line(&self, line_id: LineId) -> RepoResult<()>;
}

pub struct SqliteLineRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteLineRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    fn tolerance(&self) -> f64 {
        self.session.options().closed_tolerance
    }
}

impl LineRepository for SqliteLineRepository<'_> {
    fn create_line(
        &self,
        vertices: &[Coordinate],
        closed: bool,
        meta: GeoMeta,
    ) -> RepoResult<LineId> {
        self.create_line_with_horizon(vertices, closed, None, meta)
    }

    fn create_line_with_horizon(
        &self,
        vertices: &[Coordinate],
        closed: bool,
        horizon_id: Option<UnitId>,
        meta: GeoMeta,
    ) -> RepoResult<LineId> {
        for coordinate in vertices {
            validate_coordinate(*coordinate).map_err(|reason| RepoError::geometry(None, reason))?;
        }
        let positions: Vec<Position> = vertices.iter().map(Coordinate::position).collect();
        if let Err(reason) = validate_shape(&positions, closed, self.tolerance()) {
            warn!(
                "event=line_create module=geometry status=rejected vertices={} reason={}",
                vertices.len(),
                reason
            );
            return Err(RepoError::geometry(None, reason));
        }
        let extent = Extent::covering(positions).ok_or_else(|| {
            RepoError::geometry(None, GeometryError::TooFewVertices { count: 0 })
        })?;

        let line_id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            if let Some(horizon_id) = horizon_id {
                ensure_unit_exists(conn, horizon_id)?;
            }
            insert_geo_object(conn, line_id, GeoKind::Line, &meta)?;
            conn.execute(
                "INSERT INTO lines (id, is_closed, horizon_id, min_x, min_y, max_x, max_y)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    line_id.to_string(),
                    bool_to_int(closed),
                    horizon_id.map(|value| value.to_string()),
                    extent.min_x,
                    extent.min_y,
                    extent.max_x,
                    extent.max_y,
                ],
            )?;
            for (rank, coordinate) in vertices.iter().enumerate() {
                insert_vertex_row(conn, line_id, rank as i64, *coordinate, horizon_id)?;
            }
            Ok::<_, RepoError>(())
        })?;

        info!(
            "event=line_create module=geometry status=ok line_id={line_id} vertices={} closed={closed}",
            vertices.len()
        );
        Ok(line_id)
    }

    fn get_line(&self, id: LineId) -> RepoResult<Option<Line>> {
        self.session.read(|s| load_line(s.conn(), id))
    }

    fn append_vertex(&self, line_id: LineId, coordinate: Coordinate) -> RepoResult<PointId> {
        validate_coordinate(coordinate)
            .map_err(|reason| RepoError::geometry(Some(line_id), reason))?;
        let tolerance = self.tolerance();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let horizon_id = line_horizon(conn, line_id)?;
            let rank = vertex_count(conn, line_id)?;
            let point_id = insert_vertex_row(conn, line_id, rank, coordinate, horizon_id)?;
            refresh_line_geometry(conn, line_id, tolerance)?;
            touch(conn, line_id)?;
            Ok(point_id)
        })
    }

    fn insert_vertex(
        &self,
        line_id: LineId,
        rank: i64,
        coordinate: Coordinate,
        shift: bool,
    ) -> RepoResult<PointId> {
        if rank < 0 {
            return Err(RepoError::geometry(
                Some(line_id),
                GeometryError::NegativeRank(rank),
            ));
        }
        validate_coordinate(coordinate)
            .map_err(|reason| RepoError::geometry(Some(line_id), reason))?;
        let tolerance = self.tolerance();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let horizon_id = line_horizon(conn, line_id)?;
            let rank = rank.min(vertex_count(conn, line_id)?);
            if vertex_at(conn, line_id, rank)?.is_some() {
                if !shift {
                    return Err(RepoError::RankConflict { line_id, rank });
                }
                shift_ranks_up(conn, line_id, rank)?;
            }
            let point_id = insert_vertex_row(conn, line_id, rank, coordinate, horizon_id)?;
            refresh_line_geometry(conn, line_id, tolerance)?;
            touch(conn, line_id)?;
            Ok(point_id)
        })
    }

    fn remove_vertex(&self, line_id: LineId, rank: i64) -> RepoResult<()> {
        let tolerance = self.tolerance();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_line_exists(conn, line_id)?;
            let point_id = vertex_at(conn, line_id, rank)?
                .ok_or(RepoError::MissingVertex { line_id, rank })?;
            delete_geo_objects(conn, &[point_id])?;
            close_rank_gap(conn, line_id, rank)?;
            refresh_line_geometry(conn, line_id, tolerance)?;
            touch(conn, line_id)
        })
    }

    fn set_closed(&self, line_id: LineId, closed: bool) -> RepoResult<()> {
        let tolerance = self.tolerance();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            let changed = conn.execute(
                "UPDATE lines SET is_closed = ?2 WHERE id = ?1;",
                params![line_id.to_string(), bool_to_int(closed)],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found(EntityKind::Line, line_id));
            }
            refresh_line_geometry(conn, line_id, tolerance)?;
            touch(conn, line_id)
        })
    }

    fn set_line_horizon(&self, line_id: LineId, horizon_id: Option<UnitId>) -> RepoResult<()> {
        let vertices = self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_line_exists(conn, line_id)?;
            if let Some(horizon_id) = horizon_id {
                ensure_unit_exists(conn, horizon_id)?;
            }
            let horizon = horizon_id.map(|value| value.to_string());
            conn.execute(
                "UPDATE lines SET horizon_id = ?2 WHERE id = ?1;",
                params![line_id.to_string(), horizon],
            )?;
            let vertices = conn.execute(
                "UPDATE points SET horizon_id = ?2 WHERE line_id = ?1;",
                params![line_id.to_string(), horizon],
            )?;
            touch(conn, line_id)?;
            Ok::<_, RepoError>(vertices)
        })?;
        info!(
            "event=line_horizon module=geometry status=ok line_id={line_id} vertices={vertices}"
        );
        Ok(())
    }

    fn delete_line(&self, line_id: LineId) -> RepoResult<()> {
        let removed_vertices = self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_line_exists(conn, line_id)?;
            let vertex_ids: Vec<PointId> = load_vertex_rows(conn, line_id)?
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            // Vertex base rows first: their concrete rows cascade with them.
            delete_geo_objects(conn, &vertex_ids)?;
            delete_geo_objects(conn, &[line_id])?;
            Ok::<_, RepoError>(vertex_ids.len())
        })?;
        info!(
            "event=line_delete module=geometry status=ok line_id={line_id} vertices={removed_vertices}"
        );
        Ok(())
    }
}

fn insert_vertex_row(
    conn: &Connection,
    line_id: LineId,
    rank: i64,
    coordinate: Coordinate,
    horizon_id: Option<UnitId>,
) -> RepoResult<PointId> {
    let point_id = Uuid::new_v4();
    insert_geo_object(conn, point_id, GeoKind::Point, &GeoMeta::default())?;
    insert_point_row(
        conn,
        point_id,
        coordinate,
        Some(VertexSlot { line_id, rank }),
        horizon_id,
    )?;
    Ok(point_id)
}

/// Moves every vertex with rank `>= from_rank` up by one.
///
/// Rows are updated one by one from the highest rank down, so the unique
/// `(line_id, vertex_rank)` key holds after every statement.
fn shift_ranks_up(conn: &Connection, line_id: LineId, from_rank: i64) -> RepoResult<()> {
    let mut select = conn.prepare(
        "SELECT id
         FROM points
         WHERE line_id = ?1 AND vertex_rank >= ?2
         ORDER BY vertex_rank DESC;",
    )?;
    let mut rows = select.query(params![line_id.to_string(), from_rank])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get::<_, String>(0)?);
    }

    let mut update = conn.prepare("UPDATE points SET vertex_rank = vertex_rank + 1 WHERE id = ?1;")?;
    for id in &ids {
        update.execute([id])?;
    }
    Ok(())
}

/// Moves every vertex above the freed `rank` down by one.
///
/// Rows are updated one by one from the lowest rank up, so the unique
/// `(line_id, vertex_rank)` key holds after every statement.
fn close_rank_gap(conn: &Connection, line_id: LineId, freed_rank: i64) -> RepoResult<()> {
    let mut select = conn.prepare(
        "SELECT id
         FROM points
         WHERE line_id = ?1 AND vertex_rank > ?2
         ORDER BY vertex_rank ASC;",
    )?;
    let mut rows = select.query(params![line_id.to_string(), freed_rank])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get::<_, String>(0)?);
    }

    let mut update = conn.prepare("UPDATE points SET vertex_rank = vertex_rank - 1 WHERE id = ?1;")?;
    for id in &ids {
        update.execute([id])?;
    }
    Ok(())
}

fn vertex_at(conn: &Connection, line_id: LineId, rank: i64) -> RepoResult<Option<PointId>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM points WHERE line_id = ?1 AND vertex_rank = ?2;",
            params![line_id.to_string(), rank],
            |row| row.get(0),
        )
        .optional()?;
    id.map(|text| parse_uuid(&text, "points.id")).transpose()
}

fn vertex_count(conn: &Connection, line_id: LineId) -> RepoResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM points WHERE line_id = ?1;",
        [line_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Horizon of an existing line; `NotFound` when the line is missing.
fn line_horizon(conn: &Connection, line_id: LineId) -> RepoResult<Option<UnitId>> {
    let horizon: Option<Option<String>> = conn
        .query_row(
            "SELECT horizon_id FROM lines WHERE id = ?1;",
            [line_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match horizon {
        Some(value) => parse_optional_uuid(value, "lines.horizon_id"),
        None => Err(RepoError::not_found(EntityKind::Line, line_id)),
    }
}

fn line_closed_flag(conn: &Connection, line_id: LineId) -> RepoResult<Option<bool>> {
    let flag: Option<i64> = conn
        .query_row(
            "SELECT is_closed FROM lines WHERE id = ?1;",
            [line_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    flag.map(|value| int_to_bool(value, "lines.is_closed"))
        .transpose()
}

fn ensure_line_exists(conn: &Connection, line_id: LineId) -> RepoResult<()> {
    match line_closed_flag(conn, line_id)? {
        Some(_) => Ok(()),
        None => Err(RepoError::not_found(EntityKind::Line, line_id)),
    }
}

/// `(point id, position)` of every vertex, in rank order.
fn load_vertex_rows(conn: &Connection, line_id: LineId) -> RepoResult<Vec<(PointId, Position)>> {
    let mut stmt = conn.prepare(
        "SELECT id, x, y
         FROM points
         WHERE line_id = ?1
         ORDER BY vertex_rank ASC;",
    )?;
    let mut rows = stmt.query([line_id.to_string()])?;
    let mut vertices = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        vertices.push((
            parse_uuid(&id, "points.id")?,
            Position::new(row.get(1)?, row.get(2)?),
        ));
    }
    Ok(vertices)
}

/// Re-validates a line after a vertex change and refreshes its cached extent.
///
/// Fails with `InvalidGeometry` when the line dropped below 2 vertices or a
/// closed line's endpoints drifted apart; the caller's unit of work rolls back.
pub(crate) fn refresh_line_geometry(
    conn: &Connection,
    line_id: LineId,
    tolerance: f64,
) -> RepoResult<()> {
    let closed = line_closed_flag(conn, line_id)?
        .ok_or_else(|| RepoError::not_found(EntityKind::Line, line_id))?;
    let positions: Vec<Position> = load_vertex_rows(conn, line_id)?
        .into_iter()
        .map(|(_, position)| position)
        .collect();

    if let Err(reason) = validate_shape(&positions, closed, tolerance) {
        warn!(
            "event=line_validate module=geometry status=rejected line_id={line_id} reason={reason}"
        );
        return Err(RepoError::geometry(Some(line_id), reason));
    }
    let extent = Extent::covering(positions).ok_or_else(|| {
        RepoError::geometry(Some(line_id), GeometryError::TooFewVertices { count: 0 })
    })?;
    conn.execute(
        "UPDATE lines
         SET min_x = ?2, min_y = ?3, max_x = ?4, max_y = ?5
         WHERE id = ?1;",
        params![
            line_id.to_string(),
            extent.min_x,
            extent.min_y,
            extent.max_x,
            extent.max_y,
        ],
    )?;
    Ok(())
}

pub(crate) fn load_vertices(conn: &Connection, line_id: LineId) -> RepoResult<Vec<Point>> {
    let mut stmt = conn.prepare(&format!(
        "{POINT_SELECT} WHERE line_id = ?1 ORDER BY vertex_rank ASC;"
    ))?;
    let mut rows = stmt.query([line_id.to_string()])?;
    let mut parsed = Vec::new();
    while let Some(row) = rows.next()? {
        parsed.push(parse_point_row(row)?);
    }
    parsed
        .into_iter()
        .map(|row| hydrate_point(conn, row))
        .collect()
}

pub(crate) fn load_line(conn: &Connection, id: LineId) -> RepoResult<Option<Line>> {
    let Some(closed) = line_closed_flag(conn, id)? else {
        return Ok(None);
    };
    let meta = load_meta(conn, id)?
        .ok_or_else(|| RepoError::InvalidData(format!("line {id} has no geo_objects row")))?;
    Ok(Some(Line {
        id,
        closed,
        horizon_id: line_horizon(conn, id)?,
        vertices: load_vertices(conn, id)?,
        meta,
    }))
}

/// `(x, y)` of every vertex in rank order plus the closed flag, without metadata.
pub(crate) fn load_line_shape(
    conn: &Connection,
    id: LineId,
) -> RepoResult<Option<(Vec<Position>, bool)>> {
    let Some(closed) = line_closed_flag(conn, id)? else {
        return Ok(None);
    };
    let positions = load_vertex_rows(conn, id)?
        .into_iter()
        .map(|(_, position)| position)
        .collect();
    Ok(Some((positions, closed)))
}
