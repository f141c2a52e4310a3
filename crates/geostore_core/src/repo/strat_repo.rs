//! Stratigraphy repository: unit hierarchy persistence.
//!
//! # Responsibility
//! - Create, rename, re-parent and delete stratigraphic units.
//! - Answer hierarchy traversals (children, ancestors, subtree).
//!
//! # Invariants
//! - Parent links never form a cycle; every re-parent walks the chain first.
//! - A unit referenced by a marker, point or line is never deleted.
//! - Deleting with cascade re-parents children to the deleted unit's parent.
//! - Listings are deterministic: `name ASC` unless stated otherwise.

use super::{ensure_range, parse_optional_uuid, parse_uuid, EntityKind, RepoError, RepoResult};
use crate::db::Session;
use crate::model::stratigraphy::{
    normalize_age, normalize_unit_name, walk_parent_chain, ChainWalk, StratUnit, UnitId,
};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use uuid::Uuid;

const UNIT_SELECT: &str = "SELECT id, name, age, parent_id FROM strat_units";

pub trait StratigraphyRepository {
    /// Creates a unit under an optional existing parent.
    ///
    /// Negative or non-finite ages are stored as unknown.
    fn create_unit(
        &self,
        name: &str,
        parent_id: Option<UnitId>,
        age: Option<f64>,
    ) -> RepoResult<UnitId>;
    fn get_unit(&self, id: UnitId) -> RepoResult<Option<StratUnit>>;
    fn find_unit_by_name(&self, name: &str) -> RepoResult<Option<StratUnit>>;
    fn list_units(&self) -> RepoResult<Vec<StratUnit>>;
    /// Direct children of a unit.
    fn children(&self, id: UnitId) -> RepoResult<Vec<StratUnit>>;
    /// Parent chain from the direct parent up to the root.
    fn ancestors(&self, id: UnitId) -> RepoResult<Vec<StratUnit>>;
    /// The unit and every unit below it.
    fn descendants(&self, id: UnitId) -> RepoResult<Vec<StratUnit>>;
    /// Moves a unit under `new_parent` (or to the root with `None`).
    fn reparent(&self, id: UnitId, new_parent: Option<UnitId>) -> RepoResult<()>;
    fn rename_unit(&self, id: UnitId, name: &str) -> RepoResult<()>;
    /// Negative or non-finite ages are stored as unknown.
    fn set_unit_age(&self, id: UnitId, age: Option<f64>) -> RepoResult<()>;
    /// Units with a known age in `[min_age, max_age]`, youngest first.
    fn units_by_age(&self, min_age: f64, max_age: f64) -> RepoResult<Vec<StratUnit>>;
    /// Deletes a unit.
    ///
    /// Markers, points and lines referencing the unit always block deletion.
    /// Children block it unless `cascade` is set, in which case they move to
    /// the unit's parent.
    fn delete_unit(&self, id: UnitId, cascade: bool) -> RepoResult<()>;
}

pub struct SqliteStratigraphyRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteStratigraphyRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }
}

impl StratigraphyRepository for SqliteStratigraphyRepository<'_> {
    fn create_unit(
        &self,
        name: &str,
        parent_id: Option<UnitId>,
        age: Option<f64>,
    ) -> RepoResult<UnitId> {
        let name = valid_name(name)?;
        let id = Uuid::new_v4();
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_name_free(conn, &name, None)?;
            if let Some(parent_id) = parent_id {
                ensure_unit_exists(conn, parent_id)?;
            }
            conn.execute(
                "INSERT INTO strat_units (id, name, age, parent_id) VALUES (?1, ?2, ?3, ?4);",
                params![
                    id.to_string(),
                    name,
                    normalize_age(age),
                    parent_id.map(|value| value.to_string())
                ],
            )?;
            Ok::<_, RepoError>(())
        })?;
        info!("event=unit_create module=stratigraphy status=ok unit_id={id}");
        Ok(id)
    }

    fn get_unit(&self, id: UnitId) -> RepoResult<Option<StratUnit>> {
        load_unit(self.session.conn(), id)
    }

    fn find_unit_by_name(&self, name: &str) -> RepoResult<Option<StratUnit>> {
        let Some(name) = normalize_unit_name(name) else {
            return Ok(None);
        };
        let mut stmt = self
            .session
            .conn()
            .prepare(&format!("{UNIT_SELECT} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        match rows.next()? {
            Some(row) => parse_unit_row(row).map(Some),
            None => Ok(None),
        }
    }

    fn list_units(&self) -> RepoResult<Vec<StratUnit>> {
        query_units(
            self.session.conn(),
            &format!("{UNIT_SELECT} ORDER BY name ASC;"),
            &[],
        )
    }

    fn children(&self, id: UnitId) -> RepoResult<Vec<StratUnit>> {
        self.session.read(|s| {
            ensure_unit_exists(s.conn(), id)?;
            query_units(
                s.conn(),
                &format!("{UNIT_SELECT} WHERE parent_id = ?1 ORDER BY name ASC;"),
                params![id.to_string()],
            )
        })
    }

    fn ancestors(&self, id: UnitId) -> RepoResult<Vec<StratUnit>> {
        self.session.read(|s| {
            let conn = s.conn();
            let unit = load_unit(conn, id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Unit, id))?;
            let limit = unit_count(conn)?;
            let mut chain = Vec::new();
            let mut cursor = unit.parent_id;
            while let Some(parent_id) = cursor {
                if chain.len() > limit {
                    return Err(RepoError::InvalidData(format!(
                        "parent chain of unit {id} does not reach a root"
                    )));
                }
                let parent = load_unit(conn, parent_id)?.ok_or_else(|| {
                    RepoError::InvalidData(format!("unit {id} has a dangling parent {parent_id}"))
                })?;
                cursor = parent.parent_id;
                chain.push(parent);
            }
            Ok(chain)
        })
    }

    fn descendants(&self, id: UnitId) -> RepoResult<Vec<StratUnit>> {
        self.session.read(|s| {
            ensure_unit_exists(s.conn(), id)?;
            query_units(
                s.conn(),
                "WITH RECURSIVE subtree(id) AS (
                    SELECT id FROM strat_units WHERE id = ?1
                    UNION
                    SELECT child.id
                    FROM strat_units child
                    INNER JOIN subtree parent ON child.parent_id = parent.id
                )
                SELECT units.id, units.name, units.age, units.parent_id
                FROM strat_units units
                INNER JOIN subtree ON subtree.id = units.id
                ORDER BY units.name ASC;",
                params![id.to_string()],
            )
        })
    }

    fn reparent(&self, id: UnitId, new_parent: Option<UnitId>) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_unit_exists(conn, id)?;
            if let Some(parent_id) = new_parent {
                ensure_unit_exists(conn, parent_id)?;
                ensure_acyclic(conn, id, parent_id)?;
            }
            conn.execute(
                "UPDATE strat_units
                 SET parent_id = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id.to_string(), new_parent.map(|value| value.to_string())],
            )?;
            Ok(())
        })
    }

    fn rename_unit(&self, id: UnitId, name: &str) -> RepoResult<()> {
        let name = valid_name(name)?;
        self.session.with_transaction(|s| {
            let conn = s.conn();
            ensure_unit_exists(conn, id)?;
            ensure_name_free(conn, &name, Some(id))?;
            conn.execute(
                "UPDATE strat_units
                 SET name = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id.to_string(), name],
            )?;
            Ok(())
        })
    }

    fn set_unit_age(&self, id: UnitId, age: Option<f64>) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            let changed = s.conn().execute(
                "UPDATE strat_units
                 SET age = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![id.to_string(), normalize_age(age)],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found(EntityKind::Unit, id));
            }
            Ok(())
        })
    }

    fn units_by_age(&self, min_age: f64, max_age: f64) -> RepoResult<Vec<StratUnit>> {
        ensure_range("age", min_age, max_age)?;
        query_units(
            self.session.conn(),
            &format!(
                "{UNIT_SELECT}
                 WHERE age IS NOT NULL AND age >= ?1 AND age <= ?2
                 ORDER BY age ASC, name ASC;"
            ),
            params![min_age, max_age],
        )
    }

    fn delete_unit(&self, id: UnitId, cascade: bool) -> RepoResult<()> {
        let result: RepoResult<usize> = self.session.with_transaction(|s| {
            let conn = s.conn();
            let unit = load_unit(conn, id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::Unit, id))?;
            let child_units = count(
                conn,
                "SELECT COUNT(*) FROM strat_units WHERE parent_id = ?1;",
                id,
            )?;
            let markers = count(conn, "SELECT COUNT(*) FROM well_markers WHERE unit_id = ?1;", id)?;
            let geometries = count(
                conn,
                "SELECT (SELECT COUNT(*) FROM points WHERE horizon_id = ?1 AND line_id IS NULL)
                      + (SELECT COUNT(*) FROM lines WHERE horizon_id = ?1);",
                id,
            )?;
            if markers > 0 || geometries > 0 || (child_units > 0 && !cascade) {
                return Err(RepoError::UnitInUse {
                    unit_id: id,
                    child_units,
                    markers,
                    geometries,
                });
            }
            if child_units > 0 {
                conn.execute(
                    "UPDATE strat_units
                     SET parent_id = ?2,
                         updated_at = (strftime('%s', 'now') * 1000)
                     WHERE parent_id = ?1;",
                    params![id.to_string(), unit.parent_id.map(|value| value.to_string())],
                )?;
            }
            conn.execute("DELETE FROM strat_units WHERE id = ?1;", [id.to_string()])?;
            Ok::<_, RepoError>(child_units)
        });

        match &result {
            Ok(moved) => info!(
                "event=unit_delete module=stratigraphy status=ok unit_id={id} reparented_children={moved}"
            ),
            Err(err @ RepoError::UnitInUse { .. }) => warn!(
                "event=unit_delete module=stratigraphy status=rejected unit_id={id} cascade={cascade} error={err}"
            ),
            Err(_) => {}
        }
        result.map(|_| ())
    }
}

fn valid_name(name: &str) -> RepoResult<String> {
    normalize_unit_name(name).ok_or_else(|| RepoError::InvalidName {
        what: "stratigraphic unit",
        value: name.to_string(),
    })
}

fn ensure_name_free(conn: &Connection, name: &str, except: Option<UnitId>) -> RepoResult<()> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT id FROM strat_units WHERE name = ?1;",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    match holder {
        Some(holder) if except.map(|id| id.to_string()).as_deref() != Some(holder.as_str()) => {
            Err(RepoError::DuplicateName {
                what: "stratigraphic unit",
                name: name.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Rejects `parent_id` when walking its parent chain reaches `unit_id`.
fn ensure_acyclic(conn: &Connection, unit_id: UnitId, parent_id: UnitId) -> RepoResult<()> {
    let max_steps = unit_count(conn)?;
    let walk = walk_parent_chain(unit_id, parent_id, max_steps, |current| {
        Ok::<_, RepoError>(parent_of(conn, current)?.flatten())
    })?;
    match walk {
        ChainWalk::Acyclic => Ok(()),
        ChainWalk::ReachesUnit => {
            warn!(
                "event=unit_reparent module=stratigraphy status=rejected unit_id={unit_id} parent_id={parent_id}"
            );
            Err(RepoError::CyclicHierarchy { unit_id, parent_id })
        }
        ChainWalk::Exhausted => Err(RepoError::InvalidData(format!(
            "parent chain above unit {parent_id} does not reach a root"
        ))),
    }
}

/// `None` when the unit is missing, `Some(None)` for a root.
fn parent_of(conn: &Connection, id: UnitId) -> RepoResult<Option<Option<UnitId>>> {
    let parent: Option<Option<String>> = conn
        .query_row(
            "SELECT parent_id FROM strat_units WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    parent
        .map(|value| parse_optional_uuid(value, "strat_units.parent_id"))
        .transpose()
}

fn unit_count(conn: &Connection) -> RepoResult<usize> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM strat_units;", [], |row| row.get(0))?;
    Ok(total.max(0) as usize)
}

fn count(conn: &Connection, sql: &str, id: UnitId) -> RepoResult<usize> {
    let total: i64 = conn.query_row(sql, [id.to_string()], |row| row.get(0))?;
    Ok(total.max(0) as usize)
}

pub(crate) fn ensure_unit_exists(conn: &Connection, id: UnitId) -> RepoResult<()> {
    match parent_of(conn, id)? {
        Some(_) => Ok(()),
        None => Err(RepoError::not_found(EntityKind::Unit, id)),
    }
}

pub(crate) fn load_unit(conn: &Connection, id: UnitId) -> RepoResult<Option<StratUnit>> {
    let mut stmt = conn.prepare(&format!("{UNIT_SELECT} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => parse_unit_row(row).map(Some),
        None => Ok(None),
    }
}

fn query_units(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> RepoResult<Vec<StratUnit>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut units = Vec::new();
    while let Some(row) = rows.next()? {
        units.push(parse_unit_row(row)?);
    }
    Ok(units)
}

fn parse_unit_row(row: &Row<'_>) -> RepoResult<StratUnit> {
    let id_text: String = row.get(0)?;
    Ok(StratUnit {
        id: parse_uuid(&id_text, "strat_units.id")?,
        name: row.get(1)?,
        age: row.get(2)?,
        parent_id: parse_optional_uuid(row.get(3)?, "strat_units.parent_id")?,
    })
}
