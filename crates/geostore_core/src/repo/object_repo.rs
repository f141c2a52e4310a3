//! Geo-object base repository: identity rows, names, comments and tags.
//!
//! # Responsibility
//! - Own the `geo_objects` and `geo_object_tags` tables.
//! - Provide metadata edits common to points, lines and wells.
//!
//! # Invariants
//! - Every point, line and well row has exactly one `geo_objects` row.
//! - Deleting a `geo_objects` row cascades to its concrete row and tags.

use super::{parse_uuid, EntityKind, RepoError, RepoResult};
use crate::db::Session;
use crate::model::geo_object::{is_valid_tag_key, GeoKind, GeoMeta, ObjectId, Tags};
use rusqlite::{params, Connection, OptionalExtension};

/// Metadata operations shared by every geo object.
pub trait GeoObjectRepository {
    /// Loads name, comment and tags of any geo object.
    fn get_meta(&self, id: ObjectId) -> RepoResult<GeoMeta>;
    /// Resolves which concrete kind an id belongs to.
    fn kind_of(&self, id: ObjectId) -> RepoResult<Option<GeoKind>>;
    fn set_name(&self, id: ObjectId, name: &str) -> RepoResult<()>;
    fn set_comment(&self, id: ObjectId, comment: &str) -> RepoResult<()>;
    /// Inserts or replaces one tag.
    fn set_tag(&self, id: ObjectId, key: &str, value: &str) -> RepoResult<()>;
    /// Removes one tag; returns whether it existed.
    fn remove_tag(&self, id: ObjectId, key: &str) -> RepoResult<bool>;
}

pub struct SqliteGeoObjectRepository<'s> {
    session: &'s Session,
}

impl<'s> SqliteGeoObjectRepository<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }
}

impl GeoObjectRepository for SqliteGeoObjectRepository<'_> {
    fn get_meta(&self, id: ObjectId) -> RepoResult<GeoMeta> {
        self.session.read(|s| {
            load_meta(s.conn(), id)?
                .ok_or_else(|| RepoError::not_found(EntityKind::GeoObject, id))
        })
    }

    fn kind_of(&self, id: ObjectId) -> RepoResult<Option<GeoKind>> {
        object_kind(self.session.conn(), id)
    }

    fn set_name(&self, id: ObjectId, name: &str) -> RepoResult<()> {
        update_text_column(self.session, id, "name", name)
    }

    fn set_comment(&self, id: ObjectId, comment: &str) -> RepoResult<()> {
        update_text_column(self.session, id, "comment", comment)
    }

    fn set_tag(&self, id: ObjectId, key: &str, value: &str) -> RepoResult<()> {
        self.session.with_transaction(|s| {
            ensure_object_exists(s.conn(), id)?;
            let tags = Tags::from([(key.to_string(), value.to_string())]);
            write_tags(s.conn(), id, &tags)?;
            touch(s.conn(), id)
        })
    }

    fn remove_tag(&self, id: ObjectId, key: &str) -> RepoResult<bool> {
        self.session.with_transaction(|s| {
            ensure_object_exists(s.conn(), id)?;
            let removed = s.conn().execute(
                "DELETE FROM geo_object_tags WHERE object_id = ?1 AND tag_key = ?2;",
                params![id.to_string(), key],
            )?;
            touch(s.conn(), id)?;
            Ok(removed > 0)
        })
    }
}

fn update_text_column(
    session: &Session,
    id: ObjectId,
    column: &'static str,
    value: &str,
) -> RepoResult<()> {
    session.with_transaction(|s| {
        let changed = s.conn().execute(
            &format!(
                "UPDATE geo_objects
                 SET {column} = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;"
            ),
            params![id.to_string(), value],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found(EntityKind::GeoObject, id));
        }
        Ok(())
    })
}

/// Inserts the base row plus tags of a new geo object.
pub(crate) fn insert_geo_object(
    conn: &Connection,
    id: ObjectId,
    kind: GeoKind,
    meta: &GeoMeta,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO geo_objects (id, kind, name, comment) VALUES (?1, ?2, ?3, ?4);",
        params![id.to_string(), kind.as_db(), meta.name, meta.comment],
    )?;
    write_tags(conn, id, &meta.tags)
}

/// Upserts tags after validating every key; nothing is written on a bad key.
pub(crate) fn write_tags(conn: &Connection, id: ObjectId, tags: &Tags) -> RepoResult<()> {
    if let Some(key) = tags.keys().find(|key| !is_valid_tag_key(key)) {
        return Err(RepoError::InvalidTag {
            object_id: id,
            key: key.clone(),
        });
    }
    let mut stmt = conn.prepare(
        "INSERT INTO geo_object_tags (object_id, tag_key, tag_value)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (object_id, tag_key) DO UPDATE SET tag_value = excluded.tag_value;",
    )?;
    for (key, value) in tags {
        stmt.execute(params![id.to_string(), key, value])?;
    }
    Ok(())
}

pub(crate) fn load_meta(conn: &Connection, id: ObjectId) -> RepoResult<Option<GeoMeta>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT name, comment FROM geo_objects WHERE id = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((name, comment)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT tag_key, tag_value
         FROM geo_object_tags
         WHERE object_id = ?1
         ORDER BY tag_key ASC;",
    )?;
    let mut rows = stmt.query([id.to_string()])?;
    let mut tags = Tags::new();
    while let Some(row) = rows.next()? {
        tags.insert(row.get(0)?, row.get(1)?);
    }
    Ok(Some(GeoMeta {
        name,
        comment,
        tags,
    }))
}

pub(crate) fn object_kind(conn: &Connection, id: ObjectId) -> RepoResult<Option<GeoKind>> {
    let kind: Option<String> = conn
        .query_row(
            "SELECT kind FROM geo_objects WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    kind.map(|value| {
        GeoKind::from_db(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid kind `{value}` in geo_objects.kind"))
        })
    })
    .transpose()
}

/// Deletes base rows; cascades remove concrete rows, tags and owned children.
pub(crate) fn delete_geo_objects(conn: &Connection, ids: &[ObjectId]) -> RepoResult<usize> {
    let mut stmt = conn.prepare("DELETE FROM geo_objects WHERE id = ?1;")?;
    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute([id.to_string()])?;
    }
    Ok(deleted)
}

pub(crate) fn touch(conn: &Connection, id: ObjectId) -> RepoResult<()> {
    conn.execute(
        "UPDATE geo_objects
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        [id.to_string()],
    )?;
    Ok(())
}

fn ensure_object_exists(conn: &Connection, id: ObjectId) -> RepoResult<()> {
    match object_kind(conn, id)? {
        Some(_) => Ok(()),
        None => Err(RepoError::not_found(EntityKind::GeoObject, id)),
    }
}

/// Lists object ids of one kind whose name matches exactly, in id order.
pub(crate) fn ids_by_name(conn: &Connection, kind: GeoKind, name: &str) -> RepoResult<Vec<ObjectId>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM geo_objects WHERE kind = ?1 AND name = ?2 ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query(params![kind.as_db(), name])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        ids.push(parse_uuid(&text, "geo_objects.id")?);
    }
    Ok(ids)
}
