use geostore_core::{
    Coordinate, DbError, ErrorKind, GeoMeta, PointRepository, RepoError, Session, StoreOptions,
    SCHEMA_VERSION,
};
use rusqlite::Connection;

#[test]
fn open_in_memory_installs_current_schema() {
    let session = Session::open_in_memory().unwrap();

    assert_eq!(session.schema_version().unwrap(), SCHEMA_VERSION);
    assert!(session.path().is_none());
    assert!(!session.in_transaction());
}

#[test]
fn reopening_a_store_keeps_its_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("field.geostore");

    let first = Session::open(&path).unwrap();
    let point_id = first
        .points()
        .create_point(Coordinate::new(1.0, 2.0, 3.0), GeoMeta::default())
        .unwrap();
    first.close().unwrap();

    let second = Session::open(&path).unwrap();
    assert_eq!(second.schema_version().unwrap(), SCHEMA_VERSION);
    let point = second.points().get_point(point_id).unwrap().unwrap();
    assert_eq!(point.coordinate, Coordinate::new(1.0, 2.0, 3.0));
}

#[test]
fn rollback_journal_store_opens_without_wal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.geostore");

    let session =
        Session::open_with(&path, StoreOptions::default().with_write_ahead_log(false)).unwrap();
    assert!(!session.options().write_ahead_log);
    assert_eq!(session.path(), Some(path.as_path()));
    assert!(!dir.path().join("plain.geostore-wal").exists());
}

#[test]
fn store_with_other_schema_version_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.geostore");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match Session::open(&path) {
        Err(DbError::SchemaMismatch { found, expected }) => {
            assert_eq!(found, 999);
            assert_eq!(expected, SCHEMA_VERSION);
        }
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn foreign_database_without_version_is_refused_and_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("foreign.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE inventory (id INTEGER PRIMARY KEY, label TEXT);")
        .unwrap();
    drop(conn);

    let err = Session::open(&path).unwrap_err();
    assert!(matches!(
        err,
        DbError::SchemaMismatch {
            found: 0,
            expected: SCHEMA_VERSION
        }
    ));

    let conn = Connection::open(&path).unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'geo_objects';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn unreachable_location_reports_store_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("nested").join("field.geostore");

    let err = Session::open(&path).unwrap_err();
    assert!(matches!(err, DbError::Unavailable { .. }));
    assert_eq!(RepoError::from(err).kind(), ErrorKind::StoreUnavailable);
}

#[test]
fn file_that_is_not_a_database_reports_store_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, vec![b'x'; 4096]).unwrap();

    let err = Session::open(&path).unwrap_err();
    assert!(matches!(err, DbError::Unavailable { .. }));
}

#[test]
fn options_are_normalized_on_open() {
    let options = StoreOptions {
        closed_tolerance: -1.0,
        page_size: 0,
        ..StoreOptions::default()
    };
    let session = Session::open_in_memory_with(options).unwrap();

    assert_eq!(
        session.options().closed_tolerance,
        StoreOptions::default().closed_tolerance
    );
    assert_eq!(session.options().page_size, 1);
}
