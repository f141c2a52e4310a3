use geostore_core::{
    Coordinate, DbError, ErrorKind, GeoMeta, PointRepository, Position, RepoError, Session,
    StoreOptions, WellRepository,
};
use std::time::Duration;

fn coordinate(x: f64, y: f64) -> Coordinate {
    Coordinate::new(x, y, 0.0)
}

#[test]
fn failed_unit_of_work_rolls_back_every_write() {
    let session = Session::open_in_memory().unwrap();

    let mut created = None;
    let result: Result<(), RepoError> = session.with_transaction(|s| {
        created = Some(
            s.points()
                .create_point(coordinate(1.0, 1.0), GeoMeta::default())?,
        );
        s.points()
            .create_point(Coordinate::new(f64::NAN, 0.0, 0.0), GeoMeta::default())?;
        Ok(())
    });

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
    let created = created.unwrap();
    assert!(session.points().get_point(created).unwrap().is_none());
    assert!(!session.in_transaction());
}

#[test]
fn nested_failure_only_undoes_inner_writes() {
    let session = Session::open_in_memory().unwrap();

    let (outer_id, inner_id) = session
        .with_transaction(|s| {
            let outer_id = s
                .points()
                .create_point(coordinate(0.0, 0.0), GeoMeta::default())?;
            let mut inner_id = None;
            let inner: Result<(), RepoError> = s.with_transaction(|nested| {
                inner_id = Some(
                    nested
                        .points()
                        .create_point(coordinate(5.0, 5.0), GeoMeta::default())?,
                );
                Err(RepoError::InvalidData("abandon nested work".to_string()))
            });
            assert!(inner.is_err());
            assert!(s.in_transaction());
            Ok::<_, RepoError>((outer_id, inner_id))
        })
        .unwrap();

    assert!(session.points().get_point(outer_id).unwrap().is_some());
    assert!(session
        .points()
        .get_point(inner_id.unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn competing_writer_gets_store_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.geostore");
    let options = StoreOptions::default().with_busy_timeout(Duration::from_millis(50));

    let holder = Session::open_with(&path, options.clone()).unwrap();
    let contender = Session::open_with(&path, options).unwrap();

    holder
        .with_transaction(|s| {
            s.points()
                .create_point(coordinate(0.0, 0.0), GeoMeta::default())?;

            let err = contender
                .points()
                .create_point(coordinate(1.0, 1.0), GeoMeta::default())
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::StoreBusy);
            Ok::<_, RepoError>(())
        })
        .unwrap();

    // Lock released: the contender can write now.
    contender
        .points()
        .create_point(coordinate(1.0, 1.0), GeoMeta::default())
        .unwrap();
}

#[test]
fn read_scope_sees_one_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.geostore");

    let reader = Session::open(&path).unwrap();
    let writer = Session::open(&path).unwrap();
    writer
        .wells()
        .create_well(Position::new(10.0, 10.0), 100.0, GeoMeta::default())
        .unwrap();

    let (before, during) = reader
        .read(|s| {
            let before = s
                .query()
                .wells_in_bounding_box(0.0, 0.0, 100.0, 100.0)?
                .count();

            writer
                .wells()
                .create_well(Position::new(20.0, 20.0), 100.0, GeoMeta::default())?;

            let during = s
                .query()
                .wells_in_bounding_box(0.0, 0.0, 100.0, 100.0)?
                .count();
            Ok::<_, RepoError>((before, during))
        })
        .unwrap();

    assert_eq!(before, 1);
    assert_eq!(during, 1);

    let after = reader
        .query()
        .wells_in_bounding_box(0.0, 0.0, 100.0, 100.0)
        .unwrap()
        .count();
    assert_eq!(after, 2);
}

#[test]
fn writes_inside_read_scope_are_rejected() {
    let session = Session::open_in_memory().unwrap();

    let err = session
        .read(|s| {
            assert!(s.in_read_scope());
            s.points()
                .create_point(coordinate(3.0, 3.0), GeoMeta::default())
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::Db(DbError::ReadOnlyScope)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(!session.in_read_scope());
    assert!(!session.in_transaction());
    let stored = session
        .query()
        .points_in_bounding_box(0.0, 0.0, 10.0, 10.0)
        .unwrap()
        .count();
    assert_eq!(stored, 0);

    // Outside the read scope the same write succeeds.
    let id = session
        .points()
        .create_point(coordinate(3.0, 3.0), GeoMeta::default())
        .unwrap();
    assert!(session.points().get_point(id).unwrap().is_some());
}

#[test]
fn reads_inside_a_unit_of_work_may_write() {
    let session = Session::open_in_memory().unwrap();

    let id = session
        .with_transaction(|s| {
            s.read(|inner| {
                assert!(!inner.in_read_scope());
                inner
                    .points()
                    .create_point(coordinate(4.0, 4.0), GeoMeta::default())
            })
        })
        .unwrap();

    assert!(session.points().get_point(id).unwrap().is_some());
}
