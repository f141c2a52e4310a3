use geostore_core::{
    Coordinate, ErrorKind, GeoMeta, LineRepository, PointRepository, Position, RepoError, Session,
    StratigraphyRepository, WellRepository,
};

fn setup() -> Session {
    Session::open_in_memory().unwrap()
}

fn names(units: &[geostore_core::StratUnit]) -> Vec<&str> {
    units.iter().map(|unit| unit.name.as_str()).collect()
}

#[test]
fn hierarchy_navigation_is_deterministic() {
    let session = setup();
    let units = session.units();

    let era = units.create_unit("Mesozoic", None, None).unwrap();
    let jurassic = units.create_unit("Jurassic", Some(era), None).unwrap();
    let triassic = units.create_unit("Triassic", Some(era), None).unwrap();
    let lias = units.create_unit("Lias", Some(jurassic), None).unwrap();

    assert_eq!(names(&units.children(era).unwrap()), vec!["Jurassic", "Triassic"]);
    assert_eq!(names(&units.ancestors(lias).unwrap()), vec!["Jurassic", "Mesozoic"]);
    assert_eq!(
        names(&units.descendants(era).unwrap()),
        vec!["Jurassic", "Lias", "Mesozoic", "Triassic"]
    );
    assert!(units.children(triassic).unwrap().is_empty());
    assert!(units.get_unit(era).unwrap().unwrap().is_root());
    assert_eq!(
        units.find_unit_by_name("Lias").unwrap().map(|unit| unit.id),
        Some(lias)
    );
    assert_eq!(units.list_units().unwrap().len(), 4);
}

#[test]
fn unit_names_are_unique_and_non_blank() {
    let session = setup();
    let units = session.units();
    let first = units.create_unit("Keuper", None, None).unwrap();

    let duplicate = units.create_unit("Keuper", None, None).unwrap_err();
    assert!(matches!(duplicate, RepoError::DuplicateName { .. }));
    assert_eq!(duplicate.kind(), ErrorKind::InvalidInput);

    let blank = units.create_unit("   ", None, None).unwrap_err();
    assert!(matches!(blank, RepoError::InvalidName { .. }));

    // Renaming a unit to its own name is not a conflict.
    units.rename_unit(first, "Keuper").unwrap();
    let second = units.create_unit("Muschelkalk", None, None).unwrap();
    assert!(units.rename_unit(second, "Keuper").is_err());
}

#[test]
fn missing_parent_is_not_found() {
    let session = setup();
    let err = session
        .units()
        .create_unit("Orphan", Some(uuid::Uuid::new_v4()), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn reparenting_under_a_descendant_is_cyclic() {
    let session = setup();
    let units = session.units();
    let a = units.create_unit("A", None, None).unwrap();
    let b = units.create_unit("B", Some(a), None).unwrap();
    let c = units.create_unit("C", Some(b), None).unwrap();

    let err = units.reparent(a, Some(c)).unwrap_err();
    assert!(matches!(err, RepoError::CyclicHierarchy { .. }));
    assert_eq!(err.kind(), ErrorKind::CyclicHierarchy);

    let self_parent = units.reparent(b, Some(b)).unwrap_err();
    assert_eq!(self_parent.kind(), ErrorKind::CyclicHierarchy);

    assert_eq!(units.get_unit(a).unwrap().unwrap().parent_id, None);

    units.reparent(c, None).unwrap();
    units.reparent(a, Some(c)).unwrap();
    assert_eq!(names(&units.ancestors(b).unwrap()), vec!["A", "C"]);
}

#[test]
fn reparent_is_visible_to_subtree_queries() {
    let session = setup();
    let units = session.units();
    let upper = units.create_unit("Upper", None, None).unwrap();
    let lower = units.create_unit("Lower", None, None).unwrap();
    let member = units.create_unit("Member", Some(upper), None).unwrap();

    let well = session
        .wells()
        .create_well(Position::new(0.0, 0.0), 50.0, GeoMeta::default())
        .unwrap();
    session.wells().add_marker(well, 12.0, Some(member)).unwrap();

    let under_lower = |session: &Session| {
        session
            .query()
            .wells_by_unit(lower, true)
            .unwrap()
            .map(|well| well.unwrap().id)
            .collect::<Vec<_>>()
    };
    assert!(under_lower(&session).is_empty());

    units.reparent(member, Some(lower)).unwrap();
    assert_eq!(under_lower(&session), vec![well]);

    let direct = session
        .query()
        .wells_by_unit(lower, false)
        .unwrap()
        .count();
    assert_eq!(direct, 0);
}

#[test]
fn units_in_use_cannot_be_deleted() {
    let session = setup();
    let units = session.units();
    let group = units.create_unit("Group", None, None).unwrap();
    let formation = units.create_unit("Formation", Some(group), None).unwrap();

    let well = session
        .wells()
        .create_well(Position::new(0.0, 0.0), 0.0, GeoMeta::default())
        .unwrap();
    let marker = session
        .wells()
        .add_marker(well, 5.0, Some(formation))
        .unwrap();

    match units.delete_unit(group, false).unwrap_err() {
        RepoError::UnitInUse {
            child_units,
            markers,
            ..
        } => {
            assert_eq!(child_units, 1);
            assert_eq!(markers, 0);
        }
        other => panic!("expected unit in use, got {other:?}"),
    }

    let referenced = units.delete_unit(formation, true).unwrap_err();
    assert_eq!(referenced.kind(), ErrorKind::UnitInUse);

    let replacement = units.create_unit("Replacement", None, None).unwrap();
    session
        .wells()
        .reassign_marker(marker, Some(replacement))
        .unwrap();
    units.delete_unit(formation, true).unwrap();
    units.delete_unit(group, false).unwrap();
    assert_eq!(names(&units.list_units().unwrap()), vec!["Replacement"]);
}

#[test]
fn cascading_delete_lifts_children_to_grandparent() {
    let session = setup();
    let units = session.units();
    let root = units.create_unit("Root", None, None).unwrap();
    let middle = units.create_unit("Middle", Some(root), None).unwrap();
    let leaf_a = units.create_unit("Leaf A", Some(middle), None).unwrap();
    let leaf_b = units.create_unit("Leaf B", Some(middle), None).unwrap();

    units.delete_unit(middle, true).unwrap();

    assert!(units.get_unit(middle).unwrap().is_none());
    assert_eq!(units.get_unit(leaf_a).unwrap().unwrap().parent_id, Some(root));
    assert_eq!(units.get_unit(leaf_b).unwrap().unwrap().parent_id, Some(root));
    assert_eq!(names(&units.children(root).unwrap()), vec!["Leaf A", "Leaf B"]);
}

#[test]
fn units_are_filtered_by_age() {
    let session = setup();
    let units = session.units();
    let cretaceous = units.create_unit("Cretaceous", None, None).unwrap();
    let jurassic = units.create_unit("Jurassic", None, None).unwrap();
    let undated = units.create_unit("Undated", None, None).unwrap();
    units.set_unit_age(cretaceous, Some(100.5)).unwrap();
    units.set_unit_age(jurassic, Some(174.1)).unwrap();
    units.set_unit_age(undated, None).unwrap();

    assert_eq!(
        names(&units.units_by_age(90.0, 200.0).unwrap()),
        vec!["Cretaceous", "Jurassic"]
    );
    assert_eq!(
        names(&units.units_by_age(150.0, 180.0).unwrap()),
        vec!["Jurassic"]
    );

    let err = units.units_by_age(200.0, 90.0).unwrap_err();
    assert!(matches!(err, RepoError::InvalidRange { .. }));

    let missing = units
        .set_unit_age(uuid::Uuid::new_v4(), Some(1.0))
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn age_is_set_at_creation() {
    let session = setup();
    let units = session.units();
    let dated = units.create_unit("Zechstein", None, Some(258.0)).unwrap();
    let invalid = units.create_unit("Rotliegend", None, Some(f64::NAN)).unwrap();

    assert_eq!(units.get_unit(dated).unwrap().unwrap().age, Some(258.0));
    assert_eq!(units.get_unit(invalid).unwrap().unwrap().age, None);
    assert_eq!(
        names(&units.units_by_age(250.0, 260.0).unwrap()),
        vec!["Zechstein"]
    );
}

#[test]
fn horizons_of_points_and_lines_block_unit_deletion() {
    let session = setup();
    let units = session.units();
    let horizon = units.create_unit("Horizon", None, None).unwrap();

    let point = session
        .points()
        .create_point_with_horizon(Coordinate::new(0.0, 0.0, 0.0), Some(horizon), GeoMeta::default())
        .unwrap();
    let line = session
        .lines()
        .create_line_with_horizon(
            &[Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(1.0, 0.0, 0.0)],
            false,
            Some(horizon),
            GeoMeta::default(),
        )
        .unwrap();

    match units.delete_unit(horizon, true).unwrap_err() {
        RepoError::UnitInUse { geometries, markers, .. } => {
            assert_eq!(geometries, 2);
            assert_eq!(markers, 0);
        }
        other => panic!("expected unit in use, got {other:?}"),
    }

    session.points().set_point_horizon(point, None).unwrap();
    let still_used = units.delete_unit(horizon, false).unwrap_err();
    assert_eq!(still_used.kind(), ErrorKind::UnitInUse);

    session.lines().set_line_horizon(line, None).unwrap();
    units.delete_unit(horizon, false).unwrap();
    assert!(units.get_unit(horizon).unwrap().is_none());
}
