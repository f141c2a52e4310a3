use geostore_core::{
    Coordinate, EntityKind, ErrorKind, GeoKind, GeoMeta, GeoObjectRepository, GeometryError,
    LineRepository, PointRepository, Position, PropertyValue, RepoError, Session, StoreOptions,
    StratigraphyRepository, Tags, ThicknessSample, WellRepository,
};

fn setup() -> Session {
    Session::open_in_memory().unwrap()
}

fn c(x: f64, y: f64) -> Coordinate {
    Coordinate::new(x, y, 0.0)
}

fn square(session: &Session, closed: bool) -> uuid::Uuid {
    session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0), c(0.0, 10.0), c(0.0, 0.0)],
            closed,
            GeoMeta::default(),
        )
        .unwrap()
}

#[test]
fn point_crud_keeps_metadata_and_tags() {
    let session = setup();
    let meta = GeoMeta {
        name: "outcrop-7".to_string(),
        comment: "fresh exposure".to_string(),
        ..GeoMeta::with_tags(Tags::from([(
            "lithology".to_string(),
            "sandstone".to_string(),
        )]))
    };

    let id = session
        .points()
        .create_point(Coordinate::new(3.0, 4.0, 120.5), meta.clone())
        .unwrap();
    let point = session.points().get_point(id).unwrap().unwrap();
    assert_eq!(point.coordinate, Coordinate::new(3.0, 4.0, 120.5));
    assert!(point.is_standalone());
    assert_eq!(point.meta, meta);

    session
        .points()
        .move_point(id, Coordinate::new(5.0, 6.0, 100.0))
        .unwrap();
    let moved = session.points().get_point(id).unwrap().unwrap();
    assert_eq!(moved.coordinate, Coordinate::new(5.0, 6.0, 100.0));

    let found = session.points().find_points_by_name("outcrop-7").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);

    session.points().delete_point(id).unwrap();
    assert!(session.points().get_point(id).unwrap().is_none());
    let err = session.points().delete_point(id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn non_finite_coordinates_are_rejected() {
    let session = setup();

    let err = session
        .points()
        .create_point(Coordinate::new(f64::INFINITY, 0.0, 0.0), GeoMeta::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);

    let line_err = session
        .lines()
        .create_line(&[c(0.0, 0.0), c(f64::NAN, 1.0)], false, GeoMeta::default())
        .unwrap_err();
    assert_eq!(line_err.kind(), ErrorKind::InvalidGeometry);
}

#[test]
fn object_metadata_is_editable_through_the_base_contract() {
    let session = setup();
    let id = session
        .points()
        .create_point(c(0.0, 0.0), GeoMeta::default())
        .unwrap();
    let objects = session.objects();

    assert_eq!(objects.kind_of(id).unwrap(), Some(GeoKind::Point));
    objects.set_name(id, "sample-1").unwrap();
    objects.set_comment(id, "collected at dawn").unwrap();
    objects.set_tag(id, "collector", "field team").unwrap();
    objects.set_tag(id, "collector", "survey crew").unwrap();

    let meta = objects.get_meta(id).unwrap();
    assert_eq!(meta.name, "sample-1");
    assert_eq!(meta.comment, "collected at dawn");
    assert_eq!(
        meta.tags.get("collector").map(String::as_str),
        Some("survey crew")
    );

    assert!(objects.remove_tag(id, "collector").unwrap());
    assert!(!objects.remove_tag(id, "collector").unwrap());

    let err = objects.set_tag(id, "bad key", "x").unwrap_err();
    assert!(matches!(err, RepoError::InvalidTag { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let missing = uuid::Uuid::new_v4();
    assert_eq!(objects.kind_of(missing).unwrap(), None);
    match objects.get_meta(missing).unwrap_err() {
        RepoError::NotFound(entity) => {
            assert_eq!(entity.kind, EntityKind::GeoObject);
            assert_eq!(entity.id, missing);
        }
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn line_vertices_are_ranked_in_creation_order() {
    let session = setup();
    let id = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)],
            false,
            GeoMeta::default(),
        )
        .unwrap();

    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1, 2]);
    assert_eq!(line.length(), 2.0);
    assert!(line
        .vertices
        .iter()
        .all(|vertex| vertex.vertex.map(|slot| slot.line_id) == Some(id)));
    assert_eq!(session.objects().kind_of(id).unwrap(), Some(GeoKind::Line));
}

#[test]
fn line_needs_at_least_two_vertices() {
    let session = setup();

    let err = session
        .lines()
        .create_line(&[c(0.0, 0.0)], false, GeoMeta::default())
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidGeometry {
            reason: GeometryError::TooFewVertices { count: 1 },
            ..
        }
    ));
}

#[test]
fn occupied_rank_conflicts_unless_shifted() {
    let session = setup();
    let id = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)],
            false,
            GeoMeta::default(),
        )
        .unwrap();

    let err = session
        .lines()
        .insert_vertex(id, 1, c(0.5, 1.0), false)
        .unwrap_err();
    assert!(matches!(err, RepoError::RankConflict { rank: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::RankConflict);

    let inserted = session
        .lines()
        .insert_vertex(id, 1, c(0.5, 1.0), true)
        .unwrap();
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1, 2, 3]);
    assert_eq!(line.vertices[1].id, inserted);
    assert_eq!(
        line.coordinates(),
        vec![c(0.0, 0.0), c(0.5, 1.0), c(1.0, 0.0), c(2.0, 0.0)]
    );

    let negative = session
        .lines()
        .insert_vertex(id, -1, c(0.0, 0.0), true)
        .unwrap_err();
    assert_eq!(negative.kind(), ErrorKind::InvalidGeometry);
}

#[test]
fn ranks_stay_gapless_after_remove_and_insert_past_end() {
    let session = setup();
    let id = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)],
            false,
            GeoMeta::default(),
        )
        .unwrap();

    let appended_at_end = session
        .lines()
        .insert_vertex(id, 100, c(3.0, 0.0), false)
        .unwrap();
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1, 2, 3]);
    assert_eq!(line.vertices[3].id, appended_at_end);

    session.lines().remove_vertex(id, 1).unwrap();
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1, 2]);
    assert_eq!(line.coordinates(), vec![c(0.0, 0.0), c(2.0, 0.0), c(3.0, 0.0)]);

    let appended = session.lines().append_vertex(id, c(4.0, 0.0)).unwrap();
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1, 2, 3]);
    assert_eq!(
        session.points().get_point(appended).unwrap().unwrap().rank(),
        Some(3)
    );

    let err = session.lines().remove_vertex(id, 7).unwrap_err();
    assert!(matches!(err, RepoError::MissingVertex { rank: 7, .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn removing_below_two_vertices_is_rolled_back() {
    let session = setup();
    let id = session
        .lines()
        .create_line(&[c(0.0, 0.0), c(1.0, 0.0)], false, GeoMeta::default())
        .unwrap();

    let err = session.lines().remove_vertex(id, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.ranks(), vec![0, 1]);
}

#[test]
fn closed_line_endpoints_must_meet_within_tolerance() {
    let session = Session::open_in_memory_with(
        StoreOptions::default().with_closed_tolerance(0.01),
    )
    .unwrap();

    let err = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0), c(0.0, 0.5)],
            true,
            GeoMeta::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidGeometry {
            reason: GeometryError::OpenEndpoints { .. },
            ..
        }
    ));

    let id = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0), c(0.005, 0.0)],
            true,
            GeoMeta::default(),
        )
        .unwrap();
    assert!(session.lines().get_line(id).unwrap().unwrap().closed);
}

#[test]
fn edits_that_break_closure_are_rejected() {
    let session = setup();
    let id = square(&session, true);

    let err = session.lines().append_vertex(id, c(20.0, 20.0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);

    let line = session.lines().get_line(id).unwrap().unwrap();
    let last = line.vertices.last().unwrap().id;
    let err = session
        .points()
        .move_point(last, c(3.0, 3.0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);

    let unchanged = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(unchanged, line);
}

#[test]
fn opening_and_closing_a_line_revalidates_it() {
    let session = setup();
    let id = session
        .lines()
        .create_line(
            &[c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0)],
            false,
            GeoMeta::default(),
        )
        .unwrap();

    let err = session.lines().set_closed(id, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidGeometry);
    assert!(!session.lines().get_line(id).unwrap().unwrap().closed);

    session.lines().append_vertex(id, c(0.0, 0.0)).unwrap();
    session.lines().set_closed(id, true).unwrap();
    assert!(session.lines().get_line(id).unwrap().unwrap().closed);
}

#[test]
fn vertices_cannot_be_deleted_as_standalone_points() {
    let session = setup();
    let id = square(&session, false);
    let vertex = session.lines().get_line(id).unwrap().unwrap().vertices[0].id;

    let err = session.points().delete_point(vertex).unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidGeometry {
            reason: GeometryError::OwnedVertex { .. },
            ..
        }
    ));
}

#[test]
fn moving_a_vertex_moves_the_line() {
    let session = setup();
    let id = session
        .lines()
        .create_line(&[c(0.0, 0.0), c(1.0, 0.0)], false, GeoMeta::default())
        .unwrap();
    let vertex = session.lines().get_line(id).unwrap().unwrap().vertices[1].id;

    session.points().move_point(vertex, c(4.0, 3.0)).unwrap();

    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.length(), 5.0);
    let near = session
        .query()
        .lines_near(4.0, 3.0, 0.5)
        .unwrap()
        .map(|hit| hit.unwrap().line.id)
        .collect::<Vec<_>>();
    assert_eq!(near, vec![id]);
}

#[test]
fn deleting_a_line_removes_its_vertices() {
    let session = setup();
    let id = square(&session, true);
    let vertex_ids: Vec<_> = session
        .lines()
        .get_line(id)
        .unwrap()
        .unwrap()
        .vertices
        .iter()
        .map(|vertex| vertex.id)
        .collect();

    session.lines().delete_line(id).unwrap();

    assert!(session.lines().get_line(id).unwrap().is_none());
    for vertex in vertex_ids {
        assert!(session.points().get_point(vertex).unwrap().is_none());
        assert_eq!(session.objects().kind_of(vertex).unwrap(), None);
    }
    let err = session.lines().delete_line(id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn nearest_point_projects_onto_segments() {
    let session = setup();
    let id = square(&session, false);
    let line = session.lines().get_line(id).unwrap().unwrap();

    let nearest = line.nearest_point(Position::new(5.0, -2.0)).unwrap();
    assert_eq!(nearest.position, Position::new(5.0, 0.0));
    assert_eq!(nearest.distance, 2.0);
    assert_eq!(nearest.segment_start_rank, 0);
}

#[test]
fn line_horizon_is_carried_by_every_vertex() {
    let session = setup();
    let unit = session.units().create_unit("Top Muschelkalk", None, None).unwrap();
    let other = session.units().create_unit("Base Keuper", None, None).unwrap();
    let id = session
        .lines()
        .create_line_with_horizon(
            &[c(0.0, 0.0), c(1.0, 0.0)],
            false,
            Some(unit),
            GeoMeta::default(),
        )
        .unwrap();
    session.lines().append_vertex(id, c(2.0, 0.0)).unwrap();
    session.lines().insert_vertex(id, 1, c(0.5, 0.0), true).unwrap();

    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.horizon_id, Some(unit));
    assert!(line.vertices.iter().all(|vertex| vertex.horizon_id == Some(unit)));

    session.lines().set_line_horizon(id, Some(other)).unwrap();
    let line = session.lines().get_line(id).unwrap().unwrap();
    assert_eq!(line.horizon_id, Some(other));
    assert!(line.vertices.iter().all(|vertex| vertex.horizon_id == Some(other)));

    let err = session
        .points()
        .set_point_horizon(line.vertices[0].id, Some(unit))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidGeometry {
            reason: GeometryError::OwnedVertex { .. },
            ..
        }
    ));

    let missing = session
        .lines()
        .set_line_horizon(id, Some(uuid::Uuid::new_v4()))
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

#[test]
fn point_horizon_is_set_and_cleared() {
    let session = setup();
    let unit = session.units().create_unit("Coal Seam", None, None).unwrap();
    let id = session
        .points()
        .create_point(c(5.0, 5.0), GeoMeta::default())
        .unwrap();
    assert_eq!(session.points().get_point(id).unwrap().unwrap().horizon_id, None);

    session.points().set_point_horizon(id, Some(unit)).unwrap();
    assert_eq!(
        session.points().get_point(id).unwrap().unwrap().horizon_id,
        Some(unit)
    );

    session.points().set_point_horizon(id, None).unwrap();
    assert_eq!(session.points().get_point(id).unwrap().unwrap().horizon_id, None);

    let unknown = session
        .points()
        .create_point_with_horizon(c(0.0, 0.0), Some(uuid::Uuid::new_v4()), GeoMeta::default())
        .unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::NotFound);
}

#[test]
fn point_properties_keep_their_type() {
    let session = setup();
    let points = session.points();
    let id = points.create_point(c(1.0, 1.0), GeoMeta::default()).unwrap();

    points
        .set_point_property(id, "count", PropertyValue::Int(3), "")
        .unwrap();
    points
        .set_point_property(id, "porosity", PropertyValue::Float(0.25), "")
        .unwrap();
    points
        .set_point_property(id, "label", PropertyValue::String("0042".to_string()), "")
        .unwrap();

    assert_eq!(
        points.point_property(id, "label").unwrap().unwrap().value,
        PropertyValue::String("0042".to_string())
    );
    assert_eq!(
        points.point_property(id, "count").unwrap().unwrap().value,
        PropertyValue::Int(3)
    );
    assert!(points.has_point_property(id, "porosity").unwrap());
    assert!(!points.has_point_property(id, "permeability").unwrap());

    points
        .set_point_property(id, "porosity", PropertyValue::Float(0.3), "fraction")
        .unwrap();
    let point = points.get_point(id).unwrap().unwrap();
    let names: Vec<_> = point.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["count", "label", "porosity"]);
    assert_eq!(point.property("porosity").unwrap().unit, "fraction");

    assert!(points.remove_point_property(id, "count").unwrap());
    assert!(!points.remove_point_property(id, "count").unwrap());

    let blank = points
        .set_point_property(id, "  ", PropertyValue::Int(1), "")
        .unwrap_err();
    assert!(matches!(blank, RepoError::InvalidName { .. }));
    let nan = points
        .set_point_property(id, "porosity", PropertyValue::Float(f64::NAN), "")
        .unwrap_err();
    assert!(matches!(nan, RepoError::InvalidNumber { .. }));
}

#[test]
fn thickness_samples_are_stored_as_points() {
    let session = setup();
    let top = session.units().create_unit("Top", None, None).unwrap();
    let base = session.units().create_unit("Base", None, None).unwrap();
    let well = session
        .wells()
        .create_well(Position::new(7.0, 8.0), 100.0, GeoMeta::default())
        .unwrap();
    session.wells().add_marker(well, 10.0, Some(top)).unwrap();
    session.wells().add_marker(well, 35.0, Some(base)).unwrap();

    let samples: Vec<ThicknessSample> = session
        .query()
        .unit_thickness(top, base, None)
        .unwrap()
        .map(|sample| sample.unwrap())
        .collect();
    let ids = session.points().create_thickness_points(&samples).unwrap();
    assert_eq!(ids.len(), 1);

    let point = session.points().get_point(ids[0]).unwrap().unwrap();
    assert_eq!(point.coordinate, Coordinate::new(7.0, 8.0, 90.0));
    assert_eq!(
        point.property("thickness").map(|p| p.value.clone()),
        Some(PropertyValue::Float(25.0))
    );
    assert_eq!(
        point.property("summarised").map(|p| p.value.clone()),
        Some(PropertyValue::Int(0))
    );
    assert!(!point.has_property("faulted"));
}
