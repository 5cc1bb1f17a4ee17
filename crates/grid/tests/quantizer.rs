use rand::Rng;
use turf_grid::{
    cell_bounds, cell_id, haversine_distance_m, lon_span_deg, CellId, GridError, LAT_SPAN_DEG,
};

const NUMBER_OF_ITERATIONS: usize = 500;

#[test]
fn test_cell_id_is_deterministic() {
    let id1 = cell_id(12.9716, 77.5946).unwrap();
    let id2 = cell_id(12.9716, 77.5946).unwrap();
    assert_eq!(id1, id2);

    // Round-trips through its string form
    let parsed: CellId = id1.to_string().parse().unwrap();
    assert_eq!(parsed, id1);
}

#[test]
fn test_points_in_same_cell_share_an_id() {
    let lat = 12.9716;
    let lon = 77.5946;
    let id = cell_id(lat, lon).unwrap();
    let bounds = cell_bounds(lat, lon).unwrap();

    // Nudge east/west inside the snapped cell at the same latitude
    let quarter = (bounds.east - bounds.west) / 4.0;
    assert_eq!(cell_id(lat, bounds.west + quarter).unwrap(), id);
    assert_eq!(cell_id(lat, bounds.east - quarter).unwrap(), id);
}

#[test]
fn test_out_of_range_coordinates_rejected() {
    let invalid_cases = vec![
        (90.1, 0.0),
        (-90.1, 0.0),
        (0.0, 180.1),
        (0.0, -180.1),
        (f64::NAN, 0.0),
        (0.0, f64::NAN),
    ];
    for (lat, lon) in invalid_cases {
        assert!(
            matches!(
                cell_id(lat, lon),
                Err(GridError::InvalidCoordinate { .. })
            ),
            "should reject lat={lat}, lon={lon}"
        );
        assert!(cell_bounds(lat, lon).is_err());
    }
}

#[test]
fn test_boundary_coordinates_accepted() {
    for (lat, lon) in [(90.0, 180.0), (-90.0, -180.0), (0.0, 0.0)] {
        cell_id(lat, lon).unwrap();
        cell_bounds(lat, lon).unwrap();
    }
}

#[test]
fn test_bounds_contain_query_point() {
    let mut rng = rand::thread_rng();
    for iteration in 0..NUMBER_OF_ITERATIONS {
        // Stay below the pole clamp so north/east edges behave normally
        let lat = rng.gen_range(-85.0..85.0);
        let lon = rng.gen_range(-179.0..179.0);

        let bounds = cell_bounds(lat, lon).unwrap();
        assert!(
            bounds.contains(lat, lon),
            "bounds should contain query point for iteration {} (lat={}, lon={})",
            iteration + 1,
            lat,
            lon
        );

        let (clat, clon) = bounds.centroid();
        assert!(bounds.contains(clat, clon));

        // Mid-cell longitude at the same latitude maps to the same cell
        assert_eq!(cell_id(lat, clon).unwrap(), cell_id(lat, lon).unwrap());
    }
}

#[test]
fn test_cells_widen_toward_poles() {
    assert!(lon_span_deg(60.0) > lon_span_deg(0.0));
    assert!(lon_span_deg(80.0) > lon_span_deg(60.0));

    // Near the pole the clamp keeps spans finite
    let polar = lon_span_deg(89.99);
    assert!(polar.is_finite());
    assert!(polar <= LAT_SPAN_DEG / 0.01 + 1e-9);
}

#[test]
fn test_cell_is_roughly_fifty_meters() {
    // One latitudinal span along a meridian
    let d = haversine_distance_m((12.0, 77.0), (12.0 + LAT_SPAN_DEG, 77.0));
    assert!((45.0..55.0).contains(&d), "got {d} m");

    // One longitudinal span at 60N, where degrees of longitude are half-width
    let span = lon_span_deg(60.0);
    let d = haversine_distance_m((60.0, 10.0), (60.0, 10.0 + span));
    assert!((40.0..60.0).contains(&d), "got {d} m");
}

#[test]
fn test_haversine_zero_and_symmetry() {
    let a = (12.9716, 77.5946);
    let b = (12.9720, 77.5950);
    assert_eq!(haversine_distance_m(a, a), 0.0);
    let ab = haversine_distance_m(a, b);
    let ba = haversine_distance_m(b, a);
    assert!((ab - ba).abs() < 1e-9);
    assert!(ab > 0.0);
}

#[test]
fn test_malformed_cell_ids_rejected() {
    for bad in ["", "12", "a_b", "1_2_3", "1_"] {
        assert!(
            bad.parse::<CellId>().is_err(),
            "should fail to parse: {bad}"
        );
    }
}
