use foundation::math::{TileCoord, Vec3};
use layers::{GEO_TILE_LAYER_KEY, Viewpoint};
use pretty_assertions::assert_eq;
use runtime::Frame;
use scene::{Color, ContentNode, Geometry, MaterialBinding, SceneGraph};
use serde_json::json;
use streaming::{FetchError, JobStatus, ScriptedFetcher, TileStatus, TileUrlTemplate};
use viewer::{Viewer, ViewerConfig};

const TILE: TileCoord = TileCoord::new(17, 100, 200);
const TILE_URL: &str = "/cache/ddd_http/17/100/200.json";

fn viewer_with(config: ViewerConfig) -> Viewer<ScriptedFetcher> {
    Viewer::new(config, ScriptedFetcher::new()).unwrap()
}

fn viewer() -> Viewer<ScriptedFetcher> {
    viewer_with(ViewerConfig::default())
}

fn triangle() -> Geometry {
    Geometry::new(
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        vec![0, 1, 2],
    )
}

fn tile_referencing(key: &str) -> Vec<u8> {
    let root = ContentNode::new("root").with_child(
        ContentNode::new("tree_1")
            .with_metadata("ddd:instance:key", key)
            .with_geometry(triangle()),
    );
    formats::encode_tile_content(&root).unwrap()
}

fn catalog_with(key: &str) -> Vec<u8> {
    let root = ContentNode::new("catalog").with_child(
        ContentNode::new("tree")
            .with_metadata("ddd:instance:key", key)
            .with_geometry(triangle()),
    );
    formats::encode_tile_content(&root).unwrap()
}

fn status(v: &Viewer<ScriptedFetcher>, coord: TileCoord) -> Option<TileStatus> {
    v.layer(GEO_TILE_LAYER_KEY).and_then(|l| l.status(coord))
}

fn marker_color(v: &Viewer<ScriptedFetcher>, coord: TileCoord) -> Option<Color> {
    let record = v.layer(GEO_TILE_LAYER_KEY)?.record(coord)?;
    let node = v.scene().node(record.node)?;
    node.material
        .as_ref()
        .and_then(MaterialBinding::inline)
        .map(|m| m.albedo)
}

#[test]
fn unrequested_tiles_have_no_record() {
    let v = viewer();
    assert_eq!(status(&v, TILE), None);
    assert_eq!(v.stats().tiles_loading, 0);
}

#[test]
fn missing_catalog_key_resolves_after_catalog_load() {
    let mut v = viewer();
    v.fetcher_mut().respond(TILE_URL, Ok(tile_referencing("K")));
    v.fetcher_mut()
        .respond("/assets/catalog.json", Ok(catalog_with("K")));

    assert!(v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
    v.poll_loads();
    assert_eq!(status(&v, TILE), Some(TileStatus::Loaded));
    let pivot = v.layer(GEO_TILE_LAYER_KEY).unwrap().record(TILE).unwrap().node;
    assert!(v.processor().depends().is_pending(pivot));
    assert_eq!(v.processor().instances().len(), 0);

    v.load_catalog("/assets/catalog.json", false);
    v.poll_loads();

    assert!(!v.processor().depends().is_pending(pivot));
    assert_eq!(v.processor().depends().retries(pivot), 1);
    assert_eq!(v.processor().instances().len(), 1);
    assert_eq!(v.processor().instances().total_placements(), 1);
    assert_eq!(v.metrics().counter("depends.reprocessed"), 1);
}

fn ground_binding(v: &Viewer<ScriptedFetcher>, name: &str) -> Option<MaterialBinding> {
    let id = v.scene().find_by_name(name)?;
    v.scene().node(id)?.material.clone()
}

#[test]
fn dependency_pass_keeps_ground_overlay() {
    let mut v = viewer();
    v.set_ground_texture(Some(TileUrlTemplate::new("https://osm/{z}/{x}/{y}.png")));
    let root = ContentNode::new("root")
        .with_child(
            ContentNode::new("park")
                .with_metadata("ddd:path", "/Root/Areas_0/Park")
                .with_metadata("ddd:material", "Grass")
                .with_geometry(triangle()),
        )
        .with_child(
            ContentNode::new("tree_1")
                .with_metadata("ddd:instance:key", "K")
                .with_geometry(triangle()),
        );
    v.fetcher_mut()
        .respond(TILE_URL, Ok(formats::encode_tile_content(&root).unwrap()));
    v.fetcher_mut()
        .respond("/assets/catalog.json", Ok(catalog_with("K")));

    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();
    let ground_name = |b: Option<MaterialBinding>| b.and_then(|b| b.inline().map(|m| m.name.clone()));
    assert_eq!(
        ground_name(ground_binding(&v, "park")).as_deref(),
        Some("materialGround_17_100_200")
    );

    v.load_catalog("/assets/catalog.json", false);
    v.poll_loads();

    assert_eq!(v.processor().instances().len(), 1);
    assert_eq!(
        ground_name(ground_binding(&v, "park")).as_deref(),
        Some("materialGround_17_100_200")
    );
    assert!(v.processor().catalog().lookup_material("Grass").is_none());
}

#[test]
fn not_yet_available_records_job_status() {
    let mut v = viewer();
    let job = JobStatus(json!({"progress": 10}));
    v.fetcher_mut()
        .respond(TILE_URL, Err(FetchError::NotYetAvailable(Some(job.clone()))));
    v.fetcher_mut().hold(true);

    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    assert_eq!(v.poll_loads(), 0);
    assert_eq!(marker_color(&v, TILE), Some(Color::LOADING));

    v.fetcher_mut().hold(false);
    assert_eq!(v.poll_loads(), 1);
    assert_eq!(status(&v, TILE), Some(TileStatus::NotFound));
    assert_eq!(v.job_statuses(), &[job.clone()]);
    assert_eq!(marker_color(&v, TILE), Some(Color::PENDING));
    assert_eq!(v.metrics().counter("tiles.notfound"), 1);

    assert_eq!(v.take_job_statuses(), vec![job]);
    assert!(v.job_statuses().is_empty());
}

#[test]
fn other_failures_flag_tile_as_error() {
    let mut v = viewer();
    v.fetcher_mut()
        .respond(TILE_URL, Err(FetchError::Http { status: 500 }));
    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();

    assert_eq!(status(&v, TILE), Some(TileStatus::Error));
    assert_eq!(marker_color(&v, TILE), Some(Color::ERROR));
    assert!(v.job_statuses().is_empty());
    // No retry while the record exists.
    assert!(!v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
}

#[test]
fn queue_dispatches_newest_first_within_limit() {
    let mut v = viewer_with(ViewerConfig {
        concurrent_tasks: 1,
        ..ViewerConfig::default()
    });
    let a = TileCoord::new(17, 1, 1);
    let b = TileCoord::new(17, 2, 2);
    let c = TileCoord::new(17, 3, 3);
    for coord in [a, b, c] {
        v.request_tile(GEO_TILE_LAYER_KEY, coord).unwrap();
    }

    let mut started = Vec::new();
    for _ in 0..3 {
        v.poll_loads();
        assert!(v.queue().in_flight() <= 1);
        started = v.fetcher().started().iter().map(|s| s.to_string()).collect();
    }
    assert_eq!(
        started,
        vec![
            "/cache/ddd_http/17/3/3.json",
            "/cache/ddd_http/17/2/2.json",
            "/cache/ddd_http/17/1/1.json",
        ]
    );
}

#[test]
fn repeated_requests_fetch_once() {
    let mut v = viewer();
    v.fetcher_mut().respond(TILE_URL, Ok(tile_referencing("K")));
    assert!(v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
    assert!(!v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
    v.poll_loads();
    assert!(!v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
    v.poll_loads();
    assert_eq!(v.fetcher().fetch_count(TILE_URL), 1);
}

#[test]
fn disabled_tile_is_reshown_without_refetch() {
    let mut v = viewer();
    v.fetcher_mut().respond(TILE_URL, Ok(tile_referencing("K")));
    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();
    let pivot = v.layer(GEO_TILE_LAYER_KEY).unwrap().record(TILE).unwrap().node;

    v.disable_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    assert!(!v.scene().is_enabled(pivot));
    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();
    assert!(v.scene().is_enabled(pivot));
    assert_eq!(v.fetcher().fetch_count(TILE_URL), 1);
    assert_eq!(status(&v, TILE), Some(TileStatus::Loaded));
}

#[test]
fn completion_for_disposed_tile_is_discarded() {
    let mut v = viewer();
    v.fetcher_mut().respond(TILE_URL, Ok(tile_referencing("K")));
    v.fetcher_mut().hold(true);
    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();

    assert!(v.dispose_tile(GEO_TILE_LAYER_KEY, TILE).unwrap());
    v.fetcher_mut().hold(false);
    assert_eq!(v.poll_loads(), 1);
    assert_eq!(status(&v, TILE), None);
    assert!(v.scene().is_empty());
}

#[test]
fn update_schedules_tiles_around_viewpoint() {
    let mut v = viewer();
    let view = Viewpoint::new(Vec3::new(0.0, 120.0, 0.0), Vec3::new(0.0, -0.5, 1.0), 0.8);
    let report = v.update(&Frame::first(), &view, Some(120.0));
    assert_eq!(report.zoom, 17);
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.dispatched, 2);

    let layer = v.layer(GEO_TILE_LAYER_KEY).unwrap();
    let origin = v.config().origin;
    let current = layer
        .grid()
        .coordinate_for_point(foundation::math::Vec2::new(origin[0], origin[1]), 17);
    assert!(layer.record(current).is_some());

    // The scheduler waits for its cadence before running again.
    let again = v.update(&Frame::first().advance(0.016), &view, Some(120.0));
    assert_eq!(again.scheduled, 0);
}

#[test]
fn near_ground_uses_higher_zoom() {
    let mut v = viewer();
    let view = Viewpoint::new(Vec3::new(0.0, 20.0, 0.0), Vec3::new(0.0, 0.0, 1.0), 0.8);
    let report = v.update(&Frame::first(), &view, Some(20.0));
    assert_eq!(report.zoom, 18);
    assert!(v
        .layer(GEO_TILE_LAYER_KEY)
        .unwrap()
        .records()
        .all(|r| r.coord.z == 18));
}

#[test]
fn hidden_layer_keeps_content_out_of_view() {
    let mut v = viewer();
    v.fetcher_mut().respond(TILE_URL, Ok(tile_referencing("K")));
    v.request_tile(GEO_TILE_LAYER_KEY, TILE).unwrap();
    v.poll_loads();
    let pivot = v.layer(GEO_TILE_LAYER_KEY).unwrap().record(TILE).unwrap().node;

    v.set_layer_visible(GEO_TILE_LAYER_KEY, false).unwrap();
    assert!(!v.scene().is_enabled(pivot));
    v.set_layer_visible(GEO_TILE_LAYER_KEY, true).unwrap();
    assert!(v.scene().is_enabled(pivot));

    v.clear();
    assert_eq!(status(&v, TILE), None);
}
