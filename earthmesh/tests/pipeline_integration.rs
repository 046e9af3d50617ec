//! End-to-end runs against an in-memory tile service.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use glam::DVec3;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{json, Value};
use tempfile::TempDir;

use earthmesh::align::FrameAligner;
use earthmesh::config::RunConfig;
use earthmesh::geo::ecef_from_degrees;
use earthmesh::glb::GlbDocument;
use earthmesh::provider::{BoxFuture, HttpClient, HttpResponse};
use earthmesh::report::{ReportWriter, RunReport, SharedBuffer};
use earthmesh::tileset::query_value;
use earthmesh::{EarthMesh, Error};

const ROOT_URL: &str = "https://tile.example/v1/3dtiles/root.json";
const LAT: f64 = 48.8584;
const LNG: f64 = 2.2945;

/// Tile service double: routes by path, records every request.
#[derive(Default)]
struct FakeTileService {
    routes: Mutex<HashMap<String, Option<HttpResponse>>>,
    requests: Mutex<Vec<Url>>,
}

impl FakeTileService {
    fn json(&self, path: &str, body: Value) {
        self.routes.lock().insert(
            path.to_string(),
            Some(HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: Bytes::from(serde_json::to_vec(&body).unwrap()),
            }),
        );
    }

    fn glb(&self, path: &str, translation: DVec3) {
        self.routes.lock().insert(
            path.to_string(),
            Some(HttpResponse {
                status: 200,
                content_type: Some("model/gltf-binary".to_string()),
                body: Bytes::from(tile_bytes(translation)),
            }),
        );
    }

    fn status(&self, path: &str, status: u16) {
        self.routes.lock().insert(
            path.to_string(),
            Some(HttpResponse {
                status,
                content_type: None,
                body: Bytes::new(),
            }),
        );
    }

    fn unreachable(&self, path: &str) {
        self.routes.lock().insert(path.to_string(), None);
    }

    fn requests_ending_with(&self, suffix: &str) -> Vec<Url> {
        self.requests
            .lock()
            .iter()
            .filter(|u| u.path().ends_with(suffix))
            .cloned()
            .collect()
    }
}

impl HttpClient for FakeTileService {
    fn get<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, earthmesh::Result<HttpResponse>> {
        self.requests.lock().push(url.clone());
        let route = self.routes.lock().get(url.path()).cloned();
        Box::pin(async move {
            match route {
                Some(Some(response)) => Ok(response),
                Some(None) => Err(Error::transport(url.path(), "connection reset")),
                None => Ok(HttpResponse {
                    status: 404,
                    content_type: None,
                    body: Bytes::new(),
                }),
            }
        })
    }
}

/// A one-triangle tile whose node sits at `translation`.
fn tile_bytes(translation: DVec3) -> Vec<u8> {
    let vertices: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
    let bin: Vec<u8> = vertices
        .iter()
        .flatten()
        .flat_map(|c| c.to_le_bytes())
        .collect();

    let json = json!({
        "asset": { "version": "2.0", "copyright": "Data Example Co" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": bin.len() }],
        "accessors": [{
            "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
            "min": [0.0, 0.0, 0.0], "max": [2.0, 2.0, 0.0]
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "nodes": [{ "mesh": 0, "translation": translation.to_array() }],
        "scenes": [{ "nodes": [0] }]
    });

    GlbDocument::from_parts(json, bin).to_bytes().unwrap()
}

/// An oriented box of half-size `half` around `center`.
fn bounding_box(center: DVec3, half: f64) -> Value {
    json!({ "box": [
        center.x, center.y, center.z,
        half, 0.0, 0.0,
        0.0, half, 0.0,
        0.0, 0.0, half
    ] })
}

fn region_center() -> DVec3 {
    ecef_from_degrees(LNG, LAT, 0.0)
}

fn config(dir: &TempDir, radius: f64) -> RunConfig {
    RunConfig::new("TEST_KEY", LAT, LNG, radius, dir.path()).with_root_url(ROOT_URL)
}

async fn run(
    service: &Arc<FakeTileService>,
    config: &RunConfig,
) -> (earthmesh::Result<earthmesh::RunSummary>, SharedBuffer) {
    let (report, buffer) = ReportWriter::buffer();
    let app = EarthMesh::new(service.clone(), report);
    (app.run(config).await, buffer)
}

/// Root with one child box around the region center holding the given leaves.
fn serve_root(service: &FakeTileService, leaves: &[&str]) {
    let children: Vec<Value> = leaves
        .iter()
        .map(|uri| json!({ "content": { "uri": uri } }))
        .collect();
    service.json(
        "/v1/3dtiles/root.json",
        json!({ "root": {
            "boundingVolume": bounding_box(region_center(), 500.0),
            "children": [ {
                "boundingVolume": bounding_box(region_center(), 200.0),
                "content": { "uri": "coarse.glb" },
                "children": children
            } ]
        } }),
    );
}

#[tokio::test]
async fn radius_zero_miss_downloads_nothing() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    let far = region_center() + DVec3::new(10_000.0, 0.0, 0.0);
    service.json(
        "/v1/3dtiles/root.json",
        json!({ "root": {
            "boundingVolume": bounding_box(far, 100.0),
            "children": [ { "content": { "uri": "a.glb" } } ]
        } }),
    );

    let (result, buffer) = run(&service, &config(&dir, 0.0)).await;
    let summary = result.unwrap();

    assert!(summary.files.is_empty());
    assert_eq!(buffer.contents(), "DOWNLOADED_TILES: []\n");
    assert!(service.requests_ending_with(".glb").is_empty());
}

#[tokio::test]
async fn single_leaf_becomes_origin() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    let position = region_center() + DVec3::new(12.5, -3.0, 40.0);
    serve_root(&service, &["tiles/a.glb"]);
    service.glb("/v1/3dtiles/tiles/a.glb", position);

    let (result, buffer) = run(&service, &config(&dir, 100.0)).await;
    let summary = result.unwrap();
    let output = buffer.contents();
    let report = RunReport::parse(&output);

    assert_eq!(summary.files.len(), 1);
    let file = &summary.files[0];
    assert_eq!(summary.origin, Some(position));
    assert_eq!(report.origin, Some(position));
    assert_eq!(report.translations[file], DVec3::ZERO);
    assert_eq!(report.copyrights[file], "Data Example Co");
    assert_eq!(report.downloaded, summary.files);
    assert!(dir.path().join(file).is_file());

    // Parent content is shadowed by its children
    assert!(service.requests_ending_with("coarse.glb").is_empty());

    let lines: Vec<&str> = output.lines().collect();
    assert!(lines[0].starts_with("ORIGIN_TRANSLATION ["));
    assert!(lines[1].starts_with("ASSET_COPYRIGHT "));
    assert_eq!(lines[2], format!("TILE_TRANSLATION {} [0,0,0]", file));
    assert_eq!(lines[3], format!(r#"DOWNLOADED_TILES: ["{}"]"#, file));
}

#[tokio::test]
async fn explicit_origin_translations_are_relative() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    let p1 = region_center() + DVec3::new(50.0, 0.0, 0.0);
    let p2 = region_center() + DVec3::new(0.0, -75.0, 20.0);
    serve_root(&service, &["one.glb", "two.glb"]);
    service.glb("/v1/3dtiles/one.glb", p1);
    service.glb("/v1/3dtiles/two.glb", p2);

    let origin = region_center() + DVec3::new(1.0, 2.0, 3.0);
    let config = config(&dir, 100.0).with_origin(Some(origin));
    let (result, buffer) = run(&service, &config).await;
    let summary = result.unwrap();
    let report = RunReport::parse(&buffer.contents());

    assert_eq!(summary.files.len(), 2);
    assert_eq!(report.origin, Some(origin));
    assert_eq!(report.translations.len(), 2);

    let expected: Vec<DVec3> = [p1, p2]
        .iter()
        .map(|p| FrameAligner::align(*p, origin).translation())
        .collect();
    for reported in report.translations.values() {
        assert!(
            expected.iter().any(|e| e.abs_diff_eq(*reported, 1e-6)),
            "unexpected translation {:?}",
            reported
        );
    }
}

#[tokio::test]
async fn second_run_fetches_no_tiles() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    serve_root(&service, &["a.glb?v=1", "b.glb"]);
    service.glb("/v1/3dtiles/a.glb", region_center() + DVec3::new(5.0, 5.0, 5.0));
    service.glb("/v1/3dtiles/b.glb", region_center() + DVec3::new(-5.0, 5.0, 0.0));

    let config = config(&dir, 100.0);
    let (first, first_output) = run(&service, &config).await;
    let first = first.unwrap();
    let glb_requests = service.requests_ending_with(".glb").len();
    assert_eq!(glb_requests, 2);

    let (second, second_output) = run(&service, &config).await;
    let second = second.unwrap();

    assert_eq!(service.requests_ending_with(".glb").len(), glb_requests);
    assert_eq!(second.pipeline.fetched, 0);
    assert_eq!(second.pipeline.reused, 2);

    let mut a = first.files.clone();
    let mut b = second.files.clone();
    a.sort();
    b.sort();
    assert_eq!(a, b);

    let r1 = RunReport::parse(&first_output.contents());
    let r2 = RunReport::parse(&second_output.contents());
    for (file, t) in &r1.translations {
        assert!(r2.translations[file].abs_diff_eq(*t, 1e-9));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn session_is_inherited_by_nested_fetches() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    serve_root(&service, &["/v1/3dtiles/datasets/x/files/sub.json?session=SESSION_1"]);
    service.json(
        "/v1/3dtiles/datasets/x/files/sub.json",
        json!({ "root": { "children": [ { "content": { "uri": "leaf.glb" } } ] } }),
    );
    service.glb(
        "/v1/3dtiles/datasets/x/files/leaf.glb",
        region_center() + DVec3::new(1.0, 1.0, 1.0),
    );

    let (result, _) = run(&service, &config(&dir, 100.0)).await;
    assert_eq!(result.unwrap().files.len(), 1);

    let leaf_request = &service.requests_ending_with("leaf.glb")[0];
    assert_eq!(query_value(leaf_request, "session").as_deref(), Some("SESSION_1"));
    assert_eq!(query_value(leaf_request, "key").as_deref(), Some("TEST_KEY"));
}

#[tokio::test]
async fn tile_failures_do_not_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    serve_root(&service, &["ok.glb", "gone.glb", "reset.glb", "broken.json"]);
    service.glb("/v1/3dtiles/ok.glb", region_center());
    service.status("/v1/3dtiles/gone.glb", 500);
    service.unreachable("/v1/3dtiles/reset.glb");
    service.status("/v1/3dtiles/broken.json", 403);

    let (result, buffer) = run(&service, &config(&dir, 100.0)).await;
    let summary = result.unwrap();

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.pipeline.failed, 2);
    assert_eq!(summary.traversal.nested_failed, 1);
    assert_eq!(RunReport::parse(&buffer.contents()).downloaded, summary.files);
}

#[tokio::test]
async fn root_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());
    service.unreachable("/v1/3dtiles/root.json");

    let (result, buffer) = run(&service, &config(&dir, 100.0)).await;
    assert!(matches!(result, Err(Error::Transport { .. })));
    assert!(!buffer.contents().contains("DOWNLOADED_TILES"));
}

#[tokio::test]
async fn invalid_config_fails_before_any_request() {
    let dir = TempDir::new().unwrap();
    let service = Arc::new(FakeTileService::default());

    let (result, _) = run(&service, &config(&dir, 100.0).with_parallel(0)).await;
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(service.requests.lock().is_empty());
}
