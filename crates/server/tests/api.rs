//! Drives the router in-process against a real index and catalog on disk.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use index::ann::AnnConfig;
use index::{CompressionConfig, IndexSnapshot};
use poselens::{Engine, EngineConfig, PoseRecord, PoseStatus};
use semantic::{EmbedderConfig, StubEmbedder};
use serde_json::{json, Value};
use server::{build_router, ServerConfig, ServerState};
use tower::ServiceExt;

const DIM: usize = 16;
const POSES: i64 = 40;

fn pose(id: i64) -> PoseRecord {
    let (scene, title) = if id % 2 == 0 {
        ("咖啡厅", format!("咖啡厅窗边坐姿{id}"))
    } else {
        ("海边", format!("海边漫步{id}"))
    };
    PoseRecord {
        id,
        title,
        description: Some("自然光人像".into()),
        oss_url: format!("oss://poses/{id}.jpg"),
        thumbnail_url: None,
        scene_category: Some(scene.into()),
        angle: None,
        props: Vec::new(),
        shooting_tips: None,
        tags: vec![scene.into(), "人像".into()],
        view_count: id as u64,
        search_count: 0,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        status: PoseStatus::Active,
    }
}

fn write_fixtures(dir: &Path) {
    let poses: Vec<PoseRecord> = (0..POSES).map(pose).collect();
    std::fs::write(
        dir.join("poses.json"),
        serde_json::to_vec(&poses).unwrap(),
    )
    .unwrap();

    let stub = StubEmbedder::new(DIM);
    let rows = (0..POSES).map(|id| (id, stub.vector_for(&format!("pose-{id}"))));
    IndexSnapshot::build(DIM, rows, AnnConfig::default())
        .unwrap()
        .write_to(&dir.join("poses.idx"), &CompressionConfig::default())
        .unwrap();
}

fn app(dir: &Path, with_index: bool, admin_enabled: bool) -> Router {
    write_fixtures(dir);
    let mut engine = EngineConfig {
        embedder: EmbedderConfig::stub(DIM),
        ..Default::default()
    };
    engine.catalog.path = Some(dir.join("poses.json"));
    engine.index.path = Some(if with_index {
        dir.join("poses.idx")
    } else {
        dir.join("missing.idx")
    });

    let engine = Engine::builder(engine).build().unwrap();
    let config = ServerConfig {
        admin_enabled,
        metrics_enabled: false,
        ..Default::default()
    };
    build_router(Arc::new(ServerState::with_engine(config, Arc::new(engine))))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn vector_search_returns_ranked_poses() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(
        &app,
        post(
            "/search/vector",
            json!({"query": "咖啡厅 坐姿", "top_k": 5, "min_similarity": -1.0}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_available"], true);
    assert_eq!(body["mode_used"], "VECTOR");
    assert_eq!(body["search_info"]["found_results"], 5);
    let poses = body["poses"].as_array().unwrap();
    assert_eq!(poses.len(), 5);
    let ranks: Vec<u64> = poses.iter().map(|p| p["rank"].as_u64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    let scores: Vec<f64> = poses
        .iter()
        .map(|p| p["similarity"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert!(poses[0]["oss_url"].as_str().unwrap().starts_with("oss://"));
}

#[tokio::test]
async fn missing_index_degrades_instead_of_failing() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), false, false);

    let (status, body) = send(
        &app,
        post("/search/vector", json!({"query": "咖啡厅", "top_k": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_available"], false);
    assert_eq!(body["mode_used"], "LEXICAL");
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert_eq!(body["poses"].as_array().unwrap().len(), 5);
    assert!(body["poses"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["scene_category"] == "咖啡厅"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(&app, post("/search/vector", json!({"query": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");

    let (status, body) = send(
        &app,
        post("/search/vector", json!({"query": "海边", "top_k": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let request = Request::builder()
        .method("POST")
        .uri("/search/vector")
        .header("content-type", "application/json")
        .body(Body::from("{\"query\": "))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn paginated_search_reports_page_bookkeeping() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(
        &app,
        post(
            "/search/vector/paginated",
            json!({"query": "人像", "page": 2, "page_size": 5, "min_similarity": -1.0}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 2);
    assert_eq!(body["page_size"], 5);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["total"], 10);
    assert_eq!(body["poses"][0]["rank"], 6);
}

#[tokio::test]
async fn enhanced_search_runs_multi_tier_and_rejects_unknown_modes() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(
        &app,
        post(
            "/search/vector/enhanced",
            json!({
                "query": "海边",
                "search_mode": "multi_tier",
                "target_count": 8,
                "min_similarity": -1.0,
                "use_enhanced": false
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode_used"], "VECTOR");
    assert_eq!(body["poses"].as_array().unwrap().len(), 8);
    assert!(body["poses"][0]["tier"].is_string());

    let (status, body) = send(
        &app,
        post(
            "/search/vector/enhanced",
            json!({"query": "海边", "search_mode": "fuzzy"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");
}

#[tokio::test]
async fn status_and_readiness_follow_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = app(dir.path(), true, false);

    let (status, body) = send(&loaded, get("/search/vector/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(body["index_size"], POSES);
    assert_eq!(body["dimension"], DIM);
    assert!(body["message"].as_str().unwrap().contains("available"));

    let (status, body) = send(&loaded, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let other = tempfile::tempdir().unwrap();
    let unloaded = app(other.path(), false, false);
    let (status, body) = send(&unloaded, get("/search/vector/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert!(body["message"].as_str().unwrap().contains("index not loaded"));

    let (status, body) = send(&unloaded, get("/ready")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["components"]["index"], "not_loaded");
}

#[tokio::test]
async fn suggestions_include_recent_searches() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, _) = send(
        &app,
        post("/search/vector", json!({"query": "咖啡厅拍照", "top_k": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        get("/search/suggestions?prefix=%E5%92%96%E5%95%A1&limit=5"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let suggestions = body.as_array().unwrap();
    assert!(!suggestions.is_empty());
    assert!(suggestions.len() <= 5);
    assert_eq!(suggestions[0]["text"], "咖啡厅拍照");
    assert_eq!(suggestions[0]["type"], "history");

    let (status, body) = send(&app, get("/search/popular")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["query"], "咖啡厅拍照");
    assert_eq!(body[0]["count"], 1);
}

#[tokio::test]
async fn categories_count_live_poses() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(&app, get("/categories")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_available"], true);
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    let total: u64 = categories
        .iter()
        .map(|c| c["count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, POSES as u64);
}

// 咖啡厅, 海边 and 人像, percent-encoded for the query string.
const CAFE: &str = "%E5%92%96%E5%95%A1%E5%8E%85";
const BEACH: &str = "%E6%B5%B7%E8%BE%B9";
const PORTRAIT: &str = "%E4%BA%BA%E5%83%8F";

#[tokio::test]
async fn keyword_search_pages_through_catalog_matches() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(&app, get(&format!("/search?q={CAFE}&page=2&per_page=5"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_available"], true);
    assert_eq!(body["mode_used"], "LEXICAL");
    assert!(body.get("message").is_none());
    let poses = body["poses"].as_array().unwrap();
    assert_eq!(poses.len(), 5);
    assert_eq!(poses[0]["rank"], 6);
    assert!(poses.iter().all(|p| p["scene_category"] == "咖啡厅"));
    assert_eq!(body["page"], 2);
    assert_eq!(body["page_size"], 5);
    assert_eq!(body["total"], 10);
    assert_eq!(body["has_more"], true);
}

#[tokio::test]
async fn keyword_search_filters_by_category_and_caps_page_size() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), false, false);

    let (status, body) = send(
        &app,
        get(&format!("/search?q={PORTRAIT}&category={BEACH}&per_page=500")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_available"], true);
    assert_eq!(body["page_size"], 100);
    assert_eq!(body["has_more"], false);
    let poses = body["poses"].as_array().unwrap();
    assert_eq!(poses.len(), (POSES / 2) as usize);
    assert!(poses.iter().all(|p| p["scene_category"] == "海边"));
}

#[tokio::test]
async fn keyword_search_rejects_bad_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(&app, get("/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");

    let (status, body) = send(&app, get(&format!("/search?q={CAFE}&page=0"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_QUERY");

    let (status, body) = send(&app, get(&format!("/search?q={CAFE}&page=first"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn ai_search_filters_by_recognised_scene() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, body) = send(
        &app,
        post(
            "/search/ai-database",
            json!({"query": "海边拍照", "max_results": 6}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["search_intent"]["scene_category"], "海边");
    assert!(!body["ai_explanation"].as_str().unwrap().is_empty());
    let poses = body["poses"].as_array().unwrap();
    assert_eq!(poses.len(), 6);
    assert!(poses.iter().all(|p| p["scene_category"] == "海边"));
}

#[tokio::test]
async fn admin_reload_is_mounted_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let closed = app(dir.path(), true, false);
    let (status, body) = send(&closed, post("/admin/index/reload", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let other = tempfile::tempdir().unwrap();
    let open = app(other.path(), true, true);
    let (status, body) = send(&open, post("/admin/index/reload", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reloaded");
    assert_eq!(body["generation"], 2);
    assert_eq!(body["index_size"], POSES);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-42");
}

#[tokio::test]
async fn metrics_route_is_absent_without_a_recorder() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), true, false);

    let (status, _) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
