//! YAML config → engine → searches, against files on disk.

use std::path::Path;

use chrono::{TimeZone, Utc};
use index::ann::AnnConfig;
use index::{CompressionConfig, IndexSnapshot};
use poselens::{
    Engine, EngineConfig, ModeUsed, PoseRecord, PoseStatus, Quality, SearchMode, SearchRequest,
};
use semantic::StubEmbedder;

const DIM: usize = 24;
const POSES: i64 = 120;

fn pose(id: i64) -> PoseRecord {
    let scenes = ["咖啡厅", "海边", "室内"];
    let scene = scenes[id as usize % scenes.len()];
    PoseRecord {
        id,
        title: format!("{scene}人像{id}"),
        description: None,
        oss_url: format!("oss://poses/{id}.jpg"),
        thumbnail_url: None,
        scene_category: Some(scene.into()),
        angle: None,
        props: Vec::new(),
        shooting_tips: None,
        tags: vec![scene.into()],
        view_count: 0,
        search_count: 0,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        // Every tenth pose was taken down after the index was built.
        status: if id % 10 == 9 {
            PoseStatus::Hidden
        } else {
            PoseStatus::Active
        },
    }
}

fn engine_in(dir: &Path) -> Engine {
    let poses: Vec<PoseRecord> = (0..POSES).map(pose).collect();
    std::fs::write(dir.join("poses.json"), serde_json::to_vec(&poses).unwrap()).unwrap();

    let stub = StubEmbedder::new(DIM);
    let rows = (0..POSES).map(|id| (id, stub.vector_for(&format!("pose-{id}"))));
    IndexSnapshot::build(DIM, rows, AnnConfig::default())
        .unwrap()
        .write_to(&dir.join("poses.idx"), &CompressionConfig::default())
        .unwrap();

    let yaml = format!(
        r#"
version: "1.0"
name: "pipeline test"
index:
  path: "{index}"
catalog:
  path: "{catalog}"
embedder:
  mode: "stub"
  model_name: "stub"
  dimension: {DIM}
coordinator:
  vector_timeout_ms: 2000
"#,
        index = dir.join("poses.idx").display(),
        catalog = dir.join("poses.json").display(),
    );
    let config_path = dir.join("engine.yaml");
    std::fs::write(&config_path, yaml).unwrap();
    Engine::from_config_file(&config_path).unwrap()
}

#[tokio::test]
async fn pages_partition_the_dynamic_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    assert!(engine.is_ready());
    let coordinator = engine.coordinator();

    let full = coordinator
        .search(&SearchRequest::new("人像", 20).with_min_similarity(-1.0))
        .await
        .unwrap();
    assert_eq!(full.mode_used, ModeUsed::Vector);
    assert_eq!(full.results.len(), 20);

    let mut paged = Vec::new();
    for page in 1..=2 {
        let outcome = coordinator
            .search(&SearchRequest::paginated("人像", page, 10).with_min_similarity(-1.0))
            .await
            .unwrap();
        assert_eq!(outcome.mode_used, ModeUsed::Vector);
        assert_eq!(outcome.results.len(), 10);
        paged.extend(outcome.pose_ids());
    }

    assert_eq!(paged, full.pose_ids());
}

#[tokio::test]
async fn hidden_poses_never_surface() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());

    let outcome = engine
        .coordinator()
        .search(
            &SearchRequest::new("海边", 60)
                .with_mode(SearchMode::MultiTier)
                .with_min_similarity(-1.0),
        )
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 60);
    assert!(outcome.pose_ids().iter().all(|id| id % 10 != 9));
    let ranks: Vec<usize> = outcome.results.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, (1..=60).collect::<Vec<_>>());
}

#[tokio::test]
async fn lexical_search_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    let coordinator = engine.coordinator();

    let first = coordinator
        .search_lexical("咖啡厅拍照", None, 15)
        .await
        .unwrap();
    let second = coordinator
        .search_lexical("咖啡厅拍照", None, 15)
        .await
        .unwrap();

    assert!(!first.results.is_empty());
    assert_eq!(first.pose_ids(), second.pose_ids());
    assert_eq!(first.mode_used, ModeUsed::Lexical);
    assert_ne!(first.quality, Quality::Degraded);
}

#[tokio::test]
async fn reload_swaps_in_a_rebuilt_index() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_in(dir.path());
    let before = engine.index().snapshot().unwrap().generation();

    let stub = StubEmbedder::new(DIM);
    let rows = (0..30).map(|id| (id, stub.vector_for(&format!("rebuilt-{id}"))));
    IndexSnapshot::build(DIM, rows, AnnConfig::default())
        .unwrap()
        .write_to(&dir.path().join("poses.idx"), &CompressionConfig::default())
        .unwrap();

    let generation = engine.reload_index().unwrap();
    assert_eq!(generation, before + 1);
    assert_eq!(engine.index().snapshot().unwrap().len(), 30);
    assert_eq!(engine.coordinator().status().index_size, 30);
}
