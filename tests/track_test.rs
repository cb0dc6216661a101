mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_test::assert_ok;

use common::{stub_flow, StubSpeech, StubText};
use heritage_audio_guide::error::ErrorClass;
use heritage_audio_guide::models::{
    load_track_definition, FileJob, ItemStatus, OptionOverrides, TrackDefaults,
};
use heritage_audio_guide::orchestrator::effective_mode;
use heritage_audio_guide::{run_track, RunMode, Stage, StageSelection, TrackDefinition};

fn make_track(name: &str, files: Vec<FileJob>) -> TrackDefinition {
    TrackDefinition {
        track_name: name.to_string(),
        description: Some("테스트 트랙".to_string()),
        files,
        ..Default::default()
    }
}

/// 生产模式下不等待的轨道默认值
fn fast_defaults() -> TrackDefaults {
    TrackDefaults {
        dry_run: false,
        options: OptionOverrides {
            max_retries: Some(2),
            initial_wait: Some(0.0),
            max_wait: Some(0.0),
            ..Default::default()
        },
    }
}

fn no_cli() -> OptionOverrides {
    OptionOverrides::default()
}

async fn read_report(path: &Path) -> serde_json::Value {
    let content = tokio::fs::read_to_string(path).await.unwrap();
    serde_json::from_str(&content).unwrap()
}

fn sample_track_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tracks/sample_track.toml")
}

#[tokio::test]
async fn test_sample_track_runs_in_mock_mode() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let track = assert_ok!(load_track_definition(&sample_track_path()).await);
    let mode = effective_mode(&track, false);
    assert_eq!(mode, RunMode::Mock);

    let outcome = assert_ok!(
        run_track(&flow, &track, &StageSelection::all(), mode, &no_cli(), root.path()).await
    );

    let track_root = root.path().join("mock/tracks/경주 역사 투어");
    assert_eq!(outcome.track_root, track_root);
    assert_eq!(outcome.report_path, track_root.join("batch_report.json"));
    assert_eq!(outcome.report.successful, 3);
    assert_eq!(outcome.report.failed, 0);
    assert!(track_root.join("audio/02_석굴암.wav").exists());
    assert_eq!(text.calls(), 0);
    assert_eq!(speech.calls(), 0);

    let report = read_report(&outcome.report_path).await;
    assert_eq!(report["mode"], "mock");
    assert_eq!(report["total_files"], 3);
    assert_eq!(report["metadata"]["language"], "ko");
    assert_eq!(report["stages"], serde_json::json!([1, 2, 3]));
}

#[tokio::test]
async fn test_missing_upstream_aborts_track_and_persists_report() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let track = make_track("t", vec![FileJob::new("a", "x"), FileJob::new("b", "y")]);
    let stages = StageSelection::parse("2,3").unwrap();

    let failure = run_track(&flow, &track, &stages, RunMode::Mock, &no_cli(), root.path())
        .await
        .unwrap_err();

    assert_eq!(failure.error.classification(), ErrorClass::MissingUpstream);
    assert_eq!(failure.report.successful, 0);
    assert_eq!(failure.report.failed, 1);
    assert!(failure.report.find("b").is_none());

    let report_path = failure.report_path.expect("报告应已写入");
    assert_eq!(report_path, root.path().join("mock/tracks/t/batch_report.json"));
    let report = read_report(&report_path).await;
    assert_eq!(report["successful"], 0);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["files"][0]["output_name"], "a");
    assert_eq!(report["files"][0]["status"], "failed");
    assert_eq!(report["files"][0]["error_class"], "missing_upstream");
    assert_eq!(report["files"][0]["stage"], "script");
    assert_eq!(report["files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fail_fast_stops_after_first_failed_item() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText {
        fatal_marker: Some("실패하는 유적".to_string()),
        ..Default::default()
    });
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let mut track = make_track(
        "fail fast",
        vec![
            FileJob::new("01", "경복궁"),
            FileJob::new("02", "실패하는 유적"),
            FileJob::new("03", "불국사"),
        ],
    );
    track.defaults = fast_defaults();
    let stages = StageSelection::parse("1,2").unwrap();

    let failure = run_track(&flow, &track, &stages, RunMode::Production, &no_cli(), root.path())
        .await
        .unwrap_err();

    let report = &failure.report;
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total_files, 3);
    assert!(report.successful + report.failed < report.total_files);
    assert!(report.find("03").is_none());
    assert_eq!(report.find("01").unwrap().status, ItemStatus::Success);
    assert_eq!(report.find("02").unwrap().stage, Some(Stage::Info));
    assert_eq!(failure.error.classification(), ErrorClass::Fatal);
    let message = failure.to_string();
    assert!(message.contains("02") && message.contains("실패하는 유적"), "{message}");

    // 条目 1 的两次调用 + 条目 2 的一次调用（致命错误不重试）
    assert_eq!(text.calls(), 3);
    assert!(failure.report_path.is_some());
    assert!(!root.path().join("tracks/fail fast/info/03.md").exists());
}

#[tokio::test]
async fn test_per_file_overrides_and_skip() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let mut skipped = FileJob::new("02", "석굴암");
    skipped.skip = true;
    let mut custom = FileJob::new("03", "첨성대");
    custom.overrides.voice = Some("Kore".to_string());

    let mut track = make_track("overrides", vec![FileJob::new("01", "불국사"), skipped, custom]);
    track.defaults = fast_defaults();

    let outcome = assert_ok!(
        run_track(
            &flow,
            &track,
            &StageSelection::all(),
            RunMode::Production,
            &no_cli(),
            root.path(),
        )
        .await
    );

    assert_eq!(outcome.report.successful, 2);
    assert_eq!(outcome.report.skipped, 1);
    assert_eq!(outcome.report.find("02").unwrap().status, ItemStatus::Skipped);
    assert_eq!(speech.calls(), 2);

    let audio = outcome.track_root.join("audio/03.wav");
    let meta = heritage_audio_guide::services::read_metadata(&audio).await.unwrap();
    assert_eq!(meta.voice.as_deref(), Some("Kore"));
}

#[tokio::test]
async fn test_invalid_track_attempts_nothing() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let mut missing_keyword = FileJob::new("02", "");
    missing_keyword.keyword = None;
    let track = make_track("invalid", vec![FileJob::new("01", "불국사"), missing_keyword]);

    let failure = run_track(
        &flow,
        &track,
        &StageSelection::all(),
        RunMode::Mock,
        &no_cli(),
        root.path(),
    )
    .await
    .unwrap_err();

    assert_eq!(failure.error.classification(), ErrorClass::Configuration);
    assert!(failure.error.to_string().contains("files[1]"));
    assert_eq!(failure.report.attempted, 0);
    assert!(failure.report.files.is_empty());
    assert!(!root.path().join("mock/tracks/invalid/info/01.md").exists());

    // 空报告照样写盘
    let report_path = failure.report_path.expect("报告应已写入");
    assert_eq!(report_path, root.path().join("mock/tracks/invalid/batch_report.json"));
    let report = read_report(&report_path).await;
    assert_eq!(report["total_files"], 2);
    assert_eq!(report["attempted"], 0);
    assert_eq!(report["files"].as_array().unwrap().len(), 0);
    assert!(report["completed_at"].is_string());

    let empty = track_without_files();
    let failure = run_track(
        &flow,
        &empty,
        &StageSelection::all(),
        RunMode::Mock,
        &no_cli(),
        root.path(),
    )
    .await
    .unwrap_err();
    assert_eq!(failure.error.classification(), ErrorClass::Configuration);
    assert!(root.path().join("mock/tracks/empty/batch_report.json").exists());
    assert_eq!(text.calls(), 0);
}

#[tokio::test]
async fn test_unusable_track_name_writes_no_report() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let track = make_track("???", vec![FileJob::new("01", "불국사")]);
    let failure = run_track(
        &flow,
        &track,
        &StageSelection::all(),
        RunMode::Mock,
        &no_cli(),
        root.path(),
    )
    .await
    .unwrap_err();

    assert_eq!(failure.error.classification(), ErrorClass::Configuration);
    assert!(failure.report_path.is_none());
    assert!(!root.path().join("mock/tracks").exists());
}

#[tokio::test]
async fn test_cli_options_fill_keys_the_track_leaves_open() {
    let root = TempDir::new().unwrap();
    let text = Arc::new(StubText::default());
    let speech = Arc::new(StubSpeech::default());
    let flow = stub_flow(&text, &speech, root.path());

    let mut pinned = FileJob::new("02", "석굴암");
    pinned.overrides.voice = Some("Kore".to_string());
    let mut track = make_track("cli", vec![FileJob::new("01", "불국사"), pinned]);
    track.defaults = fast_defaults();

    let cli = OptionOverrides {
        voice: Some("Puck".to_string()),
        // 轨道 defaults 已写明，命令行不生效
        max_retries: Some(9),
        ..Default::default()
    };
    let stages = StageSelection::all();
    let outcome = assert_ok!(
        run_track(&flow, &track, &stages, RunMode::Production, &cli, root.path()).await
    );

    let voice_of = |name: &str| outcome.track_root.join(format!("audio/{name}.wav"));
    let first = heritage_audio_guide::services::read_metadata(&voice_of("01")).await.unwrap();
    let second = heritage_audio_guide::services::read_metadata(&voice_of("02")).await.unwrap();
    assert_eq!(first.voice.as_deref(), Some("Puck"));
    assert_eq!(second.voice.as_deref(), Some("Kore"));

    let jobs = track.resolve_jobs_with(&cli).unwrap();
    assert_eq!(jobs[0].options.max_retries, 2);
}

fn track_without_files() -> TrackDefinition {
    make_track("empty", Vec::new())
}
