// tests/pipeline_e2e.rs
//
// Whole-run behavior without any network: state files in a temp dir, the
// previous snapshot as last known good, and the normalizer folded in
// through the real entry point.

use chrono::{TimeZone, Utc};
use grid_monitor::config::{PipelineConfig, PipelineSection};
use grid_monitor::pipeline::{run_once, RunOutcome, RunOverrides};
use grid_monitor::snapshot::{EquityExport, PriceQuote, Snapshot};
use std::path::Path;

fn config_in(dir: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::empty();
    cfg.pipeline = PipelineSection {
        output_path: dir.join("data").join("live.json"),
        state_path: dir.join("state").join("rate_budgets.json"),
        equities_export_path: dir.join("data").join("equities.json"),
        fetch_timeout_secs: 5,
        equities_stale_after_days: 14,
    };
    cfg
}

fn seed_snapshot(cfg: &PipelineConfig) -> Snapshot {
    let mut snap = Snapshot {
        version: 7,
        generated_at: Utc.with_ymd_and_hms(2025, 7, 1, 6, 0, 0).unwrap(),
        ..Snapshot::default()
    };
    snap.sections.prices = vec![PriceQuote {
        name: "Brent Crude".into(),
        symbol: "BZ=F".into(),
        price: 81.2,
        unit: "USD/bbl".into(),
        prefix: "$".into(),
        change_pct: 0.4,
        up: true,
        pinned: false,
    }];
    grid_monitor::writer::write_json_atomic(&cfg.pipeline.output_path, &snap).unwrap();
    snap
}

#[tokio::test]
async fn run_with_no_sources_carries_everything_and_bumps_version() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    let seeded = seed_snapshot(&cfg);

    let outcome = run_once(&cfg, &RunOverrides::default()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Full);

    let written = Snapshot::load_or_default(&cfg.pipeline.output_path);
    assert_eq!(written.version, seeded.version + 1);
    assert_eq!(written.sections.prices, seeded.sections.prices);
    assert!(written.generated_at > seeded.generated_at);

    // Budget state was persisted for the next run.
    assert!(cfg.pipeline.state_path.exists());
}

#[tokio::test]
async fn equity_export_on_disk_is_folded_into_the_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    seed_snapshot(&cfg);

    let export = EquityExport {
        generated_at: Utc::now(),
        rows: vec![],
        subsectors: vec![],
    };
    grid_monitor::writer::write_json_atomic(&cfg.pipeline.equities_export_path, &export).unwrap();

    run_once(&cfg, &RunOverrides::default()).await.unwrap();

    let written = Snapshot::load_or_default(&cfg.pipeline.output_path);
    assert_eq!(
        written.sections.equities.generated_at,
        Some(export.generated_at)
    );
    assert!(!written.sections.equities.stale);
}

#[tokio::test]
async fn equities_folder_override_runs_the_normalizer_first() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    seed_snapshot(&cfg);

    let exports = tmp.path().join("capiq");
    std::fs::create_dir_all(&exports).unwrap();
    std::fs::write(
        exports.join("grid_utilities.csv"),
        "Ticker,Market Cap\nNEE,\"152,300\"\nDUK,\"84,100\"\n",
    )
    .unwrap();

    let overrides = RunOverrides {
        output: None,
        equities_folder: Some(exports),
    };
    run_once(&cfg, &overrides).await.unwrap();

    let written = Snapshot::load_or_default(&cfg.pipeline.output_path);
    assert_eq!(written.sections.equities.rows.len(), 2);
    assert_eq!(written.sections.equities.subsectors.len(), 1);
    assert_eq!(written.sections.equities.rows[0].subsector, "Utilities");
}

#[tokio::test]
async fn output_override_redirects_the_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());

    let alt = tmp.path().join("alt").join("snapshot.json");
    let overrides = RunOverrides {
        output: Some(alt.clone()),
        equities_folder: None,
    };
    run_once(&cfg, &overrides).await.unwrap();

    assert!(alt.exists());
    assert!(!cfg.pipeline.output_path.exists());
}

#[tokio::test]
async fn failing_source_degrades_to_partial_and_still_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config_in(tmp.path());
    let seeded = seed_snapshot(&cfg);

    // Nothing listens here; the fetch fails fast and the section carries.
    cfg.news = Some(grid_monitor::config::NewsConfig {
        source_id: "news".into(),
        daily_budget: 200,
        per_feed: 4,
        max_items: 20,
        feeds: vec![grid_monitor::config::NewsFeed {
            url: "http://127.0.0.1:9/rss".into(),
            tags: vec![],
        }],
    });

    let outcome = run_once(&cfg, &RunOverrides::default()).await.unwrap();
    match outcome {
        RunOutcome::Partial { failed } => {
            assert_eq!(failed.len(), 1);
            assert!(failed[0].starts_with("news:"), "got {failed:?}");
        }
        other => panic!("expected partial outcome, got {other:?}"),
    }

    let written = Snapshot::load_or_default(&cfg.pipeline.output_path);
    assert_eq!(written.version, seeded.version + 1);
    assert_eq!(written.sections.news, seeded.sections.news);
    let health = &written.source_health["news"];
    assert!(health.last_error.is_some());
    assert_eq!(health.last_success, None);
}

#[tokio::test]
async fn unwritable_output_is_a_hard_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());

    // Parent of the destination is a regular file.
    let block = tmp.path().join("block");
    std::fs::write(&block, "x").unwrap();
    let overrides = RunOverrides {
        output: Some(block.join("live.json")),
        equities_folder: None,
    };

    assert!(run_once(&cfg, &overrides).await.is_err());
}
