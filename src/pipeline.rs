//! # Pipeline Run
//! One scheduled invocation end to end: read persisted state, fetch every
//! source to a terminal state, merge against the last-known-good snapshot,
//! write the artifact atomically, persist budget counters.
//!
//! Re-entrant and idempotent per invocation; the scheduler guarantees runs
//! never overlap, which is what makes the budget file single-writer.

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::equities;
use crate::ingest;
use crate::ingest::budget::BudgetState;
use crate::ingest::providers;
use crate::merge;
use crate::snapshot::Snapshot;
use crate::writer;

/// Per-invocation overrides from the CLI.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub output: Option<PathBuf>,
    /// When set, run the spreadsheet normalizer over this folder first.
    pub equities_folder: Option<PathBuf>,
}

/// How the run went. A hard failure (no snapshot written) surfaces as an
/// `Err` from [`run_once`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every source produced fresh data.
    Full,
    /// Snapshot written, but these sources failed (`source_id:reason`).
    Partial { failed: Vec<String> },
}

pub async fn run_once(cfg: &PipelineConfig, overrides: &RunOverrides) -> Result<RunOutcome> {
    let started = Utc::now();
    let output_path = overrides
        .output
        .clone()
        .unwrap_or_else(|| cfg.pipeline.output_path.clone());

    if let Some(folder) = &overrides.equities_folder {
        let diagnostics =
            equities::run_normalizer(folder, &cfg.pipeline.equities_export_path, started)?;
        for d in &diagnostics {
            tracing::warn!(code = d.code(), "normalizer diagnostic: {d}");
        }
    }

    let previous = Snapshot::load_or_default(&output_path);
    let seen_news = previous.news_identities();

    let mut budgets = BudgetState::load(&cfg.pipeline.state_path, started.date_naive());
    let (adapters, limits) = providers::build_adapters(cfg, &seen_news);

    let records = ingest::run_adapters(
        &adapters,
        &mut budgets,
        &limits,
        Duration::from_secs(cfg.pipeline.fetch_timeout_secs),
    )
    .await;

    let failed: Vec<String> = records
        .iter()
        .filter_map(|r| {
            r.status
                .as_ref()
                .err()
                .map(|e| format!("{}:{}", r.source_id, e.code()))
        })
        .collect();

    let latest_equities = equities::load_export(&cfg.pipeline.equities_export_path);
    let snapshot = merge::merge_run(
        &previous,
        records,
        latest_equities,
        chrono::Duration::days(cfg.pipeline.equities_stale_after_days),
        started,
    );

    // The one fatal condition: if this fails, the previous snapshot stays
    // authoritative and the run reports hard failure.
    writer::write_json_atomic(&output_path, &snapshot)
        .with_context(|| format!("writing snapshot to {}", output_path.display()))?;

    if let Err(e) = budgets.save(&cfg.pipeline.state_path) {
        // Not fatal: worst case the next run re-spends today's budget.
        tracing::error!(error = ?e, "budget state not persisted");
    }

    counter!("pipeline_runs_total").increment(1);
    counter!("pipeline_sections_carried_total").increment(failed.len() as u64);
    tracing::info!(
        version = snapshot.version,
        sources = adapters.len(),
        failed = failed.len(),
        output = %output_path.display(),
        "snapshot written"
    );

    Ok(if failed.is_empty() {
        RunOutcome::Full
    } else {
        RunOutcome::Partial { failed }
    })
}
