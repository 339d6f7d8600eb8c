// src/ingest/mod.rs
pub mod budget;
pub mod providers;
pub mod types;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::budget::BudgetState;
use crate::ingest::types::{FetchError, SourceAdapter, SourceRecord};

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline runs.");
        describe_counter!("pipeline_fetch_errors_total", "Adapter fetch failures.");
        describe_counter!(
            "pipeline_sections_carried_total",
            "Sections carried over because their source failed."
        );
        describe_counter!(
            "pipeline_rate_limited_total",
            "Fetches skipped on an exhausted daily budget."
        );
        describe_counter!("ingest_feed_items_total", "Feed items kept after filtering.");
        describe_counter!("ingest_feed_errors_total", "Feed download/parse errors.");
        describe_counter!("ingest_quote_errors_total", "Per-symbol quote failures.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the ingest pipeline last ran."
        );
    });
}

/// Normalize a feed headline: decode entities, strip tags, collapse
/// whitespace, drop trailing sentence punctuation.
pub fn normalize_headline(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Strip trailing sentence punctuation (keep quotes)
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // 6) Length cap: 500 chars is plenty for a headline
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

/// Run every adapter to a terminal state and return one record per adapter.
///
/// Budgets are charged up front; an exhausted budget yields a
/// `rate_limited` record without any network call. Each fetch runs on its
/// own task under its own timeout, so a hung call cannot stall the others,
/// and the merge only starts once every record is in.
pub async fn run_adapters(
    adapters: &[Arc<dyn SourceAdapter>],
    budgets: &mut BudgetState,
    limits: &BTreeMap<String, u32>,
    timeout: Duration,
) -> Vec<SourceRecord> {
    ensure_metrics_described();

    let mut records = Vec::with_capacity(adapters.len());
    let mut tasks = Vec::new();

    for adapter in adapters {
        let source_id = adapter.source_id().to_string();
        let cost = adapter.calls_per_run();
        let limit = limits.get(&source_id).copied().unwrap_or(u32::MAX);

        if !budgets.try_consume(&source_id, cost, limit) {
            counter!("pipeline_rate_limited_total").increment(1);
            tracing::warn!(
                source = %source_id,
                used = budgets.used(&source_id),
                limit,
                cost,
                "daily budget exhausted, skipping fetch"
            );
            records.push(SourceRecord {
                source_id,
                section: adapter.section(),
                fetched_at: Utc::now(),
                status: Err(FetchError::RateLimited),
            });
            continue;
        }

        let adapter = Arc::clone(adapter);
        tasks.push(tokio::spawn(async move {
            let status = match tokio::time::timeout(timeout, adapter.fetch()).await {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetchError::Timeout),
            };
            SourceRecord {
                source_id: adapter.source_id().to_string(),
                section: adapter.section(),
                fetched_at: Utc::now(),
                status,
            }
        }));
    }

    for task in tasks {
        match task.await {
            Ok(record) => {
                if let Err(e) = &record.status {
                    counter!("pipeline_fetch_errors_total").increment(1);
                    tracing::warn!(
                        source = %record.source_id,
                        reason = e.code(),
                        error = %e,
                        "adapter failed"
                    );
                }
                records.push(record);
            }
            Err(e) => {
                // An adapter panic loses its record; the merger treats the
                // section as carry-over with health untouched.
                tracing::error!(error = ?e, "adapter task aborted");
            }
        }
    }

    gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
    records
}
