//! # Snapshot Merger
//! Pure logic that folds the current run's source records and the latest
//! equity export into the previous snapshot.
//!
//! The carry-over rule is the pipeline's core correctness property: a failed
//! source keeps its previous section payload and only its health entry
//! changes, so one dead upstream never blanks the dashboard. Everything here
//! is synchronous and free of I/O so the rules are testable in isolation.

use chrono::{DateTime, Duration, Utc};

use crate::ingest::types::{SectionData, SourceRecord};
use crate::snapshot::{EquityExport, Sections, Snapshot, SourceHealth};

/// Per-section reducer: take the new payload when the source produced one,
/// otherwise carry the previous value unchanged.
pub fn reduce_section<T: Clone>(previous: &T, maybe_new: Option<T>) -> T {
    maybe_new.unwrap_or_else(|| previous.clone())
}

/// Fold one run's records into the previous snapshot.
///
/// `latest_equities` is the newest normalizer export on disk, if any; it is
/// applied only when strictly newer than what the snapshot already carries.
/// The section set of the result always equals the previous snapshot's: in
/// the degenerate all-sources-failed run only `version`, `generated_at`,
/// the equities `stale` flag, and `source_health` change.
pub fn merge_run(
    previous: &Snapshot,
    records: Vec<SourceRecord>,
    latest_equities: Option<EquityExport>,
    equities_stale_after: Duration,
    now: DateTime<Utc>,
) -> Snapshot {
    let mut source_health = previous.source_health.clone();

    let mut prices = None;
    let mut grid_status = None;
    let mut news = None;
    let mut commentary = None;

    for record in records {
        let health = source_health.entry(record.source_id.clone()).or_default();
        match record.status {
            Ok(data) => {
                match data {
                    SectionData::Prices(v) => prices = Some(v),
                    SectionData::Grid(v) => grid_status = Some(v),
                    SectionData::News(v) => news = Some(v),
                    SectionData::Commentary(v) => commentary = Some(v),
                }
                health.last_success = Some(record.fetched_at);
                health.last_error = None;
                health.last_error_detail = None;
            }
            Err(e) => {
                // Carry-over: section payload untouched, last_success untouched.
                health.last_error = Some(e.code().to_string());
                health.last_error_detail = Some(e.to_string());
                tracing::warn!(
                    source = %record.source_id,
                    section = %record.section,
                    reason = e.code(),
                    "source failed, carrying previous section"
                );
            }
        }
    }

    let mut sections = Sections {
        prices: reduce_section(&previous.sections.prices, prices),
        grid_status: reduce_section(&previous.sections.grid_status, grid_status),
        news: reduce_section(&previous.sections.news, news),
        commentary: reduce_section(&previous.sections.commentary, commentary),
        equities: previous.sections.equities.clone(),
    };

    if let Some(export) = latest_equities {
        let newer = sections
            .equities
            .generated_at
            .map_or(true, |prev| export.generated_at > prev);
        if newer {
            sections.equities.generated_at = Some(export.generated_at);
            sections.equities.rows = export.rows;
            sections.equities.subsectors = export.subsectors;
        }
    }
    // Recomputed every run: carried-forever data is surfaced, not trusted.
    sections.equities.stale = sections
        .equities
        .generated_at
        .map_or(false, |ts| now - ts > equities_stale_after);

    Snapshot {
        version: previous.version + 1,
        generated_at: now,
        sections,
        source_health,
    }
}

/// Convenience for health lookups in diagnostics and tests.
pub fn health<'a>(snapshot: &'a Snapshot, source_id: &str) -> Option<&'a SourceHealth> {
    snapshot.source_health.get(source_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reducer_prefers_new_value() {
        let prev = vec![1, 2, 3];
        assert_eq!(reduce_section(&prev, Some(vec![9])), vec![9]);
        assert_eq!(reduce_section(&prev, None), vec![1, 2, 3]);
    }
}
