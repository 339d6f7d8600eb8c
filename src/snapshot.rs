//! # Snapshot Model
//! The single merged JSON artifact the dashboard renders, plus the payload
//! types for each of its sections.
//!
//! Section names are part of the renderer contract: the five keys under
//! `sections` must stay stable across versions. Modeling `Sections` as a
//! struct (not a map) pins both the key names and the fixed-section-set
//! invariant at the type level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Identifier of one snapshot section. `as_str` yields the exact key the
/// renderer sees in the JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    Prices,
    GridStatus,
    News,
    Commentary,
    Equities,
}

impl SectionId {
    pub const ALL: [SectionId; 5] = [
        SectionId::Prices,
        SectionId::GridStatus,
        SectionId::News,
        SectionId::Commentary,
        SectionId::Equities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionId::Prices => "prices",
            SectionId::GridStatus => "grid_status",
            SectionId::News => "news",
            SectionId::Commentary => "commentary",
            SectionId::Equities => "equities",
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quoted instrument in the `prices` section.
///
/// `pinned` quotes are operator-maintained entries for venues with no API
/// coverage; they come from configuration, not from the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub unit: String,
    pub prefix: String,
    pub change_pct: f64,
    pub up: bool,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridStatusLevel {
    Surplus,
    Tight,
    Stress,
}

/// One balancing-authority region in the `grid_status` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRegion {
    pub name: String,
    pub region_id: String,
    pub demand_gw: f64,
    pub supply_gw: f64,
    pub peak_gw: f64,
    pub status: GridStatusLevel,
    /// Fuel label → percent share of recent generation.
    #[serde(default)]
    pub mix: BTreeMap<String, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    #[serde(rename = "pol")]
    Policy,
    #[serde(rename = "mkt")]
    Market,
    #[serde(rename = "inf")]
    Infrastructure,
    #[serde(rename = "alr")]
    Alert,
    #[serde(rename = "deal")]
    Deal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    #[serde(rename = "h")]
    High,
    #[serde(rename = "m")]
    Medium,
    #[serde(rename = "l")]
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagClass {
    Geo,
    Sector,
    Policy,
    Company,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub class: TagClass,
}

/// One headline in the `news` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Unix seconds; 0 when the feed gave no parseable date.
    pub published_at: u64,
    pub feed: String,
    pub kind: ItemKind,
    pub impact: Impact,
    pub tags: Vec<Tag>,
    /// True when the item's identifier was absent from the previous snapshot.
    #[serde(default)]
    pub new: bool,
}

impl NewsItem {
    /// Identifier used for novelty detection: link when present, else headline.
    pub fn identity(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.headline)
    }
}

/// One item in the `commentary` section (official-source feeds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryItem {
    pub speaker: String,
    pub role: String,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub published_at: u64,
}

/// One company row from the spreadsheet normalizer.
///
/// All `*_chg_*` fields hold percent points (`12.5` means +12.5%);
/// `market_cap` holds millions of USD as exported. A null means the export
/// had no usable value for that cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityRow {
    pub ticker: String,
    pub subsector: String,
    pub market_cap: Option<f64>,
    pub pe_ntm: Option<f64>,
    pub ev_ebitda_ntm: Option<f64>,
    pub eps_ntm: Option<f64>,
    pub eps_ntm_4wk_prior: Option<f64>,
    pub eps_ntm_13wk_prior: Option<f64>,
    pub eps_ntm_52wk_prior: Option<f64>,
    pub pe_ntm_52wk_prior: Option<f64>,
    pub ev_ebitda_52wk_prior: Option<f64>,
    pub price_chg_ytd: Option<f64>,
    pub price_chg_1y: Option<f64>,
    pub price_chg_3y: Option<f64>,
}

/// Per-subsector roll-up of the equity rows. Medians for ratios and percent
/// changes, summed market cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectorSummary {
    pub name: String,
    pub detail: String,
    pub companies: usize,
    pub market_cap_total: Option<f64>,
    pub pe_ntm_median: Option<f64>,
    /// EPS NTM revision vs 13 weeks prior, percent.
    pub eps_revision_qtd_pct: Option<f64>,
    /// EPS NTM revision vs 52 weeks prior, percent.
    pub eps_revision_1y_pct: Option<f64>,
    /// P/E multiple change vs 52 weeks prior, turns.
    pub pe_chg_1y: Option<f64>,
    /// EV/EBITDA multiple change vs 52 weeks prior, turns.
    pub ev_chg_1y: Option<f64>,
    pub price_chg_ytd: Option<f64>,
    pub price_chg_1y: Option<f64>,
    pub price_chg_3y: Option<f64>,
}

/// Full output of one spreadsheet-normalizer run. Replaces any prior export
/// wholesale; never merged incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityExport {
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<EquityRow>,
    pub subsectors: Vec<SubsectorSummary>,
}

/// The `equities` section: latest export plus a merge-computed staleness flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EquitiesSection {
    /// When the folded-in export was generated; None until a first export lands.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub rows: Vec<EquityRow>,
    #[serde(default)]
    pub subsectors: Vec<SubsectorSummary>,
}

/// The fixed set of sections. Every snapshot carries all five, failed
/// sources included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Sections {
    pub prices: Vec<PriceQuote>,
    pub grid_status: Vec<GridRegion>,
    pub news: Vec<NewsItem>,
    pub commentary: Vec<CommentaryItem>,
    pub equities: EquitiesSection,
}

/// Per-source bookkeeping used by the renderer for staleness badges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceHealth {
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    /// Stable reason code of the most recent failure (`timeout`, ...).
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic run counter; bumps on every run even when nothing changed.
    pub version: u64,
    pub generated_at: DateTime<Utc>,
    pub sections: Sections,
    pub source_health: BTreeMap<String, SourceHealth>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: 0,
            generated_at: DateTime::UNIX_EPOCH,
            sections: Sections::default(),
            source_health: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    /// Read the last-known-good snapshot. A missing or unreadable file yields
    /// the empty default so a first run (or a corrupted artifact) still
    /// produces a complete snapshot.
    pub fn load_or_default(path: &Path) -> Snapshot {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(snap) => snap,
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "previous snapshot unreadable, starting empty");
                    Snapshot::default()
                }
            },
            Err(_) => Snapshot::default(),
        }
    }

    /// Identifiers of the news items currently in the snapshot, for novelty
    /// detection in the feed adapters.
    pub fn news_identities(&self) -> HashSet<String> {
        self.sections
            .news
            .iter()
            .map(|it| it.identity().to_string())
            .collect()
    }
}
