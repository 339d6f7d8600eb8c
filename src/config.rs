// src/config.rs
//
// Static pipeline configuration: endpoints, source identifiers, rate
// budgets, feed lists, pinned entries. Credentials are referenced by env
// var name only and resolved at adapter build time, so they can never end
// up in a serialized artifact.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::snapshot::{GridRegion, Tag};

pub const ENV_CONFIG_PATH: &str = "GRID_MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    pub prices: Option<PricesConfig>,
    pub grid: Option<GridConfig>,
    pub news: Option<NewsConfig>,
    pub commentary: Option<CommentaryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Where the merged snapshot lands; also read back as last known good.
    pub output_path: PathBuf,
    pub state_path: PathBuf,
    /// Equity export document the normalizer writes and the merger reads.
    pub equities_export_path: PathBuf,
    pub fetch_timeout_secs: u64,
    pub equities_stale_after_days: i64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("data/live.json"),
            state_path: PathBuf::from("state/rate_budgets.json"),
            equities_export_path: PathBuf::from("data/equities.json"),
            fetch_timeout_secs: 15,
            equities_stale_after_days: 14,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub prefix: String,
}

/// Operator-maintained quote for venues with no API coverage.
#[derive(Debug, Clone, Deserialize)]
pub struct PinnedQuote {
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    pub price: f64,
    pub unit: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub change_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricesConfig {
    #[serde(default = "default_prices_id")]
    pub source_id: String,
    #[serde(default = "default_prices_endpoint")]
    pub endpoint: String,
    pub api_key_env: String,
    /// Free-tier quota; one unit per symbol per run.
    #[serde(default = "default_prices_budget")]
    pub daily_budget: u32,
    pub symbols: Vec<SymbolSpec>,
    #[serde(default)]
    pub pinned: Vec<PinnedQuote>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionSpec {
    pub name: String,
    pub eia_id: String,
    pub peak_gw: f64,
    /// demand/peak below this is surplus, below `tight_below` is tight,
    /// anything above is stress.
    pub surplus_below: f64,
    pub tight_below: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_id")]
    pub source_id: String,
    #[serde(default = "default_grid_endpoint")]
    pub endpoint: String,
    pub api_key_env: String,
    #[serde(default = "default_grid_budget")]
    pub daily_budget: u32,
    pub regions: Vec<RegionSpec>,
    /// Regions with no API coverage, carried verbatim into the section.
    #[serde(default)]
    pub static_regions: Vec<GridRegion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsFeed {
    pub url: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_news_id")]
    pub source_id: String,
    #[serde(default = "default_news_budget")]
    pub daily_budget: u32,
    #[serde(default = "default_news_per_feed")]
    pub per_feed: usize,
    #[serde(default = "default_news_max")]
    pub max_items: usize,
    pub feeds: Vec<NewsFeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentaryFeed {
    pub url: String,
    pub speaker: String,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentaryConfig {
    #[serde(default = "default_commentary_id")]
    pub source_id: String,
    #[serde(default = "default_commentary_budget")]
    pub daily_budget: u32,
    #[serde(default = "default_commentary_per_feed")]
    pub per_feed: usize,
    #[serde(default = "default_commentary_max")]
    pub max_items: usize,
    pub feeds: Vec<CommentaryFeed>,
}

fn default_prices_id() -> String {
    "prices".to_string()
}
fn default_prices_endpoint() -> String {
    "https://www.alphavantage.co/query".to_string()
}
fn default_prices_budget() -> u32 {
    25
}
fn default_grid_id() -> String {
    "grid_status".to_string()
}
fn default_grid_endpoint() -> String {
    "https://api.eia.gov/v2".to_string()
}
fn default_grid_budget() -> u32 {
    200
}
fn default_news_id() -> String {
    "news".to_string()
}
fn default_news_budget() -> u32 {
    200
}
fn default_news_per_feed() -> usize {
    4
}
fn default_news_max() -> usize {
    20
}
fn default_commentary_id() -> String {
    "commentary".to_string()
}
fn default_commentary_budget() -> u32 {
    100
}
fn default_commentary_per_feed() -> usize {
    3
}
fn default_commentary_max() -> usize {
    12
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("parsing pipeline config")
    }

    /// Load configuration from an explicit path, `$GRID_MONITOR_CONFIG`, or
    /// the default location, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => std::env::var(ENV_CONFIG_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Configuration with every source absent; sections all carry over.
    pub fn empty() -> Self {
        Self {
            pipeline: PipelineSection::default(),
            prices: None,
            grid: None,
            news: None,
            commentary: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [prices]
            api_key_env = "AV_KEY"
            symbols = [
                { symbol = "BZ=F", name = "Brent Crude", unit = "USD/bbl", prefix = "$" },
            ]

            [news]
            feeds = [{ url = "https://example.test/rss" }]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.pipeline.output_path, PathBuf::from("data/live.json"));
        let prices = cfg.prices.unwrap();
        assert_eq!(prices.source_id, "prices");
        assert_eq!(prices.daily_budget, 25);
        assert!(prices.pinned.is_empty());
        let news = cfg.news.unwrap();
        assert_eq!(news.per_feed, 4);
        assert_eq!(news.max_items, 20);
        assert!(cfg.grid.is_none());
    }

    #[test]
    fn feed_tags_and_static_regions_parse() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [grid]
            api_key_env = "EIA_KEY"
            regions = [
                { name = "ERCOT (Texas)", eia_id = "TEX", peak_gw = 76.2, surplus_below = 0.88, tight_below = 0.95 },
            ]

            [[grid.static_regions]]
            name = "ENTSO-E (Central EU)"
            region_id = "ENTSOE"
            demand_gw = 284.6
            supply_gw = 298.4
            peak_gw = 320.0
            status = "surplus"
            note = "updated manually"

            [news]
            feeds = [
                { url = "https://example.test/rss", tags = [{ label = "USA", class = "geo" }] },
            ]
            "#,
        )
        .unwrap();

        let grid = cfg.grid.unwrap();
        assert_eq!(grid.static_regions.len(), 1);
        assert_eq!(grid.static_regions[0].region_id, "ENTSOE");
        let news = cfg.news.unwrap();
        assert_eq!(news.feeds[0].tags[0].label, "USA");
    }
}
