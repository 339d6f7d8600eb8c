// src/ingest/providers/mod.rs
pub mod grid;
pub mod prices;
pub mod rss;

pub use grid::GridStatusAdapter;
pub use prices::PricesAdapter;
pub use rss::{CommentaryRssAdapter, NewsRssAdapter};

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::ingest::types::SourceAdapter;

/// Build every configured adapter plus its daily budget limit.
///
/// A source whose credential env var is missing is skipped with an error
/// log: its section carries over and the rest of the run proceeds, the same
/// degradation as a failed fetch.
pub fn build_adapters(
    cfg: &PipelineConfig,
    seen_news: &HashSet<String>,
) -> (Vec<Arc<dyn SourceAdapter>>, BTreeMap<String, u32>) {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let mut limits = BTreeMap::new();

    if let Some(prices) = &cfg.prices {
        match std::env::var(&prices.api_key_env) {
            Ok(key) => {
                limits.insert(prices.source_id.clone(), prices.daily_budget);
                adapters.push(Arc::new(PricesAdapter::from_config(prices.clone(), key)));
            }
            Err(_) => {
                tracing::error!(
                    env = %prices.api_key_env,
                    source = %prices.source_id,
                    "credential env var not set, source skipped"
                );
            }
        }
    }

    if let Some(grid) = &cfg.grid {
        match std::env::var(&grid.api_key_env) {
            Ok(key) => {
                limits.insert(grid.source_id.clone(), grid.daily_budget);
                adapters.push(Arc::new(GridStatusAdapter::from_config(grid.clone(), key)));
            }
            Err(_) => {
                tracing::error!(
                    env = %grid.api_key_env,
                    source = %grid.source_id,
                    "credential env var not set, source skipped"
                );
            }
        }
    }

    if let Some(news) = &cfg.news {
        limits.insert(news.source_id.clone(), news.daily_budget);
        adapters.push(Arc::new(NewsRssAdapter::from_config(
            news.clone(),
            seen_news.clone(),
        )));
    }

    if let Some(commentary) = &cfg.commentary {
        limits.insert(commentary.source_id.clone(), commentary.daily_budget);
        adapters.push(Arc::new(CommentaryRssAdapter::from_config(
            commentary.clone(),
        )));
    }

    (adapters, limits)
}
