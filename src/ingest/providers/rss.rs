// src/ingest/providers/rss.rs
//
// Feed adapters for the `news` and `commentary` sections. Both parse plain
// RSS via quick-xml, normalize headlines, and keep only the top-K most
// recent items per feed, newest first, feed-declared order breaking ties.

use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashSet;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::classify;
use crate::config::{CommentaryConfig, NewsConfig, NewsFeed};
use crate::ingest::normalize_headline;
use crate::ingest::types::{FetchError, SectionData, SourceAdapter};
use crate::snapshot::{CommentaryItem, NewsItem, SectionId};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Fetch mode shared by both feed adapters: canned bodies for tests, one
/// HTTP GET per feed in production.
pub(crate) enum FeedMode {
    Fixture(Vec<String>),
    Http(reqwest::Client),
}

impl FeedMode {
    async fn body(&self, index: usize, url: &str) -> Result<String, FetchError> {
        match self {
            FeedMode::Fixture(bodies) => bodies
                .get(index)
                .cloned()
                .ok_or_else(|| FetchError::Unreachable(format!("no fixture for feed {index}"))),
            FeedMode::Http(client) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(FetchError::from_reqwest)?;
                let resp = resp
                    .error_for_status()
                    .map_err(|e| FetchError::BadResponse(e.to_string()))?;
                resp.text().await.map_err(FetchError::from_reqwest)
            }
        }
    }
}

/// Adapter for the combined news-signal feed set.
pub struct NewsRssAdapter {
    cfg: NewsConfig,
    /// Item identities already present in the previous snapshot.
    seen: HashSet<String>,
    mode: FeedMode,
}

impl NewsRssAdapter {
    pub fn from_config(cfg: NewsConfig, seen: HashSet<String>) -> Self {
        Self {
            cfg,
            seen,
            mode: FeedMode::Http(reqwest::Client::new()),
        }
    }

    pub fn from_fixtures(cfg: NewsConfig, seen: HashSet<String>, bodies: Vec<String>) -> Self {
        Self {
            cfg,
            seen,
            mode: FeedMode::Fixture(bodies),
        }
    }

    fn parse_feed(&self, feed: &NewsFeed, body: &str) -> Result<Vec<NewsItem>, FetchError> {
        let rss: Rss = from_str(&scrub_html_entities_for_xml(body))
            .map_err(|e| FetchError::ParseError(format!("{}: {e}", feed.url)))?;

        let mut items = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let headline = normalize_headline(it.title.as_deref().unwrap_or_default());
            if headline.is_empty() || !classify::is_energy_relevant(&headline) {
                continue;
            }
            items.push(NewsItem {
                kind: classify::classify_kind(&headline),
                impact: classify::classify_impact(&headline),
                tags: classify::auto_tag(&headline, &feed.tags),
                published_at: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_unix)
                    .unwrap_or(0),
                link: it.link,
                feed: feed.url.clone(),
                headline,
                new: false,
            });
        }

        // Stable sort keeps the feed's declared order on equal timestamps.
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        items.truncate(self.cfg.per_feed);
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for NewsRssAdapter {
    fn source_id(&self) -> &str {
        &self.cfg.source_id
    }

    fn section(&self) -> SectionId {
        SectionId::News
    }

    fn calls_per_run(&self) -> u32 {
        self.cfg.feeds.len() as u32
    }

    async fn fetch(&self) -> Result<SectionData, FetchError> {
        let mut combined = Vec::new();
        let mut last_error = None;

        for (index, feed) in self.cfg.feeds.iter().enumerate() {
            let parsed = match self.mode.body(index, &feed.url).await {
                Ok(body) => self.parse_feed(feed, &body),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(mut items) => combined.append(&mut items),
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "feed failed, skipping");
                    counter!("ingest_feed_errors_total").increment(1);
                    last_error = Some(e);
                }
            }
        }

        if combined.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        // Dedup by headline across feeds (wire stories repeat), then order
        // the combined list newest-first and cap it.
        let mut seen_headlines = HashSet::new();
        combined.retain(|it| seen_headlines.insert(it.headline.clone()));
        combined.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        combined.truncate(self.cfg.max_items);

        for it in &mut combined {
            it.new = !self.seen.contains(it.identity());
        }

        counter!("ingest_feed_items_total").increment(combined.len() as u64);
        Ok(SectionData::News(combined))
    }
}

/// Adapter for official-commentary feeds (regulators, agencies).
pub struct CommentaryRssAdapter {
    cfg: CommentaryConfig,
    mode: FeedMode,
}

impl CommentaryRssAdapter {
    pub fn from_config(cfg: CommentaryConfig) -> Self {
        Self {
            cfg,
            mode: FeedMode::Http(reqwest::Client::new()),
        }
    }

    pub fn from_fixtures(cfg: CommentaryConfig, bodies: Vec<String>) -> Self {
        Self {
            cfg,
            mode: FeedMode::Fixture(bodies),
        }
    }
}

#[async_trait]
impl SourceAdapter for CommentaryRssAdapter {
    fn source_id(&self) -> &str {
        &self.cfg.source_id
    }

    fn section(&self) -> SectionId {
        SectionId::Commentary
    }

    fn calls_per_run(&self) -> u32 {
        self.cfg.feeds.len() as u32
    }

    async fn fetch(&self) -> Result<SectionData, FetchError> {
        let mut combined = Vec::new();
        let mut last_error = None;

        for (index, feed) in self.cfg.feeds.iter().enumerate() {
            let body = match self.mode.body(index, &feed.url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "commentary feed failed, skipping");
                    counter!("ingest_feed_errors_total").increment(1);
                    last_error = Some(e);
                    continue;
                }
            };
            let rss: Rss = match from_str(&scrub_html_entities_for_xml(&body)) {
                Ok(rss) => rss,
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "commentary feed unparseable, skipping");
                    last_error = Some(FetchError::ParseError(format!("{}: {e}", feed.url)));
                    continue;
                }
            };

            let mut items = Vec::new();
            for it in rss.channel.item {
                let headline = normalize_headline(it.title.as_deref().unwrap_or_default());
                if headline.is_empty() || !classify::is_energy_relevant(&headline) {
                    continue;
                }
                items.push(CommentaryItem {
                    speaker: feed.speaker.clone(),
                    role: feed.role.clone(),
                    published_at: it
                        .pub_date
                        .as_deref()
                        .map(parse_rfc2822_to_unix)
                        .unwrap_or(0),
                    link: it.link,
                    headline,
                });
            }
            items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
            items.truncate(self.cfg.per_feed);
            combined.append(&mut items);
        }

        if combined.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        combined.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        combined.truncate(self.cfg.max_items);
        Ok(SectionData::Commentary(combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_dates_parse_to_unix() {
        assert_eq!(
            parse_rfc2822_to_unix("Tue, 01 Jul 2025 12:00:00 GMT"),
            1_751_371_200
        );
        assert_eq!(parse_rfc2822_to_unix("not a date"), 0);
    }

    #[test]
    fn entity_scrub_keeps_xml_parseable() {
        let xml = "<x>A&nbsp;B&ndash;C</x>";
        assert_eq!(scrub_html_entities_for_xml(xml), "<x>A B-C</x>");
    }
}
