// tests/providers_rss.rs
//
// Feed adapters over canned XML: relevance filtering, top-K newest-first
// ordering with feed-order tie-breaks, novelty flags, and commentary
// attribution.

use grid_monitor::config::{CommentaryConfig, CommentaryFeed, NewsConfig, NewsFeed};
use grid_monitor::ingest::providers::{CommentaryRssAdapter, NewsRssAdapter};
use grid_monitor::ingest::types::{SectionData, SourceAdapter};
use grid_monitor::snapshot::{Impact, ItemKind};
use std::collections::HashSet;

const NEWS_XML: &str = include_str!("fixtures/news_rss.xml");
const COMMENTARY_XML: &str = include_str!("fixtures/commentary_rss.xml");

fn news_cfg(per_feed: usize, max_items: usize) -> NewsConfig {
    NewsConfig {
        source_id: "news".into(),
        daily_budget: 200,
        per_feed,
        max_items,
        feeds: vec![NewsFeed {
            url: "https://example.test/wire".into(),
            tags: vec![],
        }],
    }
}

async fn fetch_news(adapter: NewsRssAdapter) -> Vec<grid_monitor::snapshot::NewsItem> {
    match adapter.fetch().await.unwrap() {
        SectionData::News(items) => items,
        _ => panic!("wrong section data"),
    }
}

#[tokio::test]
async fn keeps_top_k_relevant_items_newest_first() {
    let adapter = NewsRssAdapter::from_fixtures(
        news_cfg(4, 20),
        HashSet::new(),
        vec![NEWS_XML.to_string()],
    );
    let items = fetch_news(adapter).await;

    // Six feed items, one irrelevant (the bakery), five relevant, capped at 4.
    assert_eq!(items.len(), 4);
    assert!(items
        .iter()
        .all(|it| !it.headline.contains("pastry award")));

    // Newest first...
    assert!(items[0].headline.contains("Grid operator declares emergency"));
    let stamps: Vec<u64> = items.iter().map(|it| it.published_at).collect();
    let mut sorted = stamps.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(stamps, sorted);

    // ...and the 09:30 tie keeps the feed's declared order.
    let tied: Vec<&str> = items
        .iter()
        .filter(|it| it.published_at == stamps[1])
        .map(|it| it.headline.as_str())
        .collect();
    assert_eq!(tied.len(), 2);
    assert!(tied[0].contains("Brent crude"));
    assert!(tied[1].contains("solar and storage"));
}

#[tokio::test]
async fn classification_runs_on_kept_items() {
    let adapter = NewsRssAdapter::from_fixtures(
        news_cfg(10, 20),
        HashSet::new(),
        vec![NEWS_XML.to_string()],
    );
    let items = fetch_news(adapter).await;

    let emergency = items
        .iter()
        .find(|it| it.headline.contains("emergency"))
        .unwrap();
    assert_eq!(emergency.kind, ItemKind::Alert);
    assert_eq!(emergency.impact, Impact::High);
    assert!(emergency.tags.iter().any(|t| t.label == "Grid"));

    let lng = items
        .iter()
        .find(|it| it.headline.contains("LNG exporter"))
        .unwrap();
    assert_eq!(lng.kind, ItemKind::Deal);
    assert!(lng.tags.iter().any(|t| t.label == "Gas"));
}

#[tokio::test]
async fn novelty_flag_checks_previous_snapshot_identities() {
    let mut seen = HashSet::new();
    seen.insert("https://example.test/wire/1".to_string());

    let adapter =
        NewsRssAdapter::from_fixtures(news_cfg(10, 20), seen, vec![NEWS_XML.to_string()]);
    let items = fetch_news(adapter).await;

    let known = items
        .iter()
        .find(|it| it.link.as_deref() == Some("https://example.test/wire/1"))
        .unwrap();
    assert!(!known.new);
    assert!(items
        .iter()
        .filter(|it| it.link.as_deref() != Some("https://example.test/wire/1"))
        .all(|it| it.new));
}

#[tokio::test]
async fn all_feeds_failing_fails_the_source() {
    let adapter = NewsRssAdapter::from_fixtures(
        news_cfg(4, 20),
        HashSet::new(),
        vec!["this is not xml".to_string()],
    );
    let err = adapter.fetch().await.unwrap_err();
    assert_eq!(err.code(), "parse_error");
}

#[tokio::test]
async fn commentary_attributes_speaker_and_caps_per_feed() {
    let cfg = CommentaryConfig {
        source_id: "commentary".into(),
        daily_budget: 100,
        per_feed: 3,
        max_items: 12,
        feeds: vec![CommentaryFeed {
            url: "https://example.test/regulator".into(),
            speaker: "FERC".into(),
            role: "Federal Energy Regulatory Commission".into(),
        }],
    };
    let adapter = CommentaryRssAdapter::from_fixtures(cfg, vec![COMMENTARY_XML.to_string()]);

    let items = match adapter.fetch().await.unwrap() {
        SectionData::Commentary(items) => items,
        _ => panic!("wrong section data"),
    };

    // Four feed items, capped at 3 per feed.
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|it| it.speaker == "FERC"));
    assert!(items[0].published_at >= items[1].published_at);
    assert!(items[0]
        .headline
        .contains("interregional transmission planning rule"));
}
