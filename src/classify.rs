//! # Headline Classification
//! Keyword rules that decide whether a feed item belongs on an energy
//! dashboard and, if so, what kind of item it is, how impactful it reads,
//! and which tags it gets. Pure string logic; no I/O.

use crate::snapshot::{Impact, ItemKind, Tag, TagClass};

/// A headline is dashboard-relevant when it mentions at least one of these.
const ENERGY_KEYWORDS: &[&str] = &[
    "energy",
    "power",
    "electricity",
    "grid",
    "solar",
    "wind",
    "nuclear",
    "gas",
    "oil",
    "lng",
    "pipeline",
    "refinery",
    "utility",
    "renewable",
    "hydrogen",
    "carbon",
    "emissions",
    "battery",
    "storage",
    "transmission",
    "capacity",
    "demand",
    "supply",
    "fuel",
    "barrel",
    "megawatt",
    "gigawatt",
    "ferc",
    "eia",
    "opec",
    "iea",
    "petroleum",
    "crude",
    "offshore",
    "ev",
    "electric vehicle",
    "semiconductor",
    "inverter",
    "charging",
    "lithium",
    "tesla",
    "nextera",
    "exxon",
    "shell",
    "bp",
    "chevron",
    "totalenergies",
];

const HIGH_IMPACT: &[&str] = &[
    "emergency", "alert", "crisis", "blackout", "outage", "shutdown", "major", "billion", "record",
];

const MEDIUM_IMPACT: &[&str] = &[
    "deal",
    "acqui",
    "merger",
    "policy",
    "regulation",
    "capacity",
    "project",
    "agreement",
];

/// Keyword → tag rules, applied in order until the tag cap is reached.
const TAG_RULES: &[(&[&str], &str, TagClass)] = &[
    (
        &[
            "usa", "u.s.", "american", "ferc", "eia", "doe", "texas", "california", "pjm", "ercot",
            "miso",
        ],
        "USA",
        TagClass::Geo,
    ),
    (
        &[
            "europe", "eu", "european", "germany", "france", "uk", "britain", "norway", "entsoe",
            "ofgem",
        ],
        "Europe",
        TagClass::Geo,
    ),
    (
        &["canada", "canadian", "alberta", "trans mountain"],
        "Canada",
        TagClass::Geo,
    ),
    (
        &[
            "solar",
            "wind",
            "renewable",
            "clean energy",
            "hydrogen",
            "battery",
            "storage",
            "green",
        ],
        "Renewables",
        TagClass::Sector,
    ),
    (
        &["nuclear", "uranium", "reactor", "vogtle", "smr"],
        "Nuclear",
        TagClass::Sector,
    ),
    (
        &[
            "oil",
            "crude",
            "brent",
            "wti",
            "barrel",
            "upstream",
            "e&p",
            "exploration",
        ],
        "Oil",
        TagClass::Sector,
    ),
    (
        &[
            "gas",
            "lng",
            "natural gas",
            "pipeline",
            "midstream",
            "ttf",
            "henry hub",
        ],
        "Gas",
        TagClass::Sector,
    ),
    (
        &["refin", "downstream", "crack spread"],
        "Refiners",
        TagClass::Sector,
    ),
    (
        &[
            "grid",
            "transmission",
            "interconnect",
            "capacity market",
            "demand response",
        ],
        "Grid",
        TagClass::Sector,
    ),
    (
        &["ev", "electric vehicle", "charging", "tesla", "rivian", "lucid"],
        "EV",
        TagClass::Sector,
    ),
    (
        &[
            "semiconductor",
            "chip",
            "inverter",
            "power electronics",
            "silicon carbide",
            "sic",
            "gan",
            "wolfspeed",
            "onsemi",
            "infineon",
        ],
        "Power Semi",
        TagClass::Sector,
    ),
    (
        &[
            "merger",
            "acquisition",
            "deal",
            "takeover",
            "buys",
            "acquires",
            "billion",
        ],
        "M&A",
        TagClass::Policy,
    ),
    (
        &[
            "policy",
            "regulation",
            "rule",
            "legislation",
            "congress",
            "parliament",
            "directive",
            "mandate",
        ],
        "Policy",
        TagClass::Policy,
    ),
];

/// Tags beyond this count add noise, not signal.
const MAX_TAGS: usize = 4;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

pub fn is_energy_relevant(text: &str) -> bool {
    contains_any(&text.to_lowercase(), ENERGY_KEYWORDS)
}

pub fn classify_kind(text: &str) -> ItemKind {
    let t = text.to_lowercase();
    if contains_any(
        &t,
        &["acqui", "merger", "takeover", "buys", "deal", "joint venture"],
    ) {
        ItemKind::Deal
    } else if contains_any(
        &t,
        &[
            "alert",
            "emergency",
            "outage",
            "storm",
            "crisis",
            "shortage",
            "blackout",
        ],
    ) {
        ItemKind::Alert
    } else if contains_any(
        &t,
        &[
            "policy",
            "regulation",
            "rule",
            "law",
            "directive",
            "mandate",
            "congress",
            "parliament",
        ],
    ) {
        ItemKind::Policy
    } else if contains_any(
        &t,
        &[
            "pipeline",
            "plant",
            "project",
            "construction",
            "commission",
            "capacity addition",
            "offshore",
        ],
    ) {
        ItemKind::Infrastructure
    } else {
        ItemKind::Market
    }
}

pub fn classify_impact(text: &str) -> Impact {
    let t = text.to_lowercase();
    if contains_any(&t, HIGH_IMPACT) {
        Impact::High
    } else if contains_any(&t, MEDIUM_IMPACT) {
        Impact::Medium
    } else {
        Impact::Low
    }
}

/// Extend the feed's base tags with rule-derived ones, deduplicated by
/// label, capped at `MAX_TAGS`.
pub fn auto_tag(text: &str, base_tags: &[Tag]) -> Vec<Tag> {
    let t = text.to_lowercase();
    let mut tags: Vec<Tag> = base_tags.to_vec();
    let mut seen: Vec<String> = tags.iter().map(|tag| tag.label.clone()).collect();

    for (keywords, label, class) in TAG_RULES {
        if tags.len() >= MAX_TAGS {
            break;
        }
        if contains_any(&t, keywords) && !seen.iter().any(|s| s == label) {
            tags.push(Tag {
                label: (*label).to_string(),
                class: *class,
            });
            seen.push((*label).to_string());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(label: &str, class: TagClass) -> Tag {
        Tag {
            label: label.into(),
            class,
        }
    }

    #[test]
    fn relevance_filter_passes_energy_and_drops_noise() {
        assert!(is_energy_relevant("ERCOT issues grid emergency notice"));
        assert!(is_energy_relevant("Brent crude slips below $80 a barrel"));
        assert!(!is_energy_relevant("Local bakery wins pastry award"));
    }

    #[test]
    fn kind_rules_follow_priority_order() {
        assert_eq!(
            classify_kind("Chevron acquires Hess in $53 billion deal"),
            ItemKind::Deal
        );
        assert_eq!(
            classify_kind("Storm knocks out power, outage across Texas"),
            ItemKind::Alert
        );
        assert_eq!(
            classify_kind("Congress passes new transmission rule"),
            ItemKind::Policy
        );
        assert_eq!(
            classify_kind("New LNG plant construction begins"),
            ItemKind::Infrastructure
        );
        assert_eq!(classify_kind("Henry Hub prices ease"), ItemKind::Market);
    }

    #[test]
    fn impact_rules() {
        assert_eq!(classify_impact("Grid emergency declared"), Impact::High);
        assert_eq!(
            classify_impact("Utilities sign capacity agreement"),
            Impact::Medium
        );
        assert_eq!(classify_impact("Prices drift sideways"), Impact::Low);
    }

    #[test]
    fn auto_tag_dedups_and_caps() {
        let base = vec![tag("USA", TagClass::Geo)];
        let tags = auto_tag(
            "FERC rule on grid transmission, solar and wind storage, nuclear uranium",
            &base,
        );
        assert!(tags.len() <= 4);
        // Base tag kept, not duplicated by the USA keyword rule.
        assert_eq!(tags.iter().filter(|t| t.label == "USA").count(), 1);
        assert!(tags.iter().any(|t| t.label == "Renewables"));
    }
}
