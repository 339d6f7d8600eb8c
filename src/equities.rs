//! # Spreadsheet Normalizer
//! Turns a folder of Cap IQ CSV exports (one file per subsector) into the
//! common equity-fundamentals schema.
//!
//! Export headers drift between exports (case, stray whitespace, small
//! renames), so matching runs on canonicalized header text with a
//! string-similarity fallback. Errors are per-file: one malformed export is
//! diagnosed and skipped while the remaining files still produce rows.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::snapshot::{EquityExport, EquityRow, SubsectorSummary};
use crate::writer;

/// Expected export filenames and the subsector each maps to.
pub const SUBSECTOR_FILES: &[(&str, &str, &str)] = &[
    ("grid_ep.csv", "Oil E&P", "Upstream · GICS 10102010"),
    ("grid_midstream.csv", "Midstream", "Pipelines/MLPs · GICS 10102030"),
    ("grid_lng.csv", "LNG", "Export/Import · GICS 10102030"),
    ("grid_refiners.csv", "Refiners", "Downstream · GICS 10102040"),
    ("grid_oilservices.csv", "Oil Services", "Field Services · GICS 10102050"),
    ("grid_utilities.csv", "Utilities", "Electric · GICS 55105010"),
    ("grid_renewables.csv", "Renewables", "Solar/Wind · GICS 20106020"),
    ("grid_nuclear.csv", "Nuclear", "Operators/Fuel · GICS 55105010"),
    ("grid_gridstorage.csv", "Grid & Storage", "T&D, Battery · GICS 20106010"),
    ("grid_ev.csv", "EV", "Elec Vehicles · GICS 25102010"),
    ("grid_powersemi.csv", "Power Semis", "Power Electronics · GICS 45301020"),
];

/// Headers accepted for the company identifier column.
const TICKER_ALIASES: &[&str] = &["ticker", "symbol", "company ticker"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    MarketCap,
    PeNtm,
    EvEbitdaNtm,
    EpsNtm,
    EpsNtm4wkPrior,
    EpsNtm13wkPrior,
    EpsNtm52wkPrior,
    PeNtm52wkPrior,
    EvEbitda52wkPrior,
    PriceChgYtd,
    PriceChg1y,
    PriceChg3y,
}

/// Canonicalized Cap IQ header → field. First alias is the canonical export
/// header; later ones cover observed drift.
const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (
        Field::MarketCap,
        &["market capitalization", "market cap", "mkt cap"],
    ),
    (Field::PeNtm, &["p/e (ntm)", "pe (ntm)"]),
    (Field::EvEbitdaNtm, &["ev/ebitda (ntm)"]),
    (Field::EpsNtm, &["eps (ntm mean estimate)", "eps (ntm)"]),
    (Field::EpsNtm4wkPrior, &["eps (ntm mean, 4 weeks prior)"]),
    (Field::EpsNtm13wkPrior, &["eps (ntm mean, 13 weeks prior)"]),
    (Field::EpsNtm52wkPrior, &["eps (ntm mean, 52 weeks prior)"]),
    (Field::PeNtm52wkPrior, &["p/e (ntm, 52 weeks prior)"]),
    (
        Field::EvEbitda52wkPrior,
        &["ev/ebitda (ntm, 52 weeks prior)"],
    ),
    (
        Field::PriceChgYtd,
        &["price % change (ytd)", "price change (ytd)"],
    ),
    (
        Field::PriceChg1y,
        &["price % change (1 year)", "price change (1 year)"],
    ),
    (
        Field::PriceChg3y,
        &["price % change (3 year)", "price change (3 year)"],
    ),
];

/// Similarity floor for headers that canonicalization alone cannot match.
const HEADER_SIMILARITY_MIN: f64 = 0.9;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("{file}: headers match no known schema (unmatched: {unmatched:?})")]
    SchemaMismatch { file: String, unmatched: Vec<String> },
    #[error("{file}: unreadable export: {detail}")]
    Unreadable { file: String, detail: String },
    #[error("{file}: column {column:?}: cannot parse value {value:?}")]
    ValueParse {
        file: String,
        column: String,
        value: String,
    },
}

impl NormalizeError {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::SchemaMismatch { .. } | NormalizeError::Unreadable { .. } => {
                "schema_mismatch"
            }
            NormalizeError::ValueParse { .. } => "value_parse_error",
        }
    }
}

/// Trim (BOM included), lowercase, collapse inner whitespace.
fn canonical_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = true;
    for ch in raw.trim_start_matches('\u{feff}').trim().chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.extend(ch.to_lowercase());
            last_space = false;
        }
    }
    out.trim_end().to_string()
}

fn matches_alias(canon: &str, aliases: &[&str]) -> bool {
    aliases.iter().any(|a| *a == canon)
        || aliases
            .iter()
            .any(|a| strsim::jaro_winkler(a, canon) >= HEADER_SIMILARITY_MIN)
}

fn match_field(canon: &str) -> Option<Field> {
    // Exact canonical match wins before any similarity fallback fires.
    for (field, aliases) in FIELD_ALIASES {
        if aliases.iter().any(|a| *a == canon) {
            return Some(*field);
        }
    }
    // Several aliases differ only in a numeral, so take the best score
    // across the whole table, not the first one over the floor.
    let mut best: Option<(Field, f64)> = None;
    for (field, aliases) in FIELD_ALIASES {
        for alias in *aliases {
            let score = strsim::jaro_winkler(alias, canon);
            if score >= HEADER_SIMILARITY_MIN && best.map_or(true, |(_, b)| score > b) {
                best = Some((*field, score));
            }
        }
    }
    best.map(|(field, _)| field)
}

/// Parse an exported numeric cell. Tolerates thousands separators, percent
/// signs, multiple suffixes (`8.2x`), currency prefixes, and parenthesized
/// negatives. Placeholder markers are null, not errors.
fn parse_number(raw: &str) -> Result<Option<f64>, ()> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(None);
    }
    match t.to_ascii_uppercase().as_str() {
        "NA" | "N/A" | "NM" | "-" | "--" | "—" => return Ok(None),
        _ => {}
    }

    let negative = t.starts_with('(') && t.ends_with(')');
    let inner = if negative { &t[1..t.len() - 1] } else { t };

    let mut cleaned: String = inner
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '$' | '€' | '£' | 'x' | 'X' | ' '))
        .collect();
    if cleaned.starts_with('+') {
        cleaned.remove(0);
    }

    match cleaned.parse::<f64>() {
        Ok(v) => Ok(Some(if negative { -v } else { v })),
        Err(_) => Err(()),
    }
}

struct ColumnMap {
    ticker: usize,
    fields: Vec<(usize, Field, String)>,
}

fn map_columns(file: &str, headers: &csv::StringRecord) -> Result<ColumnMap, NormalizeError> {
    let mut ticker = None;
    let mut fields = Vec::new();
    let mut unmatched = Vec::new();

    for (idx, raw) in headers.iter().enumerate() {
        let canon = canonical_header(raw);
        if canon.is_empty() {
            continue;
        }
        if ticker.is_none() && matches_alias(&canon, TICKER_ALIASES) {
            ticker = Some(idx);
        } else if let Some(field) = match_field(&canon) {
            // First matching column wins; exports do not repeat headers.
            if !fields.iter().any(|(_, f, _)| *f == field) {
                fields.push((idx, field, raw.trim().to_string()));
            }
        } else {
            unmatched.push(raw.trim().to_string());
        }
    }

    match ticker {
        Some(ticker) if !fields.is_empty() => Ok(ColumnMap { ticker, fields }),
        _ => Err(NormalizeError::SchemaMismatch {
            file: file.to_string(),
            unmatched,
        }),
    }
}

fn set_field(row: &mut EquityRow, field: Field, value: Option<f64>) {
    match field {
        Field::MarketCap => row.market_cap = value,
        Field::PeNtm => row.pe_ntm = value,
        Field::EvEbitdaNtm => row.ev_ebitda_ntm = value,
        Field::EpsNtm => row.eps_ntm = value,
        Field::EpsNtm4wkPrior => row.eps_ntm_4wk_prior = value,
        Field::EpsNtm13wkPrior => row.eps_ntm_13wk_prior = value,
        Field::EpsNtm52wkPrior => row.eps_ntm_52wk_prior = value,
        Field::PeNtm52wkPrior => row.pe_ntm_52wk_prior = value,
        Field::EvEbitda52wkPrior => row.ev_ebitda_52wk_prior = value,
        Field::PriceChgYtd => row.price_chg_ytd = value,
        Field::PriceChg1y => row.price_chg_1y = value,
        Field::PriceChg3y => row.price_chg_3y = value,
    }
}

/// Parse one subsector export. Schema problems fail the whole file; value
/// problems null the cell and keep going.
fn parse_file(
    path: &Path,
    file: &str,
    subsector: &str,
) -> Result<(Vec<EquityRow>, Vec<NormalizeError>), NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| NormalizeError::Unreadable {
            file: file.to_string(),
            detail: e.to_string(),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| NormalizeError::Unreadable {
            file: file.to_string(),
            detail: e.to_string(),
        })?
        .clone();
    let columns = map_columns(file, &headers)?;

    let mut rows = Vec::new();
    let mut diagnostics = Vec::new();

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                diagnostics.push(NormalizeError::Unreadable {
                    file: file.to_string(),
                    detail: e.to_string(),
                });
                continue;
            }
        };
        let ticker = record.get(columns.ticker).unwrap_or("").trim();
        if ticker.is_empty() {
            continue;
        }

        let mut row = EquityRow {
            ticker: ticker.to_string(),
            subsector: subsector.to_string(),
            market_cap: None,
            pe_ntm: None,
            ev_ebitda_ntm: None,
            eps_ntm: None,
            eps_ntm_4wk_prior: None,
            eps_ntm_13wk_prior: None,
            eps_ntm_52wk_prior: None,
            pe_ntm_52wk_prior: None,
            ev_ebitda_52wk_prior: None,
            price_chg_ytd: None,
            price_chg_1y: None,
            price_chg_3y: None,
        };

        for (idx, field, header) in &columns.fields {
            let cell = record.get(*idx).unwrap_or("");
            match parse_number(cell) {
                Ok(value) => set_field(&mut row, *field, value),
                Err(()) => {
                    diagnostics.push(NormalizeError::ValueParse {
                        file: file.to_string(),
                        column: header.clone(),
                        value: cell.to_string(),
                    });
                }
            }
        }
        rows.push(row);
    }

    Ok((rows, diagnostics))
}

/// Upper median of the present values, as the original converter computes it.
fn median(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut present: Vec<f64> = values.flatten().collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(present[present.len() / 2])
}

fn pct_chg(new: Option<f64>, old: Option<f64>) -> Option<f64> {
    match (new, old) {
        (Some(n), Some(o)) if o != 0.0 => Some((n - o) / o.abs() * 100.0),
        _ => None,
    }
}

fn diff(new: Option<f64>, old: Option<f64>) -> Option<f64> {
    match (new, old) {
        (Some(n), Some(o)) => Some(n - o),
        _ => None,
    }
}

/// Roll one subsector's rows up to the summary card the dashboard shows.
pub fn summarize(name: &str, detail: &str, rows: &[EquityRow]) -> SubsectorSummary {
    let caps: Vec<f64> = rows.iter().filter_map(|r| r.market_cap).collect();
    let market_cap_total = if caps.is_empty() {
        None
    } else {
        Some(caps.iter().sum())
    };

    let pe_cur = median(rows.iter().map(|r| r.pe_ntm));
    let pe_52w = median(rows.iter().map(|r| r.pe_ntm_52wk_prior));
    let ev_cur = median(rows.iter().map(|r| r.ev_ebitda_ntm));
    let ev_52w = median(rows.iter().map(|r| r.ev_ebitda_52wk_prior));
    let eps_ntm = median(rows.iter().map(|r| r.eps_ntm));
    let eps_13w = median(rows.iter().map(|r| r.eps_ntm_13wk_prior));
    let eps_52w = median(rows.iter().map(|r| r.eps_ntm_52wk_prior));

    SubsectorSummary {
        name: name.to_string(),
        detail: detail.to_string(),
        companies: rows.len(),
        market_cap_total,
        pe_ntm_median: pe_cur,
        eps_revision_qtd_pct: pct_chg(eps_ntm, eps_13w),
        eps_revision_1y_pct: pct_chg(eps_ntm, eps_52w),
        pe_chg_1y: diff(pe_cur, pe_52w),
        ev_chg_1y: diff(ev_cur, ev_52w),
        price_chg_ytd: median(rows.iter().map(|r| r.price_chg_ytd)),
        price_chg_1y: median(rows.iter().map(|r| r.price_chg_1y)),
        price_chg_3y: median(rows.iter().map(|r| r.price_chg_3y)),
    }
}

/// Read every recognized export in `folder`. Per-file failures land in the
/// diagnostics list; the export carries whatever parsed.
pub fn normalize_folder(
    folder: &Path,
    now: DateTime<Utc>,
) -> Result<(EquityExport, Vec<NormalizeError>)> {
    anyhow::ensure!(
        folder.is_dir(),
        "export folder not found: {}",
        folder.display()
    );

    let mut rows = Vec::new();
    let mut subsectors = Vec::new();
    let mut diagnostics = Vec::new();

    for (file, name, detail) in SUBSECTOR_FILES {
        let path = folder.join(file);
        if !path.exists() {
            tracing::debug!(file, "no export present, skipping");
            continue;
        }
        match parse_file(&path, file, name) {
            Ok((file_rows, mut diags)) => {
                diagnostics.append(&mut diags);
                if file_rows.is_empty() {
                    tracing::warn!(file, "export has no data rows");
                    continue;
                }
                tracing::info!(file, rows = file_rows.len(), subsector = name, "parsed export");
                subsectors.push(summarize(name, detail, &file_rows));
                rows.extend(file_rows);
            }
            Err(e) => {
                tracing::warn!(file, error = %e, code = e.code(), "export rejected");
                diagnostics.push(e);
            }
        }
    }

    Ok((
        EquityExport {
            generated_at: now,
            rows,
            subsectors,
        },
        diagnostics,
    ))
}

/// Normalize `folder` and atomically write the export document to `out`.
pub fn run_normalizer(
    folder: &Path,
    out: &Path,
    now: DateTime<Utc>,
) -> Result<Vec<NormalizeError>> {
    let (export, diagnostics) = normalize_folder(folder, now)?;
    writer::write_json_atomic(out, &export)?;
    tracing::info!(
        out = %out.display(),
        rows = export.rows.len(),
        subsectors = export.subsectors.len(),
        diagnostics = diagnostics.len(),
        "equity export written"
    );
    Ok(diagnostics)
}

/// Latest export on disk, if any. Unreadable files are logged and ignored so
/// a bad manual upload cannot take the pipeline down.
pub fn load_export(path: &Path) -> Option<EquityExport> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(export) => Some(export),
        Err(e) => {
            tracing::warn!(error = ?e, path = %path.display(), "equity export unreadable, ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_header_trims_and_folds() {
        assert_eq!(canonical_header("  Market   Cap  "), "market cap");
        assert_eq!(canonical_header("\u{feff}Ticker"), "ticker");
        assert_eq!(canonical_header("P/E (NTM)"), "p/e (ntm)");
    }

    #[test]
    fn field_matching_tolerates_drift() {
        assert_eq!(
            match_field(&canonical_header(" Market Cap ")),
            Some(Field::MarketCap)
        );
        assert_eq!(
            match_field(&canonical_header("MARKET CAPITALIZATION")),
            Some(Field::MarketCap)
        );
        // Similarity fallback catches a small rename.
        assert_eq!(
            match_field(&canonical_header("EPS (NTM Mean, 13 Week Prior)")),
            Some(Field::EpsNtm13wkPrior)
        );
        assert_eq!(match_field("dividend yield"), None);
    }

    #[test]
    fn numbers_in_export_formats() {
        assert_eq!(parse_number("1,234.5"), Ok(Some(1234.5)));
        assert_eq!(parse_number("12.5%"), Ok(Some(12.5)));
        assert_eq!(parse_number("(3.2)"), Ok(Some(-3.2)));
        assert_eq!(parse_number("(1,200.0)"), Ok(Some(-1200.0)));
        assert_eq!(parse_number("8.2x"), Ok(Some(8.2)));
        assert_eq!(parse_number("$84,200"), Ok(Some(84200.0)));
        assert_eq!(parse_number("+4.1"), Ok(Some(4.1)));
        assert_eq!(parse_number("NA"), Ok(None));
        assert_eq!(parse_number("NM"), Ok(None));
        assert_eq!(parse_number(""), Ok(None));
        assert_eq!(parse_number("abc"), Err(()));
    }

    #[test]
    fn median_is_upper_median_of_present_values() {
        assert_eq!(
            median([Some(1.0), None, Some(3.0), Some(2.0)].into_iter()),
            Some(2.0)
        );
        assert_eq!(median([Some(1.0), Some(2.0)].into_iter()), Some(2.0));
        assert_eq!(median([None, None].into_iter()), None);
    }

    #[test]
    fn summarize_computes_revisions_and_total() {
        let mut a = blank_row("AAA");
        a.market_cap = Some(1000.0);
        a.pe_ntm = Some(10.0);
        a.pe_ntm_52wk_prior = Some(8.0);
        a.eps_ntm = Some(5.5);
        a.eps_ntm_13wk_prior = Some(5.0);
        a.eps_ntm_52wk_prior = Some(4.0);
        let mut b = blank_row("BBB");
        b.market_cap = Some(500.0);

        let s = summarize("Utilities", "Electric · GICS 55105010", &[a, b]);
        assert_eq!(s.companies, 2);
        assert_eq!(s.market_cap_total, Some(1500.0));
        assert_eq!(s.pe_ntm_median, Some(10.0));
        assert_eq!(s.eps_revision_qtd_pct, Some(10.0));
        assert_eq!(s.eps_revision_1y_pct, Some(37.5));
        assert_eq!(s.pe_chg_1y, Some(2.0));
    }

    fn blank_row(ticker: &str) -> EquityRow {
        EquityRow {
            ticker: ticker.into(),
            subsector: "Utilities".into(),
            market_cap: None,
            pe_ntm: None,
            ev_ebitda_ntm: None,
            eps_ntm: None,
            eps_ntm_4wk_prior: None,
            eps_ntm_13wk_prior: None,
            eps_ntm_52wk_prior: None,
            pe_ntm_52wk_prior: None,
            ev_ebitda_52wk_prior: None,
            price_chg_ytd: None,
            price_chg_1y: None,
            price_chg_3y: None,
        }
    }
}
