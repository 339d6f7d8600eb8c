// src/ingest/providers/prices.rs
//
// Commodity/equity quote adapter for the `prices` section. One
// GLOBAL_QUOTE-style call per configured symbol; operator-pinned quotes for
// venues without API coverage are appended after the live ones.

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::config::PricesConfig;
use crate::ingest::types::{FetchError, SectionData, SourceAdapter};
use crate::snapshot::{PriceQuote, SectionId};

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "Global Quote")]
    quote: Option<QuoteFields>,
    /// Present when the provider throttles the key.
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuoteFields {
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

enum QuoteMode {
    /// One canned body per configured symbol, in order.
    Fixture(Vec<String>),
    Http(reqwest::Client),
}

pub struct PricesAdapter {
    cfg: PricesConfig,
    api_key: String,
    mode: QuoteMode,
}

impl PricesAdapter {
    pub fn from_config(cfg: PricesConfig, api_key: String) -> Self {
        Self {
            cfg,
            api_key,
            mode: QuoteMode::Http(reqwest::Client::new()),
        }
    }

    pub fn from_fixtures(cfg: PricesConfig, bodies: Vec<String>) -> Self {
        Self {
            cfg,
            api_key: String::new(),
            mode: QuoteMode::Fixture(bodies),
        }
    }

    async fn quote_body(&self, index: usize, symbol: &str) -> Result<String, FetchError> {
        match &self.mode {
            QuoteMode::Fixture(bodies) => bodies
                .get(index)
                .cloned()
                .ok_or_else(|| FetchError::Unreachable(format!("no fixture for {symbol}"))),
            QuoteMode::Http(client) => {
                let url = format!(
                    "{}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
                    self.cfg.endpoint, symbol, self.api_key
                );
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

    fn parse_quote(&self, symbol: &str, body: &str) -> Result<Option<(f64, f64)>, FetchError> {
        let envelope: QuoteEnvelope = serde_json::from_str(body)
            .map_err(|e| FetchError::ParseError(format!("{symbol}: {e}")))?;

        if envelope.note.is_some() {
            // The remote throttled us; treat exactly like an exhausted
            // local budget so the section carries over.
            return Err(FetchError::RateLimited);
        }
        if let Some(msg) = envelope.error_message {
            return Err(FetchError::BadResponse(format!("{symbol}: {msg}")));
        }

        let Some(fields) = envelope.quote else {
            return Ok(None);
        };
        let price = fields
            .price
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok());
        let change_pct = fields
            .change_percent
            .as_deref()
            .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok());

        match (price, change_pct) {
            (Some(p), Some(c)) => Ok(Some((p, c))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl SourceAdapter for PricesAdapter {
    fn source_id(&self) -> &str {
        &self.cfg.source_id
    }

    fn section(&self) -> SectionId {
        SectionId::Prices
    }

    fn calls_per_run(&self) -> u32 {
        self.cfg.symbols.len() as u32
    }

    async fn fetch(&self) -> Result<SectionData, FetchError> {
        let mut quotes = Vec::with_capacity(self.cfg.symbols.len() + self.cfg.pinned.len());
        let mut last_error = None;

        for (index, spec) in self.cfg.symbols.iter().enumerate() {
            let result = match self.quote_body(index, &spec.symbol).await {
                Ok(body) => self.parse_quote(&spec.symbol, &body),
                Err(e) => Err(e),
            };
            match result {
                Ok(Some((price, change_pct))) => quotes.push(PriceQuote {
                    name: spec.name.clone(),
                    symbol: spec.symbol.clone(),
                    price,
                    unit: spec.unit.clone(),
                    prefix: spec.prefix.clone(),
                    change_pct,
                    up: change_pct >= 0.0,
                    pinned: false,
                }),
                Ok(None) => {
                    tracing::warn!(symbol = %spec.symbol, "no quote in response, skipping symbol");
                }
                // Remote throttling applies to the whole key, not one symbol.
                Err(e @ FetchError::RateLimited) => return Err(e),
                Err(e) => {
                    tracing::warn!(symbol = %spec.symbol, error = %e, "quote failed, skipping symbol");
                    counter!("ingest_quote_errors_total").increment(1);
                    last_error = Some(e);
                }
            }
        }

        if quotes.is_empty() && !self.cfg.symbols.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| FetchError::BadResponse("no symbol yielded a quote".into())));
        }

        for pin in &self.cfg.pinned {
            quotes.push(PriceQuote {
                name: pin.name.clone(),
                symbol: pin.symbol.clone(),
                price: pin.price,
                unit: pin.unit.clone(),
                prefix: pin.prefix.clone(),
                change_pct: pin.change_pct,
                up: pin.change_pct >= 0.0,
                pinned: true,
            });
        }

        Ok(SectionData::Prices(quotes))
    }
}
