// src/ingest/providers/grid.rs
//
// Grid-status adapter for the `grid_status` section. Two EIA v2 calls per
// region: latest hourly demand and recent fuel-type mix. Demand over peak
// drives the surplus/tight/stress status; supply is approximated because
// the API does not expose it directly.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::{GridConfig, RegionSpec};
use crate::ingest::types::{FetchError, SectionData, SourceAdapter};
use crate::snapshot::{GridRegion, GridStatusLevel, SectionId};

/// EIA fuel codes → dashboard labels.
const FUEL_LABELS: &[(&str, &str)] = &[
    ("NG", "Gas"),
    ("NUC", "Nuclear"),
    ("COL", "Coal"),
    ("WND", "Wind"),
    ("SUN", "Solar"),
    ("WAT", "Hydro"),
    ("OIL", "Oil"),
    ("OTH", "Other"),
    ("UNK", "Other"),
];

#[derive(Debug, Deserialize)]
struct EiaEnvelope {
    response: Option<EiaResponse>,
}

#[derive(Debug, Deserialize)]
struct EiaResponse {
    #[serde(default)]
    data: Vec<EiaRow>,
}

#[derive(Debug, Deserialize)]
struct EiaRow {
    /// The API serializes values as either numbers or strings.
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    fueltype: Option<String>,
}

fn value_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

enum GridMode {
    /// Per region, in order: (demand body, mix body).
    Fixture(Vec<(String, String)>),
    Http(reqwest::Client),
}

pub struct GridStatusAdapter {
    cfg: GridConfig,
    api_key: String,
    mode: GridMode,
}

impl GridStatusAdapter {
    pub fn from_config(cfg: GridConfig, api_key: String) -> Self {
        Self {
            cfg,
            api_key,
            mode: GridMode::Http(reqwest::Client::new()),
        }
    }

    pub fn from_fixtures(cfg: GridConfig, bodies: Vec<(String, String)>) -> Self {
        Self {
            cfg,
            api_key: String::new(),
            mode: GridMode::Fixture(bodies),
        }
    }

    fn demand_url(&self, region: &RegionSpec) -> String {
        format!(
            "{}/electricity/rto/region-data/data/?api_key={}&frequency=hourly&data[0]=value\
             &facets[respondent][]={}&facets[type][]=D\
             &sort[0][column]=period&sort[0][direction]=desc&length=1",
            self.cfg.endpoint, self.api_key, region.eia_id
        )
    }

    fn mix_url(&self, region: &RegionSpec) -> String {
        format!(
            "{}/electricity/rto/fuel-type-data/data/?api_key={}&frequency=hourly&data[0]=value\
             &facets[respondent][]={}\
             &sort[0][column]=period&sort[0][direction]=desc&length=10",
            self.cfg.endpoint, self.api_key, region.eia_id
        )
    }

    async fn get(&self, url: &str) -> Result<String, FetchError> {
        match &self.mode {
            GridMode::Fixture(_) => unreachable!("fixture bodies are resolved by index"),
            GridMode::Http(client) => {
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

    async fn region_bodies(
        &self,
        index: usize,
        region: &RegionSpec,
    ) -> Result<(String, String), FetchError> {
        match &self.mode {
            GridMode::Fixture(bodies) => bodies
                .get(index)
                .cloned()
                .ok_or_else(|| FetchError::Unreachable(format!("no fixture for {}", region.eia_id))),
            GridMode::Http(_) => {
                let demand = self.get(&self.demand_url(region)).await?;
                let mix = self.get(&self.mix_url(region)).await?;
                Ok((demand, mix))
            }
        }
    }

    fn parse_demand_gw(&self, region: &RegionSpec, body: &str) -> Result<Option<f64>, FetchError> {
        let envelope: EiaEnvelope = serde_json::from_str(body)
            .map_err(|e| FetchError::ParseError(format!("{} demand: {e}", region.eia_id)))?;
        Ok(envelope
            .response
            .and_then(|r| r.data.into_iter().next())
            .and_then(|row| row.value.as_ref().and_then(value_f64))
            // API reports MW.
            .map(|mw| mw / 1000.0))
    }

    fn parse_mix(&self, region: &RegionSpec, body: &str) -> Result<BTreeMap<String, u8>, FetchError> {
        let envelope: EiaEnvelope = serde_json::from_str(body)
            .map_err(|e| FetchError::ParseError(format!("{} mix: {e}", region.eia_id)))?;

        let mut raw: BTreeMap<String, f64> = BTreeMap::new();
        let mut total = 0.0;
        for row in envelope.response.map(|r| r.data).unwrap_or_default() {
            let Some(v) = row.value.as_ref().and_then(value_f64) else {
                continue;
            };
            let code = row.fueltype.unwrap_or_else(|| "OTH".to_string());
            let label = FUEL_LABELS
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, l)| (*l).to_string())
                .unwrap_or(code);
            *raw.entry(label).or_insert(0.0) += v;
            total += v;
        }

        let mut mix = BTreeMap::new();
        if total > 0.0 {
            for (label, v) in raw {
                let pct = (v / total * 100.0).round() as u8;
                if pct > 0 {
                    mix.insert(label, pct);
                }
            }
        }
        Ok(mix)
    }

    fn status_for(region: &RegionSpec, demand_gw: f64) -> GridStatusLevel {
        let pct_of_peak = demand_gw / region.peak_gw;
        if pct_of_peak < region.surplus_below {
            GridStatusLevel::Surplus
        } else if pct_of_peak < region.tight_below {
            GridStatusLevel::Tight
        } else {
            GridStatusLevel::Stress
        }
    }
}

#[async_trait]
impl SourceAdapter for GridStatusAdapter {
    fn source_id(&self) -> &str {
        &self.cfg.source_id
    }

    fn section(&self) -> SectionId {
        SectionId::GridStatus
    }

    fn calls_per_run(&self) -> u32 {
        (self.cfg.regions.len() as u32) * 2
    }

    async fn fetch(&self) -> Result<SectionData, FetchError> {
        let mut regions = Vec::with_capacity(self.cfg.regions.len() + self.cfg.static_regions.len());

        for (index, spec) in self.cfg.regions.iter().enumerate() {
            // A transport failure fails the whole source so the merger
            // carries the previous section instead of zeroed regions.
            let (demand_body, mix_body) = self.region_bodies(index, spec).await?;
            let demand_gw = self.parse_demand_gw(spec, &demand_body)?;
            let mix = self.parse_mix(spec, &mix_body)?;

            let region = match demand_gw {
                Some(demand_gw) => GridRegion {
                    name: spec.name.clone(),
                    region_id: spec.eia_id.clone(),
                    demand_gw: (demand_gw * 10.0).round() / 10.0,
                    // EIA does not expose supply; approximate just above demand.
                    supply_gw: (demand_gw * 1.04 * 10.0).round() / 10.0,
                    peak_gw: spec.peak_gw,
                    status: Self::status_for(spec, demand_gw),
                    mix,
                    note: None,
                },
                None => {
                    tracing::warn!(region = %spec.eia_id, "no demand datum, reporting zeros");
                    GridRegion {
                        name: spec.name.clone(),
                        region_id: spec.eia_id.clone(),
                        demand_gw: 0.0,
                        supply_gw: 0.0,
                        peak_gw: spec.peak_gw,
                        status: GridStatusLevel::Surplus,
                        mix,
                        note: Some("no recent demand datum".to_string()),
                    }
                }
            };
            regions.push(region);
        }

        regions.extend(self.cfg.static_regions.iter().cloned());

        if regions.is_empty() {
            return Err(FetchError::BadResponse("no regions configured".into()));
        }
        Ok(SectionData::Grid(regions))
    }
}
