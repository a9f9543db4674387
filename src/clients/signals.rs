//! Upstream signal producer
//!
//! Supplies one `(score, regime)` tuple per mint on demand. The producer is
//! opaque: scores are consumed as-is and clamped at the ranker edge.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Mint, Regime, Signal};

#[async_trait]
pub trait SignalProducer: Send + Sync {
    async fn signals(&self, mints: &[Mint]) -> Result<HashMap<Mint, Signal>>;
}

#[derive(Debug, Deserialize)]
struct ApiSignal {
    mint: String,
    score: f64,
    #[serde(default)]
    regime: Option<String>,
    #[serde(default)]
    age_secs: Option<f64>,
}

pub struct HttpSignalProducer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSignalProducer {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl SignalProducer for HttpSignalProducer {
    async fn signals(&self, mints: &[Mint]) -> Result<HashMap<Mint, Signal>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }
        let addresses: Vec<&str> = mints.iter().map(|m| m.as_str()).collect();
        let url = format!("{}/signals?mints={}", self.base_url, addresses.join(","));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "signal producer returned {}",
                response.status()
            )));
        }
        let raw: Vec<ApiSignal> = response.json().await?;
        let mut out = HashMap::new();
        for s in raw {
            let Ok(mint) = Mint::parse(&s.mint) else {
                continue;
            };
            let regime = match s.regime.as_deref() {
                Some("trend") => Regime::Trend,
                _ => Regime::Range,
            };
            out.insert(
                mint,
                Signal {
                    score: s.score,
                    regime,
                    age_secs: s.age_secs.unwrap_or(0.0),
                },
            );
        }
        debug!("signals: {} of {} mints resolved", out.len(), mints.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_signal_parsing() {
        let raw = serde_json::json!([
            {"mint": crate::types::SOL_MINT, "score": 0.8, "regime": "trend", "age_secs": 12.0},
            {"mint": crate::types::USDC_MINT, "score": -0.2}
        ]);
        let parsed: Vec<ApiSignal> = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].regime.as_deref(), Some("trend"));
        assert!(parsed[1].regime.is_none());
    }
}
