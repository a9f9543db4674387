//! Market-data provider and TTL cache
//!
//! Providers are opaque caches with a TTL. A provider error never restarts a
//! tick: the last snapshot is served with `is_stale` set so downstream
//! consumers can discount it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::Mint;

/// One provider observation for a mint
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub mint: Mint,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub price_change_24h: f64,
    pub holders: u64,
    pub scanner_score: f64,
    pub is_new_listing: bool,
    pub fetched_at: DateTime<Utc>,
    /// Served past its TTL after a provider failure
    pub is_stale: bool,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Batched snapshot fetch for known mints
    async fn fetch(&self, mints: &[Mint]) -> Result<HashMap<Mint, MarketSnapshot>>;

    /// Trending / new-listing discovery feed
    async fn trending(&self, limit: usize) -> Result<Vec<MarketSnapshot>>;
}

/// TTL cache over a provider
pub struct MarketDataCache {
    provider: Arc<dyn MarketDataProvider>,
    cache: DashMap<Mint, MarketSnapshot>,
    ttl: Duration,
}

impl MarketDataCache {
    pub fn new(provider: Arc<dyn MarketDataProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Snapshot for the requested mints. Entries past TTL are refreshed in
    /// one batched call; on provider failure the cached values are returned
    /// flagged stale.
    pub async fn snapshots(&self, mints: &[Mint], now: DateTime<Utc>) -> HashMap<Mint, MarketSnapshot> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::seconds(30));
        let expired: Vec<Mint> = mints
            .iter()
            .filter(|m| {
                self.cache
                    .get(*m)
                    .map(|e| now - e.fetched_at > ttl)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if !expired.is_empty() {
            match self.provider.fetch(&expired).await {
                Ok(fresh) => {
                    for (mint, snapshot) in fresh {
                        self.cache.insert(mint, snapshot);
                    }
                }
                Err(e) => {
                    warn!("market data fetch failed, serving stale: {e}");
                    for mint in &expired {
                        if let Some(mut entry) = self.cache.get_mut(mint) {
                            entry.is_stale = true;
                        }
                    }
                }
            }
        }

        mints
            .iter()
            .filter_map(|m| self.cache.get(m).map(|e| (m.clone(), e.clone())))
            .collect()
    }

    /// Discovery feed, uncached (the provider does its own caching)
    pub async fn trending(&self, limit: usize) -> Result<Vec<MarketSnapshot>> {
        self.provider.trending(limit).await
    }

    pub fn peek(&self, mint: &Mint) -> Option<MarketSnapshot> {
        self.cache.get(mint).map(|e| e.clone())
    }
}

// --- HTTP provider ---

#[derive(Debug, Clone, Deserialize)]
struct ApiLiquidity {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiPriceChange {
    h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiVolume {
    h24: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPair {
    #[serde(rename = "baseToken")]
    base_token: ApiBaseToken,
    price_usd: Option<String>,
    liquidity: Option<ApiLiquidity>,
    volume: Option<ApiVolume>,
    price_change: Option<ApiPriceChange>,
    #[serde(default)]
    holders: Option<u64>,
    #[serde(default)]
    boosted: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiBaseToken {
    address: String,
}

pub struct HttpMarketDataProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMarketDataProvider {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { base_url, client })
    }

    fn pair_to_snapshot(pair: ApiPair, now: DateTime<Utc>) -> Option<MarketSnapshot> {
        let mint = Mint::parse(&pair.base_token.address).ok()?;
        let price_usd = pair.price_usd.as_deref()?.parse::<f64>().ok()?;
        Some(MarketSnapshot {
            mint,
            price_usd,
            liquidity_usd: pair.liquidity.and_then(|l| l.usd).unwrap_or(0.0),
            volume_24h_usd: pair.volume.and_then(|v| v.h24).unwrap_or(0.0),
            price_change_24h: pair.price_change.and_then(|c| c.h24).unwrap_or(0.0),
            holders: pair.holders.unwrap_or(0),
            scanner_score: if pair.boosted { 1.0 } else { 0.0 },
            is_new_listing: pair.boosted,
            fetched_at: now,
            is_stale: false,
        })
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn fetch(&self, mints: &[Mint]) -> Result<HashMap<Mint, MarketSnapshot>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }
        let addresses: Vec<&str> = mints.iter().map(|m| m.as_str()).collect();
        let url = format!("{}/tokens/{}", self.base_url, addresses.join(","));
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "market data returned {}",
                response.status()
            )));
        }
        let pairs: Vec<ApiPair> = response.json().await?;
        let now = Utc::now();
        let mut out = HashMap::new();
        for pair in pairs {
            if let Some(snapshot) = Self::pair_to_snapshot(pair, now) {
                out.insert(snapshot.mint.clone(), snapshot);
            }
        }
        debug!("market data: {} of {} mints resolved", out.len(), mints.len());
        Ok(out)
    }

    async fn trending(&self, limit: usize) -> Result<Vec<MarketSnapshot>> {
        let url = format!("{}/trending?limit={limit}", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "trending returned {}",
                response.status()
            )));
        }
        let pairs: Vec<ApiPair> = response.json().await?;
        let now = Utc::now();
        Ok(pairs
            .into_iter()
            .filter_map(|p| Self::pair_to_snapshot(p, now))
            .take(limit)
            .collect())
    }
}
