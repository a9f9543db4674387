//! Aggregator client
//!
//! Quote and swap-transaction endpoints of the on-chain exchange aggregator.
//! Quotes are ExactIn with intermediate tokens restricted; the swap endpoint
//! returns a base64 versioned transaction ready to sign.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fees::PriorityLevel;
use crate::types::Mint;

/// Quote request, always ExactIn
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub amount_base_units: u64,
    pub slippage_bps: u32,
}

/// A priced route from the aggregator
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: Mint,
    pub output_mint: Mint,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub slippage_bps: u32,
    pub route_legs: usize,
    /// Raw quote payload, passed back verbatim to the swap endpoint
    pub raw: serde_json::Value,
}

/// Signed-ready swap transaction from the aggregator
#[derive(Debug, Clone)]
pub struct BuiltSwap {
    pub transaction: VersionedTransaction,
    pub raw_b64: String,
}

#[async_trait]
pub trait AggregatorClient: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;
    async fn swap_tx(
        &self,
        quote: &Quote,
        user: &Pubkey,
        priority_level: PriorityLevel,
        max_lamports: u64,
    ) -> Result<BuiltSwap>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    #[serde(default)]
    price_impact_pct: serde_json::Value,
    #[serde(default)]
    slippage_bps: u32,
    #[serde(default)]
    route_plan: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody<'a> {
    quote_response: &'a serde_json::Value,
    user_public_key: String,
    dynamic_compute_unit_limit: bool,
    dynamic_slippage: bool,
    prioritization_fee_lamports: PrioritizationFee,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrioritizationFee {
    priority_level_with_max_lamports: PriorityLevelWithMax,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PriorityLevelWithMax {
    priority_level: String,
    max_lamports: u64,
    global: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

pub struct HttpAggregatorClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAggregatorClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self { base_url, client })
    }
}

#[async_trait]
impl AggregatorClient for HttpAggregatorClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn&restrictIntermediateTokens=true",
            self.base_url,
            request.input_mint,
            request.output_mint,
            request.amount_base_units,
            request.slippage_bps,
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::QuoteRejected(format!(
                "quote returned {}",
                response.status()
            )));
        }
        let raw: serde_json::Value = response.json().await?;
        let parsed: QuoteResponse = serde_json::from_value(raw.clone())?;

        let in_amount = parsed
            .in_amount
            .parse::<u64>()
            .map_err(|e| Error::QuoteRejected(format!("bad inAmount: {e}")))?;
        let out_amount = parsed
            .out_amount
            .parse::<u64>()
            .map_err(|e| Error::QuoteRejected(format!("bad outAmount: {e}")))?;
        if out_amount == 0 {
            return Err(Error::QuoteRejected("zero out amount".into()));
        }

        // priceImpactPct arrives as either a string or a number
        let price_impact_pct = match &parsed.price_impact_pct {
            serde_json::Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        };

        debug!(
            input = %parsed.input_mint,
            output = %parsed.output_mint,
            in_amount,
            out_amount,
            price_impact_pct,
            "quote received"
        );

        Ok(Quote {
            input_mint: Mint::parse(&parsed.input_mint)?,
            output_mint: Mint::parse(&parsed.output_mint)?,
            in_amount,
            out_amount,
            price_impact_pct,
            slippage_bps: parsed.slippage_bps,
            route_legs: parsed.route_plan.len(),
            raw,
        })
    }

    async fn swap_tx(
        &self,
        quote: &Quote,
        user: &Pubkey,
        priority_level: PriorityLevel,
        max_lamports: u64,
    ) -> Result<BuiltSwap> {
        let body = SwapRequestBody {
            quote_response: &quote.raw,
            user_public_key: user.to_string(),
            dynamic_compute_unit_limit: true,
            dynamic_slippage: true,
            prioritization_fee_lamports: PrioritizationFee {
                priority_level_with_max_lamports: PriorityLevelWithMax {
                    priority_level: priority_level.as_str().to_string(),
                    max_lamports,
                    global: false,
                },
            },
        };

        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::UpstreamUnavailable(format!(
                "swap endpoint returned {}",
                response.status()
            )));
        }
        let parsed: SwapResponse = response.json().await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&parsed.swap_transaction)
            .map_err(|e| Error::TransactionBuild(format!("base64 decode: {e}")))?;
        let transaction: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| Error::TransactionBuild(format!("tx deserialize: {e}")))?;

        Ok(BuiltSwap {
            transaction,
            raw_b64: parsed.swap_transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_response_parsing() {
        let raw = json!({
            "inputMint": crate::types::SOL_MINT,
            "outputMint": crate::types::USDC_MINT,
            "inAmount": "1000000000",
            "outAmount": "150000000",
            "priceImpactPct": "0.0012",
            "slippageBps": 50,
            "routePlan": [{}, {}]
        });
        let parsed: QuoteResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.in_amount, "1000000000");
        assert_eq!(parsed.route_plan.len(), 2);
    }

    #[test]
    fn test_swap_body_shape() {
        let quote_raw = json!({"inAmount": "1"});
        let body = SwapRequestBody {
            quote_response: &quote_raw,
            user_public_key: "user".into(),
            dynamic_compute_unit_limit: true,
            dynamic_slippage: true,
            prioritization_fee_lamports: PrioritizationFee {
                priority_level_with_max_lamports: PriorityLevelWithMax {
                    priority_level: "high".into(),
                    max_lamports: 204_000,
                    global: false,
                },
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(
            v["prioritizationFeeLamports"]["priorityLevelWithMaxLamports"]["maxLamports"],
            204_000
        );
        assert_eq!(
            v["prioritizationFeeLamports"]["priorityLevelWithMaxLamports"]["global"],
            false
        );
    }
}
