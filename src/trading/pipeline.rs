//! Swap execution pipeline
//!
//! One swap intent walks preflight -> quote -> fee decision -> build ->
//! simulate -> send. Every failure mode maps to a typed terminal outcome;
//! the pipeline itself never propagates an error to the tick.

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::aggregator::{AggregatorClient, Quote, QuoteRequest};
use crate::clients::chain::ChainClient;
use crate::config::{ExecutionMode, RuntimeConfig};
use crate::error::Error;
use crate::fees::{self, FeeDecision, Side};
use crate::trading::intent::TradeIntent;
use crate::trading::simulation;
use crate::trading::{TradeEvent, TradeStatus};
use crate::types::{
    ATA_RENT_LAMPORTS, BASE_FEE_LAMPORTS, DUST_BUFFER_BASE_UNITS, SAFETY_BUFFER_LAMPORTS,
};

pub struct SwapPipeline {
    chain: Arc<dyn ChainClient>,
    aggregator: Arc<dyn AggregatorClient>,
    wallet: Pubkey,
    signer: Option<Arc<Keypair>>,
}

struct Preflight {
    clamped_amount: u64,
    sol_balance: u64,
}

impl SwapPipeline {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        aggregator: Arc<dyn AggregatorClient>,
        wallet: Pubkey,
        signer: Option<Arc<Keypair>>,
    ) -> Self {
        Self {
            chain,
            aggregator,
            wallet,
            signer,
        }
    }

    /// Run one intent to a terminal outcome
    pub async fn execute(
        &self,
        intent: &TradeIntent,
        cfg: &RuntimeConfig,
        now: DateTime<Utc>,
    ) -> TradeEvent {
        // --- Preflight ---
        let preflight = match self.preflight(intent, cfg).await {
            Ok(p) => p,
            Err(e) => return self.terminal_for_error(intent, now, e, None, None),
        };

        // --- Quote ---
        let quote_request = QuoteRequest {
            input_mint: intent.input_mint.clone(),
            output_mint: intent.output_mint.clone(),
            amount_base_units: preflight.clamped_amount,
            slippage_bps: cfg.max_slippage_bps,
        };
        let quote = match tokio::time::timeout(
            Duration::from_millis(cfg.quote_timeout_ms),
            self.aggregator.quote(&quote_request),
        )
        .await
        {
            Err(_) => {
                return self.terminal_for_error(
                    intent,
                    now,
                    Error::UpstreamTimeout(cfg.quote_timeout_ms),
                    None,
                    None,
                )
            }
            Ok(Err(e)) => return self.terminal_for_error(intent, now, e, None, None),
            Ok(Ok(q)) => q,
        };

        // --- Fee decision ---
        let notional_sol = notional_sol(intent, &quote);
        let fee = fees::decide(cfg, &intent.fee_context(notional_sol), intent.is_usdc_to_sol);
        if fee.skip_recommended {
            let e = Error::FeeGuardExceeded {
                ratio: fee.effective_ratio,
                cap: cfg.max_fee_ratio_hard_per_leg,
            };
            return self.terminal_for_error(intent, now, e, Some(&quote), Some(&fee));
        }

        // --- Paper terminal ---
        if cfg.execution_mode == ExecutionMode::Paper {
            let event = self.event(
                intent,
                now,
                TradeStatus::Paper,
                None,
                intent.reason_code.clone(),
                Some(&quote),
                Some(&fee),
            );
            self.failsafe_sell_log(intent, &event);
            return event;
        }

        // --- Build ---
        let Some(signer) = &self.signer else {
            return self.terminal_for_error(
                intent,
                now,
                Error::InvalidKeypair("no signer configured for live mode".into()),
                Some(&quote),
                Some(&fee),
            );
        };
        let built = match self
            .aggregator
            .swap_tx(&quote, &self.wallet, fee.priority_level, fee.max_lamports)
            .await
        {
            Ok(b) => b,
            Err(e) => return self.terminal_for_error(intent, now, e, Some(&quote), Some(&fee)),
        };
        let signed = match VersionedTransaction::try_new(
            built.transaction.message.clone(),
            &[signer.as_ref()],
        ) {
            Ok(tx) => tx,
            Err(e) => {
                return self.terminal_for_error(
                    intent,
                    now,
                    Error::TransactionBuild(e.to_string()),
                    Some(&quote),
                    Some(&fee),
                )
            }
        };

        // --- Simulate ---
        let outcome = match tokio::time::timeout(
            Duration::from_millis(cfg.rpc_timeout_ms),
            self.chain.simulate_transaction(&signed),
        )
        .await
        {
            Err(_) => {
                return self.terminal_for_error(
                    intent,
                    now,
                    Error::UpstreamTimeout(cfg.rpc_timeout_ms),
                    Some(&quote),
                    Some(&fee),
                )
            }
            Ok(Err(e)) => {
                return self.terminal_for_error(intent, now, e, Some(&quote), Some(&fee))
            }
            Ok(Ok(o)) => o,
        };
        if let Some(e) = simulation::classify(&outcome) {
            warn!(
                reason = %e,
                logs = outcome.logs.len(),
                "swap simulation failed"
            );
            return self.terminal_for_error(intent, now, e, Some(&quote), Some(&fee));
        }

        // --- Send ---
        let sig = match tokio::time::timeout(
            Duration::from_millis(cfg.rpc_timeout_ms),
            self.chain.send_versioned_transaction(&signed),
        )
        .await
        {
            Err(_) => {
                return self.terminal_for_error(
                    intent,
                    now,
                    Error::UpstreamTimeout(cfg.rpc_timeout_ms),
                    Some(&quote),
                    Some(&fee),
                )
            }
            Ok(Err(e)) => {
                return self.terminal_for_error(intent, now, e, Some(&quote), Some(&fee))
            }
            Ok(Ok(sig)) => sig,
        };

        info!(
            sig = %sig,
            input = %intent.input_mint,
            output = %intent.output_mint,
            lamports_fee_cap = fee.max_lamports,
            "swap sent, balance was {}",
            preflight.sol_balance
        );
        let event = self.event(
            intent,
            now,
            TradeStatus::Sent,
            Some(sig.to_string()),
            intent.reason_code.clone(),
            Some(&quote),
            Some(&fee),
        );
        self.failsafe_sell_log(intent, &event);
        event
    }

    /// Preflight invariants: balance read, dust clamp, lamport requirements
    async fn preflight(
        &self,
        intent: &TradeIntent,
        cfg: &RuntimeConfig,
    ) -> Result<Preflight, Error> {
        let sol_balance = self.chain.get_balance(&self.wallet).await?;

        // Provisional priority fee for the requirement check: the floor for
        // this side, since the real fee is not decided yet.
        let provisional_fee = match intent.side() {
            Side::Sell => cfg.min_priority_fee_lamports_exit,
            Side::Buy => cfg.min_priority_fee_lamports_entry,
        };
        let required = BASE_FEE_LAMPORTS
            + provisional_fee
            + ATA_RENT_LAMPORTS
            + SAFETY_BUFFER_LAMPORTS;
        if sol_balance < required {
            return Err(Error::InsufficientFunds {
                have: sol_balance,
                need: required,
            });
        }

        let max_usable = if intent.input_mint.is_sol() {
            sol_balance.saturating_sub(required)
        } else {
            let balance = self
                .chain
                .get_token_balance(&self.wallet, &intent.input_mint)
                .await?;
            balance.base_units.saturating_sub(DUST_BUFFER_BASE_UNITS)
        };

        let clamped_amount = intent.amount_base_units.min(max_usable);
        if clamped_amount == 0 {
            return Err(Error::InsufficientFunds {
                have: max_usable,
                need: intent.amount_base_units,
            });
        }

        Ok(Preflight {
            clamped_amount,
            sol_balance,
        })
    }

    fn terminal_for_error(
        &self,
        intent: &TradeIntent,
        now: DateTime<Utc>,
        error: Error,
        quote: Option<&Quote>,
        fee: Option<&FeeDecision>,
    ) -> TradeEvent {
        let status = match &error {
            Error::InsufficientFunds { .. } | Error::InsufficientToken { .. } => {
                TradeStatus::InsufficientFunds
            }
            Error::SimulationFailed { .. } => TradeStatus::SimulationFailed,
            _ => TradeStatus::Error,
        };
        warn!(
            input = %intent.input_mint,
            output = %intent.output_mint,
            reason = %error,
            status = status.as_str(),
            "swap terminated"
        );
        self.event(
            intent,
            now,
            status,
            None,
            error.reason_code(),
            quote,
            fee,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn event(
        &self,
        intent: &TradeIntent,
        now: DateTime<Utc>,
        status: TradeStatus,
        tx_sig: Option<String>,
        reason_code: String,
        quote: Option<&Quote>,
        fee: Option<&FeeDecision>,
    ) -> TradeEvent {
        let mut meta = intent.meta.clone();
        if let Some(q) = quote {
            meta["quote"] = serde_json::json!({
                "price_impact_pct": q.price_impact_pct,
                "route_legs": q.route_legs,
                "slippage_bps": q.slippage_bps,
            });
        }
        if let Some(f) = fee {
            meta["fee"] = serde_json::json!({
                "effective_ratio": f.effective_ratio,
                "reason_trail": f.reason_trail,
                "clamped_to_min": f.clamped_to_min,
                "clamped_to_max": f.clamped_to_max,
            });
        }
        TradeEvent {
            id: Uuid::new_v4(),
            timestamp: now,
            input_mint: intent.input_mint.clone(),
            output_mint: intent.output_mint.clone(),
            in_amount_base_units: quote.map(|q| q.in_amount).unwrap_or(0),
            out_amount_base_units: quote.map(|q| q.out_amount).unwrap_or(0),
            status,
            tx_sig,
            reason_code,
            fees_lamports: BASE_FEE_LAMPORTS,
            priority_fee_lamports: fee.map(|f| f.max_lamports).unwrap_or(0),
            realized_pnl_usd: None,
            meta,
        }
    }

    /// Sells are structurally logged on both sent and paper terminals so
    /// they can be audited even if downstream accounting fails.
    fn failsafe_sell_log(&self, intent: &TradeIntent, event: &TradeEvent) {
        if intent.side() == Side::Sell && event.status.is_fill() {
            warn!(
                marker = "SELL_EXECUTED",
                mint = %intent.input_mint,
                strategy = %intent.strategy_tag,
                in_amount = event.in_amount_base_units,
                out_amount = event.out_amount_base_units,
                reason_code = %event.reason_code,
                status = event.status.as_str(),
                "sell executed"
            );
        }
    }
}

fn notional_sol(intent: &TradeIntent, quote: &Quote) -> f64 {
    if intent.output_mint.is_sol() {
        quote.out_amount as f64 / 1e9
    } else if intent.input_mint.is_sol() {
        quote.in_amount as f64 / 1e9
    } else {
        0.0
    }
}
