//! Tick orchestrator
//!
//! Drives one pass: sync -> rank -> decide -> execute. Exactly one tick runs
//! at a time; if a tick overruns its interval the next firing is skipped.
//! Upstream failures are recovered at the tick boundary and the loop moves
//! on; only a ledger invariant breach flips the process to read-only.

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::chain::{ChainClient, TokenBalance};
use crate::clients::market_data::{MarketDataCache, MarketSnapshot};
use crate::clients::signals::SignalProducer;
use crate::config::store::ConfigStore;
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::math::{base_units_to_ui, lamports_to_sol, round_usd, sol_to_lamports};
use crate::ranker::{self, CandidateInput, HeldInput, RankedItem};
use crate::risk::RiskCircuit;
use crate::rotation::{self, DecisionInputs, ReasonCode, RotationAction};
use crate::slots;
use crate::storage::Database;
use crate::trading::{SwapPipeline, TradeEvent, TradeIntent};
use crate::types::{Mint, PositionSource, Signal};
use crate::universe::Universe;

use super::telemetry::{TickSummary, TickTelemetry};

/// Price history kept per mint for momentum and the short moving average
const HISTORY_CAP: usize = 64;

/// How many trending rows the discovery feed is asked for
const TRENDING_LIMIT: usize = 25;

pub struct BotContext {
    pub config_store: Arc<ConfigStore>,
    pub chain: Arc<dyn ChainClient>,
    pub market_data: Arc<MarketDataCache>,
    pub signals: Arc<dyn SignalProducer>,
    pub pipeline: SwapPipeline,
    pub db: Option<Arc<Database>>,
    pub wallet: Pubkey,

    pub ledger: Ledger,
    pub universe: Universe,
    pub circuit: RiskCircuit,

    histories: HashMap<Mint, VecDeque<f64>>,
    ticks_observed: HashMap<Mint, u32>,
    /// Retry-ladder attempt per mint, bumped on failed swaps across ticks
    attempts: HashMap<Mint, u32>,
    last_sol_price_usd: f64,
    tick_seq: u64,
    /// Set after a ledger invariant breach: serve reads, stop trading
    read_only: bool,

    broadcast_tx: broadcast::Sender<TickSummary>,
}

impl BotContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_store: Arc<ConfigStore>,
        chain: Arc<dyn ChainClient>,
        market_data: Arc<MarketDataCache>,
        signals: Arc<dyn SignalProducer>,
        pipeline: SwapPipeline,
        db: Option<Arc<Database>>,
        wallet: Pubkey,
        ledger: Ledger,
        universe: Universe,
        circuit: RiskCircuit,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(64);
        Self {
            config_store,
            chain,
            market_data,
            signals,
            pipeline,
            db,
            wallet,
            ledger,
            universe,
            circuit,
            histories: HashMap::new(),
            ticks_observed: HashMap::new(),
            attempts: HashMap::new(),
            last_sol_price_usd: 0.0,
            tick_seq: 0,
            read_only: false,
            broadcast_tx,
        }
    }

    /// Observers subscribe here; the dashboard is out of scope but this
    /// channel is its contract.
    pub fn subscribe(&self) -> broadcast::Receiver<TickSummary> {
        self.broadcast_tx.subscribe()
    }

    /// Run ticks until cancelled. The interval is a floor, not a deadline.
    pub async fn run_loop(&mut self, shutdown: CancellationToken) {
        let loop_seconds = self.config_store.get().loop_seconds;
        let mut interval = tokio::time::interval(Duration::from_secs(loop_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("tick loop started: every {loop_seconds}s");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("tick loop shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            let cfg = self.config_store.get();
            let hard_deadline = Duration::from_secs(cfg.loop_seconds * 2);
            let now = Utc::now();
            match tokio::time::timeout(hard_deadline, self.run_tick(now)).await {
                Err(_) => {
                    // Outstanding reads were dropped with the future; no
                    // partial ledger mutation was committed past this point.
                    warn!(
                        deadline_ms = hard_deadline.as_millis() as u64,
                        "tick_timeout: hard deadline exceeded"
                    );
                }
                Ok(Err(e)) if e.is_fatal() => {
                    error!("fatal: {e}; trading paused, serving read-only");
                    self.dump_ledger_state();
                    self.read_only = true;
                }
                Ok(Err(e)) => {
                    warn!("tick failed, continuing next interval: {e}");
                }
                Ok(Ok(report)) => {
                    debug!(
                        tick = report.tick_seq,
                        action = %report.action,
                        duration_ms = report.duration_ms,
                        "tick complete"
                    );
                }
            }
        }
    }

    /// One tick, in order: heartbeat, wallet sync, position sync, signals,
    /// universe, rank, risk, decide, execute, persist, broadcast.
    pub async fn run_tick(&mut self, now: DateTime<Utc>) -> Result<TickTelemetry> {
        let started = std::time::Instant::now();
        self.tick_seq += 1;
        let cfg = self.config_store.get();

        // 1. Heartbeat
        if let Some(db) = &self.db {
            db.heartbeat(now)?;
        }

        // 2. Wallet sync: parallel external reads, joined before ranking
        let (sol_balance, holdings) = tokio::try_join!(
            self.chain.get_balance(&self.wallet),
            self.chain.get_token_holdings(&self.wallet),
        )?;
        let holdings: HashMap<Mint, TokenBalance> = holdings.into_iter().collect();

        // Market data for everything in sight
        let mut interest: Vec<Mint> = holdings.keys().cloned().collect();
        interest.extend(self.ledger.held_mints());
        interest.push(Mint::sol());
        interest.sort();
        interest.dedup();
        let snapshots = self.market_data.snapshots(&interest, now).await;

        if let Some(sol) = snapshots.get(&Mint::sol()) {
            if sol.price_usd > 0.0 {
                self.last_sol_price_usd = sol.price_usd;
            }
        }
        let sol_price = self.last_sol_price_usd;

        // 3. Position sync
        self.sync_positions(&cfg, &holdings, &snapshots, now)?;
        self.observe_histories(&snapshots);

        // 4. Signal read
        let held_mints = self.ledger.held_mints();
        let signal_map = match self.signals.signals(&held_mints).await {
            Ok(map) => map,
            Err(e) => {
                warn!("signal producer unavailable, ranking without: {e}");
                HashMap::new()
            }
        };

        // 5. Universe reconcile + candidate discovery
        let candidates = self.discover_candidates(&cfg, now).await;
        let candidate_map: HashMap<Mint, MarketSnapshot> = candidates
            .iter()
            .map(|c| (c.mint.clone(), c.clone()))
            .collect();
        self.observe_histories(&candidate_map);
        let candidate_mints: Vec<Mint> = candidates.iter().map(|c| c.mint.clone()).collect();
        self.universe.reconcile(
            held_mints.iter().cloned(),
            std::iter::empty(),
            candidate_mints.iter().cloned(),
        );
        let candidate_signals = match self.signals.signals(&candidate_mints).await {
            Ok(map) => map,
            Err(_) => HashMap::new(),
        };

        // 6. Rank
        let (ranked_held, quarantined_count) =
            self.rank_positions(&cfg, &holdings, &snapshots, &signal_map, now)?;
        let ranked_candidates =
            self.rank_candidates(&cfg, &candidates, &candidate_signals, now);

        // 7-8. Risk circuit (evaluated first so the decision ladder can
        // short-circuit on it)
        if self.circuit.roll_day_if_needed(now) {
            if let Some(db) = &self.db {
                let cutoff = now
                    - chrono::Duration::days(cfg.telemetry_retention_days as i64);
                db.prune_telemetry(cutoff)?;
            }
        }
        let equity = self.equity_usd(sol_balance, sol_price);
        self.circuit.observe_equity(equity);
        let pause_reason = self.circuit.evaluate(&cfg);
        if let Some(db) = &self.db {
            db.upsert_risk_state(self.circuit.state())?;
        }

        // Decide
        let whale_flows = HashMap::new();
        let decision = rotation::decide(
            &cfg,
            &DecisionInputs {
                held: &ranked_held,
                candidates: &ranked_candidates,
                circuit_paused: pause_reason.clone(),
                whale_flows: &whale_flows,
                now,
                tick_seq: self.tick_seq,
            },
        );
        if let (Some(db), Some(log)) = (&self.db, &decision.log) {
            db.insert_rotation_log(log)?;
        }

        // 9. Execute the single selected action
        let (action_name, reason_code) = if self.read_only {
            ("read_only".to_string(), None)
        } else {
            self.execute_action(&cfg, &decision.action, &holdings, &snapshots, sol_balance, sol_price, now)
                .await?
        };

        // 10-11. Telemetry + broadcast
        let row = TickTelemetry {
            ts: now,
            tick_seq: self.tick_seq,
            equity_usd: equity,
            sol_balance_lamports: sol_balance,
            positions: ranked_held.len(),
            candidates: ranked_candidates.len(),
            action: action_name,
            reason_code,
            paused: pause_reason.is_some(),
            quarantined: quarantined_count,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Some(db) = &self.db {
            db.insert_tick_telemetry(&row)?;
        }
        let _ = self.broadcast_tx.send(TickSummary::from(&row));
        Ok(row)
    }

    /// For every wallet holding above threshold ensure tracking exists; drop
    /// dust; never touch sniper positions.
    fn sync_positions(
        &mut self,
        cfg: &RuntimeConfig,
        holdings: &HashMap<Mint, TokenBalance>,
        snapshots: &HashMap<Mint, MarketSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for (mint, balance) in holdings {
            if mint.is_sol() || mint.is_usdc() {
                continue;
            }
            let Some(snapshot) = snapshots.get(mint) else {
                continue;
            };
            let qty_ui = base_units_to_ui(balance.base_units, balance.decimals);
            let value_usd = qty_ui * snapshot.price_usd;

            let tracked_source = self.ledger.tracking(mint).map(|row| row.source);
            match tracked_source {
                Some(PositionSource::Sniper) => continue,
                Some(_) => {
                    self.ledger.sync_wallet_quantity(mint, qty_ui)?;
                    self.ledger.observe_price(mint, snapshot.price_usd)?;
                }
                None => {
                    if slots::above_tracking_threshold(value_usd, cfg) {
                        self.ledger.wallet_discovery_ingest(
                            mint,
                            qty_ui,
                            snapshot.price_usd,
                            None,
                            now,
                        )?;
                    }
                }
            }
        }

        // Dust classification on tracked rows
        for position in self.ledger.positions() {
            if slots::is_dust(&position, cfg) {
                info!(mint = %position.mint, value = position.market_value_usd(), "dust removed");
                self.ledger.full_exit(&position.mint)?;
            }
        }

        self.ledger.verify_integrity()?;
        Ok(())
    }

    fn observe_histories(&mut self, snapshots: &HashMap<Mint, MarketSnapshot>) {
        for (mint, snapshot) in snapshots {
            if snapshot.is_stale {
                continue;
            }
            let history = self.histories.entry(mint.clone()).or_default();
            history.push_back(snapshot.price_usd);
            while history.len() > HISTORY_CAP {
                history.pop_front();
            }
            *self.ticks_observed.entry(mint.clone()).or_insert(0) += 1;
        }
    }

    /// Pull the discovery feed and admit what is not cooling down
    async fn discover_candidates(
        &mut self,
        cfg: &RuntimeConfig,
        now: DateTime<Utc>,
    ) -> Vec<MarketSnapshot> {
        let trending = match self.market_data.trending(TRENDING_LIMIT).await {
            Ok(list) => list,
            Err(e) => {
                warn!("trending feed unavailable: {e}");
                return Vec::new();
            }
        };
        let mut admitted = Vec::new();
        for snapshot in trending {
            if self.ledger.is_held(&snapshot.mint) {
                continue;
            }
            if snapshot.liquidity_usd < cfg.scanner_min_liquidity {
                continue;
            }
            match self.universe.admit(&snapshot.mint, now) {
                Ok(()) => admitted.push(snapshot),
                Err(Error::UniverseCooldown(_)) => {
                    debug!(mint = %snapshot.mint, "candidate denied: in_cooldown");
                }
                Err(e) => warn!("candidate admission failed: {e}"),
            }
        }
        admitted
    }

    fn rank_positions(
        &mut self,
        cfg: &RuntimeConfig,
        holdings: &HashMap<Mint, TokenBalance>,
        snapshots: &HashMap<Mint, MarketSnapshot>,
        signal_map: &HashMap<Mint, Signal>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<RankedItem>, usize)> {
        let mut ranked = Vec::new();
        let mut quarantined = 0;
        let empty: Vec<f64> = Vec::new();

        for tracking in self.ledger.positions() {
            if tracking.source == PositionSource::Sniper {
                continue;
            }
            let mint = tracking.mint.clone();
            let wallet_qty = holdings
                .get(&mint)
                .map(|b| base_units_to_ui(b.base_units, b.decimals))
                .unwrap_or(0.0);
            let current_price = snapshots
                .get(&mint)
                .map(|s| s.price_usd)
                .unwrap_or(tracking.last_price_usd);

            let coverage = self.ledger.coverage(&mint, wallet_qty, current_price);
            if coverage.schedule_removal {
                // Wallet shows zero: close out, no decision for this mint
                info!(mint = %mint, "wallet zero, closing position");
                self.ledger.full_exit(&mint)?;
                continue;
            }
            if coverage.quarantined {
                quarantined += 1;
            }

            let history: Vec<f64> = self
                .histories
                .get(&mint)
                .map(|h| h.iter().copied().collect())
                .unwrap_or_else(|| empty.clone());
            let item = ranker::rank_held(
                cfg,
                &HeldInput {
                    tracking: &tracking,
                    coverage: &coverage,
                    signal: signal_map.get(&mint).copied().unwrap_or_default(),
                    market: snapshots.get(&mint),
                    history: &history,
                    ticks_observed: self.ticks_observed.get(&mint).copied().unwrap_or(0),
                },
                now,
            );
            ranked.push(item);
        }
        Ok((ranked, quarantined))
    }

    fn rank_candidates(
        &self,
        cfg: &RuntimeConfig,
        candidates: &[MarketSnapshot],
        signal_map: &HashMap<Mint, Signal>,
        now: DateTime<Utc>,
    ) -> Vec<RankedItem> {
        let empty: Vec<f64> = Vec::new();
        candidates
            .iter()
            .filter_map(|snapshot| {
                let history: Vec<f64> = self
                    .histories
                    .get(&snapshot.mint)
                    .map(|h| h.iter().copied().collect())
                    .unwrap_or_else(|| empty.clone());
                ranker::rank_candidate(
                    cfg,
                    &CandidateInput {
                        mint: snapshot.mint.clone(),
                        signal: signal_map.get(&snapshot.mint).copied().unwrap_or_default(),
                        market: snapshot,
                        history: &history,
                        ticks_observed: self
                            .ticks_observed
                            .get(&snapshot.mint)
                            .copied()
                            .unwrap_or(0),
                    },
                    now,
                )
            })
            .collect()
    }

    fn equity_usd(&self, sol_balance: u64, sol_price: f64) -> f64 {
        let sol_value = lamports_to_sol(sol_balance) * sol_price;
        let positions_value: f64 = self
            .ledger
            .positions()
            .iter()
            .filter(|p| p.source != PositionSource::Sniper)
            .map(|p| p.market_value_usd())
            .sum();
        round_usd(sol_value + positions_value)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_action(
        &mut self,
        cfg: &RuntimeConfig,
        action: &RotationAction,
        holdings: &HashMap<Mint, TokenBalance>,
        snapshots: &HashMap<Mint, MarketSnapshot>,
        sol_balance: u64,
        sol_price: f64,
        now: DateTime<Utc>,
    ) -> Result<(String, Option<String>)> {
        match action {
            RotationAction::Hold => Ok(("hold".into(), None)),
            RotationAction::Pause { reason } => {
                info!(reason = %reason, "tick paused by risk circuit");
                Ok(("pause".into(), Some(reason.clone())))
            }
            RotationAction::Promote { mint } => {
                let price = snapshots
                    .get(mint)
                    .map(|s| s.price_usd)
                    .or_else(|| self.ledger.tracking(mint).map(|t| t.last_price_usd))
                    .unwrap_or(0.0);
                self.ledger.promote_to_core(mint, price)?;
                Ok(("promotion".into(), Some(ReasonCode::Promotion.as_str().into())))
            }
            RotationAction::Exit { mint, reason } => {
                self.execute_exit(cfg, mint, *reason, holdings, snapshots, sol_price, now)
                    .await?;
                Ok(("exit".into(), Some(reason.as_str().into())))
            }
            RotationAction::Rotate {
                sell,
                buy,
                reason,
                ..
            } => {
                // Sequential: the sell leg must land before the buy leg
                let sold = self
                    .execute_exit(cfg, sell, *reason, holdings, snapshots, sol_price, now)
                    .await?;
                if sold {
                    self.execute_scout_buy(cfg, buy, *reason, sol_balance, sol_price, now)
                        .await?;
                }
                Ok(("rotation".into(), Some(reason.as_str().into())))
            }
        }
    }

    /// Sell a held position in full. Returns true when the sell filled.
    #[allow(clippy::too_many_arguments)]
    async fn execute_exit(
        &mut self,
        cfg: &RuntimeConfig,
        mint: &Mint,
        reason: ReasonCode,
        holdings: &HashMap<Mint, TokenBalance>,
        snapshots: &HashMap<Mint, MarketSnapshot>,
        sol_price: f64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(balance) = holdings.get(mint).copied() else {
            warn!(mint = %mint, "exit requested but no wallet balance");
            return Ok(false);
        };
        let tracking = self.ledger.tracking(mint).cloned();
        let slot_tag = tracking
            .as_ref()
            .map(|t| t.slot_type.as_str())
            .unwrap_or("scout");
        let attempt = self.attempts.get(mint).copied().unwrap_or(0) + 1;

        let intent = TradeIntent {
            input_mint: mint.clone(),
            output_mint: Mint::sol(),
            amount_base_units: balance.base_units,
            strategy_tag: format!("{slot_tag}_{}", reason.as_str()),
            reason_code: reason.as_str().to_string(),
            is_usdc_to_sol: mint.is_usdc(),
            attempt,
            meta: serde_json::json!({ "lane": slot_tag }),
        };

        let mut event = self.pipeline.execute(&intent, cfg, now).await;
        if event.status.is_fill() {
            let qty_ui = base_units_to_ui(event.in_amount_base_units, balance.decimals);
            let proceeds_usd =
                round_usd(lamports_to_sol(event.out_amount_base_units) * sol_price);
            let outcome = self.ledger.record_sell(mint, qty_ui, proceeds_usd, now)?;
            event.realized_pnl_usd = Some(outcome.realized_pnl_usd);
            self.circuit.add_turnover(proceeds_usd);

            let snapshot = snapshots.get(mint);
            self.ledger.full_exit(mint)?;
            self.universe.record_exit(
                mint,
                reason.as_str(),
                snapshot.map(|s| s.price_usd).unwrap_or(0.0),
                0.0,
                snapshot.map(|s| s.liquidity_usd).unwrap_or(0.0),
                cfg.scout_token_cooldown_hours,
                now,
            )?;
            self.attempts.remove(mint);
        } else {
            self.attempts.insert(mint.clone(), attempt);
        }
        self.record_trade(&event)?;
        Ok(event.status.is_fill())
    }

    /// Buy a replacement scout position with sized SOL notional
    async fn execute_scout_buy(
        &mut self,
        cfg: &RuntimeConfig,
        mint: &Mint,
        reason: ReasonCode,
        sol_balance: u64,
        sol_price: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ticks = self.ticks_observed.get(mint).copied().unwrap_or(0);
        let size_sol = self.scout_size_sol(cfg, sol_balance, sol_price, ticks);
        if size_sol <= 0.0 {
            warn!(mint = %mint, "scout buy skipped: no sizeable notional");
            return Ok(());
        }
        let attempt = self.attempts.get(mint).copied().unwrap_or(0) + 1;
        let intent = TradeIntent {
            input_mint: Mint::sol(),
            output_mint: mint.clone(),
            amount_base_units: sol_to_lamports(size_sol),
            strategy_tag: format!("scout_entry_{}", reason.as_str()),
            reason_code: reason.as_str().to_string(),
            is_usdc_to_sol: false,
            attempt,
            meta: serde_json::json!({ "lane": "scout" }),
        };

        let event = self.pipeline.execute(&intent, cfg, now).await;
        if event.status.is_fill() {
            let decimals = self
                .chain
                .get_mint_decimals(mint)
                .await
                .unwrap_or(crate::types::FALLBACK_DECIMALS);
            let qty_ui = base_units_to_ui(event.out_amount_base_units, decimals);
            let usd_value =
                round_usd(lamports_to_sol(event.in_amount_base_units) * sol_price);
            if qty_ui > 0.0 {
                let unit_price = usd_value / qty_ui;
                self.ledger.record_buy(
                    mint,
                    qty_ui,
                    usd_value,
                    unit_price,
                    PositionSource::Bot,
                    now,
                )?;
                self.circuit.add_turnover(usd_value);
            }
            self.attempts.remove(mint);
        } else {
            self.attempts.insert(mint.clone(), attempt);
        }
        self.record_trade(&event)?;
        Ok(())
    }

    /// Scout notional: equity-scaled USD size clamped to config bounds,
    /// ramped down for mints with a thin observation history, then bounded
    /// by the per-swap cap and the SOL reserve
    fn scout_size_sol(
        &self,
        cfg: &RuntimeConfig,
        sol_balance: u64,
        sol_price: f64,
        ticks_observed: u32,
    ) -> f64 {
        if sol_price <= 0.0 {
            return 0.0;
        }
        let equity = self.circuit.state().current_equity_usd;
        let mut scaled_usd = (cfg.cap_scout_size_base_usd * equity
            / cfg.cap_scout_size_base_equity)
            .clamp(cfg.cap_scout_size_min_usd, cfg.cap_scout_size_max_usd);
        if equity > 0.0 {
            let target_weight = scaled_usd / equity;
            scaled_usd = ranker::allocation_scale(cfg, target_weight, ticks_observed) * equity;
        }
        let size_sol = (scaled_usd / sol_price)
            .min(cfg.scout_buy_sol)
            .min(cfg.max_single_swap_sol);
        let available = lamports_to_sol(sol_balance) - cfg.min_sol_reserve;
        size_sol.min(available).max(0.0)
    }

    fn record_trade(&self, event: &TradeEvent) -> Result<()> {
        if let Some(db) = &self.db {
            db.insert_trade(event)?;
        }
        Ok(())
    }

    /// Full lot dump on an invariant breach, for the post-mortem
    fn dump_ledger_state(&self) {
        for position in self.ledger.positions() {
            error!(
                mint = %position.mint,
                total_tokens = position.total_tokens,
                entry = position.entry_price_usd,
                slot = position.slot_type.as_str(),
                "ledger dump: tracking row"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::aggregator::{AggregatorClient, BuiltSwap, Quote, QuoteRequest};
    use crate::clients::chain::SimulationOutcome;
    use crate::clients::market_data::MarketDataProvider;
    use crate::fees::PriorityLevel;
    use crate::risk::RiskCircuit;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;

    fn token() -> Mint {
        Mint::new_unchecked("TickMint1111111111111111111111111111111111")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    struct StubChain {
        sol_balance: u64,
        holdings: Mutex<Vec<(Mint, TokenBalance)>>,
    }

    #[async_trait]
    impl ChainClient for StubChain {
        async fn get_balance(&self, _owner: &Pubkey) -> crate::error::Result<u64> {
            Ok(self.sol_balance)
        }

        async fn get_token_balance(
            &self,
            _owner: &Pubkey,
            mint: &Mint,
        ) -> crate::error::Result<TokenBalance> {
            Ok(self
                .holdings
                .lock()
                .iter()
                .find(|(m, _)| m == mint)
                .map(|(_, b)| *b)
                .unwrap_or(TokenBalance {
                    base_units: 0,
                    decimals: 6,
                }))
        }

        async fn get_token_holdings(
            &self,
            _owner: &Pubkey,
        ) -> crate::error::Result<Vec<(Mint, TokenBalance)>> {
            Ok(self.holdings.lock().clone())
        }

        async fn get_mint_decimals(&self, _mint: &Mint) -> crate::error::Result<u8> {
            Ok(6)
        }

        async fn simulate_transaction(
            &self,
            _tx: &VersionedTransaction,
        ) -> crate::error::Result<SimulationOutcome> {
            Ok(SimulationOutcome {
                err: None,
                custom_error_code: None,
                logs: vec![],
                units_consumed: Some(1),
            })
        }

        async fn send_versioned_transaction(
            &self,
            _tx: &VersionedTransaction,
        ) -> crate::error::Result<Signature> {
            panic!("paper tests must not send");
        }
    }

    struct StubAggregator;

    #[async_trait]
    impl AggregatorClient for StubAggregator {
        async fn quote(&self, request: &QuoteRequest) -> crate::error::Result<Quote> {
            // 100 token base units -> 1 lamport keeps numbers readable
            Ok(Quote {
                input_mint: request.input_mint.clone(),
                output_mint: request.output_mint.clone(),
                in_amount: request.amount_base_units,
                out_amount: request.amount_base_units / 100,
                price_impact_pct: 0.001,
                slippage_bps: request.slippage_bps,
                route_legs: 1,
                raw: serde_json::json!({}),
            })
        }

        async fn swap_tx(
            &self,
            _quote: &Quote,
            _user: &Pubkey,
            _priority_level: PriorityLevel,
            _max_lamports: u64,
        ) -> crate::error::Result<BuiltSwap> {
            Err(Error::UpstreamUnavailable("paper only".into()))
        }
    }

    struct StubMarket {
        price: Mutex<f64>,
    }

    #[async_trait]
    impl MarketDataProvider for StubMarket {
        async fn fetch(
            &self,
            mints: &[Mint],
        ) -> crate::error::Result<HashMap<Mint, MarketSnapshot>> {
            let price = *self.price.lock();
            Ok(mints
                .iter()
                .map(|m| {
                    let p = if m.is_sol() { 150.0 } else { price };
                    (
                        m.clone(),
                        MarketSnapshot {
                            mint: m.clone(),
                            price_usd: p,
                            liquidity_usd: 500_000.0,
                            volume_24h_usd: 100_000.0,
                            price_change_24h: 0.1,
                            holders: 900,
                            scanner_score: 0.0,
                            is_new_listing: false,
                            fetched_at: Utc::now(),
                            is_stale: false,
                        },
                    )
                })
                .collect())
        }

        async fn trending(&self, _limit: usize) -> crate::error::Result<Vec<MarketSnapshot>> {
            Ok(vec![])
        }
    }

    struct StubSignals;

    #[async_trait]
    impl SignalProducer for StubSignals {
        async fn signals(
            &self,
            mints: &[Mint],
        ) -> crate::error::Result<HashMap<Mint, Signal>> {
            Ok(mints
                .iter()
                .map(|m| (m.clone(), Signal::default()))
                .collect())
        }
    }

    fn context(price: f64, holdings: Vec<(Mint, TokenBalance)>) -> BotContext {
        let chain = Arc::new(StubChain {
            sol_balance: 10_000_000_000,
            holdings: Mutex::new(holdings),
        });
        let aggregator = Arc::new(StubAggregator);
        let market = Arc::new(MarketDataCache::new(
            Arc::new(StubMarket {
                price: Mutex::new(price),
            }),
            Duration::from_secs(0),
        ));
        let wallet = Pubkey::new_unique();
        let pipeline = SwapPipeline::new(chain.clone(), aggregator, wallet, None);
        let db = Arc::new(Database::open_in_memory().unwrap());
        BotContext::new(
            Arc::new(ConfigStore::new(RuntimeConfig::default(), None)),
            chain,
            market,
            Arc::new(StubSignals),
            pipeline,
            Some(db),
            wallet,
            Ledger::new(None),
            Universe::new(None),
            RiskCircuit::new(at(0), 0.0),
        )
    }

    #[tokio::test]
    async fn test_wallet_discovery_creates_tracking() {
        let holdings = vec![(
            token(),
            TokenBalance {
                base_units: 100_000_000, // 100 tokens at 6 decimals
                decimals: 6,
            },
        )];
        let mut ctx = context(0.5, holdings);
        let report = ctx.run_tick(at(100)).await.unwrap();
        assert_eq!(report.positions, 1);
        let row = ctx.ledger.tracking(&token()).unwrap();
        assert_eq!(row.source, PositionSource::WalletDiscovery);
        assert_eq!(row.entry_price_usd, 0.5);
    }

    #[tokio::test]
    async fn test_trailing_stop_exit_end_to_end() {
        // Core-shaped seed: entry 0.55, peak 1.00, current 0.88 (= peak * 0.88),
        // pnl 60% >= 50% threshold so the tight 12% trail is in force.
        let holdings = vec![(
            token(),
            TokenBalance {
                base_units: 100_000_000,
                decimals: 6,
            },
        )];
        let mut ctx = context(0.88, holdings);
        ctx.ledger
            .record_buy(&token(), 100.0, 55.0, 0.55, PositionSource::Bot, at(0))
            .unwrap();
        ctx.ledger.observe_price(&token(), 1.00).unwrap();

        let report = ctx.run_tick(at(3_600)).await.unwrap();
        assert_eq!(report.action, "exit");
        assert_eq!(report.reason_code.as_deref(), Some("trailing_stop_exit"));

        // Position removed, cooldown cache entry written
        assert!(ctx.ledger.tracking(&token()).is_none());
        let entry = ctx.universe.cache_entry(&token()).unwrap();
        assert_eq!(entry.last_exit_reason, "trailing_stop_exit");
        let cooldown_hours = RuntimeConfig::default().scout_token_cooldown_hours;
        assert_eq!(
            entry.cooldown_until,
            at(3_600) + chrono::Duration::seconds((cooldown_hours * 3600.0) as i64)
        );
    }

    #[tokio::test]
    async fn test_dust_position_removed() {
        let holdings = vec![(
            token(),
            TokenBalance {
                base_units: 1_000_000, // 1 token worth $0.50: dust
                decimals: 6,
            },
        )];
        let mut ctx = context(0.5, holdings);
        ctx.ledger
            .record_buy(&token(), 1.0, 0.5, 0.5, PositionSource::Bot, at(0))
            .unwrap();
        let report = ctx.run_tick(at(100)).await.unwrap();
        assert_eq!(report.positions, 0);
        assert!(ctx.ledger.tracking(&token()).is_none());
    }

    #[tokio::test]
    async fn test_sniper_positions_skipped() {
        let holdings = vec![(
            token(),
            TokenBalance {
                base_units: 100_000_000,
                decimals: 6,
            },
        )];
        let mut ctx = context(0.5, holdings);
        ctx.ledger
            .record_buy(&token(), 100.0, 50.0, 0.5, PositionSource::Sniper, at(0))
            .unwrap();
        let report = ctx.run_tick(at(100)).await.unwrap();
        // Sniper position is not ranked
        assert_eq!(report.positions, 0);
        assert!(ctx.ledger.tracking(&token()).is_some());
    }

    #[tokio::test]
    async fn test_circuit_pause_blocks_execution() {
        let holdings = vec![(
            token(),
            TokenBalance {
                base_units: 100_000_000,
                decimals: 6,
            },
        )];
        let mut ctx = context(0.88, holdings);
        ctx.ledger
            .record_buy(&token(), 100.0, 55.0, 0.55, PositionSource::Bot, at(0))
            .unwrap();
        ctx.ledger.observe_price(&token(), 1.00).unwrap();

        // Trip the circuit before the tick
        ctx.circuit = RiskCircuit::new(at(0), 100_000.0);
        ctx.circuit.observe_equity(90_000.0);
        ctx.circuit
            .evaluate(&RuntimeConfig::default())
            .expect("tripped");

        let report = ctx.run_tick(at(3_600)).await.unwrap();
        assert_eq!(report.action, "pause");
        assert!(report.paused);
        // Trailing-stop exit did NOT run
        assert!(ctx.ledger.tracking(&token()).is_some());
    }

    #[tokio::test]
    async fn test_tick_seq_monotonic() {
        let mut ctx = context(1.0, vec![]);
        let a = ctx.run_tick(at(100)).await.unwrap();
        let b = ctx.run_tick(at(200)).await.unwrap();
        assert_eq!(a.tick_seq + 1, b.tick_seq);
    }
}
