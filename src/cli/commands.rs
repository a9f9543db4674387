//! Command implementations for the rotator CLI

use anyhow::{Context, Result};
use chrono::Utc;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bot::BotContext;
use crate::clients::aggregator::{AggregatorClient, HttpAggregatorClient, QuoteRequest};
use crate::clients::chain::{ChainClient, RpcChainClient};
use crate::clients::market_data::{HttpMarketDataProvider, MarketDataCache};
use crate::clients::signals::HttpSignalProducer;
use crate::config::store::ConfigStore;
use crate::config::{ExecutionMode, RuntimeConfig};
use crate::ledger::Ledger;
use crate::risk::{day_key, RiskCircuit};
use crate::storage::Database;
use crate::trading::SwapPipeline;
use crate::types::Mint;
use crate::universe::Universe;

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing environment variable {name}"))
}

fn load_keypair() -> Result<Keypair> {
    let raw = env_var("BOT_WALLET_PRIVATE_KEY")?;
    let bytes = bs58::decode(raw.trim())
        .into_vec()
        .context("BOT_WALLET_PRIVATE_KEY is not valid base58")?;
    Keypair::from_bytes(&bytes).context("BOT_WALLET_PRIVATE_KEY is not a valid keypair")
}

fn open_database() -> Result<Arc<Database>> {
    let path = std::env::var("DATABASE_URL").unwrap_or_else(|_| "rotator.db".to_string());
    let path = path.strip_prefix("sqlite://").unwrap_or(&path);
    Ok(Arc::new(Database::open(path)?))
}

struct Services {
    db: Arc<Database>,
    config_store: Arc<ConfigStore>,
    chain: Arc<RpcChainClient>,
    aggregator: Arc<HttpAggregatorClient>,
    market_data: Arc<MarketDataCache>,
    signals: Arc<HttpSignalProducer>,
}

fn build_services(base: RuntimeConfig) -> Result<Services> {
    let db = open_database()?;
    let config_store = Arc::new(ConfigStore::with_persisted_overrides(base, db.clone())?);
    let cfg = config_store.get();

    let rpc_url = env_var("SOLANA_RPC_URL")?;
    let aggregator_url = env_var("AGGREGATOR_BASE_URL")?;
    let market_url = env_var("MARKET_DATA_BASE_URL")?;
    let signal_url = env_var("SIGNAL_BASE_URL")?;

    Ok(Services {
        db,
        chain: Arc::new(RpcChainClient::new(rpc_url, cfg.rpc_timeout_ms)),
        aggregator: Arc::new(HttpAggregatorClient::new(aggregator_url, cfg.quote_timeout_ms)?),
        market_data: Arc::new(MarketDataCache::new(
            Arc::new(HttpMarketDataProvider::new(market_url, cfg.quote_timeout_ms)?),
            Duration::from_secs(cfg.market_data_ttl_secs),
        )),
        signals: Arc::new(HttpSignalProducer::new(signal_url, cfg.quote_timeout_ms)?),
        config_store,
    })
}

/// Start the rotation loop
pub async fn start(base: &RuntimeConfig, paper_override: bool) -> Result<()> {
    let mut base = base.clone();
    if paper_override {
        base.execution_mode = ExecutionMode::Paper;
    }
    let services = build_services(base)?;
    let cfg = services.config_store.get();

    let keypair = Arc::new(load_keypair()?);
    let wallet = keypair.pubkey();
    info!("wallet: {wallet}");
    info!("{}", cfg.masked_display());

    let signer = if cfg.execution_mode.is_live() {
        Some(keypair)
    } else {
        info!("paper mode: transactions are never built or sent");
        None
    };

    let pipeline = SwapPipeline::new(
        services.chain.clone(),
        services.aggregator.clone(),
        wallet,
        signer,
    );

    let ledger = Ledger::restore(services.db.clone())?;
    let universe = Universe::restore(services.db.clone())?;
    let now = Utc::now();
    let circuit = match services.db.load_risk_state(&day_key(now))? {
        Some(state) => {
            info!(day = %state.day_key, "risk state restored");
            RiskCircuit::from_state(state)
        }
        None => RiskCircuit::new(now, 0.0),
    };

    let mut bot = BotContext::new(
        services.config_store.clone(),
        services.chain,
        services.market_data,
        services.signals,
        pipeline,
        Some(services.db),
        wallet,
        ledger,
        universe,
        circuit,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, shutting down after current tick");
            signal_token.cancel();
        }
    });

    bot.run_loop(shutdown).await;
    Ok(())
}

/// Show current positions, P&L and risk state
pub async fn status(_base: &RuntimeConfig) -> Result<()> {
    let db = open_database()?;
    let positions = db.load_tracking()?;
    let now = Utc::now();

    println!("Positions ({}):", positions.len());
    for p in &positions {
        let pnl_pct = crate::math::pnl_pct(p.entry_price_usd, p.last_price_usd) * 100.0;
        println!(
            "  {} [{}] qty={:.4} entry=${:.6} last=${:.6} peak=${:.6} pnl={:+.2}% held={:.1}h",
            p.mint,
            p.slot_type.as_str(),
            p.total_tokens,
            p.entry_price_usd,
            p.last_price_usd,
            p.peak_price_usd,
            pnl_pct,
            p.hours_held(now),
        );
    }

    if let Some(state) = db.load_risk_state(&day_key(now))? {
        println!(
            "\nRisk [{}]: baseline=${:.2} equity=${:.2} drawdown={:.2}% turnover=${:.2} paused={}",
            state.day_key,
            state.baseline_equity_usd,
            state.current_equity_usd,
            state.drawdown_pct() * 100.0,
            state.turnover_usd,
            state.paused,
        );
        if let Some(reason) = &state.pause_reason {
            println!("  pause_reason: {reason}");
        }
    }

    let day_start = now - chrono::Duration::hours(24);
    let stats = db.daily_trade_stats(day_start, now)?;
    println!(
        "\nTrades (24h): {} total, {} wins, {} losses, win_rate={:.1}%, realized=${:+.2}",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.win_rate(),
        stats.realized_pnl_usd,
    );
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(base: &RuntimeConfig) -> Result<()> {
    println!("{}", base.masked_display());
    Ok(())
}

/// Check system health: database, chain RPC, aggregator
pub async fn health(base: &RuntimeConfig) -> Result<()> {
    let mut ok = true;

    match open_database() {
        Ok(_) => println!("database: OK"),
        Err(e) => {
            ok = false;
            println!("database: FAIL ({e})");
        }
    }

    if let Ok(rpc_url) = env_var("SOLANA_RPC_URL") {
        let chain = RpcChainClient::new(rpc_url, base.rpc_timeout_ms);
        let probe = load_keypair()
            .map(|k| k.pubkey())
            .unwrap_or_else(|_| solana_sdk::pubkey::Pubkey::new_unique());
        match chain.get_balance(&probe).await {
            Ok(lamports) => println!("chain rpc: OK (balance {lamports} lamports)"),
            Err(e) => {
                ok = false;
                println!("chain rpc: FAIL ({e})");
            }
        }
    } else {
        ok = false;
        println!("chain rpc: FAIL (SOLANA_RPC_URL not set)");
    }

    if let Ok(url) = env_var("AGGREGATOR_BASE_URL") {
        let aggregator = HttpAggregatorClient::new(url, base.quote_timeout_ms)?;
        // Canonical probe: 0.01 SOL to USDC
        let request = QuoteRequest {
            input_mint: Mint::sol(),
            output_mint: Mint::usdc(),
            amount_base_units: 10_000_000,
            slippage_bps: base.max_slippage_bps,
        };
        match aggregator.quote(&request).await {
            Ok(quote) => println!(
                "aggregator: OK (0.01 SOL -> {} USDC base units)",
                quote.out_amount
            ),
            Err(e) => {
                ok = false;
                println!("aggregator: FAIL ({e})");
            }
        }
    } else {
        ok = false;
        println!("aggregator: FAIL (AGGREGATOR_BASE_URL not set)");
    }

    if !ok {
        anyhow::bail!("one or more health checks failed");
    }
    Ok(())
}
