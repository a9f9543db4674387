//! Durable storage
//!
//! SQLite in WAL mode behind one connection. All writes happen on the tick
//! task, so a plain mutex serializes access without contention. The in-memory
//! ledger is authoritative; these tables are its write-through and the
//! process's restart state.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bot::telemetry::TickTelemetry;
use crate::error::{Error, Result};
use crate::ledger::{Lot, PositionTracking};
use crate::risk::RiskState;
use crate::rotation::RotationLogEntry;
use crate::trading::TradeEvent;
use crate::types::{Mint, PositionSource, SlotType};
use crate::universe::ExitedTokenCacheEntry;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS lots (
    id TEXT PRIMARY KEY,
    mint TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    quantity_remaining REAL NOT NULL,
    quantity_original REAL NOT NULL,
    unit_cost_usd REAL NOT NULL,
    source TEXT NOT NULL,
    closed INTEGER NOT NULL DEFAULT 0
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_lots_mint_open ON lots(mint, closed, acquired_at);

CREATE TABLE IF NOT EXISTS position_tracking (
    mint TEXT PRIMARY KEY,
    entry_time INTEGER NOT NULL,
    entry_price_usd REAL NOT NULL,
    total_tokens REAL NOT NULL,
    last_price_usd REAL NOT NULL,
    peak_price_usd REAL NOT NULL,
    slot_type TEXT NOT NULL,
    source TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    input_mint TEXT NOT NULL,
    output_mint TEXT NOT NULL,
    in_amount_base_units INTEGER NOT NULL,
    out_amount_base_units INTEGER NOT NULL,
    status TEXT NOT NULL,
    tx_sig TEXT UNIQUE,
    reason_code TEXT NOT NULL,
    fees_lamports INTEGER NOT NULL,
    priority_fee_lamports INTEGER NOT NULL,
    realized_pnl_usd REAL,
    meta TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_trades_ts ON trades(timestamp DESC);

CREATE TABLE IF NOT EXISTS rotation_log (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    tick_seq INTEGER NOT NULL,
    action TEXT NOT NULL,
    sell_mint TEXT,
    buy_mint TEXT,
    reason_code TEXT NOT NULL,
    rank_delta REAL,
    meta TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_rotation_ts ON rotation_log(timestamp DESC);

CREATE TABLE IF NOT EXISTS exited_token_cache (
    mint TEXT PRIMARY KEY,
    last_exit_time INTEGER NOT NULL,
    last_exit_reason TEXT NOT NULL,
    cooldown_until INTEGER NOT NULL,
    times_reentered INTEGER NOT NULL DEFAULT 0,
    last_known_price REAL NOT NULL,
    last_known_signal REAL NOT NULL,
    last_known_liquidity REAL NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS risk_state (
    day_key TEXT PRIMARY KEY,
    baseline_equity_usd REAL NOT NULL,
    current_equity_usd REAL NOT NULL,
    turnover_usd REAL NOT NULL,
    paused INTEGER NOT NULL DEFAULT 0,
    pause_reason TEXT
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS tick_telemetry (
    ts INTEGER PRIMARY KEY,
    tick_seq INTEGER NOT NULL,
    equity_usd REAL NOT NULL,
    sol_balance_lamports INTEGER NOT NULL,
    positions INTEGER NOT NULL,
    candidates INTEGER NOT NULL,
    action TEXT NOT NULL,
    reason_code TEXT,
    paused INTEGER NOT NULL DEFAULT 0,
    quarantined INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL
);
"#;

/// Win/loss aggregation over one day's trades
#[derive(Debug, Clone, Default)]
pub struct DailyTradeStats {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub realized_pnl_usd: f64,
}

impl DailyTradeStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }
}

pub struct Database {
    conn: Mutex<Connection>,
}

fn ts_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!("Database opened at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- lots ---

    pub fn upsert_lot(&self, lot: &Lot) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO lots (id, mint, acquired_at, quantity_remaining, quantity_original,
                               unit_cost_usd, source, closed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
               quantity_remaining = excluded.quantity_remaining,
               closed = excluded.closed",
            params![
                lot.id.to_string(),
                lot.mint.as_str(),
                ts_millis(lot.acquired_at),
                lot.quantity_remaining,
                lot.quantity_original,
                lot.unit_cost_usd,
                lot.source.as_str(),
                lot.closed as i64,
            ],
        )?;
        Ok(())
    }

    pub fn load_open_lots(&self) -> Result<Vec<Lot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, mint, acquired_at, quantity_remaining, quantity_original,
                    unit_cost_usd, source, closed
             FROM lots WHERE closed = 0 ORDER BY acquired_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut lots = Vec::new();
        for row in rows {
            let (id, mint, acquired_at, remaining, original, cost, source, closed) = row?;
            lots.push(Lot {
                id: Uuid::from_str(&id).map_err(|e| Error::Persistence(e.to_string()))?,
                mint: Mint::new_unchecked(mint),
                acquired_at: from_millis(acquired_at),
                quantity_remaining: remaining,
                quantity_original: original,
                unit_cost_usd: cost,
                source: PositionSource::from_str(&source)?,
                closed: closed != 0,
            });
        }
        Ok(lots)
    }

    // --- position tracking ---

    pub fn upsert_tracking(&self, row: &PositionTracking) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO position_tracking
               (mint, entry_time, entry_price_usd, total_tokens, last_price_usd,
                peak_price_usd, slot_type, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(mint) DO UPDATE SET
               entry_time = excluded.entry_time,
               entry_price_usd = excluded.entry_price_usd,
               total_tokens = excluded.total_tokens,
               last_price_usd = excluded.last_price_usd,
               peak_price_usd = excluded.peak_price_usd,
               slot_type = excluded.slot_type,
               source = excluded.source",
            params![
                row.mint.as_str(),
                ts_millis(row.entry_time),
                row.entry_price_usd,
                row.total_tokens,
                row.last_price_usd,
                row.peak_price_usd,
                row.slot_type.as_str(),
                row.source.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_tracking(&self, mint: &Mint) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM position_tracking WHERE mint = ?1",
            params![mint.as_str()],
        )?;
        Ok(())
    }

    pub fn load_tracking(&self) -> Result<Vec<PositionTracking>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT mint, entry_time, entry_price_usd, total_tokens, last_price_usd,
                    peak_price_usd, slot_type, source
             FROM position_tracking",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mint, entry_time, entry_price, total, last, peak, slot, source) = row?;
            out.push(PositionTracking {
                mint: Mint::new_unchecked(mint),
                entry_time: from_millis(entry_time),
                entry_price_usd: entry_price,
                total_tokens: total,
                last_price_usd: last,
                peak_price_usd: peak,
                slot_type: SlotType::from_str(&slot)?,
                source: PositionSource::from_str(&source)?,
            });
        }
        Ok(out)
    }

    // --- trades ---

    pub fn insert_trade(&self, event: &TradeEvent) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO trades
               (id, timestamp, input_mint, output_mint, in_amount_base_units,
                out_amount_base_units, status, tx_sig, reason_code, fees_lamports,
                priority_fee_lamports, realized_pnl_usd, meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                event.id.to_string(),
                ts_millis(event.timestamp),
                event.input_mint.as_str(),
                event.output_mint.as_str(),
                event.in_amount_base_units as i64,
                event.out_amount_base_units as i64,
                event.status.as_str(),
                event.tx_sig,
                event.reason_code,
                event.fees_lamports as i64,
                event.priority_fee_lamports as i64,
                event.realized_pnl_usd,
                event.meta.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn daily_trade_stats(&self, day_start: DateTime<Utc>, day_end: DateTime<Utc>) -> Result<DailyTradeStats> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT realized_pnl_usd FROM trades
             WHERE timestamp >= ?1 AND timestamp < ?2
               AND status IN ('sent', 'paper')
               AND realized_pnl_usd IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![ts_millis(day_start), ts_millis(day_end)], |row| {
            row.get::<_, f64>(0)
        })?;

        let mut stats = DailyTradeStats::default();
        for pnl in rows {
            let pnl = pnl?;
            stats.total_trades += 1;
            if pnl >= 0.0 {
                stats.winning_trades += 1;
            } else {
                stats.losing_trades += 1;
            }
            stats.realized_pnl_usd += pnl;
        }
        Ok(stats)
    }

    // --- rotation log ---

    pub fn insert_rotation_log(&self, entry: &RotationLogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rotation_log
               (id, timestamp, tick_seq, action, sell_mint, buy_mint, reason_code,
                rank_delta, meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.to_string(),
                ts_millis(entry.timestamp),
                entry.tick_seq as i64,
                entry.action,
                entry.sell_mint.as_ref().map(|m| m.as_str().to_string()),
                entry.buy_mint.as_ref().map(|m| m.as_str().to_string()),
                entry.reason_code,
                entry.rank_delta,
                entry.meta.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn rotation_log_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM rotation_log", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    // --- exited token cache ---

    pub fn upsert_exited_cache(&self, entry: &ExitedTokenCacheEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO exited_token_cache
               (mint, last_exit_time, last_exit_reason, cooldown_until, times_reentered,
                last_known_price, last_known_signal, last_known_liquidity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(mint) DO UPDATE SET
               last_exit_time = excluded.last_exit_time,
               last_exit_reason = excluded.last_exit_reason,
               cooldown_until = excluded.cooldown_until,
               times_reentered = excluded.times_reentered,
               last_known_price = excluded.last_known_price,
               last_known_signal = excluded.last_known_signal,
               last_known_liquidity = excluded.last_known_liquidity",
            params![
                entry.mint.as_str(),
                ts_millis(entry.last_exit_time),
                entry.last_exit_reason,
                ts_millis(entry.cooldown_until),
                entry.times_reentered as i64,
                entry.last_known_price,
                entry.last_known_signal,
                entry.last_known_liquidity,
            ],
        )?;
        Ok(())
    }

    pub fn load_exited_cache(&self) -> Result<Vec<ExitedTokenCacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT mint, last_exit_time, last_exit_reason, cooldown_until, times_reentered,
                    last_known_price, last_known_signal, last_known_liquidity
             FROM exited_token_cache",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ExitedTokenCacheEntry {
                mint: Mint::new_unchecked(row.get::<_, String>(0)?),
                last_exit_time: from_millis(row.get::<_, i64>(1)?),
                last_exit_reason: row.get::<_, String>(2)?,
                cooldown_until: from_millis(row.get::<_, i64>(3)?),
                times_reentered: row.get::<_, i64>(4)? as u32,
                last_known_price: row.get::<_, f64>(5)?,
                last_known_signal: row.get::<_, f64>(6)?,
                last_known_liquidity: row.get::<_, f64>(7)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // --- risk state ---

    pub fn upsert_risk_state(&self, state: &RiskState) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO risk_state
               (day_key, baseline_equity_usd, current_equity_usd, turnover_usd, paused, pause_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(day_key) DO UPDATE SET
               baseline_equity_usd = excluded.baseline_equity_usd,
               current_equity_usd = excluded.current_equity_usd,
               turnover_usd = excluded.turnover_usd,
               paused = excluded.paused,
               pause_reason = excluded.pause_reason",
            params![
                state.day_key,
                state.baseline_equity_usd,
                state.current_equity_usd,
                state.turnover_usd,
                state.paused as i64,
                state.pause_reason,
            ],
        )?;
        Ok(())
    }

    pub fn load_risk_state(&self, day_key: &str) -> Result<Option<RiskState>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT day_key, baseline_equity_usd, current_equity_usd, turnover_usd, paused, pause_reason
             FROM risk_state WHERE day_key = ?1",
        )?;
        let mut rows = stmt.query_map(params![day_key], |row| {
            Ok(RiskState {
                day_key: row.get(0)?,
                baseline_equity_usd: row.get(1)?,
                current_equity_usd: row.get(2)?,
                turnover_usd: row.get(3)?,
                paused: row.get::<_, i64>(4)? != 0,
                pause_reason: row.get(5)?,
            })
        })?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    // --- settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn load_settings(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Process liveness record
    pub fn heartbeat(&self, now: DateTime<Utc>) -> Result<()> {
        self.set_setting("heartbeat", &ts_millis(now).to_string())
    }

    // --- telemetry ---

    pub fn insert_tick_telemetry(&self, row: &TickTelemetry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO tick_telemetry
               (ts, tick_seq, equity_usd, sol_balance_lamports, positions, candidates,
                action, reason_code, paused, quarantined, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                ts_millis(row.ts),
                row.tick_seq as i64,
                row.equity_usd,
                row.sol_balance_lamports as i64,
                row.positions as i64,
                row.candidates as i64,
                row.action,
                row.reason_code,
                row.paused as i64,
                row.quarantined as i64,
                row.duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    /// Bounded table growth: telemetry rows past the retention window go
    pub fn prune_telemetry(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM tick_telemetry WHERE ts < ?1",
            params![ts_millis(older_than)],
        )?;
        if deleted > 0 {
            debug!("pruned {deleted} telemetry row(s)");
        }
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::TradeStatus;
    use crate::types::PositionSource;
    use chrono::TimeZone;

    fn mint() -> Mint {
        Mint::new_unchecked("StoreMint111111111111111111111111111111111")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_lot_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let lot = Lot::new(mint(), 100.0, 1.25, PositionSource::Bot, at(1));
        db.upsert_lot(&lot).unwrap();

        let loaded = db.load_open_lots().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, lot.id);
        assert_eq!(loaded[0].quantity_remaining, 100.0);
        assert_eq!(loaded[0].source, PositionSource::Bot);

        // Closing writes through and drops it from the open set
        let mut closed = lot.clone();
        closed.quantity_remaining = 0.0;
        closed.closed = true;
        db.upsert_lot(&closed).unwrap();
        assert!(db.load_open_lots().unwrap().is_empty());
    }

    #[test]
    fn test_tracking_roundtrip_and_delete() {
        let db = Database::open_in_memory().unwrap();
        let row = PositionTracking::new(mint(), 1.0, 50.0, PositionSource::WalletDiscovery, at(5));
        db.upsert_tracking(&row).unwrap();

        let loaded = db.load_tracking().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mint, mint());
        assert_eq!(loaded[0].slot_type, SlotType::Scout);

        db.delete_tracking(&mint()).unwrap();
        assert!(db.load_tracking().unwrap().is_empty());
    }

    #[test]
    fn test_trade_insert_and_daily_stats() {
        let db = Database::open_in_memory().unwrap();
        for (pnl, status) in [(10.0, TradeStatus::Sent), (-4.0, TradeStatus::Paper)] {
            let event = TradeEvent {
                id: Uuid::new_v4(),
                timestamp: at(100),
                input_mint: mint(),
                output_mint: Mint::sol(),
                in_amount_base_units: 1000,
                out_amount_base_units: 900,
                status,
                tx_sig: None,
                reason_code: "take_profit".into(),
                fees_lamports: 10_000,
                priority_fee_lamports: 100_000,
                realized_pnl_usd: Some(pnl),
                meta: serde_json::json!({}),
            };
            db.insert_trade(&event).unwrap();
        }

        let stats = db.daily_trade_stats(at(0), at(1000)).unwrap();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.winning_trades, 1);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.realized_pnl_usd, 6.0);
        assert_eq!(stats.win_rate(), 50.0);
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("loop_seconds").unwrap().is_none());
        db.set_setting("loop_seconds", "30").unwrap();
        db.set_setting("loop_seconds", "45").unwrap();
        assert_eq!(db.get_setting("loop_seconds").unwrap().as_deref(), Some("45"));
        assert_eq!(db.load_settings().unwrap().len(), 1);
    }

    #[test]
    fn test_risk_state_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let mut state = RiskState::new("2026-03-01".into(), 1000.0);
        state.paused = true;
        state.pause_reason = Some("daily_drawdown_breached".into());
        db.upsert_risk_state(&state).unwrap();

        let loaded = db.load_risk_state("2026-03-01").unwrap().unwrap();
        assert!(loaded.paused);
        assert_eq!(loaded.pause_reason.as_deref(), Some("daily_drawdown_breached"));
        assert!(db.load_risk_state("2026-03-02").unwrap().is_none());
    }

    #[test]
    fn test_exited_cache_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let entry = ExitedTokenCacheEntry {
            mint: mint(),
            last_exit_time: at(10),
            last_exit_reason: "trailing_stop_exit".into(),
            cooldown_until: at(10 + 12 * 3600),
            times_reentered: 2,
            last_known_price: 0.5,
            last_known_signal: 0.1,
            last_known_liquidity: 40_000.0,
        };
        db.upsert_exited_cache(&entry).unwrap();
        let loaded = db.load_exited_cache().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].times_reentered, 2);
        assert_eq!(loaded[0].cooldown_until, at(10 + 12 * 3600));
    }

    #[test]
    fn test_reopen_restores_state_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotator.db");

        {
            let db = Database::open(&path).unwrap();
            db.upsert_lot(&Lot::new(mint(), 42.0, 0.8, PositionSource::Bot, at(7)))
                .unwrap();
            db.set_setting("risk_profile", "\"high\"").unwrap();
        }

        let db = Database::open(&path).unwrap();
        let lots = db.load_open_lots().unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].quantity_remaining, 42.0);
        assert_eq!(
            db.get_setting("risk_profile").unwrap().as_deref(),
            Some("\"high\"")
        );
    }

    #[test]
    fn test_telemetry_prune() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_tick_telemetry(&TickTelemetry {
                ts: at(i * 100),
                tick_seq: i as u64,
                equity_usd: 1000.0,
                sol_balance_lamports: 1_000_000_000,
                positions: 2,
                candidates: 3,
                action: "hold".into(),
                reason_code: None,
                paused: false,
                quarantined: 0,
                duration_ms: 12,
            })
            .unwrap();
        }
        let deleted = db.prune_telemetry(at(250)).unwrap();
        assert_eq!(deleted, 3);
    }
}
