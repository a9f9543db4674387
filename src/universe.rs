//! Active universe and re-entry cache
//!
//! Membership is positive: held above dust, pending order, slotted, or
//! queued for an autonomous buy. SOL and USDC are always in. Exited mints
//! sit in the cache under a cooldown before they can re-enter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::Database;
use crate::types::Mint;

/// Records a mint's recent exit for cooldown / re-entry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitedTokenCacheEntry {
    pub mint: Mint,
    pub last_exit_time: DateTime<Utc>,
    pub last_exit_reason: String,
    pub cooldown_until: DateTime<Utc>,
    pub times_reentered: u32,
    pub last_known_price: f64,
    pub last_known_signal: f64,
    pub last_known_liquidity: f64,
}

/// Why an admission attempt was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitDenied {
    InCooldown { until: DateTime<Utc> },
}

pub struct Universe {
    active: HashSet<Mint>,
    cache: HashMap<Mint, ExitedTokenCacheEntry>,
    db: Option<Arc<Database>>,
}

impl Universe {
    pub fn new(db: Option<Arc<Database>>) -> Self {
        let mut active = HashSet::new();
        active.insert(Mint::sol());
        active.insert(Mint::usdc());
        Self {
            active,
            cache: HashMap::new(),
            db,
        }
    }

    /// Restore the re-entry cache from the durable table
    pub fn restore(db: Arc<Database>) -> Result<Self> {
        let mut universe = Self::new(Some(db.clone()));
        for entry in db.load_exited_cache()? {
            universe.cache.insert(entry.mint.clone(), entry);
        }
        info!("Universe restored: {} cached exit(s)", universe.cache.len());
        Ok(universe)
    }

    /// Rebuild the active set from current membership evidence. SOL and USDC
    /// are unconditional members.
    pub fn reconcile(
        &mut self,
        held: impl IntoIterator<Item = Mint>,
        pending: impl IntoIterator<Item = Mint>,
        queued: impl IntoIterator<Item = Mint>,
    ) {
        self.active.clear();
        self.active.insert(Mint::sol());
        self.active.insert(Mint::usdc());
        self.active.extend(held);
        self.active.extend(pending);
        self.active.extend(queued);
        debug!("universe reconciled: {} active mint(s)", self.active.len());
    }

    pub fn contains(&self, mint: &Mint) -> bool {
        self.active.contains(mint)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Admission policy for a discovery candidate
    pub fn admit(&mut self, mint: &Mint, now: DateTime<Utc>) -> Result<()> {
        match self.cache.get_mut(mint) {
            None => {
                self.active.insert(mint.clone());
                Ok(())
            }
            Some(entry) if now < entry.cooldown_until => {
                Err(Error::UniverseCooldown(mint.to_string()))
            }
            Some(entry) => {
                entry.times_reentered += 1;
                let entry = entry.clone();
                if let Some(db) = &self.db {
                    db.upsert_exited_cache(&entry)?;
                }
                self.active.insert(mint.clone());
                info!(
                    mint = %mint,
                    times_reentered = entry.times_reentered,
                    "mint re-admitted after cooldown"
                );
                Ok(())
            }
        }
    }

    pub fn is_in_cooldown(&self, mint: &Mint, now: DateTime<Utc>) -> bool {
        self.cache
            .get(mint)
            .map(|e| now < e.cooldown_until)
            .unwrap_or(false)
    }

    /// Move a fully exited mint out of the active set and into the cache
    #[allow(clippy::too_many_arguments)]
    pub fn record_exit(
        &mut self,
        mint: &Mint,
        reason: &str,
        last_price: f64,
        last_signal: f64,
        last_liquidity: f64,
        cooldown_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.active.remove(mint);
        let times_reentered = self
            .cache
            .get(mint)
            .map(|e| e.times_reentered)
            .unwrap_or(0);
        let entry = ExitedTokenCacheEntry {
            mint: mint.clone(),
            last_exit_time: now,
            last_exit_reason: reason.to_string(),
            cooldown_until: now + chrono::Duration::seconds((cooldown_hours * 3600.0) as i64),
            times_reentered,
            last_known_price: last_price,
            last_known_signal: last_signal,
            last_known_liquidity: last_liquidity,
        };
        if let Some(db) = &self.db {
            db.upsert_exited_cache(&entry)?;
        }
        info!(
            mint = %mint,
            reason,
            cooldown_until = %entry.cooldown_until,
            "exit recorded to re-entry cache"
        );
        self.cache.insert(mint.clone(), entry);
        Ok(())
    }

    /// Drop candidates outside the active set or still cooling down
    /// (allocation-dilution guard)
    pub fn filter_candidates(&self, candidates: Vec<Mint>, now: DateTime<Utc>) -> Vec<Mint> {
        candidates
            .into_iter()
            .filter(|m| !self.is_in_cooldown(m, now))
            .collect()
    }

    pub fn cache_entry(&self, mint: &Mint) -> Option<&ExitedTokenCacheEntry> {
        self.cache.get(mint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn mint() -> Mint {
        Mint::new_unchecked("UnivMint1111111111111111111111111111111111")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_sol_usdc_always_in() {
        let mut universe = Universe::new(None);
        assert!(universe.contains(&Mint::sol()));
        assert!(universe.contains(&Mint::usdc()));
        universe.reconcile(vec![], vec![], vec![]);
        assert!(universe.contains(&Mint::sol()));
        assert!(universe.contains(&Mint::usdc()));
    }

    #[test]
    fn test_admit_unknown_mint() {
        let mut universe = Universe::new(None);
        universe.admit(&mint(), at(0)).unwrap();
        assert!(universe.contains(&mint()));
    }

    #[test]
    fn test_cooldown_denies_admission() {
        let mut universe = Universe::new(None);
        universe
            .record_exit(&mint(), "trailing_stop_exit", 1.0, 0.2, 50_000.0, 12.0, at(0))
            .unwrap();
        assert!(!universe.contains(&mint()));

        // Inside the cooldown window
        let err = universe.admit(&mint(), at(11 * 3600)).unwrap_err();
        assert!(matches!(err, Error::UniverseCooldown(_)));

        // After the window: admitted, counter bumped
        universe.admit(&mint(), at(13 * 3600)).unwrap();
        assert!(universe.contains(&mint()));
        assert_eq!(universe.cache_entry(&mint()).unwrap().times_reentered, 1);
    }

    #[test]
    fn test_cooldown_until_arithmetic() {
        let mut universe = Universe::new(None);
        universe
            .record_exit(&mint(), "take_profit", 2.0, 0.5, 90_000.0, 12.0, at(1000))
            .unwrap();
        let entry = universe.cache_entry(&mint()).unwrap();
        assert_eq!(entry.cooldown_until, at(1000 + 12 * 3600));
    }

    #[test]
    fn test_filter_candidates_drops_cooling() {
        let mut universe = Universe::new(None);
        universe
            .record_exit(&mint(), "stale_timeout_exit", 1.0, 0.0, 10_000.0, 12.0, at(0))
            .unwrap();
        let other = Mint::new_unchecked("OtherMint111111111111111111111111111111111");
        let filtered = universe.filter_candidates(vec![mint(), other.clone()], at(3600));
        assert_eq!(filtered, vec![other]);
    }

    #[test]
    fn test_reentry_preserves_counter_across_exits() {
        let mut universe = Universe::new(None);
        universe
            .record_exit(&mint(), "take_profit", 1.0, 0.0, 10_000.0, 1.0, at(0))
            .unwrap();
        universe.admit(&mint(), at(2 * 3600)).unwrap();
        universe
            .record_exit(&mint(), "take_profit", 1.0, 0.0, 10_000.0, 1.0, at(3 * 3600))
            .unwrap();
        assert_eq!(universe.cache_entry(&mint()).unwrap().times_reentered, 1);
    }
}
