//! Hot-reloadable config store
//!
//! Read-copy-update: readers take an `Arc` snapshot at tick start and never
//! observe a partial update. `update` validates the merged result before the
//! swap, persists the patched keys, then notifies subscribers. A hot-swap
//! becomes visible on the next snapshot.

use std::sync::{Arc, RwLock};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::Database;

use super::profiles::RiskProfile;
use super::RuntimeConfig;

type Subscriber = Box<dyn Fn(Arc<RuntimeConfig>) + Send + Sync>;

pub struct ConfigStore {
    current: RwLock<Arc<RuntimeConfig>>,
    subscribers: Mutex<Vec<Subscriber>>,
    db: Option<Arc<Database>>,
}

impl ConfigStore {
    pub fn new(initial: RuntimeConfig, db: Option<Arc<Database>>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            subscribers: Mutex::new(Vec::new()),
            db,
        }
    }

    /// Build a store whose initial value is `base` overlaid with any
    /// previously persisted settings rows.
    pub fn with_persisted_overrides(base: RuntimeConfig, db: Arc<Database>) -> Result<Self> {
        let overrides = db.load_settings()?;
        let mut merged = serde_json::to_value(&base)?;
        if let Value::Object(ref mut map) = merged {
            for (key, raw) in overrides {
                match serde_json::from_str::<Value>(&raw) {
                    Ok(v) => {
                        map.insert(key, v);
                    }
                    Err(e) => warn!("Ignoring unparsable persisted setting {key}: {e}"),
                }
            }
        }
        let mut cfg: RuntimeConfig = serde_json::from_value(merged)
            .map_err(|e| Error::ConfigValidation(e.to_string()))?;
        cfg.normalize();
        cfg.validate()?;
        Ok(Self::new(cfg, Some(db)))
    }

    /// Return a consistent snapshot
    pub fn get(&self) -> Arc<RuntimeConfig> {
        self.current.read().expect("config lock poisoned").clone()
    }

    /// Validate, persist and hot-swap a flat JSON patch atomically.
    /// Identical patches are idempotent.
    pub fn update(&self, patch: Value) -> Result<Arc<RuntimeConfig>> {
        let patch_map = match patch {
            Value::Object(map) => map,
            _ => {
                return Err(Error::ConfigValidation(
                    "config patch must be a JSON object".into(),
                ))
            }
        };

        let prior = self.get();
        let mut merged = serde_json::to_value(prior.as_ref())?;
        let obj = merged
            .as_object_mut()
            .expect("RuntimeConfig serializes to an object");
        for (key, value) in &patch_map {
            if !obj.contains_key(key) {
                return Err(Error::ConfigValidation(format!("unknown config key: {key}")));
            }
            obj.insert(key.clone(), value.clone());
        }

        let mut next: RuntimeConfig = serde_json::from_value(merged)
            .map_err(|e| Error::ConfigValidation(e.to_string()))?;
        next.normalize();
        next.validate()?;

        if let Some(db) = &self.db {
            for (key, value) in &patch_map {
                db.set_setting(key, &value.to_string())?;
            }
        }

        let next = Arc::new(next);
        {
            let mut guard = self.current.write().expect("config lock poisoned");
            *guard = next.clone();
        }
        info!("Config updated: {} key(s)", patch_map.len());
        self.notify(next.clone());
        Ok(next)
    }

    /// Overlay a named risk profile and hot-swap
    pub fn apply_profile(&self, profile: RiskProfile) -> Result<Arc<RuntimeConfig>> {
        let prior = self.get();
        let mut next = (*prior).clone();
        profile.apply(&mut next);
        next.validate()?;

        if let Some(db) = &self.db {
            db.set_setting("risk_profile", &format!("\"{}\"", profile.name()))?;
        }

        let next = Arc::new(next);
        {
            let mut guard = self.current.write().expect("config lock poisoned");
            *guard = next.clone();
        }
        info!("Risk profile applied: {}", profile.name());
        self.notify(next.clone());
        Ok(next)
    }

    /// Register a change callback
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(Arc<RuntimeConfig>) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(callback));
    }

    fn notify(&self, snapshot: Arc<RuntimeConfig>) {
        for cb in self.subscribers.lock().iter() {
            cb(snapshot.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> ConfigStore {
        ConfigStore::new(RuntimeConfig::default(), None)
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = store();
        let before = store.get();
        store.update(json!({"loop_seconds": 30})).unwrap();
        // The old snapshot is unchanged; the new one sees the patch
        assert_eq!(before.loop_seconds, 60);
        assert_eq!(store.get().loop_seconds, 30);
    }

    #[test]
    fn test_update_validates_before_swap() {
        let store = store();
        let err = store.update(json!({"max_slippage_bps": 50_000}));
        assert!(matches!(err, Err(Error::ConfigValidation(_))));
        // Failed update leaves the prior snapshot in place
        assert_eq!(store.get().max_slippage_bps, 150);
    }

    #[test]
    fn test_update_rejects_unknown_key() {
        let store = store();
        assert!(store.update(json!({"no_such_field": 1})).is_err());
    }

    #[test]
    fn test_update_normalizes_percentages() {
        let store = store();
        let cfg = store.update(json!({"take_profit_pct": 40.0})).unwrap();
        assert_eq!(cfg.take_profit_pct, 0.40);
    }

    #[test]
    fn test_idempotent_on_identical_patch() {
        let store = store();
        let a = store.update(json!({"core_slots": 5})).unwrap();
        let b = store.update(json!({"core_slots": 5})).unwrap();
        assert_eq!(a.core_slots, b.core_slots);
    }

    #[test]
    fn test_subscribe_notified_on_change() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let store = store();
        store.subscribe(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        });
        store.update(json!({"loop_seconds": 15})).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_apply_profile() {
        let store = store();
        let cfg = store.apply_profile(RiskProfile::Conservative).unwrap();
        assert_eq!(cfg.risk_profile, "conservative");
        assert_eq!(cfg.max_daily_drawdown_pct, 0.03);
    }
}
