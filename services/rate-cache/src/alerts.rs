//! Rate alert watches
//!
//! Watches are evaluated synchronously on every cache write for the affected
//! pair; delivery goes through the engine event bus and never blocks the
//! write path. A watch that fired re-fires only after its cooldown window.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use services_common::{AlertDirection, CurrencyPair, RateAlert};
use tracing::info;
use uuid::Uuid;

/// Registered alert watches with cooldown-based rate limiting
pub struct AlertBook {
    watches: RwLock<Vec<RateAlert>>,
    cooldown: Duration,
}

impl AlertBook {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            watches: RwLock::new(Vec::new()),
            cooldown: Duration::seconds(cooldown_secs),
        }
    }

    /// Register a watch, returning its id
    pub fn register(&self, pair: CurrencyPair, threshold: f64, direction: AlertDirection) -> Uuid {
        let alert = RateAlert::new(pair, threshold, direction);
        let id = alert.id;
        self.watches.write().push(alert);
        id
    }

    /// Remove a watch by id; true if it existed
    pub fn remove(&self, id: Uuid) -> bool {
        let mut watches = self.watches.write();
        let before = watches.len();
        watches.retain(|w| w.id != id);
        watches.len() < before
    }

    /// All registered watches
    pub fn list(&self) -> Vec<RateAlert> {
        self.watches.read().clone()
    }

    /// Evaluate watches for a pair against a freshly written rate
    ///
    /// Returns the watches that fired; fired watches have their cooldown
    /// timestamp advanced so repeats within the window are suppressed.
    pub fn evaluate(&self, pair: &CurrencyPair, rate: f64) -> Vec<RateAlert> {
        let now = Utc::now();
        let mut fired = Vec::new();
        let mut watches = self.watches.write();
        for watch in watches.iter_mut() {
            if &watch.pair != pair || !watch.is_triggered(rate) {
                continue;
            }
            if !self.cooled_down(watch.last_fired, now) {
                continue;
            }
            watch.last_fired = Some(now);
            info!(
                pair = %watch.pair, threshold = watch.threshold, rate,
                "rate alert triggered"
            );
            fired.push(watch.clone());
        }
        fired
    }

    fn cooled_down(&self, last_fired: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_fired {
            None => true,
            Some(at) => now - at >= self.cooldown,
        }
    }
}
