//! Bounded per-pair rate history
//!
//! Fixed-capacity ring buffers feed the anomaly detector and the risk
//! engine's return series. Capacity is fixed at construction; old samples are
//! overwritten in place, never reallocated.

use rustc_hash::FxHashMap;
use services_common::CurrencyPair;

/// Fixed-capacity ring buffer of rate samples
#[derive(Debug, Clone)]
pub struct RateHistory {
    buffer: Vec<f64>,
    capacity: usize,
    /// Next write position
    head: usize,
    /// Number of valid samples (<= capacity)
    len: usize,
}

impl RateHistory {
    /// Create a history with the given fixed capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            capacity: capacity.max(1),
            head: 0,
            len: 0,
        }
    }

    /// Record a sample, overwriting the oldest once full
    pub fn push(&mut self, rate: f64) {
        self.buffer[self.head] = rate;
        self.head = (self.head + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples in chronological order (oldest first)
    pub fn values(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len);
        let start = if self.len < self.capacity {
            0
        } else {
            self.head
        };
        for i in 0..self.len {
            out.push(self.buffer[(start + i) % self.capacity]);
        }
        out
    }

    /// Sample mean
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.values().iter().sum::<f64>() / self.len as f64
    }

    /// Sample standard deviation (Bessel-corrected)
    pub fn stddev(&self) -> f64 {
        if self.len < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .values()
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / (self.len - 1) as f64;
        variance.sqrt()
    }

    /// Z-score of a candidate sample against the stored window
    ///
    /// Returns `None` when the window has no dispersion to score against.
    pub fn z_score(&self, rate: f64) -> Option<f64> {
        let stddev = self.stddev();
        if stddev <= f64::EPSILON {
            return None;
        }
        Some((rate - self.mean()) / stddev)
    }

    /// Simple returns between consecutive samples, oldest first
    pub fn returns(&self) -> Vec<f64> {
        let values = self.values();
        values
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect()
    }
}

/// Per-pair history store
#[derive(Debug)]
pub struct HistoryStore {
    histories: FxHashMap<CurrencyPair, RateHistory>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: FxHashMap::default(),
            capacity,
        }
    }

    /// Record a rate sample for a pair
    pub fn record(&mut self, pair: &CurrencyPair, rate: f64) {
        self.histories
            .entry(pair.clone())
            .or_insert_with(|| RateHistory::new(self.capacity))
            .push(rate);
    }

    /// History for a pair, if any samples exist
    pub fn get(&self, pair: &CurrencyPair) -> Option<&RateHistory> {
        self.histories.get(pair)
    }

    /// Return series for a pair (for volatility/correlation inputs)
    pub fn returns_for(&self, pair: &CurrencyPair) -> Vec<f64> {
        self.get(pair).map(RateHistory::returns).unwrap_or_default()
    }

    /// Number of tracked pairs
    pub fn tracked_pairs(&self) -> usize {
        self.histories.len()
    }
}
