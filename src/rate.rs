// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Rate derivation from cumulative counters
//!
//! The server only reports running totals. [`RateCache`] remembers the last
//! `(timestamp, value)` seen for every metric key and turns the next sample
//! into a per-second rate. Timestamps are the server's monotonic tick, never
//! the local clock, so client/server skew cannot distort the result.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::snapshot::EntityKind;

/// Suffix appended to formatted rates
pub const RATE_UNIT: &str = "/s";

/// Key of a counter in a named block, e.g. `totals.tcp_bytes_rx`
pub fn block_key(block: &str, counter: &str) -> String {
    format!("{block}.{counter}")
}

/// Key of a per-entity counter, e.g. `clients[10.0.0.1:5000].bytes_tx`
///
/// Keyed by transport address so a client reconnecting from the same address
/// continues its series while a new address starts a fresh baseline.
pub fn entity_key(kind: EntityKind, addr: &str, counter: &str) -> String {
    format!("{}[{addr}].{counter}", kind.as_str())
}

/// Last observation of one counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    /// Server tick, seconds
    pub timestamp: i64,
    /// Counter value
    pub value: f64,
}

/// A counter value paired with its formatted rate
#[derive(Debug, Clone, PartialEq)]
pub struct RateCell {
    /// The raw counter value
    pub value: f64,
    /// Formatted rate; empty when no rate is available yet
    pub rate: String,
}

/// Latest sample per metric key
#[derive(Debug, Default)]
pub struct RateCache {
    samples: FxHashMap<String, CounterSample>,
}

impl RateCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample and return the signed per-second rate since the
    /// previous one
    ///
    /// Returns `None` for the first sample of a key, when no time has passed,
    /// when `timestamp` is older than the stored sample (which is then kept),
    /// and when the value is not finite.
    pub fn rate(&mut self, key: &str, timestamp: i64, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }

        let sample = CounterSample { timestamp, value };
        let Some(previous) = self.samples.get_mut(key) else {
            self.samples.insert(key.to_string(), sample);
            return None;
        };

        if timestamp < previous.timestamp {
            trace!(key, timestamp, stored = previous.timestamp, "ignoring sample older than baseline");
            return None;
        }

        let elapsed = timestamp.checked_sub(previous.timestamp);
        let delta = value - previous.value;
        *previous = sample;

        let elapsed = elapsed.filter(|&elapsed| elapsed != 0)?;
        let rate = delta / elapsed as f64;
        rate.is_finite().then_some(rate)
    }

    /// Record a sample and return the value with its formatted rate
    ///
    /// The `/s` unit is left out when `suppress_unit` is set, for callers that
    /// combine two rates into one string.
    pub fn observe(&mut self, key: &str, timestamp: i64, value: f64, suppress_unit: bool) -> RateCell {
        let rate = match self.rate(key, timestamp, value) {
            Some(rate) if suppress_unit => format_rate(rate),
            Some(rate) => format!("{}{RATE_UNIT}", format_rate(rate)),
            None => String::new(),
        };
        RateCell { value, rate }
    }

    /// Record a transmit/receive pair and return `"tx / rx/s"`
    ///
    /// Empty when neither side has a rate yet.
    pub fn observe_pair(&mut self, tx_key: &str, rx_key: &str, timestamp: i64, tx: f64, rx: f64) -> String {
        let tx = self.observe(tx_key, timestamp, tx, true);
        let rx = self.observe(rx_key, timestamp, rx, true);
        if tx.rate.is_empty() && rx.rate.is_empty() {
            return String::new();
        }
        format!("{} / {}{RATE_UNIT}", tx.rate, rx.rate)
    }

    /// The stored sample for a key
    pub fn sample(&self, key: &str) -> Option<CounterSample> {
        self.samples.get(key).copied()
    }

    /// Number of keys with a baseline
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no key has a baseline
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Forget every baseline
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Format a rate with magnitude-dependent precision
///
/// `>= 10` has no decimals, `>= 1` one, anything above zero two, zero is
/// `"0"`. Negative rates are formatted by magnitude and prefixed with `-`.
pub fn format_rate(rate: f64) -> String {
    if rate < 0.0 {
        return format!("-{}", format_rate(-rate));
    }

    if rate >= 10.0 {
        to_fixed(rate, 0)
    } else if rate >= 1.0 {
        to_fixed(rate, 1)
    } else if rate > 0.0 {
        to_fixed(rate, 2)
    } else if rate == 0.0 {
        "0".to_string()
    } else {
        to_fixed(rate, 2)
    }
}

/// Fixed-point formatting with ties rounded away from zero
fn to_fixed(value: f64, decimals: i32) -> String {
    let scale = 10f64.powi(decimals);
    let rounded = (value * scale).round() / scale;
    format!("{:.*}", decimals as usize, rounded)
}
