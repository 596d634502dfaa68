//! [`SampleStore`] – the dashboard's current reading and efficiency history.
//!
//! Holds exactly one current [`Reading`] and a rolling window of the last
//! [`HISTORY_CAPACITY`] efficiency values.  The only mutator is
//! [`SampleStore::commit`], which replaces all four temperatures at once.
//!
//! # Example
//!
//! ```rust
//! use heatex_runtime::sample_store::SampleStore;
//! use heatex_types::Reading;
//!
//! let mut store = SampleStore::new();
//! assert_eq!(store.current(), Reading::BASELINE);
//! assert!(store.history().is_empty());
//!
//! store.commit_with_label(Reading::new(0.0, 15.0, 20.0, 5.0), "12:00:00");
//! assert!((store.efficiency() - 75.0).abs() < 1e-9);
//! assert_eq!(store.history().len(), 1);
//! ```

use std::collections::VecDeque;

use chrono::Local;
use heatex_types::{DisplayUpdate, HistoryPoint, Reading};

use crate::efficiency::efficiency;

/// Maximum number of points kept for the efficiency chart.
pub const HISTORY_CAPACITY: usize = 20;

// ─────────────────────────────────────────────────────────────────────────────
// SampleStore
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SampleStore {
    current: Reading,
    efficiency: f64,
    /// Oldest first.
    history: VecDeque<HistoryPoint>,
}

impl SampleStore {
    /// Start at [`Reading::BASELINE`] with an empty history.
    pub fn new() -> Self {
        Self {
            current: Reading::BASELINE,
            efficiency: efficiency(&Reading::BASELINE),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Commit `reading`, labelled with the local wall-clock time.
    pub fn commit(&mut self, reading: Reading) -> f64 {
        let label = Local::now().format("%H:%M:%S").to_string();
        self.commit_with_label(reading, label)
    }

    /// Replace the current reading, recompute efficiency and append it to the
    /// history, evicting the oldest point beyond [`HISTORY_CAPACITY`].
    /// Returns the new efficiency.
    pub fn commit_with_label(&mut self, reading: Reading, label: impl Into<String>) -> f64 {
        self.current = reading;
        self.efficiency = efficiency(&reading);
        self.history.push_back(HistoryPoint {
            label: label.into(),
            efficiency: self.efficiency,
        });
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.efficiency
    }

    pub fn current(&self) -> Reading {
        self.current
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn history(&self) -> &VecDeque<HistoryPoint> {
        &self.history
    }

    /// Everything a display needs, with `status` as the visible label.
    pub fn snapshot(&self, status: impl Into<String>) -> DisplayUpdate {
        DisplayUpdate {
            reading: self.current,
            efficiency: self.efficiency,
            history: self.history.iter().cloned().collect(),
            status: status.into(),
        }
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
