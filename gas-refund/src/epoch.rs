// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Epoch calendar and epoch-gated feature activation.
//!
//! Epochs are contiguous 14-day intervals numbered from a genesis epoch.
//! 26 epochs form a refund year; the budget counters reset on year
//! boundaries. Feature gates are plain epoch numbers so historical behavior
//! changes stay reproducible from config.

use serde::{Deserialize, Serialize};

pub const EPOCHS_PER_YEAR: u64 = 26;
pub const DEFAULT_EPOCH_DURATION_SECS: u64 = 14 * 24 * 60 * 60;

/// Maps epoch numbers to wall-clock intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EpochCalendar {
    // First epoch the refund program covers.
    pub genesis_epoch: u64,
    // Unix timestamp (secs) at which the genesis epoch starts.
    pub genesis_start: u64,
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: u64,
}

fn default_epoch_duration() -> u64 {
    DEFAULT_EPOCH_DURATION_SECS
}

impl EpochCalendar {
    /// Inclusive start timestamp of `epoch`. Caller must pass
    /// `epoch >= genesis_epoch`.
    pub fn start_of(&self, epoch: u64) -> u64 {
        debug_assert!(epoch >= self.genesis_epoch);
        self.genesis_start + (epoch - self.genesis_epoch) * self.epoch_duration_secs
    }

    /// Exclusive end timestamp of `epoch`.
    pub fn end_of(&self, epoch: u64) -> u64 {
        self.start_of(epoch) + self.epoch_duration_secs
    }

    /// Epoch containing `timestamp`, or None before genesis.
    pub fn epoch_at(&self, timestamp: u64) -> Option<u64> {
        if timestamp < self.genesis_start {
            return None;
        }
        Some(self.genesis_epoch + (timestamp - self.genesis_start) / self.epoch_duration_secs)
    }

    pub fn current_epoch(&self, now: u64) -> Option<u64> {
        self.epoch_at(now)
    }

    /// The slice of `epoch` that can be scanned at `now`: the epoch's range
    /// clamped to the present. None if the epoch has not started.
    pub fn calc_interval(&self, epoch: u64, now: u64) -> Option<(u64, u64)> {
        let start = self.start_of(epoch);
        if now < start {
            return None;
        }
        Some((start, self.end_of(epoch).min(now)))
    }

    pub fn is_finished(&self, epoch: u64, now: u64) -> bool {
        self.end_of(epoch) <= now
    }

    /// True when `epoch` opens a new refund year.
    pub fn is_year_start(&self, epoch: u64) -> bool {
        epoch >= self.genesis_epoch && (epoch - self.genesis_epoch) % EPOCHS_PER_YEAR == 0
    }

    /// First epoch of the refund year containing `epoch`.
    pub fn year_start_of(&self, epoch: u64) -> u64 {
        epoch - (epoch - self.genesis_epoch) % EPOCHS_PER_YEAR
    }
}

/// Epoch numbers at which pipeline behavior changes. All configurable; the
/// defaults reproduce the historical rollout order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EpochGates {
    // Safety Module stake starts counting toward the tier.
    pub sm_start_epoch: u64,
    // Swaps must originate from the staker itself.
    pub tx_origin_check_epoch: u64,
    // Duplicate txHash in a slice becomes a fatal upstream error.
    pub dedup_epoch: u64,
    // Per-address per-epoch USD budget activates.
    pub epoch_budget_epoch: u64,
    // One historical epoch where the raw PSP amount was floored early.
    pub precision_glitch_epoch: u64,
    // Whitelisted contract callers may differ from txOrigin.
    pub contract_txs_epoch: u64,
}

impl Default for EpochGates {
    fn default() -> Self {
        Self {
            sm_start_epoch: 11,
            tx_origin_check_epoch: 12,
            dedup_epoch: 12,
            epoch_budget_epoch: 20,
            precision_glitch_epoch: 12,
            contract_txs_epoch: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calendar() -> EpochCalendar {
        EpochCalendar {
            genesis_epoch: 9,
            genesis_start: 1_640_000_000,
            epoch_duration_secs: DEFAULT_EPOCH_DURATION_SECS,
        }
    }

    #[test]
    fn test_epoch_bounds() {
        let cal = calendar();
        assert_eq!(cal.start_of(9), 1_640_000_000);
        assert_eq!(cal.end_of(9), 1_640_000_000 + DEFAULT_EPOCH_DURATION_SECS);
        assert_eq!(cal.start_of(10), cal.end_of(9));
    }

    #[test]
    fn test_epoch_at_boundaries() {
        let cal = calendar();
        assert_eq!(cal.epoch_at(1_639_999_999), None);
        assert_eq!(cal.epoch_at(1_640_000_000), Some(9));
        assert_eq!(cal.epoch_at(cal.end_of(9) - 1), Some(9));
        assert_eq!(cal.epoch_at(cal.end_of(9)), Some(10));
    }

    #[test]
    fn test_calc_interval_clamps_to_now() {
        let cal = calendar();
        let mid = cal.start_of(9) + 100_000;
        assert_eq!(cal.calc_interval(9, mid), Some((cal.start_of(9), mid)));
        // Finished epoch: full range.
        let later = cal.end_of(9) + 5;
        assert_eq!(
            cal.calc_interval(9, later),
            Some((cal.start_of(9), cal.end_of(9)))
        );
        // Not started yet.
        assert_eq!(cal.calc_interval(10, mid), None);
    }

    #[test]
    fn test_year_boundaries() {
        let cal = calendar();
        assert!(cal.is_year_start(9));
        assert!(!cal.is_year_start(10));
        assert!(cal.is_year_start(9 + EPOCHS_PER_YEAR));
        assert_eq!(cal.year_start_of(9), 9);
        assert_eq!(cal.year_start_of(34), 9);
        assert_eq!(cal.year_start_of(35), 35);
        assert_eq!(cal.year_start_of(36), 35);
    }

    #[test]
    fn test_is_finished() {
        let cal = calendar();
        assert!(!cal.is_finished(9, cal.end_of(9) - 1));
        assert!(cal.is_finished(9, cal.end_of(9)));
    }
}
