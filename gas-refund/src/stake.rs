// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Preloaded stake balances.
//!
//! Both staking sources are loaded once per run over a block window
//! covering the scan interval and then queried as pure lookups; no stake
//! query may issue network I/O per call. Balances are reconstructed from
//! signed stake-change events ordered by timestamp.

use crate::epoch::EpochGates;
use ethers::types::Address;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One signed stake change observed on chain. Positive for stakes,
/// negative for withdrawals; `amount` is wei-scale PSP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeEvent {
    pub address: Address,
    pub timestamp: u64,
    pub amount: Decimal,
}

/// Fetches the full stake-change history of one staking contract up to a
/// block bound. Implemented over the staking subgraph; tests use fixed
/// event lists.
#[async_trait::async_trait]
pub trait StakeEventSource: Send + Sync {
    async fn fetch_events(&self, to_block: u64) -> anyhow::Result<Vec<StakeEvent>>;
}

/// Cumulative per-address balance history, answering point-in-time queries
/// by binary search.
#[derive(Debug, Default)]
pub struct StakeTimeline {
    balances: HashMap<Address, Vec<(u64, Decimal)>>,
}

impl StakeTimeline {
    pub fn from_events(mut events: Vec<StakeEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        let mut balances: HashMap<Address, Vec<(u64, Decimal)>> = HashMap::new();
        for event in events {
            let history = balances.entry(event.address).or_default();
            let current = history.last().map(|(_, b)| *b).unwrap_or(Decimal::ZERO);
            let next = current + event.amount;
            match history.last_mut() {
                // Same-second events collapse into one point.
                Some((ts, balance)) if *ts == event.timestamp => *balance = next,
                _ => history.push((event.timestamp, next)),
            }
        }
        Self { balances }
    }

    /// Balance effective at `timestamp`: the last change at or before it.
    pub fn balance_at(&self, address: &Address, timestamp: u64) -> Decimal {
        let Some(history) = self.balances.get(address) else {
            return Decimal::ZERO;
        };
        let idx = history.partition_point(|(ts, _)| *ts <= timestamp);
        if idx == 0 {
            Decimal::ZERO
        } else {
            history[idx - 1].1
        }
    }

    pub fn tracked_addresses(&self) -> usize {
        self.balances.len()
    }
}

/// Effective staked PSP: the single-pool source alone before the Safety
/// Module epoch, the sum of both afterwards.
pub struct StakeAggregator {
    spsp: StakeTimeline,
    safety_module: StakeTimeline,
    sm_start_epoch: u64,
}

impl StakeAggregator {
    /// Load both sources once for the run. `to_block` bounds the event
    /// scan and must cover the ingestion interval.
    pub async fn load(
        spsp_source: &dyn StakeEventSource,
        sm_source: &dyn StakeEventSource,
        to_block: u64,
        gates: &EpochGates,
    ) -> anyhow::Result<Self> {
        let spsp = StakeTimeline::from_events(spsp_source.fetch_events(to_block).await?);
        let safety_module = StakeTimeline::from_events(sm_source.fetch_events(to_block).await?);
        tracing::info!(
            "Loaded stake history: {} SPSP stakers, {} Safety Module stakers",
            spsp.tracked_addresses(),
            safety_module.tracked_addresses()
        );
        Ok(Self::from_timelines(spsp, safety_module, gates))
    }

    pub fn from_timelines(
        spsp: StakeTimeline,
        safety_module: StakeTimeline,
        gates: &EpochGates,
    ) -> Self {
        Self {
            spsp,
            safety_module,
            sm_start_epoch: gates.sm_start_epoch,
        }
    }

    pub fn balance(&self, address: &Address, timestamp: u64, epoch: u64) -> Decimal {
        let spsp = self.spsp.balance_at(address, timestamp);
        if epoch >= self.sm_start_epoch {
            spsp + self.safety_module.balance_at(address, timestamp)
        } else {
            spsp
        }
    }
}
