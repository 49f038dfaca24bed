// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Swap qualification policy.
//!
//! Filters raw subgraph swaps down to the set eligible for refund
//! computation. The policy is cumulative by epoch: later epochs add the
//! tx-origin check, fatal de-duplication, and the contract-caller
//! exception. Output is chronological (stable on equal timestamps).

use crate::epoch::EpochGates;
use crate::error::{RefundError, RefundResult};
use crate::stake::StakeAggregator;
use crate::tiers;
use crate::types::{format_hash, QualifiedSwap, Swap};
use ethers::types::{Address, H256};
use std::collections::HashSet;
use tracing::debug;

pub struct SwapQualifier<'a> {
    stakes: &'a StakeAggregator,
    gates: &'a EpochGates,
    // Block hashes orphaned by reorgs on this chain; swaps in them never qualify.
    reorg_blacklist: &'a HashSet<H256>,
    // Contract callers allowed to differ from txOrigin once contract txs activate.
    contract_whitelist: &'a HashSet<Address>,
}

impl<'a> SwapQualifier<'a> {
    pub fn new(
        stakes: &'a StakeAggregator,
        gates: &'a EpochGates,
        reorg_blacklist: &'a HashSet<H256>,
        contract_whitelist: &'a HashSet<Address>,
    ) -> Self {
        Self {
            stakes,
            gates,
            reorg_blacklist,
            contract_whitelist,
        }
    }

    pub fn qualify(&self, epoch: u64, swaps: Vec<Swap>) -> RefundResult<Vec<QualifiedSwap>> {
        let total = swaps.len();
        let mut seen_hashes: HashSet<H256> = HashSet::with_capacity(total);
        let mut qualified = Vec::new();

        for swap in swaps {
            if self.reorg_blacklist.contains(&swap.block_hash) {
                debug!(
                    "[{}] Dropping swap {} from blacklisted block {}",
                    swap.chain_id,
                    format_hash(&swap.tx_hash),
                    format_hash(&swap.block_hash)
                );
                continue;
            }

            if epoch >= self.gates.tx_origin_check_epoch
                && swap.initiator != swap.tx_origin
                && !(epoch >= self.gates.contract_txs_epoch
                    && self.contract_whitelist.contains(&swap.initiator))
            {
                continue;
            }

            if epoch >= self.gates.dedup_epoch && !seen_hashes.insert(swap.tx_hash) {
                // A repeated hash inside one slice means the subgraph
                // returned inconsistent pages; computing on top of it
                // would double-refund.
                return Err(RefundError::DuplicateTransaction {
                    chain_id: swap.chain_id.as_u64(),
                    tx_hash: format_hash(&swap.tx_hash),
                });
            }

            let stake = self
                .stakes
                .balance(&swap.tx_origin, swap.timestamp, epoch);
            if stake < tiers::min_stake() {
                continue;
            }

            qualified.push(QualifiedSwap { swap, stake });
        }

        qualified.sort_by_key(|q| q.swap.timestamp);

        debug!(
            "Qualified {}/{} swaps for epoch {}",
            qualified.len(),
            total,
            epoch
        );
        Ok(qualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stake::{StakeAggregator, StakeEvent, StakeTimeline};
    use crate::tiers::psp;
    use crate::types::RefundChainId;
    use rust_decimal::Decimal;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn hash(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    fn swap(tx: u64, origin: u64, ts: u64) -> Swap {
        Swap {
            chain_id: RefundChainId::Mainnet,
            tx_hash: hash(tx),
            block_hash: hash(1_000 + tx),
            tx_origin: addr(origin),
            initiator: addr(origin),
            tx_gas_price: 30_000_000_000,
            block_number: 14_000_000 + tx,
            timestamp: ts,
        }
    }

    fn stakes(balances: Vec<(u64, Decimal)>) -> StakeAggregator {
        let events = balances
            .into_iter()
            .map(|(n, amount)| StakeEvent {
                address: addr(n),
                timestamp: 0,
                amount,
            })
            .collect();
        StakeAggregator::from_timelines(
            StakeTimeline::from_events(events),
            StakeTimeline::default(),
            &EpochGates::default(),
        )
    }

    fn qualify(
        epoch: u64,
        swaps_in: Vec<Swap>,
        stakes: &StakeAggregator,
        blacklist: &HashSet<H256>,
        whitelist: &HashSet<Address>,
    ) -> RefundResult<Vec<QualifiedSwap>> {
        let gates = EpochGates::default();
        SwapQualifier::new(stakes, &gates, blacklist, whitelist).qualify(epoch, swaps_in)
    }

    #[test]
    fn test_min_stake_filter() {
        let stakes = stakes(vec![(1, psp(500)), (2, psp(499))]);
        let out = qualify(
            15,
            vec![swap(1, 1, 100), swap(2, 2, 100)],
            &stakes,
            &HashSet::new(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].swap.tx_origin, addr(1));
        assert_eq!(out[0].stake, psp(500));
    }

    #[test]
    fn test_reorg_blacklist_always_applies() {
        let stakes = stakes(vec![(1, psp(500))]);
        let s = swap(1, 1, 100);
        let blacklist = HashSet::from([s.block_hash]);
        // Even before every other gate (epoch 9) the blacklist drops it.
        let out = qualify(9, vec![s], &stakes, &blacklist, &HashSet::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_tx_origin_check_gated_by_epoch() {
        let stakes = stakes(vec![(1, psp(500))]);
        let mut s = swap(1, 1, 100);
        s.initiator = addr(9);

        // Before the gate: allowed.
        let out = qualify(11, vec![s.clone()], &stakes, &HashSet::new(), &HashSet::new()).unwrap();
        assert_eq!(out.len(), 1);

        // From the gate onward: dropped.
        let out = qualify(12, vec![s], &stakes, &HashSet::new(), &HashSet::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_contract_whitelist_exception() {
        let stakes = stakes(vec![(1, psp(500))]);
        let mut s = swap(1, 1, 100);
        s.initiator = addr(9);
        let whitelist = HashSet::from([addr(9)]);

        // Whitelisted caller, but contract txs not active yet.
        let out = qualify(20, vec![s.clone()], &stakes, &HashSet::new(), &whitelist).unwrap();
        assert!(out.is_empty());

        // Active from the contract-txs epoch.
        let out = qualify(25, vec![s], &stakes, &HashSet::new(), &whitelist).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_duplicate_hash_is_fatal_from_dedup_epoch() {
        let stakes = stakes(vec![(1, psp(500))]);
        let err = qualify(
            12,
            vec![swap(7, 1, 100), swap(7, 1, 150)],
            &stakes,
            &HashSet::new(),
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RefundError::DuplicateTransaction { .. }));
        assert!(err.is_fatal_to_run());
    }

    #[test]
    fn test_duplicate_hash_tolerated_before_dedup_epoch() {
        let stakes = stakes(vec![(1, psp(500))]);
        let out = qualify(
            11,
            vec![swap(7, 1, 100), swap(7, 1, 150)],
            &stakes,
            &HashSet::new(),
            &HashSet::new(),
        )
        .unwrap();
        // Both survive here; the store's unique key collapses them later.
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_output_is_chronological() {
        let stakes = stakes(vec![(1, psp(500)), (2, psp(5_000))]);
        let out = qualify(
            15,
            vec![swap(3, 1, 300), swap(1, 2, 100), swap(2, 1, 200)],
            &stakes,
            &HashSet::new(),
            &HashSet::new(),
        )
        .unwrap();
        let timestamps: Vec<u64> = out.iter().map(|q| q.swap.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }
}
