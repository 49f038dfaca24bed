// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stake-weighted refund tiers.

use crate::types::ONE_E18;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;

/// Minimum stake (in whole PSP) below which an address earns no refund.
pub const MIN_STAKE_WHOLE_PSP: u64 = 500;

/// Tiers ordered descending by threshold; the first threshold at or below
/// the stake wins.
static TIERS: Lazy<[(Decimal, Decimal); 4]> = Lazy::new(|| {
    [
        (psp(500_000), Decimal::ONE),
        (psp(50_000), Decimal::new(75, 2)),
        (psp(5_000), Decimal::new(50, 2)),
        (psp(500), Decimal::new(25, 2)),
    ]
});

/// Whole PSP tokens scaled to the 10^18 wei representation.
pub fn psp(whole: u64) -> Decimal {
    Decimal::from(whole) * Decimal::from(ONE_E18)
}

pub fn min_stake() -> Decimal {
    psp(MIN_STAKE_WHOLE_PSP)
}

/// Refund percentage for a staked amount; None below the minimum stake.
/// Callers must treat None as ineligibility.
pub fn refund_percent(stake: &Decimal) -> Option<Decimal> {
    TIERS
        .iter()
        .find(|(threshold, _)| threshold <= stake)
        .map(|(_, percent)| *percent)
}
