// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-transaction refund computation.
//!
//! All monetary arithmetic is `Decimal`; floats never appear. PSP amounts
//! are wei-scale (10^18) and truncated to integers when persisted; USD
//! amounts keep full precision. The same computation serves first-time
//! staging and re-derivation during re-validation, so any change here
//! changes historical classification too.

use crate::epoch::EpochGates;
use crate::error::{RefundError, RefundResult};
use crate::tiers;
use crate::types::{
    decimal_from_u128, format_address, PricePoint, QualifiedSwap, StagedTransaction,
};
use rust_decimal::Decimal;

/// Intermediate and final amounts for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundBreakdown {
    pub gas_used_chain_currency: Decimal,
    pub gas_used_usd: Decimal,
    pub refund_raw_psp: Decimal,
    pub refund_usd: Decimal,
    pub refund_psp: Decimal,
}

/// Core refund formula.
///
/// `floor_raw` reproduces one historical epoch in which the raw PSP amount
/// was floored before the USD derivation; it must stay applied at exactly
/// that point or re-validation rewrites old payouts.
pub fn compute_refund(
    gas_used_chain_currency: Decimal,
    price: &PricePoint,
    percent: Decimal,
    floor_raw: bool,
) -> RefundResult<RefundBreakdown> {
    let scale = Decimal::from(crate::types::ONE_E18);

    let gas_used_usd = gas_used_chain_currency * price.chain_price_usd / scale;

    let gas_fee_psp = gas_used_chain_currency
        .checked_div(price.psp_per_native)
        .ok_or_else(|| {
            RefundError::PriceOracle(format!(
                "unusable psp/native rate {} at {}",
                price.psp_per_native, price.timestamp
            ))
        })?;

    let mut refund_raw_psp = gas_fee_psp * percent;
    if floor_raw {
        refund_raw_psp = refund_raw_psp.floor();
    }

    let refund_usd = refund_raw_psp * price.psp_price_usd / scale;
    let refund_psp = refund_raw_psp.floor().normalize();

    Ok(RefundBreakdown {
        gas_used_chain_currency,
        gas_used_usd,
        refund_raw_psp,
        refund_usd,
        refund_psp,
    })
}

/// Compute the refund for a qualified swap and stage it as an `Idle` row.
///
/// `gas_used` comes from the block explorer; the subgraph's value is not
/// trusted. A missing price point is fatal for the transaction and must be
/// surfaced by the caller, never skipped.
pub fn stage_transaction(
    qualified: &QualifiedSwap,
    gas_used: u64,
    price: &PricePoint,
    epoch: u64,
    gates: &EpochGates,
) -> RefundResult<StagedTransaction> {
    let swap = &qualified.swap;
    let percent = tiers::refund_percent(&qualified.stake).ok_or_else(|| {
        // The qualifier only passes swaps at or above the minimum stake, so
        // a missing tier here is a contradiction, not ineligibility.
        RefundError::TierContradiction {
            address: format_address(&swap.tx_origin),
            stake: qualified.stake.to_string(),
        }
    })?;

    let gas_used_chain_currency =
        decimal_from_u128(gas_used as u128 * swap.tx_gas_price);

    let breakdown = compute_refund(
        gas_used_chain_currency,
        price,
        percent,
        epoch == gates.precision_glitch_epoch,
    )?;

    Ok(StagedTransaction {
        chain_id: swap.chain_id,
        epoch,
        tx_hash: swap.tx_hash,
        address: swap.tx_origin,
        timestamp: swap.timestamp,
        block_number: swap.block_number,
        gas_used,
        gas_used_chain_currency: breakdown.gas_used_chain_currency,
        psp_chain_currency: price.psp_per_native,
        psp_usd: price.psp_price_usd,
        chain_currency_usd: price.chain_price_usd,
        total_stake_amount_psp: qualified.stake,
        refunded_amount_psp: breakdown.refund_psp,
        refunded_amount_usd: breakdown.refund_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RefundChainId, Swap};
    use ethers::types::{Address, H256};

    fn price() -> PricePoint {
        PricePoint {
            timestamp: 1_650_000_000,
            // PSP at 5 cents, native at $2000, so 1 PSP = 2.5e-5 native.
            psp_price_usd: Decimal::new(5, 2),
            chain_price_usd: Decimal::from(2000),
            psp_per_native: Decimal::new(25, 6),
        }
    }

    #[test]
    fn test_formula_consistency() {
        // 0.01 native of gas at 25% refund.
        let fee = Decimal::from(10_000_000_000_000_000u64);
        let b = compute_refund(fee, &price(), Decimal::new(25, 2), false).unwrap();

        // 0.01 native at $2000 = $20 of gas.
        assert_eq!(b.gas_used_usd, Decimal::from(20));
        // $20 of gas buys 400 PSP; 25% of that is 100 PSP.
        let hundred_psp = decimal_from_u128(100_000_000_000_000_000_000);
        assert_eq!(b.refund_raw_psp, hundred_psp);
        assert_eq!(b.refund_psp, hundred_psp);
        // 100 PSP at 5 cents.
        assert_eq!(b.refund_usd, Decimal::from(5));
    }

    #[test]
    fn test_psp_amount_is_floored() {
        let p = PricePoint {
            psp_per_native: Decimal::from(3),
            ..price()
        };
        let b = compute_refund(Decimal::from(10), &p, Decimal::new(25, 2), false).unwrap();
        // 10 / 3 * 0.25 = 0.8333…, floored to 0 for the PSP side only.
        assert_eq!(b.refund_psp, Decimal::ZERO);
        assert!(b.refund_usd > Decimal::ZERO);
    }

    /// Flooring the raw amount before the USD derivation must yield a
    /// strictly smaller USD value than the general formula.
    #[test]
    fn test_precision_glitch_floors_before_usd() {
        let p = PricePoint {
            psp_per_native: Decimal::from(3),
            ..price()
        };
        let fee = Decimal::from(1_000_000_000_000_000_007u64);
        let general = compute_refund(fee, &p, Decimal::new(25, 2), false).unwrap();
        let glitched = compute_refund(fee, &p, Decimal::new(25, 2), true).unwrap();

        assert_eq!(glitched.refund_raw_psp, glitched.refund_raw_psp.floor());
        assert!(glitched.refund_usd < general.refund_usd);
        // The floored PSP side is unchanged.
        assert_eq!(glitched.refund_psp, general.refund_psp);
    }

    #[test]
    fn test_zero_rate_is_an_error() {
        let p = PricePoint {
            psp_per_native: Decimal::ZERO,
            ..price()
        };
        let err = compute_refund(Decimal::from(10), &p, Decimal::ONE, false).unwrap_err();
        assert_eq!(err.error_type(), "price_oracle");
    }

    #[test]
    fn test_stage_transaction_carries_price_columns() {
        let swap = Swap {
            chain_id: RefundChainId::Mainnet,
            tx_hash: H256::from_low_u64_be(1),
            block_hash: H256::from_low_u64_be(2),
            tx_origin: Address::from_low_u64_be(3),
            initiator: Address::from_low_u64_be(3),
            tx_gas_price: 50_000_000_000, // 50 gwei
            block_number: 14_000_000,
            timestamp: 1_650_000_000,
        };
        let qualified = QualifiedSwap {
            swap,
            stake: crate::tiers::psp(5_000),
        };
        let staged =
            stage_transaction(&qualified, 210_000, &price(), 15, &EpochGates::default()).unwrap();

        assert_eq!(staged.gas_used, 210_000);
        assert_eq!(
            staged.gas_used_chain_currency,
            Decimal::from(210_000u64) * Decimal::from(50_000_000_000u64)
        );
        assert_eq!(staged.psp_chain_currency, price().psp_per_native);
        assert_eq!(staged.psp_usd, price().psp_price_usd);
        assert_eq!(staged.chain_currency_usd, price().chain_price_usd);
        // 50% tier for a 5k stake.
        let expected = compute_refund(
            staged.gas_used_chain_currency,
            &price(),
            Decimal::new(50, 2),
            false,
        )
        .unwrap();
        assert_eq!(staged.refunded_amount_psp, expected.refund_psp);
        assert_eq!(staged.refunded_amount_usd, expected.refund_usd);
    }

    #[test]
    fn test_stake_below_any_tier_is_a_contradiction() {
        let swap = Swap {
            chain_id: RefundChainId::Mainnet,
            tx_hash: H256::zero(),
            block_hash: H256::zero(),
            tx_origin: Address::zero(),
            initiator: Address::zero(),
            tx_gas_price: 1,
            block_number: 0,
            timestamp: 0,
        };
        let qualified = QualifiedSwap {
            swap,
            stake: crate::tiers::psp(100),
        };
        let err = stage_transaction(&qualified, 21_000, &price(), 15, &EpochGates::default())
            .unwrap_err();
        assert_eq!(err.error_type(), "tier_contradiction");
        assert!(err.is_fatal_to_run());
    }
}
