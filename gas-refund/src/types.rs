// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared across the refund pipeline.

use crate::error::RefundError;
use ethers::types::{Address, H256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use gas_refund_schema::models::RefundTxStatus;

/// 10^18, the wei-style scale PSP amounts are denominated in.
pub const ONE_E18: u64 = 1_000_000_000_000_000_000;

/// Supported chains. The set is closed; anything else is rejected at the
/// config boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum RefundChainId {
    Mainnet = 1,
    Bsc = 56,
    Polygon = 137,
    Fantom = 250,
    Avalanche = 43114,
}

impl RefundChainId {
    pub const ALL: [RefundChainId; 5] = [
        RefundChainId::Mainnet,
        RefundChainId::Bsc,
        RefundChainId::Polygon,
        RefundChainId::Fantom,
        RefundChainId::Avalanche,
    ];

    pub fn as_u64(&self) -> u64 {
        *self as u64
    }

    pub fn name(&self) -> &'static str {
        match self {
            RefundChainId::Mainnet => "mainnet",
            RefundChainId::Bsc => "bsc",
            RefundChainId::Polygon => "polygon",
            RefundChainId::Fantom => "fantom",
            RefundChainId::Avalanche => "avalanche",
        }
    }
}

impl TryFrom<u64> for RefundChainId {
    type Error = RefundError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RefundChainId::Mainnet),
            56 => Ok(RefundChainId::Bsc),
            137 => Ok(RefundChainId::Polygon),
            250 => Ok(RefundChainId::Fantom),
            43114 => Ok(RefundChainId::Avalanche),
            other => Err(RefundError::InvalidChainId(other)),
        }
    }
}

impl From<RefundChainId> for u64 {
    fn from(value: RefundChainId) -> Self {
        value.as_u64()
    }
}

impl std::fmt::Display for RefundChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One successful aggregator swap as reported by the swaps subgraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
    pub chain_id: RefundChainId,
    pub tx_hash: H256,
    pub block_hash: H256,
    pub tx_origin: Address,
    pub initiator: Address,
    pub tx_gas_price: u128,
    pub block_number: u64,
    pub timestamp: u64,
}

/// A swap that passed qualification, with the stake that qualified it.
#[derive(Debug, Clone)]
pub struct QualifiedSwap {
    pub swap: Swap,
    pub stake: Decimal,
}

/// Historical price point used for refund computation. All rates are
/// decimals; `psp_per_native` is the divisor converting a wei-denominated
/// gas fee into PSP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: u64,
    pub psp_price_usd: Decimal,
    pub chain_price_usd: Decimal,
    pub psp_per_native: Decimal,
}

/// A fully computed refund transaction, staged for insertion with
/// `status = Idle`.
#[derive(Debug, Clone)]
pub struct StagedTransaction {
    pub chain_id: RefundChainId,
    pub epoch: u64,
    pub tx_hash: H256,
    pub address: Address,
    pub timestamp: u64,
    pub block_number: u64,
    pub gas_used: u64,
    pub gas_used_chain_currency: Decimal,
    pub psp_chain_currency: Decimal,
    pub psp_usd: Decimal,
    pub chain_currency_usd: Decimal,
    pub total_stake_amount_psp: Decimal,
    pub refunded_amount_psp: Decimal,
    pub refunded_amount_usd: Decimal,
}

/// Canonical lowercase `0x…` rendering used for persisted hashes and
/// addresses. Lowercase hex sorts bytewise, which the re-validation order
/// relies on.
pub fn format_hash(hash: &H256) -> String {
    format!("{hash:#x}")
}

pub fn format_address(address: &Address) -> String {
    format!("{address:#x}")
}

pub fn parse_hash(s: &str) -> anyhow::Result<H256> {
    Ok(s.parse::<H256>()?)
}

pub fn parse_address(s: &str) -> anyhow::Result<Address> {
    Ok(s.parse::<Address>()?)
}

/// Parse a persisted decimal-string amount.
pub fn parse_amount(s: &str) -> anyhow::Result<Decimal> {
    use std::str::FromStr;
    Decimal::from_str(s).map_err(|e| anyhow::anyhow!("bad decimal string {s:?}: {e}"))
}

/// Exact `Decimal` rendering of a u128 (wei quantities fit comfortably in
/// the 96-bit mantissa for the magnitudes this system sees).
pub fn decimal_from_u128(value: u128) -> Decimal {
    Decimal::from_i128_with_scale(value as i128, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_round_trip() {
        for chain in RefundChainId::ALL {
            assert_eq!(RefundChainId::try_from(chain.as_u64()).unwrap(), chain);
        }
    }

    #[test]
    fn test_chain_id_rejects_unknown() {
        assert!(matches!(
            RefundChainId::try_from(42161),
            Err(RefundError::InvalidChainId(42161))
        ));
    }

    #[test]
    fn test_hash_formatting_is_lowercase_and_sortable() {
        let a: H256 = "0x01000000000000000000000000000000000000000000000000000000000000aa"
            .parse()
            .unwrap();
        let b: H256 = "0x0200000000000000000000000000000000000000000000000000000000000000"
            .parse()
            .unwrap();
        let (sa, sb) = (format_hash(&a), format_hash(&b));
        assert_eq!(sa.len(), 66);
        assert_eq!(sa, sa.to_lowercase());
        // Text order must match byte order for the canonical tie-breaker.
        assert!(sa < sb);
    }

    #[test]
    fn test_amount_round_trip() {
        let d = parse_amount("123456.789000000000000001").unwrap();
        assert_eq!(d.to_string(), "123456.789000000000000001");
    }

    #[test]
    fn test_decimal_from_u128_exact() {
        let wei = 21_000u128 * 300_000_000_000u128; // 21k gas at 300 gwei
        assert_eq!(decimal_from_u128(wei).to_string(), "6300000000000000");
    }
}
