// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Row models for the gas refund tables.
//!
//! Amount columns are stored as decimal strings: PSP amounts are integer
//! strings (wei-scale, truncated), USD amounts keep full precision. The
//! status column stores the string form of [`RefundTxStatus`].

use crate::schema::{gas_refund_distribution, gas_refund_participation, gas_refund_transaction};
use diesel::prelude::*;

/// Lifecycle status of a persisted refund transaction.
///
/// `Idle` rows are staged by ingestion and must all be flipped to
/// `Validated` or `Rejected` by the re-validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefundTxStatus {
    Idle,
    Validated,
    Rejected,
}

impl RefundTxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundTxStatus::Idle => "IDLE",
            RefundTxStatus::Validated => "VALIDATED",
            RefundTxStatus::Rejected => "REJECTED",
        }
    }
}

impl std::str::FromStr for RefundTxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(RefundTxStatus::Idle),
            "VALIDATED" => Ok(RefundTxStatus::Validated),
            "REJECTED" => Ok(RefundTxStatus::Rejected),
            other => Err(format!("unknown refund tx status: {other}")),
        }
    }
}

impl std::fmt::Display for RefundTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gas_refund_transaction)]
pub struct StoredRefundTransaction {
    pub id: i64,
    pub chain_id: i64,
    pub epoch: i64,
    pub hash: String,
    pub address: String,
    pub timestamp: i64,
    pub block_number: i64,
    pub gas_used: i64,
    pub gas_used_chain_currency: String,
    pub psp_chain_currency: String,
    pub psp_usd: String,
    pub chain_currency_usd: String,
    pub total_stake_amount_psp: String,
    pub refunded_amount_psp: String,
    pub refunded_amount_usd: String,
    pub status: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = gas_refund_transaction)]
pub struct NewRefundTransaction {
    pub chain_id: i64,
    pub epoch: i64,
    pub hash: String,
    pub address: String,
    pub timestamp: i64,
    pub block_number: i64,
    pub gas_used: i64,
    pub gas_used_chain_currency: String,
    pub psp_chain_currency: String,
    pub psp_usd: String,
    pub chain_currency_usd: String,
    pub total_stake_amount_psp: String,
    pub refunded_amount_psp: String,
    pub refunded_amount_usd: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gas_refund_participation)]
pub struct StoredParticipation {
    pub id: i64,
    pub chain_id: i64,
    pub epoch: i64,
    pub address: String,
    pub refunded_amount_psp: String,
    pub merkle_proofs: serde_json::Value,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = gas_refund_participation)]
pub struct NewParticipation {
    pub chain_id: i64,
    pub epoch: i64,
    pub address: String,
    pub refunded_amount_psp: String,
    pub merkle_proofs: serde_json::Value,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = gas_refund_distribution)]
pub struct StoredDistribution {
    pub id: i64,
    pub chain_id: i64,
    pub epoch: i64,
    pub merkle_root: String,
    pub total_psp_amount_to_refund: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = gas_refund_distribution)]
pub struct NewDistribution {
    pub chain_id: i64,
    pub epoch: i64,
    pub merkle_root: String,
    pub total_psp_amount_to_refund: String,
    pub is_completed: bool,
}
