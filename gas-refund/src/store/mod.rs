// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistence interface for the refund pipeline.
//!
//! [`RefundStore`] is the seam between the computation passes and the
//! database: the production implementation is Postgres-backed, and the
//! re-validation tests run against an in-memory fake. Paging queries must
//! return stable `(timestamp, hash)` order — the whole determinism story
//! rests on it.

mod pg;

pub use pg::PgRefundStore;

use crate::types::{RefundChainId, RefundTxStatus, StagedTransaction};
use ethers::types::Address;
use gas_refund_schema::models::{NewParticipation, StoredDistribution, StoredParticipation, StoredRefundTransaction};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Page size for the re-validation scan.
pub const REVALIDATION_PAGE_SIZE: i64 = 1000;

/// Status / amount corrections staged by the re-validation pass. Amounts
/// are only present when a cap rewrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub id: i64,
    pub status: RefundTxStatus,
    pub refunded_amount_psp: Option<String>,
    pub refunded_amount_usd: Option<String>,
}

/// Budget counters reconstructed from validated rows.
#[derive(Debug, Default)]
pub struct BudgetSeed {
    pub total_psp: Decimal,
    pub yearly_usd_by_address: HashMap<Address, Decimal>,
}

#[async_trait::async_trait]
pub trait RefundStore: Send + Sync {
    /// Highest epoch containing any validated or rejected row.
    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<u64>>;

    /// Sum validated refunds over epochs in `[from_epoch, to_epoch)`.
    async fn load_budget_seed(&self, from_epoch: u64, to_epoch: u64) -> anyhow::Result<BudgetSeed>;

    /// One page of rows with `epoch >= start_epoch`, ordered by
    /// `(timestamp ASC, hash ASC)`. The hash tie-breaker applies even when
    /// timestamps are unique, to keep ordering stable across engines.
    async fn page_transactions(
        &self,
        start_epoch: u64,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>>;

    async fn apply_updates(&self, updates: Vec<TransactionUpdate>) -> anyhow::Result<()>;

    /// Rows still `Idle` in epochs at or after `start_epoch`.
    async fn count_idle(&self, start_epoch: u64) -> anyhow::Result<u64>;

    /// Stage a batch of computed transactions as `Idle`. Idempotent on the
    /// `(chain_id, hash)` key.
    async fn insert_staged(&self, batch: Vec<StagedTransaction>) -> anyhow::Result<()>;

    /// Resume point for a chain/epoch scan: the max persisted swap
    /// timestamp, if any.
    async fn last_processed_timestamp(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<u64>>;

    /// Highest epoch already sealed with a distribution for `chain_id`.
    async fn max_sealed_epoch(&self, chain_id: RefundChainId) -> anyhow::Result<Option<u64>>;

    async fn distribution_exists(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<bool>;

    /// Distinct `(chain, epoch)` pairs that have transactions but no
    /// distribution yet.
    async fn unsealed_chain_epochs(&self) -> anyhow::Result<Vec<(RefundChainId, u64)>>;

    /// Validated rows of one chain/epoch in canonical order.
    async fn validated_transactions(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>>;

    /// Atomically write the distribution and mark its participations
    /// completed. Partial distributions must never become visible.
    async fn seal_distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
        merkle_root: String,
        total_psp: String,
        participations: Vec<NewParticipation>,
    ) -> anyhow::Result<()>;

    /// All rows of one chain/epoch (read API).
    async fn entries_for_epoch(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>>;

    /// Completed participations of one address on one chain (read API).
    async fn participations_for_address(
        &self,
        chain_id: RefundChainId,
        address: &Address,
    ) -> anyhow::Result<Vec<StoredParticipation>>;

    async fn distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<StoredDistribution>>;
}
