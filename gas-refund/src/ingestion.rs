// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Time-sliced ingestion of one `(chain, epoch)`.
//!
//! The epoch's calc interval is scanned in fixed 6-hour windows. Each
//! window fetches swaps by block range, qualifies them, enriches the
//! survivors with explorer gas usage (bounded parallel I/O), computes the
//! refund, and persists the batch atomically with `status = Idle`. Resume
//! is idempotent: the scan continues after the newest persisted swap
//! timestamp. The chain loop aborts early once the global PSP pool is
//! optimistically spent.

use crate::budget::BudgetGuardian;
use crate::calculator::stage_transaction;
use crate::clients::blocks::BlockInfoSource;
use crate::clients::explorer::GasUsedSource;
use crate::clients::prices::{PriceFeed, PriceResolver};
use crate::clients::subgraph::SwapSource;
use crate::epoch::{EpochCalendar, EpochGates};
use crate::error::{RefundError, RefundResult};
use crate::metrics::RefundMetrics;
use crate::qualifier::SwapQualifier;
use crate::retry_with_max_elapsed_time;
use crate::stake::StakeAggregator;
use crate::store::RefundStore;
use crate::types::{format_hash, QualifiedSwap, RefundChainId, StagedTransaction};
use ethers::types::{Address, H256};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Scan window width.
pub const SLICE_SECS: u64 = 6 * 60 * 60;

/// Concurrent explorer lookups per slice.
const GAS_LOOKUP_CONCURRENCY: usize = 8;

const MAX_RETRY_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub slices: u64,
    pub staged: u64,
    /// True when the scan stopped because the global budget ran out.
    pub aborted_on_budget: bool,
}

pub struct IngestionDriver<'a> {
    pub swaps: &'a dyn SwapSource,
    pub gas: &'a dyn GasUsedSource,
    pub prices: &'a dyn PriceFeed,
    pub blocks: &'a dyn BlockInfoSource,
    pub stakes: &'a StakeAggregator,
    pub store: &'a dyn RefundStore,
    pub guardian: &'a Mutex<BudgetGuardian>,
    pub calendar: &'a EpochCalendar,
    pub gates: &'a EpochGates,
    pub reorg_blacklist: &'a HashSet<H256>,
    pub contract_whitelist: &'a HashSet<Address>,
    pub metrics: &'a RefundMetrics,
}

impl IngestionDriver<'_> {
    pub async fn ingest_epoch(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
        now: u64,
    ) -> RefundResult<IngestionOutcome> {
        let mut outcome = IngestionOutcome::default();

        let Some((start_calc, end_calc)) = self.calendar.calc_interval(epoch, now) else {
            return Ok(outcome);
        };

        // Resume after the newest persisted swap of this chain/epoch.
        let resume = self
            .store
            .last_processed_timestamp(chain_id, epoch)
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?
            .map(|t| t + 1)
            .unwrap_or(start_calc);
        let mut cursor = resume.max(start_calc);
        if cursor >= end_calc {
            return Ok(outcome);
        }

        info!(
            "[{}] Ingesting epoch {}: {}..{} (calc {}..{})",
            chain_id, epoch, cursor, end_calc, start_calc, end_calc
        );

        let rates = match retry_with_max_elapsed_time!(
            self.prices.daily_rates(chain_id, start_calc, end_calc),
            MAX_RETRY_DURATION
        ) {
            Ok(Ok(rates)) => rates,
            _ => {
                return Err(self.client_error(RefundError::PriceOracle(format!(
                    "daily rates unavailable for {chain_id} epoch {epoch}"
                ))))
            }
        };
        let resolver = PriceResolver::new(rates);

        let qualifier = SwapQualifier::new(
            self.stakes,
            self.gates,
            self.reorg_blacklist,
            self.contract_whitelist,
        );

        while cursor < end_calc {
            if self.guardian.lock().unwrap().is_global_spent() {
                warn!(
                    "[{}] Global PSP budget spent, aborting epoch {} scan",
                    chain_id, epoch
                );
                outcome.aborted_on_budget = true;
                break;
            }

            let slice_end = (cursor + SLICE_SECS).min(end_calc);
            let staged = self
                .ingest_slice(chain_id, epoch, cursor, slice_end, &resolver, &qualifier)
                .await?;

            outcome.slices += 1;
            outcome.staged += staged;
            cursor = slice_end;
        }

        self.metrics
            .last_processed_epoch
            .with_label_values(&[chain_id.name()])
            .set(epoch as i64);
        Ok(outcome)
    }

    async fn ingest_slice(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
        t0: u64,
        t1: u64,
        resolver: &PriceResolver,
        qualifier: &SwapQualifier<'_>,
    ) -> RefundResult<u64> {
        let block_gte = self.block_after(chain_id, t0).await?;
        let block_lt = self.block_after(chain_id, t1).await?;

        let swaps = match retry_with_max_elapsed_time!(
            self.swaps.fetch_swaps(chain_id, block_gte, block_lt),
            MAX_RETRY_DURATION
        ) {
            Ok(Ok(swaps)) => swaps,
            _ => {
                return Err(self.client_error(RefundError::Subgraph(format!(
                    "swaps unavailable for {chain_id} blocks {block_gte}..{block_lt}"
                ))))
            }
        };
        self.metrics
            .swaps_fetched
            .with_label_values(&[chain_id.name()])
            .inc_by(swaps.len() as u64);

        // Block bounds overshoot the time slice; keep the slice exact.
        let swaps: Vec<_> = swaps
            .into_iter()
            .filter(|s| s.timestamp >= t0 && s.timestamp < t1)
            .collect();

        let qualified = qualifier.qualify(epoch, swaps)?;
        self.metrics
            .swaps_qualified
            .with_label_values(&[chain_id.name()])
            .inc_by(qualified.len() as u64);
        if qualified.is_empty() {
            return Ok(0);
        }

        // Bounded-parallel gas lookups; `buffered` keeps input order so
        // the staged batch stays chronological.
        let enriched: Vec<(QualifiedSwap, u64)> = stream::iter(qualified.into_iter().map(|q| {
            let gas = self.gas;
            let metrics = self.metrics;
            async move {
                let tx_hash = q.swap.tx_hash;
                match retry_with_max_elapsed_time!(
                    gas.transaction_gas_used(chain_id, tx_hash),
                    MAX_RETRY_DURATION
                ) {
                    Ok(Ok(gas_used)) => Ok((q, gas_used)),
                    _ => {
                        let err = RefundError::Explorer(format!(
                            "gasUsed unavailable for {} on {chain_id}",
                            format_hash(&tx_hash)
                        ));
                        metrics
                            .client_errors
                            .with_label_values(&[err.error_type()])
                            .inc();
                        Err(err)
                    }
                }
            }
        }))
        .buffered(GAS_LOOKUP_CONCURRENCY)
        .try_collect()
        .await?;

        let mut batch: Vec<StagedTransaction> = Vec::with_capacity(enriched.len());
        for (q, gas_used) in enriched {
            let price = resolver.resolve(q.swap.timestamp).ok_or_else(|| {
                RefundError::MissingPricePoint {
                    chain_id: chain_id.as_u64(),
                    tx_hash: format_hash(&q.swap.tx_hash),
                    timestamp: q.swap.timestamp,
                }
            })?;
            let staged = stage_transaction(&q, gas_used, price, epoch, self.gates)?;

            // Optimistic accounting: enough signal for the early abort;
            // the re-validation pass is the authority.
            self.guardian.lock().unwrap().commit(
                &staged.address,
                staged.refunded_amount_usd,
                staged.refunded_amount_psp,
                epoch >= self.gates.epoch_budget_epoch,
            );
            batch.push(staged);
        }

        let staged_count = batch.len() as u64;
        self.store
            .insert_staged(batch)
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?;
        self.metrics
            .transactions_staged
            .with_label_values(&[chain_id.name()])
            .inc_by(staged_count);

        Ok(staged_count)
    }

    async fn block_after(&self, chain_id: RefundChainId, timestamp: u64) -> RefundResult<u64> {
        match retry_with_max_elapsed_time!(
            self.blocks.block_after_timestamp(chain_id, timestamp),
            MAX_RETRY_DURATION
        ) {
            Ok(Ok(block)) => Ok(block),
            _ => Err(self.client_error(RefundError::Generic(format!(
                "block-after-timestamp unavailable for {chain_id} at {timestamp}"
            )))),
        }
    }

    /// Count an upstream failure under its error-type label and pass the
    /// error through.
    fn client_error(&self, err: RefundError) -> RefundError {
        self.metrics
            .client_errors
            .with_label_values(&[err.error_type()])
            .inc();
        err
    }
}
