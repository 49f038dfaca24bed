// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Round orchestration across chains and epochs.
//!
//! One worker per supported chain, each holding the chain's advisory lock
//! for the whole scan. Workers are joined with settled semantics: one
//! chain failing does not cancel the others. Re-validation and Merkle
//! sealing run only after every worker finished cleanly, so an aborted
//! round can never publish a root computed from partial data.

use crate::budget::BudgetLimits;
use crate::epoch::{EpochCalendar, EpochGates};
use crate::error::{RefundError, RefundResult};
use crate::ingestion::IngestionDriver;
use crate::lock::ChainLock;
use crate::merkle::MerkleSealer;
use crate::metrics::RefundMetrics;
use crate::revalidation::{RevalidationPass, RevalidationSummary};
use crate::store::RefundStore;
use crate::types::RefundChainId;
use futures::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct RoundSummary {
    pub ingested: Vec<(RefundChainId, u64, u64)>,
    pub revalidation: Option<RevalidationSummary>,
    pub sealed: Vec<(RefundChainId, u64)>,
    pub cancelled: bool,
}

pub struct Orchestrator<'a> {
    pub store: &'a dyn RefundStore,
    pub calendar: &'a EpochCalendar,
    pub gates: &'a EpochGates,
    pub limits: BudgetLimits,
    // None only in tests; production always locks per chain.
    pub lock: Option<&'a ChainLock>,
    pub metrics: &'a RefundMetrics,
}

impl Orchestrator<'_> {
    /// Drive one full round: ingest all chains, re-validate globally,
    /// seal every finished epoch.
    pub async fn run_round(
        &self,
        workers: Vec<(RefundChainId, IngestionDriver<'_>)>,
        now: u64,
        cancel: &CancellationToken,
    ) -> RefundResult<RoundSummary> {
        let mut summary = RoundSummary::default();

        let results = join_all(workers.into_iter().map(|(chain_id, driver)| async move {
            (chain_id, self.run_chain(chain_id, driver, now, cancel).await)
        }))
        .await;

        let mut failed = false;
        for (chain_id, result) in results {
            match result {
                Ok(ingested) => summary.ingested.extend(ingested),
                Err(e) => {
                    error!("[{}] Chain worker failed: {e}", chain_id);
                    failed = true;
                    if e.is_fatal_to_run() {
                        return Err(e);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }
        if failed {
            // A half-indexed round must not be classified or sealed; the
            // next round resumes from the persisted watermarks.
            warn!("Skipping re-validation and sealing: at least one chain failed");
            return Ok(summary);
        }

        let revalidation =
            RevalidationPass::new(self.store, self.calendar, self.gates, self.limits.clone())
                .run()
                .await?;
        self.metrics
            .transactions_validated
            .with_label_values(&["latest"])
            .set(revalidation.validated as i64);
        self.metrics
            .transactions_rejected
            .with_label_values(&["latest"])
            .set(revalidation.rejected as i64);
        let scale = Decimal::from(crate::types::ONE_E18);
        let whole_psp = (revalidation.total_psp_refunded_for_year / scale).floor();
        self.metrics
            .total_psp_refunded_for_year
            .set(whole_psp.to_i64().unwrap_or(i64::MAX));
        summary.revalidation = Some(revalidation);

        summary.sealed = self.seal_finished_epochs(now).await?;
        Ok(summary)
    }

    async fn run_chain(
        &self,
        chain_id: RefundChainId,
        driver: IngestionDriver<'_>,
        now: u64,
        cancel: &CancellationToken,
    ) -> RefundResult<Vec<(RefundChainId, u64, u64)>> {
        let guard = match self.lock {
            Some(lock) => Some(
                lock.acquire(chain_id)
                    .await
                    .map_err(|e| RefundError::Lock(e.to_string()))?,
            ),
            None => None,
        };

        let result = self.run_chain_locked(chain_id, driver, now, cancel).await;

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                warn!("[{}] Failed to release chain lock: {e}", chain_id);
            }
        }
        result
    }

    async fn run_chain_locked(
        &self,
        chain_id: RefundChainId,
        driver: IngestionDriver<'_>,
        now: u64,
        cancel: &CancellationToken,
    ) -> RefundResult<Vec<(RefundChainId, u64, u64)>> {
        let Some(current_epoch) = self.calendar.current_epoch(now) else {
            return Ok(vec![]);
        };
        if current_epoch == self.calendar.genesis_epoch {
            return Ok(vec![]);
        }

        let first = match self
            .store
            .max_sealed_epoch(chain_id)
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?
        {
            Some(sealed) => sealed + 1,
            None => self.calendar.genesis_epoch,
        };

        let mut ingested = Vec::new();
        // Only finished epochs are scanned; the running epoch waits.
        for epoch in first..current_epoch {
            if cancel.is_cancelled() {
                info!("[{}] Cancelled before epoch {}", chain_id, epoch);
                break;
            }
            if self
                .store
                .distribution_exists(chain_id, epoch)
                .await
                .map_err(|e| RefundError::Storage(e.to_string()))?
            {
                // Expected skip: another process already sealed it.
                continue;
            }

            let outcome = driver.ingest_epoch(chain_id, epoch, now).await?;
            ingested.push((chain_id, epoch, outcome.staged));
            if outcome.aborted_on_budget {
                break;
            }
        }
        Ok(ingested)
    }

    async fn seal_finished_epochs(&self, now: u64) -> RefundResult<Vec<(RefundChainId, u64)>> {
        let sealer = MerkleSealer::new(self.store);
        let mut sealed = Vec::new();
        for (chain_id, epoch) in self
            .store
            .unsealed_chain_epochs()
            .await
            .map_err(|e| RefundError::Storage(e.to_string()))?
        {
            if !self.calendar.is_finished(epoch, now) {
                continue;
            }
            sealer.seal_epoch(chain_id, epoch).await?;
            self.metrics
                .epochs_sealed
                .with_label_values(&[chain_id.name()])
                .inc();
            sealed.push((chain_id, epoch));
        }
        Ok(sealed)
    }
}
