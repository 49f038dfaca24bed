// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Global re-validation of persisted refund transactions.
//!
//! Late-arriving data can change the chronological order of recorded
//! transactions, and every transaction's classification depends on all
//! transactions before it in the canonical `(timestamp ASC, hash ASC)`
//! order. The pass therefore replays everything after the last refunded
//! epoch: re-deriving amounts, re-running the caps and flipping `Idle`
//! rows to `Validated` or `Rejected`. It is strictly single-threaded; the
//! budget accounting is serial by construction.
//!
//! Determinism contract: identical row sets produce byte-identical
//! `(status, refundedAmountPSP, refundedAmountUSD)` regardless of page
//! size or concurrency elsewhere in the process.

use crate::budget::{BudgetGuardian, BudgetLimits};
use crate::calculator::compute_refund;
use crate::epoch::{EpochCalendar, EpochGates};
use crate::error::{RefundError, RefundResult};
use crate::store::{RefundStore, TransactionUpdate, REVALIDATION_PAGE_SIZE};
use crate::tiers;
use crate::types::{parse_address, parse_amount, PricePoint, RefundTxStatus};
use gas_refund_schema::models::StoredRefundTransaction;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RevalidationSummary {
    pub start_epoch: u64,
    pub scanned: u64,
    pub validated: u64,
    pub rejected: u64,
    pub capped: u64,
    pub updated: u64,
    /// Wei-scale PSP total committed for the year the pass ended in.
    pub total_psp_refunded_for_year: Decimal,
}

pub struct RevalidationPass<'a> {
    store: &'a dyn RefundStore,
    calendar: &'a EpochCalendar,
    gates: &'a EpochGates,
    limits: BudgetLimits,
    page_size: i64,
}

impl<'a> RevalidationPass<'a> {
    pub fn new(
        store: &'a dyn RefundStore,
        calendar: &'a EpochCalendar,
        gates: &'a EpochGates,
        limits: BudgetLimits,
    ) -> Self {
        Self {
            store,
            calendar,
            gates,
            limits,
            page_size: REVALIDATION_PAGE_SIZE,
        }
    }

    /// Override the scan page size. Results must not depend on it; the
    /// tests hold the pass to that.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub async fn run(&self) -> RefundResult<RevalidationSummary> {
        let start_epoch = match self.store.last_refunded_epoch().await.map_err(storage)? {
            Some(last) => last + 1,
            None => self.calendar.genesis_epoch,
        };

        let seed = self
            .store
            .load_budget_seed(self.calendar.year_start_of(start_epoch), start_epoch)
            .await
            .map_err(storage)?;
        let mut guardian = BudgetGuardian::new(self.limits.clone(), self.calendar);
        guardian.seed(seed.total_psp, seed.yearly_usd_by_address);

        info!(
            "Re-validation starting at epoch {} (seeded {} PSP for the year)",
            start_epoch,
            guardian.total_psp_refunded_for_year()
        );

        let mut summary = RevalidationSummary {
            start_epoch,
            ..Default::default()
        };
        let mut updates: Vec<TransactionUpdate> = Vec::new();
        let mut prev_epoch = start_epoch;
        let mut offset = 0i64;

        loop {
            let page = self
                .store
                .page_transactions(start_epoch, offset, self.page_size)
                .await
                .map_err(storage)?;
            if page.is_empty() {
                break;
            }
            offset += page.len() as i64;
            let last_page = (page.len() as i64) < self.page_size;

            for row in page {
                self.process_row(&row, &mut guardian, &mut prev_epoch, &mut updates, &mut summary)?;
            }

            if last_page {
                break;
            }
        }

        summary.updated = updates.len() as u64;
        summary.total_psp_refunded_for_year = guardian.total_psp_refunded_for_year();
        self.store.apply_updates(updates).await.map_err(storage)?;

        let idle = self.store.count_idle(start_epoch).await.map_err(storage)?;
        if idle > 0 {
            return Err(RefundError::IdleAfterRevalidation(idle));
        }

        info!(
            "Re-validation done: scanned={} validated={} rejected={} capped={} updated={}",
            summary.scanned, summary.validated, summary.rejected, summary.capped, summary.updated
        );
        Ok(summary)
    }

    fn process_row(
        &self,
        row: &StoredRefundTransaction,
        guardian: &mut BudgetGuardian,
        prev_epoch: &mut u64,
        updates: &mut Vec<TransactionUpdate>,
        summary: &mut RevalidationSummary,
    ) -> RefundResult<()> {
        summary.scanned += 1;
        let epoch = row.epoch as u64;

        if epoch != *prev_epoch {
            guardian.begin_epoch(epoch);
            *prev_epoch = epoch;
        }

        let address = parse_address(&row.address).map_err(|e| storage_row(row, e))?;
        let stake = parse_amount(&row.total_stake_amount_psp).map_err(|e| storage_row(row, e))?;
        let gas_used_chain_currency =
            parse_amount(&row.gas_used_chain_currency).map_err(|e| storage_row(row, e))?;
        let price = PricePoint {
            timestamp: row.timestamp as u64,
            psp_price_usd: parse_amount(&row.psp_usd).map_err(|e| storage_row(row, e))?,
            chain_price_usd: parse_amount(&row.chain_currency_usd)
                .map_err(|e| storage_row(row, e))?,
            psp_per_native: parse_amount(&row.psp_chain_currency)
                .map_err(|e| storage_row(row, e))?,
        };
        let stored_status =
            RefundTxStatus::from_str(&row.status).map_err(RefundError::Storage)?;

        let percent =
            tiers::refund_percent(&stake).ok_or_else(|| RefundError::TierContradiction {
                address: row.address.clone(),
                stake: stake.to_string(),
            })?;

        // Amounts may need re-capping even when the raw values are
        // unchanged, so always re-derive from the persisted inputs.
        let breakdown = compute_refund(
            gas_used_chain_currency,
            &price,
            percent,
            epoch == self.gates.precision_glitch_epoch,
        )?;

        let epoch_budget_active = epoch >= self.gates.epoch_budget_epoch;

        let spent = guardian.is_global_spent()
            || guardian.has_address_spent_yearly(&address)
            || (epoch_budget_active && guardian.has_address_spent_epoch(&address));

        let (new_status, capped_psp, capped_usd) = if spent {
            (RefundTxStatus::Rejected, None, None)
        } else {
            let caps = guardian.apply_caps(
                &address,
                epoch,
                breakdown.refund_usd,
                breakdown.refund_psp,
                price.psp_price_usd,
                epoch_budget_active,
            )?;
            guardian.commit(
                &address,
                caps.capped_usd.unwrap_or(breakdown.refund_usd),
                caps.capped_psp.unwrap_or(breakdown.refund_psp),
                epoch_budget_active,
            );
            (RefundTxStatus::Validated, caps.capped_psp, caps.capped_usd)
        };

        match new_status {
            RefundTxStatus::Validated => summary.validated += 1,
            RefundTxStatus::Rejected => summary.rejected += 1,
            RefundTxStatus::Idle => unreachable!("re-validation never emits IDLE"),
        }
        let was_capped = capped_psp.is_some() || capped_usd.is_some();
        if was_capped {
            summary.capped += 1;
            if new_status == RefundTxStatus::Validated && capped_usd.is_some() {
                warn!(
                    "Capped refund for {} in epoch {}: tx {}",
                    row.address, epoch, row.hash
                );
            }
        }

        if new_status != stored_status || was_capped {
            updates.push(TransactionUpdate {
                id: row.id,
                status: new_status,
                // PSP amounts persist as integer strings; USD keeps full
                // precision, downstream accounting depends on it.
                refunded_amount_psp: capped_psp.map(|d| d.floor().normalize().to_string()),
                refunded_amount_usd: capped_usd.map(|d| full_precision(&d)),
            });
        }
        Ok(())
    }
}

fn full_precision(d: &Decimal) -> String {
    d.to_string()
}

fn storage(e: anyhow::Error) -> RefundError {
    RefundError::Storage(e.to_string())
}

fn storage_row(row: &StoredRefundTransaction, e: anyhow::Error) -> RefundError {
    RefundError::Storage(format!("row {} ({}): {e}", row.id, row.hash))
}
