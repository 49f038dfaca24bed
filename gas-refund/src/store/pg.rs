// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Postgres-backed [`RefundStore`].

use super::{BudgetSeed, RefundStore, TransactionUpdate};
use crate::types::{
    format_address, format_hash, parse_address, parse_amount, RefundChainId, RefundTxStatus,
    StagedTransaction,
};
use anyhow::Context;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use ethers::types::Address;
use gas_refund_pg_db::Db;
use gas_refund_schema::models::{
    NewDistribution, NewParticipation, NewRefundTransaction, StoredDistribution,
    StoredParticipation, StoredRefundTransaction,
};
use gas_refund_schema::schema::{
    gas_refund_distribution, gas_refund_participation, gas_refund_transaction,
};
use rust_decimal::Decimal;
use tracing::debug;

#[derive(Clone)]
pub struct PgRefundStore {
    db: Db,
}

impl PgRefundStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn staged_to_row(tx: &StagedTransaction) -> NewRefundTransaction {
    NewRefundTransaction {
        chain_id: tx.chain_id.as_u64() as i64,
        epoch: tx.epoch as i64,
        hash: format_hash(&tx.tx_hash),
        address: format_address(&tx.address),
        timestamp: tx.timestamp as i64,
        block_number: tx.block_number as i64,
        gas_used: tx.gas_used as i64,
        gas_used_chain_currency: tx.gas_used_chain_currency.to_string(),
        psp_chain_currency: tx.psp_chain_currency.to_string(),
        psp_usd: tx.psp_usd.to_string(),
        chain_currency_usd: tx.chain_currency_usd.to_string(),
        total_stake_amount_psp: tx.total_stake_amount_psp.to_string(),
        refunded_amount_psp: tx.refunded_amount_psp.to_string(),
        refunded_amount_usd: tx.refunded_amount_usd.to_string(),
        status: RefundTxStatus::Idle.as_str().to_string(),
    }
}

#[async_trait::async_trait]
impl RefundStore for PgRefundStore {
    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<u64>> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        let result: Option<i64> = dsl::gas_refund_transaction
            .filter(dsl::status.ne(RefundTxStatus::Idle.as_str()))
            .select(max(dsl::epoch))
            .first(&mut conn)
            .await?;
        Ok(result.map(|e| e as u64))
    }

    async fn load_budget_seed(&self, from_epoch: u64, to_epoch: u64) -> anyhow::Result<BudgetSeed> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        let rows: Vec<(String, String, String)> = dsl::gas_refund_transaction
            .filter(dsl::status.eq(RefundTxStatus::Validated.as_str()))
            .filter(dsl::epoch.ge(from_epoch as i64))
            .filter(dsl::epoch.lt(to_epoch as i64))
            .select((dsl::address, dsl::refunded_amount_psp, dsl::refunded_amount_usd))
            .load(&mut conn)
            .await?;

        let mut seed = BudgetSeed::default();
        for (address, psp, usd) in rows {
            let address = parse_address(&address)?;
            seed.total_psp += parse_amount(&psp)?;
            *seed
                .yearly_usd_by_address
                .entry(address)
                .or_insert(Decimal::ZERO) += parse_amount(&usd)?;
        }
        Ok(seed)
    }

    async fn page_transactions(
        &self,
        start_epoch: u64,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        Ok(dsl::gas_refund_transaction
            .filter(dsl::epoch.ge(start_epoch as i64))
            .order((dsl::timestamp.asc(), dsl::hash.asc()))
            .limit(limit)
            .offset(offset)
            .select(StoredRefundTransaction::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn apply_updates(&self, updates: Vec<TransactionUpdate>) -> anyhow::Result<()> {
        use gas_refund_transaction::dsl;

        if updates.is_empty() {
            return Ok(());
        }
        let count = updates.len();

        let mut conn = self.db.connect().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                for update in updates {
                    let target = dsl::gas_refund_transaction.filter(dsl::id.eq(update.id));
                    match (&update.refunded_amount_psp, &update.refunded_amount_usd) {
                        (Some(psp), Some(usd)) => {
                            diesel::update(target)
                                .set((
                                    dsl::status.eq(update.status.as_str()),
                                    dsl::refunded_amount_psp.eq(psp),
                                    dsl::refunded_amount_usd.eq(usd),
                                ))
                                .execute(conn)
                                .await?;
                        }
                        (Some(psp), None) => {
                            diesel::update(target)
                                .set((
                                    dsl::status.eq(update.status.as_str()),
                                    dsl::refunded_amount_psp.eq(psp),
                                ))
                                .execute(conn)
                                .await?;
                        }
                        (None, Some(usd)) => {
                            diesel::update(target)
                                .set((
                                    dsl::status.eq(update.status.as_str()),
                                    dsl::refunded_amount_usd.eq(usd),
                                ))
                                .execute(conn)
                                .await?;
                        }
                        (None, None) => {
                            diesel::update(target)
                                .set(dsl::status.eq(update.status.as_str()))
                                .execute(conn)
                                .await?;
                        }
                    }
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .context("Failed to apply re-validation updates")?;

        debug!("Applied {} transaction updates", count);
        Ok(())
    }

    async fn count_idle(&self, start_epoch: u64) -> anyhow::Result<u64> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        let count: i64 = dsl::gas_refund_transaction
            .filter(dsl::epoch.ge(start_epoch as i64))
            .filter(dsl::status.eq(RefundTxStatus::Idle.as_str()))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    async fn insert_staged(&self, batch: Vec<StagedTransaction>) -> anyhow::Result<()> {
        use gas_refund_transaction::dsl;

        if batch.is_empty() {
            return Ok(());
        }
        let rows: Vec<NewRefundTransaction> = batch.iter().map(staged_to_row).collect();

        let mut conn = self.db.connect().await?;
        diesel::insert_into(dsl::gas_refund_transaction)
            .values(&rows)
            .on_conflict((dsl::chain_id, dsl::hash))
            .do_nothing()
            .execute(&mut conn)
            .await
            .context("Failed to stage refund transactions")?;
        Ok(())
    }

    async fn last_processed_timestamp(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<u64>> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        let result: Option<i64> = dsl::gas_refund_transaction
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .filter(dsl::epoch.eq(epoch as i64))
            .select(max(dsl::timestamp))
            .first(&mut conn)
            .await?;
        Ok(result.map(|t| t as u64))
    }

    async fn max_sealed_epoch(&self, chain_id: RefundChainId) -> anyhow::Result<Option<u64>> {
        use gas_refund_distribution::dsl;

        let mut conn = self.db.connect().await?;
        let result: Option<i64> = dsl::gas_refund_distribution
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .select(max(dsl::epoch))
            .first(&mut conn)
            .await?;
        Ok(result.map(|e| e as u64))
    }

    async fn distribution_exists(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<bool> {
        Ok(self.distribution(chain_id, epoch).await?.is_some())
    }

    async fn unsealed_chain_epochs(&self) -> anyhow::Result<Vec<(RefundChainId, u64)>> {
        use gas_refund_distribution::dsl as dist;
        use gas_refund_transaction::dsl as tx;

        let mut conn = self.db.connect().await?;
        let with_rows: Vec<(i64, i64)> = tx::gas_refund_transaction
            .select((tx::chain_id, tx::epoch))
            .distinct()
            .order((tx::chain_id.asc(), tx::epoch.asc()))
            .load(&mut conn)
            .await?;
        let sealed: Vec<(i64, i64)> = dist::gas_refund_distribution
            .select((dist::chain_id, dist::epoch))
            .load(&mut conn)
            .await?;

        let sealed: std::collections::HashSet<(i64, i64)> = sealed.into_iter().collect();
        let mut unsealed = Vec::new();
        for (chain, epoch) in with_rows {
            if sealed.contains(&(chain, epoch)) {
                continue;
            }
            let chain = RefundChainId::try_from(chain as u64)
                .map_err(|e| anyhow::anyhow!("corrupt chain_id in store: {e}"))?;
            unsealed.push((chain, epoch as u64));
        }
        Ok(unsealed)
    }

    async fn validated_transactions(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        Ok(dsl::gas_refund_transaction
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .filter(dsl::epoch.eq(epoch as i64))
            .filter(dsl::status.eq(RefundTxStatus::Validated.as_str()))
            .order((dsl::timestamp.asc(), dsl::hash.asc()))
            .select(StoredRefundTransaction::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn seal_distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
        merkle_root: String,
        total_psp: String,
        participations: Vec<NewParticipation>,
    ) -> anyhow::Result<()> {
        use gas_refund_distribution::dsl as dist;
        use gas_refund_participation::dsl as part;

        let mut conn = self.db.connect().await?;
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                diesel::insert_into(dist::gas_refund_distribution)
                    .values(NewDistribution {
                        chain_id: chain_id.as_u64() as i64,
                        epoch: epoch as i64,
                        merkle_root,
                        total_psp_amount_to_refund: total_psp,
                        is_completed: true,
                    })
                    .execute(conn)
                    .await?;

                for row in participations {
                    diesel::insert_into(part::gas_refund_participation)
                        .values(&row)
                        .on_conflict((part::epoch, part::address, part::chain_id))
                        .do_update()
                        .set((
                            part::refunded_amount_psp.eq(&row.refunded_amount_psp),
                            part::merkle_proofs.eq(&row.merkle_proofs),
                            part::is_completed.eq(true),
                        ))
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .with_context(|| format!("Failed to seal distribution for chain {chain_id} epoch {epoch}"))?;
        Ok(())
    }

    async fn entries_for_epoch(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        use gas_refund_transaction::dsl;

        let mut conn = self.db.connect().await?;
        Ok(dsl::gas_refund_transaction
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .filter(dsl::epoch.eq(epoch as i64))
            .order((dsl::timestamp.asc(), dsl::hash.asc()))
            .select(StoredRefundTransaction::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn participations_for_address(
        &self,
        chain_id: RefundChainId,
        address: &Address,
    ) -> anyhow::Result<Vec<StoredParticipation>> {
        use gas_refund_participation::dsl;

        let mut conn = self.db.connect().await?;
        Ok(dsl::gas_refund_participation
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .filter(dsl::address.eq(format_address(address)))
            .filter(dsl::is_completed.eq(true))
            .order(dsl::epoch.asc())
            .select(StoredParticipation::as_select())
            .load(&mut conn)
            .await?)
    }

    async fn distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<StoredDistribution>> {
        use gas_refund_distribution::dsl;

        let mut conn = self.db.connect().await?;
        Ok(dsl::gas_refund_distribution
            .filter(dsl::chain_id.eq(chain_id.as_u64() as i64))
            .filter(dsl::epoch.eq(epoch as i64))
            .select(StoredDistribution::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }
}
