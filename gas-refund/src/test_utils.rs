// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures: an in-memory [`RefundStore`] and row builders.

use crate::store::{BudgetSeed, RefundStore, TransactionUpdate};
use crate::tiers;
use crate::types::{
    format_address, format_hash, parse_amount, RefundChainId, RefundTxStatus, StagedTransaction,
    ONE_E18,
};
use ethers::types::{Address, H256};
use gas_refund_schema::models::{
    NewParticipation, StoredDistribution, StoredParticipation, StoredRefundTransaction,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Mutex;

/// Build an `Idle` row whose persisted price columns re-derive exactly to
/// `refund_usd`: unit prices, so `gasUsedChainCurrency` is chosen as
/// `refund_usd * 10^18 / tier(stake)`.
pub fn row(
    chain_id: u64,
    epoch: u64,
    timestamp: u64,
    hash_low: u64,
    address: &Address,
    stake_whole_psp: &str,
    refund_usd: &str,
) -> StoredRefundTransaction {
    let stake = tiers::psp(stake_whole_psp.parse::<u64>().unwrap());
    let percent = tiers::refund_percent(&stake).unwrap_or(Decimal::ONE);
    let usd = Decimal::from_str(refund_usd).unwrap();
    let gas_used_chain_currency = usd * Decimal::from(ONE_E18) / percent;
    let refund_psp = (gas_used_chain_currency * percent).floor().normalize();

    StoredRefundTransaction {
        id: 0,
        chain_id: chain_id as i64,
        epoch: epoch as i64,
        hash: format_hash(&H256::from_low_u64_be(hash_low)),
        address: format_address(address),
        timestamp: timestamp as i64,
        block_number: 14_000_000 + timestamp as i64,
        gas_used: 210_000,
        gas_used_chain_currency: gas_used_chain_currency.normalize().to_string(),
        psp_chain_currency: "1".to_string(),
        psp_usd: "1".to_string(),
        chain_currency_usd: "1".to_string(),
        total_stake_amount_psp: stake.normalize().to_string(),
        refunded_amount_psp: refund_psp.to_string(),
        refunded_amount_usd: refund_usd.to_string(),
        status: RefundTxStatus::Idle.as_str().to_string(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    transactions: Mutex<Vec<StoredRefundTransaction>>,
    participations: Mutex<Vec<StoredParticipation>>,
    distributions: Mutex<Vec<StoredDistribution>>,
}

impl MemoryStore {
    pub fn new(mut rows: Vec<StoredRefundTransaction>) -> Self {
        for (i, row) in rows.iter_mut().enumerate() {
            row.id = i as i64 + 1;
        }
        Self {
            transactions: Mutex::new(rows),
            participations: Mutex::new(Vec::new()),
            distributions: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> Vec<StoredRefundTransaction> {
        let mut rows = self.transactions.lock().unwrap().clone();
        rows.sort_by_key(|r| r.id);
        rows
    }

    pub fn participations(&self) -> Vec<StoredParticipation> {
        self.participations.lock().unwrap().clone()
    }

    pub fn distributions(&self) -> Vec<StoredDistribution> {
        self.distributions.lock().unwrap().clone()
    }

    pub fn count_by_status(&self, status: RefundTxStatus) -> usize {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status == status.as_str())
            .count()
    }
}

fn canonical(rows: &mut [StoredRefundTransaction]) {
    rows.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.hash.cmp(&b.hash))
    });
}

#[async_trait::async_trait]
impl RefundStore for MemoryStore {
    async fn last_refunded_epoch(&self) -> anyhow::Result<Option<u64>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.status != RefundTxStatus::Idle.as_str())
            .map(|r| r.epoch as u64)
            .max())
    }

    async fn load_budget_seed(&self, from_epoch: u64, to_epoch: u64) -> anyhow::Result<BudgetSeed> {
        let mut seed = BudgetSeed::default();
        for row in self.transactions.lock().unwrap().iter() {
            if row.status != RefundTxStatus::Validated.as_str() {
                continue;
            }
            let epoch = row.epoch as u64;
            if epoch < from_epoch || epoch >= to_epoch {
                continue;
            }
            seed.total_psp += parse_amount(&row.refunded_amount_psp)?;
            *seed
                .yearly_usd_by_address
                .entry(row.address.parse().unwrap())
                .or_insert(Decimal::ZERO) += parse_amount(&row.refunded_amount_usd)?;
        }
        Ok(seed)
    }

    async fn page_transactions(
        &self,
        start_epoch: u64,
        offset: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        let mut rows: Vec<_> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.epoch as u64 >= start_epoch)
            .cloned()
            .collect();
        canonical(&mut rows);
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn apply_updates(&self, updates: Vec<TransactionUpdate>) -> anyhow::Result<()> {
        let mut rows = self.transactions.lock().unwrap();
        for update in updates {
            let row = rows
                .iter_mut()
                .find(|r| r.id == update.id)
                .ok_or_else(|| anyhow::anyhow!("unknown row id {}", update.id))?;
            row.status = update.status.as_str().to_string();
            if let Some(psp) = update.refunded_amount_psp {
                row.refunded_amount_psp = psp;
            }
            if let Some(usd) = update.refunded_amount_usd {
                row.refunded_amount_usd = usd;
            }
        }
        Ok(())
    }

    async fn count_idle(&self, start_epoch: u64) -> anyhow::Result<u64> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.epoch as u64 >= start_epoch && r.status == RefundTxStatus::Idle.as_str())
            .count() as u64)
    }

    async fn insert_staged(&self, batch: Vec<StagedTransaction>) -> anyhow::Result<()> {
        let mut rows = self.transactions.lock().unwrap();
        for tx in batch {
            let hash = format_hash(&tx.tx_hash);
            let chain = tx.chain_id.as_u64() as i64;
            if rows.iter().any(|r| r.chain_id == chain && r.hash == hash) {
                continue;
            }
            let id = rows.len() as i64 + 1;
            rows.push(StoredRefundTransaction {
                id,
                chain_id: chain,
                epoch: tx.epoch as i64,
                hash,
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
            });
        }
        Ok(())
    }

    async fn last_processed_timestamp(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<u64>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.chain_id as u64 == chain_id.as_u64() && r.epoch as u64 == epoch)
            .map(|r| r.timestamp as u64)
            .max())
    }

    async fn max_sealed_epoch(&self, chain_id: RefundChainId) -> anyhow::Result<Option<u64>> {
        Ok(self
            .distributions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.chain_id as u64 == chain_id.as_u64())
            .map(|d| d.epoch as u64)
            .max())
    }

    async fn distribution_exists(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<bool> {
        Ok(self.distribution(chain_id, epoch).await?.is_some())
    }

    async fn unsealed_chain_epochs(&self) -> anyhow::Result<Vec<(RefundChainId, u64)>> {
        let sealed: std::collections::HashSet<(i64, i64)> = self
            .distributions
            .lock()
            .unwrap()
            .iter()
            .map(|d| (d.chain_id, d.epoch))
            .collect();
        let mut pairs: Vec<(i64, i64)> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.chain_id, r.epoch))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        Ok(pairs
            .into_iter()
            .filter(|p| !sealed.contains(p))
            .map(|(c, e)| (RefundChainId::try_from(c as u64).unwrap(), e as u64))
            .collect())
    }

    async fn validated_transactions(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        let mut rows: Vec<_> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.chain_id as u64 == chain_id.as_u64()
                    && r.epoch as u64 == epoch
                    && r.status == RefundTxStatus::Validated.as_str()
            })
            .cloned()
            .collect();
        canonical(&mut rows);
        Ok(rows)
    }

    async fn seal_distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
        merkle_root: String,
        total_psp: String,
        participations: Vec<NewParticipation>,
    ) -> anyhow::Result<()> {
        {
            let mut distributions = self.distributions.lock().unwrap();
            if distributions
                .iter()
                .any(|d| d.chain_id as u64 == chain_id.as_u64() && d.epoch as u64 == epoch)
            {
                anyhow::bail!("distribution already sealed");
            }
            let id = distributions.len() as i64 + 1;
            distributions.push(StoredDistribution {
                id,
                chain_id: chain_id.as_u64() as i64,
                epoch: epoch as i64,
                merkle_root,
                total_psp_amount_to_refund: total_psp,
                is_completed: true,
            });
        }
        let mut stored = self.participations.lock().unwrap();
        for row in participations {
            let id = stored.len() as i64 + 1;
            stored.push(StoredParticipation {
                id,
                chain_id: row.chain_id,
                epoch: row.epoch,
                address: row.address,
                refunded_amount_psp: row.refunded_amount_psp,
                merkle_proofs: row.merkle_proofs,
                is_completed: row.is_completed,
            });
        }
        Ok(())
    }

    async fn entries_for_epoch(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Vec<StoredRefundTransaction>> {
        let mut rows: Vec<_> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.chain_id as u64 == chain_id.as_u64() && r.epoch as u64 == epoch)
            .cloned()
            .collect();
        canonical(&mut rows);
        Ok(rows)
    }

    async fn participations_for_address(
        &self,
        chain_id: RefundChainId,
        address: &Address,
    ) -> anyhow::Result<Vec<StoredParticipation>> {
        let address = format_address(address);
        let mut rows: Vec<_> = self
            .participations
            .lock()
            .unwrap()
            .iter()
            .filter(|p| {
                p.chain_id as u64 == chain_id.as_u64() && p.address == address && p.is_completed
            })
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.epoch);
        Ok(rows)
    }

    async fn distribution(
        &self,
        chain_id: RefundChainId,
        epoch: u64,
    ) -> anyhow::Result<Option<StoredDistribution>> {
        Ok(self
            .distributions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.chain_id as u64 == chain_id.as_u64() && d.epoch as u64 == epoch)
            .cloned())
    }
}
