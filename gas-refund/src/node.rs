// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node assembly: wire config, database, clients and pipeline together.

use crate::budget::{BudgetGuardian, BudgetLimits};
use crate::clients::blocks::{BlockInfoClient, BlockInfoSource};
use crate::clients::explorer::BlockExplorerClient;
use crate::clients::prices::PriceOracleClient;
use crate::clients::redeem::MerkleRedeemClient;
use crate::clients::staking::StakeSubgraphClient;
use crate::clients::subgraph::SwapsSubgraphClient;
use crate::config::RefundNodeConfig;
use crate::ingestion::IngestionDriver;
use crate::lock::ChainLock;
use crate::metrics::RefundMetrics;
use crate::orchestrator::{Orchestrator, RoundSummary};
use crate::server::{self, ApiState};
use crate::stake::StakeAggregator;
use crate::store::{PgRefundStore, RefundStore};
use crate::types::RefundChainId;
use anyhow::Context;
use gas_refund_pg_db::{Db, DbArgs};
use prometheus::Registry;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before unix epoch")
        .as_secs()
}

async fn connect(config: &RefundNodeConfig, db_args: DbArgs) -> anyhow::Result<Db> {
    let url = config
        .database_url
        .parse()
        .context("bad database-url in config")?;
    let db = Db::new(url, db_args).await?;
    db.run_migrations().await?;
    Ok(db)
}

/// Run one full computation round: ingest every configured chain, run the
/// global re-validation pass, seal finished epochs.
pub async fn run_computation_round(
    config: &RefundNodeConfig,
    db_args: DbArgs,
    cancel: CancellationToken,
) -> anyhow::Result<RoundSummary> {
    let validated = config.validate()?;
    let db = connect(config, db_args).await?;

    let registry = Registry::new();
    let metrics = RefundMetrics::new(&registry);

    let swaps = SwapsSubgraphClient::new(validated.swaps_subgraph_urls.clone())?;
    let explorer = BlockExplorerClient::new(
        validated.explorer_urls.clone(),
        config.explorer_api_key.clone(),
    )?;
    let prices = PriceOracleClient::new(config.price_oracle_url.parse()?)?;
    let blocks = BlockInfoClient::new(config.block_info_url.parse()?)?;
    let spsp = StakeSubgraphClient::new(config.spsp_subgraph_url.parse()?)?;
    let safety_module = StakeSubgraphClient::new(config.safety_module_subgraph_url.parse()?)?;

    let now = unix_now();

    // Staking lives on mainnet; one block bound covers the whole run.
    let stake_block = blocks
        .block_after_timestamp(RefundChainId::Mainnet, now)
        .await
        .context("Failed to resolve stake scan bound")?;
    let stakes = StakeAggregator::load(&spsp, &safety_module, stake_block, &config.gates).await?;

    let store = PgRefundStore::new(db.clone());
    let lock = ChainLock::new(db.clone());

    // Seed the optimistic guardian with this year's validated totals so
    // the global-spend early abort has a real baseline.
    let guardian = {
        let current = config.epochs.current_epoch(now).unwrap_or(config.epochs.genesis_epoch);
        let seed = store
            .load_budget_seed(config.epochs.year_start_of(current), current + 1)
            .await?;
        let mut guardian = BudgetGuardian::new(BudgetLimits::default(), &config.epochs);
        guardian.seed(seed.total_psp, seed.yearly_usd_by_address);
        Mutex::new(guardian)
    };

    let workers: Vec<(RefundChainId, IngestionDriver<'_>)> = validated
        .chains
        .iter()
        .map(|chain_id| {
            (
                *chain_id,
                IngestionDriver {
                    swaps: &swaps,
                    gas: &explorer,
                    prices: &prices,
                    blocks: &blocks,
                    stakes: &stakes,
                    store: &store,
                    guardian: &guardian,
                    calendar: &config.epochs,
                    gates: &config.gates,
                    reorg_blacklist: &validated.reorg_blacklists[chain_id],
                    contract_whitelist: &validated.contract_whitelist,
                    metrics: &metrics,
                },
            )
        })
        .collect();

    let orchestrator = Orchestrator {
        store: &store,
        calendar: &config.epochs,
        gates: &config.gates,
        limits: BudgetLimits::default(),
        lock: Some(&lock),
        metrics: &metrics,
    };

    let summary = orchestrator.run_round(workers, now, &cancel).await?;
    if summary.cancelled {
        warn!("Round cancelled; persisted state is consistent and will resume");
    } else {
        info!(
            "Round complete: {} epochs ingested, {} sealed",
            summary.ingested.len(),
            summary.sealed.len()
        );
    }
    Ok(summary)
}

/// Serve the claim read API (plus /metrics) until shutdown.
pub async fn run_api_server(config: &RefundNodeConfig, db_args: DbArgs) -> anyhow::Result<()> {
    let validated = config.validate()?;
    let db = connect(config, db_args).await?;

    let registry = Registry::new();
    // Registered for the scrape endpoint even though the server itself
    // only reads.
    let _metrics = RefundMetrics::new(&registry);

    let store: Arc<dyn RefundStore> = Arc::new(PgRefundStore::new(db));
    let claims = Arc::new(MerkleRedeemClient::new(
        &validated.rpc_urls,
        &validated.merkle_redeem_addresses,
    )?);

    server::serve(
        ApiState {
            store,
            claims,
            registry,
        },
        config.server_listen_port,
    )
    .await
}
