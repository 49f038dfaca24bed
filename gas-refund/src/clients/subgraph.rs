// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Swaps subgraph client.
//!
//! Queries aggregator swaps per chain over a block range, paginated with
//! `(first, skip)` and ordered by timestamp. The subgraph's `txGasPrice`
//! is trusted; its gas-used field is not (the explorer supplies that).

use crate::types::{RefundChainId, Swap};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

const PAGE_SIZE: usize = 1000;

const SWAPS_QUERY: &str = r#"
query ($block_gte: BigInt!, $block_lt: BigInt!, $first: Int!, $skip: Int!) {
  swaps(
    where: { blockNumber_gte: $block_gte, blockNumber_lt: $block_lt }
    orderBy: timestamp
    orderDirection: asc
    first: $first
    skip: $skip
  ) {
    txHash
    blockHash
    txOrigin
    initiator
    txGasPrice
    blockNumber
    timestamp
  }
}"#;

#[async_trait::async_trait]
pub trait SwapSource: Send + Sync {
    /// All successful swaps with `block_gte <= blockNumber < block_lt`.
    async fn fetch_swaps(
        &self,
        chain_id: RefundChainId,
        block_gte: u64,
        block_lt: u64,
    ) -> anyhow::Result<Vec<Swap>>;
}

pub struct SwapsSubgraphClient {
    http: reqwest::Client,
    url_by_chain: HashMap<RefundChainId, Url>,
}

impl SwapsSubgraphClient {
    pub fn new(url_by_chain: HashMap<RefundChainId, Url>) -> anyhow::Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            url_by_chain,
        })
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<SwapsData>,
    errors: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SwapsData {
    swaps: Vec<RawSwap>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSwap {
    tx_hash: String,
    block_hash: String,
    tx_origin: String,
    initiator: String,
    tx_gas_price: String,
    block_number: String,
    timestamp: String,
}

impl RawSwap {
    fn into_swap(self, chain_id: RefundChainId) -> anyhow::Result<Swap> {
        Ok(Swap {
            chain_id,
            tx_hash: self.tx_hash.parse().context("bad txHash")?,
            block_hash: self.block_hash.parse().context("bad blockHash")?,
            tx_origin: self.tx_origin.parse().context("bad txOrigin")?,
            initiator: self.initiator.parse().context("bad initiator")?,
            tx_gas_price: self.tx_gas_price.parse().context("bad txGasPrice")?,
            block_number: self.block_number.parse().context("bad blockNumber")?,
            timestamp: self.timestamp.parse().context("bad timestamp")?,
        })
    }
}

#[async_trait::async_trait]
impl SwapSource for SwapsSubgraphClient {
    async fn fetch_swaps(
        &self,
        chain_id: RefundChainId,
        block_gte: u64,
        block_lt: u64,
    ) -> anyhow::Result<Vec<Swap>> {
        let url = self
            .url_by_chain
            .get(&chain_id)
            .with_context(|| format!("no swaps subgraph configured for {chain_id}"))?;

        let mut swaps = Vec::new();
        let mut skip = 0usize;
        loop {
            let body = serde_json::json!({
                "query": SWAPS_QUERY,
                "variables": {
                    "block_gte": block_gte.to_string(),
                    "block_lt": block_lt.to_string(),
                    "first": PAGE_SIZE,
                    "skip": skip,
                },
            });

            let response: GraphQlResponse = self
                .http
                .post(url.clone())
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if let Some(errors) = response.errors {
                anyhow::bail!("subgraph returned errors: {errors}");
            }
            let page = response
                .data
                .map(|d| d.swaps)
                .unwrap_or_default();
            let page_len = page.len();

            for raw in page {
                swaps.push(raw.into_swap(chain_id)?);
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }

        debug!(
            "[{}] Fetched {} swaps in blocks {}-{}",
            chain_id,
            swaps.len(),
            block_gte,
            block_lt
        );
        Ok(swaps)
    }
}
