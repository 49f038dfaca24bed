// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Staking subgraph client: stake-change event history for one staking
//! contract (SPSP pools or the Safety Module).

use crate::stake::{StakeEvent, StakeEventSource};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use url::Url;

const PAGE_SIZE: usize = 1000;

const STAKE_EVENTS_QUERY: &str = r#"
query ($block_lte: BigInt!, $first: Int!, $skip: Int!) {
  stakeChanges(
    where: { blockNumber_lte: $block_lte }
    orderBy: timestamp
    orderDirection: asc
    first: $first
    skip: $skip
  ) {
    user
    timestamp
    amount
  }
}"#;

pub struct StakeSubgraphClient {
    http: reqwest::Client,
    url: Url,
}

impl StakeSubgraphClient {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            url,
        })
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<StakeData>,
    errors: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakeData {
    stake_changes: Vec<RawStakeChange>,
}

#[derive(Deserialize)]
struct RawStakeChange {
    user: String,
    timestamp: String,
    // Signed wei-scale PSP delta.
    amount: String,
}

#[async_trait::async_trait]
impl StakeEventSource for StakeSubgraphClient {
    async fn fetch_events(&self, to_block: u64) -> anyhow::Result<Vec<StakeEvent>> {
        let mut events = Vec::new();
        let mut skip = 0usize;
        loop {
            let body = serde_json::json!({
                "query": STAKE_EVENTS_QUERY,
                "variables": {
                    "block_lte": to_block.to_string(),
                    "first": PAGE_SIZE,
                    "skip": skip,
                },
            });

            let response: GraphQlResponse = self
                .http
                .post(self.url.clone())
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            if let Some(errors) = response.errors {
                anyhow::bail!("staking subgraph returned errors: {errors}");
            }
            let page = response
                .data
                .map(|d| d.stake_changes)
                .unwrap_or_default();
            let page_len = page.len();

            for raw in page {
                events.push(StakeEvent {
                    address: raw.user.parse().context("bad staker address")?,
                    timestamp: raw.timestamp.parse().context("bad stake timestamp")?,
                    amount: Decimal::from_str(&raw.amount).context("bad stake amount")?,
                });
            }

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
        }
        Ok(events)
    }
}
