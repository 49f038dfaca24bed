// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block-info service client: timestamp to block number resolution.

use crate::types::RefundChainId;
use anyhow::Context;
use serde::Deserialize;
use url::Url;

#[async_trait::async_trait]
pub trait BlockInfoSource: Send + Sync {
    /// First block with `block.timestamp >= timestamp`.
    async fn block_after_timestamp(
        &self,
        chain_id: RefundChainId,
        timestamp: u64,
    ) -> anyhow::Result<u64>;
}

pub struct BlockInfoClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BlockInfoClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            base_url,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockAfterResponse {
    block_number: u64,
}

#[async_trait::async_trait]
impl BlockInfoSource for BlockInfoClient {
    async fn block_after_timestamp(
        &self,
        chain_id: RefundChainId,
        timestamp: u64,
    ) -> anyhow::Result<u64> {
        let url = self
            .base_url
            .join(&format!("{}/block-after/{}", chain_id.as_u64(), timestamp))
            .context("bad block-info url")?;

        let response: BlockAfterResponse = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.block_number)
    }
}
