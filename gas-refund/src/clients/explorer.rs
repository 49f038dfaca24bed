// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block explorer client, used for the authoritative `gasUsed` of a
//! transaction.

use crate::types::RefundChainId;
use anyhow::Context;
use ethers::types::H256;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

#[async_trait::async_trait]
pub trait GasUsedSource: Send + Sync {
    async fn transaction_gas_used(
        &self,
        chain_id: RefundChainId,
        tx_hash: H256,
    ) -> anyhow::Result<u64>;
}

pub struct BlockExplorerClient {
    http: reqwest::Client,
    url_by_chain: HashMap<RefundChainId, Url>,
    api_key: Option<String>,
}

impl BlockExplorerClient {
    pub fn new(
        url_by_chain: HashMap<RefundChainId, Url>,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            url_by_chain,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct ReceiptResponse {
    result: Option<Receipt>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    gas_used: String,
}

#[async_trait::async_trait]
impl GasUsedSource for BlockExplorerClient {
    async fn transaction_gas_used(
        &self,
        chain_id: RefundChainId,
        tx_hash: H256,
    ) -> anyhow::Result<u64> {
        let url = self
            .url_by_chain
            .get(&chain_id)
            .with_context(|| format!("no block explorer configured for {chain_id}"))?;

        let mut request = self.http.get(url.clone()).query(&[
            ("module", "proxy"),
            ("action", "eth_getTransactionReceipt"),
            ("txhash", &format!("{tx_hash:#x}")),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response: ReceiptResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let receipt = response
            .result
            .with_context(|| format!("no receipt for {tx_hash:#x} on {chain_id}"))?;
        let hex = receipt
            .gas_used
            .strip_prefix("0x")
            .unwrap_or(&receipt.gas_used);
        u64::from_str_radix(hex, 16)
            .with_context(|| format!("bad gasUsed {:?} for {tx_hash:#x}", receipt.gas_used))
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_gas_used_hex_parsing() {
        assert_eq!(u64::from_str_radix("5208", 16).unwrap(), 21_000);
        assert_eq!(
            u64::from_str_radix("33450".trim_start_matches("0x"), 16).unwrap(),
            210_000
        );
    }
}
