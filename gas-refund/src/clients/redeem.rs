// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! MerkleRedeem contract client: on-chain claim bitmap lookups.

use crate::types::RefundChainId;
use anyhow::Context;
use ethers::contract::abigen;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

abigen!(
    MerkleRedeem,
    r#"[
        function claimStatus(address _liquidityProvider, uint256 _begin, uint256 _end) external view returns (bool[] memory)
    ]"#
);

#[async_trait::async_trait]
pub trait ClaimStatusSource: Send + Sync {
    /// Claim flags for `address` over `[begin, end]` epochs, one bool per
    /// epoch in order.
    async fn claim_status(
        &self,
        chain_id: RefundChainId,
        address: Address,
        begin: u64,
        end: u64,
    ) -> anyhow::Result<Vec<bool>>;
}

pub struct MerkleRedeemClient {
    contracts: HashMap<RefundChainId, MerkleRedeem<Provider<Http>>>,
}

impl MerkleRedeemClient {
    pub fn new(
        rpc_urls: &HashMap<RefundChainId, Url>,
        contract_addresses: &HashMap<RefundChainId, Address>,
    ) -> anyhow::Result<Self> {
        let mut contracts = HashMap::new();
        for (chain_id, address) in contract_addresses {
            let rpc = rpc_urls
                .get(chain_id)
                .with_context(|| format!("no rpc url for {chain_id}"))?;
            let provider = Provider::<Http>::try_from(rpc.as_str())
                .with_context(|| format!("bad rpc url for {chain_id}"))?;
            contracts.insert(*chain_id, MerkleRedeem::new(*address, Arc::new(provider)));
        }
        Ok(Self { contracts })
    }
}

#[async_trait::async_trait]
impl ClaimStatusSource for MerkleRedeemClient {
    async fn claim_status(
        &self,
        chain_id: RefundChainId,
        address: Address,
        begin: u64,
        end: u64,
    ) -> anyhow::Result<Vec<bool>> {
        let contract = self
            .contracts
            .get(&chain_id)
            .with_context(|| format!("no MerkleRedeem contract configured for {chain_id}"))?;
        let flags = contract
            .claim_status(address, U256::from(begin), U256::from(end))
            .call()
            .await
            .with_context(|| format!("claimStatus call failed on {chain_id}"))?;
        Ok(flags)
    }
}
