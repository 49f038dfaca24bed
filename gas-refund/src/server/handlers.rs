// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! API handlers for refund entries and claimable amounts.
//!
//! The claims endpoint cross-checks the on-chain `claimStatus` bitmap so
//! already-redeemed epochs disappear from the response.

use super::ApiState;
use crate::types::RefundChainId;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use ethers::types::Address;
use gas_refund_schema::models::{StoredParticipation, StoredRefundTransaction};
use prometheus::{Encoder, TextEncoder};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::error;

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, message.into())
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("API failure: {e}");
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

fn parse_chain(chain_id: u64) -> Result<RefundChainId, ApiError> {
    RefundChainId::try_from(chain_id).map_err(|e| bad_request(e.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub chain_id: i64,
    pub epoch: i64,
    pub hash: String,
    pub address: String,
    pub timestamp: i64,
    pub block_number: i64,
    pub gas_used: i64,
    pub refunded_amount_psp: String,
    pub refunded_amount_usd: String,
    pub status: String,
}

impl From<StoredRefundTransaction> for EntryResponse {
    fn from(row: StoredRefundTransaction) -> Self {
        Self {
            chain_id: row.chain_id,
            epoch: row.epoch,
            hash: row.hash,
            address: row.address,
            timestamp: row.timestamp,
            block_number: row.block_number,
            gas_used: row.gas_used,
            refunded_amount_psp: row.refunded_amount_psp,
            refunded_amount_usd: row.refunded_amount_usd,
            status: row.status,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEntry {
    pub epoch: u64,
    pub amount: String,
    pub merkle_proofs: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsResponse {
    pub total_claimable: String,
    pub claims: Vec<ClaimEntry>,
}

pub async fn entries_for_epoch(
    State(state): State<ApiState>,
    Path((chain_id, epoch)): Path<(u64, u64)>,
) -> Result<Json<Vec<EntryResponse>>, ApiError> {
    let chain_id = parse_chain(chain_id)?;
    let rows = state
        .store
        .entries_for_epoch(chain_id, epoch)
        .await
        .map_err(internal)?;
    Ok(Json(rows.into_iter().map(EntryResponse::from).collect()))
}

pub async fn claims_for_address(
    State(state): State<ApiState>,
    Path((chain_id, address)): Path<(u64, String)>,
) -> Result<Json<ClaimsResponse>, ApiError> {
    let chain_id = parse_chain(chain_id)?;
    let address =
        Address::from_str(&address).map_err(|_| bad_request(format!("bad address {address:?}")))?;

    let participations = state
        .store
        .participations_for_address(chain_id, &address)
        .await
        .map_err(internal)?;
    if participations.is_empty() {
        return Ok(Json(ClaimsResponse {
            total_claimable: "0".to_string(),
            claims: vec![],
        }));
    }

    let begin = participations.iter().map(|p| p.epoch as u64).min().unwrap();
    let end = participations.iter().map(|p| p.epoch as u64).max().unwrap();
    let claimed = state
        .claims
        .claim_status(chain_id, address, begin, end)
        .await
        .map_err(internal)?;

    assemble_claims(participations, &claimed, begin).map(Json).map_err(internal)
}

pub async fn metrics(State(state): State<ApiState>) -> Result<String, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(internal)?;
    String::from_utf8(buffer).map_err(internal)
}

/// Keep only epochs whose on-chain claim flag is still false and total
/// them. `claimed[i]` corresponds to epoch `begin + i`.
fn assemble_claims(
    participations: Vec<StoredParticipation>,
    claimed: &[bool],
    begin: u64,
) -> anyhow::Result<ClaimsResponse> {
    let mut total = Decimal::ZERO;
    let mut claims = Vec::new();

    for participation in participations {
        let epoch = participation.epoch as u64;
        let already_claimed = claimed
            .get((epoch - begin) as usize)
            .copied()
            .unwrap_or(false);
        if already_claimed {
            continue;
        }

        let amount = Decimal::from_str(&participation.refunded_amount_psp)
            .map_err(|e| anyhow::anyhow!("bad participation amount: {e}"))?;
        let merkle_proofs: Vec<String> = serde_json::from_value(participation.merkle_proofs)
            .map_err(|e| anyhow::anyhow!("bad proof list: {e}"))?;

        total += amount;
        claims.push(ClaimEntry {
            epoch,
            amount: amount.normalize().to_string(),
            merkle_proofs,
        });
    }

    Ok(ClaimsResponse {
        total_claimable: total.normalize().to_string(),
        claims,
    })
}
