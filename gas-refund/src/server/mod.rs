// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read API serving claim data and metrics.

pub mod handlers;

use crate::clients::redeem::ClaimStatusSource;
use crate::store::RefundStore;
use axum::routing::get;
use axum::Router;
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn RefundStore>,
    pub claims: Arc<dyn ClaimStatusSource>,
    pub registry: Registry,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/chains/:chain_id/epochs/:epoch/entries",
            get(handlers::entries_for_epoch),
        )
        .route(
            "/chains/:chain_id/claims/:address",
            get(handlers::claims_for_address),
        )
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Claim API listening on port {port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
