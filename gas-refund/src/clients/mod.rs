// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! HTTP clients for the upstream data sources.
//!
//! Every client is behind a small trait so the pipeline can be driven by
//! fakes in tests. Requests use a bounded timeout; retry policy lives at
//! the call sites via `retry_with_max_elapsed_time!`.

pub mod blocks;
pub mod explorer;
pub mod prices;
pub mod redeem;
pub mod staking;
pub mod subgraph;

use std::time::Duration;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}
