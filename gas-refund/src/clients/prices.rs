// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Price oracle client and historical rate resolution.
//!
//! The oracle returns one point per day; resolution picks the most recent
//! point at or before the query timestamp, but only within the same UTC
//! day. A swap with no same-day point cannot be refunded and the absence
//! is fatal for that transaction.

use crate::types::{PricePoint, RefundChainId};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use url::Url;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    /// Daily PSP/native/USD rates covering `[from, to]`.
    async fn daily_rates(
        &self,
        chain_id: RefundChainId,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<PricePoint>>;
}

pub struct PriceOracleClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PriceOracleClient {
    pub fn new(base_url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            http: super::http_client()?,
            base_url,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPricePoint {
    timestamp: u64,
    psp_price_usd: String,
    chain_price_usd: String,
    psp_per_native_rate: String,
}

impl RawPricePoint {
    fn into_point(self) -> anyhow::Result<PricePoint> {
        Ok(PricePoint {
            timestamp: self.timestamp,
            psp_price_usd: Decimal::from_str(&self.psp_price_usd).context("bad pspPriceUsd")?,
            chain_price_usd: Decimal::from_str(&self.chain_price_usd)
                .context("bad chainPriceUsd")?,
            psp_per_native: Decimal::from_str(&self.psp_per_native_rate)
                .context("bad pspPerNativeRate")?,
        })
    }
}

#[async_trait::async_trait]
impl PriceFeed for PriceOracleClient {
    async fn daily_rates(
        &self,
        chain_id: RefundChainId,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<PricePoint>> {
        let url = self.base_url.join("rates").context("bad price oracle url")?;
        let raw: Vec<RawPricePoint> = self
            .http
            .get(url)
            .query(&[
                ("chainId", chain_id.as_u64().to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        raw.into_iter().map(RawPricePoint::into_point).collect()
    }
}

/// Pure lookup over a loaded rate window.
pub struct PriceResolver {
    // Sorted ascending by timestamp.
    points: Vec<PricePoint>,
}

impl PriceResolver {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self { points }
    }

    /// Most recent point at or before `timestamp` within the same UTC day.
    pub fn resolve(&self, timestamp: u64) -> Option<&PricePoint> {
        let idx = self.points.partition_point(|p| p.timestamp <= timestamp);
        if idx == 0 {
            return None;
        }
        let candidate = &self.points[idx - 1];
        if candidate.timestamp / SECONDS_PER_DAY == timestamp / SECONDS_PER_DAY {
            Some(candidate)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
