// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, IntCounterVec, IntGauge, IntGaugeVec, Registry,
};

#[derive(Clone, Debug)]
pub struct RefundMetrics {
    pub(crate) swaps_fetched: IntCounterVec,
    pub(crate) swaps_qualified: IntCounterVec,
    pub(crate) transactions_staged: IntCounterVec,
    pub(crate) transactions_validated: IntGaugeVec,
    pub(crate) transactions_rejected: IntGaugeVec,
    pub(crate) client_errors: IntCounterVec,
    pub(crate) last_processed_epoch: IntGaugeVec,
    pub(crate) epochs_sealed: IntCounterVec,
    pub(crate) total_psp_refunded_for_year: IntGauge,
}

impl RefundMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            swaps_fetched: register_int_counter_vec_with_registry!(
                "gas_refund_swaps_fetched",
                "Total number of swaps fetched from the subgraph",
                &["chain"],
                registry,
            )
            .unwrap(),
            swaps_qualified: register_int_counter_vec_with_registry!(
                "gas_refund_swaps_qualified",
                "Total number of swaps that passed qualification",
                &["chain"],
                registry,
            )
            .unwrap(),
            transactions_staged: register_int_counter_vec_with_registry!(
                "gas_refund_transactions_staged",
                "Total number of transactions staged as IDLE",
                &["chain"],
                registry,
            )
            .unwrap(),
            transactions_validated: register_int_gauge_vec_with_registry!(
                "gas_refund_transactions_validated",
                "Transactions validated by the latest re-validation pass",
                &["run"],
                registry,
            )
            .unwrap(),
            transactions_rejected: register_int_gauge_vec_with_registry!(
                "gas_refund_transactions_rejected",
                "Transactions rejected by the latest re-validation pass",
                &["run"],
                registry,
            )
            .unwrap(),
            client_errors: register_int_counter_vec_with_registry!(
                "gas_refund_client_errors",
                "Upstream client errors by error type",
                &["error_type"],
                registry,
            )
            .unwrap(),
            last_processed_epoch: register_int_gauge_vec_with_registry!(
                "gas_refund_last_processed_epoch",
                "Last epoch fully ingested per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            epochs_sealed: register_int_counter_vec_with_registry!(
                "gas_refund_epochs_sealed",
                "Distributions sealed per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            total_psp_refunded_for_year: register_int_gauge_with_registry!(
                "gas_refund_total_psp_refunded_for_year",
                "Whole PSP tokens refunded in the current refund year",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
