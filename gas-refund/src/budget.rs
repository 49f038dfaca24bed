// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Budget accounting and capping.
//!
//! Three caps, applied in a fixed, non-commutative order: per-address
//! yearly USD, per-address epoch USD (once the epoch budget activates), and
//! the global yearly PSP pool. The guardian is purely in-memory and
//! synchronous; persistence happens by reloading from validated rows at
//! the start of a re-validation pass.

use crate::epoch::{EpochCalendar, EPOCHS_PER_YEAR};
use crate::error::{RefundError, RefundResult};
use crate::types::{format_address, ONE_E18};
use ethers::types::Address;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct BudgetLimits {
    pub max_psp_global_yearly: Decimal,
    pub max_usd_address_yearly: Decimal,
    pub max_usd_address_epoch: Decimal,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        let max_usd_address_yearly = Decimal::from(30_000);
        Self {
            max_psp_global_yearly: Decimal::from(30_000_000u64) * Decimal::from(ONE_E18),
            max_usd_address_yearly,
            max_usd_address_epoch: max_usd_address_yearly / Decimal::from(EPOCHS_PER_YEAR),
        }
    }
}

/// Result of running one refund through the caps.
///
/// The pairing is intentionally asymmetric: the two USD caps set both
/// fields, while the asset-denominated global cap sets (or lowers) only
/// `capped_psp` and leaves `capped_usd` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedCaps {
    pub capped_usd: Option<Decimal>,
    pub capped_psp: Option<Decimal>,
}

impl AppliedCaps {
    pub fn is_capped(&self) -> bool {
        self.capped_usd.is_some() || self.capped_psp.is_some()
    }
}

#[derive(Debug)]
pub struct BudgetGuardian {
    limits: BudgetLimits,
    genesis_epoch: u64,
    total_psp_refunded_for_year: Decimal,
    yearly_usd_by_address: HashMap<Address, Decimal>,
    epoch_usd_by_address: HashMap<Address, Decimal>,
}

impl BudgetGuardian {
    pub fn new(limits: BudgetLimits, calendar: &EpochCalendar) -> Self {
        Self {
            limits,
            genesis_epoch: calendar.genesis_epoch,
            total_psp_refunded_for_year: Decimal::ZERO,
            yearly_usd_by_address: HashMap::new(),
            epoch_usd_by_address: HashMap::new(),
        }
    }

    /// Seed the yearly counters from persisted validated rows. Used at the
    /// start of a re-validation pass; the seed must cover only epochs of
    /// the refund year the pass resumes in.
    pub fn seed(&mut self, total_psp: Decimal, yearly_usd_by_address: HashMap<Address, Decimal>) {
        self.total_psp_refunded_for_year = total_psp;
        self.yearly_usd_by_address = yearly_usd_by_address;
        self.epoch_usd_by_address.clear();
    }

    /// Start accounting for `epoch`: per-epoch counters always reset, and
    /// the yearly counters reset when `epoch` opens a new refund year.
    pub fn begin_epoch(&mut self, epoch: u64) {
        self.epoch_usd_by_address.clear();
        if epoch >= self.genesis_epoch && (epoch - self.genesis_epoch) % EPOCHS_PER_YEAR == 0 {
            self.total_psp_refunded_for_year = Decimal::ZERO;
            self.yearly_usd_by_address.clear();
        }
    }

    pub fn is_global_spent(&self) -> bool {
        self.total_psp_refunded_for_year >= self.limits.max_psp_global_yearly
    }

    pub fn has_address_spent_yearly(&self, address: &Address) -> bool {
        self.yearly_usd(address) >= self.limits.max_usd_address_yearly
    }

    pub fn has_address_spent_epoch(&self, address: &Address) -> bool {
        self.epoch_usd(address) >= self.limits.max_usd_address_epoch
    }

    pub fn total_psp_refunded_for_year(&self) -> Decimal {
        self.total_psp_refunded_for_year
    }

    fn yearly_usd(&self, address: &Address) -> Decimal {
        self.yearly_usd_by_address
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn epoch_usd(&self, address: &Address) -> Decimal {
        self.epoch_usd_by_address
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Run one refund through the caps without mutating any counter.
    ///
    /// `epoch_budget_active` is false for epochs before the epoch budget
    /// activated; the epoch cap is then skipped entirely.
    pub fn apply_caps(
        &self,
        address: &Address,
        epoch: u64,
        refund_usd: Decimal,
        refund_psp: Decimal,
        psp_usd: Decimal,
        epoch_budget_active: bool,
    ) -> RefundResult<AppliedCaps> {
        let mut caps = AppliedCaps::default();

        // 1. Yearly per-address USD.
        let yearly = self.yearly_usd(address);
        if yearly + refund_usd > self.limits.max_usd_address_yearly {
            let headroom = self.limits.max_usd_address_yearly - yearly;
            if headroom < Decimal::ZERO {
                return Err(RefundError::NegativeCap {
                    address: format_address(address),
                    epoch,
                });
            }
            caps.capped_usd = Some(headroom);
            caps.capped_psp = Some(derive_psp(headroom, psp_usd)?);
        }

        // 2. Epoch per-address USD, only when the yearly cap did not trip.
        if epoch_budget_active && caps.capped_usd.is_none() {
            let spent = self.epoch_usd(address);
            if spent + refund_usd > self.limits.max_usd_address_epoch {
                let headroom = self.limits.max_usd_address_epoch - spent;
                if headroom < Decimal::ZERO {
                    return Err(RefundError::NegativeCap {
                        address: format_address(address),
                        epoch,
                    });
                }
                caps.capped_usd = Some(headroom);
                caps.capped_psp = Some(derive_psp(headroom, psp_usd)?);
            }
        }

        // 3. Global yearly PSP. Asset-denominated: lowers the PSP amount
        // only, never the USD amount.
        let chosen_psp = caps.capped_psp.unwrap_or(refund_psp);
        if self.total_psp_refunded_for_year + chosen_psp > self.limits.max_psp_global_yearly {
            let headroom = self.limits.max_psp_global_yearly - self.total_psp_refunded_for_year;
            if headroom < Decimal::ZERO {
                return Err(RefundError::NegativeCap {
                    address: format_address(address),
                    epoch,
                });
            }
            caps.capped_psp = Some(chosen_psp.min(headroom));
        }

        Ok(caps)
    }

    /// Commit the effective amounts of a validated transaction.
    pub fn commit(
        &mut self,
        address: &Address,
        effective_usd: Decimal,
        effective_psp: Decimal,
        epoch_budget_active: bool,
    ) {
        if epoch_budget_active {
            *self
                .epoch_usd_by_address
                .entry(*address)
                .or_insert(Decimal::ZERO) += effective_usd;
        }
        *self
            .yearly_usd_by_address
            .entry(*address)
            .or_insert(Decimal::ZERO) += effective_usd;
        self.total_psp_refunded_for_year += effective_psp;
    }
}

/// PSP equivalent of a USD headroom: `floor(usd / pspPriceUSD * 10^18)`.
fn derive_psp(usd: Decimal, psp_usd: Decimal) -> RefundResult<Decimal> {
    let scaled = usd
        .checked_div(psp_usd)
        .ok_or_else(|| RefundError::PriceOracle(format!("unusable PSP price {psp_usd}")))?
        * Decimal::from(ONE_E18);
    Ok(scaled.floor().normalize())
}
