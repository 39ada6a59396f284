// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Pure parcel-schedule generation.
//!
//! Nothing in this module touches the store: given a chain start and the
//! contract terms it produces parcel drafts. The amortization engine decides
//! where the chain starts and what to do with the drafts.
//!
//! # Correction ordering
//!
//! The month's index correction is applied to the opening saldo first; the
//! parcel's interest is computed on the corrected saldo and the next parcel
//! chains from `corrected − amortization`.

use super::model::AmortizationSystem;
use crate::base::{Money, Percent, RATE_SCALE, round_money};
use crate::error::EngineError;
use chrono::{Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::Serialize;

/// Equivalent monthly rate of a nominal annual rate: `(1 + annual)^(1/12) − 1`.
pub fn monthly_rate(annual: Percent) -> Percent {
    if annual.is_zero() {
        return Decimal::ZERO;
    }
    let exponent = Decimal::ONE / Decimal::from(12);
    ((Decimal::ONE + annual).powd(exponent) - Decimal::ONE).round_dp(RATE_SCALE)
}

/// Fixed installment of the Price table: `S·i(1+i)^n / ((1+i)^n − 1)`.
pub fn price_installment(saldo: Money, rate: Percent, periods: u32) -> Money {
    if periods == 0 {
        return round_money(saldo);
    }
    if rate.is_zero() {
        return round_money(saldo / Decimal::from(periods));
    }
    let factor = (Decimal::ONE + rate).powu(u64::from(periods));
    round_money(saldo * rate * factor / (factor - Decimal::ONE))
}

/// Number of Price installments of `installment` needed to repay `saldo`.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] when the installment does not even
/// cover the first month's interest.
pub fn price_periods(saldo: Money, rate: Percent, installment: Money) -> Result<u32, EngineError> {
    if saldo <= Decimal::ZERO {
        return Ok(0);
    }
    if installment <= Decimal::ZERO {
        return Err(EngineError::Validation("installment must be positive".into()));
    }
    if rate.is_zero() {
        return ceil_periods(saldo, installment);
    }
    let remainder = Decimal::ONE - saldo * rate / installment;
    if remainder <= Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "installment {installment} does not cover the monthly interest"
        )));
    }
    let periods = -remainder.ln() / (Decimal::ONE + rate).ln();
    to_periods(periods.round_dp(6).ceil())
}

/// `ceil(saldo / amortization)`, the remaining term under constant amortization.
pub fn ceil_periods(saldo: Money, amortization: Money) -> Result<u32, EngineError> {
    if saldo <= Decimal::ZERO {
        return Ok(0);
    }
    if amortization <= Decimal::ZERO {
        return Err(EngineError::Validation("amortization must be positive".into()));
    }
    to_periods((saldo / amortization).ceil())
}

fn to_periods(value: Decimal) -> Result<u32, EngineError> {
    value
        .to_u32()
        .ok_or_else(|| EngineError::Validation(format!("term {value} out of range")))
}

/// Contract terms that drive generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTerms {
    pub system: AmortizationSystem,
    pub monthly_rate: Percent,
    /// Amortization of every parcel but the last (SAC and straight-line).
    pub monthly_amortization: Money,
    /// Fixed interest of straight-line contracts (`principal · i`).
    pub straight_interest: Money,
    /// Price installment to keep instead of solving it from the opening saldo.
    pub installment: Option<Money>,
    pub admin_fee: Money,
    pub first_parcel_date: NaiveDate,
}

/// Where the chain starts and how many parcels to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStart {
    pub first_number: u32,
    pub count: u32,
    pub saldo: Money,
}

/// A computed parcel, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParcelDraft {
    pub number: u32,
    pub due_date: NaiveDate,
    pub outstanding_before: Money,
    pub index_correction: Money,
    pub amortization: Money,
    pub interest: Money,
    pub insurance: Money,
    pub admin_fee: Money,
    pub total_planned: Money,
    pub outstanding_after: Money,
}

impl ParcelDraft {
    pub(crate) fn retotal(&mut self) {
        self.total_planned = self.amortization + self.interest + self.insurance + self.admin_fee;
    }
}

/// Due date of parcel `number` (day clamped to the month length).
pub fn due_date(first_parcel_date: NaiveDate, number: u32) -> NaiveDate {
    first_parcel_date
        .checked_add_months(Months::new(number.saturating_sub(1)))
        .unwrap_or(first_parcel_date)
}

/// Generates `start.count` parcels chaining from `start.saldo`.
///
/// `insurance` returns the insurance value for a due date (and may fail with
/// an insurance gap); `correction` returns the index correction rate of the
/// month of a due date.
pub fn generate<I, C>(
    start: ChainStart,
    terms: &ScheduleTerms,
    mut insurance: I,
    mut correction: C,
) -> Result<Vec<ParcelDraft>, EngineError>
where
    I: FnMut(NaiveDate) -> Result<Money, EngineError>,
    C: FnMut(NaiveDate) -> Percent,
{
    let mut drafts = Vec::with_capacity(start.count as usize);
    let mut saldo = start.saldo;
    let mut installment = terms.installment;

    for k in 0..start.count {
        let number = start.first_number + k;
        let due = due_date(terms.first_parcel_date, number);
        let is_last = k + 1 == start.count;

        // Period-open correction, before interest.
        let rate = correction(due);
        let index_correction = round_money(saldo * rate);
        let corrected = saldo + index_correction;

        let interest = match terms.system {
            AmortizationSystem::Straight => terms.straight_interest,
            _ => round_money(corrected * terms.monthly_rate),
        };

        let amortization = if is_last {
            corrected
        } else {
            match terms.system {
                AmortizationSystem::Sac | AmortizationSystem::Straight => {
                    terms.monthly_amortization.min(corrected)
                }
                AmortizationSystem::Price => {
                    if installment.is_none() || !rate.is_zero() {
                        installment = Some(price_installment(
                            corrected,
                            terms.monthly_rate,
                            start.count - k,
                        ));
                    }
                    let pmt = installment.unwrap_or(Decimal::ZERO);
                    (pmt - interest).max(Decimal::ZERO).min(corrected)
                }
            }
        };

        let mut draft = ParcelDraft {
            number,
            due_date: due,
            outstanding_before: saldo,
            index_correction,
            amortization,
            interest,
            insurance: insurance(due)?,
            admin_fee: terms.admin_fee,
            total_planned: Decimal::ZERO,
            outstanding_after: corrected - amortization,
        };
        draft.retotal();
        saldo = draft.outstanding_after;
        drafts.push(draft);
    }

    Ok(drafts)
}
