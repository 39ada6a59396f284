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

//! Financing contracts, parcels and extraordinary amortization events.
//!
//! Financings follow a state machine:
//! - [`Active`] → [`Settled`] (outstanding reaches zero)
//! - [`Active`] → [`Inactive`] (pending parcels soft-deleted)
//!
//! [`Active`]: FinancingState::Active
//! [`Settled`]: FinancingState::Settled
//! [`Inactive`]: FinancingState::Inactive

use super::insurance::NewVigency;
use crate::base::{
    AmortizationId, BillId, CategoryId, FinancingId, Money, Month, ParcelId, Percent,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmortizationSystem {
    /// Constant amortization (Sistema de Amortização Constante).
    Sac,
    /// Fixed installment (French / Price table).
    Price,
    /// Constant amortization with interest fixed on the original principal.
    Straight,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmortizationRegime {
    /// Keep the term, lower the parcel.
    ReduceParcel,
    /// Keep the parcel, shorten the term.
    ReduceTerm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinancingState {
    Active,
    Settled,
    Inactive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParcelStatus {
    Pending,
    Paid,
}

/// A financing contract and its sovereign current state.
///
/// `current_outstanding` is a materialized reduction: principal minus the
/// amortizations of paid parcels minus extraordinary amortizations, plus the
/// index correction applied up to `base_date`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Financing {
    pub id: FinancingId,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub system: AmortizationSystem,
    pub principal: Money,
    pub term_total_months: u32,
    pub term_remaining_months: u32,
    pub nominal_annual_rate: Percent,
    pub monthly_rate: Percent,
    pub index_name: Option<String>,
    pub contract_date: NaiveDate,
    pub first_parcel_date: NaiveDate,
    pub fixed_admin_fee: Money,
    pub state: FinancingState,
    pub current_outstanding: Money,
    /// Number of the last consolidated (paid) parcel; `0` before any payment.
    pub base_parcel_number: u32,
    pub base_date: Month,
    /// Amortization of every pending parcel (SAC and straight-line).
    pub current_monthly_amortization: Money,
    pub post_amortization_regime: Option<AmortizationRegime>,
    /// Price installment held by a term reduction.
    #[serde(default)]
    pub kept_installment: Option<Money>,
}

impl Financing {
    pub fn is_active(&self) -> bool {
        self.state == FinancingState::Active
    }
}

/// One parcel of a financing schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parcel {
    pub id: ParcelId,
    pub financing_id: FinancingId,
    pub number: u32,
    pub due_date: NaiveDate,
    /// Saldo the parcel opens with, before the month's index correction.
    pub outstanding_before: Money,
    pub index_correction: Money,
    pub amortization: Money,
    pub interest: Money,
    pub insurance: Money,
    pub admin_fee: Money,
    pub total_planned: Money,
    pub outstanding_after: Money,
    pub status: ParcelStatus,
    pub amount_paid: Option<Money>,
    pub paid_at: Option<NaiveDate>,
    pub bill_id: Option<BillId>,
}

impl Parcel {
    pub fn is_paid(&self) -> bool {
        self.status == ParcelStatus::Paid
    }
}

/// Event log entry for an extraordinary amortization.
///
/// The event is the only persisted record of the amortization; the pending
/// tail is re-derived from it, never dual-written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtraordinaryAmortization {
    pub id: AmortizationId,
    pub financing_id: FinancingId,
    pub date: NaiveDate,
    pub amount: Money,
    pub regime: AmortizationRegime,
    /// `base_parcel_number` at the time the event was applied.
    pub after_parcel: u32,
    pub outstanding_before: Money,
    pub outstanding_after: Money,
    pub term_remaining_after: u32,
}

/// Input for `POST /financings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewFinancing {
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub system: AmortizationSystem,
    pub principal: Money,
    pub term_months: u32,
    pub nominal_annual_rate: Percent,
    #[serde(default)]
    pub index_name: Option<String>,
    pub contract_date: NaiveDate,
    pub first_parcel_date: NaiveDate,
    #[serde(default)]
    pub fixed_admin_fee: Money,
    #[serde(default)]
    pub insurance_vigencies: Vec<NewVigency>,
}

/// Input for `PUT /financings/{id}`.
///
/// `nominal_annual_rate`, `fixed_admin_fee` and `term_total_months` are
/// structural; the rest is not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FinancingUpdate {
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub nominal_annual_rate: Option<Percent>,
    pub fixed_admin_fee: Option<Money>,
    pub term_total_months: Option<u32>,
    pub insurance_vigencies: Vec<NewVigency>,
    pub force: bool,
}

impl FinancingUpdate {
    pub fn is_structural(&self) -> bool {
        self.nominal_annual_rate.is_some()
            || self.fixed_admin_fee.is_some()
            || self.term_total_months.is_some()
    }
}

/// Input for `POST /financings/{id}/amortizations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmortizationInput {
    pub date: NaiveDate,
    pub amount: Money,
    pub regime: AmortizationRegime,
}

/// Financing with its parcels, ordered by number.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FinancingView {
    pub financing: Financing,
    pub parcels: Vec<Parcel>,
    pub amortizations: Vec<ExtraordinaryAmortization>,
}

impl FinancingView {
    pub fn parcel(&self, number: u32) -> Option<&Parcel> {
        self.parcels.iter().find(|p| p.number == number)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter().filter(|p| !p.is_paid())
    }

    pub fn last_number(&self) -> Option<u32> {
        self.parcels.iter().map(|p| p.number).max()
    }

    pub fn total_planned(&self) -> Decimal {
        self.parcels.iter().map(|p| p.total_planned).sum()
    }
}
