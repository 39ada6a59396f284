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

//! Predicted expenses (despesas previstas) and the origins that produce them.
//!
//! Predictions follow a state machine:
//! - [`Predicted`] → [`Confirmed`] | [`Postponed`] | [`Ignored`]
//! - [`Postponed`] → [`Confirmed`] | [`Postponed`] | [`Ignored`]
//!
//! [`Predicted`]: PredictionStatus::Predicted
//! [`Confirmed`]: PredictionStatus::Confirmed
//! [`Postponed`]: PredictionStatus::Postponed
//! [`Ignored`]: PredictionStatus::Ignored

use crate::base::{
    CategoryId, Money, Month, PredictionId, TransportPathId, VehicleFinancingId, VehicleId,
};
use crate::financing::AmortizationSystem;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Vehicle,
    TransportPath,
    VehicleFinancing,
}

/// Owner of a prediction. Predictions never cascade across origins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Origin {
    pub kind: OriginKind,
    pub id: u64,
}

impl Origin {
    pub fn vehicle(id: VehicleId) -> Self {
        Origin {
            kind: OriginKind::Vehicle,
            id: id.0,
        }
    }

    pub fn transport(id: TransportPathId) -> Self {
        Origin {
            kind: OriginKind::TransportPath,
            id: id.0,
        }
    }

    pub fn vehicle_financing(id: VehicleFinancingId) -> Self {
        Origin {
            kind: OriginKind::VehicleFinancing,
            id: id.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionStatus {
    Predicted,
    Confirmed,
    Postponed,
    Ignored,
}

/// Rule of the origin that produced a prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PredictionRule {
    Fuel,
    Ipva,
    Insurance,
    Licensing,
    Maintenance { cycle: u32 },
    AppTransport,
    FinancingParcel { number: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionMeta {
    #[serde(flatten)]
    pub rule: PredictionRule,
    /// Prediction whose postponement scheduled this one.
    pub ripple_of: Option<PredictionId>,
    pub note: Option<String>,
}

/// A predicted expense.
///
/// `original_date` is write-once: it has no setter and survives every action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    pub id: PredictionId,
    pub origin: Origin,
    pub category_id: Option<CategoryId>,
    original_date: NaiveDate,
    pub current_date: NaiveDate,
    pub amount: Money,
    pub status: PredictionStatus,
    pub metadata: PredictionMeta,
}

impl Prediction {
    pub fn new(
        id: PredictionId,
        origin: Origin,
        category_id: Option<CategoryId>,
        date: NaiveDate,
        amount: Money,
        metadata: PredictionMeta,
    ) -> Self {
        Self {
            id,
            origin,
            category_id,
            original_date: date,
            current_date: date,
            amount,
            status: PredictionStatus::Predicted,
            metadata,
        }
    }

    pub fn original_date(&self) -> NaiveDate {
        self.original_date
    }

    pub fn rule(&self) -> PredictionRule {
        self.metadata.rule
    }

    pub fn is_ripple(&self) -> bool {
        self.metadata.ripple_of.is_some()
    }

    /// Slot this prediction occupies for regeneration purposes.
    pub fn slot(&self) -> (PredictionRule, Month) {
        (self.metadata.rule, Month::of(self.original_date))
    }
}

/// Km-based maintenance cycle of a vehicle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaintenanceCycle {
    pub id: u32,
    pub name: String,
    pub km_interval: Decimal,
    pub cost: Money,
    pub last_service_km: Decimal,
}

/// Annual charge paid in a fixed calendar month.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AnnualCharge {
    pub amount: Money,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub id: VehicleId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub avg_km_per_month: Decimal,
    pub autonomy_km_per_liter: Decimal,
    pub fuel_price: Money,
    pub expense_day: u32,
    pub ipva: Option<AnnualCharge>,
    pub insurance: Option<AnnualCharge>,
    pub licensing: Option<AnnualCharge>,
    pub km_cumulative_estimate: Decimal,
    pub maintenance: Vec<MaintenanceCycle>,
    /// Fuel predictions already counted into the km estimate. Only grows.
    pub fuel_cursor: BTreeSet<PredictionId>,
    pub active: bool,
}

impl Vehicle {
    pub fn cycle(&self, id: u32) -> Option<&MaintenanceCycle> {
        self.maintenance.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMaintenanceCycle {
    pub name: String,
    pub km_interval: Decimal,
    pub cost: Money,
    pub last_service_km: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewVehicle {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub avg_km_per_month: Decimal,
    pub autonomy_km_per_liter: Decimal,
    pub fuel_price: Money,
    #[serde(default = "default_expense_day")]
    pub expense_day: u32,
    #[serde(default)]
    pub ipva: Option<AnnualCharge>,
    #[serde(default)]
    pub insurance: Option<AnnualCharge>,
    #[serde(default)]
    pub licensing: Option<AnnualCharge>,
    #[serde(default)]
    pub km_cumulative_estimate: Decimal,
    #[serde(default)]
    pub maintenance: Vec<NewMaintenanceCycle>,
}

fn default_expense_day() -> u32 {
    5
}

/// Recurring app-transport route (e.g. home to office).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransportPath {
    pub id: TransportPathId,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub trips_per_month: u32,
    pub average_fare: Money,
    pub expense_day: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewTransportPath {
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub trips_per_month: u32,
    pub average_fare: Money,
    #[serde(default = "default_expense_day")]
    pub expense_day: u32,
}

/// Simulated vehicle financing projected as predictions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleFinancing {
    pub id: VehicleFinancingId,
    pub vehicle_id: VehicleId,
    pub principal: Money,
    pub nominal_annual_rate: Decimal,
    pub term_months: u32,
    pub system: AmortizationSystem,
    pub first_due_date: NaiveDate,
    pub fixed_admin_fee: Money,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewVehicleFinancing {
    pub vehicle_id: VehicleId,
    pub principal: Money,
    pub nominal_annual_rate: Decimal,
    pub term_months: u32,
    pub system: AmortizationSystem,
    pub first_due_date: NaiveDate,
    #[serde(default)]
    pub fixed_admin_fee: Money,
}

/// Input for `POST /predictions/{id}/postpone`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostponeInput {
    pub new_month: Month,
    #[serde(default)]
    pub ripple: bool,
}
