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

//! Expected predictions of each origin over a window of months.
//!
//! Rules are pure: they read an origin and return what should be predicted.
//! Which of those rows actually get written is the engine's call.

use super::model::{AnnualCharge, MaintenanceCycle, PredictionRule, TransportPath, Vehicle, VehicleFinancing};
use crate::base::{CategoryId, Money, Month, round_money};
use crate::error::EngineError;
use crate::financing::AmortizationSystem;
use crate::financing::schedule::{self, ChainStart, ScheduleTerms};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// A prediction an origin calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    pub rule: PredictionRule,
    pub date: NaiveDate,
    pub amount: Money,
    pub category_id: Option<CategoryId>,
}

/// Inclusive month window `[first, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub first: Month,
    pub last: Month,
}

impl Window {
    pub fn new(this_month: Month, horizon: u32) -> Self {
        Self {
            first: this_month,
            last: this_month.add_months(horizon),
        }
    }

    pub fn contains(&self, month: Month) -> bool {
        self.first <= month && month <= self.last
    }

    pub fn months(&self) -> impl Iterator<Item = Month> + '_ {
        let mut next = Some(self.first);
        std::iter::from_fn(move || {
            let month = next?;
            next = (month < self.last).then(|| month.next());
            Some(month)
        })
    }
}

/// Monthly fuel spend: liters for the average distance times the price.
pub fn monthly_fuel(vehicle: &Vehicle) -> Option<Money> {
    if vehicle.autonomy_km_per_liter <= Decimal::ZERO {
        return None;
    }
    Some(round_money(
        vehicle.avg_km_per_month / vehicle.autonomy_km_per_liter * vehicle.fuel_price,
    ))
}

/// Months of average use needed to drive `km`, rounded up.
pub fn months_to_drive(km: Decimal, avg_km_per_month: Decimal) -> Option<u32> {
    if avg_km_per_month <= Decimal::ZERO {
        return None;
    }
    if km <= Decimal::ZERO {
        return Some(0);
    }
    (km / avg_km_per_month).ceil().to_u32()
}

fn annual(
    out: &mut Vec<Expected>,
    rule: PredictionRule,
    charge: Option<AnnualCharge>,
    window: &Window,
    vehicle: &Vehicle,
) {
    let Some(charge) = charge else {
        return;
    };
    for month in window.months().filter(|m| m.month() == charge.month) {
        out.push(Expected {
            rule,
            date: month.day(vehicle.expense_day),
            amount: charge.amount,
            category_id: vehicle.category_id,
        });
    }
}

fn maintenance(out: &mut Vec<Expected>, cycle: &MaintenanceCycle, window: &Window, vehicle: &Vehicle) {
    if cycle.km_interval <= Decimal::ZERO {
        return;
    }
    let mut due_km = cycle.last_service_km + cycle.km_interval;
    let mut last_month: Option<Month> = None;
    loop {
        let Some(months) =
            months_to_drive(due_km - vehicle.km_cumulative_estimate, vehicle.avg_km_per_month)
        else {
            return;
        };
        let month = window.first.add_months(months);
        if !window.contains(month) {
            return;
        }
        // One occurrence per month and cycle.
        if last_month != Some(month) {
            out.push(Expected {
                rule: PredictionRule::Maintenance { cycle: cycle.id },
                date: month.day(vehicle.expense_day),
                amount: cycle.cost,
                category_id: vehicle.category_id,
            });
            last_month = Some(month);
        }
        due_km += cycle.km_interval;
    }
}

/// Fuel, annual charges and maintenance of a vehicle.
pub fn vehicle(vehicle: &Vehicle, window: &Window) -> Vec<Expected> {
    let mut out = Vec::new();
    if let Some(amount) = monthly_fuel(vehicle).filter(|a| *a > Decimal::ZERO) {
        for month in window.months() {
            out.push(Expected {
                rule: PredictionRule::Fuel,
                date: month.day(vehicle.expense_day),
                amount,
                category_id: vehicle.category_id,
            });
        }
    }
    annual(&mut out, PredictionRule::Ipva, vehicle.ipva, window, vehicle);
    annual(&mut out, PredictionRule::Insurance, vehicle.insurance, window, vehicle);
    annual(&mut out, PredictionRule::Licensing, vehicle.licensing, window, vehicle);
    for cycle in &vehicle.maintenance {
        maintenance(&mut out, cycle, window, vehicle);
    }
    out
}

/// Monthly app-ride spend of a transport path.
pub fn transport(path: &TransportPath, window: &Window) -> Vec<Expected> {
    let amount = round_money(path.average_fare * Decimal::from(path.trips_per_month));
    if amount <= Decimal::ZERO {
        return Vec::new();
    }
    window
        .months()
        .map(|month| Expected {
            rule: PredictionRule::AppTransport,
            date: month.day(path.expense_day),
            amount,
            category_id: path.category_id,
        })
        .collect()
}

/// Simulated parcels of a vehicle financing that fall in the window.
pub fn vehicle_financing(
    simulation: &VehicleFinancing,
    category_id: Option<CategoryId>,
    window: &Window,
) -> Result<Vec<Expected>, EngineError> {
    let monthly_rate = schedule::monthly_rate(simulation.nominal_annual_rate);
    let terms = ScheduleTerms {
        system: simulation.system,
        monthly_rate,
        monthly_amortization: match simulation.system {
            AmortizationSystem::Price => Decimal::ZERO,
            _ => round_money(simulation.principal / Decimal::from(simulation.term_months.max(1))),
        },
        straight_interest: round_money(simulation.principal * monthly_rate),
        installment: None,
        admin_fee: simulation.fixed_admin_fee,
        first_parcel_date: simulation.first_due_date,
    };
    let start = ChainStart {
        first_number: 1,
        count: simulation.term_months,
        saldo: simulation.principal,
    };
    let drafts = schedule::generate(start, &terms, |_| Ok(Decimal::ZERO), |_| Decimal::ZERO)?;
    Ok(drafts
        .into_iter()
        .filter(|d| window.contains(Month::of(d.due_date)))
        .map(|d| Expected {
            rule: PredictionRule::FinancingParcel { number: d.number },
            date: d.due_date,
            amount: d.total_planned,
            category_id,
        })
        .collect())
}
