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

//! Projection engine.
//!
//! Regeneration is per origin and never crosses into another origin's rows.
//! A row the user acted on (anything but `PREDICTED`) locks its
//! `(rule, original month)` slot, and ripple rows are kept, so regeneration
//! only ever replaces untouched predictions.
//!
//! # Actions
//!
//! - **Confirm**: fuel bumps the vehicle's km estimate once per prediction;
//!   maintenance resets the cycle to the current estimate.
//! - **Postpone**: moves `current_date`; with ripple on a maintenance cycle,
//!   schedules exactly one next occurrence.
//! - **Ignore**: no further effect.

use super::model::{
    MaintenanceCycle, NewTransportPath, NewVehicle, NewVehicleFinancing, Origin, OriginKind,
    PostponeInput, Prediction, PredictionMeta, PredictionRule, PredictionStatus, TransportPath,
    Vehicle, VehicleFinancing,
};
use super::rules::{self, Expected, Window};
use crate::base::{
    Money, Month, PredictionId, TransportPathId, VehicleFinancingId, VehicleId,
};
use crate::error::EngineError;
use crate::store::Tables;
use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Rows touched by one regeneration.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RegenerationReport {
    pub deleted: usize,
    pub created: usize,
    pub locked: usize,
}

/// Result of a postponement.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PostponeOutcome {
    pub prediction: Prediction,
    pub ripple: Option<Prediction>,
}

pub struct ProjectionEngine;

impl ProjectionEngine {
    // === Origins ===

    pub fn add_vehicle(
        tables: &mut Tables,
        input: NewVehicle,
        this_month: Month,
    ) -> Result<Vehicle, EngineError> {
        if input.name.trim().is_empty() {
            return Err(EngineError::Validation("vehicle name is required".into()));
        }
        if input.avg_km_per_month < Decimal::ZERO
            || input.autonomy_km_per_liter < Decimal::ZERO
            || input.fuel_price < Decimal::ZERO
        {
            return Err(EngineError::Validation(
                "usage, autonomy and fuel price must not be negative".into(),
            ));
        }
        if !(1..=31).contains(&input.expense_day) {
            return Err(EngineError::Validation("expense_day must be within 1..=31".into()));
        }
        for charge in [input.ipva, input.insurance, input.licensing].into_iter().flatten() {
            if !(1..=12).contains(&charge.month) {
                return Err(EngineError::Validation(format!(
                    "annual charge month {} is not a month",
                    charge.month
                )));
            }
        }
        let maintenance = input
            .maintenance
            .into_iter()
            .enumerate()
            .map(|(index, cycle)| MaintenanceCycle {
                id: index as u32 + 1,
                name: cycle.name,
                km_interval: cycle.km_interval,
                cost: cycle.cost,
                last_service_km: cycle.last_service_km,
            })
            .collect();
        let vehicle = Vehicle {
            id: VehicleId(tables.next_id()),
            name: input.name.trim().to_string(),
            category_id: input.category_id,
            avg_km_per_month: input.avg_km_per_month,
            autonomy_km_per_liter: input.autonomy_km_per_liter,
            fuel_price: input.fuel_price,
            expense_day: input.expense_day,
            ipva: input.ipva,
            insurance: input.insurance,
            licensing: input.licensing,
            km_cumulative_estimate: input.km_cumulative_estimate,
            maintenance,
            fuel_cursor: BTreeSet::new(),
            active: true,
        };
        tables.vehicles.insert(vehicle.id, vehicle.clone());
        Self::regenerate(tables, Origin::vehicle(vehicle.id), this_month)?;
        Ok(vehicle)
    }

    pub fn add_transport_path(
        tables: &mut Tables,
        input: NewTransportPath,
        this_month: Month,
    ) -> Result<TransportPath, EngineError> {
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation("description is required".into()));
        }
        if input.average_fare < Decimal::ZERO {
            return Err(EngineError::Validation("fare must not be negative".into()));
        }
        let path = TransportPath {
            id: TransportPathId(tables.next_id()),
            description: input.description.trim().to_string(),
            category_id: input.category_id,
            trips_per_month: input.trips_per_month,
            average_fare: input.average_fare,
            expense_day: input.expense_day.clamp(1, 31),
            active: true,
        };
        tables.transport_paths.insert(path.id, path.clone());
        Self::regenerate(tables, Origin::transport(path.id), this_month)?;
        Ok(path)
    }

    pub fn add_vehicle_financing(
        tables: &mut Tables,
        input: NewVehicleFinancing,
        this_month: Month,
    ) -> Result<VehicleFinancing, EngineError> {
        if !tables.vehicles.contains_key(&input.vehicle_id) {
            return Err(EngineError::not_found("vehicle", input.vehicle_id.0));
        }
        if input.principal <= Decimal::ZERO || input.term_months == 0 {
            return Err(EngineError::Validation(
                "principal and term must be positive".into(),
            ));
        }
        if input.nominal_annual_rate < Decimal::ZERO {
            return Err(EngineError::Validation("rate must not be negative".into()));
        }
        let simulation = VehicleFinancing {
            id: VehicleFinancingId(tables.next_id()),
            vehicle_id: input.vehicle_id,
            principal: input.principal,
            nominal_annual_rate: input.nominal_annual_rate,
            term_months: input.term_months,
            system: input.system,
            first_due_date: input.first_due_date,
            fixed_admin_fee: input.fixed_admin_fee,
            active: true,
        };
        tables.vehicle_financings.insert(simulation.id, simulation.clone());
        Self::regenerate(tables, Origin::vehicle_financing(simulation.id), this_month)?;
        Ok(simulation)
    }

    /// Every active origin.
    pub fn origins(tables: &Tables) -> Vec<Origin> {
        let vehicles = tables
            .vehicles
            .values()
            .filter(|v| v.active)
            .map(|v| Origin::vehicle(v.id));
        let paths = tables
            .transport_paths
            .values()
            .filter(|p| p.active)
            .map(|p| Origin::transport(p.id));
        let simulations = tables
            .vehicle_financings
            .values()
            .filter(|f| f.active)
            .map(|f| Origin::vehicle_financing(f.id));
        vehicles.chain(paths).chain(simulations).collect()
    }

    fn expected(tables: &Tables, origin: Origin, window: &Window) -> Result<Vec<Expected>, EngineError> {
        match origin.kind {
            OriginKind::Vehicle => {
                let vehicle = tables
                    .vehicles
                    .get(&VehicleId(origin.id))
                    .ok_or(EngineError::not_found("vehicle", origin.id))?;
                Ok(if vehicle.active {
                    rules::vehicle(vehicle, window)
                } else {
                    Vec::new()
                })
            }
            OriginKind::TransportPath => {
                let path = tables
                    .transport_paths
                    .get(&TransportPathId(origin.id))
                    .ok_or(EngineError::not_found("transport path", origin.id))?;
                Ok(if path.active {
                    rules::transport(path, window)
                } else {
                    Vec::new()
                })
            }
            OriginKind::VehicleFinancing => {
                let simulation = tables
                    .vehicle_financings
                    .get(&VehicleFinancingId(origin.id))
                    .ok_or(EngineError::not_found("vehicle financing", origin.id))?;
                if !simulation.active {
                    return Ok(Vec::new());
                }
                let category = tables
                    .vehicles
                    .get(&simulation.vehicle_id)
                    .and_then(|v| v.category_id);
                rules::vehicle_financing(simulation, category, window)
            }
        }
    }

    /// Replaces the untouched predictions of an origin inside the window.
    pub fn regenerate(
        tables: &mut Tables,
        origin: Origin,
        this_month: Month,
    ) -> Result<RegenerationReport, EngineError> {
        let horizon = tables.preferences().projection_horizon_months;
        let window = Window::new(this_month, horizon);
        let expected = Self::expected(tables, origin, &window)?;

        let mut locked: HashSet<(PredictionRule, Month)> = HashSet::new();
        let mut stale: Vec<PredictionId> = Vec::new();
        for prediction in tables.predictions_of(origin) {
            if prediction.status != PredictionStatus::Predicted || prediction.is_ripple() {
                locked.insert(prediction.slot());
            } else if window.contains(Month::of(prediction.current_date)) {
                stale.push(prediction.id);
            }
        }
        for id in &stale {
            tables.remove_prediction(*id);
        }

        let mut report = RegenerationReport {
            deleted: stale.len(),
            locked: locked.len(),
            ..RegenerationReport::default()
        };
        for item in expected {
            if locked.contains(&(item.rule, Month::of(item.date))) {
                continue;
            }
            let prediction = Prediction::new(
                PredictionId(tables.next_id()),
                origin,
                item.category_id,
                item.date,
                item.amount,
                PredictionMeta {
                    rule: item.rule,
                    ripple_of: None,
                    note: None,
                },
            );
            tables.insert_prediction(prediction);
            report.created += 1;
        }
        debug!(?origin, ?report, "projection regenerated");
        Ok(report)
    }

    pub fn regenerate_all(tables: &mut Tables, this_month: Month) -> Result<RegenerationReport, EngineError> {
        let mut total = RegenerationReport::default();
        for origin in Self::origins(tables) {
            let report = Self::regenerate(tables, origin, this_month)?;
            total.deleted += report.deleted;
            total.created += report.created;
            total.locked += report.locked;
        }
        Ok(total)
    }

    // === Actions ===

    fn actionable(tables: &Tables, id: PredictionId) -> Result<Prediction, EngineError> {
        let prediction = tables.prediction(id)?;
        match prediction.status {
            PredictionStatus::Predicted | PredictionStatus::Postponed => Ok(prediction.clone()),
            status => Err(EngineError::HistoryConflict(format!(
                "prediction {id} is {status:?}"
            ))),
        }
    }

    fn vehicle_mut(tables: &mut Tables, origin: Origin) -> Result<&mut Vehicle, EngineError> {
        tables
            .vehicles
            .get_mut(&VehicleId(origin.id))
            .ok_or(EngineError::not_found("vehicle", origin.id))
    }

    /// Confirms a prediction.
    ///
    /// # Errors
    ///
    /// [`EngineError::HistoryConflict`] when the prediction is confirmed or ignored.
    pub fn confirm(
        tables: &mut Tables,
        id: PredictionId,
        this_month: Month,
    ) -> Result<Prediction, EngineError> {
        let prediction = Self::actionable(tables, id)?;
        let origin = prediction.origin;
        let confirmed = tables
            .update_prediction(id, |p| p.status = PredictionStatus::Confirmed)?
            .clone();

        match (origin.kind, prediction.rule()) {
            (OriginKind::Vehicle, PredictionRule::Fuel) => {
                let vehicle = Self::vehicle_mut(tables, origin)?;
                // The cursor only grows: each fuel prediction counts once.
                if vehicle.fuel_price > Decimal::ZERO && vehicle.fuel_cursor.insert(id) {
                    let liters = prediction.amount / vehicle.fuel_price;
                    let km = (liters * vehicle.autonomy_km_per_liter).round_dp(2);
                    vehicle.km_cumulative_estimate += km;
                    debug!(vehicle = %vehicle.id, km = %km, "km estimate bumped by fuel");
                }
            }
            (OriginKind::Vehicle, PredictionRule::Maintenance { cycle }) => {
                let vehicle = Self::vehicle_mut(tables, origin)?;
                let estimate = vehicle.km_cumulative_estimate;
                if let Some(row) = vehicle.maintenance.iter_mut().find(|c| c.id == cycle) {
                    row.last_service_km = estimate;
                }
            }
            _ => {}
        }

        if origin.kind == OriginKind::Vehicle {
            Self::regenerate(tables, origin, this_month)?;
        }
        info!(prediction = %id, ?origin, "prediction confirmed");
        Ok(confirmed)
    }

    /// Postpones a prediction to `new_month`, keeping its day of month.
    ///
    /// With `ripple` on a maintenance prediction, exactly one next occurrence
    /// is scheduled one cycle after the new month. Postponing again moves
    /// that same occurrence.
    pub fn postpone(
        tables: &mut Tables,
        id: PredictionId,
        input: PostponeInput,
    ) -> Result<PostponeOutcome, EngineError> {
        let prediction = Self::actionable(tables, id)?;
        if input.new_month <= Month::of(prediction.original_date()) {
            return Err(EngineError::Validation(format!(
                "cannot postpone to {}, the prediction is due in {}",
                input.new_month,
                Month::of(prediction.original_date())
            )));
        }
        let new_date = input.new_month.day(prediction.original_date().day());
        let postponed = tables
            .update_prediction(id, |p| {
                p.status = PredictionStatus::Postponed;
                p.current_date = new_date;
            })?
            .clone();

        let ripple = match (input.ripple, prediction.rule()) {
            (true, PredictionRule::Maintenance { cycle }) => {
                Self::ripple(tables, &postponed, cycle, input.new_month)?
            }
            _ => None,
        };
        info!(prediction = %id, to = %input.new_month, ripple = ripple.is_some(), "prediction postponed");
        Ok(PostponeOutcome {
            prediction: postponed,
            ripple,
        })
    }

    fn ripple(
        tables: &mut Tables,
        source: &Prediction,
        cycle: u32,
        new_month: Month,
    ) -> Result<Option<Prediction>, EngineError> {
        let vehicle = tables
            .vehicles
            .get(&VehicleId(source.origin.id))
            .ok_or(EngineError::not_found("vehicle", source.origin.id))?;
        let Some(definition) = vehicle.cycle(cycle) else {
            return Ok(None);
        };
        let Some(months) = rules::months_to_drive(definition.km_interval, vehicle.avg_km_per_month)
        else {
            return Ok(None);
        };
        let date = new_month.add_months(months.max(1)).day(vehicle.expense_day);
        let (cost, category) = (definition.cost, vehicle.category_id);

        let existing = tables
            .predictions_of(source.origin)
            .into_iter()
            .find(|p| p.metadata.ripple_of == Some(source.id))
            .map(|p| (p.id, p.status));
        match existing {
            Some((ripple_id, PredictionStatus::Predicted)) => {
                let moved = tables.update_prediction(ripple_id, |p| p.current_date = date)?;
                Ok(Some(moved.clone()))
            }
            Some(_) => Ok(None),
            None => {
                let prediction = Prediction::new(
                    PredictionId(tables.next_id()),
                    source.origin,
                    category,
                    date,
                    cost,
                    PredictionMeta {
                        rule: PredictionRule::Maintenance { cycle },
                        ripple_of: Some(source.id),
                        note: None,
                    },
                );
                tables.insert_prediction(prediction.clone());
                Ok(Some(prediction))
            }
        }
    }

    pub fn ignore(tables: &mut Tables, id: PredictionId) -> Result<Prediction, EngineError> {
        Self::actionable(tables, id)?;
        let ignored = tables.update_prediction(id, |p| p.status = PredictionStatus::Ignored)?;
        info!(prediction = %id, "prediction ignored");
        Ok(ignored.clone())
    }

    /// Edits the amount of an untouched prediction.
    pub fn set_amount(
        tables: &mut Tables,
        id: PredictionId,
        amount: Money,
    ) -> Result<Prediction, EngineError> {
        let prediction = tables.prediction(id)?;
        if prediction.status != PredictionStatus::Predicted {
            return Err(EngineError::HistoryConflict(format!(
                "prediction {id} is {:?}",
                prediction.status
            )));
        }
        if amount < Decimal::ZERO {
            return Err(EngineError::Validation("amount must not be negative".into()));
        }
        Ok(tables.update_prediction(id, |p| p.amount = amount)?.clone())
    }

    /// Predictions of every origin whose current date falls in `month`.
    pub fn predictions_in(tables: &Tables, month: Month) -> Vec<Prediction> {
        let mut out: Vec<Prediction> = Self::origins(tables)
            .into_iter()
            .flat_map(|origin| tables.predictions_of(origin))
            .filter(|p| month.contains(p.current_date))
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.current_date, p.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::model::{AnnualCharge, NewMaintenanceCycle};
    use rust_decimal_macros::dec;

    fn jan() -> Month {
        Month::new(2026, 1).unwrap()
    }

    fn vehicle(tables: &mut Tables) -> Vehicle {
        ProjectionEngine::add_vehicle(
            tables,
            NewVehicle {
                name: "Hatch".into(),
                category_id: None,
                avg_km_per_month: dec!(1000),
                autonomy_km_per_liter: dec!(10),
                fuel_price: dec!(6),
                expense_day: 5,
                ipva: Some(AnnualCharge {
                    amount: dec!(1800),
                    month: 3,
                }),
                insurance: None,
                licensing: None,
                km_cumulative_estimate: dec!(20000),
                maintenance: vec![NewMaintenanceCycle {
                    name: "Oil".into(),
                    km_interval: dec!(5000),
                    cost: dec!(400),
                    last_service_km: dec!(18000),
                }],
            },
            jan(),
        )
        .unwrap()
    }

    fn first(tables: &Tables, origin: Origin, rule: PredictionRule) -> Prediction {
        tables
            .predictions_of(origin)
            .into_iter()
            .find(|p| p.rule() == rule)
            .unwrap()
            .clone()
    }

    #[test]
    fn regeneration_is_stable() {
        let mut tables = Tables::default();
        let car = vehicle(&mut tables);
        let origin = Origin::vehicle(car.id);
        let before = tables.predictions_of(origin).len();
        let report = ProjectionEngine::regenerate(&mut tables, origin, jan()).unwrap();
        assert_eq!(report.deleted, report.created);
        assert_eq!(tables.predictions_of(origin).len(), before);
    }

    #[test]
    fn confirmed_fuel_counts_once() {
        let mut tables = Tables::default();
        let car = vehicle(&mut tables);
        let origin = Origin::vehicle(car.id);
        let fuel = first(&tables, origin, PredictionRule::Fuel);
        ProjectionEngine::confirm(&mut tables, fuel.id, jan()).unwrap();
        // 600 / 6 = 100 liters, 1 000 km.
        assert_eq!(tables.vehicles[&car.id].km_cumulative_estimate, dec!(21000));
        let err = ProjectionEngine::confirm(&mut tables, fuel.id, jan()).unwrap_err();
        assert!(matches!(err, EngineError::HistoryConflict(_)));
        assert_eq!(tables.vehicles[&car.id].km_cumulative_estimate, dec!(21000));
    }

    #[test]
    fn locked_slot_is_not_regenerated() {
        let mut tables = Tables::default();
        let car = vehicle(&mut tables);
        let origin = Origin::vehicle(car.id);
        let ipva = first(&tables, origin, PredictionRule::Ipva);
        ProjectionEngine::ignore(&mut tables, ipva.id).unwrap();
        ProjectionEngine::regenerate(&mut tables, origin, jan()).unwrap();
        let ipvas: Vec<_> = tables
            .predictions_of(origin)
            .into_iter()
            .filter(|p| p.rule() == PredictionRule::Ipva)
            .collect();
        assert_eq!(ipvas.len(), 1);
        assert_eq!(ipvas[0].status, PredictionStatus::Ignored);
    }

    #[test]
    fn postpone_with_ripple_is_one_step() {
        let mut tables = Tables::default();
        let car = vehicle(&mut tables);
        let origin = Origin::vehicle(car.id);
        let oil = first(&tables, origin, PredictionRule::Maintenance { cycle: 1 });
        assert_eq!(Month::of(oil.current_date), Month::new(2026, 4).unwrap());

        let outcome = ProjectionEngine::postpone(
            &mut tables,
            oil.id,
            PostponeInput {
                new_month: Month::new(2026, 6).unwrap(),
                ripple: true,
            },
        )
        .unwrap();
        assert_eq!(outcome.prediction.original_date(), oil.original_date());
        assert_eq!(outcome.prediction.status, PredictionStatus::Postponed);
        let ripple = outcome.ripple.unwrap();
        assert_eq!(Month::of(ripple.current_date), Month::new(2026, 11).unwrap());

        let again = ProjectionEngine::postpone(
            &mut tables,
            oil.id,
            PostponeInput {
                new_month: Month::new(2026, 7).unwrap(),
                ripple: true,
            },
        )
        .unwrap();
        let moved = again.ripple.unwrap();
        assert_eq!(moved.id, ripple.id);
        assert_eq!(Month::of(moved.current_date), Month::new(2026, 12).unwrap());
        let ripples = tables
            .predictions_of(origin)
            .into_iter()
            .filter(|p| p.is_ripple())
            .count();
        assert_eq!(ripples, 1);
    }

    #[test]
    fn amount_edits_need_untouched_prediction() {
        let mut tables = Tables::default();
        let car = vehicle(&mut tables);
        let fuel = first(&tables, Origin::vehicle(car.id), PredictionRule::Fuel);
        let edited = ProjectionEngine::set_amount(&mut tables, fuel.id, dec!(650)).unwrap();
        assert_eq!(edited.amount, dec!(650));
        ProjectionEngine::ignore(&mut tables, fuel.id).unwrap();
        let err = ProjectionEngine::set_amount(&mut tables, fuel.id, dec!(700)).unwrap_err();
        assert!(matches!(err, EngineError::HistoryConflict(_)));
    }
}
