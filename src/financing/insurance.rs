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

//! Manual insurance schedule of a financing.
//!
//! Vigencies partition time: a new vigency closes its open predecessor on the
//! last day of the month before its start, and is itself bounded by the next
//! vigency when inserted in the middle. Closed vigencies are never reopened.

use crate::base::{FinancingId, Money, Month, ParcelId, VigencyId};
use crate::error::EngineError;
use crate::store::Tables;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Insurance value of a financing over a period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vigency {
    pub id: VigencyId,
    pub financing_id: FinancingId,
    pub start_month: Month,
    pub monthly_value: Money,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub notes: Option<String>,
}

impl Vigency {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.active
            && self.start_month.first_day() <= date
            && self.end_date.is_none_or(|end| end >= date)
    }
}

/// Input for `POST /financings/{id}/insurance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewVigency {
    pub start_month: Month,
    pub monthly_value: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for `PUT /financings/insurance/{vigency_id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VigencyUpdate {
    pub monthly_value: Option<Money>,
    pub notes: Option<String>,
}

/// Point-in-time view over the active vigencies of one financing.
#[derive(Debug, Clone)]
pub struct InsuranceTimeline {
    financing: FinancingId,
    vigencies: Vec<Vigency>,
}

impl InsuranceTimeline {
    pub fn new(financing: FinancingId, vigencies: impl IntoIterator<Item = Vigency>) -> Self {
        let mut vigencies: Vec<Vigency> = vigencies.into_iter().filter(|v| v.active).collect();
        vigencies.sort_by_key(|v| (v.start_month, v.id));
        Self {
            financing,
            vigencies,
        }
    }

    pub fn load(tables: &Tables, financing: FinancingId) -> Self {
        Self::new(financing, tables.vigencies_of(financing).into_iter().cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.vigencies.is_empty()
    }

    /// Value of the covering vigency with the latest start, if any.
    pub fn value_at(&self, date: NaiveDate) -> Option<Money> {
        self.vigencies
            .iter()
            .rev()
            .find(|v| v.covers(date))
            .map(|v| v.monthly_value)
    }

    /// Insurance charged on a parcel due at `date`.
    ///
    /// A financing without vigencies carries no insurance. Once it has any,
    /// every due date must be covered.
    pub fn insurance_for(&self, date: NaiveDate) -> Result<Money, EngineError> {
        if self.is_empty() {
            return Ok(Decimal::ZERO);
        }
        self.value_at(date).ok_or(EngineError::InsuranceGap {
            financing: self.financing,
            date,
        })
    }

    /// Creates a vigency and recomputes insurance of the pending parcels it covers.
    ///
    /// # Errors
    ///
    /// - [`EngineError::HistoryConflict`] when a paid parcel is due on or after the start
    /// - [`EngineError::HistoryImmutable`] on a settled or inactive financing
    /// - [`EngineError::InsuranceGap`] when a pending parcel would be left uncovered
    pub fn create(
        tables: &mut Tables,
        financing: FinancingId,
        input: NewVigency,
    ) -> Result<Vigency, EngineError> {
        ensure_active(tables, financing)?;
        let start = input.start_month.first_day();
        if let Some(paid) = tables
            .parcels_of(financing)
            .into_iter()
            .find(|p| p.is_paid() && p.due_date >= start)
        {
            return Err(EngineError::HistoryConflict(format!(
                "parcel {} due {} is already paid",
                paid.number, paid.due_date
            )));
        }

        let vigency = Self::insert(tables, financing, input)?;
        recalculate_insurance(tables, financing, start)?;

        // Pending parcels before the start must still be covered.
        let timeline = Self::load(tables, financing);
        for parcel in tables.parcels_of(financing) {
            if !parcel.is_paid() && parcel.due_date < start {
                timeline.insurance_for(parcel.due_date)?;
            }
        }

        info!(
            financing = %financing,
            vigency = %vigency.id,
            start = %vigency.start_month,
            value = %vigency.monthly_value,
            "insurance vigency created"
        );
        Ok(vigency)
    }

    /// Inserts a vigency, closing the same-start and preceding ones.
    pub(crate) fn insert(
        tables: &mut Tables,
        financing: FinancingId,
        input: NewVigency,
    ) -> Result<Vigency, EngineError> {
        if input.monthly_value < Decimal::ZERO {
            return Err(EngineError::Validation(
                "insurance monthly value must not be negative".into(),
            ));
        }
        let start = input.start_month;
        let closing = start.day_before();

        let mut successor: Option<Month> = None;
        for vigency in tables.vigencies.values_mut() {
            if vigency.financing_id != financing || !vigency.active {
                continue;
            }
            if vigency.start_month == start {
                vigency.active = false;
                vigency.end_date = Some(closing);
            } else if vigency.start_month > start
                && successor.is_none_or(|s| vigency.start_month < s)
            {
                successor = Some(vigency.start_month);
            }
        }

        // Only the latest predecessor can still run past the new start.
        let predecessor = tables
            .vigencies
            .values()
            .filter(|v| {
                v.financing_id == financing
                    && v.active
                    && v.start_month < start
                    && v.end_date.is_none_or(|end| end > closing)
            })
            .max_by_key(|v| v.start_month)
            .map(|v| v.id);
        if let Some(id) = predecessor {
            if let Some(vigency) = tables.vigencies.get_mut(&id) {
                vigency.end_date = Some(closing);
            }
        }

        let vigency = Vigency {
            id: VigencyId(tables.next_id()),
            financing_id: financing,
            start_month: start,
            monthly_value: input.monthly_value,
            end_date: successor.map(Month::day_before),
            active: true,
            notes: input.notes,
        };
        tables.vigencies.insert(vigency.id, vigency.clone());
        Ok(vigency)
    }

    /// Updates value or notes of a vigency no paid parcel falls in.
    ///
    /// Refused with [`EngineError::HistoryImmutable`] on a closed vigency or a
    /// settled or inactive financing.
    pub fn update(
        tables: &mut Tables,
        id: VigencyId,
        input: VigencyUpdate,
    ) -> Result<Vigency, EngineError> {
        let vigency = tables
            .vigencies
            .get(&id)
            .cloned()
            .ok_or(EngineError::not_found("insurance vigency", id.0))?;
        if !vigency.active {
            return Err(EngineError::HistoryImmutable(format!(
                "vigency {id} is closed"
            )));
        }
        ensure_active(tables, vigency.financing_id)?;
        if let Some(value) = input.monthly_value {
            if value < Decimal::ZERO {
                return Err(EngineError::Validation(
                    "insurance monthly value must not be negative".into(),
                ));
            }
        }
        if let Some(paid) = tables
            .parcels_of(vigency.financing_id)
            .into_iter()
            .find(|p| p.is_paid() && vigency.covers(p.due_date))
        {
            return Err(EngineError::HistoryConflict(format!(
                "paid parcel {} lies in vigency {id}",
                paid.number
            )));
        }

        let updated = {
            let row = tables
                .vigencies
                .get_mut(&id)
                .ok_or(EngineError::not_found("insurance vigency", id.0))?;
            if let Some(value) = input.monthly_value {
                row.monthly_value = value;
            }
            if input.notes.is_some() {
                row.notes = input.notes;
            }
            row.clone()
        };
        if input.monthly_value.is_some() {
            recalculate_insurance(tables, updated.financing_id, updated.start_month.first_day())?;
        }
        Ok(updated)
    }

    /// Vigencies are never deleted.
    pub fn delete(tables: &Tables, id: VigencyId) -> Result<(), EngineError> {
        if !tables.vigencies.contains_key(&id) {
            return Err(EngineError::not_found("insurance vigency", id.0));
        }
        Err(EngineError::HistoryImmutable(format!(
            "insurance vigency {id} cannot be deleted"
        )))
    }
}

fn ensure_active(tables: &Tables, financing: FinancingId) -> Result<(), EngineError> {
    let contract = tables.financing(financing)?;
    if !contract.is_active() {
        return Err(EngineError::HistoryImmutable(format!(
            "financing {financing} is {:?}",
            contract.state
        )));
    }
    Ok(())
}

/// Insurance-only recalculation.
///
/// Rewrites `insurance` and `total_planned` of pending parcels due on or after
/// `from` and the value of their pending bills. Amortization, interest and the
/// saldo chain are left alone.
pub(crate) fn recalculate_insurance(
    tables: &mut Tables,
    financing: FinancingId,
    from: NaiveDate,
) -> Result<usize, EngineError> {
    let timeline = InsuranceTimeline::load(tables, financing);
    let targets: Vec<(ParcelId, NaiveDate)> = tables
        .parcels_of(financing)
        .into_iter()
        .filter(|p| !p.is_paid() && p.due_date >= from)
        .map(|p| (p.id, p.due_date))
        .collect();

    for (id, due) in &targets {
        let insurance = timeline.insurance_for(*due)?;
        let parcel = tables.parcel_mut(*id)?;
        parcel.insurance = insurance;
        parcel.total_planned =
            parcel.amortization + parcel.interest + parcel.insurance + parcel.admin_fee;
        let (bill_id, total) = (parcel.bill_id, parcel.total_planned);
        if let Some(bill_id) = bill_id {
            let bill = tables.bill_mut(bill_id)?;
            if !bill.is_paid() {
                bill.value = total;
            }
        }
    }
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(y: i32, m: u32) -> Month {
        Month::new(y, m).unwrap()
    }

    fn vigency(id: u64, start: Month, value: Money, end: Option<NaiveDate>) -> Vigency {
        Vigency {
            id: VigencyId(id),
            financing_id: FinancingId(1),
            start_month: start,
            monthly_value: value,
            end_date: end,
            active: true,
            notes: None,
        }
    }

    #[test]
    fn value_at_picks_latest_covering_start() {
        let timeline = InsuranceTimeline::new(
            FinancingId(1),
            [
                vigency(1, month(2025, 1), dec!(200), Some(date(2026, 1, 31))),
                vigency(2, month(2026, 2), dec!(250), None),
            ],
        );
        assert_eq!(timeline.value_at(date(2026, 1, 15)), Some(dec!(200)));
        assert_eq!(timeline.value_at(date(2026, 2, 15)), Some(dec!(250)));
        assert_eq!(timeline.value_at(date(2024, 12, 15)), None);
    }

    #[test]
    fn empty_timeline_charges_nothing() {
        let timeline = InsuranceTimeline::new(FinancingId(1), []);
        assert_eq!(timeline.insurance_for(date(2026, 1, 15)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn uncovered_date_is_a_gap() {
        let timeline = InsuranceTimeline::new(
            FinancingId(1),
            [vigency(1, month(2026, 3), dec!(200), None)],
        );
        assert_eq!(
            timeline.insurance_for(date(2026, 2, 15)),
            Err(EngineError::InsuranceGap {
                financing: FinancingId(1),
                date: date(2026, 2, 15)
            })
        );
    }

    #[test]
    fn inactive_vigencies_are_ignored() {
        let mut closed = vigency(1, month(2025, 1), dec!(200), Some(date(2024, 12, 31)));
        closed.active = false;
        let timeline = InsuranceTimeline::new(
            FinancingId(1),
            [closed, vigency(2, month(2025, 1), dec!(210), None)],
        );
        assert_eq!(timeline.value_at(date(2025, 6, 1)), Some(dec!(210)));
    }
}
