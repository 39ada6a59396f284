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

//! Core identifier types, the [`Month`] calendar key and money helpers.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Stored monetary amount. Persisted values carry two decimal places.
pub type Money = Decimal;

/// Decimal fraction (0.06% is stored as `0.0006`).
pub type Percent = Decimal;

/// Decimal places kept for stored money.
pub const MONEY_SCALE: u32 = 2;

/// Decimal places kept for derived monthly rates.
pub const RATE_SCALE: u32 = 8;

/// Rounds an intermediate value to stored money precision.
pub fn round_money(value: Decimal) -> Money {
    value.round_dp(MONEY_SCALE)
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a real-estate financing contract.
    FinancingId
);
id_type!(
    /// Identifier of a financing parcel row.
    ParcelId
);
id_type!(
    /// Identifier of an extraordinary amortization event.
    AmortizationId
);
id_type!(
    /// Identifier of an insurance vigency.
    VigencyId
);
id_type!(
    /// Identifier of a ledger bill (conta).
    BillId
);
id_type!(CardId);
id_type!(
    /// Identifier of a card budget item (item agregado).
    BudgetItemId
);
id_type!(BudgetVigencyId);
id_type!(
    /// Identifier of a budget group (grupo agregador).
    GroupId
);
id_type!(ChargeId);
id_type!(
    /// Identifier of a recurring expense template.
    RecurringId
);
id_type!(
    /// Identifier of a predicted expense.
    PredictionId
);
id_type!(VehicleId);
id_type!(TransportPathId);
id_type!(VehicleFinancingId);
id_type!(ConsortiumId);
id_type!(AccountId);
id_type!(MovementId);
id_type!(CategoryId);

/// First calendar day of a month.
///
/// A `Month` is the canonical key for competences, budgets and vigencies. It
/// can only be built through constructors that normalize the day to `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month(NaiveDate);

impl Month {
    /// Builds a month from year and month number (1–12).
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Month)
    }

    /// Normalizes any date to the first day of its month.
    pub fn of(date: NaiveDate) -> Self {
        // Day 1 exists in every month.
        Month(date.with_day(1).unwrap_or(date))
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    /// Last calendar day of the month.
    pub fn last_day(self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(self.0)
    }

    /// Last day of the previous month ("day before" this month starts).
    pub fn day_before(self) -> NaiveDate {
        self.0.pred_opt().unwrap_or(self.0)
    }

    pub fn next(self) -> Self {
        self.add_months(1)
    }

    pub fn prev(self) -> Self {
        Month(
            self.0
                .checked_sub_months(Months::new(1))
                .unwrap_or(self.0),
        )
    }

    pub fn add_months(self, months: u32) -> Self {
        Month(
            self.0
                .checked_add_months(Months::new(months))
                .unwrap_or(self.0),
        )
    }

    /// Number of whole months from `self` to `later` (negative when `later` precedes `self`).
    pub fn months_until(self, later: Month) -> i64 {
        let years = i64::from(later.year()) - i64::from(self.year());
        let months = i64::from(later.month()) - i64::from(self.month());
        years * 12 + months
    }

    /// Date on `day` of this month, clamped to the month's last day.
    pub fn day(self, day: u32) -> NaiveDate {
        let last = self.last_day().day();
        let day = day.clamp(1, last);
        self.0.with_day(day).unwrap_or(self.0)
    }

    /// Whether `date` falls inside this month.
    pub fn contains(self, date: NaiveDate) -> bool {
        Month::of(date) == self
    }
}

impl From<NaiveDate> for Month {
    fn from(date: NaiveDate) -> Self {
        Month::of(date)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// Error returned when a month literal cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMonthError(String);

impl fmt::Display for ParseMonthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid month `{}` (expected YYYY-MM or YYYY-MM-DD)", self.0)
    }
}

impl std::error::Error for ParseMonthError {}

impl FromStr for Month {
    type Err = ParseMonthError;

    /// Accepts `YYYY-MM` and full ISO dates (normalized to the first day).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(Month::of(date));
        }
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| ParseMonthError(s.to_string()))?;
        let year: i32 = year.parse().map_err(|_| ParseMonthError(s.to_string()))?;
        let month: u32 = month.parse().map_err(|_| ParseMonthError(s.to_string()))?;
        Month::new(year, month).ok_or_else(|| ParseMonthError(s.to_string()))
    }
}

impl Serialize for Month {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
