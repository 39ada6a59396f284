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

//! Consortium (consórcio) contracts and their installment bills.
//!
//! An installment is the letter value plus the administration and reserve
//! fund rates, spread evenly over the term. The last installment absorbs the
//! rounding so the installments add up to the contract total.

use crate::base::{BillId, CategoryId, ConsortiumId, Money, Percent, round_money};
use crate::bill::{Bill, BillOrigin};
use crate::error::EngineError;
use crate::store::Tables;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Consortium {
    pub id: ConsortiumId,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub letter_value: Money,
    pub admin_fee_rate: Percent,
    pub reserve_fund_rate: Percent,
    pub term_months: u32,
    pub first_due_date: NaiveDate,
    pub active: bool,
}

impl Consortium {
    /// Letter value plus fees: what the installments add up to.
    pub fn total(&self) -> Money {
        round_money(
            self.letter_value * (Decimal::ONE + self.admin_fee_rate + self.reserve_fund_rate),
        )
    }

    /// Installment values, the last one absorbing the rounding.
    pub fn installments(&self) -> Vec<Money> {
        if self.term_months == 0 {
            return Vec::new();
        }
        let total = self.total();
        let regular = round_money(total / Decimal::from(self.term_months));
        let mut values = vec![regular; self.term_months as usize];
        let last = total - regular * Decimal::from(self.term_months - 1);
        if let Some(tail) = values.last_mut() {
            *tail = last;
        }
        values
    }

    pub fn due_date_of(&self, installment: u32) -> NaiveDate {
        self.first_due_date
            .checked_add_months(Months::new(installment.saturating_sub(1)))
            .unwrap_or(self.first_due_date)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewConsortium {
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub letter_value: Money,
    #[serde(default)]
    pub admin_fee_rate: Percent,
    #[serde(default)]
    pub reserve_fund_rate: Percent,
    pub term_months: u32,
    pub first_due_date: NaiveDate,
}

pub struct ConsortiumSchedule;

impl ConsortiumSchedule {
    /// Creates the contract and one pending bill per installment.
    pub fn create(tables: &mut Tables, input: NewConsortium) -> Result<Consortium, EngineError> {
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation("description is required".into()));
        }
        if input.letter_value <= Decimal::ZERO {
            return Err(EngineError::Validation("letter value must be positive".into()));
        }
        if input.term_months == 0 {
            return Err(EngineError::Validation("term must be at least one month".into()));
        }
        if input.admin_fee_rate < Decimal::ZERO || input.reserve_fund_rate < Decimal::ZERO {
            return Err(EngineError::Validation("fee rates must not be negative".into()));
        }

        let consortium = Consortium {
            id: ConsortiumId(tables.next_id()),
            description: input.description.trim().to_string(),
            category_id: input.category_id,
            letter_value: input.letter_value,
            admin_fee_rate: input.admin_fee_rate,
            reserve_fund_rate: input.reserve_fund_rate,
            term_months: input.term_months,
            first_due_date: input.first_due_date,
            active: true,
        };
        for (index, value) in consortium.installments().into_iter().enumerate() {
            let installment = index as u32 + 1;
            let bill = Bill::pending(
                BillId(tables.next_id()),
                format!(
                    "{} {installment}/{}",
                    consortium.description, consortium.term_months
                ),
                consortium.category_id,
                consortium.due_date_of(installment),
                value,
                BillOrigin::Consortium {
                    consortium_id: consortium.id,
                    installment,
                },
            );
            tables.insert_bill(bill)?;
        }
        tables.consortia.insert(consortium.id, consortium.clone());
        info!(consortium = %consortium.id, total = %consortium.total(), "consortium created");
        Ok(consortium)
    }

    /// Deactivates a consortium and drops its pending installment bills.
    pub fn cancel(tables: &mut Tables, id: ConsortiumId) -> Result<Consortium, EngineError> {
        let pending: Vec<BillId> = tables
            .bills()
            .filter(|b| {
                !b.is_paid()
                    && matches!(b.origin, BillOrigin::Consortium { consortium_id, .. } if consortium_id == id)
            })
            .map(|b| b.id)
            .collect();
        let consortium = tables
            .consortia
            .get_mut(&id)
            .ok_or(EngineError::not_found("consortium", id.0))?;
        consortium.active = false;
        let consortium = consortium.clone();
        for bill in pending {
            tables.remove_bill(bill);
        }
        Ok(consortium)
    }
}
