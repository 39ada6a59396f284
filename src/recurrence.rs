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

//! Recurring expenses and lazy month materialization.
//!
//! Nothing is generated ahead of time. Before a month is listed the
//! [`RecurrenceMaterializer`] makes sure every active template has its bill
//! for each target month up to the viewed month plus the lookahead, and every
//! active card has its invoice stubs for the same window.

use crate::base::{BillId, CardId, CategoryId, Money, Month, RecurringId};
use crate::bill::{Bill, BillOrigin};
use crate::card::CardInvoiceEngine;
use crate::error::EngineError;
use crate::store::Tables;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceKind {
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl RecurrenceKind {
    pub fn interval_months(self) -> u32 {
        match self {
            RecurrenceKind::Monthly => 1,
            RecurrenceKind::Bimonthly => 2,
            RecurrenceKind::Quarterly => 3,
            RecurrenceKind::Semiannual => 6,
            RecurrenceKind::Annual => 12,
        }
    }
}

/// Template of a bill that repeats on a fixed interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringExpense {
    pub id: RecurringId,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub amount: Money,
    pub start_due_date: NaiveDate,
    pub recurrence: RecurrenceKind,
    pub end_month: Option<Month>,
    pub active: bool,
}

impl RecurringExpense {
    pub fn start_month(&self) -> Month {
        Month::of(self.start_due_date)
    }

    /// Target months from the start up to `until`, stepped by the interval.
    pub fn targets(&self, until: Month) -> Vec<Month> {
        let last = match self.end_month {
            Some(end) if end < until => end,
            _ => until,
        };
        let step = self.recurrence.interval_months();
        let mut out = Vec::new();
        let mut month = self.start_month();
        while month <= last {
            out.push(month);
            month = month.add_months(step);
        }
        out
    }

    /// Due date in a target month, keeping the template's day (clamped).
    pub fn due_in(&self, month: Month) -> NaiveDate {
        month.day(self.start_due_date.day())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRecurringExpense {
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub amount: Money,
    pub start_due_date: NaiveDate,
    pub recurrence: RecurrenceKind,
    #[serde(default)]
    pub end_month: Option<Month>,
}

/// Rows written by one materialization pass.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MaterializeReport {
    pub bills_created: usize,
    pub invoices_created: usize,
}

pub struct RecurrenceMaterializer;

impl RecurrenceMaterializer {
    pub fn create_template(
        tables: &mut Tables,
        input: NewRecurringExpense,
    ) -> Result<RecurringExpense, EngineError> {
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation("description is required".into()));
        }
        if input.amount < Decimal::ZERO {
            return Err(EngineError::Validation("amount must not be negative".into()));
        }
        if input
            .end_month
            .is_some_and(|end| end < Month::of(input.start_due_date))
        {
            return Err(EngineError::Validation("end month precedes the start".into()));
        }
        let template = RecurringExpense {
            id: RecurringId(tables.next_id()),
            description: input.description.trim().to_string(),
            category_id: input.category_id,
            amount: input.amount,
            start_due_date: input.start_due_date,
            recurrence: input.recurrence,
            end_month: input.end_month,
            active: true,
        };
        tables.recurring.insert(template.id, template.clone());
        Ok(template)
    }

    /// Stops future materialization; bills already written stay.
    pub fn deactivate_template(
        tables: &mut Tables,
        id: RecurringId,
    ) -> Result<RecurringExpense, EngineError> {
        let template = tables
            .recurring
            .get_mut(&id)
            .ok_or(EngineError::not_found("recurring expense", id.0))?;
        template.active = false;
        Ok(template.clone())
    }

    /// Fills the bills and invoice stubs a read of `view` needs.
    ///
    /// Idempotent: a second run over the same month writes nothing.
    pub fn materialize(tables: &mut Tables, view: Month) -> Result<MaterializeReport, EngineError> {
        let lookahead = tables.preferences().materialize_lookahead_months;
        let horizon = view.add_months(lookahead);
        let mut report = MaterializeReport::default();

        let existing: BTreeSet<(RecurringId, Month)> = tables
            .bills()
            .filter_map(|b| match b.origin {
                BillOrigin::Recurring { template_id } => Some((template_id, b.competence)),
                _ => None,
            })
            .collect();

        let templates: Vec<RecurringExpense> = tables
            .recurring
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect();
        for template in templates {
            let bound = template.start_month().months_until(view).max(0) as usize
                + 1
                + lookahead as usize;
            let mut created = 0;
            for month in template.targets(horizon) {
                if existing.contains(&(template.id, month)) {
                    continue;
                }
                if created == bound {
                    return Err(EngineError::InvariantViolation(format!(
                        "recurring expense {} exceeded {bound} rows in one pass",
                        template.id
                    )));
                }
                let bill = Bill::pending(
                    BillId(tables.next_id()),
                    template.description.clone(),
                    template.category_id,
                    template.due_in(month),
                    template.amount,
                    BillOrigin::Recurring {
                        template_id: template.id,
                    },
                );
                tables.insert_bill(bill)?;
                created += 1;
            }
            report.bills_created += created;
        }

        let cards: Vec<CardId> = tables
            .cards
            .values()
            .filter(|c| c.active)
            .map(|c| c.id)
            .collect();
        for card in cards {
            let mut month = view;
            while month <= horizon {
                if tables.invoice_of(card, month).is_none() {
                    CardInvoiceEngine::get_or_create_invoice(tables, card, month)?;
                    report.invoices_created += 1;
                }
                month = month.next();
            }
        }

        debug!(
            %view,
            bills = report.bills_created,
            invoices = report.invoices_created,
            "month materialized"
        );
        Ok(report)
    }
}
