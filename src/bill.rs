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

//! Ledger bills (contas): one row per monthly commitment the user sees.

use crate::base::{
    AccountId, BillId, CardId, CategoryId, ConsortiumId, FinancingId, Money, Month, ParcelId,
    RecurringId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Paid,
}

/// Invoice presentation of a card competence.
///
/// While pending the bill value is `planned`; on settlement it becomes the
/// executed (or explicitly paid) amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInvoice {
    pub card_id: CardId,
    pub card_competence: Month,
    pub planned: Money,
    pub executed: Money,
    /// Overrun: executed exceeds planned.
    pub estouro: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillOrigin {
    Manual,
    Recurring {
        template_id: RecurringId,
    },
    Parcel {
        financing_id: FinancingId,
        parcel_id: ParcelId,
    },
    Consortium {
        consortium_id: ConsortiumId,
        installment: u32,
    },
    CardInvoice(CardInvoice),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bill {
    pub id: BillId,
    pub description: String,
    pub category_id: Option<CategoryId>,
    pub competence: Month,
    pub due_date: NaiveDate,
    pub value: Money,
    pub status: BillStatus,
    pub paid_at: Option<NaiveDate>,
    pub amount_paid: Option<Money>,
    pub paid_from: Option<AccountId>,
    pub origin: BillOrigin,
}

impl Bill {
    /// Pending bill whose competence is the month of its due date.
    pub fn pending(
        id: BillId,
        description: impl Into<String>,
        category_id: Option<CategoryId>,
        due_date: NaiveDate,
        value: Money,
        origin: BillOrigin,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            category_id,
            competence: Month::of(due_date),
            due_date,
            value,
            status: BillStatus::Pending,
            paid_at: None,
            amount_paid: None,
            paid_from: None,
            origin,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }

    pub fn is_card_invoice(&self) -> bool {
        matches!(self.origin, BillOrigin::CardInvoice(_))
    }

    pub fn invoice(&self) -> Option<&CardInvoice> {
        match &self.origin {
            BillOrigin::CardInvoice(invoice) => Some(invoice),
            _ => None,
        }
    }

    pub fn invoice_mut(&mut self) -> Option<&mut CardInvoice> {
        match &mut self.origin {
            BillOrigin::CardInvoice(invoice) => Some(invoice),
            _ => None,
        }
    }

    pub fn parcel_ref(&self) -> Option<(FinancingId, ParcelId)> {
        match self.origin {
            BillOrigin::Parcel {
                financing_id,
                parcel_id,
            } => Some((financing_id, parcel_id)),
            _ => None,
        }
    }

    pub(crate) fn mark_paid(&mut self, pay_date: NaiveDate, amount: Money, account: Option<AccountId>) {
        self.status = BillStatus::Paid;
        self.paid_at = Some(pay_date);
        self.amount_paid = Some(amount);
        self.value = amount;
        self.paid_from = account;
    }
}

/// Input for an ordinary bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBill {
    pub description: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub due_date: NaiveDate,
    pub value: Money,
}

/// Input for `POST /expenses/{bill_id}/pay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentInput {
    pub pay_date: NaiveDate,
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub bank_account: Option<AccountId>,
}

/// Bills of one competence month as presented to the user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MonthView {
    pub month: Month,
    pub bills: Vec<Bill>,
    /// Materialization failed; only pre-existing rows are listed.
    pub degraded: bool,
}

impl MonthView {
    pub fn total(&self) -> Money {
        self.bills.iter().map(|b| b.value).sum()
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Bill> {
        self.bills.iter().filter(|b| b.is_card_invoice())
    }
}
