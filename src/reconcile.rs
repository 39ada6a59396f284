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

//! Bill settlement.
//!
//! Paying a bill is the only channel back from the ledger into the engines:
//! a parcel bill consolidates its parcel into the financing, an invoice bill
//! settles the card competence. The caller runs [`Reconciler::pay_bill`]
//! inside one transaction, so a failure at any step leaves nothing behind.

use crate::account::{Ledger, MovementKind};
use crate::base::{BillId, Money};
use crate::bill::{Bill, BillOrigin, PaymentInput};
use crate::card::CardInvoiceEngine;
use crate::error::EngineError;
use crate::financing::AmortizationEngine;
use crate::store::Tables;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// Invoice figures returned with a paid card invoice.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct InvoiceSummary {
    pub planned: Money,
    pub executed: Money,
    pub estouro: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub bill: Bill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<InvoiceSummary>,
}

pub struct Reconciler;

impl Reconciler {
    /// Marks a bill paid and propagates the payment to its engine.
    ///
    /// # Errors
    ///
    /// - [`EngineError::HistoryConflict`] when the bill is already paid or its
    ///   parcel is not the next one due
    /// - [`EngineError::Validation`] for a negative amount
    /// - whatever the owning engine or the ledger refuses
    pub fn pay_bill(
        engine: AmortizationEngine<'_>,
        tables: &mut Tables,
        bill_id: BillId,
        payment: PaymentInput,
    ) -> Result<PaymentOutcome, EngineError> {
        let bill = tables.bill(bill_id)?.clone();
        if bill.is_paid() {
            return Err(EngineError::HistoryConflict(format!("bill {bill_id} is already paid")));
        }
        if payment.amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(EngineError::Validation("payment amount must not be negative".into()));
        }

        if bill.is_card_invoice() {
            // The invoice engine posts its own debit.
            let paid = CardInvoiceEngine::pay_invoice(tables, bill_id, &payment)?;
            let invoice = paid.invoice().map(|state| InvoiceSummary {
                planned: state.planned,
                executed: state.executed,
                estouro: state.estouro,
            });
            return Ok(PaymentOutcome { bill: paid, invoice });
        }

        let amount = payment.amount.unwrap_or(bill.value);
        if let BillOrigin::Parcel { parcel_id, .. } = bill.origin {
            engine.pay_parcel(tables, parcel_id, payment.pay_date, amount)?;
        }

        let paid = {
            let row = tables.bill_mut(bill_id)?;
            row.mark_paid(payment.pay_date, amount, payment.bank_account);
            row.clone()
        };
        if let Some(account) = payment.bank_account {
            if amount > Decimal::ZERO {
                Ledger::post(
                    tables,
                    account,
                    MovementKind::Debit,
                    payment.pay_date,
                    amount,
                    paid.description.clone(),
                    Some(bill_id),
                )?;
            }
        }
        info!(bill = %bill_id, %amount, account = ?payment.bank_account, "bill paid");
        Ok(PaymentOutcome {
            bill: paid,
            invoice: None,
        })
    }
}
