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

//! Virtual card invoices.
//!
//! Each `(card, competence)` has exactly one invoice bill. While pending it
//! presents the planned value (sum of budget ceilings) and tracks what was
//! executed; on payment the executed or paid amount replaces the plan.
//!
//! # Invariants
//!
//! - Pending invoice: `executed == Σ charges` and `value == planned`.
//! - Paid invoice: `value == amount_paid`, never touched again.

use super::budget::{self, BudgetAlert};
use super::model::{Card, Charge, NewCard, NewCharge};
use crate::account::{Ledger, MovementKind};
use crate::base::{BillId, CardId, ChargeId, Money, Month};
use crate::bill::{Bill, BillOrigin, CardInvoice, PaymentInput};
use crate::error::EngineError;
use crate::store::Tables;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

/// Result of appending a charge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub charge: Charge,
    pub invoice: Bill,
    pub alerts: Vec<BudgetAlert>,
}

/// Card invoice operations over a store transaction.
pub struct CardInvoiceEngine;

impl CardInvoiceEngine {
    pub fn create_card(tables: &mut Tables, input: NewCard) -> Result<Card, EngineError> {
        if input.name.trim().is_empty() {
            return Err(EngineError::Validation("card name is required".into()));
        }
        for (field, day) in [("closing_day", input.closing_day), ("due_day", input.due_day)] {
            if !(1..=31).contains(&day) {
                return Err(EngineError::Validation(format!("{field} must be within 1..=31")));
            }
        }
        let card = Card {
            id: CardId(tables.next_id()),
            name: input.name.trim().to_string(),
            closing_day: input.closing_day,
            due_day: input.due_day,
            active: true,
        };
        tables.cards.insert(card.id, card.clone());
        info!(card = %card.id, name = %card.name, "card created");
        Ok(card)
    }

    /// Returns the invoice of `(card, competence)`, creating it when missing.
    pub fn get_or_create_invoice(
        tables: &mut Tables,
        card: CardId,
        competence: Month,
    ) -> Result<Bill, EngineError> {
        if let Some(invoice) = tables.invoice_of(card, competence) {
            return Ok(invoice.clone());
        }
        let definition = tables.card(card)?.clone();
        let due_day = match definition.due_day {
            0 => tables.preferences().default_due_day,
            day => day,
        };
        let planned = budget::planned_total(tables, card, competence);
        let invoice = Bill::pending(
            BillId(tables.next_id()),
            format!("{} invoice {competence}", definition.name),
            None,
            competence.day(due_day),
            planned,
            BillOrigin::CardInvoice(CardInvoice {
                card_id: card,
                card_competence: competence,
                planned,
                executed: Decimal::ZERO,
                estouro: false,
            }),
        );
        tables.insert_bill(invoice.clone())?;
        debug!(card = %card, %competence, %planned, "invoice stub created");
        Ok(invoice)
    }

    /// Appends a manual charge and recomputes the invoice.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a zero amount, a foreign item or a bad installment
    /// - [`EngineError::HistoryImmutable`] when the competence's invoice is paid
    pub fn add_charge(
        tables: &mut Tables,
        card: CardId,
        input: NewCharge,
    ) -> Result<ChargeReceipt, EngineError> {
        let charge = Self::append(tables, card, input, None)?;
        let invoice = Self::recompute(tables, card, charge.competence)?;
        let alerts = budget::alerts(tables, card, charge.competence);
        Ok(ChargeReceipt {
            charge,
            invoice,
            alerts,
        })
    }

    /// Validates and persists one charge without recomputing the invoice.
    pub(crate) fn append(
        tables: &mut Tables,
        card: CardId,
        input: NewCharge,
        import_uuid: Option<uuid::Uuid>,
    ) -> Result<Charge, EngineError> {
        tables.card(card)?;
        if input.amount.is_zero() {
            return Err(EngineError::Validation("charge amount must not be zero".into()));
        }
        if let Some(item) = input.item_id {
            let owner = tables
                .budget_items
                .get(&item)
                .ok_or(EngineError::not_found("budget item", item.0))?;
            if owner.card_id != card {
                return Err(EngineError::Validation(format!(
                    "budget item {item} belongs to card {}",
                    owner.card_id
                )));
            }
        }
        if let Some(installment) = input.installment {
            if installment.number == 0 || installment.number > installment.of {
                return Err(EngineError::Validation(format!(
                    "invalid installment {}/{}",
                    installment.number, installment.of
                )));
            }
        }

        let invoice = Self::get_or_create_invoice(tables, card, input.competence)?;
        if invoice.is_paid() {
            return Err(EngineError::HistoryImmutable(format!(
                "invoice of card {card} for {} is paid",
                input.competence
            )));
        }

        let charge = Charge {
            id: ChargeId(tables.next_id()),
            card_id: card,
            purchase_date: input.purchase_date,
            competence: input.competence,
            amount: input.amount,
            description: input.description.trim().to_string(),
            item_id: input.item_id,
            installment: input.installment,
            import_uuid,
        };
        tables.insert_charge(charge.clone())?;
        Ok(charge)
    }

    /// Executed total of a competence: the authoritative sum of its charges.
    pub fn executed(tables: &Tables, card: CardId, competence: Month) -> Money {
        tables
            .charges_of(card, competence)
            .into_iter()
            .map(|c| c.amount)
            .sum()
    }

    /// Refreshes planned, executed and overrun of a pending invoice.
    ///
    /// Paid invoices are returned untouched.
    pub fn recompute(
        tables: &mut Tables,
        card: CardId,
        competence: Month,
    ) -> Result<Bill, EngineError> {
        let invoice = Self::get_or_create_invoice(tables, card, competence)?;
        if invoice.is_paid() {
            return Ok(invoice);
        }
        let executed = Self::executed(tables, card, competence);
        let planned = budget::planned_total(tables, card, competence);

        let bill = tables.bill_mut(invoice.id)?;
        bill.value = planned;
        if let Some(state) = bill.invoice_mut() {
            state.planned = planned;
            state.executed = executed;
            state.estouro = executed > planned;
        }
        Ok(bill.clone())
    }

    /// Settles an invoice.
    ///
    /// The value becomes the explicit amount or, without one, the executed
    /// total. A bank account, when given, is debited in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`EngineError::HistoryConflict`] when the invoice is already paid
    /// - [`EngineError::Validation`] when the bill is not a card invoice
    pub fn pay_invoice(
        tables: &mut Tables,
        bill_id: BillId,
        payment: &PaymentInput,
    ) -> Result<Bill, EngineError> {
        let bill = tables.bill(bill_id)?.clone();
        let Some(invoice) = bill.invoice().cloned() else {
            return Err(EngineError::Validation(format!("bill {bill_id} is not a card invoice")));
        };
        if bill.is_paid() {
            return Err(EngineError::HistoryConflict(format!("invoice {bill_id} is already paid")));
        }
        if payment.amount.is_some_and(|a| a < Decimal::ZERO) {
            return Err(EngineError::Validation("payment amount must not be negative".into()));
        }

        let executed = Self::executed(tables, invoice.card_id, invoice.card_competence);
        let value = payment.amount.unwrap_or(executed);
        let paid = {
            let row = tables.bill_mut(bill_id)?;
            if let Some(state) = row.invoice_mut() {
                state.executed = executed;
                state.estouro = executed > state.planned;
            }
            row.mark_paid(payment.pay_date, value, payment.bank_account);
            row.clone()
        };

        if let Some(account) = payment.bank_account {
            if value > Decimal::ZERO {
                Ledger::post(
                    tables,
                    account,
                    MovementKind::Debit,
                    payment.pay_date,
                    value,
                    paid.description.clone(),
                    Some(bill_id),
                )?;
            }
        }
        info!(invoice = %bill_id, card = %invoice.card_id, %executed, %value, "invoice paid");
        Ok(paid)
    }

    /// Creates this month's invoice stub for every active card.
    ///
    /// Safe to re-run: existing invoices are left as they are.
    pub fn monthly_job(tables: &mut Tables, month: Month) -> Result<usize, EngineError> {
        let cards: Vec<CardId> = tables
            .cards
            .values()
            .filter(|c| c.active)
            .map(|c| c.id)
            .collect();
        let mut created = 0;
        for card in cards {
            if tables.invoice_of(card, month).is_none() {
                Self::get_or_create_invoice(tables, card, month)?;
                created += 1;
            }
        }
        Ok(created)
    }
}
