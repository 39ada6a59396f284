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

//! Planner facade.
//!
//! The [`Planner`] is the entry point for every user operation. It owns the
//! store, the index registry and the notice queue, and runs each operation
//! as exactly one store transaction.
//!
//! # Operations
//!
//! | Area | Operations |
//! |------|------------|
//! | Financings | create, preview, update, amortize, deactivate, insurance vigencies |
//! | Ledger | manual bills, bill payment, month listing, bank accounts |
//! | Cards | cards, budget items and groups, charges, CSV import, monthly job |
//! | Recurring | templates, consortia |
//! | Projection | origins, confirm, postpone, ignore, amount edits |
//!
//! # Failure handling
//!
//! A failed operation leaves the store untouched. Invariant violations are
//! additionally pushed to the notice queue for the operator. Listing a month
//! never fails because of materialization: the read degrades instead.
//!
//! # Thread Safety
//!
//! The planner is `Send + Sync`; concurrent callers are serialized by the
//! store's lock.

use crate::account::{BankAccount, Ledger, NewBankAccount};
use crate::base::{
    AccountId, BillId, BudgetItemId, CardId, ConsortiumId, FinancingId, Money, Month,
    PredictionId, RecurringId, VigencyId,
};
use crate::bill::{Bill, BillOrigin, MonthView, NewBill, PaymentInput};
use crate::card::{
    self, BudgetAlert, BudgetGroup, BudgetItem, BudgetVigency, Card, CardInvoiceEngine,
    ChargeReceipt, ImportPreview, ImportReport, NewBudgetCeiling, NewBudgetItem, NewCard,
    NewCharge, UploadInput,
};
use crate::config::Preferences;
use crate::consortium::{Consortium, ConsortiumSchedule, NewConsortium};
use crate::error::EngineError;
use crate::financing::{
    self, AmortizationEngine, AmortizationInput, Financing, FinancingUpdate, FinancingView,
    InsuranceTimeline, NewFinancing, NewVigency, ParcelDraft, Vigency, VigencyUpdate,
};
use crate::index::IndexRegistry;
use crate::notice_queue::{Notice, NoticeQueue};
use crate::projection::{
    NewTransportPath, NewVehicle, NewVehicleFinancing, PostponeInput, PostponeOutcome,
    Prediction, ProjectionEngine, RegenerationReport, TransportPath, Vehicle, VehicleFinancing,
};
use crate::recurrence::{NewRecurringExpense, RecurrenceMaterializer, RecurringExpense};
use crate::reconcile::{PaymentOutcome, Reconciler};
use crate::store::{Store, Tables};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use tracing::{info, warn};

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

/// Cash-flow planner: every engine behind one transactional store.
pub struct Planner {
    store: Store,
    indices: IndexRegistry,
    notices: NoticeQueue,
    clock: Clock,
}

impl Planner {
    /// Creates an empty planner that reads "today" from the local clock.
    pub fn new(preferences: Preferences) -> Self {
        Self::with_clock(preferences, || Local::now().date_naive())
    }

    /// Creates an empty planner with an injected clock.
    pub fn with_clock<F>(preferences: Preferences, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        Planner {
            store: Store::new(preferences),
            indices: IndexRegistry::new(),
            notices: NoticeQueue::new(),
            clock: Box::new(clock),
        }
    }

    /// Month the projection window starts at.
    pub fn this_month(&self) -> Month {
        Month::of((self.clock)())
    }

    fn amortization(&self) -> AmortizationEngine<'_> {
        AmortizationEngine::new(&self.indices, &self.notices)
    }

    /// Runs one operation as a transaction and reports invariant violations.
    fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Tables) -> Result<T, EngineError>,
    {
        self.store.transaction(work).inspect_err(|err| {
            if let EngineError::InvariantViolation(detail) = err {
                warn!(operation, %detail, "invariant violated, transaction rolled back");
                self.notices.push(Notice::InvariantViolation {
                    detail: format!("{operation}: {detail}"),
                });
            }
        })
    }

    pub fn preferences(&self) -> Preferences {
        self.store.read(|t| t.preferences().clone())
    }

    // === Indices and notices ===

    pub fn publish_index(&self, name: &str, month: Month, value: Decimal) -> Result<(), EngineError> {
        self.indices.publish(name, month, value)
    }

    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.drain()
    }

    // === Financings ===

    pub fn create_financing(&self, input: NewFinancing) -> Result<FinancingView, EngineError> {
        let engine = self.amortization();
        self.run("create_financing", |t| engine.create(t, input))
    }

    pub fn preview_financing(&self, input: &NewFinancing) -> Result<Vec<ParcelDraft>, EngineError> {
        self.amortization().preview(input)
    }

    pub fn financing(&self, id: FinancingId) -> Result<FinancingView, EngineError> {
        self.store.read(|t| financing::view(t, id))
    }

    pub fn update_financing(
        &self,
        id: FinancingId,
        input: FinancingUpdate,
    ) -> Result<FinancingView, EngineError> {
        let engine = self.amortization();
        self.run("update_financing", |t| engine.update(t, id, input))
    }

    pub fn amortize(&self, id: FinancingId, input: AmortizationInput) -> Result<Financing, EngineError> {
        let engine = self.amortization();
        self.run("amortize", |t| engine.amortize(t, id, input))
    }

    pub fn deactivate_financing(&self, id: FinancingId) -> Result<Financing, EngineError> {
        let engine = self.amortization();
        self.run("deactivate_financing", |t| engine.deactivate(t, id))
    }

    pub fn add_vigency(&self, id: FinancingId, input: NewVigency) -> Result<Vigency, EngineError> {
        let engine = self.amortization();
        self.run("add_vigency", |t| engine.add_vigency(t, id, input))
    }

    pub fn update_vigency(&self, id: VigencyId, input: VigencyUpdate) -> Result<Vigency, EngineError> {
        self.run("update_vigency", |t| InsuranceTimeline::update(t, id, input))
    }

    /// Always refused: vigencies are history.
    pub fn delete_vigency(&self, id: VigencyId) -> Result<(), EngineError> {
        self.store.read(|t| InsuranceTimeline::delete(t, id))
    }

    // === Ledger ===

    pub fn add_bill(&self, input: NewBill) -> Result<Bill, EngineError> {
        if input.description.trim().is_empty() {
            return Err(EngineError::Validation("description is required".into()));
        }
        if input.value < Decimal::ZERO {
            return Err(EngineError::Validation("value must not be negative".into()));
        }
        self.run("add_bill", |t| {
            let bill = Bill::pending(
                BillId(t.next_id()),
                input.description.trim(),
                input.category_id,
                input.due_date,
                input.value,
                BillOrigin::Manual,
            );
            t.insert_bill(bill.clone())?;
            Ok(bill)
        })
    }

    pub fn pay_bill(&self, id: BillId, payment: PaymentInput) -> Result<PaymentOutcome, EngineError> {
        let engine = self.amortization();
        self.run("pay_bill", |t| Reconciler::pay_bill(engine, t, id, payment))
    }

    /// Bills of a competence month, materialized on the way.
    ///
    /// Materialization runs in its own transaction. When it fails, its writes
    /// are rolled back and the view lists only existing rows, flagged
    /// `degraded`.
    pub fn list_month(&self, month: Month) -> MonthView {
        let degraded = match self
            .store
            .transaction(|t| RecurrenceMaterializer::materialize(t, month))
        {
            Ok(_) => false,
            Err(err) => {
                warn!(%month, error = %err, "materialization failed, serving degraded read");
                self.notices.push(Notice::DegradedRead {
                    month,
                    detail: err.to_string(),
                });
                true
            }
        };
        let bills = self
            .store
            .read(|t| t.bills_in(month).into_iter().cloned().collect());
        MonthView {
            month,
            bills,
            degraded,
        }
    }

    pub fn bill(&self, id: BillId) -> Result<Bill, EngineError> {
        self.store.read(|t| t.bill(id).cloned())
    }

    pub fn open_account(&self, input: NewBankAccount) -> Result<BankAccount, EngineError> {
        self.run("open_account", |t| Ledger::open(t, input))
    }

    pub fn close_account(&self, id: AccountId) -> Result<BankAccount, EngineError> {
        self.run("close_account", |t| Ledger::close(t, id))
    }

    pub fn account(&self, id: AccountId) -> Result<BankAccount, EngineError> {
        self.store.read(|t| t.account(id).cloned())
    }

    // === Cards ===

    pub fn create_card(&self, input: NewCard) -> Result<Card, EngineError> {
        self.run("create_card", |t| CardInvoiceEngine::create_card(t, input))
    }

    pub fn add_budget_group(&self, name: &str) -> Result<BudgetGroup, EngineError> {
        self.run("add_budget_group", |t| card::budget::add_group(t, name))
    }

    pub fn add_budget_item(&self, card: CardId, input: NewBudgetItem) -> Result<BudgetItem, EngineError> {
        self.run("add_budget_item", |t| {
            let item = card::budget::add_item(t, card, input)?;
            refresh_pending_invoices(t, card)?;
            Ok(item)
        })
    }

    pub fn set_budget_ceiling(
        &self,
        item: BudgetItemId,
        input: NewBudgetCeiling,
    ) -> Result<BudgetVigency, EngineError> {
        self.run("set_budget_ceiling", |t| {
            let card = t
                .budget_items
                .get(&item)
                .map(|i| i.card_id)
                .ok_or(EngineError::not_found("budget item", item.0))?;
            let vigency = card::budget::set_ceiling(t, item, input)?;
            refresh_pending_invoices(t, card)?;
            Ok(vigency)
        })
    }

    pub fn add_charge(&self, card: CardId, input: NewCharge) -> Result<ChargeReceipt, EngineError> {
        self.run("add_charge", |t| CardInvoiceEngine::add_charge(t, card, input))
    }

    /// Invoice of a competence, created and refreshed when pending.
    pub fn invoice(&self, card: CardId, competence: Month) -> Result<Bill, EngineError> {
        self.run("invoice", |t| CardInvoiceEngine::recompute(t, card, competence))
    }

    pub fn budget_alerts(&self, card: CardId, competence: Month) -> Result<Vec<BudgetAlert>, EngineError> {
        self.store.read(|t| {
            t.card(card)?;
            Ok(card::budget::alerts(t, card, competence))
        })
    }

    pub fn import_upload(&self, input: UploadInput) -> Result<ImportPreview, EngineError> {
        self.store.read(|t| card::import::upload(t, input))
    }

    pub fn import_commit(&self, preview: ImportPreview) -> Result<ImportReport, EngineError> {
        self.run("import_commit", |t| card::import::commit(t, preview))
    }

    /// Creates the invoice stubs of `month` for every active card.
    pub fn monthly_job(&self, month: Month) -> Result<usize, EngineError> {
        let created = self.run("monthly_job", |t| CardInvoiceEngine::monthly_job(t, month))?;
        info!(%month, created, "monthly invoice job finished");
        Ok(created)
    }

    // === Recurring expenses and consortia ===

    pub fn create_recurring(&self, input: NewRecurringExpense) -> Result<RecurringExpense, EngineError> {
        self.run("create_recurring", |t| RecurrenceMaterializer::create_template(t, input))
    }

    pub fn deactivate_recurring(&self, id: RecurringId) -> Result<RecurringExpense, EngineError> {
        self.run("deactivate_recurring", |t| {
            RecurrenceMaterializer::deactivate_template(t, id)
        })
    }

    pub fn create_consortium(&self, input: NewConsortium) -> Result<Consortium, EngineError> {
        self.run("create_consortium", |t| ConsortiumSchedule::create(t, input))
    }

    pub fn cancel_consortium(&self, id: ConsortiumId) -> Result<Consortium, EngineError> {
        self.run("cancel_consortium", |t| ConsortiumSchedule::cancel(t, id))
    }

    // === Projection ===

    pub fn add_vehicle(&self, input: NewVehicle) -> Result<Vehicle, EngineError> {
        let this_month = self.this_month();
        self.run("add_vehicle", |t| ProjectionEngine::add_vehicle(t, input, this_month))
    }

    pub fn add_transport_path(&self, input: NewTransportPath) -> Result<TransportPath, EngineError> {
        let this_month = self.this_month();
        self.run("add_transport_path", |t| {
            ProjectionEngine::add_transport_path(t, input, this_month)
        })
    }

    pub fn add_vehicle_financing(
        &self,
        input: NewVehicleFinancing,
    ) -> Result<VehicleFinancing, EngineError> {
        let this_month = self.this_month();
        self.run("add_vehicle_financing", |t| {
            ProjectionEngine::add_vehicle_financing(t, input, this_month)
        })
    }

    /// Rolls every origin's window forward to the current month.
    pub fn regenerate_projections(&self) -> Result<RegenerationReport, EngineError> {
        let this_month = self.this_month();
        self.run("regenerate_projections", |t| {
            ProjectionEngine::regenerate_all(t, this_month)
        })
    }

    pub fn confirm_prediction(&self, id: PredictionId) -> Result<Prediction, EngineError> {
        let this_month = self.this_month();
        self.run("confirm_prediction", |t| ProjectionEngine::confirm(t, id, this_month))
    }

    pub fn postpone_prediction(
        &self,
        id: PredictionId,
        input: PostponeInput,
    ) -> Result<PostponeOutcome, EngineError> {
        self.run("postpone_prediction", |t| ProjectionEngine::postpone(t, id, input))
    }

    pub fn ignore_prediction(&self, id: PredictionId) -> Result<Prediction, EngineError> {
        self.run("ignore_prediction", |t| ProjectionEngine::ignore(t, id))
    }

    pub fn set_prediction_amount(&self, id: PredictionId, amount: Money) -> Result<Prediction, EngineError> {
        self.run("set_prediction_amount", |t| ProjectionEngine::set_amount(t, id, amount))
    }

    pub fn prediction(&self, id: PredictionId) -> Result<Prediction, EngineError> {
        self.store.read(|t| t.prediction(id).cloned())
    }

    pub fn predictions_in(&self, month: Month) -> Vec<Prediction> {
        self.store.read(|t| ProjectionEngine::predictions_in(t, month))
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

/// Refreshes the planned value of every pending invoice of a card.
fn refresh_pending_invoices(tables: &mut Tables, card: CardId) -> Result<(), EngineError> {
    let competences: Vec<Month> = tables
        .bills()
        .filter(|b| !b.is_paid())
        .filter_map(Bill::invoice)
        .filter(|i| i.card_id == card)
        .map(|i| i.card_competence)
        .collect();
    for competence in competences {
        CardInvoiceEngine::recompute(tables, card, competence)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn planner() -> Planner {
        Planner::with_clock(Preferences::default(), || {
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        })
    }

    #[test]
    fn clock_drives_this_month() {
        assert_eq!(planner().this_month(), Month::new(2026, 1).unwrap());
    }

    #[test]
    fn invariant_violation_is_noticed() {
        let planner = planner();
        let result: Result<(), EngineError> = planner.run("probe", |_| {
            Err(EngineError::InvariantViolation("broken chain".into()))
        });
        assert!(result.is_err());
        assert_eq!(
            planner.drain_notices(),
            vec![Notice::InvariantViolation {
                detail: "probe: broken chain".into()
            }]
        );
    }

    #[test]
    fn other_errors_are_not_noticed() {
        let planner = planner();
        let err = planner.bill(BillId(42)).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(planner.drain_notices().is_empty());
    }

    #[test]
    fn new_ceiling_refreshes_pending_invoice() {
        let planner = planner();
        let card = planner
            .create_card(NewCard {
                name: "Visa".into(),
                closing_day: 1,
                due_day: 10,
            })
            .unwrap();
        let jan = Month::new(2026, 1).unwrap();
        let item = planner
            .add_budget_item(
                card.id,
                NewBudgetItem {
                    name: "Groceries".into(),
                    group_id: None,
                    category_id: None,
                    ceiling: dec!(800),
                    start_month: jan,
                },
            )
            .unwrap();
        assert_eq!(planner.invoice(card.id, jan).unwrap().value, dec!(800));
        planner
            .set_budget_ceiling(
                item.id,
                NewBudgetCeiling {
                    start_month: jan,
                    ceiling: dec!(950),
                },
            )
            .unwrap();
        assert_eq!(planner.invoice(card.id, jan).unwrap().value, dec!(950));
    }
}
