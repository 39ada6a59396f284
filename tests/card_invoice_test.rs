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

//! Integration tests for card invoices, budgets and statement import.

use cashflow_engine_rs::card::{
    AlertLevel, AlertScope, Card, Installment, NewBudgetCeiling, UploadInput,
};
use cashflow_engine_rs::{
    BudgetItemId, EngineError, Month, NewBankAccount, NewBudgetItem, NewCard, NewCharge,
    PaymentInput, Planner,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// === Helpers ===

fn march() -> Month {
    Month::new(2026, 3).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn card(planner: &Planner) -> Card {
    planner
        .create_card(NewCard {
            name: "Gold".into(),
            closing_day: 3,
            due_day: 10,
        })
        .unwrap()
}

fn item(planner: &Planner, card: &Card, name: &str, ceiling: Decimal) -> BudgetItemId {
    planner
        .add_budget_item(
            card.id,
            NewBudgetItem {
                name: name.into(),
                group_id: None,
                category_id: None,
                ceiling,
                start_month: Month::new(2026, 1).unwrap(),
            },
        )
        .unwrap()
        .id
}

fn charge(item: BudgetItemId, amount: Decimal, description: &str) -> NewCharge {
    NewCharge {
        competence: march(),
        item_id: Some(item),
        amount,
        purchase_date: date(2026, 2, 20),
        description: description.into(),
        installment: None,
    }
}

// === Invoices ===

#[test]
fn planned_versus_executed_and_payment() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(1500));
    let home = item(&planner, &card, "Home", dec!(1300));
    for (item, amount) in [
        (food, dec!(450)),
        (food, dec!(120)),
        (home, dec!(65)),
        (home, dec!(200)),
        (food, dec!(80)),
    ] {
        planner.add_charge(card.id, charge(item, amount, "purchase")).unwrap();
    }

    let invoice = planner.invoice(card.id, march()).unwrap();
    let state = invoice.invoice().unwrap();
    assert_eq!(invoice.value, dec!(2800));
    assert_eq!(state.planned, dec!(2800));
    assert_eq!(state.executed, dec!(915));
    assert!(!state.estouro);
    assert_eq!(invoice.due_date, date(2026, 3, 10));

    let account = planner
        .open_account(NewBankAccount {
            name: "Checking".into(),
            initial_balance: dec!(3000),
        })
        .unwrap();
    let outcome = planner
        .pay_bill(
            invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 10),
                amount: None,
                bank_account: Some(account.id),
            },
        )
        .unwrap();
    assert_eq!(outcome.bill.value, dec!(915));
    let summary = outcome.invoice.unwrap();
    assert_eq!(summary.planned, dec!(2800));
    assert_eq!(summary.executed, dec!(915));
    assert!(!summary.estouro);
    assert_eq!(planner.account(account.id).unwrap().current_balance, dec!(2085));

    let err = planner
        .add_charge(card.id, charge(food, dec!(10), "late"))
        .unwrap_err();
    assert!(matches!(err, EngineError::HistoryImmutable(_)));
    assert_eq!(err.status_code(), 403);

    let err = planner
        .pay_bill(
            invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 11),
                amount: None,
                bank_account: Some(account.id),
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::HistoryConflict(_)));
    assert_eq!(planner.account(account.id).unwrap().current_balance, dec!(2085));
}

#[test]
fn explicit_amount_overrides_executed() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(500));
    let receipt = planner.add_charge(card.id, charge(food, dec!(120), "market")).unwrap();
    let outcome = planner
        .pay_bill(
            receipt.invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 9),
                amount: Some(dec!(118.40)),
                bank_account: None,
            },
        )
        .unwrap();
    assert_eq!(outcome.bill.value, dec!(118.40));
    assert_eq!(outcome.bill.amount_paid, Some(dec!(118.40)));
}

#[test]
fn empty_invoice_paid_from_account_posts_nothing() {
    let planner = Planner::default();
    let card = card(&planner);
    let invoice = planner.invoice(card.id, march()).unwrap();
    let account = planner
        .open_account(NewBankAccount {
            name: "Checking".into(),
            initial_balance: dec!(100),
        })
        .unwrap();

    let outcome = planner
        .pay_bill(
            invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 10),
                amount: None,
                bank_account: Some(account.id),
            },
        )
        .unwrap();
    assert!(outcome.bill.is_paid());
    assert_eq!(outcome.bill.value, Decimal::ZERO);
    assert_eq!(planner.account(account.id).unwrap().current_balance, dec!(100));
}

#[test]
fn overrun_sets_estouro() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(100));
    let receipt = planner.add_charge(card.id, charge(food, dec!(140), "market")).unwrap();
    let state = receipt.invoice.invoice().unwrap();
    assert!(state.estouro);
    assert_eq!(receipt.invoice.value, dec!(100));
}

#[test]
fn refunds_reduce_executed() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(500));
    planner.add_charge(card.id, charge(food, dec!(300), "tv")).unwrap();
    let receipt = planner
        .add_charge(card.id, charge(food, dec!(-120), "refund"))
        .unwrap();
    assert_eq!(receipt.invoice.invoice().unwrap().executed, dec!(180));

    let err = planner
        .add_charge(card.id, charge(food, Decimal::ZERO, "nothing"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn item_of_another_card_is_rejected() {
    let planner = Planner::default();
    let gold = card(&planner);
    let other = card(&planner);
    let food = item(&planner, &other, "Food", dec!(500));
    let err = planner
        .add_charge(gold.id, charge(food, dec!(10), "coffee"))
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn one_invoice_per_card_and_competence() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(500));
    let first = planner.add_charge(card.id, charge(food, dec!(10), "a")).unwrap();
    let second = planner.add_charge(card.id, charge(food, dec!(20), "b")).unwrap();
    assert_eq!(first.invoice.id, second.invoice.id);
    assert_eq!(planner.invoice(card.id, march()).unwrap().id, first.invoice.id);

    assert_eq!(planner.monthly_job(march()).unwrap(), 0);
    assert_eq!(planner.monthly_job(Month::new(2026, 4).unwrap()).unwrap(), 1);
    assert_eq!(planner.monthly_job(Month::new(2026, 4).unwrap()).unwrap(), 0);
}

#[test]
fn ceiling_change_refreshes_pending_invoices_only() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(800));
    let march_invoice = planner.invoice(card.id, march()).unwrap();
    let april = Month::new(2026, 4).unwrap();
    let april_invoice = planner.invoice(card.id, april).unwrap();
    planner
        .pay_bill(
            march_invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 10),
                amount: None,
                bank_account: None,
            },
        )
        .unwrap();

    planner
        .set_budget_ceiling(
            food,
            NewBudgetCeiling {
                start_month: march(),
                ceiling: dec!(950),
            },
        )
        .unwrap();
    assert_eq!(planner.bill(april_invoice.id).unwrap().value, dec!(950));
    let paid = planner.bill(march_invoice.id).unwrap();
    assert_eq!(paid.invoice().unwrap().planned, dec!(800));
}

// === Budget alerts ===

#[test]
fn item_alert_levels() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(1500));
    let receipt = planner
        .add_charge(card.id, charge(food, dec!(2000), "party"))
        .unwrap();

    assert_eq!(receipt.alerts.len(), 1);
    let alert = &receipt.alerts[0];
    assert!(matches!(&alert.scope, AlertScope::Item { item_id, .. } if *item_id == food));
    assert_eq!(alert.level, AlertLevel::Moderate);
    assert_eq!(alert.orcado, dec!(1500));
    assert_eq!(alert.gasto, dec!(2000));
    assert_eq!(alert.excedente, dec!(500));
    assert_eq!(alert.percentual, dec!(133.33));

    planner.add_charge(card.id, charge(food, dec!(1000), "more")).unwrap();
    let alerts = planner.budget_alerts(card.id, march()).unwrap();
    assert_eq!(alerts[0].level, AlertLevel::Critical);
}

#[test]
fn group_alert_spans_cards() {
    let planner = Planner::default();
    let group = planner.add_budget_group("Leisure").unwrap();
    let gold = card(&planner);
    let black = card(&planner);
    let mut items = Vec::new();
    for card in [&gold, &black] {
        let id = planner
            .add_budget_item(
                card.id,
                NewBudgetItem {
                    name: "Restaurants".into(),
                    group_id: Some(group.id),
                    category_id: None,
                    ceiling: dec!(500),
                    start_month: march(),
                },
            )
            .unwrap()
            .id;
        items.push(id);
    }
    planner.add_charge(gold.id, charge(items[0], dec!(400), "dinner")).unwrap();
    let receipt = planner
        .add_charge(black.id, charge(items[1], dec!(800), "wedding"))
        .unwrap();

    let group_alert = receipt
        .alerts
        .iter()
        .find(|a| matches!(a.scope, AlertScope::Group { .. }))
        .unwrap();
    assert_eq!(group_alert.orcado, dec!(1000));
    assert_eq!(group_alert.gasto, dec!(1200));
    assert_eq!(group_alert.level, AlertLevel::Moderate);
}

#[test]
fn no_alert_below_ceiling() {
    let planner = Planner::default();
    let card = card(&planner);
    let food = item(&planner, &card, "Food", dec!(1500));
    let receipt = planner.add_charge(card.id, charge(food, dec!(1499.99), "x")).unwrap();
    assert!(receipt.alerts.is_empty());
}

// === Statement import ===

const STATEMENT: &str = "date,description,amount\n\
2026-02-14,NETFLIX,55.90\n\
2025-12-20,NOTEBOOK 03/05,350.00\n\
20/02/2026,MARKET,\"1.234,56\"\n\
garbage,BROKEN,1.00\n";

fn upload(card: &Card, base: Month, csv: &str) -> UploadInput {
    UploadInput {
        card_id: card.id,
        base_competence: base,
        item_id: None,
        csv: csv.into(),
    }
}

#[test]
fn import_is_idempotent() {
    let planner = Planner::default();
    let card = card(&planner);

    let preview = planner.import_upload(upload(&card, march(), STATEMENT)).unwrap();
    assert_eq!(preview.rows_in_file, 3);
    assert_eq!(preview.skipped.len(), 1);
    assert_eq!(preview.rows.len(), 5);
    assert!(preview.rows.iter().all(|r| !r.duplicate));

    let report = planner.import_commit(preview).unwrap();
    assert_eq!(report.inserted_count, 3);
    assert_eq!(report.duplicate_count, 0);
    assert_eq!(report.charges_inserted, 5);
    assert_eq!(report.invoices.len(), 3);
    let executed = planner.invoice(card.id, march()).unwrap().invoice().unwrap().executed;
    assert_eq!(executed, dec!(55.90) + dec!(350) + dec!(1234.56));

    let replay = planner.import_upload(upload(&card, march(), STATEMENT)).unwrap();
    assert!(replay.rows.iter().all(|r| r.duplicate));
    let report = planner.import_commit(replay).unwrap();
    assert_eq!(report.inserted_count, 0);
    assert_eq!(report.duplicate_count, 3);
    assert_eq!(report.charges_inserted, 0);
    assert_eq!(
        planner.invoice(card.id, march()).unwrap().invoice().unwrap().executed,
        executed
    );
}

#[test]
fn next_statement_recognizes_known_installments() {
    let planner = Planner::default();
    let card = card(&planner);
    let first = "date,description,amount\n2025-12-20,NOTEBOOK 03/05,350.00\n";
    let preview = planner.import_upload(upload(&card, march(), first)).unwrap();
    planner.import_commit(preview).unwrap();

    let april = Month::new(2026, 4).unwrap();
    let second = "date,description,amount\n2025-12-20,NOTEBOOK 04/05,350.00\n";
    let preview = planner.import_upload(upload(&card, april, second)).unwrap();
    assert_eq!(preview.rows.len(), 2);
    assert_eq!(preview.rows[0].installment, Some(Installment { number: 4, of: 5 }));
    assert!(preview.rows.iter().all(|r| r.duplicate));

    let report = planner.import_commit(preview).unwrap();
    assert_eq!(report.duplicate_count, 1);
    let may = Month::new(2026, 5).unwrap();
    assert_eq!(
        planner.invoice(card.id, may).unwrap().invoice().unwrap().executed,
        dec!(350)
    );
}

#[test]
fn import_onto_paid_invoice_aborts_batch() {
    let planner = Planner::default();
    let card = card(&planner);
    let april = Month::new(2026, 4).unwrap();
    let invoice = planner.invoice(card.id, april).unwrap();
    planner
        .pay_bill(
            invoice.id,
            PaymentInput {
                pay_date: date(2026, 4, 10),
                amount: Some(Decimal::ZERO),
                bank_account: None,
            },
        )
        .unwrap();

    let csv = "date,description,amount\n2026-02-14,NETFLIX,55.90\n2026-02-01,TV 1/2,900.00\n";
    let preview = planner.import_upload(upload(&card, march(), csv)).unwrap();
    let err = planner.import_commit(preview).unwrap_err();
    assert!(matches!(err, EngineError::HistoryImmutable(_)));

    // Nothing from the batch survived.
    let march_invoice = planner.invoice(card.id, march()).unwrap();
    assert_eq!(march_invoice.invoice().unwrap().executed, Decimal::ZERO);
}

#[test]
fn replay_after_payment_reports_duplicates() {
    let planner = Planner::default();
    let card = card(&planner);
    let csv = "date,description,amount\n2026-02-14,NETFLIX,55.90\n";

    let preview = planner.import_upload(upload(&card, march(), csv)).unwrap();
    let report = planner.import_commit(preview).unwrap();
    assert_eq!(report.inserted_count, 1);

    let invoice = planner.invoice(card.id, march()).unwrap();
    planner
        .pay_bill(
            invoice.id,
            PaymentInput {
                pay_date: date(2026, 3, 10),
                amount: None,
                bank_account: None,
            },
        )
        .unwrap();

    let preview = planner.import_upload(upload(&card, march(), csv)).unwrap();
    assert!(preview.rows.iter().all(|r| r.duplicate));
    let report = planner.import_commit(preview).unwrap();
    assert_eq!(report.inserted_count, 0);
    assert_eq!(report.duplicate_count, report.rows_in_file);
    assert!(report.invoices.is_empty());

    let paid = planner.invoice(card.id, march()).unwrap();
    assert_eq!(paid.value, dec!(55.90));
}
