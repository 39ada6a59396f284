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

//! Integration tests for the insurance vigency timeline.

use cashflow_engine_rs::{
    AmortizationSystem, EngineError, FinancingView, Month, NewFinancing, NewVigency, PaymentInput,
    Planner, VigencyUpdate,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(y: i32, m: u32) -> Month {
    Month::new(y, m).unwrap()
}

fn contract(vigencies: Vec<NewVigency>) -> NewFinancing {
    NewFinancing {
        description: "House".into(),
        category_id: None,
        system: AmortizationSystem::Sac,
        principal: dec!(100000),
        term_months: 10,
        nominal_annual_rate: dec!(0.12),
        index_name: None,
        contract_date: date(2025, 12, 1),
        first_parcel_date: date(2026, 1, 15),
        fixed_admin_fee: dec!(25),
        insurance_vigencies: vigencies,
    }
}

fn vigency(start: Month, value: Decimal) -> NewVigency {
    NewVigency {
        start_month: start,
        monthly_value: value,
        notes: None,
    }
}

fn pay_first(planner: &Planner, view: &FinancingView) {
    let parcel = view.parcel(1).unwrap();
    planner
        .pay_bill(
            parcel.bill_id.unwrap(),
            PaymentInput {
                pay_date: parcel.due_date,
                amount: None,
                bank_account: None,
            },
        )
        .unwrap();
}

#[test]
fn financing_without_vigencies_carries_no_insurance() {
    let planner = Planner::default();
    let view = planner.create_financing(contract(vec![])).unwrap();
    assert!(view.parcels.iter().all(|p| p.insurance == Decimal::ZERO));
}

#[test]
fn vigencies_split_the_schedule() {
    let planner = Planner::default();
    let view = planner
        .create_financing(contract(vec![
            vigency(month(2025, 1), dec!(200)),
            vigency(month(2026, 2), dec!(250)),
        ]))
        .unwrap();
    assert_eq!(view.parcel(1).unwrap().insurance, dec!(200));
    for parcel in &view.parcels[1..] {
        assert_eq!(parcel.insurance, dec!(250));
    }
}

#[test]
fn vigency_update_touches_only_insurance() {
    let planner = Planner::default();
    let created = planner.create_financing(contract(vec![])).unwrap();
    let id = created.financing.id;
    planner.add_vigency(id, vigency(month(2025, 1), dec!(200))).unwrap();
    let v2 = planner.add_vigency(id, vigency(month(2026, 2), dec!(250))).unwrap();
    let before = planner.financing(id).unwrap();

    planner
        .update_vigency(
            v2.id,
            VigencyUpdate {
                monthly_value: Some(dec!(260)),
                notes: Some("renewed".into()),
            },
        )
        .unwrap();
    let after = planner.financing(id).unwrap();

    assert_eq!(after.parcel(1).unwrap(), before.parcel(1).unwrap());
    for (old, new) in before.parcels[1..].iter().zip(&after.parcels[1..]) {
        assert_eq!(new.insurance, dec!(260));
        assert_eq!(new.total_planned, old.total_planned + dec!(10));
        assert_eq!(new.amortization, old.amortization);
        assert_eq!(new.interest, old.interest);
        assert_eq!(new.outstanding_before, old.outstanding_before);
        assert_eq!(new.outstanding_after, old.outstanding_after);
        let bill = planner.bill(new.bill_id.unwrap()).unwrap();
        assert_eq!(bill.value, new.total_planned);
    }
    assert_eq!(after.financing, before.financing);
}

#[test]
fn uncovered_due_date_is_a_gap() {
    let planner = Planner::default();
    let err = planner
        .create_financing(contract(vec![vigency(month(2026, 3), dec!(200))]))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsuranceGap { date, .. } if date == NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    ));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn vigencies_are_never_deleted() {
    let planner = Planner::default();
    let view = planner.create_financing(contract(vec![])).unwrap();
    let v1 = planner
        .add_vigency(view.financing.id, vigency(month(2025, 1), dec!(200)))
        .unwrap();

    let err = planner.delete_vigency(v1.id).unwrap_err();
    assert!(matches!(err, EngineError::HistoryImmutable(_)));
    assert_eq!(err.status_code(), 403);

    let err = planner
        .delete_vigency(cashflow_engine_rs::VigencyId(999_999))
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn vigency_over_paid_parcel_is_frozen() {
    let planner = Planner::default();
    let view = planner.create_financing(contract(vec![])).unwrap();
    let id = view.financing.id;
    let v1 = planner.add_vigency(id, vigency(month(2025, 1), dec!(200))).unwrap();
    let view = planner.financing(id).unwrap();
    pay_first(&planner, &view);

    let err = planner
        .update_vigency(
            v1.id,
            VigencyUpdate {
                monthly_value: Some(dec!(210)),
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::HistoryConflict(_)));

    // A vigency starting at or before a paid parcel would rewrite it.
    let err = planner
        .add_vigency(id, vigency(month(2026, 1), dec!(300)))
        .unwrap_err();
    assert!(matches!(err, EngineError::HistoryConflict(_)));

    // Starting after the paid tail is fine and leaves it untouched.
    planner.add_vigency(id, vigency(month(2026, 4), dec!(300))).unwrap();
    let after = planner.financing(id).unwrap();
    assert_eq!(after.parcel(1).unwrap().insurance, dec!(200));
    assert_eq!(after.parcel(3).unwrap().insurance, dec!(200));
    assert_eq!(after.parcel(4).unwrap().insurance, dec!(300));
}

#[test]
fn vigency_of_inactive_financing_is_frozen() {
    let planner = Planner::default();
    let created = planner.create_financing(contract(vec![])).unwrap();
    let id = created.financing.id;
    let v1 = planner.add_vigency(id, vigency(month(2025, 1), dec!(200))).unwrap();
    planner.deactivate_financing(id).unwrap();

    let err = planner
        .update_vigency(
            v1.id,
            VigencyUpdate {
                monthly_value: Some(dec!(210)),
                notes: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::HistoryImmutable(_)));
    assert_eq!(err.status_code(), 403);
}
