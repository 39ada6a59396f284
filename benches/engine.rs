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

//! Benchmarks for the planner engines.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Schedule generation for every amortization system
//! - Tail regeneration after an extraordinary amortization
//! - Card charge ingestion and statement import
//! - Concurrent planner operations

use cashflow_engine_rs::card::UploadInput;
use cashflow_engine_rs::{
    AmortizationEngine, AmortizationInput, AmortizationRegime, AmortizationSystem, BudgetItemId,
    CardId, IndexRegistry, Month, NewBudgetItem, NewCard, NewCharge, NewFinancing, NoticeQueue,
    PaymentInput, Planner,
};
use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(y: i32, m: u32) -> Month {
    Month::new(y, m).unwrap()
}

fn contract(system: AmortizationSystem, term_months: u32) -> NewFinancing {
    NewFinancing {
        description: "Apartment".into(),
        category_id: None,
        system,
        principal: dec!(450000),
        term_months,
        nominal_annual_rate: dec!(0.1049),
        index_name: Some("TR".into()),
        contract_date: date(2025, 12, 1),
        first_parcel_date: date(2026, 1, 15),
        fixed_admin_fee: dec!(25),
        insurance_vigencies: vec![],
    }
}

fn card_planner() -> (Planner, CardId, BudgetItemId) {
    let planner = Planner::default();
    let card = planner
        .create_card(NewCard {
            name: "Gold".into(),
            closing_day: 3,
            due_day: 10,
        })
        .unwrap();
    let item = planner
        .add_budget_item(
            card.id,
            NewBudgetItem {
                name: "Food".into(),
                group_id: None,
                category_id: None,
                ceiling: dec!(2000),
                start_month: month(2026, 1),
            },
        )
        .unwrap();
    (planner, card.id, item.id)
}

fn charge(item: BudgetItemId, competence: Month, i: usize) -> NewCharge {
    NewCharge {
        competence,
        item_id: Some(item),
        amount: Decimal::new(1000 + i as i64, 2),
        purchase_date: date(2026, 2, 1),
        description: format!("purchase #{i}"),
        installment: None,
    }
}

fn statement(rows: usize) -> String {
    let mut csv = String::from("date,description,amount\n");
    for i in 0..rows {
        let day = 1 + i % 28;
        let _ = writeln!(csv, "2026-02-{day:02},STORE {i},{}.{:02}", 10 + i, i % 100);
    }
    csv
}

// =============================================================================
// Schedule Benchmarks
// =============================================================================

fn bench_schedule_preview(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_preview");
    let indices = IndexRegistry::new();
    let notices = NoticeQueue::new();
    for m in 1..=12 {
        indices.publish("TR", month(2026, m), dec!(0.0008)).unwrap();
    }
    let engine = AmortizationEngine::new(&indices, &notices);

    for system in [AmortizationSystem::Sac, AmortizationSystem::Price, AmortizationSystem::Straight] {
        for term in [60u32, 360] {
            let input = contract(system, term);
            group.throughput(Throughput::Elements(term as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{system:?}"), term),
                &input,
                |b, input| b.iter(|| black_box(engine.preview(black_box(input)).unwrap())),
            );
        }
    }
    group.finish();
}

fn bench_create_financing(c: &mut Criterion) {
    c.bench_function("create_financing_360", |b| {
        b.iter(|| {
            let planner = Planner::default();
            black_box(planner.create_financing(contract(AmortizationSystem::Sac, 360)).unwrap());
        })
    });
}

fn bench_amortize_regenerates_tail(c: &mut Criterion) {
    let mut group = c.benchmark_group("amortize");

    for regime in [AmortizationRegime::ReduceParcel, AmortizationRegime::ReduceTerm] {
        group.bench_function(format!("{regime:?}"), |b| {
            b.iter_batched(
                || {
                    // Setup: financing with the first parcels consolidated
                    let planner = Planner::default();
                    let view = planner.create_financing(contract(AmortizationSystem::Sac, 360)).unwrap();
                    for number in 1..=3 {
                        let parcel = view.parcel(number).unwrap();
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
                    (planner, view.financing.id)
                },
                |(planner, id)| {
                    let input = AmortizationInput {
                        date: date(2026, 3, 20),
                        amount: dec!(50000),
                        regime,
                    };
                    black_box(planner.amortize(id, black_box(input)).unwrap());
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// =============================================================================
// Card Benchmarks
// =============================================================================

fn bench_charge_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("charge_throughput");

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (planner, card, item) = card_planner();
                for i in 0..count {
                    planner.add_charge(card, charge(item, month(2026, 3), i)).unwrap();
                }
                black_box(&planner);
            })
        });
    }
    group.finish();
}

fn bench_statement_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("statement_import");

    for rows in [50usize, 500].iter() {
        let csv = statement(*rows);
        group.throughput(Throughput::Elements(*rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &csv, |b, csv| {
            b.iter(|| {
                let (planner, card, item) = card_planner();
                let preview = planner
                    .import_upload(UploadInput {
                        card_id: card,
                        base_competence: month(2026, 3),
                        item_id: Some(item),
                        csv: csv.clone(),
                    })
                    .unwrap();
                black_box(planner.import_commit(preview).unwrap());
            })
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_charges_same_invoice(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_charges_same_invoice");

    for count in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (planner, card, item) = card_planner();
                let planner = Arc::new(planner);
                (0..count).into_par_iter().for_each(|i| {
                    planner.add_charge(card, charge(item, month(2026, 3), i)).unwrap();
                });
                black_box(&planner);
            })
        });
    }
    group.finish();
}

fn bench_parallel_mixed_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_mixed_operations");
    let count = 400usize;
    group.throughput(Throughput::Elements(count as u64));

    group.bench_function("charges_listings_indices", |b| {
        b.iter(|| {
            let (planner, card, item) = card_planner();
            planner.create_financing(contract(AmortizationSystem::Price, 120)).unwrap();
            let planner = Arc::new(planner);

            (0..count).into_par_iter().for_each(|i| match i % 4 {
                0 => {
                    let competence = month(2026, 1 + (i % 12) as u32);
                    planner.add_charge(card, charge(item, competence, i)).unwrap();
                }
                1 => {
                    black_box(planner.list_month(month(2026, 1 + (i % 12) as u32)));
                }
                2 => {
                    let _ = planner.publish_index("IPCA", month(2026, 1 + (i % 12) as u32), dec!(0.004));
                }
                _ => {
                    black_box(planner.drain_notices());
                }
            });
            black_box(&planner);
        })
    });
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_ops = 2_000usize;

    for num_threads in [1, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_ops as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();

                b.iter(|| {
                    let (planner, card, item) = card_planner();
                    let planner = Arc::new(planner);
                    pool.install(|| {
                        (0..total_ops).into_par_iter().for_each(|i| {
                            // One competence per thread bucket keeps invoices apart
                            let competence = month(2026, 1 + (i % num_threads) as u32);
                            planner.add_charge(card, charge(item, competence, i)).unwrap();
                        });
                    });
                    black_box(&planner);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    schedules,
    bench_schedule_preview,
    bench_create_financing,
    bench_amortize_regenerates_tail,
);

criterion_group!(cards, bench_charge_throughput, bench_statement_import,);

criterion_group!(
    multi_threaded,
    bench_parallel_charges_same_invoice,
    bench_parallel_mixed_operations,
    bench_thread_scaling,
);

criterion_main!(schedules, cards, multi_threaded);
