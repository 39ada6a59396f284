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

//! # Cash-flow Engine
//!
//! This library provides the schedule engines behind a personal cash-flow
//! planner: real-estate financing amortization, virtual credit card
//! invoices, recurring expenses and projected expenses.
//!
//! ## Core Components
//!
//! - [`Planner`]: Facade running every operation as one store transaction
//! - [`AmortizationEngine`]: Parcel schedules, extraordinary amortizations and the insurance timeline
//! - [`CardInvoiceEngine`]: One planned-vs-executed invoice per card and competence
//! - [`RecurrenceMaterializer`]: Lazy bills and invoice stubs up to the viewed month
//! - [`ProjectionEngine`]: Predicted expenses of vehicles, transport paths and simulations
//! - [`Reconciler`]: Bill payment propagated back into the engines
//! - [`EngineError`]: Typed failures with their HTTP status codes
//!
//! ## Example
//!
//! ```
//! use cashflow_engine_rs::{AmortizationSystem, NewFinancing, Planner};
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let planner = Planner::default();
//! let view = planner
//!     .create_financing(NewFinancing {
//!         description: "Apartment".into(),
//!         category_id: None,
//!         system: AmortizationSystem::Sac,
//!         principal: dec!(100000),
//!         term_months: 10,
//!         nominal_annual_rate: dec!(0.12),
//!         index_name: None,
//!         contract_date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
//!         first_parcel_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
//!         fixed_admin_fee: dec!(0),
//!         insurance_vigencies: vec![],
//!     })
//!     .unwrap();
//!
//! let first = view.parcel(1).unwrap();
//! assert_eq!(first.amortization, dec!(10000));
//! assert_eq!(first.interest, dec!(948.88));
//! ```
//!
//! ## Thread Safety
//!
//! The store serializes transactions behind a single lock; the index
//! registry and the notice queue accept concurrent readers and producers.

pub mod account;
mod base;
pub mod bill;
pub mod card;
pub mod config;
pub mod consortium;
pub mod error;
pub mod financing;
mod index;
mod notice_queue;
mod planner;
pub mod projection;
pub mod recurrence;
pub mod reconcile;
mod store;

pub use account::{BankAccount, Ledger, Movement, MovementKind, NewBankAccount};
pub use base::{
    AccountId, AmortizationId, BillId, BudgetItemId, BudgetVigencyId, CardId, CategoryId,
    ChargeId, ConsortiumId, FinancingId, GroupId, MONEY_SCALE, Money, Month, MovementId, ParcelId,
    Percent, PredictionId, RATE_SCALE, RecurringId, TransportPathId, VehicleFinancingId,
    VehicleId, VigencyId, round_money,
};
pub use bill::{Bill, BillOrigin, BillStatus, CardInvoice, MonthView, NewBill, PaymentInput};
pub use card::{CardInvoiceEngine, NewBudgetItem, NewCard, NewCharge};
pub use config::{ConfigError, Preferences};
pub use error::{EngineError, ErrorKind};
pub use financing::{
    AmortizationEngine, AmortizationInput, AmortizationRegime, AmortizationSystem,
    FinancingUpdate, FinancingView, NewFinancing, NewVigency, VigencyUpdate,
};
pub use index::IndexRegistry;
pub use notice_queue::{Notice, NoticeQueue};
pub use planner::Planner;
pub use projection::{PostponeInput, ProjectionEngine};
pub use recurrence::RecurrenceMaterializer;
pub use reconcile::{PaymentOutcome, Reconciler};
pub use store::{Store, Tables};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the `tracing` subscriber once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `info` for this crate.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cashflow_engine_rs=info"));
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    });
}
