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

//! Credit cards: budgets, virtual invoices and statement import.

pub mod budget;
pub mod import;
mod invoice;
mod model;

pub use budget::{AlertLevel, AlertScope, BudgetAlert};
pub use import::{ImportPreview, ImportReport, PreviewRow, UploadInput};
pub use invoice::{CardInvoiceEngine, ChargeReceipt};
pub use model::{
    BudgetGroup, BudgetItem, BudgetVigency, Card, Charge, Installment, NewBudgetCeiling,
    NewBudgetItem, NewCard, NewCharge,
};
