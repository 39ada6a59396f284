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

//! Real-estate financings: contracts, schedules and the insurance timeline.

mod engine;
mod insurance;
mod model;
pub mod schedule;

pub use engine::{AmortizationEngine, view};
pub use insurance::{InsuranceTimeline, NewVigency, Vigency, VigencyUpdate};
pub use model::{
    AmortizationInput, AmortizationRegime, AmortizationSystem, ExtraordinaryAmortization,
    Financing, FinancingState, FinancingUpdate, FinancingView, NewFinancing, Parcel, ParcelStatus,
};
pub use schedule::ParcelDraft;
