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

//! Amortization engine.
//!
//! The [`AmortizationEngine`] derives a financing's parcels from its contract
//! and sovereign state, and re-derives the pending tail whenever that state
//! changes.
//!
//! # Operations
//!
//! - **Create**: validate the contract, insert its insurance vigencies and
//!   generate the full schedule with one pending bill per parcel.
//! - **Amortize**: lower the outstanding balance, adjust amortization or term
//!   per regime, log the event and regenerate the tail.
//! - **Update**: apply descriptive changes, new vigencies and, guarded by the
//!   history check, structural changes (rate, admin fee, term).
//! - **Pay parcel**: consolidate the next pending parcel into the sovereign
//!   state. Only the reconciler calls this.
//! - **Deactivate**: soft-delete the pending tail.
//!
//! # Invariants
//!
//! - Paid parcels are never rewritten or removed.
//! - The tail always chains from `current_outstanding`.
//! - Parcels `base + 1 ..= base + term_remaining` exist and are pending.

use super::insurance::{InsuranceTimeline, NewVigency};
use super::model::{
    AmortizationInput, AmortizationRegime, AmortizationSystem, ExtraordinaryAmortization,
    Financing, FinancingState, FinancingUpdate, FinancingView, NewFinancing, Parcel, ParcelStatus,
};
use super::schedule::{self, ChainStart, ParcelDraft, ScheduleTerms};
use crate::base::{
    AmortizationId, BillId, FinancingId, Money, Month, ParcelId, Percent, VigencyId, round_money,
};
use crate::bill::{Bill, BillOrigin};
use crate::error::EngineError;
use crate::index::IndexRegistry;
use crate::notice_queue::{Notice, NoticeQueue};
use crate::store::Tables;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Schedule generator bound to the shared index registry and notice queue.
#[derive(Debug, Clone, Copy)]
pub struct AmortizationEngine<'a> {
    indices: &'a IndexRegistry,
    notices: &'a NoticeQueue,
}

impl<'a> AmortizationEngine<'a> {
    pub fn new(indices: &'a IndexRegistry, notices: &'a NoticeQueue) -> Self {
        Self { indices, notices }
    }

    /// Creates a financing contract and its initial schedule.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for an inconsistent contract
    /// - [`EngineError::InsuranceGap`] when the given vigencies leave a due date uncovered
    pub fn create(
        &self,
        tables: &mut Tables,
        input: NewFinancing,
    ) -> Result<FinancingView, EngineError> {
        validate_contract(&input)?;

        let id = FinancingId(tables.next_id());
        let monthly_rate = schedule::monthly_rate(input.nominal_annual_rate);
        let monthly_amortization = match input.system {
            AmortizationSystem::Price => Decimal::ZERO,
            _ => round_money(input.principal / Decimal::from(input.term_months)),
        };
        let financing = Financing {
            id,
            description: input.description.trim().to_string(),
            category_id: input.category_id,
            system: input.system,
            principal: input.principal,
            term_total_months: input.term_months,
            term_remaining_months: input.term_months,
            nominal_annual_rate: input.nominal_annual_rate,
            monthly_rate,
            index_name: normalize_index(input.index_name),
            contract_date: input.contract_date,
            first_parcel_date: input.first_parcel_date,
            fixed_admin_fee: input.fixed_admin_fee,
            state: FinancingState::Active,
            current_outstanding: input.principal,
            base_parcel_number: 0,
            base_date: Month::of(input.contract_date),
            current_monthly_amortization: monthly_amortization,
            post_amortization_regime: None,
            kept_installment: None,
        };
        tables.financings.insert(id, financing);

        for vigency in input.insurance_vigencies {
            InsuranceTimeline::insert(tables, id, vigency)?;
        }
        let generated = self.regenerate_tail(tables, id)?;
        info!(financing = %id, parcels = generated, system = ?input.system, "financing created");
        view(tables, id)
    }

    /// Computes the schedule a contract would produce, without persisting it.
    pub fn preview(&self, input: &NewFinancing) -> Result<Vec<ParcelDraft>, EngineError> {
        validate_contract(input)?;
        let monthly_rate = schedule::monthly_rate(input.nominal_annual_rate);
        let terms = ScheduleTerms {
            system: input.system,
            monthly_rate,
            monthly_amortization: round_money(input.principal / Decimal::from(input.term_months)),
            straight_interest: round_money(input.principal * monthly_rate),
            installment: None,
            admin_fee: input.fixed_admin_fee,
            first_parcel_date: input.first_parcel_date,
        };
        let vigencies = input
            .insurance_vigencies
            .iter()
            .enumerate()
            .map(|(n, v)| super::insurance::Vigency {
                id: VigencyId(n as u64 + 1),
                financing_id: FinancingId(0),
                start_month: v.start_month,
                monthly_value: v.monthly_value,
                end_date: input
                    .insurance_vigencies
                    .iter()
                    .filter(|other| other.start_month > v.start_month)
                    .map(|other| other.start_month.day_before())
                    .min(),
                active: true,
                notes: None,
            });
        let timeline = InsuranceTimeline::new(FinancingId(0), vigencies);
        let index = normalize_index(input.index_name.clone());
        let start = ChainStart {
            first_number: 1,
            count: input.term_months,
            saldo: input.principal,
        };
        schedule::generate(
            start,
            &terms,
            |due| timeline.insurance_for(due),
            |due| {
                index
                    .as_deref()
                    .and_then(|name| self.indices.get(name, Month::of(due)))
                    .unwrap_or(Decimal::ZERO)
            },
        )
    }

    /// Applies an extraordinary amortization and regenerates the pending tail.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a non-positive amount or one above the outstanding
    /// - [`EngineError::HistoryImmutable`] on a settled or inactive financing
    pub fn amortize(
        &self,
        tables: &mut Tables,
        id: FinancingId,
        input: AmortizationInput,
    ) -> Result<Financing, EngineError> {
        let financing = active(tables, id)?.clone();
        if input.amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "amortization amount must be positive".into(),
            ));
        }
        if input.amount > financing.current_outstanding {
            return Err(EngineError::Validation(format!(
                "amortization {} exceeds outstanding {}",
                input.amount, financing.current_outstanding
            )));
        }
        if input.date < financing.contract_date {
            return Err(EngineError::Validation(
                "amortization predates the contract".into(),
            ));
        }

        let epsilon = tables.preferences().settlement_epsilon;
        let before = financing.current_outstanding;
        let after = round_money(before - input.amount);
        let mut term = financing.term_remaining_months;
        let mut monthly_amortization = financing.current_monthly_amortization;
        let mut kept_installment = None;

        if after > epsilon {
            if term == 0 {
                return Err(EngineError::InvariantViolation(format!(
                    "financing {id} has outstanding {before} but no remaining term"
                )));
            }
            match (financing.system, input.regime) {
                (AmortizationSystem::Price, AmortizationRegime::ReduceParcel) => {
                    // The installment is recomputed from the new saldo over the same term.
                }
                (AmortizationSystem::Price, AmortizationRegime::ReduceTerm) => {
                    let installment = tables
                        .parcel_by_number(id, financing.base_parcel_number + 1)
                        .filter(|p| !p.is_paid())
                        .map(|p| p.amortization + p.interest)
                        .unwrap_or_else(|| {
                            schedule::price_installment(before, financing.monthly_rate, term)
                        });
                    term = schedule::price_periods(after, financing.monthly_rate, installment)?
                        .clamp(1, term);
                    kept_installment = Some(installment);
                }
                (_, AmortizationRegime::ReduceParcel) => {
                    monthly_amortization = round_money(after / Decimal::from(term));
                }
                (_, AmortizationRegime::ReduceTerm) => {
                    term = schedule::ceil_periods(after, monthly_amortization)?.clamp(1, term);
                }
            }
        }

        let event = ExtraordinaryAmortization {
            id: AmortizationId(tables.next_id()),
            financing_id: id,
            date: input.date,
            amount: input.amount,
            regime: input.regime,
            after_parcel: financing.base_parcel_number,
            outstanding_before: before,
            outstanding_after: after,
            term_remaining_after: if after > epsilon { term } else { 0 },
        };
        tables.amortizations.insert(event.id, event);

        {
            let row = tables.financing_mut(id)?;
            row.current_outstanding = after;
            row.post_amortization_regime = Some(input.regime);
            row.term_remaining_months = term;
            row.current_monthly_amortization = monthly_amortization;
            row.kept_installment = kept_installment;
        }
        info!(
            financing = %id,
            amount = %input.amount,
            regime = ?input.regime,
            outstanding = %after,
            term,
            "extraordinary amortization applied"
        );

        if after <= epsilon {
            settle(tables, id)?;
        } else {
            self.regenerate_tail(tables, id)?;
        }
        Ok(tables.financing(id)?.clone())
    }

    /// Applies a contract update.
    ///
    /// Descriptive fields are always accepted. Structural fields (rate,
    /// admin fee, term) rebuild the whole schedule when the financing has no
    /// history, and are refused with [`EngineError::RecalcBlocked`] otherwise
    /// unless `force` is set, in which case only the pending tail is rebuilt.
    pub fn update(
        &self,
        tables: &mut Tables,
        id: FinancingId,
        input: FinancingUpdate,
    ) -> Result<FinancingView, EngineError> {
        active(tables, id)?;
        let structural = input.is_structural();
        let has_history = tables.parcels_of(id).iter().any(|p| p.is_paid())
            || !tables.amortizations_of(id).is_empty();
        if structural && has_history && !input.force {
            return Err(EngineError::RecalcBlocked { financing: id });
        }

        {
            let row = tables.financing_mut(id)?;
            if let Some(description) = input.description.as_deref() {
                if description.trim().is_empty() {
                    return Err(EngineError::Validation("description is required".into()));
                }
                row.description = description.trim().to_string();
            }
            if input.category_id.is_some() {
                row.category_id = input.category_id;
            }
        }

        for vigency in &input.insurance_vigencies {
            InsuranceTimeline::create(tables, id, vigency.clone())?;
        }

        if structural {
            self.apply_structural(tables, id, &input, has_history)?;
            self.regenerate_tail(tables, id)?;
            info!(financing = %id, forced = has_history, "structural recalculation");
        } else {
            sync_bill_descriptions(tables, id)?;
        }
        view(tables, id)
    }

    fn apply_structural(
        &self,
        tables: &mut Tables,
        id: FinancingId,
        input: &FinancingUpdate,
        has_history: bool,
    ) -> Result<(), EngineError> {
        if input.nominal_annual_rate.is_some_and(|r| r < Decimal::ZERO) {
            return Err(EngineError::Validation("rate must not be negative".into()));
        }
        if input.fixed_admin_fee.is_some_and(|f| f < Decimal::ZERO) {
            return Err(EngineError::Validation("admin fee must not be negative".into()));
        }
        if input.term_total_months == Some(0) {
            return Err(EngineError::Validation("term must be at least one month".into()));
        }

        let row = tables.financing_mut(id)?;
        row.kept_installment = None;
        if let Some(rate) = input.nominal_annual_rate {
            row.nominal_annual_rate = rate;
            row.monthly_rate = schedule::monthly_rate(rate);
        }
        if let Some(fee) = input.fixed_admin_fee {
            row.fixed_admin_fee = fee;
        }
        if has_history {
            if let Some(total) = input.term_total_months {
                if total <= row.base_parcel_number {
                    return Err(EngineError::Validation(format!(
                        "term {total} does not extend past paid parcel {}",
                        row.base_parcel_number
                    )));
                }
                row.term_total_months = total;
                row.term_remaining_months = total - row.base_parcel_number;
                if row.system != AmortizationSystem::Price {
                    row.current_monthly_amortization = round_money(
                        row.current_outstanding / Decimal::from(row.term_remaining_months),
                    );
                }
            }
        } else {
            let total = input.term_total_months.unwrap_or(row.term_total_months);
            row.term_total_months = total;
            row.term_remaining_months = total;
            row.current_outstanding = row.principal;
            row.current_monthly_amortization = match row.system {
                AmortizationSystem::Price => Decimal::ZERO,
                _ => round_money(row.principal / Decimal::from(total)),
            };
        }
        Ok(())
    }

    /// Regenerates parcels `base + 1 ..= base + term_remaining` from the
    /// sovereign state, upserting in place and dropping the surplus.
    ///
    /// Returns the number of parcels written.
    pub fn regenerate_tail(&self, tables: &mut Tables, id: FinancingId) -> Result<usize, EngineError> {
        let financing = tables.financing(id)?.clone();
        let base = financing.base_parcel_number;
        let saldo = chain_start(tables, &financing)?;

        let timeline = InsuranceTimeline::load(tables, id);
        let terms = terms_of(&financing);
        let start = ChainStart {
            first_number: base + 1,
            count: financing.term_remaining_months,
            saldo,
        };
        let drafts = schedule::generate(
            start,
            &terms,
            |due| timeline.insurance_for(due),
            |due| self.correction(&financing, due),
        )?;

        let last = base + financing.term_remaining_months;
        for draft in &drafts {
            upsert_parcel(tables, &financing, draft, last)?;
        }

        let surplus: Vec<ParcelId> = tables
            .parcels_of(id)
            .into_iter()
            .filter(|p| p.number > last)
            .map(|p| p.id)
            .collect();
        for parcel_id in &surplus {
            drop_pending_parcel(tables, *parcel_id)?;
        }

        debug_assert!(
            tables
                .parcels_of(id)
                .iter()
                .filter(|p| !p.is_paid())
                .all(|p| p.number > base && p.number <= last)
        );
        debug!(financing = %id, written = drafts.len(), dropped = surplus.len(), "tail regenerated");
        Ok(drafts.len())
    }

    /// Index correction rate for the month of `due`.
    ///
    /// A missing value is treated as zero correction and reported.
    fn correction(&self, financing: &Financing, due: NaiveDate) -> Percent {
        let Some(index) = financing.index_name.as_deref() else {
            return Decimal::ZERO;
        };
        let month = Month::of(due);
        match self.indices.get(index, month) {
            Some(value) => value,
            None => {
                warn!(financing = %financing.id, index, %month, "index value missing, using zero correction");
                self.notices.push(Notice::MissingIndex {
                    financing: financing.id,
                    index: index.to_string(),
                    month,
                });
                Decimal::ZERO
            }
        }
    }

    /// Consolidates the next pending parcel into the sovereign state.
    ///
    /// # Errors
    ///
    /// - [`EngineError::HistoryConflict`] when the parcel is paid or out of order
    /// - [`EngineError::InvariantViolation`] when the parcel does not chain from the outstanding
    pub(crate) fn pay_parcel(
        &self,
        tables: &mut Tables,
        parcel_id: ParcelId,
        pay_date: NaiveDate,
        amount: Money,
    ) -> Result<Parcel, EngineError> {
        let parcel = tables.parcel(parcel_id)?.clone();
        if parcel.is_paid() {
            return Err(EngineError::HistoryConflict(format!(
                "parcel {} is already paid",
                parcel.number
            )));
        }
        let financing = active(tables, parcel.financing_id)?.clone();
        if parcel.number != financing.base_parcel_number + 1 {
            return Err(EngineError::HistoryConflict(format!(
                "parcel {} paid before parcel {}",
                parcel.number,
                financing.base_parcel_number + 1
            )));
        }
        if parcel.outstanding_before != financing.current_outstanding {
            return Err(EngineError::InvariantViolation(format!(
                "parcel {} opens at {} but financing {} owes {}",
                parcel.number, parcel.outstanding_before, financing.id, financing.current_outstanding
            )));
        }

        let paid = {
            let row = tables.parcel_mut(parcel_id)?;
            row.status = ParcelStatus::Paid;
            row.amount_paid = Some(amount);
            row.paid_at = Some(pay_date);
            row.clone()
        };
        {
            let row = tables.financing_mut(financing.id)?;
            row.current_outstanding = paid.outstanding_after;
            row.base_parcel_number = paid.number;
            row.base_date = Month::of(paid.due_date);
            row.term_remaining_months = row.term_remaining_months.saturating_sub(1);
        }
        info!(
            financing = %financing.id,
            parcel = paid.number,
            outstanding = %paid.outstanding_after,
            "parcel consolidated"
        );

        if paid.outstanding_after <= tables.preferences().settlement_epsilon {
            settle(tables, financing.id)?;
        }
        Ok(paid)
    }

    /// Soft-deletes the pending tail and marks the financing inactive.
    pub fn deactivate(&self, tables: &mut Tables, id: FinancingId) -> Result<Financing, EngineError> {
        active(tables, id)?;
        let pending: Vec<ParcelId> = tables
            .parcels_of(id)
            .into_iter()
            .filter(|p| !p.is_paid())
            .map(|p| p.id)
            .collect();
        for parcel_id in &pending {
            drop_pending_parcel(tables, *parcel_id)?;
        }
        let row = tables.financing_mut(id)?;
        row.state = FinancingState::Inactive;
        info!(financing = %id, dropped = pending.len(), "financing deactivated");
        Ok(row.clone())
    }

    /// Adds an insurance vigency through the engine's guard.
    pub fn add_vigency(
        &self,
        tables: &mut Tables,
        id: FinancingId,
        input: NewVigency,
    ) -> Result<super::insurance::Vigency, EngineError> {
        InsuranceTimeline::create(tables, id, input)
    }
}

/// Financing with its parcels and amortization events.
pub fn view(tables: &Tables, id: FinancingId) -> Result<FinancingView, EngineError> {
    let financing = tables.financing(id)?.clone();
    let mut amortizations: Vec<ExtraordinaryAmortization> =
        tables.amortizations_of(id).into_iter().cloned().collect();
    amortizations.sort_by_key(|a| (a.date, a.id));
    Ok(FinancingView {
        financing,
        parcels: tables.parcels_of(id).into_iter().cloned().collect(),
        amortizations,
    })
}

fn active(tables: &Tables, id: FinancingId) -> Result<&Financing, EngineError> {
    let financing = tables.financing(id)?;
    if !financing.is_active() {
        return Err(EngineError::HistoryImmutable(format!(
            "financing {id} is {:?}",
            financing.state
        )));
    }
    Ok(financing)
}

fn validate_contract(input: &NewFinancing) -> Result<(), EngineError> {
    if input.description.trim().is_empty() {
        return Err(EngineError::Validation("description is required".into()));
    }
    if input.principal <= Decimal::ZERO {
        return Err(EngineError::Validation("principal must be positive".into()));
    }
    if input.term_months == 0 {
        return Err(EngineError::Validation("term must be at least one month".into()));
    }
    if input.nominal_annual_rate < Decimal::ZERO {
        return Err(EngineError::Validation("rate must not be negative".into()));
    }
    if input.fixed_admin_fee < Decimal::ZERO {
        return Err(EngineError::Validation("admin fee must not be negative".into()));
    }
    if input.first_parcel_date < input.contract_date {
        return Err(EngineError::Validation(
            "first parcel is due before the contract date".into(),
        ));
    }
    Ok(())
}

fn normalize_index(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_ascii_uppercase())
        .filter(|n| !n.is_empty())
}

fn terms_of(financing: &Financing) -> ScheduleTerms {
    ScheduleTerms {
        system: financing.system,
        monthly_rate: financing.monthly_rate,
        monthly_amortization: financing.current_monthly_amortization,
        straight_interest: round_money(financing.principal * financing.monthly_rate),
        installment: financing.kept_installment,
        admin_fee: financing.fixed_admin_fee,
        first_parcel_date: financing.first_parcel_date,
    }
}

/// Saldo the pending tail chains from.
///
/// The principal before any payment, otherwise the previous parcel's
/// `outstanding_after`; either way minus the extraordinary amortizations
/// logged after it. Must agree with the sovereign outstanding.
fn chain_start(tables: &Tables, financing: &Financing) -> Result<Money, EngineError> {
    let base = financing.base_parcel_number;
    let prior = if base == 0 {
        financing.principal
    } else {
        tables
            .parcel_by_number(financing.id, base)
            .map(|p| p.outstanding_after)
            .ok_or_else(|| {
                EngineError::InvariantViolation(format!(
                    "financing {} consolidated parcel {base} is missing",
                    financing.id
                ))
            })?
    };
    let extraordinary: Money = tables
        .amortizations_of(financing.id)
        .into_iter()
        .filter(|a| a.after_parcel == base)
        .map(|a| a.amount)
        .sum();
    let saldo = round_money(prior - extraordinary);
    if saldo != financing.current_outstanding {
        return Err(EngineError::InvariantViolation(format!(
            "financing {} chains from {saldo} but owes {}",
            financing.id, financing.current_outstanding
        )));
    }
    Ok(saldo)
}

fn upsert_parcel(
    tables: &mut Tables,
    financing: &Financing,
    draft: &ParcelDraft,
    last: u32,
) -> Result<(), EngineError> {
    let existing = tables
        .parcel_by_number(financing.id, draft.number)
        .map(|p| (p.id, p.bill_id, p.is_paid()));
    let (parcel_id, bill_id) = match existing {
        Some((_, _, true)) => {
            return Err(EngineError::InvariantViolation(format!(
                "regeneration reached paid parcel {}",
                draft.number
            )));
        }
        Some((id, bill, false)) => (id, bill),
        None => (ParcelId(tables.next_id()), None),
    };

    let description = bill_description(financing, draft.number, last);
    let bill_id = match bill_id {
        Some(bill_id) => {
            let bill = tables.bill_mut(bill_id)?;
            bill.description = description;
            bill.category_id = financing.category_id;
            bill.due_date = draft.due_date;
            bill.competence = Month::of(draft.due_date);
            bill.value = draft.total_planned;
            bill_id
        }
        None => {
            let bill = Bill::pending(
                BillId(tables.next_id()),
                description,
                financing.category_id,
                draft.due_date,
                draft.total_planned,
                BillOrigin::Parcel {
                    financing_id: financing.id,
                    parcel_id,
                },
            );
            let bill_id = bill.id;
            tables.insert_bill(bill)?;
            bill_id
        }
    };

    tables.insert_parcel(Parcel {
        id: parcel_id,
        financing_id: financing.id,
        number: draft.number,
        due_date: draft.due_date,
        outstanding_before: draft.outstanding_before,
        index_correction: draft.index_correction,
        amortization: draft.amortization,
        interest: draft.interest,
        insurance: draft.insurance,
        admin_fee: draft.admin_fee,
        total_planned: draft.total_planned,
        outstanding_after: draft.outstanding_after,
        status: ParcelStatus::Pending,
        amount_paid: None,
        paid_at: None,
        bill_id: Some(bill_id),
    })
}

fn bill_description(financing: &Financing, number: u32, last: u32) -> String {
    format!("{} {number}/{last}", financing.description)
}

fn sync_bill_descriptions(tables: &mut Tables, id: FinancingId) -> Result<(), EngineError> {
    let financing = tables.financing(id)?.clone();
    let last = financing.base_parcel_number + financing.term_remaining_months;
    let pending: Vec<(u32, Option<BillId>)> = tables
        .parcels_of(id)
        .into_iter()
        .filter(|p| !p.is_paid())
        .map(|p| (p.number, p.bill_id))
        .collect();
    for (number, bill_id) in pending {
        if let Some(bill_id) = bill_id {
            let bill = tables.bill_mut(bill_id)?;
            bill.description = bill_description(&financing, number, last);
            bill.category_id = financing.category_id;
        }
    }
    Ok(())
}

/// Removes a pending parcel together with its pending bill.
fn drop_pending_parcel(tables: &mut Tables, id: ParcelId) -> Result<(), EngineError> {
    let parcel = tables.parcel(id)?;
    if parcel.is_paid() {
        return Err(EngineError::InvariantViolation(format!(
            "refusing to drop paid parcel {}",
            parcel.number
        )));
    }
    let bill_id = parcel.bill_id;
    tables.remove_parcel(id);
    if let Some(bill_id) = bill_id {
        if tables.bill(bill_id)?.is_paid() {
            return Err(EngineError::InvariantViolation(format!(
                "pending parcel {id} has a paid bill {bill_id}"
            )));
        }
        tables.remove_bill(bill_id);
    }
    Ok(())
}

/// Moves a financing to `settled` and drops whatever pending tail remains.
fn settle(tables: &mut Tables, id: FinancingId) -> Result<(), EngineError> {
    let pending: Vec<ParcelId> = tables
        .parcels_of(id)
        .into_iter()
        .filter(|p| !p.is_paid())
        .map(|p| p.id)
        .collect();
    for parcel_id in pending {
        drop_pending_parcel(tables, parcel_id)?;
    }
    let row = tables.financing_mut(id)?;
    row.state = FinancingState::Settled;
    row.term_remaining_months = 0;
    info!(financing = %id, outstanding = %row.current_outstanding, "financing settled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preferences;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sac() -> NewFinancing {
        NewFinancing {
            description: "Apartment".into(),
            category_id: None,
            system: AmortizationSystem::Sac,
            principal: dec!(100000),
            term_months: 10,
            nominal_annual_rate: dec!(0.12),
            index_name: None,
            contract_date: date(2025, 12, 1),
            first_parcel_date: date(2026, 1, 15),
            fixed_admin_fee: Decimal::ZERO,
            insurance_vigencies: vec![],
        }
    }

    fn pay_next(engine: &AmortizationEngine<'_>, tables: &mut Tables, id: FinancingId) {
        let f = tables.financing(id).unwrap().clone();
        let parcel = tables
            .parcel_by_number(id, f.base_parcel_number + 1)
            .unwrap()
            .clone();
        engine
            .pay_parcel(tables, parcel.id, parcel.due_date, parcel.total_planned)
            .unwrap();
    }

    #[test]
    fn create_generates_parcels_and_bills() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::with_preferences(Preferences::default());
        let view = engine.create(&mut tables, sac()).unwrap();
        assert_eq!(view.parcels.len(), 10);
        for parcel in &view.parcels {
            let bill = tables.bill(parcel.bill_id.unwrap()).unwrap();
            assert_eq!(bill.value, parcel.total_planned);
            assert_eq!(bill.due_date, parcel.due_date);
        }
    }

    #[test]
    fn reduce_parcel_keeps_term() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        let id = engine.create(&mut tables, sac()).unwrap().financing.id;
        for _ in 0..3 {
            pay_next(&engine, &mut tables, id);
        }
        let f = engine
            .amortize(
                &mut tables,
                id,
                AmortizationInput {
                    date: date(2026, 3, 20),
                    amount: dec!(20000),
                    regime: AmortizationRegime::ReduceParcel,
                },
            )
            .unwrap();
        assert_eq!(f.term_remaining_months, 7);
        assert_eq!(f.current_monthly_amortization, dec!(7142.86));
        let p4 = tables.parcel_by_number(id, 4).unwrap();
        assert_eq!(p4.outstanding_before, dec!(50000));
        assert_eq!(p4.amortization, dec!(7142.86));
    }

    #[test]
    fn reduce_term_drops_surplus_parcels() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        let id = engine.create(&mut tables, sac()).unwrap().financing.id;
        for _ in 0..3 {
            pay_next(&engine, &mut tables, id);
        }
        let dropped_bill = tables.parcel_by_number(id, 9).unwrap().bill_id.unwrap();
        let f = engine
            .amortize(
                &mut tables,
                id,
                AmortizationInput {
                    date: date(2026, 3, 20),
                    amount: dec!(20000),
                    regime: AmortizationRegime::ReduceTerm,
                },
            )
            .unwrap();
        assert_eq!(f.term_remaining_months, 5);
        assert_eq!(f.current_monthly_amortization, dec!(10000));
        let view = view(&tables, id).unwrap();
        assert_eq!(view.last_number(), Some(8));
        assert_eq!(view.parcel(8).unwrap().outstanding_after, Decimal::ZERO);
        assert!(tables.bill(dropped_bill).is_err());
    }

    #[test]
    fn missing_index_is_reported_not_raised() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        indices
            .publish("TR", Month::new(2026, 1).unwrap(), dec!(0.001))
            .unwrap();
        let input = NewFinancing {
            index_name: Some("tr".into()),
            term_months: 2,
            ..sac()
        };
        let view = engine.create(&mut tables, input).unwrap();
        assert_eq!(view.parcels[0].index_correction, dec!(100));
        assert_eq!(view.parcels[1].index_correction, Decimal::ZERO);
        let drained = notices.drain();
        assert_eq!(drained.len(), 1);
        assert!(matches!(&drained[0], Notice::MissingIndex { index, .. } if index == "TR"));
    }

    #[test]
    fn paying_out_of_order_conflicts() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        let view = engine.create(&mut tables, sac()).unwrap();
        let second = view.parcel(2).unwrap();
        let err = engine
            .pay_parcel(&mut tables, second.id, second.due_date, second.total_planned)
            .unwrap_err();
        assert!(matches!(err, EngineError::HistoryConflict(_)));
    }

    #[test]
    fn paying_the_last_parcel_settles() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        let input = NewFinancing {
            term_months: 2,
            ..sac()
        };
        let id = engine.create(&mut tables, input).unwrap().financing.id;
        pay_next(&engine, &mut tables, id);
        pay_next(&engine, &mut tables, id);
        let f = tables.financing(id).unwrap();
        assert_eq!(f.state, FinancingState::Settled);
        assert_eq!(f.current_outstanding, Decimal::ZERO);
        let err = engine
            .amortize(
                &mut tables,
                id,
                AmortizationInput {
                    date: date(2026, 3, 1),
                    amount: dec!(1),
                    regime: AmortizationRegime::ReduceTerm,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::HistoryImmutable(_)));
    }

    #[test]
    fn preview_matches_created_schedule() {
        let (indices, notices) = (IndexRegistry::new(), NoticeQueue::new());
        let engine = AmortizationEngine::new(&indices, &notices);
        let mut tables = Tables::default();
        let drafts = engine.preview(&sac()).unwrap();
        let view = engine.create(&mut tables, sac()).unwrap();
        let created: Vec<Money> = view.parcels.iter().map(|p| p.total_planned).collect();
        let previewed: Vec<Money> = drafts.iter().map(|d| d.total_planned).collect();
        assert_eq!(created, previewed);
    }
}
