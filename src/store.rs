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

//! Transactional in-process store.
//!
//! [`Store`] owns every table behind a single [`Mutex`]. A transaction runs
//! against a private copy of the tables and swaps it in on success; an error
//! drops the copy, which is the rollback. Holding the lock for the whole
//! transaction makes transactions serializable.
//!
//! Secondary indices mirror the relational layout:
//! - parcels by `(financing_id, number)`
//! - charges by `(card_id, competence)` and unique `(import_uuid, installment_n)`
//! - predictions by `(origin_kind, origin_id, current_date)`
//! - invoices by `(card_id, competence)`

use crate::account::{BankAccount, Movement};
use crate::base::{
    AccountId, AmortizationId, BillId, BudgetItemId, BudgetVigencyId, CardId, ChargeId,
    ConsortiumId, FinancingId, GroupId, Month, MovementId, ParcelId, PredictionId, RecurringId,
    TransportPathId, VehicleFinancingId, VehicleId, VigencyId,
};
use crate::bill::Bill;
use crate::card::{BudgetGroup, BudgetItem, BudgetVigency, Card, Charge};
use crate::config::Preferences;
use crate::consortium::Consortium;
use crate::error::EngineError;
use crate::financing::{ExtraordinaryAmortization, Financing, Parcel, Vigency};
use crate::projection::{Origin, Prediction, TransportPath, Vehicle, VehicleFinancing};
use crate::recurrence::RecurringExpense;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Every table of the planner plus its secondary indices.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    seq: u64,
    /// Single-row preferences table.
    pub(crate) preferences: Preferences,

    pub(crate) financings: BTreeMap<FinancingId, Financing>,
    parcels: BTreeMap<ParcelId, Parcel>,
    parcel_index: BTreeMap<(FinancingId, u32), ParcelId>,
    pub(crate) amortizations: BTreeMap<AmortizationId, ExtraordinaryAmortization>,
    pub(crate) vigencies: BTreeMap<VigencyId, Vigency>,

    bills: BTreeMap<BillId, Bill>,
    invoice_index: BTreeMap<(CardId, Month), BillId>,

    pub(crate) cards: BTreeMap<CardId, Card>,
    pub(crate) budget_items: BTreeMap<BudgetItemId, BudgetItem>,
    pub(crate) budget_vigencies: BTreeMap<BudgetVigencyId, BudgetVigency>,
    pub(crate) groups: BTreeMap<GroupId, BudgetGroup>,
    charges: BTreeMap<ChargeId, Charge>,
    charge_index: BTreeMap<(CardId, Month), BTreeSet<ChargeId>>,
    import_keys: BTreeMap<(Uuid, u16), ChargeId>,

    pub(crate) recurring: BTreeMap<RecurringId, RecurringExpense>,
    pub(crate) consortia: BTreeMap<ConsortiumId, Consortium>,

    predictions: BTreeMap<PredictionId, Prediction>,
    prediction_index: BTreeSet<(Origin, NaiveDate, PredictionId)>,
    pub(crate) vehicles: BTreeMap<VehicleId, Vehicle>,
    pub(crate) transport_paths: BTreeMap<TransportPathId, TransportPath>,
    pub(crate) vehicle_financings: BTreeMap<VehicleFinancingId, VehicleFinancing>,

    pub(crate) accounts: BTreeMap<AccountId, BankAccount>,
    pub(crate) movements: BTreeMap<MovementId, Movement>,
}

impl Tables {
    pub fn with_preferences(preferences: Preferences) -> Self {
        Self {
            preferences,
            ..Self::default()
        }
    }

    /// Next row id. Ids are unique across tables and strictly increasing.
    pub(crate) fn next_id(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn financing(&self, id: FinancingId) -> Result<&Financing, EngineError> {
        self.financings
            .get(&id)
            .ok_or(EngineError::not_found("financing", id.0))
    }

    pub(crate) fn financing_mut(&mut self, id: FinancingId) -> Result<&mut Financing, EngineError> {
        self.financings
            .get_mut(&id)
            .ok_or(EngineError::not_found("financing", id.0))
    }

    // === Parcels ===

    pub fn parcel(&self, id: ParcelId) -> Result<&Parcel, EngineError> {
        self.parcels
            .get(&id)
            .ok_or(EngineError::not_found("parcel", id.0))
    }

    pub(crate) fn parcel_mut(&mut self, id: ParcelId) -> Result<&mut Parcel, EngineError> {
        self.parcels
            .get_mut(&id)
            .ok_or(EngineError::not_found("parcel", id.0))
    }

    pub fn parcel_by_number(&self, financing: FinancingId, number: u32) -> Option<&Parcel> {
        self.parcel_index
            .get(&(financing, number))
            .and_then(|id| self.parcels.get(id))
    }

    /// Parcels of a financing ordered by number.
    pub fn parcels_of(&self, financing: FinancingId) -> Vec<&Parcel> {
        self.parcel_index
            .range((financing, 0)..=(financing, u32::MAX))
            .filter_map(|(_, id)| self.parcels.get(id))
            .collect()
    }

    pub(crate) fn insert_parcel(&mut self, parcel: Parcel) -> Result<(), EngineError> {
        let key = (parcel.financing_id, parcel.number);
        if let Some(existing) = self.parcel_index.get(&key) {
            if *existing != parcel.id {
                return Err(EngineError::InvariantViolation(format!(
                    "financing {} already has parcel number {}",
                    parcel.financing_id, parcel.number
                )));
            }
        }
        self.parcel_index.insert(key, parcel.id);
        self.parcels.insert(parcel.id, parcel);
        Ok(())
    }

    pub(crate) fn remove_parcel(&mut self, id: ParcelId) -> Option<Parcel> {
        let parcel = self.parcels.remove(&id)?;
        self.parcel_index.remove(&(parcel.financing_id, parcel.number));
        Some(parcel)
    }

    pub fn amortizations_of(&self, financing: FinancingId) -> Vec<&ExtraordinaryAmortization> {
        self.amortizations
            .values()
            .filter(|a| a.financing_id == financing)
            .collect()
    }

    pub fn vigencies_of(&self, financing: FinancingId) -> Vec<&Vigency> {
        self.vigencies
            .values()
            .filter(|v| v.financing_id == financing)
            .collect()
    }

    // === Bills ===

    pub fn bill(&self, id: BillId) -> Result<&Bill, EngineError> {
        self.bills.get(&id).ok_or(EngineError::not_found("bill", id.0))
    }

    pub(crate) fn bill_mut(&mut self, id: BillId) -> Result<&mut Bill, EngineError> {
        self.bills
            .get_mut(&id)
            .ok_or(EngineError::not_found("bill", id.0))
    }

    pub fn bills(&self) -> impl Iterator<Item = &Bill> {
        self.bills.values()
    }

    pub fn bills_in(&self, month: Month) -> Vec<&Bill> {
        let mut bills: Vec<&Bill> = self.bills.values().filter(|b| b.competence == month).collect();
        bills.sort_by_key(|b| (b.due_date, b.id));
        bills
    }

    pub(crate) fn insert_bill(&mut self, bill: Bill) -> Result<(), EngineError> {
        if let Some(invoice) = bill.invoice() {
            let key = (invoice.card_id, invoice.card_competence);
            match self.invoice_index.get(&key) {
                Some(existing) if *existing != bill.id => {
                    return Err(EngineError::InvariantViolation(format!(
                        "card {} already has an invoice for {}",
                        invoice.card_id, invoice.card_competence
                    )));
                }
                _ => {
                    self.invoice_index.insert(key, bill.id);
                }
            }
        }
        self.bills.insert(bill.id, bill);
        Ok(())
    }

    pub(crate) fn remove_bill(&mut self, id: BillId) -> Option<Bill> {
        let bill = self.bills.remove(&id)?;
        if let Some(invoice) = bill.invoice() {
            self.invoice_index
                .remove(&(invoice.card_id, invoice.card_competence));
        }
        Some(bill)
    }

    pub fn invoice_of(&self, card: CardId, competence: Month) -> Option<&Bill> {
        self.invoice_index
            .get(&(card, competence))
            .and_then(|id| self.bills.get(id))
    }

    // === Cards ===

    pub fn card(&self, id: CardId) -> Result<&Card, EngineError> {
        self.cards.get(&id).ok_or(EngineError::not_found("card", id.0))
    }

    pub fn items_of(&self, card: CardId) -> Vec<&BudgetItem> {
        self.budget_items
            .values()
            .filter(|i| i.card_id == card)
            .collect()
    }

    pub fn charges_of(&self, card: CardId, competence: Month) -> Vec<&Charge> {
        self.charge_index
            .get(&(card, competence))
            .map(|ids| ids.iter().filter_map(|id| self.charges.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn has_import_key(&self, compra_id: Uuid, installment: u16) -> bool {
        self.import_keys.contains_key(&(compra_id, installment))
    }

    /// Appends a charge, enforcing the unique `(import_uuid, installment_n)` key.
    pub(crate) fn insert_charge(&mut self, charge: Charge) -> Result<(), EngineError> {
        if let Some(uuid) = charge.import_uuid {
            let installment = charge.installment.map(|i| i.number).unwrap_or(1);
            if self.import_keys.contains_key(&(uuid, installment)) {
                return Err(EngineError::IdempotentDuplicate {
                    compra_id: uuid,
                    installment,
                });
            }
            self.import_keys.insert((uuid, installment), charge.id);
        }
        self.charge_index
            .entry((charge.card_id, charge.competence))
            .or_default()
            .insert(charge.id);
        self.charges.insert(charge.id, charge);
        Ok(())
    }

    // === Predictions ===

    pub fn prediction(&self, id: PredictionId) -> Result<&Prediction, EngineError> {
        self.predictions
            .get(&id)
            .ok_or(EngineError::not_found("prediction", id.0))
    }

    /// Predictions of an origin ordered by current date.
    pub fn predictions_of(&self, origin: Origin) -> Vec<&Prediction> {
        let low = (origin, NaiveDate::MIN, PredictionId(0));
        let high = (origin, NaiveDate::MAX, PredictionId(u64::MAX));
        self.prediction_index
            .range(low..=high)
            .filter_map(|(_, _, id)| self.predictions.get(id))
            .collect()
    }

    pub(crate) fn insert_prediction(&mut self, prediction: Prediction) {
        self.prediction_index
            .insert((prediction.origin, prediction.current_date, prediction.id));
        self.predictions.insert(prediction.id, prediction);
    }

    pub(crate) fn remove_prediction(&mut self, id: PredictionId) -> Option<Prediction> {
        let prediction = self.predictions.remove(&id)?;
        self.prediction_index
            .remove(&(prediction.origin, prediction.current_date, prediction.id));
        Some(prediction)
    }

    /// Applies `update` to a prediction and keeps the date index in sync.
    pub(crate) fn update_prediction<F>(&mut self, id: PredictionId, update: F) -> Result<&Prediction, EngineError>
    where
        F: FnOnce(&mut Prediction),
    {
        let mut prediction = self
            .remove_prediction(id)
            .ok_or(EngineError::not_found("prediction", id.0))?;
        update(&mut prediction);
        self.insert_prediction(prediction);
        self.prediction(id)
    }

    pub fn account(&self, id: AccountId) -> Result<&BankAccount, EngineError> {
        self.accounts
            .get(&id)
            .ok_or(EngineError::not_found("bank account", id.0))
    }
}

/// Shared mutable store. All engine operations run inside [`Store::transaction`].
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            tables: Mutex::new(Tables::with_preferences(preferences)),
        }
    }

    /// Runs `work` as one serializable transaction.
    ///
    /// Writes become visible only when `work` returns `Ok`; on `Err` every
    /// write made inside the closure is discarded.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Tables) -> Result<T, EngineError>,
    {
        let mut committed = self.tables.lock();
        let mut working = committed.clone();
        let out = work(&mut working)?;
        *committed = working;
        Ok(out)
    }

    /// Runs a read-only closure against the committed tables.
    pub fn read<T, F>(&self, query: F) -> T
    where
        F: FnOnce(&Tables) -> T,
    {
        let committed = self.tables.lock();
        query(&committed)
    }
}
