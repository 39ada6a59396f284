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

//! Credit cards, budget items (itens agregados), groups and charges.

use crate::base::{
    BudgetItemId, BudgetVigencyId, CardId, CategoryId, ChargeId, GroupId, Money, Month,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub closing_day: u32,
    pub due_day: u32,
    pub active: bool,
}

/// A budget line of a card (item agregado).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetItem {
    pub id: BudgetItemId,
    pub card_id: CardId,
    pub name: String,
    pub group_id: Option<GroupId>,
    pub category_id: Option<CategoryId>,
}

/// Budget ceiling of an item over a period of competences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetVigency {
    pub id: BudgetVigencyId,
    pub item_id: BudgetItemId,
    pub start_month: Month,
    pub ceiling: Money,
    pub end_month: Option<Month>,
}

impl BudgetVigency {
    pub fn covers(&self, competence: Month) -> bool {
        self.start_month <= competence && self.end_month.is_none_or(|end| end >= competence)
    }
}

/// Group aggregating items across cards (grupo agregador).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BudgetGroup {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installment {
    pub number: u16,
    pub of: u16,
}

/// A captured card charge (lançamento agregado).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Charge {
    pub id: ChargeId,
    pub card_id: CardId,
    pub purchase_date: NaiveDate,
    pub competence: Month,
    pub amount: Money,
    pub description: String,
    pub item_id: Option<BudgetItemId>,
    pub installment: Option<Installment>,
    pub import_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCard {
    pub name: String,
    pub closing_day: u32,
    pub due_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBudgetItem {
    pub name: String,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    pub ceiling: Money,
    pub start_month: Month,
}

/// New ceiling for an item from `start_month` on; closes the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBudgetCeiling {
    pub start_month: Month,
    pub ceiling: Money,
}

/// Input for `POST /cards/{id}/charges`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCharge {
    pub competence: Month,
    #[serde(default)]
    pub item_id: Option<BudgetItemId>,
    pub amount: Money,
    pub purchase_date: NaiveDate,
    pub description: String,
    #[serde(default)]
    pub installment: Option<Installment>,
}
