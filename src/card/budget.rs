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

//! Card budgets: item ceilings over time and consumption alerts.
//!
//! Alerts are informational. A charge over budget is always accepted.

use super::model::{BudgetGroup, BudgetItem, BudgetVigency, NewBudgetCeiling, NewBudgetItem};
use crate::base::{BudgetItemId, BudgetVigencyId, CardId, GroupId, Money, Month};
use crate::config::AlertThresholds;
use crate::error::EngineError;
use crate::store::Tables;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Moderate,
    High,
    Critical,
}

impl AlertLevel {
    /// Level reached by a consumption ratio, if any.
    pub fn classify(ratio: Decimal, thresholds: &AlertThresholds) -> Option<Self> {
        if ratio >= thresholds.critical {
            Some(AlertLevel::Critical)
        } else if ratio >= thresholds.high {
            Some(AlertLevel::High)
        } else if ratio >= thresholds.moderate {
            Some(AlertLevel::Moderate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum AlertScope {
    Item { item_id: BudgetItemId, name: String },
    Group { group_id: GroupId, name: String },
}

/// Budget consumption report for one item or group in one competence.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BudgetAlert {
    #[serde(flatten)]
    pub scope: AlertScope,
    pub competence: Month,
    pub level: AlertLevel,
    /// Ceiling.
    pub orcado: Money,
    /// Consumption.
    pub gasto: Money,
    /// Consumption above the ceiling.
    pub excedente: Money,
    /// `gasto / orcado` in percent, two decimals.
    pub percentual: Decimal,
}

impl BudgetAlert {
    fn evaluate(
        scope: AlertScope,
        competence: Month,
        orcado: Money,
        gasto: Money,
        thresholds: &AlertThresholds,
    ) -> Option<Self> {
        if orcado <= Decimal::ZERO {
            return None;
        }
        let ratio = gasto / orcado;
        let level = AlertLevel::classify(ratio, thresholds)?;
        Some(Self {
            scope,
            competence,
            level,
            orcado,
            gasto,
            excedente: (gasto - orcado).max(Decimal::ZERO),
            percentual: (ratio * Decimal::ONE_HUNDRED).round_dp(2),
        })
    }
}

/// Ceiling of an item in a competence: the covering vigency with the latest start.
pub fn ceiling_of(tables: &Tables, item: BudgetItemId, competence: Month) -> Option<Money> {
    tables
        .budget_vigencies
        .values()
        .filter(|v| v.item_id == item && v.covers(competence))
        .max_by_key(|v| (v.start_month, v.id))
        .map(|v| v.ceiling)
}

/// Sum of the active ceilings of a card's items: the invoice's planned value.
pub fn planned_total(tables: &Tables, card: CardId, competence: Month) -> Money {
    tables
        .items_of(card)
        .into_iter()
        .filter_map(|item| ceiling_of(tables, item.id, competence))
        .sum()
}

fn consumption(tables: &Tables, item: &BudgetItem, competence: Month) -> Money {
    tables
        .charges_of(item.card_id, competence)
        .into_iter()
        .filter(|c| c.item_id == Some(item.id))
        .map(|c| c.amount)
        .sum()
}

/// Item and group alerts for a card in a competence.
///
/// Group totals include the group's items on every card.
pub fn alerts(tables: &Tables, card: CardId, competence: Month) -> Vec<BudgetAlert> {
    let thresholds = &tables.preferences().alert_thresholds;
    let mut out = Vec::new();
    let mut touched: BTreeSet<GroupId> = BTreeSet::new();

    for item in tables.items_of(card) {
        if let Some(group) = item.group_id {
            touched.insert(group);
        }
        let Some(ceiling) = ceiling_of(tables, item.id, competence) else {
            continue;
        };
        let scope = AlertScope::Item {
            item_id: item.id,
            name: item.name.clone(),
        };
        let gasto = consumption(tables, item, competence);
        out.extend(BudgetAlert::evaluate(scope, competence, ceiling, gasto, thresholds));
    }

    for group_id in touched {
        let Some(group) = tables.groups.get(&group_id) else {
            continue;
        };
        let (orcado, gasto) = tables
            .budget_items
            .values()
            .filter(|i| i.group_id == Some(group_id))
            .filter_map(|i| {
                ceiling_of(tables, i.id, competence).map(|c| (c, consumption(tables, i, competence)))
            })
            .fold((Decimal::ZERO, Decimal::ZERO), |(o, g), (c, u)| (o + c, g + u));
        let scope = AlertScope::Group {
            group_id,
            name: group.name.clone(),
        };
        out.extend(BudgetAlert::evaluate(scope, competence, orcado, gasto, thresholds));
    }
    out
}

/// Creates a budget item with its first ceiling.
pub fn add_item(
    tables: &mut Tables,
    card: CardId,
    input: NewBudgetItem,
) -> Result<BudgetItem, EngineError> {
    tables.card(card)?;
    if input.name.trim().is_empty() {
        return Err(EngineError::Validation("budget item name is required".into()));
    }
    if let Some(group) = input.group_id {
        if !tables.groups.contains_key(&group) {
            return Err(EngineError::not_found("budget group", group.0));
        }
    }
    let item = BudgetItem {
        id: BudgetItemId(tables.next_id()),
        card_id: card,
        name: input.name.trim().to_string(),
        group_id: input.group_id,
        category_id: input.category_id,
    };
    tables.budget_items.insert(item.id, item.clone());
    set_ceiling(
        tables,
        item.id,
        NewBudgetCeiling {
            start_month: input.start_month,
            ceiling: input.ceiling,
        },
    )?;
    Ok(item)
}

/// Starts a new ceiling for an item, closing the open one the month before.
pub fn set_ceiling(
    tables: &mut Tables,
    item: BudgetItemId,
    input: NewBudgetCeiling,
) -> Result<BudgetVigency, EngineError> {
    if !tables.budget_items.contains_key(&item) {
        return Err(EngineError::not_found("budget item", item.0));
    }
    if input.ceiling < Decimal::ZERO {
        return Err(EngineError::Validation("ceiling must not be negative".into()));
    }
    let start = input.start_month;
    let mut successor: Option<Month> = None;
    for vigency in tables.budget_vigencies.values_mut() {
        if vigency.item_id != item {
            continue;
        }
        if vigency.start_month >= start {
            if vigency.start_month == start {
                // Replaced outright.
                vigency.end_month = Some(start.prev());
            } else if successor.is_none_or(|s| vigency.start_month < s) {
                successor = Some(vigency.start_month);
            }
        } else if vigency.end_month.is_none_or(|end| end >= start) {
            vigency.end_month = Some(start.prev());
        }
    }
    let vigency = BudgetVigency {
        id: BudgetVigencyId(tables.next_id()),
        item_id: item,
        start_month: start,
        ceiling: input.ceiling,
        end_month: successor.map(Month::prev),
    };
    tables.budget_vigencies.insert(vigency.id, vigency.clone());
    Ok(vigency)
}

pub fn add_group(tables: &mut Tables, name: &str) -> Result<BudgetGroup, EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("group name is required".into()));
    }
    let group = BudgetGroup {
        id: GroupId(tables.next_id()),
        name: name.trim().to_string(),
    };
    tables.groups.insert(group.id, group.clone());
    Ok(group)
}
