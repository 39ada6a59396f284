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

//! Bank accounts and their movements.
//!
//! The running balance is a materialized sum:
//! `current_balance == initial_balance + Σ credits − Σ debits`.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use cashflow_engine_rs::{AccountId, BankAccount};
//!
//! let account = BankAccount::new(AccountId(1), "Checking", dec!(1000.00));
//! assert_eq!(account.current_balance, dec!(1000.00));
//! ```

use crate::base::{AccountId, BillId, Money, MovementId};
use crate::error::EngineError;
use crate::store::Tables;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Movement {
    pub id: MovementId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub amount: Money,
    pub description: String,
    pub bill_id: Option<BillId>,
}

impl Movement {
    /// Signed effect on the balance.
    pub fn signed(&self) -> Decimal {
        match self.kind {
            MovementKind::Credit => self.amount,
            MovementKind::Debit => -self.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankAccount {
    pub id: AccountId,
    pub name: String,
    pub initial_balance: Money,
    pub current_balance: Money,
    pub status: AccountStatus,
}

impl BankAccount {
    pub fn new(id: AccountId, name: impl Into<String>, initial_balance: Money) -> Self {
        Self {
            id,
            name: name.into(),
            initial_balance,
            current_balance: initial_balance,
            status: AccountStatus::Active,
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.status == AccountStatus::Closed {
            return Err(EngineError::HistoryImmutable(format!(
                "bank account {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    /// Increases the running balance.
    fn credit(&mut self, amount: Money) -> Result<(), EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("movement amount must be positive".into()));
        }
        self.ensure_open()?;
        self.current_balance += amount;
        Ok(())
    }

    /// Decreases the running balance. Overdraft is allowed.
    fn debit(&mut self, amount: Money) -> Result<(), EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::Validation("movement amount must be positive".into()));
        }
        self.ensure_open()?;
        self.current_balance -= amount;
        Ok(())
    }
}

/// Input for a new bank account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBankAccount {
    pub name: String,
    #[serde(default)]
    pub initial_balance: Money,
}

/// Movement bookkeeping on the store.
pub struct Ledger;

impl Ledger {
    pub fn open(tables: &mut Tables, input: NewBankAccount) -> Result<BankAccount, EngineError> {
        if input.name.trim().is_empty() {
            return Err(EngineError::Validation("account name is required".into()));
        }
        let id = AccountId(tables.next_id());
        let account = BankAccount::new(id, input.name, input.initial_balance);
        tables.accounts.insert(id, account.clone());
        Ok(account)
    }

    /// Emits a movement and updates the running balance in the same transaction.
    pub fn post(
        tables: &mut Tables,
        account_id: AccountId,
        kind: MovementKind,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
        bill_id: Option<BillId>,
    ) -> Result<Movement, EngineError> {
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::not_found("bank account", account_id.0))?;
        match kind {
            MovementKind::Credit => account.credit(amount)?,
            MovementKind::Debit => account.debit(amount)?,
        }

        let movement = Movement {
            id: MovementId(tables.next_id()),
            account_id,
            date,
            kind,
            amount,
            description: description.into(),
            bill_id,
        };
        tables.movements.insert(movement.id, movement.clone());
        Self::verify_balance(tables, account_id)?;
        Ok(movement)
    }

    /// Checks the running balance against the movement log.
    pub fn verify_balance(tables: &Tables, account_id: AccountId) -> Result<(), EngineError> {
        let account = tables
            .accounts
            .get(&account_id)
            .ok_or(EngineError::not_found("bank account", account_id.0))?;
        let net: Decimal = tables
            .movements
            .values()
            .filter(|m| m.account_id == account_id)
            .map(Movement::signed)
            .sum();
        let expected = account.initial_balance + net;
        if expected != account.current_balance {
            return Err(EngineError::InvariantViolation(format!(
                "bank account {} balance {} differs from movements {}",
                account_id, account.current_balance, expected
            )));
        }
        Ok(())
    }

    pub fn close(tables: &mut Tables, account_id: AccountId) -> Result<BankAccount, EngineError> {
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or(EngineError::not_found("bank account", account_id.0))?;
        account.status = AccountStatus::Closed;
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn open(tables: &mut Tables, balance: Money) -> AccountId {
        Ledger::open(
            tables,
            NewBankAccount {
                name: "Checking".into(),
                initial_balance: balance,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn debit_and_credit_move_running_balance() {
        let mut tables = Tables::default();
        let id = open(&mut tables, dec!(100.00));
        Ledger::post(&mut tables, id, MovementKind::Debit, date(1), dec!(30.00), "rent", None)
            .unwrap();
        Ledger::post(&mut tables, id, MovementKind::Credit, date(2), dec!(5.50), "refund", None)
            .unwrap();
        assert_eq!(tables.accounts[&id].current_balance, dec!(75.50));
        assert_eq!(tables.movements.len(), 2);
    }

    #[test]
    fn overdraft_is_allowed() {
        let mut tables = Tables::default();
        let id = open(&mut tables, dec!(10.00));
        Ledger::post(&mut tables, id, MovementKind::Debit, date(1), dec!(25.00), "bill", None)
            .unwrap();
        assert_eq!(tables.accounts[&id].current_balance, dec!(-15.00));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut tables = Tables::default();
        let id = open(&mut tables, dec!(10.00));
        let result =
            Ledger::post(&mut tables, id, MovementKind::Debit, date(1), Decimal::ZERO, "x", None);
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(tables.movements.is_empty());
    }

    #[test]
    fn closed_account_rejects_movements() {
        let mut tables = Tables::default();
        let id = open(&mut tables, dec!(10.00));
        Ledger::close(&mut tables, id).unwrap();
        let result =
            Ledger::post(&mut tables, id, MovementKind::Credit, date(1), dec!(1.00), "x", None);
        assert!(matches!(result, Err(EngineError::HistoryImmutable(_))));
    }

    #[test]
    fn tampered_balance_is_an_invariant_violation() {
        let mut tables = Tables::default();
        let id = open(&mut tables, dec!(10.00));
        tables.accounts.get_mut(&id).unwrap().current_balance = dec!(11.00);
        let result = Ledger::verify_balance(&tables, id);
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }
}
