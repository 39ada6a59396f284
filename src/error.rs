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

//! Error types for engine operations.

use crate::base::FinancingId;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Engine operation errors.
///
/// Every variant maps onto one [`ErrorKind`] and one HTTP status code; the
/// outer layer only translates, it never reinterprets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Input failed validation at the boundary.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// Operation would rewrite immutable history.
    #[error("history is immutable: {0}")]
    HistoryImmutable(String),

    /// Write blocked by a paid tail or a vigency period.
    #[error("history conflict: {0}")]
    HistoryConflict(String),

    /// Structural recalculation on a financing with history.
    #[error("structural recalculation of financing {financing} blocked by existing history (retry with force)")]
    RecalcBlocked { financing: FinancingId },

    /// No insurance vigency covers a parcel due date.
    #[error("financing {financing} has no insurance vigency covering {date}")]
    InsuranceGap { financing: FinancingId, date: NaiveDate },

    /// Import row already persisted.
    #[error("import row {compra_id} installment {installment} already persisted")]
    IdempotentDuplicate { compra_id: Uuid, installment: u16 },

    /// Engine post-condition failed.
    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
}

/// Error taxonomy codes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    HistoryImmutable,
    HistoryConflict,
    RecalcBlocked,
    InsuranceGap,
    IdempotentDuplicate,
    InvariantViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::HistoryImmutable => "HISTORY_IMMUTABLE",
            ErrorKind::HistoryConflict => "HISTORY_CONFLICT",
            ErrorKind::RecalcBlocked => "RECALC_BLOCKED",
            ErrorKind::InsuranceGap => "INSURANCE_GAP",
            ErrorKind::IdempotentDuplicate => "IDEMPOTENT_DUPLICATE",
            ErrorKind::InvariantViolation => "INVARIANT_VIOLATION",
        }
    }
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::HistoryImmutable(_) => ErrorKind::HistoryImmutable,
            EngineError::HistoryConflict(_) => ErrorKind::HistoryConflict,
            EngineError::RecalcBlocked { .. } => ErrorKind::RecalcBlocked,
            EngineError::InsuranceGap { .. } => ErrorKind::InsuranceGap,
            EngineError::IdempotentDuplicate { .. } => ErrorKind::IdempotentDuplicate,
            EngineError::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    /// HTTP status the outer layer answers with.
    ///
    /// | Kind | Status |
    /// |------|--------|
    /// | Validation, InsuranceGap | 400 |
    /// | HistoryImmutable | 403 |
    /// | NotFound | 404 |
    /// | HistoryConflict, RecalcBlocked, IdempotentDuplicate | 409 |
    /// | InvariantViolation | 500 |
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InsuranceGap => 400,
            ErrorKind::HistoryImmutable => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::HistoryConflict
            | ErrorKind::RecalcBlocked
            | ErrorKind::IdempotentDuplicate => 409,
            ErrorKind::InvariantViolation => 500,
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::Validation(format!("csv: {err}"))
    }
}
