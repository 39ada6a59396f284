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

//! Thread-safe queue of operator notices.
//!
//! Engines push notices for conditions an operator must look at (missing
//! indexer values, failed post-conditions, degraded reads) and keep going; the
//! outer layer drains the queue in FIFO order.

use crate::base::{FinancingId, Month};
use crossbeam::queue::SegQueue;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// No index value published; the month was computed without correction.
    MissingIndex {
        financing: FinancingId,
        index: String,
        month: Month,
    },
    /// An engine post-condition failed and the transaction was rolled back.
    InvariantViolation { detail: String },
    /// Month materialization failed; the read was served from existing rows.
    DegradedRead { month: Month, detail: String },
}

/// Lock-free FIFO of [`Notice`]s, safe for concurrent producers.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    notices: SegQueue<Notice>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Removes and returns every queued notice, oldest first.
    pub fn drain(&self) -> Vec<Notice> {
        let mut out = Vec::with_capacity(self.notices.len());
        while let Some(notice) = self.notices.pop() {
            out.push(notice);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
