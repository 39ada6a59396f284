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

//! Planner preferences.
//!
//! Preferences live as a single row in the store and are handed to engines as
//! read-only constants for the duration of one transaction.

use crate::base::Money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid preferences: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid preferences: {0}")]
    Invalid(String),
}

/// Budget consumption ratios (`gasto / orcado`) at which each alert level starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertThresholds {
    pub moderate: Decimal,
    pub high: Decimal,
    pub critical: Decimal,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            moderate: dec!(1.00),
            high: dec!(1.50),
            critical: dec!(2.00),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preferences {
    /// Outstanding balance at or below which a financing counts as settled.
    pub settlement_epsilon: Money,
    /// Months after the current one covered by projections.
    pub projection_horizon_months: u32,
    /// Months after the viewed one the materializer fills.
    pub materialize_lookahead_months: u32,
    pub alert_thresholds: AlertThresholds,
    /// Day of month used for card invoices whose card has no due day.
    pub default_due_day: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            settlement_epsilon: dec!(0.01),
            projection_horizon_months: 12,
            materialize_lookahead_months: 1,
            alert_thresholds: AlertThresholds::default(),
            default_due_day: 10,
        }
    }
}

impl Preferences {
    /// Loads preferences from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let prefs: Preferences = serde_json::from_str(data)?;
        prefs.validate()?;
        Ok(prefs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.alert_thresholds;
        if !(t.moderate > Decimal::ZERO && t.moderate <= t.high && t.high <= t.critical) {
            return Err(ConfigError::Invalid(
                "alert thresholds must be positive and ascending".into(),
            ));
        }
        if self.settlement_epsilon < Decimal::ZERO {
            return Err(ConfigError::Invalid("settlement_epsilon must not be negative".into()));
        }
        if !(1..=31).contains(&self.default_due_day) {
            return Err(ConfigError::Invalid("default_due_day must be within 1..=31".into()));
        }
        Ok(())
    }
}
