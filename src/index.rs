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

//! Monthly monetary indexers (TR, IPCA, ...).
//!
//! Values are published once per month and read concurrently by every
//! schedule computation, so the registry lives outside the transactional
//! store in a [`DashMap`].

use crate::base::{Month, Percent};
use crate::error::EngineError;
use dashmap::DashMap;

/// Monthly index values keyed by `(name, month)`.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    values: DashMap<(String, Month), Percent>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes (or replaces) the value of `name` for `month`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a blank index name or a
    /// correction at or below -100%.
    pub fn publish(&self, name: &str, month: Month, value: Percent) -> Result<(), EngineError> {
        let name = normalize(name);
        if name.is_empty() {
            return Err(EngineError::Validation("index name is required".into()));
        }
        if value <= -Percent::ONE {
            return Err(EngineError::Validation(format!(
                "index {name} correction {value} would erase the balance"
            )));
        }
        self.values.insert((name, month), value);
        Ok(())
    }

    /// Value of `name` for `month`, if published.
    pub fn get(&self, name: &str, month: Month) -> Option<Percent> {
        self.values
            .get(&(normalize(name), month))
            .map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn names_are_case_insensitive() {
        let registry = IndexRegistry::new();
        let jan = Month::new(2026, 1).unwrap();
        registry.publish("tr", jan, dec!(0.0012)).unwrap();
        assert_eq!(registry.get("TR", jan), Some(dec!(0.0012)));
        assert_eq!(registry.get(" Tr ", jan), Some(dec!(0.0012)));
        assert_eq!(registry.get("TR", jan.next()), None);
    }

    #[test]
    fn publish_replaces_value() {
        let registry = IndexRegistry::new();
        let jan = Month::new(2026, 1).unwrap();
        registry.publish("IPCA", jan, dec!(0.004)).unwrap();
        registry.publish("IPCA", jan, dec!(0.005)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("IPCA", jan), Some(dec!(0.005)));
    }

    #[test]
    fn publish_rejects_invalid_input() {
        let registry = IndexRegistry::new();
        let jan = Month::new(2026, 1).unwrap();
        assert!(registry.publish("  ", jan, dec!(0.01)).is_err());
        assert!(registry.publish("TR", jan, dec!(-1)).is_err());
        assert!(registry.is_empty());
    }
}
