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

//! Two-phase card statement import.
//!
//! `upload` parses a statement into a preview without writing anything;
//! `commit` persists a preview. Every source row gets a deterministic
//! `compra_id` (UUID v5 of its content), so replaying a statement, or seeing
//! the next installment of a purchase in a later statement, never duplicates
//! a charge.
//!
//! # CSV Format
//!
//! ```csv
//! date,description,amount
//! 2026-02-14,NETFLIX,55.90
//! 20/01/2026,NOTEBOOK PARC 03/10,350.00
//! ```

use super::invoice::CardInvoiceEngine;
use super::model::{Installment, NewCharge};
use super::budget::{self, BudgetAlert};
use crate::base::{BudgetItemId, CardId, Money, Month};
use crate::bill::Bill;
use crate::error::EngineError;
use crate::store::Tables;
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Namespace of statement `compra_id`s.
const IMPORT_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_42c3_9b0e_4d7a_8f25_c1e0_93b4_d6a7);

static PARCELA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\bPARC(?:ELA)?\.?\s*(\d{1,3})\s*/\s*(\d{1,3})\s*$")
        .expect("hardcoded regex should be valid")
});
static DE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\b(\d{1,3})\s+DE\s+(\d{1,3})\s*$").expect("hardcoded regex should be valid")
});
static SLASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\b(\d{1,3})\s*/\s*(\d{1,3})\s*$").expect("hardcoded regex should be valid")
});

/// Splits an installment suffix (`NN/NN`, `N DE N`, `PARC(ELA) N/N`) off a descriptor.
pub fn recognize_installment(description: &str) -> (String, Option<Installment>) {
    let trimmed = description.trim();
    for pattern in [&*PARCELA, &*DE, &*SLASH] {
        let Some(caps) = pattern.captures(trimmed) else {
            continue;
        };
        let (Some(whole), Some(n), Some(m)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Ok(number), Ok(of)) = (n.as_str().parse::<u16>(), m.as_str().parse::<u16>()) else {
            continue;
        };
        if number == 0 || of < 2 || number > of {
            continue;
        }
        let base = trimmed[..whole.start()].trim().to_string();
        return (base, Some(Installment { number, of }));
    }
    (trimmed.to_string(), None)
}

/// Input for `POST /card-imports/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadInput {
    pub card_id: CardId,
    /// Competence the statement's installments are counted from.
    pub base_competence: Month,
    #[serde(default)]
    pub item_id: Option<BudgetItemId>,
    pub csv: String,
}

/// One charge the commit would write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PreviewRow {
    pub compra_id: Uuid,
    /// 1-based line of the source row, header excluded.
    pub source_row: usize,
    pub purchase_date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub installment: Option<Installment>,
    pub competence: Month,
    pub item_id: Option<BudgetItemId>,
    /// Already persisted by an earlier commit.
    #[serde(default)]
    pub duplicate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SkippedRow {
    pub source_row: usize,
    pub reason: String,
}

/// Parsed statement; also the body of `POST /card-imports/commit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImportPreview {
    pub card_id: CardId,
    pub base_competence: Month,
    pub rows_in_file: usize,
    pub rows: Vec<PreviewRow>,
    #[serde(default)]
    pub skipped: Vec<SkippedRow>,
}

/// Outcome of a commit, counted per source row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub rows_in_file: usize,
    pub inserted_count: usize,
    pub duplicate_count: usize,
    pub charges_inserted: usize,
    pub invoices: Vec<Bill>,
    pub alerts: Vec<BudgetAlert>,
}

#[derive(Debug, Deserialize)]
struct StatementRecord {
    date: String,
    description: String,
    amount: String,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// Accepts `1234.56`, `1234,56`, `1.234,56` and an optional `R$` prefix.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().trim_start_matches("R$").trim().replace(' ', "");
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    Decimal::from_str(&normalized).ok()
}

/// Parses a statement into a preview. Pure: the store is not consulted.
///
/// Malformed rows are reported in `skipped` and do not abort the parse.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] when the CSV itself cannot be read.
pub fn parse_statement(
    card_id: CardId,
    base_competence: Month,
    item_id: Option<BudgetItemId>,
    data: &str,
) -> Result<ImportPreview, EngineError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(data.as_bytes());

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    let mut seen: BTreeMap<String, u32> = BTreeMap::new();
    let mut rows_in_file = 0;

    for (index, result) in reader.deserialize::<StatementRecord>().enumerate() {
        let source_row = index + 1;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                skipped.push(SkippedRow {
                    source_row,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let Some(purchase_date) = parse_date(&record.date) else {
            skipped.push(SkippedRow {
                source_row,
                reason: format!("invalid date {:?}", record.date),
            });
            continue;
        };
        let Some(amount) = parse_amount(&record.amount).filter(|a| !a.is_zero()) else {
            skipped.push(SkippedRow {
                source_row,
                reason: format!("invalid amount {:?}", record.amount),
            });
            continue;
        };
        rows_in_file += 1;

        let (description, installment) = recognize_installment(&record.description);
        // Identical rows in one statement are distinct purchases.
        let content = format!(
            "{card_id}|{purchase_date}|{}|{amount}|{}",
            description.to_uppercase(),
            installment.map(|i| i.of).unwrap_or(1)
        );
        let occurrence = seen.entry(content.clone()).or_insert(0);
        *occurrence += 1;
        let compra_id = Uuid::new_v5(&IMPORT_NAMESPACE, format!("{content}#{occurrence}").as_bytes());

        match installment {
            None => rows.push(PreviewRow {
                compra_id,
                source_row,
                purchase_date,
                description,
                amount,
                installment: None,
                competence: base_competence,
                item_id,
                duplicate: false,
            }),
            Some(first) => {
                for number in first.number..=first.of {
                    let offset = u32::from(number - first.number);
                    rows.push(PreviewRow {
                        compra_id,
                        source_row,
                        purchase_date,
                        description: description.clone(),
                        amount,
                        installment: Some(Installment {
                            number,
                            of: first.of,
                        }),
                        competence: base_competence.add_months(offset),
                        item_id,
                        duplicate: false,
                    });
                }
            }
        }
    }

    Ok(ImportPreview {
        card_id,
        base_competence,
        rows_in_file,
        rows,
        skipped,
    })
}

/// Upload phase: parse and flag rows an earlier commit already persisted.
pub fn upload(tables: &Tables, input: UploadInput) -> Result<ImportPreview, EngineError> {
    tables.card(input.card_id)?;
    let mut preview =
        parse_statement(input.card_id, input.base_competence, input.item_id, &input.csv)?;
    for row in &mut preview.rows {
        let number = row.installment.map(|i| i.number).unwrap_or(1);
        row.duplicate = tables.has_import_key(row.compra_id, number);
    }
    Ok(preview)
}

/// Commit phase: persist every row not yet imported.
///
/// Duplicates are skipped and counted. Any other failure (for instance a
/// row landing on a paid invoice) aborts the whole batch.
pub fn commit(tables: &mut Tables, preview: ImportPreview) -> Result<ImportReport, EngineError> {
    let card = preview.card_id;
    tables.card(card)?;

    let mut inserted_rows: BTreeSet<usize> = BTreeSet::new();
    let mut source_rows: BTreeSet<usize> = BTreeSet::new();
    let mut competences: BTreeSet<Month> = BTreeSet::new();
    let mut charges_inserted = 0;

    for row in preview.rows {
        source_rows.insert(row.source_row);
        let installment = row.installment.map(|i| i.number).unwrap_or(1);
        if tables.has_import_key(row.compra_id, installment) {
            // Known rows never reach the invoice guard, so replays onto a paid invoice succeed.
            debug!(compra_id = %row.compra_id, installment, "import row already persisted");
            continue;
        }
        let input = NewCharge {
            competence: row.competence,
            item_id: row.item_id,
            amount: row.amount,
            purchase_date: row.purchase_date,
            description: row.description,
            installment: row.installment,
        };
        match CardInvoiceEngine::append(tables, card, input, Some(row.compra_id)) {
            Ok(_) => {
                charges_inserted += 1;
                inserted_rows.insert(row.source_row);
                competences.insert(row.competence);
            }
            Err(EngineError::IdempotentDuplicate {
                compra_id,
                installment,
            }) => {
                debug!(%compra_id, installment, "import row already persisted");
            }
            Err(e) => return Err(e),
        }
    }

    let mut invoices = Vec::with_capacity(competences.len());
    let mut alerts = Vec::new();
    for competence in competences {
        invoices.push(CardInvoiceEngine::recompute(tables, card, competence)?);
        alerts.extend(budget::alerts(tables, card, competence));
    }

    let report = ImportReport {
        rows_in_file: preview.rows_in_file,
        inserted_count: inserted_rows.len(),
        duplicate_count: source_rows.len() - inserted_rows.len(),
        charges_inserted,
        invoices,
        alerts,
    };
    info!(
        card = %card,
        inserted = report.inserted_count,
        duplicates = report.duplicate_count,
        "statement committed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn installment_suffixes() {
        assert_eq!(
            recognize_installment("NOTEBOOK 03/10"),
            ("NOTEBOOK".into(), Some(Installment { number: 3, of: 10 }))
        );
        assert_eq!(
            recognize_installment("SOFA 2 DE 6"),
            ("SOFA".into(), Some(Installment { number: 2, of: 6 }))
        );
        assert_eq!(
            recognize_installment("TV PARCELA 1/12"),
            ("TV".into(), Some(Installment { number: 1, of: 12 }))
        );
        assert_eq!(
            recognize_installment("TV parc. 4/5"),
            ("TV".into(), Some(Installment { number: 4, of: 5 }))
        );
        assert_eq!(recognize_installment("NETFLIX"), ("NETFLIX".into(), None));
        // Not an installment: 12/05 looks like a date with n > m.
        assert_eq!(recognize_installment("PIX 12/05"), ("PIX 12/05".into(), None));
    }

    #[test]
    fn amounts_in_both_notations() {
        assert_eq!(parse_amount("1234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("R$ 45,90"), Some(dec!(45.90)));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn future_installments_follow_base_competence() {
        let base = Month::new(2026, 3).unwrap();
        let csv = "date,description,amount\n2025-12-20,NOTEBOOK 03/05,350.00\n";
        let preview = parse_statement(CardId(1), base, None, csv).unwrap();
        assert_eq!(preview.rows_in_file, 1);
        let competences: Vec<Month> = preview.rows.iter().map(|r| r.competence).collect();
        assert_eq!(
            competences,
            vec![base, Month::new(2026, 4).unwrap(), Month::new(2026, 5).unwrap()]
        );
        assert!(preview.rows.iter().all(|r| r.compra_id == preview.rows[0].compra_id));
    }

    #[test]
    fn compra_id_is_deterministic_and_distinguishes_repeats() {
        let base = Month::new(2026, 3).unwrap();
        let csv = "date,description,amount\n2026-02-01,COFFEE,5.00\n2026-02-01,COFFEE,5.00\n";
        let first = parse_statement(CardId(1), base, None, csv).unwrap();
        let second = parse_statement(CardId(1), base, None, csv).unwrap();
        assert_eq!(first.rows, second.rows);
        assert_ne!(first.rows[0].compra_id, first.rows[1].compra_id);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let base = Month::new(2026, 3).unwrap();
        let csv = "date,description,amount\nyesterday,X,1.00\n2026-02-01,Y,zero\n2026-02-01,Z,2.00\n";
        let preview = parse_statement(CardId(1), base, None, csv).unwrap();
        assert_eq!(preview.rows_in_file, 1);
        assert_eq!(preview.skipped.len(), 2);
        assert_eq!(preview.skipped[0].source_row, 1);
    }
}
