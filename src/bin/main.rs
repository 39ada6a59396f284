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

use cashflow_engine_rs::card::import;
use cashflow_engine_rs::{
    AmortizationSystem, CardId, Month, NewFinancing, NewVigency, Planner, Preferences,
    init_tracing,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tracing::info;

/// Cash-flow engine - Inspect schedules and card statements
///
/// Computes financing schedules and previews card statement imports,
/// writing CSV to stdout.
#[derive(Parser, Debug)]
#[command(name = "cashflow")]
#[command(about = "Financing schedules and card statement previews as CSV", long_about = None)]
struct Args {
    /// Preferences file (JSON); defaults apply to missing fields
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the schedule a financing contract would produce
    ///
    /// Example: cashflow schedule --principal 100000 --term 10 --rate 0.12 --first 2026-01-15
    Schedule {
        #[arg(long, value_enum, default_value_t = SystemArg::Sac)]
        system: SystemArg,
        #[arg(long)]
        principal: Decimal,
        /// Term in months
        #[arg(long)]
        term: u32,
        /// Nominal annual rate as a fraction (0.12 for 12%)
        #[arg(long)]
        rate: Decimal,
        /// Due date of the first parcel (YYYY-MM-DD)
        #[arg(long)]
        first: NaiveDate,
        #[arg(long, default_value_t = Decimal::ZERO)]
        admin_fee: Decimal,
        /// Flat monthly insurance from the first parcel on
        #[arg(long)]
        insurance: Option<Decimal>,
    },
    /// Parse a card statement and print the rows an import would write
    ///
    /// Expected columns: date,description,amount
    ImportPreview {
        #[arg(long)]
        card: u64,
        /// Competence installments are counted from (YYYY-MM)
        #[arg(long)]
        base: Month,
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SystemArg {
    Sac,
    Price,
    Straight,
}

impl From<SystemArg> for AmortizationSystem {
    fn from(arg: SystemArg) -> Self {
        match arg {
            SystemArg::Sac => AmortizationSystem::Sac,
            SystemArg::Price => AmortizationSystem::Price,
            SystemArg::Straight => AmortizationSystem::Straight,
        }
    }
}

/// Flat CSV record of a preview row.
#[derive(Debug, Serialize)]
struct PreviewRecord {
    source_row: usize,
    competence: Month,
    purchase_date: NaiveDate,
    description: String,
    installment: String,
    amount: Decimal,
    compra_id: String,
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let preferences = match &args.config {
        Some(path) => match Preferences::load(path) {
            Ok(prefs) => prefs,
            Err(e) => {
                eprintln!("Error loading '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Preferences::default(),
    };

    let result = match args.command {
        Command::Schedule {
            system,
            principal,
            term,
            rate,
            first,
            admin_fee,
            insurance,
        } => {
            let input = NewFinancing {
                description: "schedule".into(),
                category_id: None,
                system: system.into(),
                principal,
                term_months: term,
                nominal_annual_rate: rate,
                index_name: None,
                contract_date: first,
                first_parcel_date: first,
                fixed_admin_fee: admin_fee,
                insurance_vigencies: insurance
                    .map(|value| NewVigency {
                        start_month: Month::of(first),
                        monthly_value: value,
                        notes: None,
                    })
                    .into_iter()
                    .collect(),
            };
            write_schedule(&Planner::new(preferences), &input, std::io::stdout())
        }
        Command::ImportPreview { card, base, input } => {
            write_preview(CardId(card), base, &input, std::io::stdout())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Writes the previewed schedule of `input` as CSV.
///
/// # CSV Format
///
/// Columns: `number, due_date, outstanding_before, index_correction,
/// amortization, interest, insurance, admin_fee, total_planned,
/// outstanding_after`
fn write_schedule<W: Write>(
    planner: &Planner,
    input: &NewFinancing,
    output: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let drafts = planner.preview_financing(input)?;
    let mut writer = Writer::from_writer(output);
    for draft in &drafts {
        writer.serialize(draft)?;
    }
    writer.flush()?;
    info!(parcels = drafts.len(), "schedule written");
    Ok(())
}

/// Writes the import preview of a statement file as CSV.
///
/// Rows the parser could not read are reported on stderr.
fn write_preview<W: Write>(
    card: CardId,
    base: Month,
    path: &PathBuf,
    output: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read_to_string(path)?;
    let preview = import::parse_statement(card, base, None, &data)?;
    let mut writer = Writer::from_writer(output);
    for row in &preview.rows {
        writer.serialize(PreviewRecord {
            source_row: row.source_row,
            competence: row.competence,
            purchase_date: row.purchase_date,
            description: row.description.clone(),
            installment: row
                .installment
                .map(|i| format!("{}/{}", i.number, i.of))
                .unwrap_or_default(),
            amount: row.amount,
            compra_id: row.compra_id.to_string(),
        })?;
    }
    writer.flush()?;
    for skipped in &preview.skipped {
        eprintln!("Skipped row {}: {}", skipped.source_row, skipped.reason);
    }
    Ok(())
}
