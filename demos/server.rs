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

//! REST API server for the cash-flow planner.
//!
//! Run with: `cargo run --example server`
//!
//! # Example requests
//!
//! ```bash
//! # Create a financing
//! curl -X POST http://localhost:3000/financings \
//!   -H "Content-Type: application/json" \
//!   -d '{"description": "Apartment", "system": "SAC", "principal": "100000",
//!        "term_months": 10, "nominal_annual_rate": "0.12",
//!        "contract_date": "2025-12-01", "first_parcel_date": "2026-01-15"}'
//!
//! # Amortize after the third parcel
//! curl -X POST http://localhost:3000/financings/1/amortizations \
//!   -H "Content-Type: application/json" \
//!   -d '{"date": "2026-03-20", "amount": "20000", "regime": "REDUCE_PARCEL"}'
//!
//! # List a month (materializes recurring bills and invoice stubs)
//! curl "http://localhost:3000/expenses?month=2026-03"
//!
//! # Pay a bill
//! curl -X POST http://localhost:3000/expenses/2/pay \
//!   -H "Content-Type: application/json" \
//!   -d '{"pay_date": "2026-01-15"}'
//! ```

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use cashflow_engine_rs::card::{
    BudgetItem, Card, ChargeReceipt, ImportPreview, ImportReport, UploadInput,
};
use cashflow_engine_rs::financing::{Financing, FinancingView, Vigency};
use cashflow_engine_rs::projection::{
    NewTransportPath, NewVehicle, PostponeOutcome, Prediction, TransportPath, Vehicle,
};
use cashflow_engine_rs::{
    AmortizationInput, Bill, BillId, CardId, EngineError, FinancingId, FinancingUpdate, Month,
    MonthView, NewBill, NewBudgetItem, NewCard, NewCharge, NewFinancing, NewVigency, Notice,
    PaymentInput, PaymentOutcome, Planner, PostponeInput, PredictionId, Preferences, VigencyId,
    VigencyUpdate, init_tracing,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

// === Request/Response DTOs ===

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub month: Month,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexValue {
    pub value: Decimal,
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state containing the planner.
#[derive(Clone)]
pub struct AppState {
    pub planner: Arc<Planner>,
}

// === Error Handling ===

/// Wrapper for converting `EngineError` into HTTP responses.
pub struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(EngineError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.kind().as_str().to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

// === Financings ===

/// POST /financings - Create a contract and its schedule.
async fn create_financing(
    State(state): State<AppState>,
    payload: Result<Json<NewFinancing>, JsonRejection>,
) -> Result<(StatusCode, Json<FinancingView>), AppError> {
    let Json(input) = payload?;
    let view = state.planner.create_financing(input)?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /financings/{id}
async fn get_financing(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<FinancingView> {
    Ok(Json(state.planner.financing(FinancingId(id))?))
}

/// PUT /financings/{id}
async fn update_financing(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<FinancingUpdate>, JsonRejection>,
) -> ApiResult<FinancingView> {
    let Json(input) = payload?;
    Ok(Json(state.planner.update_financing(FinancingId(id), input)?))
}

/// POST /financings/{id}/amortizations
async fn amortize(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<AmortizationInput>, JsonRejection>,
) -> ApiResult<Financing> {
    let Json(input) = payload?;
    Ok(Json(state.planner.amortize(FinancingId(id), input)?))
}

/// POST /financings/{id}/insurance
async fn add_vigency(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<NewVigency>, JsonRejection>,
) -> Result<(StatusCode, Json<Vigency>), AppError> {
    let Json(input) = payload?;
    let vigency = state.planner.add_vigency(FinancingId(id), input)?;
    Ok((StatusCode::CREATED, Json(vigency)))
}

/// PUT /financings/insurance/{vigency_id}
async fn update_vigency(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<VigencyUpdate>, JsonRejection>,
) -> ApiResult<Vigency> {
    let Json(input) = payload?;
    Ok(Json(state.planner.update_vigency(VigencyId(id), input)?))
}

/// DELETE /financings/insurance/{vigency_id} - Always refused.
async fn delete_vigency(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    state.planner.delete_vigency(VigencyId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// === Expenses ===

/// POST /expenses - Create a manual bill.
async fn add_bill(
    State(state): State<AppState>,
    payload: Result<Json<NewBill>, JsonRejection>,
) -> Result<(StatusCode, Json<Bill>), AppError> {
    let Json(input) = payload?;
    Ok((StatusCode::CREATED, Json(state.planner.add_bill(input)?)))
}

/// GET /expenses?month=YYYY-MM
async fn list_month(State(state): State<AppState>, Query(query): Query<MonthQuery>) -> Json<MonthView> {
    Json(state.planner.list_month(query.month))
}

/// POST /expenses/{bill_id}/pay
async fn pay_bill(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<PaymentInput>, JsonRejection>,
) -> ApiResult<PaymentOutcome> {
    let Json(input) = payload?;
    Ok(Json(state.planner.pay_bill(BillId(id), input)?))
}

// === Cards ===

/// POST /cards
async fn create_card(
    State(state): State<AppState>,
    payload: Result<Json<NewCard>, JsonRejection>,
) -> Result<(StatusCode, Json<Card>), AppError> {
    let Json(input) = payload?;
    Ok((StatusCode::CREATED, Json(state.planner.create_card(input)?)))
}

/// POST /cards/{id}/items
async fn add_budget_item(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<NewBudgetItem>, JsonRejection>,
) -> Result<(StatusCode, Json<BudgetItem>), AppError> {
    let Json(input) = payload?;
    let item = state.planner.add_budget_item(CardId(id), input)?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// POST /cards/{id}/charges
async fn add_charge(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<NewCharge>, JsonRejection>,
) -> Result<(StatusCode, Json<ChargeReceipt>), AppError> {
    let Json(input) = payload?;
    let receipt = state.planner.add_charge(CardId(id), input)?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /cards/{id}/invoices/{month}
async fn get_invoice(
    State(state): State<AppState>,
    Path((id, month)): Path<(u64, Month)>,
) -> ApiResult<Bill> {
    Ok(Json(state.planner.invoice(CardId(id), month)?))
}

/// POST /card-imports/upload
async fn import_upload(
    State(state): State<AppState>,
    payload: Result<Json<UploadInput>, JsonRejection>,
) -> ApiResult<ImportPreview> {
    let Json(input) = payload?;
    Ok(Json(state.planner.import_upload(input)?))
}

/// POST /card-imports/commit
async fn import_commit(
    State(state): State<AppState>,
    payload: Result<Json<ImportPreview>, JsonRejection>,
) -> ApiResult<ImportReport> {
    let Json(preview) = payload?;
    Ok(Json(state.planner.import_commit(preview)?))
}

// === Projection ===

/// POST /vehicles
async fn add_vehicle(
    State(state): State<AppState>,
    payload: Result<Json<NewVehicle>, JsonRejection>,
) -> Result<(StatusCode, Json<Vehicle>), AppError> {
    let Json(input) = payload?;
    Ok((StatusCode::CREATED, Json(state.planner.add_vehicle(input)?)))
}

/// POST /transport-paths
async fn add_transport_path(
    State(state): State<AppState>,
    payload: Result<Json<NewTransportPath>, JsonRejection>,
) -> Result<(StatusCode, Json<TransportPath>), AppError> {
    let Json(input) = payload?;
    Ok((StatusCode::CREATED, Json(state.planner.add_transport_path(input)?)))
}

/// GET /predictions?month=YYYY-MM
async fn list_predictions(
    State(state): State<AppState>,
    Query(query): Query<MonthQuery>,
) -> Json<Vec<Prediction>> {
    Json(state.planner.predictions_in(query.month))
}

/// POST /predictions/{id}/confirm
async fn confirm_prediction(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Prediction> {
    Ok(Json(state.planner.confirm_prediction(PredictionId(id))?))
}

/// POST /predictions/{id}/postpone
async fn postpone_prediction(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    payload: Result<Json<PostponeInput>, JsonRejection>,
) -> ApiResult<PostponeOutcome> {
    let Json(input) = payload?;
    Ok(Json(state.planner.postpone_prediction(PredictionId(id), input)?))
}

/// POST /predictions/{id}/ignore
async fn ignore_prediction(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Prediction> {
    Ok(Json(state.planner.ignore_prediction(PredictionId(id))?))
}

// === Operations ===

/// PUT /indices/{name}/{month} - Publish a monthly index value.
async fn publish_index(
    State(state): State<AppState>,
    Path((name, month)): Path<(String, Month)>,
    payload: Result<Json<IndexValue>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(input) = payload?;
    state.planner.publish_index(&name, month, input.value)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /notices - Drain the operator notice queue.
async fn drain_notices(State(state): State<AppState>) -> Json<Vec<Notice>> {
    Json(state.planner.drain_notices())
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/financings", post(create_financing))
        .route("/financings/{id}", get(get_financing).put(update_financing))
        .route("/financings/{id}/amortizations", post(amortize))
        .route("/financings/{id}/insurance", post(add_vigency))
        .route(
            "/financings/insurance/{vigency_id}",
            put(update_vigency).delete(delete_vigency),
        )
        .route("/expenses", get(list_month).post(add_bill))
        .route("/expenses/{bill_id}/pay", post(pay_bill))
        .route("/cards", post(create_card))
        .route("/cards/{id}/items", post(add_budget_item))
        .route("/cards/{id}/charges", post(add_charge))
        .route("/cards/{id}/invoices/{month}", get(get_invoice))
        .route("/card-imports/upload", post(import_upload))
        .route("/card-imports/commit", post(import_commit))
        .route("/vehicles", post(add_vehicle))
        .route("/transport-paths", post(add_transport_path))
        .route("/predictions", get(list_predictions))
        .route("/predictions/{id}/confirm", post(confirm_prediction))
        .route("/predictions/{id}/postpone", post(postpone_prediction))
        .route("/predictions/{id}/ignore", post(ignore_prediction))
        .route("/indices/{name}/{month}", put(publish_index))
        .route("/notices", get(drain_notices))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() {
    init_tracing();
    let preferences = match std::env::var("CASHFLOW_CONFIG") {
        Ok(path) => match Preferences::load(std::path::Path::new(&path)) {
            Ok(prefs) => prefs,
            Err(e) => {
                eprintln!("Error loading '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        Err(_) => Preferences::default(),
    };
    let state = AppState {
        planner: Arc::new(Planner::new(preferences)),
    };

    let app = create_router(state);

    let listener = match TcpListener::bind("127.0.0.1:3000").await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error binding 127.0.0.1:3000: {}", e);
            std::process::exit(1);
        }
    };
    info!("cash-flow API server running on http://127.0.0.1:3000");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
