use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::error::{AnalysisError, Conflict, InvalidInput};
use crate::materializer::DefinitionOutcome;
use crate::models::*;

// ============================================================
// Error Handling
// ============================================================

/// Map a store error to a response. Uniqueness and validation failures are
/// reported to the client; anything else is logged and returned as a generic
/// 500 so internal details do not leak.
fn internal_error(e: anyhow::Error) -> (StatusCode, String) {
    if let Some(conflict) = e.downcast_ref::<Conflict>() {
        tracing::warn!("Conflict: {}", conflict);
        return (StatusCode::CONFLICT, conflict.to_string());
    }
    if let Some(invalid) = e.downcast_ref::<InvalidInput>() {
        tracing::warn!("Validation error: {}", invalid);
        return (StatusCode::BAD_REQUEST, invalid.to_string());
    }
    if let Some(invalid) = e.downcast_ref::<PeriodError>() {
        tracing::warn!("Validation error: {}", invalid);
        return (StatusCode::BAD_REQUEST, invalid.to_string());
    }

    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn analysis_error(e: AnalysisError) -> (StatusCode, String) {
    match e {
        AnalysisError::ConfigurationNotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
        AnalysisError::Internal(e) => internal_error(e),
    }
}

fn parse_period(year: i32, month: u32) -> Result<Period, (StatusCode, String)> {
    Period::new(year, month).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Categories
// ============================================================

pub async fn list_categories(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Category>>, (StatusCode, String)> {
    state
        .db
        .list_categories(user_id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_category(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    if input.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Category name is required".to_string()));
    }
    state
        .db
        .create_category(user_id, input)
        .map(|c| (StatusCode::CREATED, Json(c)))
        .map_err(internal_error)
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.db.delete_category(user_id, id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Category"))
    }
}

// ============================================================
// Transactions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, (StatusCode, String)> {
    let period = match (query.year, query.month) {
        (Some(year), Some(month)) => Some(parse_period(year, month)?),
        (None, None) => None,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "year and month must be given together".to_string(),
            ))
        }
    };

    state
        .db
        .list_transactions(user_id, period)
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Transaction>, (StatusCode, String)> {
    state
        .db
        .get_transaction(user_id, id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Transaction"))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateTransactionInput>,
) -> Result<(StatusCode, Json<Transaction>), (StatusCode, String)> {
    state
        .db
        .create_transaction(user_id, input)
        .map(|t| (StatusCode::CREATED, Json(t)))
        .map_err(internal_error)
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateTransactionInput>,
) -> Result<Json<Transaction>, (StatusCode, String)> {
    state
        .db
        .update_transaction(user_id, id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Transaction"))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.db.delete_transaction(user_id, id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Transaction"))
    }
}

// ============================================================
// Fixed Transactions
// ============================================================

pub async fn list_fixed_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<FixedTransaction>>, (StatusCode, String)> {
    state
        .db
        .list_fixed_transactions(user_id)
        .map(Json)
        .map_err(internal_error)
}

/// Creates the fixed transaction and books it for the current month. A
/// failure to book is logged only; the next catch-up or monthly run repairs it.
pub async fn create_fixed_transaction(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateFixedTransactionInput>,
) -> Result<(StatusCode, Json<FixedTransaction>), (StatusCode, String)> {
    if input.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Fixed transaction name is required".to_string(),
        ));
    }

    let fixed = state
        .db
        .create_fixed_transaction(user_id, input)
        .map_err(internal_error)?;

    match state.materializer.on_definition_created(&fixed).await {
        Ok(DefinitionOutcome::Created(entry_id)) => {
            tracing::debug!("Booked entry {} for new fixed transaction {}", entry_id, fixed.id);
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(
                "Failed to book new fixed transaction {} for the current month: {:#}",
                fixed.id,
                e
            );
        }
    }

    Ok((StatusCode::CREATED, Json(fixed)))
}

pub async fn update_fixed_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateFixedTransactionInput>,
) -> Result<Json<FixedTransaction>, (StatusCode, String)> {
    state
        .db
        .update_fixed_transaction(user_id, id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Fixed transaction"))
}

/// Removes the entries generated from the fixed transaction, then the fixed
/// transaction itself. Cleanup failures are logged and do not block deletion.
pub async fn delete_fixed_transaction(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let fixed = state
        .db
        .get_fixed_transaction(user_id, id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Fixed transaction"))?;

    if let Err(e) = state.materializer.on_definition_deleted(&fixed) {
        tracing::error!(
            "Failed to remove generated entries of fixed transaction {}: {:#}",
            fixed.id,
            e
        );
    }

    if state
        .db
        .delete_fixed_transaction(user_id, id)
        .map_err(internal_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Fixed transaction"))
    }
}

// ============================================================
// Monthly Budgets
// ============================================================

pub async fn create_budget(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateBudgetInput>,
) -> Result<(StatusCode, Json<MonthlyBudget>), (StatusCode, String)> {
    state
        .db
        .create_budget(user_id, input)
        .map(|b| (StatusCode::CREATED, Json(b)))
        .map_err(internal_error)
}

pub async fn get_budget(
    State(state): State<AppState>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<MonthlyBudget>, (StatusCode, String)> {
    let period = parse_period(year, month)?;
    state
        .db
        .get_budget(user_id, period)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Budget"))
}

pub async fn update_budget(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateBudgetInput>,
) -> Result<Json<MonthlyBudget>, (StatusCode, String)> {
    state
        .db
        .update_budget(user_id, id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Budget"))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.db.delete_budget(user_id, id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Budget"))
    }
}

// ============================================================
// Category Budgets
// ============================================================

pub async fn create_category_budget(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<CreateCategoryBudgetInput>,
) -> Result<(StatusCode, Json<CategoryBudget>), (StatusCode, String)> {
    state
        .db
        .create_category_budget(user_id, input)
        .map(|b| (StatusCode::CREATED, Json(b)))
        .map_err(internal_error)
}

pub async fn list_category_budgets(
    State(state): State<AppState>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<Vec<CategoryBudget>>, (StatusCode, String)> {
    let period = parse_period(year, month)?;
    state
        .db
        .list_category_budgets(user_id, period)
        .map(Json)
        .map_err(internal_error)
}

pub async fn update_category_budget(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateCategoryBudgetInput>,
) -> Result<Json<CategoryBudget>, (StatusCode, String)> {
    state
        .db
        .update_category_budget(user_id, id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Category budget"))
}

pub async fn delete_category_budget(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state
        .db
        .delete_category_budget(user_id, id)
        .map_err(internal_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Category budget"))
    }
}

// ============================================================
// Analysis
// ============================================================

pub async fn get_budget_analysis(
    State(state): State<AppState>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<BudgetAnalysis>, (StatusCode, String)> {
    let period = parse_period(year, month)?;
    state
        .analyzer
        .analyze(user_id, period)
        .map(Json)
        .map_err(analysis_error)
}

pub async fn get_category_budget_analysis(
    State(state): State<AppState>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<Vec<CategoryBudgetAnalysis>>, (StatusCode, String)> {
    let period = parse_period(year, month)?;
    state
        .analyzer
        .analyze_by_category(user_id, period)
        .map(Json)
        .map_err(analysis_error)
}

pub async fn get_remaining_budget(
    State(state): State<AppState>,
    Path((user_id, year, month)): Path<(Uuid, i32, u32)>,
) -> Result<Json<RemainingBudget>, (StatusCode, String)> {
    let period = parse_period(year, month)?;
    state
        .analyzer
        .remaining_budget(user_id, period)
        .map(Json)
        .map_err(analysis_error)
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub months: Option<usize>,
}

const DEFAULT_HISTORY_MONTHS: usize = 6;
const MAX_HISTORY_MONTHS: usize = 120;

pub async fn get_budget_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<BudgetHistory>>, (StatusCode, String)> {
    let months = query.months.unwrap_or(DEFAULT_HISTORY_MONTHS);
    if months == 0 || months > MAX_HISTORY_MONTHS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("months must be between 1 and {}", MAX_HISTORY_MONTHS),
        ));
    }

    state
        .analyzer
        .history(user_id, months)
        .map(Json)
        .map_err(analysis_error)
}

// ============================================================
// Scheduler
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Starts a materialization pass in the background and answers right away.
/// The body is optional; without one the current month is booked.
pub async fn run_scheduler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let request: RunRequest = if body.is_empty() {
        RunRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };

    let period = match (request.year, request.month) {
        (Some(year), Some(month)) => parse_period(year, month)?,
        (None, None) => state.materializer.current_period(),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "year and month must be given together".to_string(),
            ))
        }
    };

    // Detached: the pass logs its own outcome.
    let _ = state.scheduler.trigger_now(Some(period));

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "period": period })),
    ))
}
