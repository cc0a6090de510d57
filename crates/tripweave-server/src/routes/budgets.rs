use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};

use crate::error::AppResult;
use crate::models::{CallerIdentity, CurrencyRate, DailyBudget, Expense};
use crate::routes::extract::JsonBody;
use crate::routes::AppState;
use crate::services::budget::{self, BudgetInput, BudgetSummary, ExpenseInput, RateInput};

pub async fn summary(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<BudgetSummary>> {
    Ok(Json(budget::budget_summary(&state.db, &caller, &trip_id)?))
}

pub async fn set_day(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<BudgetInput>,
) -> AppResult<Json<DailyBudget>> {
    let budget =
        budget::set_daily_budget(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    Ok(Json(budget))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<Expense>>> {
    Ok(Json(budget::list_expenses(&state.db, &caller, &trip_id)?))
}

pub async fn add_expense(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<ExpenseInput>,
) -> AppResult<(StatusCode, Json<Expense>)> {
    let expense =
        budget::add_expense(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path((trip_id, expense_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    budget::delete_expense(&state.db, state.notifier.as_ref(), &caller, &trip_id, &expense_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/trips/{trip_id}/expenses/csv
pub async fn export_csv(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let csv = budget::export_expenses_csv(&state.db, &caller, &trip_id)?;
    let filename = format!("expenses_{trip_id}.csv");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        csv,
    ))
}

pub async fn list_rates(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
) -> AppResult<Json<Vec<CurrencyRate>>> {
    Ok(Json(budget::list_rates(&state.db, &caller, &trip_id)?))
}

pub async fn set_rate(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(trip_id): Path<String>,
    JsonBody(body): JsonBody<RateInput>,
) -> AppResult<Json<CurrencyRate>> {
    let rate =
        budget::set_currency_rate(&state.db, state.notifier.as_ref(), &caller, &trip_id, body).await?;
    Ok(Json(rate))
}
