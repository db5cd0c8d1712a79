use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CreateExpenseRequest, ListExpensesQuery, UpdateExpenseRequest},
    repo_types::Expense,
    services,
};
use crate::{
    auth::{dto::MessageResponse, jwt::AuthUser},
    error::ApiError,
    state::AppState,
};

pub fn expense_routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", post(create_expense).get(list_expenses))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
}

#[instrument(skip(state, payload))]
pub async fn create_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateExpenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let Json(payload) = payload?;
    let expense = services::create(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

#[instrument(skip(state))]
pub async fn list_expenses(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListExpensesQuery>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let expenses = services::list(&state, user_id, query).await?;
    Ok(Json(expenses))
}

#[instrument(skip(state, payload))]
pub async fn update_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateExpenseRequest>, JsonRejection>,
) -> Result<Json<Expense>, ApiError> {
    let Json(payload) = payload?;
    let expense = services::update(&state, user_id, &id, payload).await?;
    Ok(Json(expense))
}

#[instrument(skip(state))]
pub async fn delete_expense(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    services::delete(&state, user_id, &id).await?;
    Ok(Json(MessageResponse::new("Expense deleted successfully")))
}
