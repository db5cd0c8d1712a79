use tracing::{info, warn};
use uuid::Uuid;

use super::{
    date,
    dto::{CreateExpenseRequest, ListExpensesQuery, UpdateExpenseRequest},
    repo_types::{Expense, ExpenseFilter, ExpensePatch, NewExpense, Owned, Page},
};
use crate::{
    error::{ApiError, FieldError},
    state::AppState,
};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

const NOT_FOUND: &str = "Expense not found";

fn check_amount(amount: f64, errors: &mut Vec<FieldError>) {
    if !amount.is_finite() || amount <= 0.0 {
        errors.push(FieldError::new("amount", "Amount must be a positive number"));
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validation(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn parse_number(raw: Option<&str>, field: &'static str, default: i64) -> Result<i64, FieldError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| FieldError::new(field, format!("{field} must be an integer"))),
    }
}

/// Ids that are not UUIDs cannot exist, so they are reported as missing.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(NOT_FOUND))
}

pub async fn create(
    state: &AppState,
    owner: Uuid,
    req: CreateExpenseRequest,
) -> Result<Expense, ApiError> {
    let mut errors = Vec::new();

    match req.amount {
        None => errors.push(FieldError::new("amount", "Amount is required")),
        Some(amount) => check_amount(amount, &mut errors),
    }
    let category = non_blank(req.category);
    if category.is_none() {
        errors.push(FieldError::new("category", "Category is required"));
    }
    let day = match non_blank(req.date) {
        None => {
            errors.push(FieldError::new("date", "Date is required"));
            None
        }
        Some(raw) => {
            let parsed = date::parse(&raw);
            if parsed.is_none() {
                errors.push(FieldError::new("date", "Date must be YYYY-MM-DD"));
            }
            parsed
        }
    };
    let (amount, category, day) = match (req.amount, category, day) {
        (Some(amount), Some(category), Some(day)) if errors.is_empty() => (amount, category, day),
        _ => return Err(ApiError::Validation(errors)),
    };

    let expense = state
        .expenses
        .insert(NewExpense {
            user_id: owner,
            amount,
            category,
            date: day,
            description: req.description,
        })
        .await?;
    info!(expense_id = %expense.id, user_id = %owner, "expense created");
    Ok(expense)
}

pub async fn list(
    state: &AppState,
    owner: Uuid,
    query: ListExpensesQuery,
) -> Result<Vec<Expense>, ApiError> {
    let mut errors = Vec::new();

    let page = parse_number(query.page.as_deref(), "page", 1).unwrap_or_else(|e| {
        errors.push(e);
        1
    });
    let limit = parse_number(query.limit.as_deref(), "limit", DEFAULT_LIMIT).unwrap_or_else(|e| {
        errors.push(e);
        DEFAULT_LIMIT
    });

    let mut bound = |raw: Option<String>, field: &'static str| {
        let raw = non_blank(raw)?;
        let parsed = date::parse(&raw);
        if parsed.is_none() {
            errors.push(FieldError::new(field, "Date must be YYYY-MM-DD"));
        }
        parsed
    };
    let start = bound(query.start_date, "startDate");
    let end = bound(query.end_date, "endDate");
    validation(errors)?;

    let filter = ExpenseFilter {
        category: non_blank(query.category),
        // A range only applies when both ends are given.
        date_range: start.zip(end),
    };
    let page = Page {
        page: page.max(1),
        limit: limit.clamp(1, MAX_LIMIT),
    };

    let expenses = state.expenses.list(owner, &filter, page).await?;
    Ok(expenses)
}

pub async fn update(
    state: &AppState,
    owner: Uuid,
    id: &str,
    req: UpdateExpenseRequest,
) -> Result<Expense, ApiError> {
    let id = parse_id(id)?;

    let mut errors = Vec::new();
    if let Some(amount) = req.amount {
        check_amount(amount, &mut errors);
    }
    if matches!(&req.category, Some(c) if c.trim().is_empty()) {
        errors.push(FieldError::new("category", "Category cannot be empty"));
    }
    let day = match req.date.as_deref() {
        None => None,
        Some(raw) => {
            let parsed = date::parse(raw);
            if parsed.is_none() {
                errors.push(FieldError::new("date", "Date must be YYYY-MM-DD"));
            }
            parsed
        }
    };
    validation(errors)?;

    let patch = ExpensePatch {
        amount: req.amount,
        category: req.category.map(|c| c.trim().to_string()),
        date: day,
        description: req.description,
    };

    match state.expenses.update_owned(id, owner, patch).await? {
        Owned::Done(expense) => {
            info!(expense_id = %id, user_id = %owner, "expense updated");
            Ok(expense)
        }
        Owned::NotFound => Err(ApiError::NotFound(NOT_FOUND)),
        Owned::Forbidden => {
            warn!(expense_id = %id, user_id = %owner, "update of foreign expense");
            Err(ApiError::Forbidden("Not authorized to update this expense"))
        }
    }
}

pub async fn delete(state: &AppState, owner: Uuid, id: &str) -> Result<(), ApiError> {
    let id = parse_id(id)?;

    match state.expenses.delete_owned(id, owner).await? {
        Owned::Done(()) => {
            info!(expense_id = %id, user_id = %owner, "expense deleted");
            Ok(())
        }
        Owned::NotFound => Err(ApiError::NotFound(NOT_FOUND)),
        Owned::Forbidden => {
            warn!(expense_id = %id, user_id = %owner, "delete of foreign expense");
            Err(ApiError::Forbidden("Not authorized to delete this expense"))
        }
    }
}
