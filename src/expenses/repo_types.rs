use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::date;

/// Expense record as stored and returned to the owner.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    #[serde(rename = "user")]
    pub user_id: Uuid, // owner, fixed at creation
    pub amount: f64,
    pub category: String,
    #[serde(serialize_with = "date::serialize")]
    pub date: Date,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: Uuid,
    pub amount: f64,
    pub category: String,
    pub date: Date,
    pub description: Option<String>,
}

/// Partial update. `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub date: Option<Date>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub category: Option<String>,
    /// Inclusive on both ends.
    pub date_range: Option<(Date, Date)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Rows to skip. Saturates on huge page numbers.
    pub fn offset(&self) -> i64 {
        self.page.saturating_sub(1).max(0).saturating_mul(self.limit)
    }
}

/// Outcome of a mutation that is only allowed for the record's owner.
#[derive(Debug, PartialEq)]
pub enum Owned<T> {
    Done(T),
    NotFound,
    Forbidden,
}
