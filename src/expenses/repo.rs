use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Expense, ExpenseFilter, ExpensePatch, NewExpense, Owned, Page};

/// Persistence for expense records.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert(&self, new: NewExpense) -> anyhow::Result<Expense>;

    /// Owner's records, newest date first.
    async fn list(
        &self,
        owner: Uuid,
        filter: &ExpenseFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Expense>>;

    /// Apply `patch` if the record exists and belongs to `owner`.
    /// The ownership check and the write are atomic.
    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: ExpensePatch,
    ) -> anyhow::Result<Owned<Expense>>;

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Owned<()>>;
}

#[derive(Clone)]
pub struct PgExpenseStore {
    db: PgPool,
}

impl PgExpenseStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Lock the row and compare its owner. Must run inside a transaction.
async fn check_owner(
    conn: &mut sqlx::PgConnection,
    id: Uuid,
    owner: Uuid,
) -> anyhow::Result<Owned<()>> {
    let row = sqlx::query_as::<_, (Uuid,)>(
        r#"
        SELECT user_id
          FROM expenses
         WHERE id = $1
           FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .context("lock expense")?;

    Ok(match row {
        None => Owned::NotFound,
        Some((user_id,)) if user_id != owner => Owned::Forbidden,
        Some(_) => Owned::Done(()),
    })
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn insert(&self, new: NewExpense) -> anyhow::Result<Expense> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (user_id, amount, category, date, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, amount, category, date, description, created_at, updated_at
            "#,
        )
        .bind(new.user_id)
        .bind(new.amount)
        .bind(&new.category)
        .bind(new.date)
        .bind(&new.description)
        .fetch_one(&self.db)
        .await
        .context("insert expense")?;
        Ok(expense)
    }

    async fn list(
        &self,
        owner: Uuid,
        filter: &ExpenseFilter,
        page: Page,
    ) -> anyhow::Result<Vec<Expense>> {
        let (start, end) = filter.date_range.unzip();
        let rows = sqlx::query_as::<_, Expense>(
            r#"
            SELECT id, user_id, amount, category, date, description, created_at, updated_at
              FROM expenses
             WHERE user_id = $1
               AND ($2::text IS NULL OR category = $2)
               AND ($3::date IS NULL OR date >= $3)
               AND ($4::date IS NULL OR date <= $4)
             ORDER BY date DESC, created_at DESC, id DESC
             LIMIT $5 OFFSET $6
            "#,
        )
        .bind(owner)
        .bind(&filter.category)
        .bind(start)
        .bind(end)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.db)
        .await
        .context("list expenses")?;
        Ok(rows)
    }

    async fn update_owned(
        &self,
        id: Uuid,
        owner: Uuid,
        patch: ExpensePatch,
    ) -> anyhow::Result<Owned<Expense>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        match check_owner(&mut *tx, id, owner).await? {
            Owned::Done(()) => {}
            Owned::NotFound => return Ok(Owned::NotFound),
            Owned::Forbidden => return Ok(Owned::Forbidden),
        }

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expenses
               SET amount      = COALESCE($2, amount),
                   category    = COALESCE($3, category),
                   date        = COALESCE($4, date),
                   description = CASE WHEN $6 THEN $5 ELSE description END,
                   updated_at  = now()
             WHERE id = $1
            RETURNING id, user_id, amount, category, date, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.amount)
        .bind(&patch.category)
        .bind(patch.date)
        .bind(patch.description.clone().flatten())
        .bind(patch.description.is_some())
        .fetch_one(&mut *tx)
        .await
        .context("update expense")?;

        tx.commit().await.context("commit tx")?;
        Ok(Owned::Done(expense))
    }

    async fn delete_owned(&self, id: Uuid, owner: Uuid) -> anyhow::Result<Owned<()>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let outcome = check_owner(&mut *tx, id, owner).await?;
        if outcome != Owned::Done(()) {
            return Ok(outcome);
        }

        sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete expense")?;

        tx.commit().await.context("commit tx")?;
        Ok(Owned::Done(()))
    }
}
