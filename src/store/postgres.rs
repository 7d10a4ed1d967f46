//! PostgreSQL loan store

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{LoanFilter, LoanPage, LoanStore, StoreError, StoreResult, UnitOfWork};
use crate::loan::{Approval, Disbursement, Investment, Loan};

const LOAN_COLUMNS: &str = "id, borrower_id, principal_amount, rate, roi, state, \
     agreement_letter_url, total_invested, created_at, updated_at";

/// Loan store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(db_err.message().to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn push_state_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    if let Some(state) = filter.state {
        builder.push(" WHERE state = ");
        builder.push_bind(state);
    }
}

#[async_trait]
impl LoanStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.db_pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn insert_loan(&self, loan: &Loan) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id, borrower_id, principal_amount, rate, roi, state,
                agreement_letter_url, total_invested, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(loan.id)
        .bind(&loan.borrower_id)
        .bind(loan.principal_amount)
        .bind(loan.rate)
        .bind(loan.roi)
        .bind(loan.state)
        .bind(&loan.agreement_letter_url)
        .bind(loan.total_invested)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&self.db_pool)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(loan)
    }

    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<LoanPage> {
        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM loans");
        push_state_filter(&mut count_query, filter);
        let (total,) = count_query
            .build_query_as::<(i64,)>()
            .fetch_one(&self.db_pool)
            .await?;

        let mut list_query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM loans", LOAN_COLUMNS));
        push_state_filter(&mut list_query, filter);
        list_query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        list_query.push_bind(filter.limit);
        list_query.push(" OFFSET ");
        list_query.push_bind(filter.offset);

        let loans = list_query
            .build_query_as::<Loan>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(LoanPage { loans, total })
    }

    async fn get_approval(&self, loan_id: Uuid) -> StoreResult<Option<Approval>> {
        let approval = sqlx::query_as::<_, Approval>(
            r#"
            SELECT id, loan_id, field_validator_id, picture_proof_url, approved_at
            FROM approvals
            WHERE loan_id = $1
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(approval)
    }

    async fn get_disbursement(&self, loan_id: Uuid) -> StoreResult<Option<Disbursement>> {
        let disbursement = sqlx::query_as::<_, Disbursement>(
            r#"
            SELECT id, loan_id, field_officer_id, signed_agreement_url, disbursed_at
            FROM disbursements
            WHERE loan_id = $1
            "#,
        )
        .bind(loan_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(disbursement)
    }

    async fn list_investments(&self, loan_id: Uuid) -> StoreResult<Vec<Investment>> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, loan_id, investor_id, amount, created_at
            FROM investments
            WHERE loan_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(investments)
    }

    async fn list_investor_ids(&self, loan_id: Uuid) -> StoreResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT investor_id
            FROM investments
            WHERE loan_id = $1
            GROUP BY investor_id
            ORDER BY MIN(created_at)
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db_pool).await?;
        Ok(())
    }
}

/// Unit of work over one PostgreSQL transaction; rolls back on drop
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn get_loan_for_update(&mut self, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(loan)
    }

    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE loans
            SET state = $2, agreement_letter_url = $3, total_invested = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(loan.state)
        .bind(&loan.agreement_letter_url)
        .bind(loan.total_invested)
        .bind(loan.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approvals (id, loan_id, field_validator_id, picture_proof_url, approved_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(approval.id)
        .bind(approval.loan_id)
        .bind(&approval.field_validator_id)
        .bind(&approval.picture_proof_url)
        .bind(approval.approved_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn insert_investment(&mut self, investment: &Investment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO investments (id, loan_id, investor_id, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(investment.id)
        .bind(investment.loan_id)
        .bind(&investment.investor_id)
        .bind(investment.amount)
        .bind(investment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn insert_disbursement(&mut self, disbursement: &Disbursement) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO disbursements (id, loan_id, field_officer_id, signed_agreement_url, disbursed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(disbursement.id)
        .bind(disbursement.loan_id)
        .bind(&disbursement.field_officer_id)
        .bind(&disbursement.signed_agreement_url)
        .bind(disbursement.disbursed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_write_error)?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
