//! Persistence gateway
//!
//! The loan service only talks to storage through [`LoanStore`] and the
//! [`UnitOfWork`] it hands out. A unit of work is one database transaction:
//! `get_loan_for_update` takes an exclusive lock on the loan row that is held
//! until the unit of work is committed or dropped. Dropping it without
//! calling [`UnitOfWork::commit`] discards every write made through it.

mod memory;
mod postgres;

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::loan::{Approval, Disbursement, Investment, Loan, LoanState};

pub const DEFAULT_LIST_LIMIT: i64 = 10;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Gateway errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter for listing loans, already normalised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanFilter {
    pub state: Option<LoanState>,
    pub limit: i64,
    pub offset: i64,
}

impl LoanFilter {
    /// Clamp raw paging values: non-positive or missing limits fall back to
    /// the default, oversized limits are capped, negative offsets become 0.
    pub fn new(state: Option<LoanState>, limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(MAX_LIST_LIMIT),
            _ => DEFAULT_LIST_LIMIT,
        };
        Self {
            state,
            limit,
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for LoanFilter {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// One page of loans plus the number of loans matching the filter
#[derive(Debug, Clone)]
pub struct LoanPage {
    pub loans: Vec<Loan>,
    pub total: i64,
}

/// Storage capability consumed by the loan service
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    async fn insert_loan(&self, loan: &Loan) -> StoreResult<()>;
    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>>;
    /// Newest-created first
    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<LoanPage>;

    async fn get_approval(&self, loan_id: Uuid) -> StoreResult<Option<Approval>>;
    async fn get_disbursement(&self, loan_id: Uuid) -> StoreResult<Option<Disbursement>>;

    /// Oldest first
    async fn list_investments(&self, loan_id: Uuid) -> StoreResult<Vec<Investment>>;
    /// Distinct investor ids that funded the loan
    async fn list_investor_ids(&self, loan_id: Uuid) -> StoreResult<Vec<String>>;

    /// Connectivity probe for health checks
    async fn ping(&self) -> StoreResult<()>;
}

/// Transaction-scoped writes against the store
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read the loan and hold an exclusive lock on it until this unit of work ends
    async fn get_loan_for_update(&mut self, id: Uuid) -> StoreResult<Option<Loan>>;
    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()>;
    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()>;
    async fn insert_investment(&mut self, investment: &Investment) -> StoreResult<()>;
    async fn insert_disbursement(&mut self, disbursement: &Disbursement) -> StoreResult<()>;

    /// Make every write visible atomically and release held locks
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
