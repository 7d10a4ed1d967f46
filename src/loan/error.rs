//! Loan domain errors

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the lifecycle engine and the loan service
#[derive(Error, Debug)]
pub enum LoanError {
    #[error("loan not found")]
    LoanNotFound,

    #[error("approval not found")]
    ApprovalNotFound,

    #[error("disbursement not found")]
    DisbursementNotFound,

    #[error("invalid state transition")]
    InvalidStateTransition,

    #[error("investment amount exceeds remaining principal")]
    InvestmentExceedsLimit,

    #[error("loan must be in approved state to accept investments")]
    LoanNotApproved,

    #[error("loan must be in invested state to disburse")]
    LoanNotInvested,

    #[error("loan is already approved")]
    LoanAlreadyApproved,

    #[error("loan is already disbursed")]
    LoanAlreadyDisbursed,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl LoanError {
    /// Business-rule violations the caller can see verbatim
    pub fn is_state_guard(&self) -> bool {
        matches!(
            self,
            LoanError::InvalidStateTransition
                | LoanError::InvestmentExceedsLimit
                | LoanError::LoanNotApproved
                | LoanError::LoanNotInvested
                | LoanError::LoanAlreadyApproved
                | LoanError::LoanAlreadyDisbursed
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LoanError::LoanNotFound
                | LoanError::ApprovalNotFound
                | LoanError::DisbursementNotFound
        )
    }
}

pub type LoanResult<T> = Result<T, LoanError>;
