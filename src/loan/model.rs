//! Loan models and data structures

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Loan lifecycle state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Proposed,
    Approved,
    Invested,
    Disbursed,
}

impl LoanState {
    pub const ALL: [LoanState; 4] = [
        LoanState::Proposed,
        LoanState::Approved,
        LoanState::Invested,
        LoanState::Disbursed,
    ];

    /// Parse a state name, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "proposed" => Some(LoanState::Proposed),
            "approved" => Some(LoanState::Approved),
            "invested" => Some(LoanState::Invested),
            "disbursed" => Some(LoanState::Disbursed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan model (aggregate root)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: String,
    pub principal_amount: i64, // smallest currency unit
    pub rate: f64,
    pub roi: f64,
    pub state: LoanState,
    pub agreement_letter_url: Option<String>,
    pub total_invested: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Build a fresh loan in the proposed state
    pub fn new(borrower_id: String, principal_amount: i64, rate: f64, roi: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            borrower_id,
            principal_amount,
            rate,
            roi,
            state: LoanState::Proposed,
            agreement_letter_url: None,
            total_invested: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Investment model, append-only
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Investment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub investor_id: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl Investment {
    pub fn new(loan_id: Uuid, investor_id: String, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            investor_id,
            amount,
            created_at: Utc::now(),
        }
    }
}

/// Approval model, one per loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Approval {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub field_validator_id: String,
    pub picture_proof_url: String,
    pub approved_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(loan_id: Uuid, field_validator_id: String, picture_proof_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            field_validator_id,
            picture_proof_url,
            approved_at: Utc::now(),
        }
    }
}

/// Disbursement model, one per loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Disbursement {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub field_officer_id: String,
    pub signed_agreement_url: String,
    pub disbursed_at: DateTime<Utc>,
}

impl Disbursement {
    pub fn new(loan_id: Uuid, field_officer_id: String, signed_agreement_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            field_officer_id,
            signed_agreement_url,
            disbursed_at: Utc::now(),
        }
    }
}

/// Request DTO for proposing a loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    #[validate(length(min = 1, message = "borrower_id is required"))]
    pub borrower_id: String,
    pub principal_amount: i64,
    #[validate(range(min = 0.0, message = "rate must not be negative"))]
    pub rate: f64,
    #[validate(range(min = 0.0, message = "roi must not be negative"))]
    pub roi: f64,
}

/// Request DTO for adding an investment
#[derive(Debug, Deserialize, Validate)]
pub struct AddInvestmentRequest {
    #[validate(length(min = 1, message = "investor_id is required"))]
    pub investor_id: String,
    pub amount: i64,
}

/// Query parameters for listing loans
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Loan as returned to API clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoanResponse {
    pub id: Uuid,
    pub borrower_id: String,
    pub principal_amount: i64,
    pub rate: f64,
    pub roi: f64,
    pub state: LoanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement_letter_url: Option<String>,
    pub total_invested: i64,
    pub remaining_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            remaining_amount: loan.remaining_capacity(),
            id: loan.id,
            borrower_id: loan.borrower_id,
            principal_amount: loan.principal_amount,
            rate: loan.rate,
            roi: loan.roi,
            state: loan.state,
            agreement_letter_url: loan.agreement_letter_url,
            total_invested: loan.total_invested,
            created_at: loan.created_at,
            updated_at: loan.updated_at,
        }
    }
}

/// Response DTO for a successful investment
#[derive(Debug, Serialize, Deserialize)]
pub struct InvestmentReceipt {
    pub loan: LoanResponse,
    pub investment: Investment,
}
