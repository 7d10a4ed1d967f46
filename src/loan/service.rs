//! Loan service layer - orchestrates the lifecycle engine over the store
//!
//! Every mutating operation runs inside one unit of work that locks the loan
//! row first and commits last. Any early return drops the unit of work, which
//! rolls back its writes and releases the lock.

use std::sync::Arc;

use uuid::Uuid;

use super::error::{LoanError, LoanResult};
use super::model::{Approval, Disbursement, Investment, Loan, LoanState};
use crate::notification::{NotificationDispatcher, Notifier};
use crate::store::{LoanFilter, LoanPage, LoanStore};

/// Loan service for managing the loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn LoanStore>,
    dispatcher: NotificationDispatcher,
}

fn require_identity(field: &str, value: &str) -> LoanResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoanError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(field: &str, value: f64) -> LoanResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(LoanError::Validation(format!(
            "{} must be a non-negative number",
            field
        )));
    }
    Ok(())
}

impl LoanService {
    pub fn new(store: Arc<dyn LoanStore>, notifier: Arc<dyn Notifier>) -> Self {
        let dispatcher = NotificationDispatcher::new(store.clone(), notifier);
        Self { store, dispatcher }
    }

    /// Check storage connectivity
    pub async fn is_healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }

    /// Propose a new loan
    pub async fn create_loan(
        &self,
        borrower_id: &str,
        principal_amount: i64,
        rate: f64,
        roi: f64,
    ) -> LoanResult<Loan> {
        if principal_amount <= 0 {
            return Err(LoanError::InvalidAmount);
        }
        let borrower_id = require_identity("borrower_id", borrower_id)?;
        require_non_negative("rate", rate)?;
        require_non_negative("roi", roi)?;

        let loan = Loan::new(borrower_id, principal_amount, rate, roi);
        self.store.insert_loan(&loan).await?;

        tracing::info!(
            loan_id = %loan.id,
            borrower_id = %loan.borrower_id,
            principal = loan.principal_amount,
            "Loan created"
        );

        Ok(loan)
    }

    /// Get loan by ID
    pub async fn get_loan(&self, id: Uuid) -> LoanResult<Loan> {
        self.store
            .get_loan(id)
            .await?
            .ok_or(LoanError::LoanNotFound)
    }

    /// List loans, newest first
    pub async fn list_loans(&self, filter: LoanFilter) -> LoanResult<LoanPage> {
        Ok(self.store.list_loans(&filter).await?)
    }

    /// Approve a proposed loan on the strength of a field validator's proof
    pub async fn approve_loan(
        &self,
        loan_id: Uuid,
        field_validator_id: &str,
        picture_proof_url: &str,
    ) -> LoanResult<Loan> {
        let field_validator_id = require_identity("field_validator_id", field_validator_id)?;
        let picture_proof_url = require_identity("picture_proof", picture_proof_url)?;

        let mut uow = self.store.begin().await?;

        let mut loan = uow
            .get_loan_for_update(loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound)?;

        if loan.state != LoanState::Proposed {
            return Err(LoanError::LoanAlreadyApproved);
        }
        loan.transition_to(LoanState::Approved)?;
        uow.update_loan(&loan).await?;

        let approval = Approval::new(loan_id, field_validator_id, picture_proof_url);
        uow.insert_approval(&approval).await?;

        uow.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            field_validator_id = %approval.field_validator_id,
            "Loan approved"
        );

        Ok(loan)
    }

    /// Record an investment, moving the loan to invested once fully funded
    pub async fn add_investment(
        &self,
        loan_id: Uuid,
        investor_id: &str,
        amount: i64,
    ) -> LoanResult<(Loan, Investment)> {
        if amount <= 0 {
            return Err(LoanError::InvalidAmount);
        }
        let investor_id = require_identity("investor_id", investor_id)?;

        let mut uow = self.store.begin().await?;

        // Lock held from this read until commit
        let mut loan = uow
            .get_loan_for_update(loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound)?;

        loan.apply_investment(amount)?;

        let investment = Investment::new(loan_id, investor_id, amount);
        uow.insert_investment(&investment).await?;

        if loan.is_fully_funded() {
            loan.transition_to(LoanState::Invested)?;
        }
        uow.update_loan(&loan).await?;

        uow.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            investor_id = %investment.investor_id,
            amount = amount,
            total_invested = loan.total_invested,
            state = %loan.state,
            "Investment added"
        );

        if loan.is_fully_funded() {
            if let Some(agreement_url) = &loan.agreement_letter_url {
                self.dispatcher.dispatch(loan_id, agreement_url.clone());
            }
        }

        Ok((loan, investment))
    }

    /// Disburse a fully invested loan against a signed agreement
    pub async fn disburse_loan(
        &self,
        loan_id: Uuid,
        field_officer_id: &str,
        signed_agreement_url: &str,
    ) -> LoanResult<Loan> {
        let field_officer_id = require_identity("field_officer_id", field_officer_id)?;
        let signed_agreement_url = require_identity("signed_agreement", signed_agreement_url)?;

        let mut uow = self.store.begin().await?;

        let mut loan = uow
            .get_loan_for_update(loan_id)
            .await?
            .ok_or(LoanError::LoanNotFound)?;

        match loan.state {
            LoanState::Invested => {}
            LoanState::Disbursed => return Err(LoanError::LoanAlreadyDisbursed),
            _ => return Err(LoanError::LoanNotInvested),
        }

        loan.transition_to(LoanState::Disbursed)?;
        loan.agreement_letter_url = Some(signed_agreement_url.clone());
        uow.update_loan(&loan).await?;

        let disbursement = Disbursement::new(loan_id, field_officer_id, signed_agreement_url);
        uow.insert_disbursement(&disbursement).await?;

        uow.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            field_officer_id = %disbursement.field_officer_id,
            "Loan disbursed"
        );

        self.dispatcher
            .dispatch(loan_id, disbursement.signed_agreement_url.clone());

        Ok(loan)
    }

    /// List investments of an existing loan, oldest first
    pub async fn list_investments(&self, loan_id: Uuid) -> LoanResult<Vec<Investment>> {
        self.get_loan(loan_id).await?;
        Ok(self.store.list_investments(loan_id).await?)
    }

    pub async fn get_approval(&self, loan_id: Uuid) -> LoanResult<Approval> {
        self.store
            .get_approval(loan_id)
            .await?
            .ok_or(LoanError::ApprovalNotFound)
    }

    pub async fn get_disbursement(&self, loan_id: Uuid) -> LoanResult<Disbursement> {
        self.store
            .get_disbursement(loan_id)
            .await?
            .ok_or(LoanError::DisbursementNotFound)
    }
}
