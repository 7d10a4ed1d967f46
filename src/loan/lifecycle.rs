//! Loan lifecycle engine
//!
//! Pure state-transition and funding rules over a [`Loan`] value. Nothing in
//! here touches storage; the service applies these rules while it holds the
//! loan's row lock.

use chrono::Utc;

use super::error::{LoanError, LoanResult};
use super::model::{Loan, LoanState};

impl LoanState {
    /// The single state allowed to follow this one
    pub fn next(&self) -> Option<LoanState> {
        match self {
            LoanState::Proposed => Some(LoanState::Approved),
            LoanState::Approved => Some(LoanState::Invested),
            LoanState::Invested => Some(LoanState::Disbursed),
            LoanState::Disbursed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

/// Whether `target` directly follows `current` in the lifecycle chain
pub fn can_transition(current: LoanState, target: LoanState) -> bool {
    current.next() == Some(target)
}

impl Loan {
    pub fn can_transition_to(&self, target: LoanState) -> bool {
        can_transition(self.state, target)
    }

    /// Move to `target`; the loan is left untouched on failure
    pub fn transition_to(&mut self, target: LoanState) -> LoanResult<()> {
        if !self.can_transition_to(target) {
            return Err(LoanError::InvalidStateTransition);
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.principal_amount - self.total_invested
    }

    pub fn is_fully_funded(&self) -> bool {
        self.total_invested >= self.principal_amount
    }

    pub fn can_accept_investment(&self) -> bool {
        self.state == LoanState::Approved
    }

    /// Add `amount` to the funded total without changing state.
    ///
    /// Amounts are never clipped: anything above the remaining capacity is
    /// rejected outright.
    pub fn apply_investment(&mut self, amount: i64) -> LoanResult<()> {
        if !self.can_accept_investment() {
            return Err(LoanError::LoanNotApproved);
        }
        if amount > self.remaining_capacity() {
            return Err(LoanError::InvestmentExceedsLimit);
        }
        self.total_invested += amount;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan_in(state: LoanState, principal: i64, invested: i64) -> Loan {
        let mut loan = Loan::new("borrower-123".to_string(), principal, 0.15, 0.12);
        loan.state = state;
        loan.total_invested = invested;
        loan
    }

    #[test]
    fn test_new_loan_is_proposed() {
        let loan = Loan::new("borrower-123".to_string(), 1_000_000, 0.15, 0.12);
        assert_eq!(loan.borrower_id, "borrower-123");
        assert_eq!(loan.principal_amount, 1_000_000);
        assert_eq!(loan.state, LoanState::Proposed);
        assert_eq!(loan.total_invested, 0);
        assert!(loan.agreement_letter_url.is_none());
    }

    #[test]
    fn test_only_forward_single_step_transitions_allowed() {
        for from in LoanState::ALL {
            for to in LoanState::ALL {
                let expected = matches!(
                    (from, to),
                    (LoanState::Proposed, LoanState::Approved)
                        | (LoanState::Approved, LoanState::Invested)
                        | (LoanState::Invested, LoanState::Disbursed)
                );
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_invalid_transition_leaves_loan_unchanged() {
        let mut loan = loan_in(LoanState::Proposed, 100, 0);
        let before = loan.clone();

        let err = loan.transition_to(LoanState::Disbursed).unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition));
        assert_eq!(loan, before);

        let err = loan.transition_to(LoanState::Proposed).unwrap_err();
        assert!(matches!(err, LoanError::InvalidStateTransition));
        assert_eq!(loan, before);
    }

    #[test]
    fn test_transition_bumps_updated_at() {
        let mut loan = loan_in(LoanState::Proposed, 100, 0);
        let before = loan.updated_at;
        loan.transition_to(LoanState::Approved).unwrap();
        assert_eq!(loan.state, LoanState::Approved);
        assert!(loan.updated_at >= before);
    }

    #[test]
    fn test_disbursed_is_terminal() {
        assert!(LoanState::Disbursed.is_terminal());
        assert!(!LoanState::Invested.is_terminal());
        let mut loan = loan_in(LoanState::Disbursed, 100, 100);
        for target in LoanState::ALL {
            assert!(loan.transition_to(target).is_err());
        }
    }

    #[test]
    fn test_can_accept_investment_only_when_approved() {
        assert!(!loan_in(LoanState::Proposed, 100, 0).can_accept_investment());
        assert!(loan_in(LoanState::Approved, 100, 0).can_accept_investment());
        assert!(!loan_in(LoanState::Invested, 100, 100).can_accept_investment());
        assert!(!loan_in(LoanState::Disbursed, 100, 100).can_accept_investment());
    }

    #[test]
    fn test_apply_investment_accumulates() {
        let mut loan = loan_in(LoanState::Approved, 1_000_000, 0);

        loan.apply_investment(500_000).unwrap();
        assert_eq!(loan.total_invested, 500_000);

        loan.apply_investment(300_000).unwrap();
        assert_eq!(loan.total_invested, 800_000);
        assert_eq!(loan.remaining_capacity(), 200_000);

        let err = loan.apply_investment(300_000).unwrap_err();
        assert!(matches!(err, LoanError::InvestmentExceedsLimit));
        assert_eq!(loan.total_invested, 800_000);
        // Applying does not move the state on its own
        assert_eq!(loan.state, LoanState::Approved);
    }

    #[test]
    fn test_apply_investment_exact_remaining_fills_loan() {
        let mut loan = loan_in(LoanState::Approved, 100, 40);
        loan.apply_investment(60).unwrap();
        assert!(loan.is_fully_funded());
        assert_eq!(loan.remaining_capacity(), 0);
        assert_eq!(loan.state, LoanState::Approved);
    }

    #[test]
    fn test_apply_investment_wrong_state() {
        let mut loan = loan_in(LoanState::Proposed, 1_000_000, 0);
        let err = loan.apply_investment(500_000).unwrap_err();
        assert!(matches!(err, LoanError::LoanNotApproved));
        assert_eq!(loan.total_invested, 0);
    }

    #[test]
    fn test_is_fully_funded() {
        let mut loan = loan_in(LoanState::Approved, 1_000_000, 500_000);
        assert!(!loan.is_fully_funded());
        loan.total_invested = 1_000_000;
        assert!(loan.is_fully_funded());
    }

    #[test]
    fn test_remaining_capacity() {
        let loan = loan_in(LoanState::Approved, 1_000_000, 300_000);
        assert_eq!(loan.remaining_capacity(), 700_000);
    }

    #[test]
    fn test_state_parse_and_display() {
        assert_eq!(LoanState::parse("APPROVED"), Some(LoanState::Approved));
        assert_eq!(LoanState::parse(" invested "), Some(LoanState::Invested));
        assert_eq!(LoanState::parse("cancelled"), None);
        assert_eq!(LoanState::Disbursed.to_string(), "disbursed");
        assert_eq!(
            serde_json::to_string(&LoanState::Proposed).unwrap(),
            "\"proposed\""
        );
    }
}
