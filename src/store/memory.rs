//! In-memory loan store
//!
//! Row locking is modelled with one async mutex per loan id. A unit of work
//! keeps the owned guards of every loan it locked and buffers its writes;
//! commit applies the buffer under the table lock before the guards drop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LoanFilter, LoanPage, LoanStore, StoreError, StoreResult, UnitOfWork};
use crate::loan::{Approval, Disbursement, Investment, Loan};

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    InsertLoan,
    UpdateLoan,
    InsertApproval,
    InsertInvestment,
    InsertDisbursement,
    Commit,
    Read,
}

#[derive(Default)]
struct Tables {
    loans: HashMap<Uuid, Loan>,
    approvals: HashMap<Uuid, Approval>,
    disbursements: HashMap<Uuid, Disbursement>,
    investments: Vec<Investment>,
}

/// Thread-safe store backed by hash maps, cheap to clone
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    fail_points: Arc<Mutex<HashSet<FailPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call at `point` fail until cleared
    pub async fn fail_on(&self, point: FailPoint) {
        self.fail_points.lock().await.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.fail_points.lock().await.clear();
    }

    /// Number of recorded approvals, used to assert that rejected
    /// operations performed no writes
    pub async fn approval_count(&self) -> usize {
        self.tables.read().await.approvals.len()
    }

    pub async fn disbursement_count(&self) -> usize {
        self.tables.read().await.disbursements.len()
    }

    async fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.fail_points.lock().await.contains(&point) {
            return Err(StoreError::Unavailable(format!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    async fn row_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        locks.entry(id).or_default().clone()
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            store: self.clone(),
            guards: HashMap::new(),
            pending: Vec::new(),
        }))
    }

    async fn insert_loan(&self, loan: &Loan) -> StoreResult<()> {
        self.check(FailPoint::InsertLoan).await?;
        let mut tables = self.tables.write().await;
        if tables.loans.contains_key(&loan.id) {
            return Err(StoreError::Conflict(format!("loan {} already exists", loan.id)));
        }
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        self.check(FailPoint::Read).await?;
        Ok(self.tables.read().await.loans.get(&id).cloned())
    }

    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<LoanPage> {
        self.check(FailPoint::Read).await?;
        let tables = self.tables.read().await;

        let mut matching: Vec<&Loan> = tables
            .loans
            .values()
            .filter(|loan| filter.state.map_or(true, |s| loan.state == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let loans = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(LoanPage { loans, total })
    }

    async fn get_approval(&self, loan_id: Uuid) -> StoreResult<Option<Approval>> {
        self.check(FailPoint::Read).await?;
        Ok(self.tables.read().await.approvals.get(&loan_id).cloned())
    }

    async fn get_disbursement(&self, loan_id: Uuid) -> StoreResult<Option<Disbursement>> {
        self.check(FailPoint::Read).await?;
        Ok(self.tables.read().await.disbursements.get(&loan_id).cloned())
    }

    async fn list_investments(&self, loan_id: Uuid) -> StoreResult<Vec<Investment>> {
        self.check(FailPoint::Read).await?;
        Ok(self
            .tables
            .read()
            .await
            .investments
            .iter()
            .filter(|inv| inv.loan_id == loan_id)
            .cloned()
            .collect())
    }

    async fn list_investor_ids(&self, loan_id: Uuid) -> StoreResult<Vec<String>> {
        self.check(FailPoint::Read).await?;
        let tables = self.tables.read().await;
        let mut seen = HashSet::new();
        Ok(tables
            .investments
            .iter()
            .filter(|inv| inv.loan_id == loan_id)
            .filter(|inv| seen.insert(inv.investor_id.as_str()))
            .map(|inv| inv.investor_id.clone())
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check(FailPoint::Read).await
    }
}

enum PendingWrite {
    Loan(Loan),
    Approval(Approval),
    Investment(Investment),
    Disbursement(Disbursement),
}

struct MemoryUnitOfWork {
    store: MemoryStore,
    guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    pending: Vec<PendingWrite>,
}

impl MemoryUnitOfWork {
    fn pending_loan(&self, id: Uuid) -> Option<&Loan> {
        self.pending.iter().rev().find_map(|write| match write {
            PendingWrite::Loan(loan) if loan.id == id => Some(loan),
            _ => None,
        })
    }

    fn has_pending_approval(&self, loan_id: Uuid) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Approval(a) if a.loan_id == loan_id))
    }

    fn has_pending_disbursement(&self, loan_id: Uuid) -> bool {
        self.pending
            .iter()
            .any(|w| matches!(w, PendingWrite::Disbursement(d) if d.loan_id == loan_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn get_loan_for_update(&mut self, id: Uuid) -> StoreResult<Option<Loan>> {
        self.store.check(FailPoint::Read).await?;
        // Loans are never deleted, so an unknown id needs no lock entry
        if !self.store.tables.read().await.loans.contains_key(&id) {
            return Ok(None);
        }
        if !self.guards.contains_key(&id) {
            let lock = self.store.row_lock(id).await;
            let guard = lock.lock_owned().await;
            self.guards.insert(id, guard);
        }

        if let Some(loan) = self.pending_loan(id) {
            return Ok(Some(loan.clone()));
        }
        Ok(self.store.tables.read().await.loans.get(&id).cloned())
    }

    async fn update_loan(&mut self, loan: &Loan) -> StoreResult<()> {
        self.store.check(FailPoint::UpdateLoan).await?;
        self.pending.push(PendingWrite::Loan(loan.clone()));
        Ok(())
    }

    async fn insert_approval(&mut self, approval: &Approval) -> StoreResult<()> {
        self.store.check(FailPoint::InsertApproval).await?;
        let exists = self
            .store
            .tables
            .read()
            .await
            .approvals
            .contains_key(&approval.loan_id);
        if exists || self.has_pending_approval(approval.loan_id) {
            return Err(StoreError::Conflict(format!(
                "approval for loan {} already exists",
                approval.loan_id
            )));
        }
        self.pending.push(PendingWrite::Approval(approval.clone()));
        Ok(())
    }

    async fn insert_investment(&mut self, investment: &Investment) -> StoreResult<()> {
        self.store.check(FailPoint::InsertInvestment).await?;
        self.pending.push(PendingWrite::Investment(investment.clone()));
        Ok(())
    }

    async fn insert_disbursement(&mut self, disbursement: &Disbursement) -> StoreResult<()> {
        self.store.check(FailPoint::InsertDisbursement).await?;
        let exists = self
            .store
            .tables
            .read()
            .await
            .disbursements
            .contains_key(&disbursement.loan_id);
        if exists || self.has_pending_disbursement(disbursement.loan_id) {
            return Err(StoreError::Conflict(format!(
                "disbursement for loan {} already exists",
                disbursement.loan_id
            )));
        }
        self.pending.push(PendingWrite::Disbursement(disbursement.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.store.check(FailPoint::Commit).await?;

        let MemoryUnitOfWork {
            store,
            guards,
            pending,
        } = *self;

        {
            let mut tables = store.tables.write().await;
            for write in pending {
                match write {
                    PendingWrite::Loan(loan) => {
                        tables.loans.insert(loan.id, loan);
                    }
                    PendingWrite::Approval(approval) => {
                        tables.approvals.insert(approval.loan_id, approval);
                    }
                    PendingWrite::Investment(investment) => {
                        tables.investments.push(investment);
                    }
                    PendingWrite::Disbursement(disbursement) => {
                        tables.disbursements.insert(disbursement.loan_id, disbursement);
                    }
                }
            }
        }

        drop(guards);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::LoanState;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    async fn seeded(store: &MemoryStore) -> Loan {
        let loan = Loan::new("borrower-1".to_string(), 1_000, 0.1, 0.08);
        store.insert_loan(&loan).await.unwrap();
        loan
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        {
            let mut uow = store.begin().await.unwrap();
            let mut locked = uow.get_loan_for_update(loan.id).await.unwrap().unwrap();
            locked.state = LoanState::Approved;
            uow.update_loan(&locked).await.unwrap();
            uow.insert_approval(&Approval::new(loan.id, "v".into(), "p".into()))
                .await
                .unwrap();
        }

        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.state, LoanState::Proposed);
        assert_eq!(store.approval_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        let mut locked = uow.get_loan_for_update(loan.id).await.unwrap().unwrap();
        locked.state = LoanState::Approved;
        uow.update_loan(&locked).await.unwrap();
        uow.insert_approval(&Approval::new(loan.id, "v".into(), "p".into()))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.state, LoanState::Approved);
        assert!(store.get_approval(loan.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_unit_of_work() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        let mut first = store.begin().await.unwrap();
        first.get_loan_for_update(loan.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(StdDuration::from_millis(50), second.get_loan_for_update(loan.id))
                .await;
        assert!(blocked.is_err(), "second lock should wait for the first");

        drop(first);
        let acquired =
            tokio::time::timeout(StdDuration::from_millis(500), second.get_loan_for_update(loan.id))
                .await;
        assert!(acquired.is_ok(), "lock should be released on drop");
    }

    #[tokio::test]
    async fn test_locks_on_different_loans_are_independent() {
        let store = MemoryStore::new();
        let a = seeded(&store).await;
        let b = seeded(&store).await;

        let mut first = store.begin().await.unwrap();
        first.get_loan_for_update(a.id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let res =
            tokio::time::timeout(StdDuration::from_millis(200), second.get_loan_for_update(b.id))
                .await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_ids_do_not_grow_lock_table() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        for _ in 0..1000 {
            assert!(uow.get_loan_for_update(Uuid::new_v4()).await.unwrap().is_none());
        }
        assert!(store.row_locks.lock().await.is_empty());

        uow.get_loan_for_update(loan.id).await.unwrap().unwrap();
        assert_eq!(store.row_locks.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_approval_conflicts() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        uow.insert_approval(&Approval::new(loan.id, "v".into(), "p".into()))
            .await
            .unwrap();
        let err = uow
            .insert_approval(&Approval::new(loan.id, "v2".into(), "p2".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_loans_newest_first_with_paging() {
        let store = MemoryStore::new();
        let base = chrono::Utc::now();
        for i in 0..5 {
            let mut loan = Loan::new(format!("b-{}", i), 100, 0.0, 0.0);
            loan.created_at = base + Duration::seconds(i);
            if i % 2 == 0 {
                loan.state = LoanState::Approved;
            }
            store.insert_loan(&loan).await.unwrap();
        }

        let page = store
            .list_loans(&LoanFilter::new(None, Some(2), Some(1)))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let borrowers: Vec<_> = page.loans.iter().map(|l| l.borrower_id.as_str()).collect();
        assert_eq!(borrowers, vec!["b-3", "b-2"]);

        let approved = store
            .list_loans(&LoanFilter::new(Some(LoanState::Approved), None, None))
            .await
            .unwrap();
        assert_eq!(approved.total, 3);
        assert!(approved.loans.iter().all(|l| l.state == LoanState::Approved));
    }

    #[tokio::test]
    async fn test_investor_ids_are_distinct() {
        let store = MemoryStore::new();
        let loan = seeded(&store).await;

        let mut uow = store.begin().await.unwrap();
        for investor in ["alice", "bob", "alice"] {
            uow.insert_investment(&Investment::new(loan.id, investor.into(), 10))
                .await
                .unwrap();
        }
        uow.commit().await.unwrap();

        let ids = store.list_investor_ids(loan.id).await.unwrap();
        assert_eq!(ids, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(store.list_investments(loan.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_fail_point_injection() {
        let store = MemoryStore::new();
        store.fail_on(FailPoint::InsertLoan).await;
        let loan = Loan::new("b".into(), 10, 0.0, 0.0);
        assert!(matches!(
            store.insert_loan(&loan).await,
            Err(StoreError::Unavailable(_))
        ));
        store.clear_failures().await;
        assert!(store.insert_loan(&loan).await.is_ok());
    }
}
