//! Investor notification dispatch
//!
//! Notifications are fire-and-forget: the dispatcher spawns a detached task
//! after the originating unit of work has committed. Delivery failures are
//! logged per recipient and never reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::store::LoanStore;

/// Outbound channel to a single investor
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_agreement(
        &self,
        investor_id: &str,
        loan_id: Uuid,
        agreement_url: &str,
    ) -> anyhow::Result<()>;
}

/// Notifier that only emits a log event per message
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_agreement(
        &self,
        investor_id: &str,
        loan_id: Uuid,
        agreement_url: &str,
    ) -> anyhow::Result<()> {
        tracing::info!(
            investor_id = %investor_id,
            loan_id = %loan_id,
            agreement_url = %agreement_url,
            "Sending agreement email"
        );
        Ok(())
    }
}

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Fans a document reference out to every investor of a loan
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn LoanStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn LoanStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Spawn the fan-out on a detached task
    pub fn dispatch(&self, loan_id: Uuid, agreement_url: String) -> JoinHandle<DispatchSummary> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.notify_investors(loan_id, &agreement_url).await })
    }

    /// Notify every distinct investor of `loan_id`, isolating failures
    pub async fn notify_investors(&self, loan_id: Uuid, agreement_url: &str) -> DispatchSummary {
        let investors = match self.store.list_investor_ids(loan_id).await {
            Ok(investors) => investors,
            Err(e) => {
                tracing::error!(
                    loan_id = %loan_id,
                    error = %e,
                    "Failed to get investors for notification"
                );
                return DispatchSummary::default();
            }
        };

        let deliveries = investors.iter().map(|investor_id| async move {
            let result = self
                .notifier
                .send_agreement(investor_id, loan_id, agreement_url)
                .await;
            (investor_id, result)
        });

        let mut summary = DispatchSummary::default();
        for (investor_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        investor_id = %investor_id,
                        loan_id = %loan_id,
                        error = %e,
                        "Failed to send email to investor"
                    );
                }
            }
        }

        tracing::info!(
            loan_id = %loan_id,
            sent = summary.sent,
            failed = summary.failed,
            "Investor notification finished"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{Investment, Loan};
    use crate::store::{FailPoint, MemoryStore};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FlakyNotifier {
        failing: Vec<String>,
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send_agreement(
            &self,
            investor_id: &str,
            _loan_id: Uuid,
            _agreement_url: &str,
        ) -> anyhow::Result<()> {
            if self.failing.iter().any(|f| f == investor_id) {
                anyhow::bail!("mailbox for {} is full", investor_id);
            }
            self.delivered.lock().await.push(investor_id.to_string());
            Ok(())
        }
    }

    async fn funded_loan(store: &MemoryStore, investors: &[&str]) -> Uuid {
        let loan = Loan::new("borrower".into(), 1_000, 0.1, 0.1);
        store.insert_loan(&loan).await.unwrap();
        let mut uow = store.begin().await.unwrap();
        for investor in investors {
            uow.insert_investment(&Investment::new(loan.id, investor.to_string(), 10))
                .await
                .unwrap();
        }
        uow.commit().await.unwrap();
        loan.id
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_others() {
        let store = MemoryStore::new();
        let loan_id = funded_loan(&store, &["alice", "bob", "carol", "bob"]).await;

        let notifier = Arc::new(FlakyNotifier {
            failing: vec!["bob".to_string()],
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(Arc::new(store), notifier.clone());

        let summary = dispatcher.notify_investors(loan_id, "http://docs/a.pdf").await;
        assert_eq!(summary, DispatchSummary { sent: 2, failed: 1 });

        let mut delivered = notifier.delivered.lock().await.clone();
        delivered.sort();
        assert_eq!(delivered, vec!["alice".to_string(), "carol".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_runs_detached() {
        let store = MemoryStore::new();
        let loan_id = funded_loan(&store, &["alice"]).await;
        let dispatcher = NotificationDispatcher::new(Arc::new(store), Arc::new(LogNotifier));

        let summary = dispatcher
            .dispatch(loan_id, "http://docs/a.pdf".to_string())
            .await
            .unwrap();
        assert_eq!(summary.sent, 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let store = MemoryStore::new();
        let loan_id = funded_loan(&store, &["alice"]).await;
        store.fail_on(FailPoint::Read).await;
        let dispatcher = NotificationDispatcher::new(Arc::new(store), Arc::new(LogNotifier));

        let summary = dispatcher.notify_investors(loan_id, "http://docs/a.pdf").await;
        assert_eq!(summary, DispatchSummary::default());
    }
}
