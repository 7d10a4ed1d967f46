//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::loan::LoanService;
use crate::storage::DocumentStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub document_store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(loan_service: Arc<LoanService>, document_store: Arc<dyn DocumentStore>) -> Self {
        Self {
            loan_service,
            document_store,
        }
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<dyn DocumentStore> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.document_store.clone()
    }
}
