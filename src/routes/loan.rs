//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/loans", get(list_loans).post(create_loan))
        .route("/api/v1/loans/:id", get(get_loan))
        .route("/api/v1/loans/:id/approve", post(approve_loan))
        .route("/api/v1/loans/:id/approval", get(get_approval))
        .route(
            "/api/v1/loans/:id/investments",
            get(list_investments).post(add_investment),
        )
        .route("/api/v1/loans/:id/disburse", post(disburse_loan))
        .route("/api/v1/loans/:id/disbursement", get(get_disbursement))
}
