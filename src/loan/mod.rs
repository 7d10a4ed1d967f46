//! Loan domain module
//!
//! Contains the entity models, the lifecycle engine, domain errors and the
//! orchestration service.

mod error;
pub mod lifecycle;
mod model;
mod service;

pub use error::{LoanError, LoanResult};
pub use lifecycle::can_transition;
pub use model::*;
pub use service::LoanService;
