//! API handlers

mod health;
mod loan;

pub use health::{health_check, HealthResponse};
pub use loan::*;
