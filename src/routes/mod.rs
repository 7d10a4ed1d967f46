//! Route definitions for the lending API

mod loan;

pub use loan::loan_routes;
