//! Middleware for the lending API
//!
//! Request tracing and security headers.

mod security;
mod tracing;

pub use security::{hsts_header, security_headers};
pub use self::tracing::request_tracing;
