//! HTTP middleware.

pub mod client_identity;
pub mod rate_limit;

pub use client_identity::client_identity;
pub use rate_limit::rate_limit_middleware;
