//! API route handlers.

pub mod auth;
pub mod rates;
pub mod wallet;
