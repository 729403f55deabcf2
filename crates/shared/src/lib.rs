//! Shared types and utilities for the walletsync client and the development
//! wallet server.

pub mod amount;
pub mod currency;
pub mod error;
pub mod models;
pub mod protocol;
pub mod rates;

pub use amount::*;
pub use currency::*;
pub use error::*;
pub use models::*;
pub use protocol::*;
pub use rates::*;
