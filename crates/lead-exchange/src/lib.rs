//! Lead claim and credit ledger engine for the home services marketplace.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;
