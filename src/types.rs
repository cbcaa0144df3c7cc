//! Data model for the incentive ledger.

pub mod common;
pub mod settlement;
pub mod views;
