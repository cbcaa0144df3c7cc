//! Planning and executing claim and refund settlements.

pub mod executor;
pub mod planner;
