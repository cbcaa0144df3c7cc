pub mod contract;
pub mod error;
pub mod input;
pub mod ledger;
pub mod metadata;
pub mod metrics;
pub mod price;
pub mod settlement;
pub mod types;

pub use error::{Error, Result};
