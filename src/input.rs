//! Input data from the chain.

pub mod decode;
pub mod options;
pub mod provider;
pub mod scan;
pub mod testing;
