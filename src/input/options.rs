//! Configuration options for the chain client.

use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::{contract::MULTICALL3_ADDRESS, types::common::Address};

/// Configuration for the chain client.
#[derive(Clone, Debug, Parser)]
pub struct ChainOptions {
    /// HTTP JSON-RPC endpoint of the chain the incentive market lives on.
    #[clap(long, env = "INCENTIVE_LEDGER_L1_HTTP")]
    pub http_provider: Url,

    /// Address of the incentive market contract.
    #[clap(long, env = "INCENTIVE_LEDGER_MARKET_ADDRESS")]
    pub market_address: Address,

    /// Address of the Multicall3 deployment used for batched reads and settlements.
    #[clap(
        long,
        env = "INCENTIVE_LEDGER_MULTICALL_ADDRESS",
        default_value_t = MULTICALL3_ADDRESS,
    )]
    pub multicall_address: Address,

    /// Maximum number of blocks that can be scanned for events in a single query.
    ///
    /// Most RPC providers cap this; the scanner splits the full history into windows of this
    /// size.
    #[clap(
        long,
        env = "INCENTIVE_LEDGER_EVENTS_MAX_BLOCK_RANGE",
        default_value = "10000"
    )]
    pub events_max_block_range: u64,

    /// Base URL of a DefiLlama-compatible price API. If not set, tokens are valued at zero.
    #[clap(long, env = "INCENTIVE_LEDGER_PRICE_ORACLE")]
    pub price_oracle: Option<Url>,

    /// Timeout for price API requests.
    #[clap(
        long,
        env = "INCENTIVE_LEDGER_PRICE_TIMEOUT",
        default_value = "3s",
        value_parser = humantime::parse_duration,
    )]
    pub price_timeout: Duration,
}
