use std::{fs, path::PathBuf, process::exit};

use alloy::primitives::U256;
use clap::Parser;
use incentive_ledger_service::{
    Error, Result,
    error::ResultExt,
    input::{options::ChainOptions, provider::ChainClient, scan::RangeScanner},
    ledger::{Ledger, ReconstructOptions},
    metadata::MetadataResolver,
    metrics::PrometheusMetrics,
    price::{HttpPriceOracle, StaticPrices},
    types::common::{Address, VoteRegistry},
};
use tracing_subscriber::EnvFilter;

/// Reconstruct a vote-incentive ledger from chain history and plan pending settlements.
#[derive(Debug, Parser)]
struct Options {
    /// Chain client options.
    #[clap(flatten)]
    chain: ChainOptions,

    /// The account whose positions and settlements the ledger is scoped to.
    #[clap(long, env = "INCENTIVE_LEDGER_USER")]
    user: Address,

    /// First block to scan, usually the market's deployment block.
    #[clap(long, env = "INCENTIVE_LEDGER_FROM_BLOCK", default_value = "0")]
    from_block: u64,

    /// Last block to scan. Defaults to the current chain height.
    #[clap(long, env = "INCENTIVE_LEDGER_TO_BLOCK")]
    to_block: Option<u64>,

    /// Path to a JSON file mapping vote identifiers to their rounds and choice lists.
    #[clap(long, env = "INCENTIVE_LEDGER_VOTES")]
    votes: Option<PathBuf>,

    /// Protocols that won the vote. Positions on winners plan as claims, the rest as refunds.
    #[clap(long, env = "INCENTIVE_LEDGER_WINNERS", value_delimiter = ',')]
    winners: Vec<Address>,

    /// Total units deposited into the vote, in the deposit token's native precision.
    #[clap(long, env = "INCENTIVE_LEDGER_TOTAL_DEPOSITED_UNITS", default_value = "0")]
    total_deposited_units: U256,

    /// Decimals of the deposit token.
    #[clap(long, env = "INCENTIVE_LEDGER_DEPOSIT_TOKEN_DECIMALS", default_value = "18")]
    deposit_token_decimals: u8,

    /// USD price of one deposit token unit.
    #[clap(long, env = "INCENTIVE_LEDGER_DEPOSIT_UNIT_PRICE_USD", default_value = "0")]
    deposit_unit_price_usd: f64,
}

impl Options {
    async fn run(self) -> Result<()> {
        let client = ChainClient::new(&self.chain, self.user);
        let to_block = match self.to_block {
            Some(block) => block,
            None => client.latest_block().await?,
        };
        let votes = self.load_votes()?;

        let scanner = RangeScanner::new(client.clone(), self.chain.events_max_block_range);
        let metadata = MetadataResolver::new(client.clone());
        let mut ledger = Ledger::reconstruct(
            &scanner,
            &metadata,
            &StaticPrices::default(),
            ReconstructOptions {
                market: self.chain.market_address,
                from_block: self.from_block,
                to_block,
                connected_user: self.user,
                votes: &votes,
                total_deposited_units: self.total_deposited_units,
                deposit_token_decimals: self.deposit_token_decimals,
                deposit_unit_price_usd: self.deposit_unit_price_usd,
            },
        )
        .await?;

        if let Some(base) = &self.chain.price_oracle {
            // A valuation gap is a data-quality signal, not a fault: on any oracle failure the
            // tokens stay valued at zero and the run continues.
            match self.fetch_prices(base.clone(), &ledger.tokens()).await {
                Ok(prices) => ledger.revalue(&prices),
                Err(err) => {
                    tracing::warn!("price oracle unavailable, valuing tokens at zero: {err:#}");
                }
            }
        }

        let metrics = PrometheusMetrics::default();
        metrics.latest_scanned_block.set(to_block as f64);
        metrics.decoded_records.set(ledger.records().len() as f64);
        metrics
            .unresolved_records
            .set(ledger.unresolved().len() as f64);
        metrics
            .grouped_protocols
            .set(ledger.views().by_protocol.len() as f64);
        metrics.settled_entries.set(ledger.settled().len() as f64);
        tracing::debug!("\n{}", metrics.export());

        ledger.set_winners(self.winners);
        let plan = ledger.plan();
        tracing::info!(
            claimable = plan.claimable.len(),
            claimable_usd = plan.selected_claimable_usd(),
            refundable = plan.refundable.len(),
            refundable_usd = plan.selected_refundable_usd(),
            "settlement plan"
        );

        let views = serde_json::to_string_pretty(ledger.views())
            .context(|| Error::internal().context("serializing views"))?;
        println!("{views}");
        Ok(())
    }

    async fn fetch_prices(&self, base: url::Url, tokens: &[Address]) -> Result<StaticPrices> {
        let oracle = HttpPriceOracle::new(base, self.chain.price_timeout)?;
        oracle.fetch(tokens).await
    }

    fn load_votes(&self) -> Result<VoteRegistry> {
        let Some(path) = &self.votes else {
            return Ok(VoteRegistry::default());
        };
        let raw = fs::read_to_string(path)
            .context(|| Error::bad_request().context(format!("reading {}", path.display())))?;
        serde_json::from_str(&raw)
            .context(|| Error::bad_request().context(format!("parsing {}", path.display())))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Options::parse();
    if let Err(err) = opt.run().await {
        eprintln!("service failed: {err:#}");
        exit(1);
    }
}
