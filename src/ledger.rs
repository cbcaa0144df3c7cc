//! Ledger reconstruction: scan, decode, enrich, aggregate.

pub mod aggregate;

use std::collections::HashSet;

use tracing::instrument;

use crate::{
    Result,
    input::{
        decode::{decode_incentive_logs, decode_settled_logs},
        scan::{LogSource, RangeScanner},
    },
    ledger::aggregate::{ValuationContext, aggregate},
    metadata::{MetadataResolver, TokenMetadataSource},
    price::PriceLookup,
    settlement::planner::{SettlementPlan, plan},
    types::{
        common::{Address, IncentiveRecord, TokenAmount, VoteRegistry},
        settlement::{SettledLedger, SettledRecord},
        views::IncentiveViews,
    },
};

/// Inputs to one ledger reconstruction.
#[derive(Clone, Copy, Debug)]
pub struct ReconstructOptions<'a> {
    /// The incentive market contract.
    pub market: Address,

    /// First block of the deployment-to-now range to scan, inclusive.
    pub from_block: u64,

    /// Last block to scan, inclusive.
    pub to_block: u64,

    /// The account whose positions and settlements this ledger is scoped to.
    pub connected_user: Address,

    /// Vote rounds by identifier, for resolving deposit choices.
    pub votes: &'a VoteRegistry,

    /// Total units deposited into the vote, for APR.
    pub total_deposited_units: TokenAmount,

    /// Decimals of the deposit token.
    pub deposit_token_decimals: u8,

    /// USD price of one deposit token unit.
    pub deposit_unit_price_usd: f64,
}

/// A fully reconstructed incentive ledger for one connected user.
///
/// Holds the immutable record list plus everything derived from it. Derived state is recomputed
/// from the records, never mutated incrementally, so a reconstruction from the same chain state
/// is always identical.
#[derive(Clone, Debug)]
pub struct Ledger {
    market: Address,
    connected_user: Address,
    records: Vec<IncentiveRecord>,
    unresolved: Vec<IncentiveRecord>,
    settled: SettledLedger,
    views: IncentiveViews,
    winners: HashSet<Address>,
    total_deposited_units: TokenAmount,
    deposit_token_decimals: u8,
    deposit_unit_price_usd: f64,
}

impl Ledger {
    /// Reconstruct the ledger from the chain.
    ///
    /// One scan feeds everything: deposit events become records, claim and refund events become
    /// the settled ledger. Records are deduplicated by their provenance key, so overlapping or
    /// restarted scans cannot double-count. Metadata resolution and valuation never fail the
    /// reconstruction; only an incomplete scan does.
    #[instrument(skip_all, fields(market = %opts.market, from = opts.from_block, to = opts.to_block))]
    pub async fn reconstruct<S, M, P>(
        scanner: &RangeScanner<S>,
        metadata: &MetadataResolver<M>,
        prices: &P,
        opts: ReconstructOptions<'_>,
    ) -> Result<Self>
    where
        S: LogSource,
        M: TokenMetadataSource,
        P: PriceLookup,
    {
        let logs = scanner
            .scan(opts.market, opts.from_block, opts.to_block)
            .await?;
        tracing::info!(logs = logs.len(), "scanned incentive market history");

        let outcome = decode_incentive_logs(&logs, opts.votes);
        let settled =
            SettledLedger::from_records(decode_settled_logs(&logs, opts.connected_user));

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(outcome.records.len());
        for record in outcome.records {
            if seen.insert(record.dedup_key()) {
                records.push(record);
            }
        }

        let tokens = metadata
            .resolve(records.iter().map(|record| record.incentive_token))
            .await;
        for record in &mut records {
            record.token_meta = tokens.get(&record.incentive_token).cloned();
        }

        let mut ledger = Self {
            market: opts.market,
            connected_user: opts.connected_user,
            records,
            unresolved: outcome.unresolved,
            settled,
            views: IncentiveViews::default(),
            winners: HashSet::new(),
            total_deposited_units: opts.total_deposited_units,
            deposit_token_decimals: opts.deposit_token_decimals,
            deposit_unit_price_usd: opts.deposit_unit_price_usd,
        };
        ledger.revalue(prices);
        Ok(ledger)
    }

    /// Rebuild both views from the record list with a (possibly new) price table.
    pub fn revalue<P: PriceLookup>(&mut self, prices: &P) {
        let ctx = ValuationContext {
            prices,
            total_deposited_units: self.total_deposited_units,
            deposit_token_decimals: self.deposit_token_decimals,
            deposit_unit_price_usd: self.deposit_unit_price_usd,
        };
        self.views = aggregate(&self.records, &ctx, self.connected_user);
    }

    /// Set the vote outcome, determining which positions are claims and which are refunds.
    pub fn set_winners(&mut self, winners: impl IntoIterator<Item = Address>) {
        self.winners = winners.into_iter().collect();
    }

    /// Plan the connected user's pending settlements from the current views, winners, and
    /// settled ledger.
    pub fn plan(&self) -> SettlementPlan {
        plan(
            self.market,
            self.connected_user,
            self.views.by_user.values(),
            &self.winners,
            &self.settled,
        )
    }

    /// Fold freshly observed settlements in, so the next plan excludes them.
    pub fn apply_settled(&mut self, records: impl IntoIterator<Item = SettledRecord>) {
        self.settled.extend(records);
    }

    pub fn views(&self) -> &IncentiveViews {
        &self.views
    }

    pub fn records(&self) -> &[IncentiveRecord] {
        &self.records
    }

    /// Records excluded from every view because their choice could not be resolved.
    pub fn unresolved(&self) -> &[IncentiveRecord] {
        &self.unresolved
    }

    pub fn settled(&self) -> &SettledLedger {
        &self.settled
    }

    /// The distinct incentive tokens across all records, for price lookups.
    pub fn tokens(&self) -> Vec<Address> {
        let mut tokens = self
            .records
            .iter()
            .map(|record| record.incentive_token)
            .collect::<Vec<_>>();
        tokens.sort();
        tokens.dedup();
        tokens
    }
}
