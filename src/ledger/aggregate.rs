//! Folding the flat record list into grouped, USD-valued views.

use std::collections::BTreeMap;

use crate::{
    price::PriceLookup,
    types::{
        common::{Address, IncentiveRecord, TokenAmount},
        views::{ConstituentIncentive, GroupedIncentive, IncentiveViews},
    },
};

/// Vote epochs per year, used to annualize one epoch's incentive value into an APR estimate.
pub const EPOCHS_PER_YEAR: u64 = 26;

/// Everything needed to turn raw token amounts into USD values and APR estimates.
///
/// Passed explicitly into [`aggregate`]: valuation never reads ambient state, so the same
/// records and the same context always produce the same views.
#[derive(Clone, Copy, Debug)]
pub struct ValuationContext<'a, P> {
    /// USD unit prices for incentive tokens.
    pub prices: &'a P,

    /// Total units deposited into the vote, in the deposit token's native precision. The APR
    /// denominator.
    pub total_deposited_units: TokenAmount,

    /// Decimals of the deposit token.
    pub deposit_token_decimals: u8,

    /// USD price of one deposit token unit.
    pub deposit_unit_price_usd: f64,
}

/// Build both grouped views from a flat record list.
///
/// This is a pure fold into fresh maps. The by-protocol view folds every record; the by-user
/// view folds only records deposited by `connected_user`. Records with no aggregation protocol
/// (unresolved targets) never reach this function; the decoder already set them aside.
pub fn aggregate<P: PriceLookup>(
    records: &[IncentiveRecord],
    ctx: &ValuationContext<'_, P>,
    connected_user: Address,
) -> IncentiveViews {
    let mut views = IncentiveViews::default();
    for record in records {
        fold(&mut views.by_protocol, record, ctx);
        if record.depositor == connected_user {
            fold(&mut views.by_user, record, ctx);
        }
    }
    for group in views.by_protocol.values_mut().chain(views.by_user.values_mut()) {
        // Most recent first, for display.
        group.incentives.sort_by(|a, b| b.last_block.cmp(&a.last_block));
    }
    views
}

/// Fold one record into one view.
fn fold<P: PriceLookup>(
    view: &mut BTreeMap<Address, GroupedIncentive>,
    record: &IncentiveRecord,
    ctx: &ValuationContext<'_, P>,
) {
    let Some(protocol) = record.target.protocol() else {
        return;
    };

    let decimals = record
        .token_meta
        .as_ref()
        .map(|meta| meta.decimals)
        .unwrap_or(18);
    let value_usd =
        normalize(record.amount, decimals) * ctx.prices.usd_price(record.incentive_token);

    let group = view.entry(protocol).or_insert_with(|| GroupedIncentive {
        protocol,
        normalized_sum: 0.0,
        estimated_apr: 0.0,
        usd_per_unit: 0.0,
        incentives: Vec::new(),
    });
    match group
        .incentives
        .iter_mut()
        .find(|constituent| constituent.token == record.incentive_token)
    {
        Some(constituent) => {
            constituent.amount += record.amount;
            constituent.value_usd += value_usd;
            constituent.last_block = constituent.last_block.max(record.block_number);
            if constituent.token_meta.is_none() {
                constituent.token_meta = record.token_meta.clone();
            }
        }
        None => group.incentives.push(ConstituentIncentive {
            token: record.incentive_token,
            token_meta: record.token_meta.clone(),
            amount: record.amount,
            value_usd,
            last_block: record.block_number,
        }),
    }

    // Derived figures are recomputed from the running sum on every step, never accumulated on
    // their own, so they cannot drift from the sum they describe.
    group.normalized_sum += value_usd;
    let total = normalize(ctx.total_deposited_units, ctx.deposit_token_decimals);
    group.usd_per_unit = if total == 0.0 {
        0.0
    } else {
        group.normalized_sum / total
    };
    group.estimated_apr = estimated_apr(
        group.normalized_sum,
        total,
        ctx.deposit_unit_price_usd,
    );
}

/// Annualized yield estimate, in percent.
///
/// One epoch's incentive value, scaled to a year, over the USD value of the deposits competing
/// for it. Zero when the denominator is zero (no deposits, or an unpriced deposit token), never
/// infinite or NaN.
pub fn estimated_apr(value_usd: f64, total_units: f64, unit_price_usd: f64) -> f64 {
    let denominator = total_units * unit_price_usd;
    if denominator == 0.0 {
        return 0.0;
    }
    value_usd * EPOCHS_PER_YEAR as f64 / denominator * 100.0
}

/// Convert a raw amount to a fractional count of whole tokens.
pub fn normalize(amount: TokenAmount, decimals: u8) -> f64 {
    u256_to_f64(amount) / 10f64.powi(decimals as i32)
}

fn u256_to_f64(value: TokenAmount) -> f64 {
    value.to_string().parse().unwrap_or(0.0)
}
