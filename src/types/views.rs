//! Grouped views derived from the flat record list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::common::{Address, TokenAmount, TokenInfo};

/// One token's share of a grouped incentive.
///
/// Multiple records for the same `(protocol, token)` pair fold into a single constituent: the
/// amounts and USD values accumulate, they are never kept as separate rows.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ConstituentIncentive {
    /// The incentive token.
    pub token: Address,

    /// Display metadata for the token, if resolution succeeded.
    pub token_meta: Option<TokenInfo>,

    /// Cumulative raw amount across all folded records.
    pub amount: TokenAmount,

    /// Cumulative USD value. Zero when the token has no known price; the amount is still kept so
    /// the constituent displays (with $0) rather than disappearing.
    pub value_usd: f64,

    /// The most recent block that contributed to this constituent, used for display ordering.
    pub last_block: u64,
}

/// Aggregate over one protocol (by-protocol view) or one (protocol, connected user) pair
/// (by-user view).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupedIncentive {
    /// The target protocol this group aggregates.
    pub protocol: Address,

    /// Cumulative USD value of all constituents.
    pub normalized_sum: f64,

    /// Annualized yield estimate derived from `normalized_sum` and the total deposited value.
    ///
    /// Recomputed from the running sum on every fold step, never accumulated independently.
    pub estimated_apr: f64,

    /// `normalized_sum` per normalized deposited unit.
    pub usd_per_unit: f64,

    /// Constituents, one row per incentive token, most recent first.
    pub incentives: Vec<ConstituentIncentive>,
}

/// The two grouped views of the reconstructed ledger.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct IncentiveViews {
    /// All records, grouped by target protocol.
    pub by_protocol: BTreeMap<Address, GroupedIncentive>,

    /// The connected user's records only, grouped by target protocol.
    pub by_user: BTreeMap<Address, GroupedIncentive>,
}
