//! Settlement-planning units and the settled ledger.

use std::collections::HashSet;

use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};

use super::common::{Address, B256, TokenAmount, TokenInfo};

/// Dedup key for a claim.
///
/// Claims are keyed without the depositor because a claim settles the *connected user's* accrued
/// share for a winning `(protocol, token)` pair.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub struct ClaimKey {
    pub protocol: Address,
    pub token: Address,
}

/// Dedup key for a refund.
///
/// Refunds carry the original depositor because multiple depositors may each be owed a refund
/// for the same losing `(protocol, token)` pair.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub struct RefundKey {
    pub protocol: Address,
    pub token: Address,
    pub depositor: Address,
}

/// The identity of one settlement, claim or refund.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum SettlementId {
    Claim(ClaimKey),
    Refund(RefundKey),
}

/// A prebuilt settlement call: target contract plus encoded arguments, identical to the
/// per-item single-call form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettlementCall {
    pub target: Address,
    pub calldata: Bytes,
}

/// An accrued incentive for a winning target, claimable by the connected user.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClaimableItem {
    pub id: ClaimKey,
    pub token_meta: Option<TokenInfo>,
    pub amount: TokenAmount,
    pub usd_value: f64,

    /// Whether the user has this item toggled into the batch. Unselected items count toward no
    /// total and are never submitted.
    pub is_selected: bool,

    pub call: SettlementCall,
}

/// A deposit for a losing target, refundable to its depositor.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RefundableItem {
    pub id: RefundKey,
    pub token_meta: Option<TokenInfo>,
    pub amount: TokenAmount,
    pub usd_value: f64,
    pub is_selected: bool,
    pub call: SettlementCall,
}

/// One settlement that has already happened on-chain.
///
/// Sourced only from the claim/refund event stream; never invented locally.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettledRecord {
    pub id: SettlementId,
    pub amount: TokenAmount,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// The set of settlement keys already processed on-chain.
///
/// Used purely to exclude already-settled items from planning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettledLedger {
    claims: HashSet<ClaimKey>,
    refunds: HashSet<RefundKey>,
}

impl SettledLedger {
    pub fn from_records(records: impl IntoIterator<Item = SettledRecord>) -> Self {
        let mut ledger = Self::default();
        ledger.extend(records);
        ledger
    }

    /// Fold more settled records in, e.g. after a post-settlement refresh.
    pub fn extend(&mut self, records: impl IntoIterator<Item = SettledRecord>) {
        for record in records {
            match record.id {
                SettlementId::Claim(key) => {
                    self.claims.insert(key);
                }
                SettlementId::Refund(key) => {
                    self.refunds.insert(key);
                }
            }
        }
    }

    pub fn contains_claim(&self, key: &ClaimKey) -> bool {
        self.claims.contains(key)
    }

    pub fn contains_refund(&self, key: &RefundKey) -> bool {
        self.refunds.contains(key)
    }

    pub fn len(&self) -> usize {
        self.claims.len() + self.refunds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty() && self.refunds.is_empty()
    }
}
