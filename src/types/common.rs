//! Primitive types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use alloy::primitives::{Address, B256, U256};

/// A raw token amount in the token's native precision.
pub type TokenAmount = U256;

/// The reserved "do nothing / no change" target identity.
///
/// This is a fixed, well-known address that is never a member of any candidate or participant
/// list. Incentives deposited for the sentinel reward voters for keeping the basket composition
/// unchanged.
pub const DO_NOTHING_TARGET: Address = Address::repeat_byte(0xff);

/// The choice value encoding the sentinel "do nothing" target.
pub const DO_NOTHING_CHOICE: u64 = 1;

/// Offset between a choice value and the index into the vote round's choice list.
///
/// Index 0 of the choice space is consumed by the sentinel (`+1`), and choice values start at 1
/// rather than 0 (`+1` again), so `choice - 2` is the positional index of the voted-for entry.
pub const CHOICE_INDEX_OFFSET: u64 = 2;

/// The kind of vote a round is deciding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum VoteKind {
    /// A vote on which candidates to include in the basket. Choices index the candidate list.
    Inclusion,

    /// A vote on the weights of current basket members. Choices index the participant list.
    Weight,
}

/// The context needed to resolve a numeric choice of one vote round into a target.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct VoteRound {
    /// What this round is voting on.
    pub kind: VoteKind,

    /// The candidate list (inclusion votes) or participant list (weight votes), in the positional
    /// order the contract uses.
    pub choices: Vec<Address>,
}

impl VoteRound {
    /// Resolve a raw choice value into a [`Target`].
    ///
    /// The candidate/participant set can shrink between epochs, so a choice may point past the
    /// end of the list; such a record resolves to [`Target::Unresolved`] and must be excluded
    /// from every group rather than silently assigned to the sentinel or to index 0.
    pub fn resolve(&self, choice: u64) -> Target {
        if choice == DO_NOTHING_CHOICE {
            return Target::Sentinel;
        }
        let Some(index) = choice.checked_sub(CHOICE_INDEX_OFFSET) else {
            return Target::Unresolved(choice);
        };
        match self.choices.get(index as usize) {
            Some(address) => Target::Resolved(*address),
            None => Target::Unresolved(choice),
        }
    }
}

/// Vote rounds by their opaque on-chain identifier.
///
/// This is an explicit input to decoding, never ambient state: two decoders given the same
/// registry and the same logs produce the same records.
pub type VoteRegistry = HashMap<B256, VoteRound>;

/// What an incentive deposit was voted for.
///
/// Produced exactly once by the decoder, so downstream code pattern-matches instead of
/// re-deriving the choice offset arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Target {
    /// The reserved "do nothing / no change" identity.
    Sentinel,

    /// A concrete candidate or participant protocol.
    Resolved(Address),

    /// A choice that points past the end of the round's choice list; carries the raw choice
    /// value for logging and audit.
    Unresolved(u64),
}

impl Target {
    /// The protocol address this target aggregates under, if any.
    ///
    /// The sentinel aggregates under [`DO_NOTHING_TARGET`]; unresolved targets aggregate under
    /// nothing.
    pub fn protocol(&self) -> Option<Address> {
        match self {
            Self::Sentinel => Some(DO_NOTHING_TARGET),
            Self::Resolved(address) => Some(*address),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }
}

/// ERC-20 metadata for display.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    /// Fallback metadata for a token whose on-chain reads failed.
    ///
    /// Displays a truncated address and assumes the common 18-decimals precision, so that a
    /// metadata failure degrades the display without aborting aggregation.
    pub fn fallback(token: Address) -> Self {
        Self {
            name: truncated_address(token),
            symbol: truncated_address(token),
            decimals: 18,
        }
    }
}

/// A short display form of an address: `0x1234…cdef`.
pub fn truncated_address(address: Address) -> String {
    let hex = format!("{address:#x}");
    format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
}

/// One incentive deposit event, immutable once decoded.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IncentiveRecord {
    /// The voted-for target.
    pub target: Target,

    /// The token posted as the reward.
    pub incentive_token: Address,

    /// The address that posted it.
    pub depositor: Address,

    /// Raw amount in the incentive token's native precision.
    pub amount: TokenAmount,

    /// Provenance: the block this deposit landed in.
    pub block_number: u64,

    /// Provenance: the transaction this deposit landed in.
    pub tx_hash: B256,

    /// Display metadata for the incentive token, filled in by the metadata resolver.
    pub token_meta: Option<TokenInfo>,
}

impl IncentiveRecord {
    /// The unique identity of this record.
    ///
    /// `(protocol, token, depositor, block, tx)` is unique across the scanned range; re-decoding
    /// the same log always reproduces the same key, which is what makes a restarted scan
    /// idempotent.
    pub fn dedup_key(&self) -> (Option<Address>, Address, Address, u64, B256) {
        (
            self.target.protocol(),
            self.incentive_token,
            self.depositor,
            self.block_number,
            self.tx_hash,
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_resolve_sentinel_for_both_vote_kinds() {
        for kind in [VoteKind::Inclusion, VoteKind::Weight] {
            let round = VoteRound {
                kind,
                choices: vec![Address::repeat_byte(1)],
            };
            assert_eq!(round.resolve(DO_NOTHING_CHOICE), Target::Sentinel);
        }
    }

    #[test]
    fn test_resolve_positional_choices() {
        let a = Address::repeat_byte(0xa);
        let b = Address::repeat_byte(0xb);
        let c = Address::repeat_byte(0xc);
        let round = VoteRound {
            kind: VoteKind::Inclusion,
            choices: vec![a, b, c],
        };

        assert_eq!(round.resolve(2), Target::Resolved(a));
        assert_eq!(round.resolve(4), Target::Resolved(c));
        assert_eq!(round.resolve(5), Target::Unresolved(5));
        assert_eq!(round.resolve(0), Target::Unresolved(0));
    }

    #[test]
    fn test_sentinel_aggregates_under_fixed_identity() {
        assert_eq!(Target::Sentinel.protocol(), Some(DO_NOTHING_TARGET));
        assert_eq!(Target::Unresolved(7).protocol(), None);
    }

    #[test]
    fn test_truncated_address() {
        let address = "0x1234000000000000000000000000000000005678"
            .parse::<Address>()
            .unwrap();
        assert_eq!(truncated_address(address), "0x1234…5678");
    }
}
