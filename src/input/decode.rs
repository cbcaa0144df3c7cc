//! Converting raw logs into typed incentive and settlement records.

use alloy::{rpc::types::Log, sol_types::SolEventInterface};

use crate::{
    contract::IncentiveMarket::IncentiveMarketEvents,
    types::{
        common::{Address, DO_NOTHING_CHOICE, IncentiveRecord, Target, VoteRegistry},
        settlement::{ClaimKey, RefundKey, SettledRecord, SettlementId},
    },
};

/// The result of decoding a batch of logs into incentive records.
#[derive(Clone, Debug, Default)]
pub struct DecodeOutcome {
    /// Successfully resolved records, in log-stream (chain) order.
    pub records: Vec<IncentiveRecord>,

    /// Records whose choice pointed past the end of the round's choice list, or whose vote round
    /// is unknown.
    ///
    /// These are excluded from every group: folding them into the sentinel or into index 0 would
    /// corrupt that group's sum. They are kept here for audit and counted as a data-quality
    /// signal.
    pub unresolved: Vec<IncentiveRecord>,
}

/// Decode all incentive deposit events from a batch of logs.
///
/// Both wire shapes are handled: vote deposits carry an opaque vote id plus a numeric choice and
/// are resolved through `votes`; direct incentives name the target protocol explicitly. Claim
/// and refund events in the batch are ignored here (see [`decode_settled_logs`]). Decoding is
/// pure: the same logs and registry always produce the same outcome.
pub fn decode_incentive_logs(logs: &[Log], votes: &VoteRegistry) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();

    for log in logs {
        let Some((block_number, tx_hash)) = provenance(log) else {
            continue;
        };
        let event = match IncentiveMarketEvents::decode_raw_log(log.topics(), &log.data().data) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(?log, "skipping undecodable incentive market log: {err:#}");
                continue;
            }
        };

        let record = match event {
            IncentiveMarketEvents::IncentiveDeposited(deposit) => {
                let choice = deposit.choice.try_into().unwrap_or(u64::MAX);
                // The sentinel choice needs no round context; only positional choices do.
                let target = if choice == DO_NOTHING_CHOICE {
                    Target::Sentinel
                } else {
                    match votes.get(&deposit.voteId) {
                        Some(round) => round.resolve(choice),
                        None => {
                            tracing::warn!(
                                vote_id = %deposit.voteId,
                                choice,
                                "deposit references unknown vote round"
                            );
                            Target::Unresolved(choice)
                        }
                    }
                };
                IncentiveRecord {
                    target,
                    incentive_token: deposit.token,
                    depositor: deposit.depositor,
                    amount: deposit.amount,
                    block_number,
                    tx_hash,
                    token_meta: None,
                }
            }
            IncentiveMarketEvents::ProtocolIncentivized(incentive) => IncentiveRecord {
                target: Target::Resolved(incentive.protocol),
                incentive_token: incentive.token,
                depositor: incentive.depositor,
                amount: incentive.amount,
                block_number,
                tx_hash,
                token_meta: None,
            },
            // Settled-ledger events; not deposits.
            IncentiveMarketEvents::IncentiveClaimed(_) | IncentiveMarketEvents::IncentiveRefunded(_) => {
                continue;
            }
        };

        if record.target.is_unresolved() {
            tracing::warn!(
                token = %record.incentive_token,
                depositor = %record.depositor,
                block = record.block_number,
                "dropping incentive record with unresolvable choice"
            );
            outcome.unresolved.push(record);
        } else {
            outcome.records.push(record);
        }
    }

    outcome
}

/// Decode the settled ledger (claims and refunds) from a batch of logs.
///
/// Claims are scoped to `connected_user`: a claim by some other account settles that account's
/// accrued share, not ours, so folding it into the ledger would wrongly exclude our own claim.
/// Refunds are keyed per depositor and are kept for everyone.
pub fn decode_settled_logs(logs: &[Log], connected_user: Address) -> Vec<SettledRecord> {
    let mut records = Vec::new();

    for log in logs {
        let Some((block_number, tx_hash)) = provenance(log) else {
            continue;
        };
        let Ok(event) = IncentiveMarketEvents::decode_raw_log(log.topics(), &log.data().data)
        else {
            continue;
        };

        match event {
            IncentiveMarketEvents::IncentiveClaimed(claim) => {
                if claim.claimer != connected_user {
                    continue;
                }
                records.push(SettledRecord {
                    id: SettlementId::Claim(ClaimKey {
                        protocol: claim.protocol,
                        token: claim.token,
                    }),
                    amount: claim.amount,
                    block_number,
                    tx_hash,
                });
            }
            IncentiveMarketEvents::IncentiveRefunded(refund) => {
                records.push(SettledRecord {
                    id: SettlementId::Refund(RefundKey {
                        protocol: refund.protocol,
                        token: refund.token,
                        depositor: refund.depositor,
                    }),
                    amount: refund.amount,
                    block_number,
                    tx_hash,
                });
            }
            _ => {}
        }
    }

    records
}

/// Extract the provenance fields every record needs for ordering and dedup.
fn provenance(log: &Log) -> Option<(u64, alloy::primitives::B256)> {
    match (log.block_number, log.transaction_hash) {
        (Some(block_number), Some(tx_hash)) => Some((block_number, tx_hash)),
        _ => {
            // Pending logs have no provenance and can never become part of the ledger.
            tracing::warn!(?log, "skipping log without block number or transaction hash");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use alloy::primitives::U256;
    use pretty_assertions::assert_eq;

    use crate::{
        input::testing::{claimed_log, deposit_log, direct_log, refunded_log, vote_registry},
        types::common::{B256, DO_NOTHING_TARGET, VoteKind},
    };

    use super::*;

    fn depositor() -> Address {
        Address::repeat_byte(0xd1)
    }

    fn token() -> Address {
        Address::repeat_byte(0x70)
    }

    #[test_log::test]
    fn test_decode_sentinel_choice_for_both_vote_kinds() {
        for kind in [VoteKind::Inclusion, VoteKind::Weight] {
            let vote_id = B256::repeat_byte(1);
            let votes = vote_registry(vote_id, kind, vec![Address::repeat_byte(0xa)]);
            let logs = vec![deposit_log(vote_id, depositor(), token(), 100, 1, 5, 1)];

            let outcome = decode_incentive_logs(&logs, &votes);
            assert_eq!(outcome.records.len(), 1);
            assert_eq!(outcome.records[0].target, Target::Sentinel);
            assert_eq!(
                outcome.records[0].target.protocol(),
                Some(DO_NOTHING_TARGET)
            );
        }
    }

    #[test_log::test]
    fn test_decode_positional_choices() {
        let a = Address::repeat_byte(0xa);
        let b = Address::repeat_byte(0xb);
        let c = Address::repeat_byte(0xc);
        let vote_id = B256::repeat_byte(2);
        let votes = vote_registry(vote_id, VoteKind::Inclusion, vec![a, b, c]);

        let logs = vec![
            deposit_log(vote_id, depositor(), token(), 100, 2, 5, 1),
            deposit_log(vote_id, depositor(), token(), 100, 4, 6, 2),
            deposit_log(vote_id, depositor(), token(), 100, 5, 7, 3),
        ];
        let outcome = decode_incentive_logs(&logs, &votes);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].target, Target::Resolved(a));
        assert_eq!(outcome.records[1].target, Target::Resolved(c));

        // Choice 5 with only 3 candidates is unresolved and excluded from all groups.
        assert_eq!(outcome.unresolved.len(), 1);
        assert_eq!(outcome.unresolved[0].target, Target::Unresolved(5));
    }

    #[test_log::test]
    fn test_decode_sentinel_choice_without_round_context() {
        // No registry entry at all: the sentinel still resolves, only positional choices need
        // the round's choice list.
        let votes = VoteRegistry::default();
        let logs = vec![deposit_log(B256::repeat_byte(8), depositor(), token(), 100, 1, 5, 1)];

        let outcome = decode_incentive_logs(&logs, &votes);
        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].target, Target::Sentinel);
    }

    #[test_log::test]
    fn test_decode_unknown_vote_round_is_unresolved() {
        let votes = VoteRegistry::default();
        let logs = vec![deposit_log(B256::repeat_byte(9), depositor(), token(), 1, 2, 5, 1)];
        let outcome = decode_incentive_logs(&logs, &votes);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.unresolved.len(), 1);
    }

    #[test_log::test]
    fn test_decode_direct_shape() {
        let protocol = Address::repeat_byte(0xee);
        let logs = vec![direct_log(protocol, depositor(), token(), 42, 9, 4)];
        let outcome = decode_incentive_logs(&logs, &VoteRegistry::default());

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.target, Target::Resolved(protocol));
        assert_eq!(record.amount, U256::from(42));
        assert_eq!(record.block_number, 9);
    }

    #[test_log::test]
    fn test_decode_is_idempotent() {
        let vote_id = B256::repeat_byte(3);
        let votes = vote_registry(vote_id, VoteKind::Weight, vec![Address::repeat_byte(0xa)]);
        let logs = vec![
            deposit_log(vote_id, depositor(), token(), 100, 2, 5, 1),
            direct_log(Address::repeat_byte(0xee), depositor(), token(), 7, 6, 2),
        ];

        let first = decode_incentive_logs(&logs, &votes);
        let second = decode_incentive_logs(&logs, &votes);
        assert_eq!(first.records, second.records);
        assert_eq!(first.unresolved, second.unresolved);
    }

    #[test_log::test]
    fn test_decode_settled_logs_scopes_claims_to_user() {
        let protocol = Address::repeat_byte(0xee);
        let user = depositor();
        let other = Address::repeat_byte(0xd2);
        let logs = vec![
            claimed_log(protocol, token(), user, 10, 5, 1),
            claimed_log(protocol, token(), other, 10, 6, 2),
            refunded_log(protocol, token(), other, 10, 7, 3),
        ];

        let records = decode_settled_logs(&logs, user);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].id,
            SettlementId::Claim(ClaimKey {
                protocol,
                token: token()
            })
        );
        assert_eq!(
            records[1].id,
            SettlementId::Refund(RefundKey {
                protocol,
                token: token(),
                depositor: other
            })
        );
    }
}
