//! Partitioning the connected user's positions into claimable and refundable items.

use std::collections::HashSet;

use alloy::sol_types::SolCall;

use crate::{
    contract::IncentiveMarket,
    types::{
        common::Address,
        settlement::{
            ClaimKey, ClaimableItem, RefundKey, RefundableItem, SettledLedger, SettlementCall,
            SettlementId,
        },
        views::GroupedIncentive,
    },
};

/// The connected user's pending settlements, partitioned by outcome.
///
/// Claimable and refundable sets are disjoint by construction: a protocol is either a winner or
/// it is not, and each of the user's positions lands on exactly one side.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettlementPlan {
    pub claimable: Vec<ClaimableItem>,
    pub refundable: Vec<RefundableItem>,
}

impl SettlementPlan {
    /// Total USD value of the selected claimable items.
    pub fn selected_claimable_usd(&self) -> f64 {
        self.claimable
            .iter()
            .filter(|item| item.is_selected)
            .map(|item| item.usd_value)
            .sum()
    }

    /// Total USD value of the selected refundable items.
    pub fn selected_refundable_usd(&self) -> f64 {
        self.refundable
            .iter()
            .filter(|item| item.is_selected)
            .map(|item| item.usd_value)
            .sum()
    }

    /// The selected items, claims first, as `(identity, prebuilt call)` pairs ready for batched
    /// submission.
    pub fn selected(&self) -> Vec<(SettlementId, SettlementCall)> {
        self.claimable
            .iter()
            .filter(|item| item.is_selected)
            .map(|item| (SettlementId::Claim(item.id), item.call.clone()))
            .chain(
                self.refundable
                    .iter()
                    .filter(|item| item.is_selected)
                    .map(|item| (SettlementId::Refund(item.id), item.call.clone())),
            )
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.claimable.is_empty() && self.refundable.is_empty()
    }
}

/// Build the settlement plan for the connected user.
///
/// Only the user's own positions (the by-user view) are planned. Winning protocols yield one
/// claimable item per incentive token; losing protocols yield one refundable item per token,
/// keyed back to the user as depositor. Items already present in the settled ledger are
/// excluded. Everything starts selected.
pub fn plan<'a>(
    market: Address,
    connected_user: Address,
    positions: impl IntoIterator<Item = &'a GroupedIncentive>,
    winners: &HashSet<Address>,
    settled: &SettledLedger,
) -> SettlementPlan {
    let mut plan = SettlementPlan::default();

    for group in positions {
        if group.incentives.is_empty() {
            continue;
        }
        let won = winners.contains(&group.protocol);
        for constituent in &group.incentives {
            if won {
                let id = ClaimKey {
                    protocol: group.protocol,
                    token: constituent.token,
                };
                if settled.contains_claim(&id) {
                    continue;
                }
                plan.claimable.push(ClaimableItem {
                    id,
                    token_meta: constituent.token_meta.clone(),
                    amount: constituent.amount,
                    usd_value: constituent.value_usd,
                    is_selected: true,
                    call: claim_call(market, id, connected_user),
                });
            } else {
                let id = RefundKey {
                    protocol: group.protocol,
                    token: constituent.token,
                    depositor: connected_user,
                };
                if settled.contains_refund(&id) {
                    continue;
                }
                plan.refundable.push(RefundableItem {
                    id,
                    token_meta: constituent.token_meta.clone(),
                    amount: constituent.amount,
                    usd_value: constituent.value_usd,
                    is_selected: true,
                    call: refund_call(market, id),
                });
            }
        }
    }

    plan
}

/// The single-call form of a claim, reused verbatim inside batches.
pub fn claim_call(market: Address, key: ClaimKey, claimer: Address) -> SettlementCall {
    SettlementCall {
        target: market,
        calldata: IncentiveMarket::claimCall {
            protocol: key.protocol,
            token: key.token,
            claimer,
        }
        .abi_encode()
        .into(),
    }
}

/// The single-call form of a refund, reused verbatim inside batches.
pub fn refund_call(market: Address, key: RefundKey) -> SettlementCall {
    SettlementCall {
        target: market,
        calldata: IncentiveMarket::refundCall {
            protocol: key.protocol,
            token: key.token,
            depositor: key.depositor,
        }
        .abi_encode()
        .into(),
    }
}

#[cfg(test)]
mod test {
    use alloy::primitives::U256;
    use pretty_assertions::assert_eq;

    use crate::types::{
        settlement::SettledRecord,
        views::ConstituentIncentive,
    };

    use super::*;

    fn market() -> Address {
        Address::repeat_byte(0x11)
    }

    fn user() -> Address {
        Address::repeat_byte(0xd1)
    }

    fn group(protocol: Address, tokens: &[(Address, f64)]) -> GroupedIncentive {
        GroupedIncentive {
            protocol,
            normalized_sum: tokens.iter().map(|(_, value)| value).sum(),
            estimated_apr: 0.0,
            usd_per_unit: 0.0,
            incentives: tokens
                .iter()
                .map(|(token, value)| ConstituentIncentive {
                    token: *token,
                    token_meta: None,
                    amount: U256::from(100),
                    value_usd: *value,
                    last_block: 1,
                })
                .collect(),
        }
    }

    #[test_log::test]
    fn test_plan_partitions_by_winner() {
        let winner = Address::repeat_byte(0xe1);
        let loser = Address::repeat_byte(0xe2);
        let token_a = Address::repeat_byte(0x70);
        let token_b = Address::repeat_byte(0x71);
        let groups = vec![
            group(winner, &[(token_a, 10.0), (token_b, 5.0)]),
            group(loser, &[(token_a, 3.0)]),
        ];
        let winners = [winner].into_iter().collect();

        let plan = plan(
            market(),
            user(),
            &groups,
            &winners,
            &SettledLedger::default(),
        );

        assert_eq!(plan.claimable.len(), 2);
        assert_eq!(plan.refundable.len(), 1);
        assert_eq!(plan.refundable[0].id.depositor, user());
        assert_eq!(plan.selected_claimable_usd(), 15.0);
        assert_eq!(plan.selected_refundable_usd(), 3.0);

        // The two sides never share an identity.
        let claim_keys = plan
            .claimable
            .iter()
            .map(|item| (item.id.protocol, item.id.token))
            .collect::<Vec<_>>();
        for item in &plan.refundable {
            assert!(!claim_keys.contains(&(item.id.protocol, item.id.token)));
        }
    }

    #[test_log::test]
    fn test_plan_excludes_settled_items() {
        let winner = Address::repeat_byte(0xe1);
        let token_a = Address::repeat_byte(0x70);
        let token_b = Address::repeat_byte(0x71);
        let groups = vec![group(winner, &[(token_a, 10.0), (token_b, 5.0)])];
        let winners = [winner].into_iter().collect();
        let settled = SettledLedger::from_records([SettledRecord {
            id: SettlementId::Claim(ClaimKey {
                protocol: winner,
                token: token_a,
            }),
            amount: U256::from(100),
            block_number: 7,
            tx_hash: Default::default(),
        }]);

        let plan = plan(market(), user(), &groups, &winners, &settled);
        assert_eq!(plan.claimable.len(), 1);
        assert_eq!(plan.claimable[0].id.token, token_b);
    }

    #[test_log::test]
    fn test_plan_skips_empty_groups() {
        let winner = Address::repeat_byte(0xe1);
        let groups = vec![group(winner, &[])];
        let winners = [winner].into_iter().collect();

        let plan = plan(
            market(),
            user(),
            &groups,
            &winners,
            &SettledLedger::default(),
        );
        assert!(plan.is_empty());
    }

    #[test_log::test]
    fn test_selection_totals_track_only_selected_items() {
        let winner = Address::repeat_byte(0xe1);
        let token_a = Address::repeat_byte(0x70);
        let token_b = Address::repeat_byte(0x71);
        let groups = vec![group(winner, &[(token_a, 10.0), (token_b, 5.0)])];
        let winners = [winner].into_iter().collect();

        let mut plan = plan(
            market(),
            user(),
            &groups,
            &winners,
            &SettledLedger::default(),
        );
        assert_eq!(plan.selected_claimable_usd(), 15.0);
        assert_eq!(plan.selected().len(), 2);

        // Deselecting one item changes only the totals, never another item's value.
        plan.claimable[0].is_selected = false;
        assert_eq!(plan.selected_claimable_usd(), 5.0);
        assert_eq!(plan.selected().len(), 1);
        assert_eq!(plan.claimable[1].usd_value, 5.0);
    }

    #[test_log::test]
    fn test_calls_match_single_call_form() {
        let key = ClaimKey {
            protocol: Address::repeat_byte(0xe1),
            token: Address::repeat_byte(0x70),
        };
        let call = claim_call(market(), key, user());
        assert_eq!(call.target, market());
        assert_eq!(
            &call.calldata[..4],
            IncentiveMarket::claimCall::SELECTOR.as_slice()
        );
    }
}
