//! Batched, allow-failure submission of settlement calls.

use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::instrument;

use crate::{
    Error, Result,
    error::ensure,
    settlement::planner::SettlementPlan,
    types::{
        common::{Address, B256},
        settlement::{SettlementCall, SettlementId},
    },
};

/// The confirmed result of one batched submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// The transaction that carried the batch.
    pub tx_hash: B256,

    /// Per-item success flags, in submission order.
    pub item_success: Vec<bool>,
}

/// Submits a batch of settlement calls in one transaction.
///
/// One item reverting must not revert its siblings; the submitter reports each item's outcome
/// individually.
pub trait CallSubmitter: Sync {
    fn submit(
        &self,
        calls: Vec<SettlementCall>,
    ) -> impl Send + Future<Output = Result<SubmissionReceipt>>;
}

/// The outcome of settling one plan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// The carrying transaction, if anything was submitted.
    pub tx_hash: Option<B256>,

    /// Items confirmed settled. Only these may be marked settled locally; the next ledger
    /// refresh confirms them from the event stream.
    pub settled: Vec<SettlementId>,

    /// Items whose sub-call failed. They stay pending and reappear in the next plan.
    pub failed: Vec<SettlementId>,
}

/// Executes settlement plans, one in-flight batch per user.
#[derive(Debug, Default)]
pub struct SettlementExecutor<S> {
    submitter: S,
    in_flight: Mutex<HashSet<Address>>,
}

impl<S: CallSubmitter> SettlementExecutor<S> {
    pub fn new(submitter: S) -> Self {
        Self {
            submitter,
            in_flight: Mutex::default(),
        }
    }

    /// Submit the selected items of a plan as one batch.
    ///
    /// An empty selection submits nothing. A second settlement for the same user while one is
    /// in flight fails with a conflict instead of double-submitting.
    #[instrument(skip(self, plan))]
    pub async fn settle(&self, user: Address, plan: &SettlementPlan) -> Result<SettlementOutcome> {
        let selected = plan.selected();
        if selected.is_empty() {
            return Ok(SettlementOutcome::default());
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, user)?;
        let (ids, calls): (Vec<_>, Vec<_>) = selected.into_iter().unzip();
        tracing::info!(items = ids.len(), "submitting settlement batch");

        let receipt = self.submitter.submit(calls).await?;
        ensure!(
            receipt.item_success.len() == ids.len(),
            Error::internal().context(format!(
                "submitter reported {} outcomes for {} items",
                receipt.item_success.len(),
                ids.len()
            ))
        );

        let mut outcome = SettlementOutcome {
            tx_hash: Some(receipt.tx_hash),
            ..Default::default()
        };
        for (id, success) in ids.into_iter().zip(receipt.item_success) {
            if success {
                outcome.settled.push(id);
            } else {
                tracing::warn!(?id, "settlement sub-call failed, item stays pending");
                outcome.failed.push(id);
            }
        }
        Ok(outcome)
    }
}

/// Holds a user's slot in the in-flight set for the duration of one settlement.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<Address>>,
    user: Address,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<Address>>, user: Address) -> Result<Self> {
        ensure!(
            in_flight.lock().insert(user),
            Error::conflict().context(format!("a settlement for {user:#x} is already in flight"))
        );
        Ok(Self { in_flight, user })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.user);
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use alloy::primitives::U256;
    use pretty_assertions::assert_eq;

    use crate::{
        error::ErrorKind,
        input::testing::{MockSubmitter, PendingSubmitter},
        settlement::planner::claim_call,
        types::{
            settlement::{ClaimKey, ClaimableItem},
            common::Address,
        },
    };

    use super::*;

    fn user() -> Address {
        Address::repeat_byte(0xd1)
    }

    fn claimable(token_byte: u8, selected: bool) -> ClaimableItem {
        let id = ClaimKey {
            protocol: Address::repeat_byte(0xe1),
            token: Address::repeat_byte(token_byte),
        };
        ClaimableItem {
            id,
            token_meta: None,
            amount: U256::from(100),
            usd_value: 1.0,
            is_selected: selected,
            call: claim_call(Address::repeat_byte(0x11), id, user()),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_settle_maps_partial_success() {
        let executor = SettlementExecutor::new(MockSubmitter::with_failing_items(vec![1]));
        let plan = SettlementPlan {
            claimable: vec![claimable(0x70, true), claimable(0x71, true)],
            refundable: vec![],
        };

        let outcome = executor.settle(user(), &plan).await.unwrap();
        assert_eq!(outcome.settled, vec![SettlementId::Claim(plan.claimable[0].id)]);
        assert_eq!(outcome.failed, vec![SettlementId::Claim(plan.claimable[1].id)]);
        assert!(outcome.tx_hash.is_some());
    }

    #[test_log::test(tokio::test)]
    async fn test_settle_skips_unselected_items() {
        let submitter = MockSubmitter::default();
        let executor = SettlementExecutor::new(submitter);
        let plan = SettlementPlan {
            claimable: vec![claimable(0x70, true), claimable(0x71, false)],
            refundable: vec![],
        };

        let outcome = executor.settle(user(), &plan).await.unwrap();
        assert_eq!(outcome.settled.len(), 1);

        let submitted = executor.submitter.submitted.lock();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_settle_empty_selection_submits_nothing() {
        let executor = SettlementExecutor::new(MockSubmitter::default());
        let plan = SettlementPlan::default();

        let outcome = executor.settle(user(), &plan).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::default());
        assert!(executor.submitter.submitted.lock().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_settle_is_single_flight_per_user() {
        let executor = Arc::new(SettlementExecutor::new(PendingSubmitter));
        let plan = SettlementPlan {
            claimable: vec![claimable(0x70, true)],
            refundable: vec![],
        };

        let pending = tokio::spawn({
            let executor = executor.clone();
            let plan = plan.clone();
            async move { executor.settle(user(), &plan).await }
        });
        // Let the first settlement take the slot.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = executor.settle(user(), &plan).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        pending.abort();
    }
}
