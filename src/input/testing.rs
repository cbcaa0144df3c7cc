#![cfg(any(test, feature = "testing"))]

//! In-memory implementations of the external interfaces, plus log fixtures.
//!
//! Every collaborator the engine consumes through a trait has a deterministic fake here, so
//! tests never need a live chain.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy::{
    primitives::{Bytes, LogData, U256},
    rpc::types::{Filter, Log},
    sol_types::{SolCall, SolEvent, SolValue},
};
use parking_lot::Mutex;

use crate::{
    Error, Result,
    contract::{Erc20, IncentiveMarket},
    error::ensure,
    input::scan::LogSource,
    metadata::{MetadataCall, TokenMetadataSource},
    settlement::executor::{CallSubmitter, SubmissionReceipt},
    types::{
        common::{Address, B256, TokenInfo, VoteKind, VoteRegistry, VoteRound},
        settlement::SettlementCall,
    },
};

/// A log source backed by a fixed in-memory log set.
#[derive(Clone, Debug)]
pub struct MemoryLogSource {
    address: Address,
    logs: Vec<Log>,

    /// If set, reject filters spanning more blocks than this, like a real RPC node.
    max_block_range: Option<u64>,
}

impl MemoryLogSource {
    pub fn new(address: Address, logs: Vec<Log>) -> Self {
        Self {
            address,
            logs,
            max_block_range: None,
        }
    }

    pub fn with_max_block_range(mut self, max: u64) -> Self {
        self.max_block_range = Some(max);
        self
    }
}

impl LogSource for MemoryLogSource {
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        if let Some(max) = self.max_block_range {
            ensure!(
                to.saturating_sub(from).saturating_add(1) <= max,
                Error::bad_request().context(format!(
                    "requested range [{from}, {to}] exceeds maximum span {max}"
                ))
            );
        }
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                log.address() == self.address
                    && filter.address.matches(&log.address())
                    && log.block_number.is_some_and(|n| n >= from && n <= to)
            })
            .cloned()
            .collect())
    }
}

/// A log source that fails for every window starting at or after a given block.
#[derive(Clone, Debug)]
pub struct FailingLogSource {
    inner: MemoryLogSource,
    fail_from: u64,
}

impl FailingLogSource {
    pub fn new(inner: MemoryLogSource, fail_from: u64) -> Self {
        Self { inner, fail_from }
    }
}

impl LogSource for FailingLogSource {
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        ensure!(
            filter.get_from_block().unwrap_or(0) < self.fail_from,
            Error::internal().context("FailingLogSource")
        );
        self.inner.get_logs(filter).await
    }
}

/// A metadata source answering from a fixed token table.
///
/// Unknown tokens yield `None` slots, mirroring the allow-failure semantics of the batched
/// multicall read.
#[derive(Debug, Default)]
pub struct MemoryMetadataSource {
    tokens: HashMap<Address, TokenInfo>,

    /// Number of `read_many` round trips, for asserting on batching behavior.
    round_trips: AtomicUsize,
}

impl MemoryMetadataSource {
    pub fn new(tokens: impl IntoIterator<Item = (Address, TokenInfo)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
            round_trips: AtomicUsize::new(0),
        }
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }
}

impl TokenMetadataSource for MemoryMetadataSource {
    async fn read_many(&self, calls: Vec<MetadataCall>) -> Result<Vec<Option<Bytes>>> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(calls
            .iter()
            .map(|call| {
                let info = self.tokens.get(&call.token)?;
                match call.selector {
                    Erc20::nameCall::SELECTOR => Some(info.name.abi_encode().into()),
                    Erc20::symbolCall::SELECTOR => Some(info.symbol.abi_encode().into()),
                    Erc20::decimalsCall::SELECTOR => {
                        Some(Erc20::decimalsCall::abi_encode_returns(&info.decimals).into())
                    }
                    _ => None,
                }
            })
            .collect())
    }
}

/// A submitter that records batches and reports configurable per-item outcomes.
#[derive(Debug, Default)]
pub struct MockSubmitter {
    /// Every submitted batch, in order.
    pub submitted: Mutex<Vec<Vec<SettlementCall>>>,

    /// Indices (within a batch) that should be reported as failed sub-calls.
    failing_items: Vec<usize>,
}

impl MockSubmitter {
    pub fn with_failing_items(failing_items: Vec<usize>) -> Self {
        Self {
            submitted: Mutex::default(),
            failing_items,
        }
    }
}

impl CallSubmitter for MockSubmitter {
    async fn submit(&self, calls: Vec<SettlementCall>) -> Result<SubmissionReceipt> {
        let item_success = (0..calls.len())
            .map(|i| !self.failing_items.contains(&i))
            .collect();
        self.submitted.lock().push(calls);
        Ok(SubmissionReceipt {
            tx_hash: B256::repeat_byte(0xab),
            item_success,
        })
    }
}

/// A submitter whose submission never completes, for exercising the single-flight guard.
#[derive(Clone, Copy, Debug, Default)]
pub struct PendingSubmitter;

impl CallSubmitter for PendingSubmitter {
    async fn submit(&self, _calls: Vec<SettlementCall>) -> Result<SubmissionReceipt> {
        std::future::pending().await
    }
}

/// A one-round vote registry.
pub fn vote_registry(vote_id: B256, kind: VoteKind, choices: Vec<Address>) -> VoteRegistry {
    [(vote_id, VoteRound { kind, choices })].into_iter().collect()
}

/// The market address used by the fixture logs.
pub fn market_address() -> Address {
    Address::repeat_byte(0x11)
}

/// A vote-deposit log fixture.
pub fn deposit_log(
    vote_id: B256,
    depositor: Address,
    token: Address,
    amount: u64,
    choice: u64,
    block: u64,
    seed: u64,
) -> Log {
    let event = IncentiveMarket::IncentiveDeposited {
        voteId: vote_id,
        depositor,
        token,
        amount: U256::from(amount),
        choice: U256::from(choice),
    };
    rpc_log(event.encode_log_data(), block, seed)
}

/// A direct-incentivize log fixture.
pub fn direct_log(
    protocol: Address,
    depositor: Address,
    token: Address,
    amount: u64,
    block: u64,
    seed: u64,
) -> Log {
    let event = IncentiveMarket::ProtocolIncentivized {
        protocol,
        depositor,
        token,
        amount: U256::from(amount),
    };
    rpc_log(event.encode_log_data(), block, seed)
}

/// A claim-settled log fixture.
pub fn claimed_log(
    protocol: Address,
    token: Address,
    claimer: Address,
    amount: u64,
    block: u64,
    seed: u64,
) -> Log {
    let event = IncentiveMarket::IncentiveClaimed {
        protocol,
        token,
        claimer,
        amount: U256::from(amount),
    };
    rpc_log(event.encode_log_data(), block, seed)
}

/// A refund-settled log fixture.
pub fn refunded_log(
    protocol: Address,
    token: Address,
    depositor: Address,
    amount: u64,
    block: u64,
    seed: u64,
) -> Log {
    let event = IncentiveMarket::IncentiveRefunded {
        protocol,
        token,
        depositor,
        amount: U256::from(amount),
    };
    rpc_log(event.encode_log_data(), block, seed)
}

fn rpc_log(data: LogData, block: u64, seed: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: market_address(),
            data,
        },
        block_number: Some(block),
        transaction_hash: Some(B256::from(U256::from(seed))),
        ..Default::default()
    }
}
