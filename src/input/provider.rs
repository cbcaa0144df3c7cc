//! The JSON-RPC chain client.

use alloy::{
    network::ReceiptResponse,
    primitives::Bytes,
    providers::{Provider, RootProvider},
    rpc::{
        client::RpcClient,
        types::{Filter, Log, TransactionInput, TransactionRequest},
    },
    sol_types::SolCall,
};
use tracing::instrument;

use crate::{
    Error, Result,
    contract::Multicall3::{self, Call3, CallResult},
    error::{ResultExt, ensure},
    input::{options::ChainOptions, scan::LogSource},
    metadata::{MetadataCall, TokenMetadataSource},
    settlement::executor::{CallSubmitter, SubmissionReceipt},
    types::{common::Address, settlement::SettlementCall},
};

/// A chain client scoped to one sender account.
///
/// Batched reads and batched settlement submissions both go through the Multicall3 deployment,
/// with per-item allow-failure semantics.
#[derive(Clone, Debug)]
pub struct ChainClient {
    provider: RootProvider,
    multicall: Address,
    sender: Address,
}

impl ChainClient {
    /// Connect to the configured JSON-RPC endpoint.
    ///
    /// Transactions are signed by the node, so `sender` must be an account the node manages.
    pub fn new(options: &ChainOptions, sender: Address) -> Self {
        let rpc_client = RpcClient::new_http(options.http_provider.clone());
        Self {
            provider: RootProvider::new(rpc_client),
            multicall: options.multicall_address,
            sender,
        }
    }

    /// The current chain height, used as the default end of the scanned range.
    pub async fn latest_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context(|| Error::internal().context("fetching latest block number"))
    }

    fn aggregate_request(&self, calls: Vec<Call3>) -> TransactionRequest {
        let data = Multicall3::aggregate3Call { calls }.abi_encode();
        TransactionRequest::default()
            .from(self.sender)
            .to(self.multicall)
            .input(TransactionInput::new(data.into()))
    }

    /// Execute a batch of calls via `eth_call`, returning per-item outcomes.
    async fn aggregate(&self, calls: Vec<Call3>) -> Result<Vec<CallResult>> {
        let request = self.aggregate_request(calls);
        let returned = self
            .provider
            .call(request)
            .await
            .context(|| Error::internal().context("calling multicall aggregate"))?;
        Multicall3::aggregate3Call::abi_decode_returns(&returned)
            .context(|| Error::internal().context("decoding multicall return data"))
    }
}

impl LogSource for ChainClient {
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.provider
            .get_logs(filter)
            .await
            .context(|| Error::internal().context("getting logs"))
    }
}

impl TokenMetadataSource for ChainClient {
    async fn read_many(&self, calls: Vec<MetadataCall>) -> Result<Vec<Option<Bytes>>> {
        let calls = calls
            .into_iter()
            .map(|call| Call3 {
                target: call.token,
                allowFailure: true,
                callData: call.selector.to_vec().into(),
            })
            .collect();
        let results = self.aggregate(calls).await?;
        Ok(results
            .into_iter()
            .map(|result| (result.success && !result.returnData.is_empty()).then_some(result.returnData))
            .collect())
    }
}

impl CallSubmitter for ChainClient {
    /// Submit a settlement batch through the multicall.
    ///
    /// The batch is simulated first via `eth_call` to learn each item's outcome; the carrying
    /// transaction itself succeeds even when individual items revert, so its receipt says
    /// nothing about them.
    #[instrument(skip_all, fields(items = calls.len()))]
    async fn submit(&self, calls: Vec<SettlementCall>) -> Result<SubmissionReceipt> {
        let calls = calls
            .into_iter()
            .map(|call| Call3 {
                target: call.target,
                allowFailure: true,
                callData: call.calldata,
            })
            .collect::<Vec<_>>();

        let item_success = self
            .aggregate(calls.clone())
            .await?
            .into_iter()
            .map(|result| result.success)
            .collect();

        let receipt = self
            .provider
            .send_transaction(self.aggregate_request(calls))
            .await
            .context(|| Error::internal().context("sending settlement transaction"))?
            .get_receipt()
            .await
            .context(|| Error::internal().context("awaiting settlement receipt"))?;
        ensure!(
            receipt.status(),
            Error::internal().context(format!(
                "settlement transaction {} reverted",
                receipt.transaction_hash()
            ))
        );

        Ok(SubmissionReceipt {
            tx_hash: receipt.transaction_hash(),
            item_success,
        })
    }
}
