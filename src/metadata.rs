//! Resolution of ERC-20 display metadata for incentive tokens.

use std::collections::HashMap;

use alloy::{
    primitives::Bytes,
    sol_types::{SolCall, SolValue},
};
use parking_lot::RwLock;
use tracing::instrument;

use crate::{
    Result,
    contract::Erc20,
    types::common::{Address, TokenInfo},
};

/// One metadata read against one token contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetadataCall {
    pub token: Address,
    pub selector: [u8; 4],
}

/// A batched reader of raw metadata call results.
///
/// One `read_many` round trip carries the whole batch. Each slot is `None` when the underlying
/// call reverted or returned nothing, which is common for tokens that do not implement the
/// optional metadata surface.
pub trait TokenMetadataSource: Sync {
    fn read_many(
        &self,
        calls: Vec<MetadataCall>,
    ) -> impl Send + Future<Output = Result<Vec<Option<Bytes>>>>;
}

/// Resolves and caches token metadata.
///
/// Resolution is infallible: a token whose reads fail or decode badly gets a fallback
/// [`TokenInfo`] with a truncated address for a name and 18 assumed decimals, so one broken
/// token contract never blocks ledger reconstruction.
#[derive(Debug)]
pub struct MetadataResolver<S> {
    source: S,
    cache: RwLock<HashMap<Address, TokenInfo>>,
}

impl<S: TokenMetadataSource> MetadataResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::default(),
        }
    }

    /// Resolve metadata for a set of tokens, deduplicated, in one batched read.
    ///
    /// Tokens already in the cache are not fetched again.
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        tokens: impl IntoIterator<Item = Address>,
    ) -> HashMap<Address, TokenInfo> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        {
            let cache = self.cache.read();
            for token in tokens {
                if resolved.contains_key(&token) || missing.contains(&token) {
                    continue;
                }
                match cache.get(&token) {
                    Some(info) => {
                        resolved.insert(token, info.clone());
                    }
                    None => missing.push(token),
                }
            }
        }
        if missing.is_empty() {
            return resolved;
        }
        tracing::debug!(missing = missing.len(), "fetching token metadata");

        let calls = missing
            .iter()
            .flat_map(|token| {
                [
                    Erc20::nameCall::SELECTOR,
                    Erc20::symbolCall::SELECTOR,
                    Erc20::decimalsCall::SELECTOR,
                ]
                .map(|selector| MetadataCall {
                    token: *token,
                    selector,
                })
            })
            .collect();
        let returns = match self.source.read_many(calls).await {
            Ok(returns) if returns.len() == 3 * missing.len() => returns,
            Ok(returns) => {
                tracing::warn!(
                    expected = 3 * missing.len(),
                    got = returns.len(),
                    "short metadata batch, falling back for all tokens in it"
                );
                vec![None; 3 * missing.len()]
            }
            Err(err) => {
                tracing::warn!("metadata batch failed, falling back: {err:#}");
                vec![None; 3 * missing.len()]
            }
        };

        let mut cache = self.cache.write();
        for (token, fields) in missing.into_iter().zip(returns.chunks(3)) {
            let info = decode_info(token, fields).unwrap_or_else(|| {
                tracing::warn!(%token, "token metadata unavailable, using fallback");
                TokenInfo::fallback(token)
            });
            cache.insert(token, info.clone());
            resolved.insert(token, info);
        }
        resolved
    }
}

fn decode_info(token: Address, fields: &[Option<Bytes>]) -> Option<TokenInfo> {
    let [name, symbol, decimals] = fields else {
        return None;
    };
    Some(TokenInfo {
        name: String::abi_decode(name.as_ref()?).ok()?,
        symbol: String::abi_decode(symbol.as_ref()?).ok()?,
        decimals: Erc20::decimalsCall::abi_decode_returns(decimals.as_ref()?).ok()?,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::input::testing::MemoryMetadataSource;

    use super::*;

    fn usdc() -> (Address, TokenInfo) {
        (
            Address::repeat_byte(0xa1),
            TokenInfo {
                name: "USD Coin".into(),
                symbol: "USDC".into(),
                decimals: 6,
            },
        )
    }

    fn weth() -> (Address, TokenInfo) {
        (
            Address::repeat_byte(0xa2),
            TokenInfo {
                name: "Wrapped Ether".into(),
                symbol: "WETH".into(),
                decimals: 18,
            },
        )
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_batches_and_dedups() {
        let (usdc_addr, usdc_info) = usdc();
        let (weth_addr, weth_info) = weth();
        let resolver = MetadataResolver::new(MemoryMetadataSource::new([usdc(), weth()]));

        // Duplicates collapse into one batched round trip.
        let resolved = resolver
            .resolve([usdc_addr, weth_addr, usdc_addr, usdc_addr])
            .await;
        assert_eq!(resolver.source.round_trips(), 1);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&usdc_addr], usdc_info);
        assert_eq!(resolved[&weth_addr], weth_info);
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_falls_back_for_unknown_token() {
        let resolver = MetadataResolver::new(MemoryMetadataSource::default());
        let token = Address::repeat_byte(0xbb);

        let resolved = resolver.resolve([token]).await;
        assert_eq!(resolved[&token], TokenInfo::fallback(token));
        assert_eq!(resolved[&token].decimals, 18);
    }

    #[test_log::test(tokio::test)]
    async fn test_resolve_caches_across_calls() {
        let (usdc_addr, usdc_info) = usdc();
        let resolver = MetadataResolver::new(MemoryMetadataSource::new([usdc()]));

        assert_eq!(resolver.resolve([usdc_addr]).await[&usdc_addr], usdc_info);
        assert_eq!(resolver.resolve([usdc_addr]).await[&usdc_addr], usdc_info);

        // The second resolve is answered entirely from the cache.
        assert_eq!(resolver.source.round_trips(), 1);
    }
}
