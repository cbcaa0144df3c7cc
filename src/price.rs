//! USD valuation of incentive tokens.

use std::{collections::HashMap, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::{Error, Result, error::ResultExt, types::common::Address};

/// A source of USD unit prices.
///
/// A missing price is zero, never an error: a token with no quote still shows up in every view
/// with its raw amount, it just contributes nothing to USD sums or APR.
pub trait PriceLookup: Sync {
    fn usd_price(&self, token: Address) -> f64;
}

/// A fixed in-memory price table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticPrices(HashMap<Address, f64>);

impl PriceLookup for StaticPrices {
    fn usd_price(&self, token: Address) -> f64 {
        self.0.get(&token).copied().unwrap_or(0.0)
    }
}

impl FromIterator<(Address, f64)> for StaticPrices {
    fn from_iter<I: IntoIterator<Item = (Address, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    coins: HashMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    price: f64,
}

/// Fetches current USD prices from a DefiLlama-compatible price API.
#[derive(Clone, Debug)]
pub struct HttpPriceOracle {
    client: Client,
    base: Url,
}

impl HttpPriceOracle {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(|| Error::internal().context("building price API client"))?;
        Ok(Self { client, base })
    }

    /// Fetch prices for a set of tokens in one request.
    ///
    /// Tokens the API does not quote are left out of the returned table and thus price at zero.
    #[instrument(skip(self), fields(tokens = tokens.len()))]
    pub async fn fetch(&self, tokens: &[Address]) -> Result<StaticPrices> {
        if tokens.is_empty() {
            return Ok(StaticPrices::default());
        }

        let keys = tokens
            .iter()
            .map(|token| format!("ethereum:{token:#x}"))
            .collect::<Vec<_>>();
        let url = self
            .base
            .join(&format!("prices/current/{}", keys.join(",")))
            .context(|| Error::bad_request().context("building price API URL"))?;
        let response: PriceResponse = self
            .client
            .get(url)
            .send()
            .await
            .context(|| Error::internal().context("requesting token prices"))?
            .error_for_status()
            .context(|| Error::internal().context("price API returned an error status"))?
            .json()
            .await
            .context(|| Error::internal().context("decoding price API response"))?;

        let prices = tokens
            .iter()
            .zip(&keys)
            .filter_map(|(token, key)| match response.coins.get(key) {
                Some(coin) => Some((*token, coin.price)),
                None => {
                    tracing::warn!(%token, "no USD quote for token, valuing at zero");
                    None
                }
            })
            .collect();
        Ok(prices)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn test_static_prices_default_to_zero() {
        let quoted = Address::repeat_byte(1);
        let unquoted = Address::repeat_byte(2);
        let prices = [(quoted, 1.5)].into_iter().collect::<StaticPrices>();

        assert_eq!(prices.usd_price(quoted), 1.5);
        assert_eq!(prices.usd_price(unquoted), 0.0);
    }

    #[test_log::test]
    fn test_price_response_parsing() {
        let token = Address::repeat_byte(3);
        let key = format!("ethereum:{token:#x}");
        let body = format!(r#"{{"coins":{{"{key}":{{"price":2.25,"symbol":"TKN"}}}}}}"#);

        let response: PriceResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(response.coins[&key].price, 2.25);
    }
}
