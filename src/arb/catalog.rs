//! Market catalog and per-block reserve refresh.
//!
//! The catalog holds the immutable identities of every tracked venue. Each
//! block, [`MarketCatalog::refresh`] reads fresh reserves for all of them and
//! returns a new [`MarketsByToken`] snapshot owned by that block's cycle.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::sol;
use eyre::{bail, Result, WrapErr};
use futures_util::future::join_all;
use log::{debug, info, warn};

use super::market::Market;
use super::uniswap_v2::UniswapV2Market;

sol! {
    #[sol(rpc)]
    interface IUniswapFlashQuery {
        function getReservesByPairs(address[] calldata _pairs) external view returns (uint256[3][] memory);
    }
}

/// Venues grouped by the non-base token they quote against the base asset.
/// Tokens iterate in address order, which keeps ranking ties deterministic.
pub type MarketsByToken<M> = BTreeMap<Address, Vec<Arc<M>>>;

/// Reserves information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    /// Reserve 0
    pub reserve0: U256,
    /// Reserve 1
    pub reserve1: U256,
    /// Block timestamp last
    pub block_timestamp_last: U256,
}

impl From<[U256; 3]> for Reserves {
    fn from(reserves: [U256; 3]) -> Self {
        Self {
            reserve0: reserves[0],
            reserve1: reserves[1],
            block_timestamp_last: reserves[2],
        }
    }
}

/// Anything that can read current reserves for a list of pairs.
pub trait ReserveSource: Send + Sync {
    /// Reserves for `pairs`, in the same order.
    ///
    /// # Errors
    /// * If any read fails; a partial refresh is never returned
    fn fetch_reserves(&self, pairs: &[Address]) -> impl Future<Output = Result<Vec<Reserves>>> + Send;
}

/// Reads reserves through the on-chain `UniswapFlashQuery` helper, in
/// concurrent chunks.
#[derive(Debug, Clone)]
pub struct FlashQueryReserves<P> {
    /// Chain provider
    provider: P,
    /// `UniswapFlashQuery` deployment
    query_address: Address,
    /// Pairs per `getReservesByPairs` call
    batch_size: usize,
}

impl<P> FlashQueryReserves<P>
where
    P: Provider<Ethereum> + Clone,
{
    /// Creates a reader. A zero batch size is treated as one pair per call.
    #[must_use]
    pub fn new(provider: P, query_address: Address, batch_size: usize) -> Self {
        Self {
            provider,
            query_address,
            batch_size: batch_size.max(1),
        }
    }

    /// One `getReservesByPairs` call
    async fn fetch_chunk(&self, pairs: &[Address]) -> Result<Vec<Reserves>> {
        let query = IUniswapFlashQuery::new(self.query_address, &self.provider);
        Ok(query
            .getReservesByPairs(pairs.to_vec())
            .call()
            .await?
            ._0
            .into_iter()
            .map(Reserves::from)
            .collect())
    }
}

/// Splits `pairs` into `batch_size` chunks, fetches them concurrently and
/// joins the results in pair order. Fails unless every chunk succeeds with
/// one entry per pair.
async fn fetch_in_chunks<'a, F, Fut>(pairs: &'a [Address], batch_size: usize, fetch_chunk: F) -> Result<Vec<Reserves>>
where
    F: Fn(&'a [Address]) -> Fut,
    Fut: Future<Output = Result<Vec<Reserves>>>,
{
    let chunks: Vec<&[Address]> = pairs.chunks(batch_size.max(1)).collect();
    let results = join_all(chunks.iter().map(|chunk| fetch_chunk(*chunk))).await;

    // Every chunk must land before any market is quoted
    let mut reserves = Vec::with_capacity(pairs.len());
    for (chunk, result) in chunks.iter().zip(results) {
        let chunk_reserves = result?;
        if chunk_reserves.len() != chunk.len() {
            bail!(
                "getReservesByPairs returned {} entries for {} pairs",
                chunk_reserves.len(),
                chunk.len()
            );
        }
        reserves.extend(chunk_reserves);
    }
    Ok(reserves)
}

impl<P> ReserveSource for FlashQueryReserves<P>
where
    P: Provider<Ethereum> + Clone,
{
    async fn fetch_reserves(&self, pairs: &[Address]) -> Result<Vec<Reserves>> {
        fetch_in_chunks(pairs, self.batch_size, |chunk| self.fetch_chunk(chunk)).await
    }
}

/// The tracked venues: every pair pairing the base asset with a token that
/// at least two venues quote.
#[derive(Debug, Clone)]
pub struct MarketCatalog {
    /// The common settlement asset
    base_token: Address,
    /// Tracked pairs, grouped by token in [`MarketCatalog::refresh`]
    markets: Vec<UniswapV2Market>,
}

impl MarketCatalog {
    /// Builds the catalog from candidate pairs.
    ///
    /// Pairs that do not trade the base asset, duplicates, and tokens with a
    /// single venue are dropped: there is nothing to cross them against.
    #[must_use]
    pub fn new(base_token: Address, candidates: Vec<UniswapV2Market>) -> Self {
        let mut seen = HashSet::new();
        let mut venues_per_token: BTreeMap<Address, usize> = BTreeMap::new();
        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|market| market.has_token(base_token) && seen.insert(market.address()))
            .collect();
        for market in &candidates {
            *venues_per_token.entry(Self::other_token(base_token, market)).or_default() += 1;
        }

        let markets: Vec<_> = candidates
            .into_iter()
            .filter(|market| venues_per_token[&Self::other_token(base_token, market)] > 1)
            .collect();

        info!(
            "catalog: tracking {} markets across {} tokens",
            markets.len(),
            venues_per_token.values().filter(|count| **count > 1).count()
        );

        Self {
            base_token,
            markets,
        }
    }

    /// Loads candidate pairs from a JSON array of
    /// `{ "address", "protocol"?, "token0", "token1" }` entries.
    ///
    /// # Errors
    /// * If the file cannot be read or parsed
    /// * If an entry pairs a token with itself
    pub fn from_file(base_token: Address, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading market catalog {}", path.display()))?;
        let entries: Vec<UniswapV2Market> = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("parsing market catalog {}", path.display()))?;

        let candidates = entries
            .into_iter()
            .map(|entry| {
                let [token0, token1] = entry.tokens();
                UniswapV2Market::new(entry.address(), entry.protocol(), token0, token1)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(base_token, candidates))
    }

    /// The common settlement asset
    #[must_use]
    pub const fn base_token(&self) -> Address {
        self.base_token
    }

    /// Tracked pairs
    #[must_use]
    pub fn markets(&self) -> &[UniswapV2Market] {
        &self.markets
    }

    /// Number of tracked pairs
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    /// Whether no pair is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Reads fresh reserves for every tracked pair and returns this block's
    /// snapshot.
    ///
    /// # Errors
    /// * If the reserve source fails or returns the wrong number of entries
    pub async fn refresh<S: ReserveSource>(&self, source: &S) -> Result<MarketsByToken<UniswapV2Market>> {
        let addresses: Vec<Address> = self.markets.iter().map(Market::address).collect();
        let reserves = source.fetch_reserves(&addresses).await?;
        if reserves.len() != self.markets.len() {
            bail!(
                "Reserve source returned {} entries for {} markets",
                reserves.len(),
                self.markets.len()
            );
        }

        let mut by_token = MarketsByToken::new();
        for (market, reserves) in self.markets.iter().zip(&reserves) {
            if reserves.reserve0.is_zero() || reserves.reserve1.is_zero() {
                warn!("catalog: {market} has empty reserves");
            }
            by_token
                .entry(Self::other_token(self.base_token, market))
                .or_insert_with(Vec::new)
                .push(Arc::new(market.with_reserves(reserves)));
        }
        debug!("catalog: refreshed {} markets", self.markets.len());
        Ok(by_token)
    }

    /// The token a base-asset pair trades against the base asset
    fn other_token(base_token: Address, market: &UniswapV2Market) -> Address {
        let [token0, token1] = market.tokens();
        if token0 == base_token {
            token1
        } else {
            token0
        }
    }
}
