//! Process configuration, read from the environment (and `.env`) once at
//! startup. A missing required value is fatal.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use eyre::{bail, eyre, Result, WrapErr};
use log::warn;
use url::Url;

use crate::utils::constants::{ETHER, FLASHBOTS_RELAY_URL, GWEI, UNISWAP_FLASH_QUERY_ADDRESS, WETH};

/// Searcher configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Websocket RPC endpoint, used for block subscription and reads
    pub rpc_ws_url: String,
    /// Key authorized on the executor contract
    pub signer: PrivateKeySigner,
    /// Key identifying the searcher to the relay
    pub relay_signer: PrivateKeySigner,
    /// Executor contract
    pub executor: Address,
    /// Relay endpoint
    pub relay_url: Url,
    /// Chain id
    pub chain_id: u64,
    /// JSON market catalog
    pub markets_file: PathBuf,
    /// Common settlement asset
    pub base_token: Address,
    /// `UniswapFlashQuery` deployment
    pub flash_query: Address,
    /// Minimum profit in wei
    pub min_profit_wei: U256,
    /// Priority fee per gas in wei
    pub priority_fee_wei: u128,
    /// Gas limit of every bundle transaction
    pub gas_limit: u64,
    /// Share of profit meant for the block builder. Parsed but unused: the
    /// executor call carries no miner payment.
    pub miner_reward_percentage: u8,
    /// Bundles submitted per block
    pub max_bundles_per_block: usize,
    /// Pairs per reserve query
    pub reserve_batch_size: usize,
    /// Upper bound on waiting for one bundle's resolution
    pub resolution_timeout: Duration,
    /// Upper bound on one block cycle
    pub cycle_timeout: Duration,
    /// Optional uptime ping URL
    pub healthcheck_url: Option<String>,
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    ///
    /// # Errors
    /// * If a required variable is missing or any variable is malformed
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup.
    ///
    /// # Errors
    /// * If a required variable is missing or any variable is malformed
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| eyre!("{key} is not set"));

        let relay_signer = match var("FLASHBOTS_RELAY_SIGNING_KEY") {
            Some(key) => parse("FLASHBOTS_RELAY_SIGNING_KEY", &key)?,
            None => {
                let signer = PrivateKeySigner::random();
                warn!(
                    "config: FLASHBOTS_RELAY_SIGNING_KEY not set, using random relay key {}",
                    signer.address()
                );
                signer
            }
        };

        let miner_reward_percentage: u8 = parse_or(&var, "MINER_REWARD_PERCENTAGE", 80)?;
        if miner_reward_percentage > 100 {
            bail!("invalid MINER_REWARD_PERCENTAGE: {miner_reward_percentage} is above 100");
        }

        Ok(Self {
            rpc_ws_url: required("RPC_WS_URL")?,
            signer: parse("PRIVATE_KEY", &required("PRIVATE_KEY")?)?,
            relay_signer,
            executor: parse("BUNDLE_EXECUTOR_ADDRESS", &required("BUNDLE_EXECUTOR_ADDRESS")?)?,
            relay_url: parse_or(&var, "RELAY_URL", Url::parse(FLASHBOTS_RELAY_URL)?)?,
            chain_id: parse_or(&var, "CHAIN_ID", 1)?,
            markets_file: var("MARKETS_FILE").map_or_else(|| PathBuf::from("markets.json"), PathBuf::from),
            base_token: parse_or(&var, "BASE_TOKEN_ADDRESS", WETH)?,
            flash_query: parse_or(&var, "FLASH_QUERY_ADDRESS", UNISWAP_FLASH_QUERY_ADDRESS)?,
            min_profit_wei: parse_or(&var, "MIN_PROFIT_WEI", ETHER / U256::from(100))?,
            priority_fee_wei: parse_or(&var, "PRIORITY_FEE_WEI", GWEI)?,
            gas_limit: parse_or(&var, "GAS_LIMIT", 6_000_000)?,
            miner_reward_percentage,
            max_bundles_per_block: parse_or(&var, "MAX_BUNDLES_PER_BLOCK", 1)?,
            reserve_batch_size: parse_or(&var, "RESERVE_BATCH_SIZE", 200)?,
            resolution_timeout: Duration::from_secs(parse_or(&var, "RESOLUTION_TIMEOUT_SECS", 60)?),
            cycle_timeout: Duration::from_secs(parse_or(&var, "CYCLE_TIMEOUT_SECS", 90)?),
            healthcheck_url: var("HEALTHCHECK_URL"),
        })
    }
}

/// Parses one variable's value
fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| eyre!("{e}"))
        .wrap_err_with(|| format!("invalid {key}"))
}

/// Parses an optional variable, falling back to `default`
fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |value| parse(key, &value))
}
