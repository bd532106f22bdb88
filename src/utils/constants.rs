use alloy::primitives::{address, Address, U256};

/// WETH on Ethereum mainnet, the default base asset
pub const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
/// `UniswapFlashQuery` batch reserve reader on Ethereum mainnet
pub const UNISWAP_FLASH_QUERY_ADDRESS: Address =
    address!("0x5EF1009b9FCD4fec3094a5564047e190D72Bd511");
/// Default Flashbots relay endpoint
pub const FLASHBOTS_RELAY_URL: &str = "https://relay.flashbots.net";

/// 10^18, one whole unit of an 18-decimals token
pub const ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
/// 10^9 wei
pub const GWEI: u128 = 1_000_000_000;
