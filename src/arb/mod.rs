//! # Arbitrage Module
//!
//! Venue modelling and the per-block search for crossed venue pairs.

/// Market catalog and reserve refresh
pub mod catalog;
/// Crossed pair search and trade sizing
pub mod finder;
/// Venue capability
pub mod market;
/// Crossed opportunities
pub mod opportunity;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;
/// Constant-product venues
pub mod uniswap_v2;
