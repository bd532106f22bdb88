/*!
 * # Fly - Block-synchronized AMM Arbitrage
 *
 * Fly watches constant-product venues that quote the same token against a
 * common base asset. For every new block it refreshes reserves, finds venue
 * pairs whose prices have crossed, sizes the round trip, and submits it as a
 * private bundle targeting the next block.
 *
 * ## Module Structure
 *
 * - `arb`: Venue modelling, market catalog and the opportunity finder
 * - `execution`: Fees, executor calls, relay submission and resolution
 * - `scheduler`: One cycle per block, never two at once
 * - `bot`: The per-block cycle
 * - `config`: Configuration from the environment
 * - `notify`: Health check pings
 * - `utils`: Logging, providers and constants
 */

/// Venue modelling and opportunity search
pub mod arb;
/// The per-block arbitrage cycle
pub mod bot;
/// Configuration management for the system
pub mod config;
/// Bundle construction and submission
pub mod execution;
/// Health check pings
pub mod notify;
/// Block-driven cycle scheduling
pub mod scheduler;
/// Utility functions and helpers
pub mod utils;
