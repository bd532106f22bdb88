//! # Execution Module
//!
//! Everything between a ranked opportunity and a resolved relay attempt:
//! fee fields, the executor call, signing, submission and resolution.

/// Executor call construction
pub mod bundle;
/// Fee estimation
pub mod fees;
/// Relay protocol
pub mod relay;
/// Bundle signing and submission
pub mod submitter;
/// Test helpers and utilities
#[cfg(test)]
pub(crate) mod test_helpers;
