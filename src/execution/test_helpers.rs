use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, U256};
use eyre::{bail, Result};

use super::bundle::ArbTransaction;
use super::fees::{FeeEstimator, FeeParams};
use super::relay::{BundleRelay, RelayResponse, ResolutionOutcome, SignedBundle, Submission};

/// Relay answering every bundle with a fixed response
#[derive(Debug)]
pub struct ScriptedRelay {
    pub nonce: u64,
    pub rejection: Option<String>,
    /// Sends from this index on fail at the transport level
    pub unreachable_from: Option<usize>,
    pub outcome: ResolutionOutcome,
    pub sends: AtomicUsize,
    pub waits: AtomicUsize,
    pub sent: Mutex<Vec<(SignedBundle, u64)>>,
}

impl ScriptedRelay {
    #[allow(dead_code)]
    pub fn resolving(outcome: ResolutionOutcome) -> Self {
        Self {
            nonce: 3,
            rejection: None,
            unreachable_from: None,
            outcome,
            sends: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn rejecting(message: &str) -> Self {
        Self {
            rejection: Some(message.to_string()),
            ..Self::resolving(ResolutionOutcome::Included)
        }
    }

    #[allow(dead_code)]
    pub fn unreachable_from(mut self, send: usize) -> Self {
        self.unreachable_from = Some(send);
        self
    }
}

impl BundleRelay for ScriptedRelay {
    async fn account_nonce(&self, _account: Address) -> Result<u64> {
        Ok(self.nonce)
    }

    async fn send_raw_bundle(&self, bundle: &SignedBundle, target_block: u64) -> Result<RelayResponse> {
        let send = self.sends.fetch_add(1, Ordering::SeqCst);
        if self.unreachable_from.is_some_and(|from| send >= from) {
            bail!("relay connection refused");
        }
        self.sent.lock().unwrap().push((bundle.clone(), target_block));
        Ok(match &self.rejection {
            Some(message) => RelayResponse::Error {
                message: message.clone(),
            },
            None => RelayResponse::Accepted(Submission::new(bundle, target_block)),
        })
    }

    async fn wait(&self, _submission: &Submission) -> Result<ResolutionOutcome> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

/// An executor transaction carrying `data`
#[allow(dead_code)]
pub fn transaction(data: &'static [u8]) -> ArbTransaction {
    ArbTransaction {
        chain_id: 1,
        to: Address::repeat_byte(0xee),
        value: U256::ZERO,
        data: Bytes::from_static(data),
        fees: FeeEstimator::new(FeeParams::default()).estimate(Some(100), 1),
    }
}
