//! Signs executor transactions and submits them as bundles for the next
//! block, one attempt per bundle.

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::eip2930::AccessList;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, TxKind};
use alloy::signers::local::PrivateKeySigner;
use eyre::Result;
use futures_util::future::join_all;
use log::{info, warn};

use super::bundle::ArbTransaction;
use super::relay::{BundleRelay, RelayResponse, ResolutionOutcome, SignedBundle};

/// How many bundles one block may produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    /// Top-ranked opportunities submitted per block; they share a nonce, so
    /// at most one can land
    pub max_bundles_per_block: usize,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            max_bundles_per_block: 1,
        }
    }
}

/// Signs and submits bundles through a [`BundleRelay`].
#[derive(Debug)]
pub struct BundleSubmitter<R> {
    /// Relay
    relay: R,
    /// Key authorized on the executor contract
    signer: PrivateKeySigner,
    /// Per-block limits
    policy: SubmissionPolicy,
}

impl<R: BundleRelay> BundleSubmitter<R> {
    /// Submits through `relay`, signing with `signer`
    #[must_use]
    pub const fn new(relay: R, signer: PrivateKeySigner, policy: SubmissionPolicy) -> Self {
        Self {
            relay,
            signer,
            policy,
        }
    }

    /// Per-block limits
    #[must_use]
    pub const fn policy(&self) -> SubmissionPolicy {
        self.policy
    }

    /// Relay
    #[must_use]
    pub const fn relay(&self) -> &R {
        &self.relay
    }

    /// Address of the executor-authorized key
    #[must_use]
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Signs `transactions` as one bundle, numbering nonces from `nonce`.
    ///
    /// # Errors
    /// * If signing fails
    pub fn sign_bundle(&self, transactions: &[ArbTransaction], nonce: u64) -> Result<SignedBundle> {
        let mut signed_transactions = Vec::with_capacity(transactions.len());
        let mut tx_hashes = Vec::with_capacity(transactions.len());

        for (offset, transaction) in (0u64..).zip(transactions) {
            let mut tx = TxEip1559 {
                chain_id: transaction.chain_id,
                nonce: nonce + offset,
                gas_limit: transaction.fees.gas_limit,
                max_fee_per_gas: transaction.fees.max_fee_per_gas,
                max_priority_fee_per_gas: transaction.fees.max_priority_fee_per_gas,
                to: TxKind::Call(transaction.to),
                value: transaction.value,
                access_list: AccessList::default(),
                input: transaction.data.clone(),
            };
            let signature = self.signer.sign_transaction_sync(&mut tx)?;
            let envelope: TxEnvelope = tx.into_signed(signature).into();
            tx_hashes.push(*envelope.tx_hash());
            signed_transactions.push(envelope.encoded_2718().into());
        }

        Ok(SignedBundle {
            signed_transactions,
            tx_hashes,
            signer: self.signer.address(),
            nonce,
        })
    }

    /// Submits each transaction as its own bundle for `block_number + 1` and
    /// waits for every accepted bundle to resolve. Transactions beyond the
    /// policy limit are ignored. Nothing is resubmitted.
    ///
    /// Outcomes are returned in the order of `transactions`.
    ///
    /// A bundle the relay cannot be reached for resolves as a relay error;
    /// bundles already accepted are still waited on.
    ///
    /// # Errors
    /// * If the nonce cannot be read, signing fails, or the chain cannot be
    ///   read while waiting
    pub async fn submit(
        &self,
        transactions: &[ArbTransaction],
        block_number: u64,
    ) -> Result<Vec<ResolutionOutcome>> {
        let limit = self.policy.max_bundles_per_block.min(transactions.len());
        let transactions = &transactions[..limit];
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let target_block = block_number + 1;
        let nonce = self.relay.account_nonce(self.signer.address()).await?;

        let mut outcomes = vec![None; transactions.len()];
        let mut pending = Vec::new();
        for (index, transaction) in transactions.iter().enumerate() {
            let bundle = self.sign_bundle(std::slice::from_ref(transaction), nonce)?;
            match self.relay.send_raw_bundle(&bundle, target_block).await {
                Err(e) => {
                    warn!("submitter: sending bundle for block {target_block} failed: {e:?}");
                    outcomes[index] = Some(ResolutionOutcome::RelayError {
                        message: e.to_string(),
                    });
                }
                Ok(RelayResponse::Error { message }) => {
                    warn!("submitter: relay rejected bundle for block {target_block}: {message}");
                    outcomes[index] = Some(ResolutionOutcome::RelayError { message });
                }
                Ok(RelayResponse::Accepted(submission)) => {
                    info!(
                        "submitter: bundle {:?} sent for block {target_block} with nonce {nonce}",
                        submission.tx_hashes
                    );
                    pending.push((index, submission));
                }
            }
        }

        let waits = pending.iter().map(|(_, submission)| self.relay.wait(submission));
        for ((index, _), outcome) in pending.iter().zip(join_all(waits).await) {
            let outcome = outcome?;
            info!("submitter: bundle for block {target_block}: {outcome}");
            outcomes[*index] = Some(outcome);
        }

        Ok(outcomes.into_iter().flatten().collect())
    }
}
