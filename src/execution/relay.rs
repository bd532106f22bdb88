//! Private relay access: bundle submission and resolution tracking.

use std::future::Future;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::providers::Provider;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use derive_more::Display;
use eyre::Result;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use url::Url;

/// Signed transactions of one bundle, all from one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBundle {
    /// EIP-2718 encoded signed transactions, in execution order
    pub signed_transactions: Vec<Bytes>,
    /// Hash of each transaction
    pub tx_hashes: Vec<B256>,
    /// Signing account
    pub signer: Address,
    /// Nonce the transactions were signed with
    pub nonce: u64,
}

/// A bundle the relay accepted for a target block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The only block the bundle may land in
    pub target_block: u64,
    /// Hash of each bundled transaction
    pub tx_hashes: Vec<B256>,
    /// Signing account
    pub signer: Address,
    /// Nonce the transactions were signed with
    pub nonce: u64,
}

impl Submission {
    /// Tracks `bundle` for `target_block`
    #[must_use]
    pub fn new(bundle: &SignedBundle, target_block: u64) -> Self {
        Self {
            target_block,
            tx_hashes: bundle.tx_hashes.clone(),
            signer: bundle.signer,
            nonce: bundle.nonce,
        }
    }
}

/// The relay's synchronous answer to a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResponse {
    /// Accepted; resolution is pending
    Accepted(Submission),
    /// Rejected outright
    Error {
        /// Relay error message
        message: String,
    },
}

/// How a submission attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ResolutionOutcome {
    /// Mined in the target block
    #[display("included")]
    Included,
    /// The target block passed without the bundle
    #[display("not included by deadline")]
    NotIncludedByDeadline,
    /// The account nonce moved before the target block; the bundle can no
    /// longer land
    #[display("nonce too high")]
    NonceTooHigh,
    /// The relay rejected the bundle
    #[display("relay error: {message}")]
    RelayError {
        /// Relay error message
        message: String,
    },
}

/// A private bundle relay.
pub trait BundleRelay: Send + Sync {
    /// Current on-chain transaction count of `account`
    ///
    /// # Errors
    /// * If the chain cannot be read
    fn account_nonce(&self, account: Address) -> impl Future<Output = Result<u64>> + Send;

    /// Submits `bundle` for inclusion in exactly `target_block`.
    ///
    /// # Errors
    /// * On transport failures; relay rejections are a [`RelayResponse::Error`]
    fn send_raw_bundle(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> impl Future<Output = Result<RelayResponse>> + Send;

    /// Waits until `submission` resolves.
    ///
    /// # Errors
    /// * If the chain cannot be read while waiting
    fn wait(&self, submission: &Submission) -> impl Future<Output = Result<ResolutionOutcome>> + Send;
}

/// Timing of [`FlashbotsRelay::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    /// Delay between chain polls
    pub poll_interval: Duration,
    /// Upper bound on one wait; expiry counts as not included
    pub resolution_timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            resolution_timeout: Duration::from_secs(60),
        }
    }
}

/// Flashbots relay over JSON-RPC, with resolution tracked on-chain.
#[derive(Debug, Clone)]
pub struct FlashbotsRelay<P> {
    /// Chain provider used for nonces and receipts
    provider: P,
    /// HTTP client for the relay
    client: Client,
    /// Relay endpoint
    relay_url: Url,
    /// Reputation key signing relay requests; never holds funds
    auth_signer: PrivateKeySigner,
    /// Resolution timing
    wait_settings: WaitSettings,
}

impl<P> FlashbotsRelay<P>
where
    P: Provider<Ethereum>,
{
    /// Creates a relay client.
    ///
    /// # Errors
    /// * If the HTTP client cannot be built
    pub fn new(
        provider: P,
        relay_url: Url,
        auth_signer: PrivateKeySigner,
        wait_settings: WaitSettings,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            provider,
            client,
            relay_url,
            auth_signer,
            wait_settings,
        })
    }

    /// Polls the chain until the submission resolves
    async fn poll_resolution(&self, submission: &Submission) -> Result<ResolutionOutcome> {
        loop {
            let head = self.provider.get_block_number().await?;
            if head < submission.target_block {
                let nonce = self.provider.get_transaction_count(submission.signer).await?;
                if let Some(outcome) = resolve_before_target(submission, nonce) {
                    return Ok(outcome);
                }
            } else {
                let mut receipt_blocks = Vec::with_capacity(submission.tx_hashes.len());
                for hash in &submission.tx_hashes {
                    let receipt = self.provider.get_transaction_receipt(*hash).await?;
                    receipt_blocks.push(receipt.and_then(|r| r.block_number));
                }
                return Ok(resolve_at_target(submission, &receipt_blocks));
            }
            sleep(self.wait_settings.poll_interval).await;
        }
    }
}

/// Resolution while the chain head is still below the target block: the
/// bundle is dead once the signer's nonce has moved past it
#[must_use]
const fn resolve_before_target(submission: &Submission, account_nonce: u64) -> Option<ResolutionOutcome> {
    if account_nonce > submission.nonce {
        Some(ResolutionOutcome::NonceTooHigh)
    } else {
        None
    }
}

/// Resolution once the target block exists. `receipt_blocks` holds the
/// block each bundled transaction was mined in, in bundle order. Every
/// transaction must have landed in the target block.
#[must_use]
fn resolve_at_target(submission: &Submission, receipt_blocks: &[Option<u64>]) -> ResolutionOutcome {
    let landed = receipt_blocks.len() == submission.tx_hashes.len()
        && receipt_blocks
            .iter()
            .all(|block| *block == Some(submission.target_block));
    if landed {
        ResolutionOutcome::Included
    } else {
        ResolutionOutcome::NotIncludedByDeadline
    }
}

/// Bounds `resolution` by `limit`; running out of time counts as not
/// included
async fn resolve_within<F>(limit: Duration, target_block: u64, resolution: F) -> Result<ResolutionOutcome>
where
    F: Future<Output = Result<ResolutionOutcome>>,
{
    match timeout(limit, resolution).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("relay: no resolution for block {target_block} after {limit:?}");
            Ok(ResolutionOutcome::NotIncludedByDeadline)
        }
    }
}

/// `X-Flashbots-Signature` value: the auth address and its EIP-191
/// signature of the hex keccak256 of the request body
fn flashbots_signature(auth_signer: &PrivateKeySigner, body: &[u8]) -> Result<String> {
    let digest = format!("{:#x}", keccak256(body));
    let signature = auth_signer.sign_message_sync(digest.as_bytes())?;
    Ok(format!(
        "{:#x}:0x{}",
        auth_signer.address(),
        hex::encode(signature.as_bytes())
    ))
}

/// `eth_sendBundle` request body
fn send_bundle_body(bundle: &SignedBundle, target_block: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "eth_sendBundle",
        "params": [{
            "txs": bundle.signed_transactions,
            "blockNumber": format!("{target_block:#x}"),
        }]
    })
}

/// Reads a relay JSON-RPC response: any `error` member is a rejection
fn parse_relay_response(response: &Value, submission: Submission) -> RelayResponse {
    match response.get("error") {
        Some(error) => RelayResponse::Error {
            message: error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string),
        },
        None => RelayResponse::Accepted(submission),
    }
}

impl<P> BundleRelay for FlashbotsRelay<P>
where
    P: Provider<Ethereum>,
{
    async fn account_nonce(&self, account: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(account).await?)
    }

    async fn send_raw_bundle(&self, bundle: &SignedBundle, target_block: u64) -> Result<RelayResponse> {
        let body = serde_json::to_vec(&send_bundle_body(bundle, target_block))?;
        let signature = flashbots_signature(&self.auth_signer, &body)?;

        let response: Value = self
            .client
            .post(self.relay_url.clone())
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", signature)
            .body(body)
            .send()
            .await?
            .json()
            .await?;
        debug!("relay: eth_sendBundle for block {target_block}: {response}");

        Ok(parse_relay_response(
            &response,
            Submission::new(bundle, target_block),
        ))
    }

    async fn wait(&self, submission: &Submission) -> Result<ResolutionOutcome> {
        resolve_within(
            self.wait_settings.resolution_timeout,
            submission.target_block,
            self.poll_resolution(submission),
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use alloy::primitives::{address, bytes};

    use super::*;

    fn bundle() -> SignedBundle {
        SignedBundle {
            signed_transactions: vec![bytes!("02f8")],
            tx_hashes: vec![B256::repeat_byte(0xab)],
            signer: address!("0x1111111111111111111111111111111111111111"),
            nonce: 7,
        }
    }

    #[test]
    fn test_send_bundle_body() {
        let body = send_bundle_body(&bundle(), 17_000_001);

        assert_eq!(body["method"], "eth_sendBundle");
        assert_eq!(body["params"][0]["txs"][0], "0x02f8");
        assert_eq!(body["params"][0]["blockNumber"], "0x1036641");
    }

    #[test]
    fn test_relay_error_response() {
        let submission = Submission::new(&bundle(), 10);
        let response = json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "bundle rejected" } });

        assert_eq!(
            parse_relay_response(&response, submission),
            RelayResponse::Error {
                message: "bundle rejected".to_string()
            }
        );
    }

    #[test]
    fn test_relay_accepted_response() {
        let submission = Submission::new(&bundle(), 10);
        let response = json!({ "jsonrpc": "2.0", "id": 1, "result": { "bundleHash": "0x01" } });

        match parse_relay_response(&response, submission) {
            RelayResponse::Accepted(submission) => {
                assert_eq!(submission.target_block, 10);
                assert_eq!(submission.nonce, 7);
                assert_eq!(submission.tx_hashes, bundle().tx_hashes);
            }
            RelayResponse::Error { message } => panic!("unexpected relay error: {message}"),
        }
    }

    #[test]
    fn test_flashbots_signature_header() {
        let signer = PrivateKeySigner::random();
        let header = flashbots_signature(&signer, b"{}").unwrap();

        let (account, signature) = header.split_once(':').unwrap();
        assert_eq!(account, format!("{:#x}", signer.address()));
        assert!(signature.starts_with("0x"));
        assert_eq!(hex::decode(&signature[2..]).unwrap().len(), 65);
    }

    fn two_transaction_submission() -> Submission {
        let mut bundle = bundle();
        bundle.tx_hashes.push(B256::repeat_byte(0xcd));
        Submission::new(&bundle, 10)
    }

    #[test]
    fn test_nonce_unchanged_before_target_keeps_waiting() {
        let submission = Submission::new(&bundle(), 10);

        assert_eq!(resolve_before_target(&submission, 7), None);
        assert_eq!(resolve_before_target(&submission, 6), None);
    }

    #[test]
    fn test_nonce_moved_before_target() {
        let submission = Submission::new(&bundle(), 10);

        assert_eq!(
            resolve_before_target(&submission, 8),
            Some(ResolutionOutcome::NonceTooHigh)
        );
    }

    #[test]
    fn test_included_in_target_block() {
        let submission = two_transaction_submission();

        assert_eq!(
            resolve_at_target(&submission, &[Some(10), Some(10)]),
            ResolutionOutcome::Included
        );
    }

    #[test]
    fn test_receipt_outside_target_block_is_not_included() {
        let submission = two_transaction_submission();

        for receipts in [
            [None, None],
            [Some(11), Some(11)],
            [Some(9), Some(9)],
        ] {
            assert_eq!(
                resolve_at_target(&submission, &receipts),
                ResolutionOutcome::NotIncludedByDeadline
            );
        }
    }

    #[test]
    fn test_partially_mined_bundle_is_not_included() {
        let submission = two_transaction_submission();

        assert_eq!(
            resolve_at_target(&submission, &[Some(10), None]),
            ResolutionOutcome::NotIncludedByDeadline
        );
        assert_eq!(
            resolve_at_target(&submission, &[Some(10)]),
            ResolutionOutcome::NotIncludedByDeadline
        );
    }

    #[tokio::test]
    async fn test_resolution_timeout_counts_as_not_included() {
        let outcome = resolve_within(
            Duration::from_millis(20),
            10,
            std::future::pending::<Result<ResolutionOutcome>>(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, ResolutionOutcome::NotIncludedByDeadline);
    }

    #[tokio::test]
    async fn test_resolution_within_limit() {
        let outcome = resolve_within(Duration::from_secs(5), 10, async {
            Ok(ResolutionOutcome::NonceTooHigh)
        })
        .await
        .unwrap();

        assert_eq!(outcome, ResolutionOutcome::NonceTooHigh);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ResolutionOutcome::NonceTooHigh.to_string(), "nonce too high");
        assert_eq!(
            ResolutionOutcome::RelayError {
                message: "boom".to_string()
            }
            .to_string(),
            "relay error: boom"
        );
    }
}
