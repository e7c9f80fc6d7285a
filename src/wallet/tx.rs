//! Guarded build-sign-submit transaction flow.
//!
//! Signing is delegated to the caller (typically a browser wallet) through
//! a callback that receives the base64-serialized unsigned transaction and
//! answers with a signature, an abort, or a request to retry with a fresh
//! blockhash. The wallet identity is re-checked after every suspension
//! point; a change aborts the flow with `WalletChanged`.

use crate::error::{ClientError, Result};
use crate::wallet::view::Wallet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::future::Future;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, instrument, warn};

/// The sign callback's answer.
#[derive(Debug, Clone)]
pub enum SignOutcome {
    /// Base58-encoded signature over the serialized transaction.
    Signed(String),
    /// Abandon the transaction; `complete_tx` returns `Ok(None)`.
    Abort,
    /// Re-build with a fresh blockhash (e.g. the previous one is near
    /// expiry) and call back again.
    Retry,
}

impl Wallet {
    /// Build, sign, and submit one transaction.
    ///
    /// `build` receives the wallet pubkey and must produce an unsigned
    /// transaction with that pubkey as fee payer; it may dispatch RPC
    /// calls of its own. `sign` receives the base64 unsigned transaction
    /// and the slots-until-expiry window.
    ///
    /// Returns the submitted signature string, or `None` when the signer
    /// aborted. Fails with [`ClientError::WalletChanged`] if the wallet
    /// identity changes anywhere along the flow; that error is never
    /// retried internally.
    #[instrument(skip(self, build, sign))]
    pub async fn complete_tx<B, BFut, S, SFut>(
        &self,
        build: B,
        sign: S,
    ) -> Result<Option<String>>
    where
        B: Fn(Pubkey) -> BFut,
        BFut: Future<Output = Result<Transaction>>,
        S: Fn(String, u64) -> SFut,
        SFut: Future<Output = Result<SignOutcome>>,
    {
        let (generation, wallet_pubkey) = self.capture_identity()?;

        loop {
            let mut transaction = build(wallet_pubkey).await?;
            self.ensure_generation(generation)?;

            let blockhash = self
                .pool
                .dispatch(|endpoint| async move { endpoint.get_latest_blockhash().await })
                .await?;
            self.ensure_generation(generation)?;
            transaction.message.recent_blockhash = blockhash;

            let unsigned = bincode::serialize(&transaction)
                .map_err(|err| ClientError::Decode(format!("serialize transaction: {err}")))?;
            let outcome = sign(BASE64.encode(&unsigned), self.config.sign_expiry_slots).await?;
            self.ensure_generation(generation)?;

            match outcome {
                SignOutcome::Abort => {
                    debug!("signer aborted transaction");
                    return Ok(None);
                }
                SignOutcome::Retry => {
                    debug!("signer requested a fresh blockhash");
                    continue;
                }
                SignOutcome::Signed(signature_b58) => {
                    let bytes = bs58::decode(&signature_b58)
                        .into_vec()
                        .map_err(|err| ClientError::Decode(format!("signature: {err}")))?;
                    let signature = Signature::try_from(bytes.as_slice())
                        .map_err(|_| ClientError::Decode("signature length".into()))?;

                    let signer_count = transaction.message.header.num_required_signatures as usize;
                    let position = transaction
                        .message
                        .account_keys
                        .iter()
                        .take(signer_count)
                        .position(|key| *key == wallet_pubkey)
                        .ok_or_else(|| {
                            ClientError::Decode("wallet is not a required signer".into())
                        })?;
                    transaction.signatures[position] = signature;

                    let raw = bincode::serialize(&transaction).map_err(|err| {
                        ClientError::Decode(format!("serialize transaction: {err}"))
                    })?;
                    return self.submit_tx(&raw).await.map(Some);
                }
            }
        }
    }

    /// Submit a serialized signed transaction, retrying on a fixed
    /// interval a bounded number of times. Exhaustion is terminal: the
    /// caller decides whether to rebuild and resubmit.
    #[instrument(skip(self, raw))]
    pub async fn submit_tx(&self, raw: &[u8]) -> Result<String> {
        let strategy = FixedInterval::new(self.config.submit_retry_delay)
            .take(self.config.submit_retry_limit);
        let attempts = self.config.submit_retry_limit + 1;

        RetryIf::spawn(
            strategy,
            || async {
                self.pool
                    .dispatch_once(|endpoint| {
                        let raw = raw.to_vec();
                        async move { endpoint.send_raw_transaction(&raw).await }
                    })
                    .await
            },
            // A shutdown pool will not recover; everything else gets the
            // bounded retry.
            |err: &ClientError| !matches!(err, ClientError::Shutdown),
        )
        .await
        .map_err(|err| match err {
            ClientError::Shutdown => ClientError::Shutdown,
            other => {
                warn!(err = %other, attempts, "transaction submission exhausted retries");
                ClientError::Submission {
                    attempts,
                    last_error: other.to_string(),
                }
            }
        })
    }
}
