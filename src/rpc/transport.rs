//! The transport seam between the client and an RPC server.
//!
//! [`RpcTransport`] is the minimal surface the pool, cache, and wallet need;
//! [`SolanaRpcTransport`] implements it over the nonblocking
//! `solana-client` at `confirmed` commitment. Tests substitute their own
//! implementations. Transport failures are opaque to everything above this
//! module: they become [`ClientError::Transport`] strings and are handled by
//! the uniform rotate-and-retry policy.

use crate::error::{ClientError, Result};
use crate::types::{AccountData, EpochInfo, TokenAccountInfo};
use async_trait::async_trait;
use solana_account_decoder::{UiAccountData, UiAccountEncoding, UiDataSliceConfig};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use tracing::debug;

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Network genesis fingerprint; all endpoints of one pool must agree.
    async fn get_genesis_hash(&self) -> Result<String>;

    async fn get_epoch_info(&self) -> Result<EpochInfo>;

    async fn get_block_time(&self, slot: u64) -> Result<i64>;

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<AccountData>>;

    /// Fetch only `length` bytes of account data starting at `offset`.
    async fn get_account_slice(
        &self,
        pubkey: &Pubkey,
        offset: usize,
        length: usize,
    ) -> Result<Option<AccountData>>;

    /// Batched fetch; missing accounts come back as `None` in position.
    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<AccountData>>>;

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64>;

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>>;

    /// Program accounts whose data matches `bytes` at `offset`.
    async fn get_program_accounts_memcmp(
        &self,
        program: &Pubkey,
        offset: usize,
        bytes: &Pubkey,
    ) -> Result<Vec<(Pubkey, AccountData)>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Submit a serialized, signed transaction; returns the signature
    /// string.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String>;
}

fn transport_err(err: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(err.to_string())
}

/// Production transport over `solana-client`.
pub struct SolanaRpcTransport {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpcTransport {
    pub fn new(url: &str) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: RpcClient::new_with_commitment(url.to_string(), commitment),
            commitment,
        }
    }
}

#[async_trait]
impl RpcTransport for SolanaRpcTransport {
    async fn get_genesis_hash(&self) -> Result<String> {
        self.client
            .get_genesis_hash()
            .await
            .map(|hash| hash.to_string())
            .map_err(transport_err)
    }

    async fn get_epoch_info(&self) -> Result<EpochInfo> {
        let info = self.client.get_epoch_info().await.map_err(transport_err)?;
        Ok(EpochInfo {
            epoch: info.epoch,
            absolute_slot: info.absolute_slot,
            slot_index: info.slot_index,
            slots_in_epoch: info.slots_in_epoch,
        })
    }

    async fn get_block_time(&self, slot: u64) -> Result<i64> {
        self.client.get_block_time(slot).await.map_err(transport_err)
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<AccountData>> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map_err(transport_err)?;
        Ok(response.value.map(|account| AccountData {
            lamports: account.lamports,
            data: account.data,
        }))
    }

    async fn get_account_slice(
        &self,
        pubkey: &Pubkey,
        offset: usize,
        length: usize,
    ) -> Result<Option<AccountData>> {
        let config = RpcAccountInfoConfig {
            encoding: Some(UiAccountEncoding::Base64),
            data_slice: Some(UiDataSliceConfig { offset, length }),
            commitment: Some(self.commitment),
            ..RpcAccountInfoConfig::default()
        };
        let response = self
            .client
            .get_account_with_config(pubkey, config)
            .await
            .map_err(transport_err)?;
        Ok(response.value.map(|account| AccountData {
            lamports: account.lamports,
            data: account.data,
        }))
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<AccountData>>> {
        let accounts = self
            .client
            .get_multiple_accounts(pubkeys)
            .await
            .map_err(transport_err)?;
        Ok(accounts
            .into_iter()
            .map(|maybe| {
                maybe.map(|account| AccountData {
                    lamports: account.lamports,
                    data: account.data,
                })
            })
            .collect())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.client.get_balance(pubkey).await.map_err(transport_err)
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>> {
        let keyed = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(*token_program))
            .await
            .map_err(transport_err)?;

        let mut accounts = Vec::with_capacity(keyed.len());
        for item in keyed {
            let Ok(pubkey) = Pubkey::from_str(&item.pubkey) else {
                continue;
            };
            let UiAccountData::Json(parsed) = &item.account.data else {
                debug!(account = %item.pubkey, "token account not json-parsed; skipping");
                continue;
            };
            let info = &parsed.parsed["info"];
            let (Some(mint), Some(account_owner)) = (
                info["mint"].as_str().and_then(|s| Pubkey::from_str(s).ok()),
                info["owner"].as_str().and_then(|s| Pubkey::from_str(s).ok()),
            ) else {
                continue;
            };
            let amount = info["tokenAmount"]["amount"]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let initialized = info["state"].as_str() == Some("initialized");
            accounts.push(TokenAccountInfo {
                pubkey,
                mint,
                owner: account_owner,
                amount,
                initialized,
            });
        }
        Ok(accounts)
    }

    async fn get_program_accounts_memcmp(
        &self,
        program: &Pubkey,
        offset: usize,
        bytes: &Pubkey,
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                offset,
                bytes.as_ref(),
            ))]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };
        let accounts = self
            .client
            .get_program_accounts_with_config(program, config)
            .await
            .map_err(transport_err)?;
        Ok(accounts
            .into_iter()
            .map(|(pubkey, account)| {
                (
                    pubkey,
                    AccountData {
                        lamports: account.lamports,
                        data: account.data,
                    },
                )
            })
            .collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(transport_err)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        let transaction: Transaction = bincode::deserialize(raw)
            .map_err(|err| ClientError::Decode(format!("raw transaction: {err}")))?;
        self.client
            .send_transaction(&transaction)
            .await
            .map(|signature| signature.to_string())
            .map_err(transport_err)
    }
}
