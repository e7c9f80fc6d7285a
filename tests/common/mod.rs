//! Shared test doubles: a scriptable in-memory transport and record
//! encoders for block/entry accounts.

#![allow(dead_code)]

use async_trait::async_trait;
use nifty_stakes::cluster::block::BLOCK_RECORD_LEN;
use nifty_stakes::cluster::entry::ENTRY_RECORD_LEN;
use nifty_stakes::error::{ClientError, Result};
use nifty_stakes::rpc::{EndpointPool, RpcTransport};
use nifty_stakes::types::{AccountData, EpochInfo, TokenAccountInfo};
use nifty_stakes::ClientConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Two-phase gate letting a test pause a transport call mid-flight: the
/// transport signals `reached` and waits for `release`.
pub struct Gate {
    pub reached: Notify,
    pub release: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reached: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub genesis: String,
    pub fail_all: AtomicBool,
    pub accounts: Mutex<HashMap<Pubkey, AccountData>>,
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub epoch_info: Mutex<EpochInfo>,
    pub block_time: Mutex<i64>,
    pub blockhashes: Mutex<Vec<Hash>>,
    pub blockhash_fetches: AtomicUsize,
    pub token_accounts: Mutex<Vec<TokenAccountInfo>>,
    pub program_accounts: Mutex<Vec<(Pubkey, AccountData)>>,
    pub send_always_fails: AtomicBool,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub send_calls: AtomicUsize,
    pub total_calls: AtomicUsize,
    pub balance_gate: Mutex<Option<Arc<Gate>>>,
}

impl MockTransport {
    pub fn new(genesis: &str) -> Arc<Self> {
        Arc::new(Self {
            genesis: genesis.to_string(),
            ..Self::default()
        })
    }

    pub fn set_account(&self, pubkey: Pubkey, data: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(pubkey, AccountData { lamports: 1, data });
    }

    pub fn set_account_with_lamports(&self, pubkey: Pubkey, lamports: u64, data: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(pubkey, AccountData { lamports, data });
    }

    pub fn remove_account(&self, pubkey: &Pubkey) {
        self.accounts.lock().unwrap().remove(pubkey);
    }

    fn tick(&self) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("mock transport forced failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn get_genesis_hash(&self) -> Result<String> {
        self.tick()?;
        Ok(self.genesis.clone())
    }

    async fn get_epoch_info(&self) -> Result<EpochInfo> {
        self.tick()?;
        Ok(*self.epoch_info.lock().unwrap())
    }

    async fn get_block_time(&self, _slot: u64) -> Result<i64> {
        self.tick()?;
        Ok(*self.block_time.lock().unwrap())
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<AccountData>> {
        self.tick()?;
        Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
    }

    async fn get_account_slice(
        &self,
        pubkey: &Pubkey,
        offset: usize,
        length: usize,
    ) -> Result<Option<AccountData>> {
        self.tick()?;
        Ok(self.accounts.lock().unwrap().get(pubkey).map(|account| {
            let end = (offset + length).min(account.data.len());
            let data = account.data.get(offset..end).unwrap_or(&[]).to_vec();
            AccountData {
                lamports: account.lamports,
                data,
            }
        }))
    }

    async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<AccountData>>> {
        self.tick()?;
        let accounts = self.accounts.lock().unwrap();
        Ok(pubkeys
            .iter()
            .map(|pubkey| accounts.get(pubkey).cloned())
            .collect())
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.tick()?;
        let gate = self.balance_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(pubkey)
            .copied()
            .unwrap_or(0))
    }

    async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        _token_program: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>> {
        self.tick()?;
        Ok(self
            .token_accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|account| account.owner == *owner)
            .cloned()
            .collect())
    }

    async fn get_program_accounts_memcmp(
        &self,
        _program: &Pubkey,
        offset: usize,
        bytes: &Pubkey,
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        self.tick()?;
        Ok(self
            .program_accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, account)| {
                account
                    .data
                    .get(offset..offset + 32)
                    .map(|window| window == bytes.as_ref())
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.tick()?;
        let index = self.blockhash_fetches.fetch_add(1, Ordering::SeqCst);
        let hashes = self.blockhashes.lock().unwrap();
        Ok(hashes
            .get(index)
            .or_else(|| hashes.last())
            .copied()
            .unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.tick()?;
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.send_always_fails.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("mock send failure".into()));
        }
        self.sent.lock().unwrap().push(raw.to_vec());
        Ok(format!("mock-signature-{}", self.send_calls.load(Ordering::SeqCst)))
    }
}

/// An endpoint pool whose transports resolve from a fixed url map.
pub fn mock_pool(
    config: Arc<ClientConfig>,
    transports: HashMap<String, Arc<MockTransport>>,
) -> Arc<EndpointPool> {
    EndpointPool::new(
        config,
        Box::new(move |url| {
            let transport: Arc<dyn RpcTransport> = transports
                .get(url)
                .unwrap_or_else(|| panic!("no mock transport for {url}"))
                .clone();
            transport
        }),
    )
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_i64(data: &mut [u8], offset: usize, value: i64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Encode a block account record with the fields the crawl cares about.
pub struct BlockRecord {
    pub group_number: u32,
    pub block_number: u32,
    pub total_entry_count: u16,
    pub added_entries_count: u16,
    pub mysteries_sold_count: u16,
    pub mystery_phase_end_timestamp: i64,
    pub block_start_timestamp: i64,
    pub commission: u16,
}

impl Default for BlockRecord {
    fn default() -> Self {
        Self {
            group_number: 0,
            block_number: 0,
            total_entry_count: 0,
            added_entries_count: 0,
            mysteries_sold_count: 0,
            mystery_phase_end_timestamp: 0,
            block_start_timestamp: 0,
            commission: 0,
        }
    }
}

impl BlockRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = vec![0u8; BLOCK_RECORD_LEN];
        put_u32(&mut data, 8, self.group_number);
        put_u32(&mut data, 12, self.block_number);
        put_u16(&mut data, 16, self.total_entry_count);
        put_u16(&mut data, 64, self.added_entries_count);
        put_i64(&mut data, 72, self.block_start_timestamp);
        put_u16(&mut data, 80, self.mysteries_sold_count);
        put_i64(&mut data, 88, self.mystery_phase_end_timestamp);
        put_u16(&mut data, 96, self.commission);
        data
    }
}

/// Encode an entry account record carrying its index and mint.
pub fn encode_entry(entry_index: u16, mint: &Pubkey, purchase_price: u64) -> Vec<u8> {
    let mut data = vec![0u8; ENTRY_RECORD_LEN];
    put_u16(&mut data, 44, entry_index);
    data[46..78].copy_from_slice(mint.as_ref());
    put_u64(&mut data, 208, purchase_price);
    data
}
