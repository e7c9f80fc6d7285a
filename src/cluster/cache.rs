//! The cluster-side entity cache: paginated crawl, field-level diffing,
//! and change notification for blocks and entries.

use crate::cluster::block::Block;
use crate::cluster::clock::ClusterClock;
use crate::cluster::entry::{parse_metadata_uri, Entry, SharedBlock};
use crate::config::{ClientConfig, ProgramConfig};
use crate::error::{ClientError, Result};
use crate::keys;
use crate::rpc::EndpointPool;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

pub type SharedEntry = Arc<RwLock<Entry>>;

/// Cache notifications. Delivered over an unbounded channel, so handlers
/// always run in the subscriber's task, never inside an RPC completion
/// path.
#[derive(Clone)]
pub enum ClusterEvent {
    /// An entry was admitted to the cache for the first time.
    NewEntry(SharedEntry),
    /// A later observation changed the entry or its owning block.
    EntryChanged(SharedEntry),
    /// A full crawl pass found no further blocks.
    EntriesUpdateComplete,
}

impl std::fmt::Debug for ClusterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterEvent::NewEntry(entry) => {
                write!(f, "NewEntry({})", entry.read().unwrap().pubkey)
            }
            ClusterEvent::EntryChanged(entry) => {
                write!(f, "EntryChanged({})", entry.read().unwrap().pubkey)
            }
            ClusterEvent::EntriesUpdateComplete => write!(f, "EntriesUpdateComplete"),
        }
    }
}

struct CacheState {
    blocks: HashMap<Pubkey, SharedBlock>,
    entries: HashMap<Pubkey, SharedEntry>,
    /// Entry pubkeys in admission order; entries are never removed.
    entry_order: Vec<Pubkey>,
}

/// Local mirror of every complete block and its entries, kept fresh by a
/// periodic crawl. Entities are updated in place: a handle obtained from
/// the cache stays current for the lifetime of the cluster.
pub struct Cluster {
    pool: Arc<EndpointPool>,
    program: Arc<ProgramConfig>,
    config: Arc<ClientConfig>,
    clock: ClusterClock,
    state: RwLock<CacheState>,
    events: Option<mpsc::UnboundedSender<ClusterEvent>>,
    http: reqwest::Client,
}

impl Cluster {
    pub fn new(
        pool: Arc<EndpointPool>,
        program: Arc<ProgramConfig>,
        config: Arc<ClientConfig>,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
    ) -> Arc<Self> {
        let clock = ClusterClock::new(pool.clone(), &config);
        Arc::new(Self {
            pool,
            program,
            config,
            clock,
            state: RwLock::new(CacheState {
                blocks: HashMap::new(),
                entries: HashMap::new(),
                entry_order: Vec::new(),
            }),
            events,
            http: reqwest::Client::new(),
        })
    }

    /// Spawn the clock sampler and the block crawler as supervised loops on
    /// the shared pool. Both run until the pool is shut down.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let clock_loop = {
            let cluster = self.clone();
            tokio::spawn(async move {
                let interval = cluster.config.clock_refresh_interval;
                let pool = cluster.pool.clone();
                pool.run_periodically(interval, || {
                    let cluster = cluster.clone();
                    async move { cluster.clock.sample().await }
                })
                .await;
            })
        };
        let crawl_loop = {
            let cluster = self.clone();
            tokio::spawn(async move {
                let interval = cluster.config.crawl_interval;
                let pool = cluster.pool.clone();
                pool.run_periodically(interval, || {
                    let cluster = cluster.clone();
                    async move { cluster.crawl_once().await }
                })
                .await;
            })
        };
        info!("cluster watcher started");
        vec![clock_loop, crawl_loop]
    }

    pub fn clock(&self) -> &ClusterClock {
        &self.clock
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().unwrap().entry_order.len()
    }

    /// Entry at `index` in admission order.
    pub fn entry_at(&self, index: usize) -> Option<SharedEntry> {
        let state = self.state.read().unwrap();
        let pubkey = state.entry_order.get(index)?;
        state.entries.get(pubkey).cloned()
    }

    pub fn entry(&self, pubkey: &Pubkey) -> Option<SharedEntry> {
        self.state.read().unwrap().entries.get(pubkey).cloned()
    }

    pub fn block(&self, pubkey: &Pubkey) -> Option<SharedBlock> {
        self.state.read().unwrap().blocks.get(pubkey).cloned()
    }

    /// Snapshot of all entries in admission order.
    pub fn entries(&self) -> Vec<SharedEntry> {
        let state = self.state.read().unwrap();
        state
            .entry_order
            .iter()
            .filter_map(|pubkey| state.entries.get(pubkey).cloned())
            .collect()
    }

    /// Re-fetch one entry and its owning block out of band, diff both, and
    /// notify if anything changed. Used for on-demand refresh between crawl
    /// passes.
    #[instrument(skip(self, entry))]
    pub async fn refresh_entry(&self, entry: &SharedEntry) -> Result<()> {
        let (block, entry_pubkey) = {
            let e = entry.read().unwrap();
            (e.block.clone(), e.pubkey)
        };
        let block_pubkey = block.read().unwrap().pubkey;

        let block_account = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_account(&block_pubkey).await })
            .await?
            .ok_or_else(|| ClientError::Decode(format!("block {block_pubkey} vanished")))?;
        let entry_account = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_account(&entry_pubkey).await })
            .await?
            .ok_or_else(|| ClientError::Decode(format!("entry {entry_pubkey} vanished")))?;

        let fresh_block = Block::decode(block_pubkey, &block_account.data)?;
        let block_changed = block.write().unwrap().apply(&fresh_block);
        let fresh_entry = Entry::decode(block.clone(), entry_pubkey, &entry_account.data)?;
        let entry_changed = entry.write().unwrap().apply(&fresh_entry);

        if block_changed || entry_changed {
            self.emit(ClusterEvent::EntryChanged(entry.clone()));
        }
        Ok(())
    }

    /// The metadata URI recorded in an entry's metaplex metadata account.
    pub async fn entry_metadata_uri(&self, entry: &SharedEntry) -> Result<String> {
        let metadata_pubkey = entry.read().unwrap().metaplex_metadata_pubkey;
        let account = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_account(&metadata_pubkey).await })
            .await?
            .ok_or_else(|| {
                ClientError::Decode(format!("no metaplex metadata at {metadata_pubkey}"))
            })?;
        parse_metadata_uri(&account.data)
    }

    /// Fetch and parse the JSON document behind an entry's metadata URI.
    pub async fn entry_metadata_json(&self, entry: &SharedEntry) -> Result<serde_json::Value> {
        let uri = self.entry_metadata_uri(entry).await?;
        let response = self
            .http
            .get(&uri)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "metadata fetch {}: {}",
                uri,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| ClientError::Decode(format!("metadata json: {err}")))
    }

    /// One full crawl pass over every block group, and through each block's
    /// entries. Progress is not persisted across failures: an error
    /// propagates to the periodic loop, which restarts the pass from
    /// (group 0, block 0) after its backoff.
    #[instrument(skip(self))]
    pub async fn crawl_once(&self) -> Result<()> {
        let batch = self.config.blocks_at_once;
        let mut group_number: u32 = 0;
        let mut block_number: u32 = 0;

        loop {
            let pubkeys: Vec<Pubkey> = (0..batch as u32)
                .map(|i| {
                    keys::derive_block_address(
                        &self.program.program_id,
                        group_number,
                        block_number + i,
                    )
                })
                .collect();
            let results = self
                .pool
                .dispatch(|endpoint| {
                    let pubkeys = pubkeys.clone();
                    async move { endpoint.get_multiple_accounts(&pubkeys).await }
                })
                .await?;

            let mut loaded = 0usize;
            let mut entry_crawls: Vec<(SharedBlock, bool)> = Vec::new();
            for (index, result) in results.iter().enumerate() {
                let Some(account) = result else { break };
                loaded = index + 1;

                let pubkey = pubkeys[index];
                let fresh = Block::decode(pubkey, &account.data)?;
                let existing = self.state.read().unwrap().blocks.get(&pubkey).cloned();
                match existing {
                    None => {
                        // Blocks still being populated do not exist yet.
                        if !fresh.is_complete() {
                            continue;
                        }
                        debug!(block = %pubkey, group_number, "block admitted");
                        let shared = Arc::new(RwLock::new(fresh));
                        self.state
                            .write()
                            .unwrap()
                            .blocks
                            .insert(pubkey, shared.clone());
                        entry_crawls.push((shared, false));
                    }
                    Some(shared) => {
                        let changed = shared.write().unwrap().apply(&fresh);
                        entry_crawls.push((shared, changed));
                    }
                }
            }

            // Entry crawls for the batch run concurrently and are awaited
            // before the block cursor advances.
            let crawls = entry_crawls
                .into_iter()
                .map(|(block, changed)| self.update_entries(block, changed));
            for crawl in futures::future::join_all(crawls).await {
                crawl?;
            }

            if loaded == batch {
                // Full batch: keep draining this group.
                block_number += batch as u32;
            } else if block_number == 0 && loaded == 0 {
                // An empty group at offset zero is the end of all blocks.
                self.emit(ClusterEvent::EntriesUpdateComplete);
                return Ok(());
            } else {
                group_number += 1;
                block_number = 0;
            }
        }
    }

    /// Crawl one block's entry range from `entry_index` 0 upward until a
    /// batch comes back short.
    async fn update_entries(&self, block: SharedBlock, block_changed: bool) -> Result<()> {
        let block_pubkey = block.read().unwrap().pubkey;
        let batch = self.config.entries_at_once;
        let mut entry_index: u16 = 0;

        loop {
            let pubkeys: Vec<Pubkey> = (0..batch as u16)
                .map(|i| {
                    let mint = keys::derive_entry_mint_address(
                        &self.program.program_id,
                        &block_pubkey,
                        entry_index + i,
                    );
                    keys::derive_entry_address(&self.program.program_id, &mint)
                })
                .collect();
            let results = self
                .pool
                .dispatch(|endpoint| {
                    let pubkeys = pubkeys.clone();
                    async move { endpoint.get_multiple_accounts(&pubkeys).await }
                })
                .await?;

            let mut loaded = 0usize;
            for (index, result) in results.iter().enumerate() {
                let Some(account) = result else { break };
                loaded = index + 1;

                let pubkey = pubkeys[index];
                let existing = self.state.read().unwrap().entries.get(&pubkey).cloned();
                match existing {
                    None => {
                        let fresh = Entry::decode(block.clone(), pubkey, &account.data)?;
                        let shared = Arc::new(RwLock::new(fresh));
                        {
                            let mut state = self.state.write().unwrap();
                            state.entries.insert(pubkey, shared.clone());
                            state.entry_order.push(pubkey);
                        }
                        self.emit(ClusterEvent::NewEntry(shared));
                    }
                    Some(shared) => {
                        let fresh = Entry::decode(block.clone(), pubkey, &account.data)?;
                        let changed = shared.write().unwrap().apply(&fresh);
                        if changed || block_changed {
                            self.emit(ClusterEvent::EntryChanged(shared));
                        }
                    }
                }
            }

            if loaded == batch {
                entry_index += batch as u16;
            } else {
                return Ok(());
            }
        }
    }

    fn emit(&self, event: ClusterEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is listening anymore.
            let _ = events.send(event);
        }
    }
}
