//! Round-robin dispatch over a verified set of rate-limited endpoints.
//!
//! The pool is the single shared resource every background loop (clock
//! sampler, block crawler, wallet refresher) drives its requests through.
//! Dispatch retries failed operations against the next endpoint in rotation
//! forever; liveness against flaky public RPC infrastructure comes from the
//! pool, not from callers. The only bounded retry in the crate is
//! transaction submission, which lives in the wallet.

use crate::config::{default_endpoints, ClientConfig};
use crate::error::{ClientError, Result};
use crate::rpc::endpoint::Endpoint;
use crate::rpc::transport::{RpcTransport, SolanaRpcTransport};
use crate::types::EndpointDescriptor;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Builds a transport for a newly-configured endpoint url.
pub type TransportFactory = Box<dyn Fn(&str) -> Arc<dyn RpcTransport> + Send + Sync>;

struct PoolState {
    endpoints: Vec<Arc<Endpoint>>,
    /// Genesis hash of the first endpoint ever verified; every endpoint
    /// added later must match it.
    genesis_hash: Option<String>,
}

pub struct EndpointPool {
    config: Arc<ClientConfig>,
    transport_factory: TransportFactory,
    state: RwLock<PoolState>,
    cursor: AtomicUsize,
    shutdown: watch::Sender<bool>,
}

impl EndpointPool {
    /// An empty pool; not usable until the first successful
    /// [`configure`](Self::configure) call.
    pub fn new(config: Arc<ClientConfig>, transport_factory: TransportFactory) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            transport_factory,
            state: RwLock::new(PoolState {
                endpoints: Vec::new(),
                genesis_hash: None,
            }),
            cursor: AtomicUsize::new(0),
            shutdown,
        })
    }

    /// A pool whose endpoints speak to real Solana RPC servers.
    pub fn solana(config: Arc<ClientConfig>) -> Arc<Self> {
        Self::new(
            config,
            Box::new(|url| Arc::new(SolanaRpcTransport::new(url)) as Arc<dyn RpcTransport>),
        )
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Makes all pending and future operations fail fast. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Replace the endpoint set. `None` selects the built-in default set.
    ///
    /// Endpoints whose url persists across the call are reused with their
    /// budgets updated in place, preserving in-flight accounting. Each new
    /// url is verified to report the pool's genesis fingerprint (the first
    /// one ever seen establishes it); on any mismatch the whole call fails
    /// and the previous endpoint set is left untouched.
    #[instrument(skip(self, targets))]
    pub async fn configure(&self, targets: Option<Vec<EndpointDescriptor>>) -> Result<()> {
        if self.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let descriptors = targets.unwrap_or_else(default_endpoints);
        if descriptors.is_empty() {
            return Err(ClientError::Configuration("empty endpoint list".into()));
        }

        let (existing, mut genesis_hash) = {
            let state = self.state.read().unwrap();
            (state.endpoints.clone(), state.genesis_hash.clone())
        };

        // Build the replacement set on the side; nothing is applied until
        // every new endpoint has been verified.
        let mut new_endpoints: Vec<Arc<Endpoint>> = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            if new_endpoints.iter().any(|e| e.url() == descriptor.url) {
                continue;
            }
            if let Some(endpoint) = existing.iter().find(|e| e.url() == descriptor.url) {
                endpoint.set_budgets(descriptor.request_budget, descriptor.data_budget);
                new_endpoints.push(endpoint.clone());
                continue;
            }

            let transport = (self.transport_factory)(&descriptor.url);
            let endpoint = Arc::new(Endpoint::new(
                descriptor,
                transport,
                self.config.estimates,
            ));
            let hash = endpoint.get_genesis_hash().await?;
            if let Some(expected) = &genesis_hash {
                if *expected != hash {
                    return Err(ClientError::Configuration(format!(
                        "{}: genesis hash {} does not match cluster {}",
                        descriptor.url, hash, expected
                    )));
                }
            } else {
                genesis_hash = Some(hash);
            }
            new_endpoints.push(endpoint);
        }

        let mut state = self.state.write().unwrap();
        info!(endpoints = new_endpoints.len(), "endpoint set configured");
        state.endpoints = new_endpoints;
        state.genesis_hash = genesis_hash;
        drop(state);
        self.cursor.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Next endpoint in rotation. The cursor advance is the only state
    /// shared between concurrent dispatches and is a single atomic add.
    fn next_endpoint(&self) -> Result<Arc<Endpoint>> {
        if self.is_shutdown() {
            return Err(ClientError::Shutdown);
        }
        let state = self.state.read().unwrap();
        if state.endpoints.is_empty() {
            return Err(ClientError::Configuration(
                "endpoint pool has not been configured".into(),
            ));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % state.endpoints.len();
        Ok(state.endpoints[index].clone())
    }

    /// Run `operation` against the next endpoint in rotation, retrying
    /// forever on failure with a fixed backoff between attempts. Fails only
    /// when the pool is shut down.
    pub async fn dispatch<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let endpoint = self.next_endpoint()?;
            match operation(endpoint.clone()).await {
                Ok(value) => return Ok(value),
                Err(ClientError::Shutdown) => return Err(ClientError::Shutdown),
                Err(err) => {
                    debug!(endpoint = %endpoint.url(), %err, "dispatch attempt failed; rotating");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.retry_backoff) => {}
                        _ = shutdown.changed() => return Err(ClientError::Shutdown),
                    }
                }
            }
        }
    }

    /// Run `operation` against the next endpoint once; the first failure
    /// propagates.
    pub async fn dispatch_once<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<Endpoint>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let endpoint = self.next_endpoint()?;
        operation(endpoint).await
    }

    /// Invoke `operation` repeatedly until shutdown: after `interval` on
    /// success, after the fixed backoff on failure. Invocations never
    /// overlap.
    pub async fn run_periodically<F, Fut>(&self, interval: Duration, mut operation: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if self.is_shutdown() {
                return;
            }
            let delay = match operation().await {
                Ok(()) => interval,
                Err(ClientError::Shutdown) => return,
                Err(err) => {
                    warn!(%err, "periodic operation failed; backing off");
                    self.config.retry_backoff
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }
}
