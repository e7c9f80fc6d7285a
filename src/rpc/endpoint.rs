//! A single rate-limited RPC endpoint.
//!
//! Admission control is synchronous and cheap: two sliding windows (request
//! count and response-byte sum) are purged and checked before the wrapped
//! call is ever polled, and an operation that would exceed a configured
//! budget is rejected locally without touching the network. Charges use
//! conservative caller-supplied size estimates, not measured sizes.

use crate::error::{ClientError, Result};
use crate::rpc::transport::RpcTransport;
use crate::types::{AccountData, EndpointDescriptor, EpochInfo, RateBudget, TokenAccountInfo};
use crate::config::SizeEstimates;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// One in-flight or recently-settled charge against a window.
#[derive(Debug, Clone, Copy)]
struct Charge {
    until: Instant,
    size: u64,
    /// Nonzero while the charged operation is still in flight.
    ticket: u64,
}

/// Both windows plus the budgets they enforce. Mutated only under the
/// mutex, never across a suspension point, so interleaved tasks always see
/// whole updates.
#[derive(Debug)]
struct BudgetState {
    request_budget: Option<RateBudget>,
    data_budget: Option<RateBudget>,
    /// Sorted by expiry; provisional in-flight entries sit at the end with
    /// a far-future expiry.
    requests: Vec<Charge>,
    data: Vec<Charge>,
    data_sum: u64,
    next_ticket: u64,
}

impl BudgetState {
    fn purge(&mut self, now: Instant) {
        while let Some(first) = self.requests.first() {
            if first.until > now {
                break;
            }
            self.requests.remove(0);
        }
        while let Some(first) = self.data.first() {
            if first.until > now {
                break;
            }
            self.data_sum -= first.size;
            self.data.remove(0);
        }
    }

    fn insert_sorted(charges: &mut Vec<Charge>, charge: Charge) {
        let position = charges
            .iter()
            .position(|existing| existing.until > charge.until)
            .unwrap_or(charges.len());
        charges.insert(position, charge);
    }
}

/// A budget-tracked handle to one RPC server.
pub struct Endpoint {
    url: String,
    transport: Arc<dyn RpcTransport>,
    estimates: SizeEstimates,
    budgets: Mutex<BudgetState>,
}

impl Endpoint {
    pub fn new(
        descriptor: &EndpointDescriptor,
        transport: Arc<dyn RpcTransport>,
        estimates: SizeEstimates,
    ) -> Self {
        Self {
            url: descriptor.url.clone(),
            transport,
            estimates,
            budgets: Mutex::new(BudgetState {
                request_budget: descriptor.request_budget,
                data_budget: descriptor.data_budget,
                requests: Vec::new(),
                data: Vec::new(),
                data_sum: 0,
                next_ticket: 1,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Replace the budgets in place, keeping the in-flight accounting.
    /// Used when a pool reconfiguration reuses an existing endpoint.
    pub fn set_budgets(&self, request_budget: Option<RateBudget>, data_budget: Option<RateBudget>) {
        let mut state = self.budgets.lock().unwrap();
        state.request_budget = request_budget;
        state.data_budget = data_budget;
    }

    /// Admit an operation against both windows or reject it.
    fn admit(&self, estimated_size: u64) -> Result<u64> {
        let now = Instant::now();
        let mut state = self.budgets.lock().unwrap();
        state.purge(now);

        if let Some(budget) = state.request_budget {
            if state.requests.len() as u64 >= budget.limit {
                return Err(ClientError::Overloaded {
                    endpoint: self.url.clone(),
                    reason: "too many outstanding requests",
                });
            }
        }
        if let Some(budget) = state.data_budget {
            if state.data_sum + estimated_size > budget.limit {
                return Err(ClientError::Overloaded {
                    endpoint: self.url.clone(),
                    reason: "too much outstanding request data",
                });
            }
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        // Provisional entries expire "never"; they are swapped for real
        // ones when the operation settles.
        let far_future = now + Duration::from_secs(10 * 365 * 24 * 60 * 60);
        state.requests.push(Charge {
            until: far_future,
            size: 0,
            ticket,
        });
        state.data.push(Charge {
            until: far_future,
            size: estimated_size,
            ticket,
        });
        state.data_sum += estimated_size;
        Ok(ticket)
    }

    /// Swap the provisional charges for real ones expiring one window
    /// duration from now, or drop them entirely for unbudgeted windows.
    fn settle(&self, ticket: u64) {
        let now = Instant::now();
        let mut state = self.budgets.lock().unwrap();

        if let Some(position) = state.requests.iter().position(|c| c.ticket == ticket) {
            state.requests.remove(position);
            if let Some(budget) = state.request_budget {
                BudgetState::insert_sorted(
                    &mut state.requests,
                    Charge {
                        until: now + budget.duration(),
                        size: 0,
                        ticket: 0,
                    },
                );
            }
        }

        if let Some(position) = state.data.iter().position(|c| c.ticket == ticket) {
            let size = state.data[position].size;
            state.data.remove(position);
            match state.data_budget {
                Some(budget) => {
                    BudgetState::insert_sorted(
                        &mut state.data,
                        Charge {
                            until: now + budget.duration(),
                            size,
                            ticket: 0,
                        },
                    );
                }
                None => {
                    // No budget to charge against; the provisional size was
                    // only ever a placeholder.
                    state.data_sum -= size;
                }
            }
        }
    }

    /// Run one transport operation under admission control.
    async fn execute<T, Fut>(&self, estimated_size: u64, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let ticket = self.admit(estimated_size)?;
        trace!(endpoint = %self.url, estimated_size, "admitted");
        let result = operation.await;
        self.settle(ticket);
        result
    }

    // Typed wrappers pairing each transport call with its configured
    // response-size estimate.

    pub async fn get_genesis_hash(&self) -> Result<String> {
        self.execute(self.estimates.small, self.transport.get_genesis_hash())
            .await
    }

    pub async fn get_epoch_info(&self) -> Result<EpochInfo> {
        self.execute(self.estimates.small, self.transport.get_epoch_info())
            .await
    }

    pub async fn get_block_time(&self, slot: u64) -> Result<i64> {
        self.execute(self.estimates.small, self.transport.get_block_time(slot))
            .await
    }

    pub async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<AccountData>> {
        self.execute(self.estimates.account, self.transport.get_account(pubkey))
            .await
    }

    pub async fn get_account_slice(
        &self,
        pubkey: &Pubkey,
        offset: usize,
        length: usize,
    ) -> Result<Option<AccountData>> {
        self.execute(
            self.estimates.account,
            self.transport.get_account_slice(pubkey, offset, length),
        )
        .await
    }

    pub async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<AccountData>>> {
        self.execute(
            self.estimates.account * pubkeys.len() as u64,
            self.transport.get_multiple_accounts(pubkeys),
        )
        .await
    }

    pub async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64> {
        self.execute(self.estimates.small, self.transport.get_balance(pubkey))
            .await
    }

    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>> {
        self.execute(
            self.estimates.token_listing,
            self.transport.get_token_accounts_by_owner(owner, token_program),
        )
        .await
    }

    pub async fn get_program_accounts_memcmp(
        &self,
        program: &Pubkey,
        offset: usize,
        bytes: &Pubkey,
    ) -> Result<Vec<(Pubkey, AccountData)>> {
        self.execute(
            self.estimates.program_scan,
            self.transport.get_program_accounts_memcmp(program, offset, bytes),
        )
        .await
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.execute(self.estimates.small, self.transport.get_latest_blockhash())
            .await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.execute(
            self.estimates.submission,
            self.transport.send_raw_transaction(raw),
        )
        .await
    }
}
