//! nifty-stakes — client library for an on-chain NFT auction and staking
//! marketplace.
//!
//! The crate mirrors the program's account state locally and keeps it
//! fresh: an [`EndpointPool`] round-robins rate-limited requests across a
//! set of genesis-verified RPC endpoints, a [`Cluster`] crawls block and
//! entry accounts into an identity-preserving in-memory cache with change
//! notifications, and a [`Wallet`] maintains per-address derived views
//! (balances, owned entries, bids, stakes) guarded against concurrent
//! address changes, plus the build-sign-submit transaction flow.

pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod keys;
pub mod rpc;
pub mod types;
pub mod wallet;

pub use cluster::{Block, Cluster, ClusterClock, ClusterEvent, Entry, EntryState, SharedEntry};
pub use config::{ClientConfig, ProgramConfig, SizeEstimates};
pub use error::{ClientError, Result};
pub use rpc::{Endpoint, EndpointPool, RpcTransport, SolanaRpcTransport};
pub use types::{ClockReading, EndpointDescriptor, RateBudget};
pub use wallet::{BidRecord, SignOutcome, StakeRecord, Wallet};
