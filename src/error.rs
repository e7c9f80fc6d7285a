//! Error taxonomy for the client library.

use thiserror::Error;

/// Errors surfaced by the endpoint pool, entity cache, and wallet flows.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local admission-control rejection; the request never touched the
    /// network. Dispatch treats it like any other per-endpoint failure and
    /// rotates to the next endpoint.
    #[error("{endpoint}: {reason}")]
    Overloaded { endpoint: String, reason: &'static str },

    /// Endpoint (re)configuration was rejected. Never transient, never
    /// retried; the pool's previous endpoint set is left untouched.
    #[error("invalid endpoint configuration: {0}")]
    Configuration(String),

    /// The pool was shut down; all pending and future operations fail fast.
    #[error("shutdown")]
    Shutdown,

    /// The active wallet address changed while a wallet flow was in flight.
    /// The flow's result is meaningless and must be abandoned.
    #[error("wallet changed")]
    WalletChanged,

    /// A wallet flow was requested with no wallet selected.
    #[error("no wallet")]
    NoWallet,

    /// Raw-transaction submission exhausted its bounded retries.
    #[error("transaction submission failed after {attempts} attempts: {last_error}")]
    Submission { attempts: usize, last_error: String },

    /// A fetched account record (or a value produced for the wire) did not
    /// have the expected shape.
    #[error("malformed record: {0}")]
    Decode(String),

    /// Opaque failure from the underlying RPC transport.
    #[error("rpc transport: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
