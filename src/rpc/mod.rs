//! Rate-limited multi-endpoint RPC dispatch.

pub mod endpoint;
pub mod pool;
pub mod transport;

pub use endpoint::Endpoint;
pub use pool::{EndpointPool, TransportFactory};
pub use transport::{RpcTransport, SolanaRpcTransport};
