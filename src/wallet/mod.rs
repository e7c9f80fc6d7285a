//! Wallet-side derived views and the guarded transaction flow.

pub mod tx;
pub mod view;

pub use tx::SignOutcome;
pub use view::{BidRecord, StakeRecord, Wallet};
