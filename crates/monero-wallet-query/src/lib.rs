//! monero-wallet-query
//!
//! Query-and-reconciliation engine over `monero-wallet-rpc`. The wallet RPC
//! exposes the same transactions through several overlapping, partial views
//! (transfer listings grouped by category, an output listing per account, a
//! single-hash lookup); this crate turns a compositional query into the
//! minimal set of those calls, merges the partial records into one
//! transaction graph, and post-filters the merged view against the full
//! query.
//!
//! Entry point is [`WalletQuery`] over any [`monero_wallet_rpc::WalletClient`]:
//!
//! ```no_run
//! use monero_wallet_query::{TxQuery, WalletQuery};
//! use monero_wallet_rpc::WalletRpc;
//!
//! # fn main() -> Result<(), monero_wallet_query::QueryError> {
//! let rpc = WalletRpc::new("http://127.0.0.1:18083", None)?;
//! let engine = WalletQuery::new(rpc);
//! let confirmed = engine.get_txs(&TxQuery::default().confirmed(true))?;
//! for tx in &confirmed.txs {
//!     println!("{} height={:?}", tx.hash, tx.block_height);
//! }
//! # Ok(())
//! # }
//! ```

mod adapter;
mod engine;
mod error;
mod filter;
mod merge;
mod model;
mod query;

pub use adapter::TransferCategory;
pub use engine::WalletQuery;
pub use error::QueryError;
pub use merge::{merge_tx_records, MergeState};
pub use model::{
    Block, IncomingTransfer, OutgoingTransfer, OutputRecord, Provenance, Transfer, TxSet,
    WalletTx,
};
pub use query::{OutputQuery, TransferQuery, TxQuery};
