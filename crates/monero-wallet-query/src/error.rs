use monero_wallet_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Caller-contract violation: malformed circular references or
    /// contradictory predicates. Raised before any remote call.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// Protocol mismatch with the remote wallet, e.g. an unrecognized
    /// transfer discriminator. Not recoverable.
    #[error("decode error: {0}")]
    Decode(String),
    /// The confirmed/block invariant was still violated after the single
    /// retry, so the merged view cannot be trusted.
    #[error(
        "transaction {hash} inconsistent after retry (confirmed={confirmed}, has_block={has_block})"
    )]
    Inconsistent {
        hash: String,
        confirmed: bool,
        has_block: bool,
    },
    /// Single-hash lookup for a hash the wallet does not know. Batch
    /// lookups omit unknown hashes instead of failing.
    #[error("transaction not found: {0}")]
    TxNotFound(String),
}
