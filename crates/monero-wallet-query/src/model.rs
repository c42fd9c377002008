//! Domain records produced by merging partial wallet-RPC views.
//!
//! Transaction/block cross-references are arena-style: a transaction points
//! at its block through `block_height`, a block points back through
//! `tx_hashes`, and `TxSet` owns both maps. No literal back-pointers.

use monero_wallet_rpc::Destination;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a record came from the remote wallet or was synthesized locally
/// (e.g. a placeholder an output poller invents before the wallet reports
/// the real outgoing transfer). Remote data always wins a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Remote,
    Synthesized,
}

/// One wallet transaction, assembled from one or more partial RPC views.
///
/// Tri-state confirmation fields are `Option<bool>` so an unreported state
/// stays distinguishable from a reported `false`. Invariant on returned
/// records: `is_confirmed == Some(true)` iff `block_height.is_some()`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletTx {
    pub hash: String,
    pub is_confirmed: Option<bool>,
    pub in_tx_pool: Option<bool>,
    pub is_failed: Option<bool>,
    /// Direction flags are independent; a self-transfer sets both.
    pub is_incoming: bool,
    pub is_outgoing: bool,
    pub fee: Option<u64>,
    pub unlock_time: Option<u64>,
    pub is_locked: Option<bool>,
    pub num_confirmations: Option<u64>,
    pub timestamp: Option<u64>,
    pub payment_id: Option<String>,
    pub note: Option<String>,
    pub double_spend_seen: Option<bool>,
    /// Height of the containing block; key into `TxSet::blocks`.
    pub block_height: Option<u64>,
    pub incoming_transfers: Vec<IncomingTransfer>,
    /// At most one outgoing transfer, possibly fanning out to many destinations.
    pub outgoing_transfer: Option<OutgoingTransfer>,
    pub outputs: Vec<OutputRecord>,
    /// Outputs this transaction spends. Not populated by the wallet-RPC
    /// listing endpoints; callers merging fuller views may fill it in.
    pub inputs: Vec<OutputRecord>,
}

impl WalletTx {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }

    /// The confirmed/block invariant this engine repairs on violation.
    pub fn is_consistent(&self) -> bool {
        (self.is_confirmed == Some(true)) == self.block_height.is_some()
    }
}

/// Minimal block header plus the hashes of its transactions visible to the
/// query that produced it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: Option<u64>,
    pub tx_hashes: Vec<String>,
}

/// Funds received by one subaddress in one transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingTransfer {
    pub tx_hash: String,
    pub amount: u64,
    pub account_index: u32,
    pub subaddress_index: u32,
    pub address: Option<String>,
}

/// Funds sent by this wallet in one transaction. Sources may span several
/// subaddresses of one account; destinations are external address+amount pairs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutgoingTransfer {
    pub tx_hash: String,
    pub amount: u64,
    pub account_index: u32,
    pub subaddress_indices: Vec<u32>,
    pub address: Option<String>,
    pub destinations: Vec<Destination>,
    pub provenance: Provenance,
}

impl Default for OutgoingTransfer {
    fn default() -> Self {
        Self {
            tx_hash: String::new(),
            amount: 0,
            account_index: 0,
            subaddress_indices: Vec::new(),
            address: None,
            destinations: Vec::new(),
            provenance: Provenance::Remote,
        }
    }
}

/// A directional movement of funds; the `get_transfers` result item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Transfer {
    Incoming(IncomingTransfer),
    Outgoing(OutgoingTransfer),
}

impl Transfer {
    pub fn tx_hash(&self) -> &str {
        match self {
            Transfer::Incoming(t) => &t.tx_hash,
            Transfer::Outgoing(t) => &t.tx_hash,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            Transfer::Incoming(t) => t.amount,
            Transfer::Outgoing(t) => t.amount,
        }
    }

    pub fn is_incoming(&self) -> bool {
        matches!(self, Transfer::Incoming(_))
    }
}

/// A spendable unit created by a transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub tx_hash: String,
    pub amount: u64,
    pub global_index: Option<u64>,
    pub key_image: Option<String>,
    pub stealth_public_key: Option<String>,
    pub is_spent: Option<bool>,
    pub is_frozen: Option<bool>,
    pub account_index: u32,
    pub subaddress_index: u32,
}

/// Result of a transaction query: transactions in final order plus the
/// blocks they reference, keyed by height.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TxSet {
    pub txs: Vec<WalletTx>,
    pub blocks: BTreeMap<u64, Block>,
}

impl TxSet {
    /// The block containing `tx`, if it is confirmed.
    pub fn block_of(&self, tx: &WalletTx) -> Option<&Block> {
        tx.block_height.and_then(|h| self.blocks.get(&h))
    }
}
