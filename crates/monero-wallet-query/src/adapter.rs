//! Endpoint adapters: translate a decontextualized tx-query into the minimal
//! set of wallet-RPC calls and decode each heterogeneous record shape into a
//! partial `WalletTx`.
//!
//! Adapters are pure record-to-partial transformers; reconciling the partials
//! into one view is `MergeState`'s job, not theirs.

use crate::engine::AddressCache;
use crate::error::QueryError;
use crate::model::{IncomingTransfer, OutgoingTransfer, OutputRecord, Provenance, WalletTx};
use crate::query::{OutputQuery, TxQuery};
use log::{debug, trace};
use monero_wallet_rpc::{
    GetTransfersParams, IncomingTransferEntry, IncomingTransfersParams, TransferEntry,
    WalletClient,
};

/// Closed set of transfer discriminators the wallet emits. Decoded once at
/// the adapter boundary; an unrecognized tag is a protocol mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferCategory {
    /// Confirmed incoming.
    In,
    /// Confirmed outgoing.
    Out,
    /// Incoming, sitting in the pool.
    Pool,
    /// Outgoing, submitted but unconfirmed.
    Pending,
    /// Outgoing, rejected or dropped.
    Failed,
    /// Coinbase reward; confirmed incoming but never requestable directly.
    Block,
}

impl TransferCategory {
    /// Categories that map to a `get_transfers` request flag.
    pub(crate) const REQUESTABLE: [TransferCategory; 5] = [
        TransferCategory::In,
        TransferCategory::Out,
        TransferCategory::Pending,
        TransferCategory::Failed,
        TransferCategory::Pool,
    ];

    pub fn from_tag(tag: &str) -> Result<Self, QueryError> {
        match tag {
            "in" => Ok(TransferCategory::In),
            "out" => Ok(TransferCategory::Out),
            "pool" => Ok(TransferCategory::Pool),
            "pending" => Ok(TransferCategory::Pending),
            "failed" => Ok(TransferCategory::Failed),
            "block" => Ok(TransferCategory::Block),
            other => Err(QueryError::Decode(format!(
                "unrecognized transfer discriminator {other:?}"
            ))),
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            TransferCategory::In | TransferCategory::Out | TransferCategory::Block
        )
    }

    pub fn in_pool(self) -> bool {
        matches!(self, TransferCategory::Pool | TransferCategory::Pending)
    }

    pub fn is_incoming(self) -> bool {
        matches!(
            self,
            TransferCategory::In | TransferCategory::Pool | TransferCategory::Block
        )
    }
}

/// Categories the tx-query's confirmation/pool/failure predicates cannot
/// already rule out. Only these are fetched. Direction flags never
/// participate: they were stripped before planning, since a self-transfer is
/// visible under both directions and pre-filtering would lose one view.
pub(crate) fn plan_categories(tx_query: &TxQuery) -> Vec<TransferCategory> {
    TransferCategory::REQUESTABLE
        .into_iter()
        .filter(|c| category_possible(*c, tx_query))
        .collect()
}

fn category_possible(category: TransferCategory, q: &TxQuery) -> bool {
    if let Some(confirmed) = q.is_confirmed {
        if confirmed != category.is_confirmed() {
            return false;
        }
    }
    if let Some(in_pool) = q.in_tx_pool {
        if in_pool != category.in_pool() {
            return false;
        }
    }
    if let Some(failed) = q.is_failed {
        if failed != (category == TransferCategory::Failed) {
            return false;
        }
    }
    let height_bounded =
        q.height.is_some() || q.min_height.is_some() || q.max_height.is_some();
    if height_bounded && !category.is_confirmed() {
        return false;
    }
    true
}

/// Transfer adapter: one listing call per category the query cannot rule
/// out, each record decoded into a transaction carrying exactly one transfer.
pub(crate) fn fetch_txs_by_transfers<C: WalletClient>(
    client: &C,
    cache: &AddressCache,
    tx_query: &TxQuery,
) -> Result<Vec<WalletTx>, QueryError> {
    let categories = plan_categories(tx_query);
    trace!("transfer adapter requesting categories {categories:?}");
    let mut txs = Vec::new();
    for category in categories {
        let params = transfers_params(category, tx_query);
        let result = client.get_transfers(&params)?;
        for entry in result.entries() {
            let mut tx = tx_from_transfer_entry(entry)?;
            decorate_addresses(&mut tx, client, cache)?;
            txs.push(tx);
        }
    }
    debug!("transfer adapter decoded {} partial txs", txs.len());
    Ok(txs)
}

fn transfers_params(category: TransferCategory, q: &TxQuery) -> GetTransfersParams {
    let height_bounded = q.min_height.is_some() || q.max_height.is_some() || q.height.is_some();
    GetTransfersParams {
        incoming: category == TransferCategory::In,
        out: category == TransferCategory::Out,
        pending: category == TransferCategory::Pending,
        failed: category == TransferCategory::Failed,
        pool: category == TransferCategory::Pool,
        filter_by_height: height_bounded.then_some(true),
        min_height: q.height.or(q.min_height),
        max_height: q.height.or(q.max_height),
        account_index: None,
        subaddr_indices: None,
        all_accounts: Some(true),
    }
}

/// Decode one transfer-listing record into a one-transfer partial tx.
pub(crate) fn tx_from_transfer_entry(entry: &TransferEntry) -> Result<WalletTx, QueryError> {
    let category = TransferCategory::from_tag(&entry.transfer_type)?;
    let mut tx = WalletTx::new(entry.txid.clone());
    tx.is_confirmed = Some(category.is_confirmed());
    tx.in_tx_pool = Some(category.in_pool());
    tx.is_failed = Some(category == TransferCategory::Failed);
    tx.fee = entry.fee;
    tx.unlock_time = entry.unlock_time;
    tx.is_locked = entry.locked;
    tx.num_confirmations = entry.confirmations;
    tx.timestamp = entry.timestamp;
    tx.payment_id = entry.payment_id.clone().filter(|p| !p.is_empty());
    tx.note = entry.note.clone().filter(|n| !n.is_empty());
    tx.double_spend_seen = entry.double_spend_seen;
    if category.is_confirmed() {
        tx.block_height = entry.height.filter(|h| *h > 0);
    }

    if category.is_incoming() {
        tx.is_incoming = true;
        tx.incoming_transfers.push(IncomingTransfer {
            tx_hash: entry.txid.clone(),
            amount: entry.amount,
            account_index: entry.subaddr_index.major,
            subaddress_index: entry.subaddr_index.minor,
            address: entry.address.clone().filter(|a| !a.is_empty()),
        });
    } else {
        tx.is_outgoing = true;
        let subaddress_indices = if entry.subaddr_indices.is_empty() {
            vec![entry.subaddr_index.minor]
        } else {
            entry.subaddr_indices.iter().map(|i| i.minor).collect()
        };
        tx.outgoing_transfer = Some(OutgoingTransfer {
            tx_hash: entry.txid.clone(),
            amount: entry.amount,
            account_index: entry.subaddr_index.major,
            subaddress_indices,
            address: entry.address.clone().filter(|a| !a.is_empty()),
            destinations: entry.destinations.clone(),
            provenance: Provenance::Remote,
        });
    }
    Ok(tx)
}

/// Fill in addresses the listing omitted, via the per-session cache.
pub(crate) fn decorate_addresses<C: WalletClient>(
    tx: &mut WalletTx,
    client: &C,
    cache: &AddressCache,
) -> Result<(), QueryError> {
    for transfer in &mut tx.incoming_transfers {
        if transfer.address.is_none() {
            transfer.address = Some(cache.resolve(
                client,
                transfer.account_index,
                transfer.subaddress_index,
            )?);
        }
    }
    if let Some(outgoing) = &mut tx.outgoing_transfer {
        if outgoing.address.is_none() {
            let index = outgoing.subaddress_indices.first().copied().unwrap_or(0);
            outgoing.address = Some(cache.resolve(client, outgoing.account_index, index)?);
        }
    }
    Ok(())
}

/// Output adapter: one listing call per account the query selects,
/// discovering accounts first when none is constrained. Each record decodes
/// into a transaction carrying exactly one output.
pub(crate) fn fetch_txs_by_outputs<C: WalletClient>(
    client: &C,
    output_query: &OutputQuery,
) -> Result<Vec<WalletTx>, QueryError> {
    let accounts: Vec<u32> = match output_query.account_index {
        Some(account) => vec![account],
        None => client
            .get_accounts()?
            .subaddress_accounts
            .iter()
            .map(|a| a.account_index)
            .collect(),
    };
    let subaddr_indices = output_query
        .subaddress_indices
        .clone()
        .or_else(|| output_query.subaddress_index.map(|i| vec![i]));
    // The endpoint can pre-filter by spent state; anything finer is left to
    // the post-filter.
    let transfer_type = match output_query.is_spent {
        Some(true) => "unavailable",
        Some(false) => "available",
        None => "all",
    };

    let mut txs = Vec::new();
    for account in accounts {
        let result = client.incoming_transfers(&IncomingTransfersParams {
            transfer_type: transfer_type.into(),
            account_index: Some(account),
            subaddr_indices: subaddr_indices.clone(),
        })?;
        for entry in &result.transfers {
            txs.push(tx_from_output_entry(entry, account));
        }
    }
    debug!("output adapter decoded {} partial txs", txs.len());
    Ok(txs)
}

/// Decode one output-listing record into a one-output partial tx.
pub(crate) fn tx_from_output_entry(entry: &IncomingTransferEntry, account: u32) -> WalletTx {
    let mut tx = WalletTx::new(entry.tx_hash.clone());
    tx.is_incoming = true;
    if entry.block_height > 0 {
        tx.is_confirmed = Some(true);
        tx.block_height = Some(entry.block_height);
    }
    tx.is_locked = Some(!entry.unlocked);
    tx.outputs.push(OutputRecord {
        tx_hash: entry.tx_hash.clone(),
        amount: entry.amount,
        global_index: Some(entry.global_index),
        key_image: Some(entry.key_image.clone()).filter(|k| !k.is_empty()),
        stealth_public_key: Some(entry.pubkey.clone()).filter(|p| !p.is_empty()),
        is_spent: Some(entry.spent),
        is_frozen: Some(entry.frozen),
        account_index: account,
        subaddress_index: entry.subaddr_index.minor,
    });
    tx
}
