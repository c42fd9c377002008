//! The query engine: normalizes a query, fans it out to the endpoint
//! adapters, merges the partial views, post-filters, and repairs transient
//! inconsistencies with a single refetch.

use crate::adapter;
use crate::error::QueryError;
use crate::filter;
use crate::merge::MergeState;
use crate::model::{OutputRecord, Transfer, TxSet, WalletTx};
use crate::query::{OutputQuery, TransferQuery, TxQuery};
use log::warn;
use monero_wallet_rpc::{
    GetAccountsResult, GetAddressParams, GetBalanceParams, GetBalanceResult,
    GetTransferByTxidParams, WalletClient,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Subaddress index -> address, resolved lazily through `get_address` and
/// kept for the lifetime of the engine. Listing endpoints omit addresses for
/// some record shapes; resolving each miss once keeps the call count bounded
/// by the number of distinct subaddresses, not the number of records.
pub(crate) struct AddressCache {
    entries: RwLock<HashMap<(u32, u32), String>>,
}

impl AddressCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn resolve<C: WalletClient>(
        &self,
        client: &C,
        account: u32,
        index: u32,
    ) -> Result<String, QueryError> {
        if let Some(address) = self.entries.read().get(&(account, index)) {
            return Ok(address.clone());
        }
        let result = client.get_address(&GetAddressParams {
            account_index: account,
            address_index: Some(vec![index]),
        })?;
        let mut entries = self.entries.write();
        for entry in &result.addresses {
            entries.insert((account, entry.address_index), entry.address.clone());
        }
        if let Some(address) = entries.get(&(account, index)) {
            return Ok(address.clone());
        }
        // Wallet answered without the requested index; the account's base
        // address is the best available stand-in.
        entries.insert((account, index), result.address.clone());
        Ok(result.address)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Query interface over one wallet-RPC endpoint. All calls are blocking and
/// sequential; the engine holds no state besides the address cache, so one
/// instance can serve many queries.
pub struct WalletQuery<C: WalletClient> {
    client: C,
    addresses: AddressCache,
}

impl<C: WalletClient> WalletQuery<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            addresses: AddressCache::new(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Forget cached subaddress resolutions, e.g. after switching wallets on
    /// the same endpoint.
    pub fn clear_address_cache(&self) {
        self.addresses.clear();
    }

    /// Fetch the transactions matching `query`, with the transfers, outputs
    /// and blocks the query asks for attached.
    ///
    /// Every returned transaction satisfies the confirmed/block invariant:
    /// the two listing endpoints are not atomic with respect to the chain, so
    /// a violation triggers one full refetch before being surfaced as
    /// [`QueryError::Inconsistent`].
    pub fn get_txs(&self, query: &TxQuery) -> Result<TxSet, QueryError> {
        let normalized = query.normalized()?;
        let set = self.get_txs_attempt(&normalized)?;
        let Some(stale) = first_inconsistency(&set) else {
            return Ok(set);
        };
        warn!("tx {stale} violated the confirmed/block invariant; refetching");
        let set = self.get_txs_attempt(&normalized)?;
        match set.txs.iter().find(|tx| !tx.is_consistent()) {
            None => Ok(set),
            Some(tx) => Err(QueryError::Inconsistent {
                hash: tx.hash.clone(),
                confirmed: tx.is_confirmed == Some(true),
                has_block: tx.block_height.is_some(),
            }),
        }
    }

    fn get_txs_attempt(&self, normalized: &TxQuery) -> Result<TxSet, QueryError> {
        let mut query = normalized.clone();
        let ctx = query.decontextualize();

        let mut state = MergeState::new();
        for tx in adapter::fetch_txs_by_transfers(&self.client, &self.addresses, &query)? {
            state.merge_tx(tx);
        }
        let wants_outputs =
            query.include_outputs || ctx.output_query.is_some() || ctx.input_query.is_some();
        if wants_outputs {
            let output_query = ctx
                .output_query
                .as_deref()
                .cloned()
                .unwrap_or_default();
            for tx in adapter::fetch_txs_by_outputs(&self.client, &output_query)? {
                state.merge_tx(tx);
            }
        }

        query.recontextualize(ctx);
        Ok(filter::apply(state, &query))
    }

    /// Single-hash lookup via `get_transfer_by_txid`. A hash the wallet does
    /// not know is [`QueryError::TxNotFound`], unlike the batch path which
    /// silently omits unknown hashes.
    pub fn get_tx(&self, txid: &str) -> Result<WalletTx, QueryError> {
        let tx = self.get_tx_attempt(txid)?;
        if tx.is_consistent() {
            return Ok(tx);
        }
        warn!("tx {txid} violated the confirmed/block invariant; refetching");
        let tx = self.get_tx_attempt(txid)?;
        if tx.is_consistent() {
            Ok(tx)
        } else {
            Err(QueryError::Inconsistent {
                hash: tx.hash,
                confirmed: tx.is_confirmed == Some(true),
                has_block: tx.block_height.is_some(),
            })
        }
    }

    fn get_tx_attempt(&self, txid: &str) -> Result<WalletTx, QueryError> {
        let result = self
            .client
            .get_transfer_by_txid(&GetTransferByTxidParams {
                txid: txid.to_string(),
                account_index: None,
            })
            .map_err(|e| match e.wallet_code() {
                Some(-8) => QueryError::TxNotFound(txid.to_string()),
                _ => QueryError::Rpc(e),
            })?;

        // Older wallets return only the singular `transfer` field.
        let mut state = MergeState::new();
        if result.transfers.is_empty() {
            state.merge_tx(adapter::tx_from_transfer_entry(&result.transfer)?);
        } else {
            for entry in &result.transfers {
                state.merge_tx(adapter::tx_from_transfer_entry(entry)?);
            }
        }
        let (mut txs, _, _) = state.into_parts();
        let mut tx = txs
            .remove(txid)
            .ok_or_else(|| QueryError::TxNotFound(txid.to_string()))?;
        adapter::decorate_addresses(&mut tx, &self.client, &self.addresses)?;
        Ok(tx)
    }

    /// Fetch individual transfers. A query whose nested tx-query only
    /// constrains what the transfer listing already reports is answered from
    /// that listing alone; one that co-filters on direction or outputs goes
    /// through the full transaction pipeline first.
    pub fn get_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>, QueryError> {
        let normalized = query.normalized()?;
        let set = if query.is_contextual() {
            self.get_txs(&normalized)?
        } else {
            self.get_txs_attempt(&normalized)?
        };
        Ok(flatten_transfers(set))
    }

    /// Fetch individual outputs, same two-path split as [`Self::get_transfers`].
    pub fn get_outputs(&self, query: &OutputQuery) -> Result<Vec<OutputRecord>, QueryError> {
        let normalized = query.normalized()?;
        let set = if query.is_contextual() {
            self.get_txs(&normalized)?
        } else {
            let mut stripped = query.clone();
            stripped.tx_query = None;
            let mut state = MergeState::new();
            for tx in adapter::fetch_txs_by_outputs(&self.client, &stripped)? {
                state.merge_tx(tx);
            }
            filter::apply(state, &normalized)
        };
        Ok(set.txs.into_iter().flat_map(|tx| tx.outputs).collect())
    }

    pub fn accounts(&self) -> Result<GetAccountsResult, QueryError> {
        Ok(self.client.get_accounts()?)
    }

    pub fn balance(&self, params: &GetBalanceParams) -> Result<GetBalanceResult, QueryError> {
        Ok(self.client.get_balance(params)?)
    }
}

fn first_inconsistency(set: &TxSet) -> Option<&str> {
    set.txs
        .iter()
        .find(|tx| !tx.is_consistent())
        .map(|tx| tx.hash.as_str())
}

/// Flatten a transaction set into transfers, incoming before outgoing within
/// each transaction, transaction order preserved.
fn flatten_transfers(set: TxSet) -> Vec<Transfer> {
    let mut transfers = Vec::new();
    for tx in set.txs {
        for incoming in tx.incoming_transfers {
            transfers.push(Transfer::Incoming(incoming));
        }
        if let Some(outgoing) = tx.outgoing_transfer {
            transfers.push(Transfer::Outgoing(outgoing));
        }
    }
    transfers
}
