//! Post-filter & order: evaluate the full, re-contextualized query over the
//! merged records, prune transfers/outputs to the matching subset, and keep
//! block transaction lists consistent with what the caller is allowed to see.

use crate::merge::MergeState;
use crate::model::{IncomingTransfer, OutgoingTransfer, OutputRecord, TxSet, WalletTx};
use crate::query::{OutputQuery, TransferQuery, TxQuery};
use std::collections::HashMap;

/// Apply `query` to the merged state, producing the final ordered set.
pub(crate) fn apply(state: MergeState, query: &TxQuery) -> TxSet {
    let (mut txs, order, mut blocks) = state.into_parts();

    let mut kept: Vec<WalletTx> = Vec::new();
    let mut dropped: Vec<String> = Vec::new();
    for hash in order {
        let Some(mut tx) = txs.remove(&hash) else {
            continue;
        };
        if meets_tx_criteria(&tx, query) && prune_children(&mut tx, query) {
            kept.push(tx);
        } else {
            dropped.push(hash);
        }
    }

    // A rejected transaction must not linger in its block's list: block
    // objects travel with the result and other consumers must not see
    // filtered-out transactions through them.
    for hash in &dropped {
        for block in blocks.values_mut() {
            block.tx_hashes.retain(|h| h != hash);
        }
    }
    blocks.retain(|_, block| !block.tx_hashes.is_empty());

    let txs = match &query.hashes {
        Some(hashes) => order_by_hashes(kept, hashes),
        None => {
            let mut txs = kept;
            // Height-ascending; unconfirmed records last, in first-seen order.
            txs.sort_by_key(|t| t.block_height.unwrap_or(u64::MAX));
            txs
        }
    };
    TxSet { txs, blocks }
}

/// Reorder to the caller's explicit hash sequence, omitting unknown hashes.
fn order_by_hashes(txs: Vec<WalletTx>, hashes: &[String]) -> Vec<WalletTx> {
    let mut by_hash: HashMap<String, WalletTx> =
        txs.into_iter().map(|t| (t.hash.clone(), t)).collect();
    hashes.iter().filter_map(|h| by_hash.remove(h)).collect()
}

pub(crate) fn meets_tx_criteria(tx: &WalletTx, q: &TxQuery) -> bool {
    if let Some(hash) = &q.hash {
        if tx.hash != *hash {
            return false;
        }
    }
    if let Some(hashes) = &q.hashes {
        if !hashes.iter().any(|h| *h == tx.hash) {
            return false;
        }
    }
    if let Some(payment_ids) = &q.payment_ids {
        match &tx.payment_id {
            Some(id) if payment_ids.contains(id) => {}
            _ => return false,
        }
    }
    if let Some(confirmed) = q.is_confirmed {
        if tx.is_confirmed.unwrap_or(false) != confirmed {
            return false;
        }
    }
    if let Some(in_pool) = q.in_tx_pool {
        if tx.in_tx_pool.unwrap_or(false) != in_pool {
            return false;
        }
    }
    if let Some(failed) = q.is_failed {
        if tx.is_failed.unwrap_or(false) != failed {
            return false;
        }
    }
    if let Some(locked) = q.is_locked {
        if tx.is_locked.unwrap_or(false) != locked {
            return false;
        }
    }
    if let Some(incoming) = q.is_incoming {
        if tx.is_incoming != incoming {
            return false;
        }
    }
    if let Some(outgoing) = q.is_outgoing {
        if tx.is_outgoing != outgoing {
            return false;
        }
    }
    if let Some(height) = q.height {
        if tx.block_height != Some(height) {
            return false;
        }
    }
    if let Some(min) = q.min_height {
        if tx.block_height.map_or(true, |h| h < min) {
            return false;
        }
    }
    if let Some(max) = q.max_height {
        if tx.block_height.map_or(true, |h| h > max) {
            return false;
        }
    }
    true
}

/// Prune transfers/outputs/inputs to the matching subset and decide whether
/// the transaction survives at all. A transaction left with neither a
/// matching outgoing transfer nor any matching incoming transfer is excluded
/// whenever the query constrains transfers or direction; existence of a
/// match is part of the contract, not just tx-level predicates.
fn prune_children(tx: &mut WalletTx, q: &TxQuery) -> bool {
    let transfer_query = q.transfer_query.as_deref();
    if let Some(tq) = transfer_query {
        tx.incoming_transfers
            .retain(|t| tq.is_incoming != Some(false) && incoming_matches(t, tq));
        if let Some(out) = &tx.outgoing_transfer {
            if tq.is_incoming == Some(true) || !outgoing_matches(out, tq) {
                tx.outgoing_transfer = None;
            }
        }
    }

    let transfer_constrained = q.is_incoming.is_some()
        || q.is_outgoing.is_some()
        || transfer_query.is_some_and(|tq| !tq.is_empty());
    if transfer_constrained
        && tx.incoming_transfers.is_empty()
        && tx.outgoing_transfer.is_none()
    {
        return false;
    }

    if let Some(oq) = q.output_query.as_deref() {
        tx.outputs.retain(|o| output_matches(o, oq));
        if !oq.is_empty() && tx.outputs.is_empty() {
            return false;
        }
    }
    if let Some(iq) = q.input_query.as_deref() {
        tx.inputs.retain(|i| output_matches(i, iq));
        if !iq.is_empty() && tx.inputs.is_empty() {
            return false;
        }
    }
    true
}

pub(crate) fn incoming_matches(t: &IncomingTransfer, q: &TransferQuery) -> bool {
    if q.has_destinations == Some(true) {
        return false;
    }
    if let Some(amount) = q.amount {
        if t.amount != amount {
            return false;
        }
    }
    if let Some(account) = q.account_index {
        if t.account_index != account {
            return false;
        }
    }
    if let Some(index) = q.subaddress_index {
        if t.subaddress_index != index {
            return false;
        }
    }
    if let Some(indices) = &q.subaddress_indices {
        if !indices.contains(&t.subaddress_index) {
            return false;
        }
    }
    if let Some(address) = &q.address {
        if t.address.as_deref() != Some(address.as_str()) {
            return false;
        }
    }
    true
}

pub(crate) fn outgoing_matches(t: &OutgoingTransfer, q: &TransferQuery) -> bool {
    if let Some(has_destinations) = q.has_destinations {
        if has_destinations != !t.destinations.is_empty() {
            return false;
        }
    }
    if let Some(amount) = q.amount {
        if t.amount != amount {
            return false;
        }
    }
    if let Some(account) = q.account_index {
        if t.account_index != account {
            return false;
        }
    }
    if let Some(index) = q.subaddress_index {
        if !t.subaddress_indices.contains(&index) {
            return false;
        }
    }
    if let Some(indices) = &q.subaddress_indices {
        if !indices.iter().any(|i| t.subaddress_indices.contains(i)) {
            return false;
        }
    }
    if let Some(address) = &q.address {
        if t.address.as_deref() != Some(address.as_str()) {
            return false;
        }
    }
    true
}

pub(crate) fn output_matches(o: &OutputRecord, q: &OutputQuery) -> bool {
    if let Some(amount) = q.amount {
        if o.amount != amount {
            return false;
        }
    }
    if let Some(min) = q.min_amount {
        if o.amount < min {
            return false;
        }
    }
    if let Some(max) = q.max_amount {
        if o.amount > max {
            return false;
        }
    }
    if let Some(account) = q.account_index {
        if o.account_index != account {
            return false;
        }
    }
    if let Some(index) = q.subaddress_index {
        if o.subaddress_index != index {
            return false;
        }
    }
    if let Some(indices) = &q.subaddress_indices {
        if !indices.contains(&o.subaddress_index) {
            return false;
        }
    }
    if let Some(key_image) = &q.key_image {
        if o.key_image.as_deref() != Some(key_image.as_str()) {
            return false;
        }
    }
    if let Some(spent) = q.is_spent {
        if o.is_spent.unwrap_or(false) != spent {
            return false;
        }
    }
    if let Some(frozen) = q.is_frozen {
        if o.is_frozen.unwrap_or(false) != frozen {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergeState;

    fn confirmed_tx(hash: &str, height: u64) -> WalletTx {
        let mut tx = WalletTx::new(hash);
        tx.is_confirmed = Some(true);
        tx.block_height = Some(height);
        tx.is_incoming = true;
        tx.incoming_transfers.push(IncomingTransfer {
            tx_hash: hash.into(),
            amount: 10,
            account_index: 0,
            subaddress_index: 0,
            address: None,
        });
        tx
    }

    fn pool_tx(hash: &str) -> WalletTx {
        let mut tx = WalletTx::new(hash);
        tx.is_confirmed = Some(false);
        tx.in_tx_pool = Some(true);
        tx.is_incoming = true;
        tx.incoming_transfers.push(IncomingTransfer {
            tx_hash: hash.into(),
            amount: 10,
            account_index: 0,
            subaddress_index: 0,
            address: None,
        });
        tx
    }

    #[test]
    fn results_sort_height_ascending_with_pool_last() {
        let mut state = MergeState::new();
        state.merge_tx(pool_tx("p"));
        state.merge_tx(confirmed_tx("b", 20));
        state.merge_tx(confirmed_tx("a", 10));
        let set = apply(state, &TxQuery::default().normalized().unwrap());
        let hashes: Vec<&str> = set.txs.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b", "p"]);
    }

    #[test]
    fn explicit_hash_order_wins_and_unknowns_are_omitted() {
        let mut state = MergeState::new();
        state.merge_tx(confirmed_tx("h1", 10));
        state.merge_tx(confirmed_tx("h3", 5));
        let query = TxQuery::default()
            .with_hashes(vec!["h1".into(), "h2".into(), "h3".into()])
            .normalized()
            .unwrap();
        let set = apply(state, &query);
        let hashes: Vec<&str> = set.txs.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["h1", "h3"]);
    }

    #[test]
    fn rejected_tx_is_removed_from_its_block_list() {
        let mut state = MergeState::new();
        state.merge_tx(confirmed_tx("keep", 10));
        state.merge_tx(confirmed_tx("drop", 10));
        let query = TxQuery::default()
            .with_hashes(vec!["keep".into()])
            .normalized()
            .unwrap();
        let set = apply(state, &query);
        assert_eq!(set.txs.len(), 1);
        let block = set.blocks.get(&10).unwrap();
        assert_eq!(block.tx_hashes, vec!["keep".to_string()]);
    }

    #[test]
    fn block_with_no_surviving_txs_is_dropped() {
        let mut state = MergeState::new();
        state.merge_tx(confirmed_tx("only", 10));
        let query = TxQuery::default()
            .with_hashes(vec!["other".into()])
            .normalized()
            .unwrap();
        let set = apply(state, &query);
        assert!(set.txs.is_empty());
        assert!(set.blocks.is_empty());
    }

    #[test]
    fn min_max_height_bound_excludes_unconfirmed() {
        let q = TxQuery::default().height_range(Some(5), Some(15));
        assert!(meets_tx_criteria(&confirmed_tx("a", 10), &q));
        assert!(!meets_tx_criteria(&confirmed_tx("b", 20), &q));
        assert!(!meets_tx_criteria(&pool_tx("p"), &q));
    }

    #[test]
    fn transfer_query_prunes_non_matching_transfers() {
        let mut tx = confirmed_tx("a", 10);
        tx.incoming_transfers.push(IncomingTransfer {
            tx_hash: "a".into(),
            amount: 99,
            account_index: 1,
            subaddress_index: 2,
            address: None,
        });
        let query = TxQuery::default()
            .with_transfer_query(TransferQuery::default().with_account(1))
            .normalized()
            .unwrap();
        assert!(prune_children(&mut tx, &query));
        assert_eq!(tx.incoming_transfers.len(), 1);
        assert_eq!(tx.incoming_transfers[0].account_index, 1);
    }

    #[test]
    fn tx_without_any_matching_transfer_is_excluded() {
        let mut tx = confirmed_tx("a", 10);
        let query = TxQuery::default()
            .with_transfer_query(TransferQuery::default().with_account(7))
            .normalized()
            .unwrap();
        assert!(!prune_children(&mut tx, &query));
    }

    #[test]
    fn outgoing_only_tx_fails_incoming_direction() {
        let mut tx = WalletTx::new("o");
        tx.is_outgoing = true;
        tx.outgoing_transfer = Some(OutgoingTransfer {
            tx_hash: "o".into(),
            amount: 5,
            ..Default::default()
        });
        let q = TxQuery::default().incoming(true);
        assert!(!meets_tx_criteria(&tx, &q));
    }
}
