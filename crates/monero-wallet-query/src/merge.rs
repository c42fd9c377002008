//! Merging partial transaction/block views into canonical per-hash and
//! per-height records.
//!
//! The transfer endpoint, the output endpoint and repeated calls for
//! different accounts each see a slice of the same transaction. `MergeState`
//! unions those slices: a field already set is never clobbered by an absent
//! one, list fields are unioned by identity keys, and an outgoing transfer
//! reported by the remote wallet always beats a locally synthesized
//! placeholder. Merging the same record twice is a no-op.

use crate::model::{Block, IncomingTransfer, OutgoingTransfer, OutputRecord, Provenance, WalletTx};
use log::debug;
use std::collections::{BTreeMap, HashMap};

/// Per-call merge maps: transactions keyed by hash (first-seen order
/// preserved) and blocks keyed by height. Allocated fresh for every query;
/// nothing survives across calls.
#[derive(Debug, Default)]
pub struct MergeState {
    txs: HashMap<String, WalletTx>,
    order: Vec<String>,
    blocks: BTreeMap<u64, Block>,
}

impl MergeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<&WalletTx> {
        self.txs.get(hash)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn blocks(&self) -> &BTreeMap<u64, Block> {
        &self.blocks
    }

    /// Merge one partial transaction view. Identity is the hash; the block,
    /// if the view carries a height, is merged into the height map and the
    /// hash added to its transaction list exactly once.
    pub fn merge_tx(&mut self, tx: WalletTx) {
        let hash = tx.hash.clone();
        if let Some(existing) = self.txs.get_mut(&hash) {
            merge_tx_records(existing, tx);
        } else {
            self.order.push(hash.clone());
            self.txs.insert(hash.clone(), tx);
        }
        if let Some(merged) = self.txs.get(&hash) {
            if let Some(height) = merged.block_height {
                let timestamp = if merged.is_confirmed == Some(true) {
                    merged.timestamp
                } else {
                    None
                };
                merge_block(&mut self.blocks, height, timestamp, &hash);
            }
        }
    }

    /// Consume the maps in first-seen order for post-filtering.
    pub(crate) fn into_parts(self) -> (HashMap<String, WalletTx>, Vec<String>, BTreeMap<u64, Block>) {
        (self.txs, self.order, self.blocks)
    }
}

fn merge_block(blocks: &mut BTreeMap<u64, Block>, height: u64, timestamp: Option<u64>, hash: &str) {
    let block = blocks.entry(height).or_insert_with(|| Block {
        height,
        timestamp: None,
        tx_hashes: Vec::new(),
    });
    merge_opt(&mut block.timestamp, timestamp);
    if !block.tx_hashes.iter().any(|h| h == hash) {
        block.tx_hashes.push(hash.to_string());
    }
}

/// Field-wise union of two views of the same transaction.
pub fn merge_tx_records(existing: &mut WalletTx, other: WalletTx) {
    debug_assert_eq!(existing.hash, other.hash);

    // A view that observed a state (confirmed, seen in the pool, failed,
    // direction) wins over one that did not; two calls are not atomic with
    // respect to the chain, so the union can be transiently contradictory;
    // the caller's consistency check deals with that.
    merge_observed(&mut existing.is_confirmed, other.is_confirmed);
    merge_observed(&mut existing.in_tx_pool, other.in_tx_pool);
    merge_observed(&mut existing.is_failed, other.is_failed);
    merge_observed(&mut existing.double_spend_seen, other.double_spend_seen);
    existing.is_incoming |= other.is_incoming;
    existing.is_outgoing |= other.is_outgoing;

    merge_opt(&mut existing.fee, other.fee);
    merge_opt(&mut existing.unlock_time, other.unlock_time);
    merge_opt(&mut existing.is_locked, other.is_locked);
    merge_opt(&mut existing.timestamp, other.timestamp);
    merge_opt(&mut existing.payment_id, other.payment_id);
    merge_opt(&mut existing.note, other.note);
    merge_max(&mut existing.num_confirmations, other.num_confirmations);

    if let (Some(a), Some(b)) = (existing.block_height, other.block_height) {
        if a != b {
            debug!(
                "tx {} reported at heights {a} and {b}; keeping {a}",
                existing.hash
            );
        }
    }
    merge_opt(&mut existing.block_height, other.block_height);

    for transfer in other.incoming_transfers {
        merge_incoming_transfer(&mut existing.incoming_transfers, transfer);
    }
    if let Some(outgoing) = other.outgoing_transfer {
        merge_outgoing_transfer(&mut existing.outgoing_transfer, outgoing);
    }
    for output in other.outputs {
        merge_output(&mut existing.outputs, output);
    }
    for input in other.inputs {
        merge_output(&mut existing.inputs, input);
    }
}

/// Incoming transfers are identified by the receiving (account, subaddress).
fn merge_incoming_transfer(transfers: &mut Vec<IncomingTransfer>, incoming: IncomingTransfer) {
    match transfers.iter_mut().find(|t| {
        t.account_index == incoming.account_index
            && t.subaddress_index == incoming.subaddress_index
    }) {
        Some(existing) => {
            if existing.amount == 0 {
                existing.amount = incoming.amount;
            }
            merge_opt(&mut existing.address, incoming.address);
        }
        None => transfers.push(incoming),
    }
}

/// Real remote data beats a synthesized placeholder; in particular the
/// source subaddress indices and destination list of a remote record must
/// never be replaced by best-effort values invented elsewhere.
fn merge_outgoing_transfer(slot: &mut Option<OutgoingTransfer>, incoming: OutgoingTransfer) {
    let Some(existing) = slot.as_mut() else {
        *slot = Some(incoming);
        return;
    };
    match (existing.provenance, incoming.provenance) {
        (Provenance::Remote, Provenance::Synthesized) => {}
        (Provenance::Synthesized, Provenance::Remote) => *slot = Some(incoming),
        _ => {
            if existing.amount == 0 {
                existing.amount = incoming.amount;
            }
            for idx in incoming.subaddress_indices {
                if !existing.subaddress_indices.contains(&idx) {
                    existing.subaddress_indices.push(idx);
                }
            }
            merge_opt(&mut existing.address, incoming.address);
            if existing.destinations.is_empty() {
                existing.destinations = incoming.destinations;
            }
        }
    }
}

/// Outputs are identified by key image when both sides carry one, otherwise
/// by global index.
fn merge_output(outputs: &mut Vec<OutputRecord>, output: OutputRecord) {
    let found = outputs.iter_mut().find(|o| {
        match (&o.key_image, &output.key_image) {
            (Some(a), Some(b)) => a == b,
            _ => o.global_index.is_some() && o.global_index == output.global_index,
        }
    });
    match found {
        Some(existing) => {
            if existing.amount == 0 {
                existing.amount = output.amount;
            }
            merge_opt(&mut existing.global_index, output.global_index);
            merge_opt(&mut existing.key_image, output.key_image);
            merge_opt(&mut existing.stealth_public_key, output.stealth_public_key);
            merge_opt(&mut existing.is_spent, output.is_spent);
            merge_opt(&mut existing.is_frozen, output.is_frozen);
        }
        None => outputs.push(output),
    }
}

fn merge_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn merge_max(slot: &mut Option<u64>, value: Option<u64>) {
    *slot = match (*slot, value) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
}

fn merge_observed(slot: &mut Option<bool>, value: Option<bool>) {
    *slot = match (*slot, value) {
        (Some(a), Some(b)) => Some(a || b),
        (a, b) => a.or(b),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::tx_from_transfer_entry;
    use monero_wallet_rpc::{SubaddrIndex, TransferEntry};

    fn out_entry() -> TransferEntry {
        TransferEntry {
            txid: "abc".into(),
            transfer_type: "out".into(),
            amount: 100,
            fee: Some(10),
            subaddr_index: SubaddrIndex { major: 0, minor: 0 },
            ..Default::default()
        }
    }

    fn pool_entry() -> TransferEntry {
        TransferEntry {
            txid: "abc".into(),
            transfer_type: "pool".into(),
            locked: Some(true),
            subaddr_index: SubaddrIndex { major: 0, minor: 0 },
            ..Default::default()
        }
    }

    #[test]
    fn out_and_pool_views_of_the_same_hash_union_their_fields() {
        let mut state = MergeState::new();
        state.merge_tx(tx_from_transfer_entry(&out_entry()).unwrap());
        state.merge_tx(tx_from_transfer_entry(&pool_entry()).unwrap());

        assert_eq!(state.len(), 1);
        let tx = state.get("abc").unwrap();
        assert_eq!(tx.fee, Some(10));
        assert!(tx.is_outgoing);
        assert!(tx.is_incoming);
        assert_eq!(tx.in_tx_pool, Some(true));
        assert_eq!(tx.is_locked, Some(true));
    }

    #[test]
    fn merging_the_same_record_twice_is_idempotent() {
        let entry = TransferEntry {
            txid: "abc".into(),
            transfer_type: "in".into(),
            amount: 50,
            height: Some(70),
            timestamp: Some(1_600_000_000),
            subaddr_index: SubaddrIndex { major: 0, minor: 2 },
            address: Some("9xReceiver".into()),
            ..Default::default()
        };
        let mut once = MergeState::new();
        once.merge_tx(tx_from_transfer_entry(&entry).unwrap());

        let mut twice = MergeState::new();
        twice.merge_tx(tx_from_transfer_entry(&entry).unwrap());
        twice.merge_tx(tx_from_transfer_entry(&entry).unwrap());

        assert_eq!(once.get("abc"), twice.get("abc"));
        assert_eq!(twice.get("abc").unwrap().incoming_transfers.len(), 1);
        assert_eq!(twice.blocks().get(&70).unwrap().tx_hashes, vec!["abc"]);
    }

    #[test]
    fn block_tx_list_unions_across_adapters_without_duplicates() {
        let mut tx_a = WalletTx::new("a");
        tx_a.is_confirmed = Some(true);
        tx_a.block_height = Some(5);
        tx_a.timestamp = Some(111);
        let mut tx_a_again = tx_a.clone();
        tx_a_again.timestamp = None;
        let mut tx_b = WalletTx::new("b");
        tx_b.is_confirmed = Some(true);
        tx_b.block_height = Some(5);

        let mut state = MergeState::new();
        state.merge_tx(tx_a);
        state.merge_tx(tx_a_again);
        state.merge_tx(tx_b);

        let block = state.blocks().get(&5).unwrap();
        assert_eq!(block.tx_hashes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(block.timestamp, Some(111));
    }

    #[test]
    fn remote_outgoing_transfer_beats_synthesized_placeholder() {
        let remote = OutgoingTransfer {
            tx_hash: "abc".into(),
            amount: 100,
            account_index: 1,
            subaddress_indices: vec![0, 3],
            provenance: Provenance::Remote,
            ..Default::default()
        };
        let placeholder = OutgoingTransfer {
            tx_hash: "abc".into(),
            amount: 100,
            account_index: 1,
            subaddress_indices: vec![0],
            provenance: Provenance::Synthesized,
            ..Default::default()
        };

        // Placeholder arrives second: ignored.
        let mut slot = Some(remote.clone());
        merge_outgoing_transfer(&mut slot, placeholder.clone());
        assert_eq!(slot.as_ref().unwrap().subaddress_indices, vec![0, 3]);

        // Placeholder arrives first: replaced wholesale.
        let mut slot = Some(placeholder);
        merge_outgoing_transfer(&mut slot, remote);
        assert_eq!(slot.as_ref().unwrap().provenance, Provenance::Remote);
        assert_eq!(slot.as_ref().unwrap().subaddress_indices, vec![0, 3]);
    }

    #[test]
    fn outputs_union_by_key_image_then_global_index() {
        let mut outputs = vec![OutputRecord {
            tx_hash: "abc".into(),
            amount: 7,
            key_image: Some("ki1".into()),
            global_index: None,
            ..Default::default()
        }];
        // Same key image, fuller record: merged in place.
        merge_output(
            &mut outputs,
            OutputRecord {
                tx_hash: "abc".into(),
                amount: 7,
                key_image: Some("ki1".into()),
                global_index: Some(42),
                is_spent: Some(false),
                ..Default::default()
            },
        );
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].global_index, Some(42));
        assert_eq!(outputs[0].is_spent, Some(false));

        // Different key image: appended.
        merge_output(
            &mut outputs,
            OutputRecord {
                tx_hash: "abc".into(),
                amount: 3,
                key_image: Some("ki2".into()),
                ..Default::default()
            },
        );
        assert_eq!(outputs.len(), 2);
    }
}
