use monero_wallet_query::{OutputQuery, TransferQuery, TxQuery, WalletQuery};
use monero_wallet_rpc::WalletRpc;

fn main() -> anyhow::Result<()> {
    let rpc = WalletRpc::new("http://127.0.0.1:38083", None)?; // stagenet wallet-rpc
    let engine = WalletQuery::new(rpc);

    let confirmed = engine.get_txs(&TxQuery::default().confirmed(true).with_outputs())?;
    for tx in &confirmed.txs {
        println!(
            "tx {} height={:?} fee={:?} outputs={}",
            tx.hash,
            tx.block_height,
            tx.fee,
            tx.outputs.len()
        );
    }
    println!("blocks touched: {}", confirmed.blocks.len());

    for transfer in engine.get_transfers(&TransferQuery::default().incoming(true))? {
        println!("received {} in {}", transfer.amount(), transfer.tx_hash());
    }

    for output in engine.get_outputs(&OutputQuery::default().spent(false))? {
        println!(
            "unspent {} (account {}, subaddr {})",
            output.amount, output.account_index, output.subaddress_index
        );
    }
    Ok(())
}
