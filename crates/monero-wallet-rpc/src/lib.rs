//! monero-wallet-rpc
//!
//! Minimal, blocking JSON-RPC client for `monero-wallet-rpc`.
//! Methods used (all via POST /json_rpc):
//! - "get_transfers"          (transfer-oriented listing, grouped by category)
//! - "get_transfer_by_txid"   (single-hash lookup, hard error on unknown hash)
//! - "incoming_transfers"     (output-oriented listing per account)
//! - "get_accounts"           (account discovery)
//! - "get_address"            (subaddress index -> address)
//! - "get_balance"            (per-account / per-subaddress balance)
//!
//! The client is deliberately thin: it builds requests, decodes result
//! envelopes, and maps wallet error codes to `RpcError`. Combining the
//! overlapping views these endpoints return into one transaction graph is
//! the job of the `monero-wallet-query` crate.

use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    Url(#[from] url::ParseError),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("wallet rpc error (method {method}) code={code} message={message}")]
    Wallet {
        method: String,
        code: i64,
        message: String,
    },
    #[error("wallet rpc missing result for method {0}")]
    ResultMissing(String),
}

impl RpcError {
    /// Wallet error code, when the remote reported one.
    pub fn wallet_code(&self) -> Option<i64> {
        match self {
            RpcError::Wallet { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Rewrite a small set of known wallet error codes into clearer messages.
/// Everything else passes through verbatim.
fn normalize_wallet_error(code: i64, message: String) -> String {
    match code {
        -2 => format!("invalid address: {message}"),
        -8 => format!("invalid transaction id: {message}"),
        -13 => format!("no wallet file open: {message}"),
        -21 => format!("daemon is not connected: {message}"),
        _ => message,
    }
}

/// The narrow call surface the query engine depends on. `WalletRpc` is the
/// production implementation; tests supply stubs.
pub trait WalletClient: Send + Sync {
    fn get_transfers(&self, params: &GetTransfersParams) -> Result<GetTransfersResult, RpcError>;
    fn get_transfer_by_txid(
        &self,
        params: &GetTransferByTxidParams,
    ) -> Result<GetTransferByTxidResult, RpcError>;
    fn incoming_transfers(
        &self,
        params: &IncomingTransfersParams,
    ) -> Result<IncomingTransfersResult, RpcError>;
    fn get_accounts(&self) -> Result<GetAccountsResult, RpcError>;
    fn get_address(&self, params: &GetAddressParams) -> Result<GetAddressResult, RpcError>;
    fn get_balance(&self, params: &GetBalanceParams) -> Result<GetBalanceResult, RpcError>;
}

#[derive(Clone)]
pub struct WalletRpc {
    base: Url,
    client: Client,
    auth_header: Option<HeaderValue>,
}

impl WalletRpc {
    /// Create a new wallet client. `base` like "http://127.0.0.1:18083".
    /// Optional basic auth via (user, pass). If None, no Authorization header is sent.
    pub fn new(base: &str, auth: Option<(String, String)>) -> Result<Self, RpcError> {
        let base = Url::parse(base)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        let auth_header = match auth {
            Some((user, pass)) => {
                let token = format!("{user}:{pass}");
                let enc = general_purpose::STANDARD.encode(token);
                let header_value = HeaderValue::from_str(&format!("Basic {}", enc))
                    .map_err(|e| RpcError::Decode(format!("auth header encode: {e}")))?;
                Some(header_value)
            }
            None => None,
        };

        Ok(Self {
            base,
            client,
            auth_header,
        })
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(a) = &self.auth_header {
            h.insert(AUTHORIZATION, a.clone());
        }
        h
    }

    fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        #[derive(Serialize)]
        struct Request<'a, T> {
            jsonrpc: &'a str,
            id: &'a str,
            method: &'a str,
            params: &'a T,
        }

        #[derive(Deserialize)]
        struct Envelope {
            result: Option<serde_json::Value>,
            error: Option<WalletError>,
        }

        #[derive(Deserialize)]
        struct WalletError {
            code: i64,
            message: String,
        }

        let url = self.base.join("/json_rpc")?;
        let req = Request {
            jsonrpc: "2.0",
            id: "0",
            method,
            params,
        };
        let resp = self
            .client
            .post(url)
            .headers(self.auth_headers())
            .json(&req)
            .send()?;
        if !resp.status().is_success() {
            return Err(RpcError::Decode(format!(
                "{method} HTTP {}",
                resp.status()
            )));
        }
        let envelope: Envelope = resp.json()?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Wallet {
                method: method.to_string(),
                code: err.code,
                message: normalize_wallet_error(err.code, err.message),
            });
        }
        let result = envelope
            .result
            .ok_or_else(|| RpcError::ResultMissing(method.to_string()))?;
        serde_json::from_value::<R>(result)
            .map_err(|e| RpcError::Decode(format!("{method} decode: {e}")))
    }
}

impl WalletClient for WalletRpc {
    fn get_transfers(&self, params: &GetTransfersParams) -> Result<GetTransfersResult, RpcError> {
        self.call("get_transfers", params)
    }

    fn get_transfer_by_txid(
        &self,
        params: &GetTransferByTxidParams,
    ) -> Result<GetTransferByTxidResult, RpcError> {
        self.call("get_transfer_by_txid", params)
    }

    fn incoming_transfers(
        &self,
        params: &IncomingTransfersParams,
    ) -> Result<IncomingTransfersResult, RpcError> {
        self.call("incoming_transfers", params)
    }

    fn get_accounts(&self) -> Result<GetAccountsResult, RpcError> {
        #[derive(Serialize)]
        struct Params {}
        self.call("get_accounts", &Params {})
    }

    fn get_address(&self, params: &GetAddressParams) -> Result<GetAddressResult, RpcError> {
        self.call("get_address", params)
    }

    fn get_balance(&self, params: &GetBalanceParams) -> Result<GetBalanceResult, RpcError> {
        self.call("get_balance", params)
    }
}

/// (account, subaddress) index pair as the wallet RPC spells it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubaddrIndex {
    pub major: u32,
    pub minor: u32,
}

/// Destination address+amount pair on an outgoing transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct GetTransfersParams {
    #[serde(rename = "in")]
    pub incoming: bool,
    pub out: bool,
    pub pending: bool,
    pub failed: bool,
    pub pool: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_by_height: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddr_indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_accounts: Option<bool>,
}

/// One record from the transfer-oriented listing. The `transfer_type`
/// discriminator (`in`/`out`/`pool`/`pending`/`failed`/`block`) carries the
/// confirmation state; decoding it into a closed enum is the engine's job.
///
/// Fields the wallet omits decode as `None` rather than a zero value, so a
/// downstream merge of two partial views can tell "absent" from "zero".
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct TransferEntry {
    pub txid: String,
    #[serde(rename = "type")]
    pub transfer_type: String,
    pub amount: u64,
    pub fee: Option<u64>,
    pub height: Option<u64>,
    pub timestamp: Option<u64>,
    pub confirmations: Option<u64>,
    pub suggested_confirmations_threshold: Option<u64>,
    pub unlock_time: Option<u64>,
    pub locked: Option<bool>,
    pub double_spend_seen: Option<bool>,
    pub payment_id: Option<String>,
    pub note: Option<String>,
    pub address: Option<String>,
    pub subaddr_index: SubaddrIndex,
    pub subaddr_indices: Vec<SubaddrIndex>,
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GetTransfersResult {
    #[serde(rename = "in")]
    pub incoming: Vec<TransferEntry>,
    pub out: Vec<TransferEntry>,
    pub pending: Vec<TransferEntry>,
    pub failed: Vec<TransferEntry>,
    pub pool: Vec<TransferEntry>,
}

impl GetTransfersResult {
    /// All entries in listing order, regardless of category key.
    pub fn entries(&self) -> impl Iterator<Item = &TransferEntry> {
        self.incoming
            .iter()
            .chain(self.out.iter())
            .chain(self.pending.iter())
            .chain(self.failed.iter())
            .chain(self.pool.iter())
    }
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct GetTransferByTxidParams {
    pub txid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GetTransferByTxidResult {
    pub transfer: TransferEntry,
    pub transfers: Vec<TransferEntry>,
}

#[derive(Debug, Serialize, Clone)]
pub struct IncomingTransfersParams {
    /// "all", "available" or "unavailable".
    pub transfer_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddr_indices: Option<Vec<u32>>,
}

impl Default for IncomingTransfersParams {
    fn default() -> Self {
        Self {
            transfer_type: "all".into(),
            account_index: None,
            subaddr_indices: None,
        }
    }
}

/// One record from the output-oriented listing.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct IncomingTransferEntry {
    pub amount: u64,
    pub spent: bool,
    pub frozen: bool,
    pub unlocked: bool,
    pub global_index: u64,
    pub tx_hash: String,
    pub key_image: String,
    pub pubkey: String,
    pub subaddr_index: SubaddrIndex,
    pub block_height: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct IncomingTransfersResult {
    pub transfers: Vec<IncomingTransferEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GetAccountsResult {
    pub total_balance: u64,
    pub total_unlocked_balance: u64,
    pub subaddress_accounts: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AccountEntry {
    pub account_index: u32,
    pub base_address: String,
    pub balance: u64,
    pub unlocked_balance: u64,
    pub label: String,
    pub tag: String,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct GetAddressParams {
    pub account_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_index: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GetAddressResult {
    pub address: String,
    pub addresses: Vec<AddressEntry>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AddressEntry {
    pub address: String,
    pub address_index: u32,
    pub label: String,
    pub used: bool,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct GetBalanceParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_accounts: Option<bool>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct GetBalanceResult {
    pub balance: u64,
    pub unlocked_balance: u64,
    pub multisig_import_needed: bool,
    pub per_subaddress: Vec<SubaddressBalance>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SubaddressBalance {
    pub account_index: u32,
    pub address_index: u32,
    pub address: String,
    pub balance: u64,
    pub unlocked_balance: u64,
    pub num_unspent_outputs: u64,
}
