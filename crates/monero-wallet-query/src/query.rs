//! Query model: compositional descriptions of the transactions, transfers
//! and outputs a caller wants.
//!
//! A transfer- or output-query may reference a tx-query and vice versa. The
//! canonical (normalized) form is a single owning pair: the tx-query holds
//! its sub-queries and an owned sub-query's own `tx_query` field is `None`;
//! the back-reference is implicit by ownership. Normalization is a pure
//! function from a loosely specified query to that validated pair; it clones
//! rather than mutating anything the caller still holds. Structural equality
//! stands in for pointer identity when checking that a supplied circular
//! reference really is a self-reference.

use crate::error::QueryError;

/// Predicates over whole transactions, plus optional nested transfer/output
/// queries for cross-category co-filtering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TxQuery {
    pub hash: Option<String>,
    /// Explicit hash list; also fixes the order of the final result.
    pub hashes: Option<Vec<String>>,
    pub is_confirmed: Option<bool>,
    pub in_tx_pool: Option<bool>,
    pub is_failed: Option<bool>,
    pub is_incoming: Option<bool>,
    pub is_outgoing: Option<bool>,
    pub is_locked: Option<bool>,
    pub height: Option<u64>,
    pub min_height: Option<u64>,
    pub max_height: Option<u64>,
    pub payment_ids: Option<Vec<String>>,
    pub include_outputs: bool,
    pub transfer_query: Option<Box<TransferQuery>>,
    pub output_query: Option<Box<OutputQuery>>,
    pub input_query: Option<Box<OutputQuery>>,
}

impl TxQuery {
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_hashes(mut self, hashes: Vec<String>) -> Self {
        self.hashes = Some(hashes);
        self
    }

    pub fn confirmed(mut self, v: bool) -> Self {
        self.is_confirmed = Some(v);
        self
    }

    pub fn in_pool(mut self, v: bool) -> Self {
        self.in_tx_pool = Some(v);
        self
    }

    pub fn failed(mut self, v: bool) -> Self {
        self.is_failed = Some(v);
        self
    }

    pub fn incoming(mut self, v: bool) -> Self {
        self.is_incoming = Some(v);
        self
    }

    pub fn outgoing(mut self, v: bool) -> Self {
        self.is_outgoing = Some(v);
        self
    }

    pub fn height_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_height = min;
        self.max_height = max;
        self
    }

    pub fn with_outputs(mut self) -> Self {
        self.include_outputs = true;
        self
    }

    pub fn with_transfer_query(mut self, q: TransferQuery) -> Self {
        self.transfer_query = Some(Box::new(q));
        self
    }

    pub fn with_output_query(mut self, q: OutputQuery) -> Self {
        self.output_query = Some(Box::new(q));
        self
    }

    /// Canonicalize and validate. The result always carries a transfer query
    /// (an empty one if the caller supplied none) whose back-reference is
    /// cleared, and likewise clears back-references on output/input queries.
    pub fn normalized(&self) -> Result<TxQuery, QueryError> {
        let mut tx = self.clone();

        let mut transfer = match tx.transfer_query.take() {
            Some(b) => *b,
            None => TransferQuery::default(),
        };
        check_transfer_back_reference(&mut transfer)?;
        tx.transfer_query = Some(Box::new(transfer));

        if let Some(b) = tx.output_query.take() {
            let mut output = *b;
            check_output_back_reference(&mut output)?;
            tx.output_query = Some(Box::new(output));
        }
        if let Some(b) = tx.input_query.take() {
            let mut input = *b;
            check_output_back_reference(&mut input)?;
            tx.input_query = Some(Box::new(input));
        }

        tx.validate()?;
        Ok(tx)
    }

    /// Reject predicate combinations no endpoint plan can satisfy.
    fn validate(&self) -> Result<(), QueryError> {
        let height_bounded =
            self.height.is_some() || self.min_height.is_some() || self.max_height.is_some();
        if height_bounded
            && (self.in_tx_pool == Some(true)
                || self.is_failed == Some(true)
                || self.is_confirmed == Some(false))
        {
            return Err(QueryError::InvalidQuery(
                "height range cannot apply to unconfirmed transactions".into(),
            ));
        }
        if self.is_confirmed == Some(true) && self.in_tx_pool == Some(true) {
            return Err(QueryError::InvalidQuery(
                "a transaction cannot be both confirmed and in the pool".into(),
            ));
        }
        if self.is_confirmed == Some(true) && self.is_failed == Some(true) {
            return Err(QueryError::InvalidQuery(
                "a transaction cannot be both confirmed and failed".into(),
            ));
        }
        Ok(())
    }

    /// Strip direction flags and nested sub-queries, returning them for
    /// later restoration. The stripped query only decides which transactions
    /// exist; it must not pre-filter them.
    pub(crate) fn decontextualize(&mut self) -> QueryContext {
        QueryContext {
            is_incoming: self.is_incoming.take(),
            is_outgoing: self.is_outgoing.take(),
            transfer_query: self.transfer_query.take(),
            output_query: self.output_query.take(),
            input_query: self.input_query.take(),
        }
    }

    pub(crate) fn recontextualize(&mut self, ctx: QueryContext) {
        self.is_incoming = ctx.is_incoming;
        self.is_outgoing = ctx.is_outgoing;
        self.transfer_query = ctx.transfer_query;
        self.output_query = ctx.output_query;
        self.input_query = ctx.input_query;
    }
}

/// Direction flags and sub-queries saved across the decontextualized fetch.
pub(crate) struct QueryContext {
    pub is_incoming: Option<bool>,
    pub is_outgoing: Option<bool>,
    pub transfer_query: Option<Box<TransferQuery>>,
    pub output_query: Option<Box<OutputQuery>>,
    pub input_query: Option<Box<OutputQuery>>,
}

/// Predicates over individual transfers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransferQuery {
    pub is_incoming: Option<bool>,
    pub amount: Option<u64>,
    pub address: Option<String>,
    pub account_index: Option<u32>,
    pub subaddress_index: Option<u32>,
    pub subaddress_indices: Option<Vec<u32>>,
    pub has_destinations: Option<bool>,
    pub tx_query: Option<Box<TxQuery>>,
}

impl TransferQuery {
    pub fn incoming(mut self, v: bool) -> Self {
        self.is_incoming = Some(v);
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_account(mut self, account_index: u32) -> Self {
        self.account_index = Some(account_index);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_tx_query(mut self, q: TxQuery) -> Self {
        self.tx_query = Some(Box::new(q));
        self
    }

    /// True when no transfer-level predicate is set.
    pub fn is_empty(&self) -> bool {
        let mut stripped = self.clone();
        stripped.tx_query = None;
        stripped == TransferQuery::default()
    }

    /// A transfer query needs full transaction context when its tx-query
    /// constrains direction or co-filters by outputs/inputs; the bulk
    /// transfer listing cannot answer those alone.
    pub fn is_contextual(&self) -> bool {
        match &self.tx_query {
            None => false,
            Some(tx) => {
                tx.is_incoming.is_some()
                    || tx.is_outgoing.is_some()
                    || tx.output_query.is_some()
                    || tx.input_query.is_some()
            }
        }
    }

    /// Canonicalize into the owning tx-query pair.
    pub fn normalized(&self) -> Result<TxQuery, QueryError> {
        let mut transfer = self.clone();
        let mut tx = match transfer.tx_query.take() {
            Some(b) => *b,
            None => TxQuery::default(),
        };
        if let Some(existing) = tx.transfer_query.take() {
            let mut existing = *existing;
            existing.tx_query = None;
            if existing != transfer {
                return Err(circular_reference_error());
            }
        }
        tx.transfer_query = Some(Box::new(transfer));
        tx.validate()?;
        Ok(tx)
    }
}

/// Predicates over individual outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputQuery {
    pub amount: Option<u64>,
    pub min_amount: Option<u64>,
    pub max_amount: Option<u64>,
    pub account_index: Option<u32>,
    pub subaddress_index: Option<u32>,
    pub subaddress_indices: Option<Vec<u32>>,
    pub key_image: Option<String>,
    pub is_spent: Option<bool>,
    pub is_frozen: Option<bool>,
    pub tx_query: Option<Box<TxQuery>>,
}

impl OutputQuery {
    pub fn spent(mut self, v: bool) -> Self {
        self.is_spent = Some(v);
        self
    }

    pub fn with_account(mut self, account_index: u32) -> Self {
        self.account_index = Some(account_index);
        self
    }

    pub fn with_key_image(mut self, key_image: impl Into<String>) -> Self {
        self.key_image = Some(key_image.into());
        self
    }

    pub fn with_tx_query(mut self, q: TxQuery) -> Self {
        self.tx_query = Some(Box::new(q));
        self
    }

    pub fn is_empty(&self) -> bool {
        let mut stripped = self.clone();
        stripped.tx_query = None;
        stripped == OutputQuery::default()
    }

    /// An output query needs full transaction context when its tx-query
    /// co-filters by transfer properties.
    pub fn is_contextual(&self) -> bool {
        self.tx_query
            .as_ref()
            .is_some_and(|tx| tx.transfer_query.is_some())
    }

    /// Canonicalize into the owning tx-query pair, with outputs requested.
    pub fn normalized(&self) -> Result<TxQuery, QueryError> {
        let mut output = self.clone();
        let mut tx = match output.tx_query.take() {
            Some(b) => *b,
            None => TxQuery::default(),
        };
        if let Some(existing) = tx.output_query.take() {
            let mut existing = *existing;
            existing.tx_query = None;
            if existing != output {
                return Err(circular_reference_error());
            }
        }
        tx.output_query = Some(Box::new(output));
        tx.include_outputs = true;
        tx.validate()?;
        Ok(tx)
    }
}

fn circular_reference_error() -> QueryError {
    QueryError::InvalidQuery("circular reference must be null or self".into())
}

/// A sub-query's back-reference must be null or carry a transfer query that
/// is null or a structural copy of the sub-query itself; anything else is a
/// caller error. A back-reference to a *different* tx-query is not an error:
/// the pair is cloned and re-linked to the normalized copy, so the stale
/// reference is dropped. On success the back-reference is cleared, leaving
/// the canonical owning pair.
fn check_transfer_back_reference(transfer: &mut TransferQuery) -> Result<(), QueryError> {
    let Some(back) = transfer.tx_query.take() else {
        return Ok(());
    };
    let mut back = *back;
    if let Some(inner) = back.transfer_query.take() {
        let mut inner = *inner;
        inner.tx_query = None;
        let mut stripped = transfer.clone();
        stripped.tx_query = None;
        if inner != stripped {
            return Err(circular_reference_error());
        }
    }
    Ok(())
}

fn check_output_back_reference(output: &mut OutputQuery) -> Result<(), QueryError> {
    let Some(back) = output.tx_query.take() else {
        return Ok(());
    };
    let mut back = *back;
    if let Some(inner) = back.output_query.take() {
        let mut inner = *inner;
        inner.tx_query = None;
        let mut stripped = output.clone();
        stripped.tx_query = None;
        if inner != stripped {
            return Err(circular_reference_error());
        }
    }
    Ok(())
}
