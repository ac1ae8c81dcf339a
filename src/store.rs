// ============================================================================
// Mirror Store - AlgoMint Marketplace Mirror
// ============================================================================
//
// Durable off-chain replica of ledger-derived state, backed by sled with
// bincode-encoded values. Trees:
//
//   tokens        token_id (big-endian u64)  -> Token
//   transactions  fact_id                    -> TransactionRecord
//   idempotency   fact_id                    -> TransactionRecord (prior result)
//   users         wallet_address             -> User
//   meta          cursor keys                -> raw bytes
//
// `commit_applied` is the single write path for fact effects: token mutation,
// transaction record and idempotency entry land in one sled transaction, so a
// fact can never be marked consumed without its effect durably applied, and
// vice versa.
//
// ============================================================================

use crate::models::{Token, TransactionRecord, TxKind, TxStatus, User};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::fmt;
use std::path::Path;

const LAST_SCANNED_BLOCK_KEY: &[u8] = b"last_scanned_block";

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone)]
pub enum StoreError {
    /// I/O-level failure; safe to retry with backoff
    Transient(String),
    /// Value failed to encode/decode; not retryable
    Encoding(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Transient(msg) => write!(f, "transient store error: {}", msg),
            StoreError::Encoding(msg) => write!(f, "store encoding error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Transient(e.to_string())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
}

// ============================================================================
// MIRROR STORE
// ============================================================================

pub struct MirrorStore {
    db: sled::Db,
    tokens: sled::Tree,
    transactions: sled::Tree,
    idempotency: sled::Tree,
    users: sled::Tree,
    meta: sled::Tree,
}

impl MirrorStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            tokens: db.open_tree("tokens")?,
            transactions: db.open_tree("transactions")?,
            idempotency: db.open_tree("idempotency")?,
            users: db.open_tree("users")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    fn token_key(token_id: u64) -> [u8; 8] {
        token_id.to_be_bytes()
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    pub fn token(&self, token_id: u64) -> Result<Option<Token>, StoreError> {
        match self.tokens.get(Self::token_key(token_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Full token scan, ascending by token_id
    pub fn all_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let mut out = Vec::with_capacity(self.tokens.len());
        for item in self.tokens.iter() {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    // ========================================================================
    // TRANSACTION RECORDS & IDEMPOTENCY
    // ========================================================================

    pub fn record(&self, fact_id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        match self.transactions.get(fact_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// "Have I applied this fact already, and if so what was the result."
    /// O(1) lookup keyed by fact_id.
    pub fn prior_result(&self, fact_id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        match self.idempotency.get(fact_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All applied records, oldest first (applied_at, then fact_id for a
    /// stable order within one second).
    pub fn all_records(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut out = Vec::with_capacity(self.transactions.len());
        for item in self.transactions.iter() {
            let (_, bytes) = item?;
            out.push(decode::<TransactionRecord>(&bytes)?);
        }
        out.sort_by(|a, b| {
            a.applied_at
                .cmp(&b.applied_at)
                .then_with(|| a.fact_id.cmp(&b.fact_id))
        });
        Ok(out)
    }

    /// Logical secondary index: records touching one token, oldest first
    pub fn records_for_token(&self, token_id: u64) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut out = self.all_records()?;
        out.retain(|r| r.token_id == token_id);
        Ok(out)
    }

    pub fn confirmed_sales(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut out = self.all_records()?;
        out.retain(|r| r.kind == TxKind::Sale && r.status == TxStatus::Confirmed);
        Ok(out)
    }

    /// Atomically persist the effect of one applied fact: new token state,
    /// the append-only transaction record, and the idempotency entry.
    /// All three or none.
    pub fn commit_applied(
        &self,
        token: &Token,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        let token_key = Self::token_key(token.token_id).to_vec();
        let fact_key = record.fact_id.as_bytes().to_vec();
        let token_bytes = encode(token)?;
        let record_bytes = encode(record)?;

        (&self.tokens, &self.transactions, &self.idempotency)
            .transaction(
                |(tokens, transactions, idempotency)| -> ConflictableTransactionResult<(), ()> {
                    tokens.insert(token_key.clone(), token_bytes.clone())?;
                    transactions.insert(fact_key.clone(), record_bytes.clone())?;
                    idempotency.insert(fact_key.clone(), record_bytes.clone())?;
                    Ok(())
                },
            )
            .map_err(|e| match e {
                TransactionError::Abort(()) => {
                    StoreError::Transient("store transaction aborted".to_string())
                }
                TransactionError::Storage(err) => StoreError::Transient(err.to_string()),
            })?;
        Ok(())
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub fn user(&self, wallet_address: &str) -> Result<Option<User>, StoreError> {
        match self.users.get(wallet_address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.users
            .insert(user.wallet_address.as_bytes(), encode(user)?)?;
        Ok(())
    }

    /// Create-on-first-reference. Returns the stored record either way.
    pub fn ensure_user(&self, wallet_address: &str, now: u64) -> Result<User, StoreError> {
        if let Some(user) = self.user(wallet_address)? {
            return Ok(user);
        }
        let user = User::new(wallet_address, now);
        self.put_user(&user)?;
        Ok(user)
    }

    // ========================================================================
    // SYNC CURSOR
    // ========================================================================

    pub fn last_scanned_block(&self) -> Result<Option<u64>, StoreError> {
        match self.meta.get(LAST_SCANNED_BLOCK_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Encoding("bad sync cursor".to_string()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub fn set_last_scanned_block(&self, block: u64) -> Result<(), StoreError> {
        self.meta
            .insert(LAST_SCANNED_BLOCK_KEY, block.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// Flush dirty pages to disk (shutdown path)
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
