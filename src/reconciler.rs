// ============================================================================
// Reconciler - AlgoMint Marketplace Mirror
// ============================================================================
//
// Applies ledger facts to the mirror exactly once each:
//
//   dedup (idempotency ledger) -> validate (listing state machine)
//     -> atomic persist (token + record + idempotency entry) -> stats update
//
// The serialization unit is the token: every fact for the same token_id runs
// under that token's async mutex, so duplicate delivery, out-of-order arrival
// and concurrent same-token requests all resolve deterministically. Facts for
// distinct tokens proceed fully in parallel.
//
// Transient store failures are retried with bounded exponential backoff.
// Guard rejections are never retried and never consume the fact.
//
// ============================================================================

use crate::models::{now, Fact, TransactionRecord, ValidationError};
use crate::state_machine::{ConflictError, ListingStateMachine};
use crate::stats::StatsAggregator;
use crate::store::{MirrorStore, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt ceiling for the atomic commit on transient store errors
pub const MAX_STORE_RETRIES: u32 = 3;

/// Base delay for the exponential retry backoff
pub const RETRY_BASE_DELAY_MS: u64 = 100;

// ============================================================================
// OUTCOMES & ERRORS
// ============================================================================

/// Result of presenting one fact to the mirror
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Fact applied for the first time
    Applied(TransactionRecord),
    /// Fact was already applied; this is the stored prior result
    AlreadyApplied(TransactionRecord),
    /// Fact is invalid against current state; nothing was consumed
    Rejected(ConflictError),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ApplyOutcome::Rejected(_))
    }

    pub fn record(&self) -> Option<&TransactionRecord> {
        match self {
            ApplyOutcome::Applied(r) | ApplyOutcome::AlreadyApplied(r) => Some(r),
            ApplyOutcome::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ApplyError {
    /// Malformed fact; rejected before touching token state
    Validation(ValidationError),
    /// Store failure surviving the retry budget
    Store(StoreError),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::Validation(e) => write!(f, "validation failed: {}", e),
            ApplyError::Store(e) => write!(f, "store failure: {}", e),
        }
    }
}

impl std::error::Error for ApplyError {}

impl From<ValidationError> for ApplyError {
    fn from(e: ValidationError) -> Self {
        ApplyError::Validation(e)
    }
}

impl From<StoreError> for ApplyError {
    fn from(e: StoreError) -> Self {
        ApplyError::Store(e)
    }
}

// ============================================================================
// PER-TOKEN CRITICAL SECTIONS
// ============================================================================

/// Registry of per-token async mutexes. The registry map itself is only held
/// long enough to clone the Arc; the token lock is held across the whole
/// dedup/validate/commit sequence.
#[derive(Debug, Default)]
struct TokenLocks {
    inner: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenLocks {
    fn for_token(&self, token_id: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(token_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    store: Arc<MirrorStore>,
    machine: ListingStateMachine,
    stats: Arc<StatsAggregator>,
    locks: TokenLocks,
    /// Advisory rejection log: repeat counts per failing fact_id, so retry
    /// storms on the same invalid fact are visible. Not idempotency-relevant.
    rejections: Mutex<HashMap<String, u32>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<MirrorStore>,
        machine: ListingStateMachine,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            store,
            machine,
            stats,
            locks: TokenLocks::default(),
            rejections: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<MirrorStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Apply one ledger fact to the mirror.
    ///
    /// Safe to call any number of times with the same fact: the first call
    /// applies it, every later call returns `AlreadyApplied` with the stored
    /// result and performs no re-execution.
    pub async fn apply(
        &self,
        fact: Fact,
        block_number: Option<u64>,
    ) -> Result<ApplyOutcome, ApplyError> {
        fact.validate()?;

        let token_id = fact.token_id();
        let lock = self.locks.for_token(token_id);
        let _guard = lock.lock().await;

        // Dedup before anything else. The idempotency entry is written in the
        // same transaction as the effect, so a hit here always has a result.
        if let Some(prior) = self.store.prior_result(fact.fact_id())? {
            debug!(fact_id = %fact.fact_id(), token_id, "duplicate fact, returning prior result");
            return Ok(ApplyOutcome::AlreadyApplied(prior));
        }

        let current = self.store.token(token_id)?;
        let transition = match self.machine.transition(current.as_ref(), &fact, now()) {
            Ok(t) => t,
            Err(conflict) => {
                let repeats = self.note_rejection(fact.fact_id());
                if repeats > 1 {
                    warn!(
                        fact_id = %fact.fact_id(),
                        token_id,
                        repeats,
                        %conflict,
                        "invalid fact resubmitted"
                    );
                } else {
                    info!(fact_id = %fact.fact_id(), token_id, %conflict, "fact rejected");
                }
                return Ok(ApplyOutcome::Rejected(conflict));
            }
        };

        // User rows are create-on-first-reference and hazard-free; they stay
        // outside the atomic commit.
        self.ensure_counterparties(&fact)?;

        let record = transition.record(fact.fact_id(), now(), block_number);
        self.commit_with_retries(&transition.token, &record).await?;
        self.stats.record_applied(&record, transition.listed_delta);

        if let Some(sale) = &transition.sale {
            info!(
                token_id,
                seller = %sale.seller,
                proceeds = %sale.proceeds,
                fee = %sale.fee,
                fee_recipient = %sale.fee_recipient,
                "payout instruction recorded"
            );
        }
        info!(
            fact_id = %record.fact_id,
            token_id,
            kind = %record.kind,
            "fact applied"
        );

        Ok(ApplyOutcome::Applied(record))
    }

    /// How often a failing fact_id has been rejected so far
    pub fn rejection_count(&self, fact_id: &str) -> u32 {
        self.rejections
            .lock()
            .unwrap()
            .get(fact_id)
            .copied()
            .unwrap_or(0)
    }

    fn note_rejection(&self, fact_id: &str) -> u32 {
        let mut log = self.rejections.lock().unwrap();
        let count = log.entry(fact_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn ensure_counterparties(&self, fact: &Fact) -> Result<(), StoreError> {
        let ts = now();
        match fact {
            Fact::Minted { creator, owner, .. } => {
                self.store.ensure_user(creator, ts)?;
                if owner != creator {
                    self.store.ensure_user(owner, ts)?;
                }
            }
            Fact::Listed { by, .. } | Fact::Delisted { by, .. } => {
                self.store.ensure_user(by, ts)?;
            }
            Fact::Sold { buyer, .. } => {
                self.store.ensure_user(buyer, ts)?;
            }
        }
        Ok(())
    }

    async fn commit_with_retries(
        &self,
        token: &crate::models::Token,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        let mut attempt: u32 = 0;
        loop {
            match self.store.commit_applied(token, record) {
                Ok(()) => return Ok(()),
                Err(StoreError::Transient(msg)) if attempt + 1 < MAX_STORE_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY_MS << attempt;
                    warn!(
                        fact_id = %record.fact_id,
                        attempt,
                        delay_ms = delay,
                        error = %msg,
                        "transient store error, retrying commit"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
