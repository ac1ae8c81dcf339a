// ============================================================================
// Event Ingestor - AlgoMint Marketplace Mirror
// ============================================================================
//
// External-facing intake for ledger facts. Two sources feed it:
//
//   - the live subscription loop, polling the ledger head on an interval
//   - on-demand catch-up scans over an explicit block range (API-triggered,
//     typically after downtime)
//
// The ingestor normalizes raw ledger events into typed Facts and feeds the
// reconciler one token-scoped call at a time, preserving source order. It
// deliberately does NOT deduplicate: the reconciler's idempotency ledger is
// the single authority for "already applied", so forwarding the same fact
// any number of times is safe.
//
// ============================================================================

use crate::ledger_client::{LedgerClient, LedgerEvent, LedgerEventPayload, LedgerRpcError};
use crate::models::{now, parse_price, Category, Fact, ValidationError};
use crate::reconciler::{ApplyError, ApplyOutcome, Reconciler};
use crate::store::{MirrorStore, StoreError};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// ERRORS & REPORTS
// ============================================================================

#[derive(Debug, Clone)]
pub enum SyncError {
    Rpc(LedgerRpcError),
    Store(StoreError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Rpc(e) => write!(f, "ledger scan failed: {}", e),
            SyncError::Store(e) => write!(f, "sync cursor update failed: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<LedgerRpcError> for SyncError {
    fn from(e: LedgerRpcError) -> Self {
        SyncError::Rpc(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

/// Outcome tally of one catch-up scan
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub id: String,
    pub from_block: u64,
    pub to_block: u64,
    pub scanned: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub invalid: usize,
    pub errors: Vec<String>,
    pub started_at: u64,
    pub finished_at: u64,
}

/// Current ingest status for the API
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub mock_mode: bool,
    pub syncing: bool,
    pub last_scanned_block: Option<u64>,
    pub last_report: Option<SyncReport>,
}

// ============================================================================
// INGESTOR
// ============================================================================

pub struct EventIngestor {
    reconciler: Arc<Reconciler>,
    client: LedgerClient,
    store: Arc<MirrorStore>,
    syncing: Mutex<bool>,
    last_report: Mutex<Option<SyncReport>>,
}

impl EventIngestor {
    pub fn new(reconciler: Arc<Reconciler>, client: LedgerClient, store: Arc<MirrorStore>) -> Self {
        Self {
            reconciler,
            client,
            store,
            syncing: Mutex::new(false),
            last_report: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    /// Normalize one raw ledger event into the Fact shape.
    pub fn normalize(event: &LedgerEvent) -> Result<Fact, ValidationError> {
        let fact_id = event.tx_hash.clone();
        match &event.payload {
            LedgerEventPayload::Minted {
                token_id,
                creator,
                owner,
                purchasable,
                price,
                metadata_uri,
                name,
                description,
                image,
                category,
                attributes,
            } => {
                let category = Category::parse(category)
                    .ok_or_else(|| ValidationError::InvalidCategory(category.clone()))?;
                let price = match price {
                    Some(raw) => Some(parse_price(raw)?),
                    None => None,
                };
                Ok(Fact::Minted {
                    fact_id,
                    token_id: *token_id,
                    creator: creator.clone(),
                    owner: owner.clone(),
                    purchasable: *purchasable,
                    price,
                    metadata_uri: metadata_uri.clone(),
                    name: name.clone(),
                    description: description.clone(),
                    image: image.clone(),
                    category,
                    attributes: attributes.clone(),
                })
            }
            LedgerEventPayload::Listed { token_id, price, by } => Ok(Fact::Listed {
                fact_id,
                token_id: *token_id,
                price: parse_price(price)?,
                by: by.clone(),
            }),
            LedgerEventPayload::Delisted { token_id, by } => Ok(Fact::Delisted {
                fact_id,
                token_id: *token_id,
                by: by.clone(),
            }),
            LedgerEventPayload::Sold { token_id, buyer, price } => Ok(Fact::Sold {
                fact_id,
                token_id: *token_id,
                buyer: buyer.clone(),
                price: parse_price(price)?,
            }),
        }
    }

    /// Transport passthrough: accept a fact, return success/conflict/duplicate.
    pub async fn submit(
        &self,
        fact: Fact,
        block_number: Option<u64>,
    ) -> Result<ApplyOutcome, ApplyError> {
        self.reconciler.apply(fact, block_number).await
    }

    /// Scan `[from_block, to_block]` and feed every event through the
    /// reconciler, in ledger order.
    pub async fn catch_up(&self, from_block: u64, to_block: u64) -> Result<SyncReport, SyncError> {
        *self.syncing.lock().unwrap() = true;
        let result = self.catch_up_inner(from_block, to_block).await;
        *self.syncing.lock().unwrap() = false;

        if let Ok(report) = &result {
            *self.last_report.lock().unwrap() = Some(report.clone());
        }
        result
    }

    async fn catch_up_inner(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<SyncReport, SyncError> {
        let started_at = now();
        let events = self.client.events_in_range(from_block, to_block).await?;
        info!(from_block, to_block, count = events.len(), "catch-up scan fetched events");

        let mut report = SyncReport {
            id: format!("sync_{}", uuid::Uuid::new_v4().simple()),
            from_block,
            to_block,
            scanned: events.len(),
            applied: 0,
            duplicates: 0,
            rejected: 0,
            invalid: 0,
            errors: Vec::new(),
            started_at,
            finished_at: started_at,
        };

        for event in &events {
            let fact = match Self::normalize(event) {
                Ok(fact) => fact,
                Err(e) => {
                    warn!(tx_hash = %event.tx_hash, error = %e, "skipping malformed ledger event");
                    report.invalid += 1;
                    continue;
                }
            };

            match self.reconciler.apply(fact, Some(event.block_number)).await {
                Ok(ApplyOutcome::Applied(_)) => report.applied += 1,
                Ok(ApplyOutcome::AlreadyApplied(_)) => report.duplicates += 1,
                Ok(ApplyOutcome::Rejected(_)) => report.rejected += 1,
                Err(ApplyError::Validation(e)) => {
                    warn!(tx_hash = %event.tx_hash, error = %e, "ledger event failed validation");
                    report.invalid += 1;
                }
                Err(ApplyError::Store(e)) => {
                    // Retry budget exhausted inside the reconciler; record and
                    // keep scanning, the fact stays unapplied and retry-safe.
                    report.errors.push(format!("{}: {}", event.tx_hash, e));
                }
            }
        }

        // Advance the cursor monotonically, and only when the whole range was
        // processed without store failures.
        if report.errors.is_empty() {
            let cursor = self.store.last_scanned_block()?;
            if cursor.map_or(true, |c| to_block > c) {
                self.store.set_last_scanned_block(to_block)?;
            }
        }

        report.finished_at = now();
        info!(
            id = %report.id,
            applied = report.applied,
            duplicates = report.duplicates,
            rejected = report.rejected,
            invalid = report.invalid,
            "catch-up scan complete"
        );
        Ok(report)
    }

    /// One live-subscription tick: scan forward from the cursor to the chain
    /// head. Returns None when there is nothing new.
    pub async fn poll_once(&self) -> Result<Option<SyncReport>, SyncError> {
        let head = self.client.chain_head().await?;
        let from = match self.store.last_scanned_block()? {
            Some(cursor) if cursor >= head => return Ok(None),
            Some(cursor) => cursor + 1,
            None => 0,
        };
        let report = self.catch_up(from, head).await?;
        Ok(Some(report))
    }

    /// Background subscription loop. Never returns; errors are logged and the
    /// next tick retries.
    pub async fn run_subscription(&self, interval_secs: u64) {
        info!(interval_secs, "live subscription loop started");
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            match self.poll_once().await {
                Ok(Some(report)) => {
                    info!(id = %report.id, applied = report.applied, "subscription tick applied facts");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "subscription tick failed, will retry"),
            }
        }
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            mock_mode: self.client.is_mock_mode(),
            syncing: *self.syncing.lock().unwrap(),
            last_scanned_block: self.store.last_scanned_block().unwrap_or(None),
            last_report: self.last_report.lock().unwrap().clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
