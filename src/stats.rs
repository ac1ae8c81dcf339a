// ============================================================================
// Marketplace Statistics - AlgoMint Marketplace Mirror
// ============================================================================
//
// Derived aggregates over applied facts. Never a source of truth: everything
// here is rebuildable from the transaction records and current token states,
// and `recompute` does exactly that. The incremental path is O(1) per applied
// fact; both paths satisfy the same output contract.
//
// Standing invariant, checkable at any time:
//   total_volume == sum(price) over confirmed sale records
//   total_listed == count of tokens currently Listed
//
// ============================================================================

use crate::models::{ListingState, TransactionRecord, TxKind, TxStatus};
use crate::store::{MirrorStore, StoreError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock;

/// How many recent sales the snapshot carries
pub const RECENT_SALES_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaleSummary {
    pub fact_id: String,
    pub token_id: u64,
    pub seller: String,
    pub buyer: String,
    pub price: u128,
    pub fee: u128,
    pub applied_at: u64,
}

impl SaleSummary {
    fn from_record(record: &TransactionRecord) -> Self {
        Self {
            fact_id: record.fact_id.clone(),
            token_id: record.token_id,
            seller: record.from.clone(),
            buyer: record.to.clone().unwrap_or_default(),
            price: record.price.unwrap_or(0),
            fee: record.fee.unwrap_or(0),
            applied_at: record.applied_at,
        }
    }
}

/// Point-in-time view of marketplace-wide aggregates
#[derive(Debug, Clone, Serialize)]
pub struct AggregateStats {
    pub total_listed: u64,
    pub total_volume: u128,
    /// Newest first, bounded by RECENT_SALES_LIMIT
    pub recent_sales: Vec<SaleSummary>,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_listed: i64,
    total_volume: u128,
    recent_sales: VecDeque<SaleSummary>,
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: RwLock<StatsInner>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremental update for one newly applied record. `listed_delta` comes
    /// from the state machine transition (-1, 0 or +1).
    pub fn record_applied(&self, record: &TransactionRecord, listed_delta: i64) {
        let mut inner = self.inner.write().unwrap();
        inner.total_listed += listed_delta;

        if record.kind == TxKind::Sale && record.status == TxStatus::Confirmed {
            inner.total_volume += record.price.unwrap_or(0);
            inner.recent_sales.push_front(SaleSummary::from_record(record));
            inner.recent_sales.truncate(RECENT_SALES_LIMIT);
        }
    }

    pub fn snapshot(&self) -> AggregateStats {
        let inner = self.inner.read().unwrap();
        AggregateStats {
            total_listed: inner.total_listed.max(0) as u64,
            total_volume: inner.total_volume,
            recent_sales: inner.recent_sales.iter().cloned().collect(),
        }
    }

    /// Full rebuild from the store. Idempotent: with no new facts, running it
    /// twice yields identical output.
    pub fn recompute(&self, store: &MirrorStore) -> Result<AggregateStats, StoreError> {
        let (total_listed, total_volume, recent_sales) = compute_from_store(store)?;

        let mut inner = self.inner.write().unwrap();
        inner.total_listed = total_listed as i64;
        inner.total_volume = total_volume;
        inner.recent_sales = recent_sales.iter().cloned().collect();

        Ok(AggregateStats {
            total_listed,
            total_volume,
            recent_sales,
        })
    }

    /// Check the standing invariant against the store without mutating the
    /// incremental counters.
    pub fn invariants_hold(&self, store: &MirrorStore) -> Result<bool, StoreError> {
        let (total_listed, total_volume, _) = compute_from_store(store)?;
        let snapshot = self.snapshot();
        Ok(snapshot.total_listed == total_listed && snapshot.total_volume == total_volume)
    }
}

fn compute_from_store(
    store: &MirrorStore,
) -> Result<(u64, u128, Vec<SaleSummary>), StoreError> {
    let total_listed = store
        .all_tokens()?
        .iter()
        .filter(|t| t.listing_state == ListingState::Listed)
        .count() as u64;

    let sales = store.confirmed_sales()?;
    let total_volume = sales.iter().map(|r| r.price.unwrap_or(0)).sum();

    // all_records is oldest-first; newest first here
    let recent_sales = sales
        .iter()
        .rev()
        .take(RECENT_SALES_LIMIT)
        .map(SaleSummary::from_record)
        .collect();

    Ok((total_listed, total_volume, recent_sales))
}

// ============================================================================
// TESTS
// ============================================================================
