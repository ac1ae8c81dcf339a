/// AlgoMint Marketplace Mirror
/// Exports all modules for use as a library crate

pub mod app_state;
pub mod config;
pub mod fees;
pub mod handlers;
pub mod ingest;
pub mod ledger_client;
pub mod media;
pub mod models;
pub mod query;
pub mod reconciler;
pub mod state_machine;
pub mod stats;
pub mod store;

// Re-export the core surface
pub use app_state::{AppState, SharedState};
pub use config::{Config, ConfigError};
pub use fees::{FeeBreakdown, FeeCalculator};
pub use ingest::{EventIngestor, SyncError, SyncReport, SyncStatus};
pub use ledger_client::{LedgerClient, LedgerEvent, LedgerEventPayload, LedgerRpcError};
pub use media::{ContentStore, MediaError};
pub use models::{
    Category, Fact, ListingState, Token, TokenAttribute, TransactionRecord, TxKind, TxStatus,
    User, ValidationError,
};
pub use query::{ListingQuery, ListingQueryParams, Page, QueryService, TokenQuery};
pub use reconciler::{ApplyError, ApplyOutcome, Reconciler};
pub use state_machine::{ConflictError, ListingStateMachine, SaleEffects, Transition};
pub use stats::{AggregateStats, SaleSummary, StatsAggregator};
pub use store::{MirrorStore, StoreError};
