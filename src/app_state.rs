// Application context for the AlgoMint marketplace mirror
//
// All components are built once here and injected explicitly; there are no
// module-level singletons. Tests construct the same context over a temp
// directory with a scripted mock ledger.

use crate::config::Config;
use crate::fees::FeeCalculator;
use crate::ingest::EventIngestor;
use crate::ledger_client::LedgerClient;
use crate::media::ContentStore;
use crate::models::now;
use crate::query::QueryService;
use crate::reconciler::Reconciler;
use crate::state_machine::ListingStateMachine;
use crate::stats::StatsAggregator;
use crate::store::MirrorStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub store: Arc<MirrorStore>,
    pub stats: Arc<StatsAggregator>,
    pub reconciler: Arc<Reconciler>,
    pub ingestor: Arc<EventIngestor>,
    pub query: QueryService,
    pub media: ContentStore,
    pub started_at: u64,
}

impl AppState {
    /// Build the full component graph from configuration.
    pub fn initialize(config: Config) -> Result<SharedState, String> {
        let client = LedgerClient::new(
            config.ledger_rpc_url.clone(),
            Duration::from_secs(config.rpc_timeout_secs),
        );
        Self::initialize_with_client(config, client)
    }

    /// Same as `initialize`, with an injected ledger client (tests script the
    /// mock event log this way).
    pub fn initialize_with_client(
        config: Config,
        client: LedgerClient,
    ) -> Result<SharedState, String> {
        let store = Arc::new(
            MirrorStore::open(&config.data_dir.join("mirror"))
                .map_err(|e| format!("failed to open mirror store: {}", e))?,
        );
        let media = ContentStore::open(&config.data_dir.join("media"))
            .map_err(|e| format!("failed to open media store: {}", e))?;

        // Aggregates are derived state; rebuild them from the persisted
        // mirror so a restart cannot drift from the records.
        let stats = Arc::new(StatsAggregator::new());
        stats
            .recompute(&store)
            .map_err(|e| format!("failed to rebuild aggregates: {}", e))?;

        let machine = ListingStateMachine::new(
            FeeCalculator::new(config.fee_bps),
            &config.fee_recipient,
        );
        let reconciler = Arc::new(Reconciler::new(store.clone(), machine, stats.clone()));

        client.log_status();
        let ingestor = Arc::new(EventIngestor::new(
            reconciler.clone(),
            client,
            store.clone(),
        ));

        let query = QueryService::new(store.clone());

        info!(
            tokens = store.token_count(),
            fee_bps = config.fee_bps,
            "mirror initialized"
        );

        Ok(Arc::new(Self {
            config,
            store,
            stats,
            reconciler,
            ingestor,
            query,
            media,
            started_at: now(),
        }))
    }
}
