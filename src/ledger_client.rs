// AlgoMint Mirror - Ledger RPC Client
//
// HTTP client for the marketplace ledger collaborator. Supports mock mode for
// local development and tests without a live ledger connection; mock mode can
// carry a scripted event log so catch-up scans stay exercisable offline.
// Every call carries a bounded timeout: on timeout the caller treats the
// facts as not-yet-applied and retries, which idempotency makes free.

use crate::models::TokenAttribute;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub enum LedgerRpcError {
    /// Mock mode, or the endpoint is unreachable
    NotConnected,
    RequestFailed(String),
    InvalidResponse(String),
    Timeout,
}

impl fmt::Display for LedgerRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerRpcError::NotConnected => write!(f, "ledger RPC not connected"),
            LedgerRpcError::RequestFailed(msg) => write!(f, "ledger request failed: {}", msg),
            LedgerRpcError::InvalidResponse(msg) => write!(f, "invalid ledger response: {}", msg),
            LedgerRpcError::Timeout => write!(f, "ledger RPC timeout"),
        }
    }
}

impl std::error::Error for LedgerRpcError {}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Raw event exactly as the ledger reports it. Amounts are decimal strings in
/// base units; the ingestor parses them during normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Ledger transaction hash; becomes the fact_id
    pub tx_hash: String,
    pub block_number: u64,
    pub payload: LedgerEventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LedgerEventPayload {
    Minted {
        token_id: u64,
        creator: String,
        owner: String,
        purchasable: bool,
        price: Option<String>,
        metadata_uri: String,
        name: String,
        description: String,
        image: String,
        category: String,
        #[serde(default)]
        attributes: Vec<TokenAttribute>,
    },
    Listed {
        token_id: u64,
        price: String,
        by: String,
    },
    Delisted {
        token_id: u64,
        by: String,
    },
    Sold {
        token_id: u64,
        buyer: String,
        price: String,
    },
}

#[derive(Debug, Deserialize)]
struct HeadResponse {
    block_number: u64,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<LedgerEvent>,
}

// ============================================================================
// LEDGER CLIENT
// ============================================================================

pub struct LedgerClient {
    endpoint_url: Option<String>,
    client: Client,
    /// Scripted event log served in mock mode
    mock_events: Vec<LedgerEvent>,
}

impl LedgerClient {
    /// `endpoint_url = None` selects mock mode.
    pub fn new(endpoint_url: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            endpoint_url,
            client,
            mock_events: Vec::new(),
        }
    }

    /// Mock client serving a fixed event log (tests and offline development)
    pub fn mock_with_events(mock_events: Vec<LedgerEvent>) -> Self {
        Self {
            endpoint_url: None,
            client: Client::new(),
            mock_events,
        }
    }

    pub fn is_mock_mode(&self) -> bool {
        self.endpoint_url.is_none()
    }

    pub fn is_connected(&self) -> bool {
        !self.is_mock_mode()
    }

    /// Log connection status (call on startup)
    pub fn log_status(&self) {
        match &self.endpoint_url {
            Some(url) => info!(endpoint = %url, "ledger RPC connected"),
            None => warn!("ledger RPC in mock mode (LEDGER_RPC_URL not set)"),
        }
    }

    /// Latest block the ledger has confirmed
    pub async fn chain_head(&self) -> Result<u64, LedgerRpcError> {
        let url = match &self.endpoint_url {
            Some(base) => format!("{}/rpc/head", base),
            None => {
                // Mock head = last scripted block
                return Ok(self
                    .mock_events
                    .iter()
                    .map(|e| e.block_number)
                    .max()
                    .unwrap_or(0));
            }
        };

        let resp = self.client.get(&url).send().await.map_err(map_reqwest)?;
        let head: HeadResponse = resp
            .json()
            .await
            .map_err(|e| LedgerRpcError::InvalidResponse(e.to_string()))?;
        Ok(head.block_number)
    }

    /// All marketplace events in `[from_block, to_block]`, in ledger order
    pub async fn events_in_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerRpcError> {
        let url = match &self.endpoint_url {
            Some(base) => format!(
                "{}/rpc/events?from_block={}&to_block={}",
                base, from_block, to_block
            ),
            None => {
                return Ok(self
                    .mock_events
                    .iter()
                    .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
                    .cloned()
                    .collect());
            }
        };

        let resp = self.client.get(&url).send().await.map_err(map_reqwest)?;
        let body: EventsResponse = resp
            .json()
            .await
            .map_err(|e| LedgerRpcError::InvalidResponse(e.to_string()))?;
        Ok(body.events)
    }
}

fn map_reqwest(e: reqwest::Error) -> LedgerRpcError {
    if e.is_timeout() {
        LedgerRpcError::Timeout
    } else if e.is_connect() {
        LedgerRpcError::NotConnected
    } else {
        LedgerRpcError::RequestFailed(e.to_string())
    }
}
