// Process configuration for the AlgoMint marketplace mirror
//
// Correctness-affecting values (fee rate, fee recipient, data directory) are
// required and abort startup when missing; operational knobs get defaults.

use std::fmt;
use std::path::PathBuf;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3001;

/// Default interval between live subscription polls
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Default timeout for ledger RPC calls
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// ERRORS
// ============================================================================

/// Missing or invalid required configuration. Aborts startup; correctness
/// values are never silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing required configuration: {}", key),
            ConfigError::Invalid(key, raw) => {
                write!(f, "invalid value for {}: {:?}", key, raw)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// Root directory for the sled store and media files
    pub data_dir: PathBuf,
    /// Marketplace fee in basis points (250 = 2.5%)
    pub fee_bps: u32,
    /// Fixed wallet receiving marketplace fees
    pub fee_recipient: String,
    /// Ledger RPC endpoint; None = mock mode (no live ledger)
    pub ledger_rpc_url: Option<String>,
    /// Seconds between live subscription polls
    pub sync_interval_secs: u64,
    /// Bounded timeout for every ledger RPC call
    pub rpc_timeout_secs: u64,
}

impl Config {
    /// Load configuration from the environment (`.env` honored).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let data_dir = std::env::var("MIRROR_DATA_DIR")
            .map(PathBuf::from)
            .map_err(|_| ConfigError::Missing("MIRROR_DATA_DIR"))?;

        let fee_bps_raw = std::env::var("MARKETPLACE_FEE_BPS")
            .map_err(|_| ConfigError::Missing("MARKETPLACE_FEE_BPS"))?;
        let fee_bps: u32 = fee_bps_raw
            .parse()
            .map_err(|_| ConfigError::Invalid("MARKETPLACE_FEE_BPS", fee_bps_raw.clone()))?;
        if fee_bps > 10_000 {
            return Err(ConfigError::Invalid("MARKETPLACE_FEE_BPS", fee_bps_raw));
        }

        let fee_recipient = std::env::var("FEE_RECIPIENT")
            .map_err(|_| ConfigError::Missing("FEE_RECIPIENT"))?;
        if fee_recipient.trim().is_empty() {
            return Err(ConfigError::Invalid("FEE_RECIPIENT", fee_recipient));
        }

        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let sync_interval_secs = match std::env::var("SYNC_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("SYNC_INTERVAL_SECS", raw))?,
            Err(_) => DEFAULT_SYNC_INTERVAL_SECS,
        };

        let rpc_timeout_secs = match std::env::var("LEDGER_RPC_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("LEDGER_RPC_TIMEOUT_SECS", raw))?,
            Err(_) => DEFAULT_RPC_TIMEOUT_SECS,
        };

        Ok(Self {
            port,
            data_dir,
            fee_bps,
            fee_recipient,
            ledger_rpc_url: std::env::var("LEDGER_RPC_URL").ok(),
            sync_interval_secs,
            rpc_timeout_secs,
        })
    }

    /// Fixed configuration for tests: mock ledger, 250 bps fee.
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            port: 0,
            data_dir: data_dir.to_path_buf(),
            fee_bps: 250,
            fee_recipient: "L1FEES0000000001".to_string(),
            ledger_rpc_url: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
        }
    }
}
