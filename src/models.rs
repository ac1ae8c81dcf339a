// Data models for the AlgoMint marketplace mirror

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TOKEN
// ============================================================================

/// Marketplace category a token is filed under
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Art,
    Music,
    Collectible,
}

impl Category {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "art" => Some(Category::Art),
            "music" => Some(Category::Music),
            "collectible" => Some(Category::Collectible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Art => "art",
            Category::Music => "music",
            Category::Collectible => "collectible",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Listing status of a token. `Sold` is a transition, not a state: a sale
/// moves the token back to `Unlisted` under the new owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ListingState {
    Unlisted,
    Listed,
}

impl Default for ListingState {
    fn default() -> Self {
        ListingState::Unlisted
    }
}

impl fmt::Display for ListingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingState::Unlisted => write!(f, "unlisted"),
            ListingState::Listed => write!(f, "listed"),
        }
    }
}

/// Free-form trait attached to a token at mint time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenAttribute {
    pub trait_type: String,
    pub value: String,
}

/// One mintable/sellable unit mirrored from the ledger.
///
/// Prices are integer base units (the ledger's fixed-point representation).
/// Invariant: `listing_state == Listed` implies `purchasable && price.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Ledger-assigned identifier, unique across the marketplace
    pub token_id: u64,
    /// Wallet that minted the token (never changes)
    pub creator: String,
    /// Current owner wallet; changes only through a successful sale
    pub owner: String,
    pub name: String,
    pub description: String,
    /// Content address of the token media
    pub image: String,
    pub metadata_uri: String,
    pub category: Category,
    /// Fixed at mint time; a non-purchasable token can never be listed
    pub purchasable: bool,
    /// Present only while listed
    pub price: Option<u128>,
    pub listing_state: ListingState,
    #[serde(default)]
    pub attributes: Vec<TokenAttribute>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Token {
    pub fn is_listed(&self) -> bool {
        self.listing_state == ListingState::Listed
    }
}

// ============================================================================
// FACTS
// ============================================================================

/// An immutable, uniquely identified event originating from the ledger.
///
/// `fact_id` is the ledger transaction identifier: an opaque string used
/// purely as the idempotency key, never parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fact {
    Minted {
        fact_id: String,
        token_id: u64,
        creator: String,
        owner: String,
        purchasable: bool,
        price: Option<u128>,
        metadata_uri: String,
        name: String,
        description: String,
        image: String,
        category: Category,
        #[serde(default)]
        attributes: Vec<TokenAttribute>,
    },
    Listed {
        fact_id: String,
        token_id: u64,
        price: u128,
        by: String,
    },
    Delisted {
        fact_id: String,
        token_id: u64,
        by: String,
    },
    Sold {
        fact_id: String,
        token_id: u64,
        buyer: String,
        price: u128,
    },
}

impl Fact {
    pub fn fact_id(&self) -> &str {
        match self {
            Fact::Minted { fact_id, .. }
            | Fact::Listed { fact_id, .. }
            | Fact::Delisted { fact_id, .. }
            | Fact::Sold { fact_id, .. } => fact_id,
        }
    }

    pub fn token_id(&self) -> u64 {
        match self {
            Fact::Minted { token_id, .. }
            | Fact::Listed { token_id, .. }
            | Fact::Delisted { token_id, .. }
            | Fact::Sold { token_id, .. } => *token_id,
        }
    }

    pub fn kind(&self) -> TxKind {
        match self {
            Fact::Minted { .. } => TxKind::Mint,
            Fact::Listed { .. } => TxKind::List,
            Fact::Delisted { .. } => TxKind::Delist,
            Fact::Sold { .. } => TxKind::Sale,
        }
    }

    /// Shape-level validation, independent of mirror state.
    /// State-dependent guards live in the listing state machine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.fact_id().trim().is_empty() {
            return Err(ValidationError::EmptyFactId);
        }
        match self {
            Fact::Minted { metadata_uri, creator, owner, price, .. } => {
                if metadata_uri.trim().is_empty() {
                    return Err(ValidationError::EmptyMetadataUri);
                }
                if creator.trim().is_empty() || owner.trim().is_empty() {
                    return Err(ValidationError::EmptyWallet);
                }
                if *price == Some(0) {
                    return Err(ValidationError::ZeroPrice);
                }
            }
            Fact::Listed { price, by, .. } => {
                if by.trim().is_empty() {
                    return Err(ValidationError::EmptyWallet);
                }
                if *price == 0 {
                    return Err(ValidationError::ZeroPrice);
                }
            }
            Fact::Delisted { by, .. } => {
                if by.trim().is_empty() {
                    return Err(ValidationError::EmptyWallet);
                }
            }
            Fact::Sold { buyer, price, .. } => {
                if buyer.trim().is_empty() {
                    return Err(ValidationError::EmptyWallet);
                }
                if *price == 0 {
                    return Err(ValidationError::ZeroPrice);
                }
            }
        }
        Ok(())
    }
}

/// Malformed fact or request input. Rejected immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyFactId,
    EmptyMetadataUri,
    EmptyWallet,
    ZeroPrice,
    InvalidPrice(String),
    InvalidCategory(String),
    InvalidQuery(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyFactId => write!(f, "fact_id must not be empty"),
            ValidationError::EmptyMetadataUri => write!(f, "metadata_uri must not be empty"),
            ValidationError::EmptyWallet => write!(f, "wallet address must not be empty"),
            ValidationError::ZeroPrice => write!(f, "price must be greater than zero"),
            ValidationError::InvalidPrice(raw) => write!(f, "invalid price: {}", raw),
            ValidationError::InvalidCategory(raw) => write!(f, "invalid category: {}", raw),
            ValidationError::InvalidQuery(msg) => write!(f, "invalid query: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Parse an integer base-unit price from its decimal string form.
/// Ledger amounts travel as strings so they survive JSON number limits.
pub fn parse_price(raw: &str) -> Result<u128, ValidationError> {
    raw.trim()
        .parse::<u128>()
        .map_err(|_| ValidationError::InvalidPrice(raw.to_string()))
}

// ============================================================================
// TRANSACTION RECORDS
// ============================================================================

/// Kind of applied fact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Mint,
    List,
    Delist,
    Sale,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::Mint => write!(f, "mint"),
            TxKind::List => write!(f, "list"),
            TxKind::Delist => write!(f, "delist"),
            TxKind::Sale => write!(f, "sale"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Rejected,
}

/// One row per applied fact. Created exclusively by the reconciler and never
/// mutated afterwards; `fact_id` uniqueness is the de-duplication invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub fact_id: String,
    pub token_id: u64,
    pub kind: TxKind,
    /// Initiating wallet (minter, lister, or seller)
    pub from: String,
    /// Receiving wallet where one exists (buyer on sales)
    pub to: Option<String>,
    pub price: Option<u128>,
    pub fee: Option<u128>,
    pub status: TxStatus,
    pub applied_at: u64,
    #[serde(default)]
    pub block_number: Option<u64>,
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SocialLinks {
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Keyed profile record. Created lazily on first reference from any fact or
/// API call; carries no concurrency hazard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub wallet_address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub social_links: SocialLinks,
    pub created_at: u64,
    pub updated_at: u64,
}

impl User {
    pub fn new(wallet_address: &str, now: u64) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            username: None,
            email: None,
            bio: None,
            avatar: None,
            social_links: SocialLinks::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Seconds since the Unix epoch
pub fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
