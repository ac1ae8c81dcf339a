// HTTP request handlers for the AlgoMint mirror API
//
// The transport layer is a thin capability: accept a fact, return
// success/conflict/duplicate; everything money-shaped travels as decimal
// strings so responses survive JSON number limits.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::SharedState;
use crate::ingest::EventIngestor;
use crate::ledger_client::LedgerEvent;
use crate::media::MediaError;
use crate::models::{
    parse_price, Category, Fact, SocialLinks, Token, TokenAttribute, TransactionRecord,
};
use crate::query::{
    page_bounds, ListingQuery, ListingQueryParams, Page, TokenQuery, TokenQueryParams,
};
use crate::reconciler::{ApplyError, ApplyOutcome};
use crate::stats::AggregateStats;
use crate::store::StoreError;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

// ===== RESPONSE HELPERS =====

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "success": false, "error": message })),
    )
}

fn store_error(e: &StoreError) -> (StatusCode, Json<Value>) {
    error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string())
}

fn token_view(t: &Token) -> Value {
    json!({
        "token_id": t.token_id,
        "creator": t.creator,
        "owner": t.owner,
        "name": t.name,
        "description": t.description,
        "image": t.image,
        "metadata_uri": t.metadata_uri,
        "category": t.category.as_str(),
        "purchasable": t.purchasable,
        "price": t.price.map(|p| p.to_string()),
        "listing_state": t.listing_state.to_string(),
        "attributes": t.attributes,
        "created_at": t.created_at,
        "updated_at": t.updated_at,
    })
}

fn record_view(r: &TransactionRecord) -> Value {
    json!({
        "fact_id": r.fact_id,
        "token_id": r.token_id,
        "kind": r.kind.to_string(),
        "from": r.from,
        "to": r.to,
        "price": r.price.map(|p| p.to_string()),
        "fee": r.fee.map(|f| f.to_string()),
        "status": match r.status {
            crate::models::TxStatus::Confirmed => "confirmed",
            crate::models::TxStatus::Rejected => "rejected",
        },
        "applied_at": r.applied_at,
        "block_number": r.block_number,
    })
}

fn page_view(page: &Page<Token>) -> Value {
    json!({
        "items": page.items.iter().map(token_view).collect::<Vec<_>>(),
        "page": page.page,
        "limit": page.limit,
        "total": page.total,
        "pages": page.pages,
    })
}

fn stats_view(stats: &AggregateStats) -> Value {
    json!({
        "total_listed": stats.total_listed,
        "total_volume": stats.total_volume.to_string(),
        "recent_sales": stats.recent_sales.iter().map(|s| json!({
            "fact_id": s.fact_id,
            "token_id": s.token_id,
            "seller": s.seller,
            "buyer": s.buyer,
            "price": s.price.to_string(),
            "fee": s.fee.to_string(),
            "applied_at": s.applied_at,
        })).collect::<Vec<_>>(),
    })
}

fn outcome_response(outcome: ApplyOutcome) -> ApiResult {
    match outcome {
        ApplyOutcome::Applied(record) => Ok(Json(json!({
            "success": true,
            "status": "applied",
            "data": record_view(&record),
        }))),
        ApplyOutcome::AlreadyApplied(record) => Ok(Json(json!({
            "success": true,
            "status": "duplicate",
            "duplicate": true,
            "data": record_view(&record),
        }))),
        ApplyOutcome::Rejected(conflict) => Err((
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "status": "rejected",
                "code": conflict.code(),
                "error": conflict.to_string(),
            })),
        )),
    }
}

fn apply_error_response(e: ApplyError) -> (StatusCode, Json<Value>) {
    match e {
        ApplyError::Validation(v) => error_response(StatusCode::BAD_REQUEST, &v.to_string()),
        ApplyError::Store(s) => store_error(&s),
    }
}

// ===== REQUEST TYPES =====

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub fact_id: String,
    pub token_id: u64,
    pub creator: String,
    /// Defaults to the creator
    #[serde(default)]
    pub owner: Option<String>,
    pub name: String,
    pub description: String,
    /// Content address from POST /media
    pub image: String,
    /// Optional: when absent, metadata is content-addressed server side
    #[serde(default)]
    pub metadata_uri: Option<String>,
    pub category: String,
    pub purchasable: bool,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub attributes: Vec<TokenAttribute>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListRequest {
    pub fact_id: String,
    pub price: String,
    pub wallet_address: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DelistRequest {
    pub fact_id: String,
    pub wallet_address: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub fact_id: String,
    pub buyer: String,
    pub price: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub from_block: Option<u64>,
    #[serde(default)]
    pub to_block: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub social_links: Option<SocialLinks>,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

// ===== FACT INTAKE ENDPOINTS =====

/// POST /facts - generic intake in the ledger's own event shape
pub async fn submit_fact(
    State(state): State<SharedState>,
    Json(event): Json<LedgerEvent>,
) -> ApiResult {
    let fact = EventIngestor::normalize(&event)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let outcome = state
        .ingestor
        .submit(fact, Some(event.block_number))
        .await
        .map_err(apply_error_response)?;
    outcome_response(outcome)
}

/// POST /mint - Minted fact (token_id and fact_id are ledger-assigned)
pub async fn mint_token(
    State(state): State<SharedState>,
    Json(req): Json<MintRequest>,
) -> ApiResult {
    let category = Category::parse(&req.category)
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "invalid category"))?;
    let price = match &req.price {
        Some(raw) => Some(
            parse_price(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?,
        ),
        None => None,
    };
    let owner = req.owner.clone().unwrap_or_else(|| req.creator.clone());

    let metadata_uri = match req.metadata_uri {
        Some(uri) => uri,
        None => {
            let metadata = json!({
                "name": req.name,
                "description": req.description,
                "image": req.image,
                "attributes": req.attributes,
            });
            state
                .media
                .store_metadata(&metadata)
                .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()))?
        }
    };

    let fact = Fact::Minted {
        fact_id: req.fact_id,
        token_id: req.token_id,
        creator: req.creator,
        owner,
        purchasable: req.purchasable,
        price,
        metadata_uri,
        name: req.name,
        description: req.description,
        image: req.image,
        category,
        attributes: req.attributes,
    };

    let outcome = state
        .ingestor
        .submit(fact, req.block_number)
        .await
        .map_err(apply_error_response)?;
    outcome_response(outcome)
}

/// POST /market/list/:token_id
pub async fn list_token(
    State(state): State<SharedState>,
    Path(token_id): Path<u64>,
    Json(req): Json<ListRequest>,
) -> ApiResult {
    let price =
        parse_price(&req.price).map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let fact = Fact::Listed {
        fact_id: req.fact_id,
        token_id,
        price,
        by: req.wallet_address,
    };
    let outcome = state
        .ingestor
        .submit(fact, req.block_number)
        .await
        .map_err(apply_error_response)?;
    outcome_response(outcome)
}

/// POST /market/delist/:token_id
pub async fn delist_token(
    State(state): State<SharedState>,
    Path(token_id): Path<u64>,
    Json(req): Json<DelistRequest>,
) -> ApiResult {
    let fact = Fact::Delisted {
        fact_id: req.fact_id,
        token_id,
        by: req.wallet_address,
    };
    let outcome = state
        .ingestor
        .submit(fact, req.block_number)
        .await
        .map_err(apply_error_response)?;
    outcome_response(outcome)
}

/// POST /market/buy/:token_id
pub async fn buy_token(
    State(state): State<SharedState>,
    Path(token_id): Path<u64>,
    Json(req): Json<BuyRequest>,
) -> ApiResult {
    let price =
        parse_price(&req.price).map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let fact = Fact::Sold {
        fact_id: req.fact_id,
        token_id,
        buyer: req.buyer,
        price,
    };
    let outcome = state
        .ingestor
        .submit(fact, req.block_number)
        .await
        .map_err(apply_error_response)?;
    outcome_response(outcome)
}

// ===== MARKETPLACE READ ENDPOINTS =====

/// GET /market/listings
pub async fn get_listings(
    State(state): State<SharedState>,
    Query(params): Query<ListingQueryParams>,
) -> ApiResult {
    let query = ListingQuery::from_params(&params)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let page = state
        .query
        .listings(&query)
        .map_err(|e| store_error(&e))?;
    Ok(Json(json!({ "success": true, "data": page_view(&page) })))
}

/// GET /market/stats
pub async fn get_marketplace_stats(State(state): State<SharedState>) -> ApiResult {
    let snapshot = state.stats.snapshot();
    Ok(Json(json!({ "success": true, "data": stats_view(&snapshot) })))
}

// ===== TOKEN ENDPOINTS =====

/// GET /tokens
pub async fn browse_tokens(
    State(state): State<SharedState>,
    Query(params): Query<TokenQueryParams>,
) -> ApiResult {
    let query = TokenQuery::from_params(&params)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let page = state.query.tokens(&query).map_err(|e| store_error(&e))?;
    Ok(Json(json!({ "success": true, "data": page_view(&page) })))
}

/// GET /tokens/:token_id
pub async fn get_token(
    State(state): State<SharedState>,
    Path(token_id): Path<u64>,
) -> ApiResult {
    let token = state
        .query
        .token(token_id)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "token not found"))?;
    let history = state
        .query
        .token_history(token_id)
        .map_err(|e| store_error(&e))?;
    Ok(Json(json!({
        "success": true,
        "data": token_view(&token),
        "history": history.iter().map(record_view).collect::<Vec<_>>(),
    })))
}

/// GET /tokens/wallet/:wallet_address
pub async fn tokens_by_wallet(
    State(state): State<SharedState>,
    Path(wallet): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult {
    let (page_no, limit) = page_bounds(params.page, params.limit)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let page = state
        .query
        .tokens_by_owner(&wallet, page_no, limit)
        .map_err(|e| store_error(&e))?;
    Ok(Json(json!({ "success": true, "data": page_view(&page) })))
}

// ===== USER ENDPOINTS =====

/// GET /users/:wallet_address
pub async fn get_profile(
    State(state): State<SharedState>,
    Path(wallet): Path<String>,
) -> ApiResult {
    let profile = state
        .query
        .profile(&wallet)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "user not found"))?;
    Ok(Json(json!({
        "success": true,
        "data": {
            "wallet_address": profile.user.wallet_address,
            "username": profile.user.username,
            "email": profile.user.email,
            "bio": profile.user.bio,
            "avatar": profile.user.avatar,
            "social_links": profile.user.social_links,
            "created_at": profile.user.created_at,
            "updated_at": profile.user.updated_at,
            "stats": {
                "owned_tokens": profile.owned_tokens,
                "created_tokens": profile.created_tokens,
            },
        },
    })))
}

/// PUT /users/:wallet_address - creates the profile on first touch
pub async fn update_profile(
    State(state): State<SharedState>,
    Path(wallet): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult {
    if wallet.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "empty wallet address"));
    }
    let ts = crate::models::now();
    let mut user = state
        .store
        .ensure_user(&wallet, ts)
        .map_err(|e| store_error(&e))?;

    if req.username.is_some() {
        user.username = req.username;
    }
    if req.email.is_some() {
        user.email = req.email;
    }
    if req.bio.is_some() {
        user.bio = req.bio;
    }
    if req.avatar.is_some() {
        user.avatar = req.avatar;
    }
    if let Some(links) = req.social_links {
        user.social_links = links;
    }
    user.updated_at = ts;

    state.store.put_user(&user).map_err(|e| store_error(&e))?;
    Ok(Json(json!({ "success": true, "data": user })))
}

/// GET /users/:wallet_address/created
pub async fn get_created_tokens(
    State(state): State<SharedState>,
    Path(wallet): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult {
    let (page_no, limit) = page_bounds(params.page, params.limit)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;
    let page = state
        .query
        .tokens_by_creator(&wallet, page_no, limit)
        .map_err(|e| store_error(&e))?;
    Ok(Json(json!({ "success": true, "data": page_view(&page) })))
}

// ===== SYNC ENDPOINTS =====

/// POST /sync - on-demand catch-up scan
pub async fn trigger_sync(
    State(state): State<SharedState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult {
    let to_block = match req.to_block {
        Some(to) => to,
        None => state
            .ingestor
            .client()
            .chain_head()
            .await
            .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()))?,
    };
    let from_block = match req.from_block {
        Some(from) => from,
        None => state
            .store
            .last_scanned_block()
            .map_err(|e| store_error(&e))?
            .map(|c| c + 1)
            .unwrap_or(0),
    };
    if from_block > to_block {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "from_block must not exceed to_block",
        ));
    }

    let report = state
        .ingestor
        .catch_up(from_block, to_block)
        .await
        .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()))?;
    Ok(Json(json!({ "success": true, "report": report })))
}

/// GET /sync/status
pub async fn sync_status(State(state): State<SharedState>) -> ApiResult {
    Ok(Json(json!({ "success": true, "data": state.ingestor.status() })))
}

// ===== MEDIA ENDPOINTS =====

/// POST /media - store bytes, return a content address
pub async fn upload_media(State(state): State<SharedState>, body: Bytes) -> ApiResult {
    if body.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "empty media body"));
    }
    let address = state
        .media
        .store_bytes(&body)
        .map_err(|e| error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()))?;
    Ok(Json(json!({ "success": true, "address": address })))
}

/// GET /media/:address
pub async fn get_media(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Vec<u8>, (StatusCode, Json<Value>)> {
    state.media.load(&address).map_err(|e| match e {
        MediaError::NotFound(_) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        MediaError::InvalidAddress(_) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        MediaError::Io(_) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
    })
}

// ===== HEALTH =====

pub async fn health_check(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "algomint-mirror",
        "tokens": state.store.token_count(),
        "started_at": state.started_at,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ===== ROUTER =====

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // ===== FACT INTAKE =====
        .route("/facts", post(submit_fact))
        .route("/mint", post(mint_token))
        .route("/market/list/:token_id", post(list_token))
        .route("/market/delist/:token_id", post(delist_token))
        .route("/market/buy/:token_id", post(buy_token))
        // ===== MARKETPLACE READS =====
        .route("/market/listings", get(get_listings))
        .route("/market/stats", get(get_marketplace_stats))
        // ===== TOKENS =====
        .route("/tokens", get(browse_tokens))
        .route("/tokens/:token_id", get(get_token))
        .route("/tokens/wallet/:wallet_address", get(tokens_by_wallet))
        // ===== USERS =====
        .route("/users/:wallet_address", get(get_profile).put(update_profile))
        .route("/users/:wallet_address/created", get(get_created_tokens))
        // ===== SYNC =====
        .route("/sync", post(trigger_sync))
        .route("/sync/status", get(sync_status))
        // ===== MEDIA =====
        .route("/media", post(upload_media))
        .route("/media/:address", get(get_media))
        // ===== HEALTH =====
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
