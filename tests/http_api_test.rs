// HTTP surface tests: the full router driven in-process via tower.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use algomint_mirror::app_state::{AppState, SharedState};
use algomint_mirror::config::Config;
use algomint_mirror::handlers::build_router;
use algomint_mirror::ledger_client::{LedgerClient, LedgerEvent, LedgerEventPayload};

const ALICE: &str = "L1ALICE000000001";
const BOB: &str = "L1BOB00000000001";

// ============================================================================
// HELPERS
// ============================================================================

fn test_app(events: Vec<LedgerEvent>) -> (tempfile::TempDir, Router, SharedState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::for_tests(dir.path());
    let client = LedgerClient::mock_with_events(events);
    let state = AppState::initialize_with_client(config, client).expect("initialize");
    let app = build_router(state.clone());
    (dir, app, state)
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "POST", path, body).await
}

async fn put(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send_json(app, "PUT", path, body).await
}

async fn send_json(app: &Router, method: &str, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn mint_body(fact_id: &str, token_id: u64, price: Option<&str>) -> Value {
    json!({
        "fact_id": fact_id,
        "token_id": token_id,
        "creator": ALICE,
        "name": format!("Token #{}", token_id),
        "description": "http test token",
        "image": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
        "category": "art",
        "purchasable": true,
        "price": price,
    })
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app, _state) = test_app(vec![]);
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "algomint-mirror");
}

// ============================================================================
// FACT INTAKE
// ============================================================================

#[tokio::test]
async fn test_mint_list_buy_flow() {
    let (_dir, app, _state) = test_app(vec![]);

    // Mint with a price: the token lists immediately
    let (status, body) = post(&app, "/mint", mint_body("0xmint1", 1, Some("1000"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    let (status, body) = get(&app, "/tokens/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["owner"], ALICE);
    assert_eq!(body["data"]["listing_state"], "listed");
    assert_eq!(body["data"]["price"], "1000");

    // Buy it
    let (status, body) = post(
        &app,
        "/market/buy/1",
        json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");
    assert_eq!(body["data"]["fee"], "25"); // 1000 * 250 bps

    let (_, body) = get(&app, "/tokens/1").await;
    assert_eq!(body["data"]["owner"], BOB);
    assert_eq!(body["data"]["listing_state"], "unlisted");

    // The token's history shows both applied facts
    assert_eq!(body["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_fact_is_transparent() {
    let (_dir, app, _state) = test_app(vec![]);

    post(&app, "/mint", mint_body("0xmint1", 1, Some("1000"))).await;
    let buy = json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000" });

    let (status, body) = post(&app, "/market/buy/1", buy.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "applied");

    // Redelivery resolves to the stored prior result, not an error
    let (status, body) = post(&app, "/market/buy/1", buy).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["data"]["fact_id"], "0xsale1");
}

#[tokio::test]
async fn test_conflicting_fact_is_409() {
    let (_dir, app, _state) = test_app(vec![]);

    post(&app, "/mint", mint_body("0xmint1", 1, None)).await;

    // Unlisted token: sale must be rejected
    let (status, body) = post(
        &app,
        "/market/buy/1",
        json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "not_listed");

    // Listing by a non-owner is a conflict too
    let (status, body) = post(
        &app,
        "/market/list/1",
        json!({ "fact_id": "0xlist1", "price": "1000", "wallet_address": BOB }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "not_owner");
}

#[tokio::test]
async fn test_malformed_input_is_400() {
    let (_dir, app, _state) = test_app(vec![]);

    // Unparseable price
    let (status, _) = post(&app, "/mint", mint_body("0xmint1", 1, Some("2.5"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown category
    let mut body = mint_body("0xmint2", 2, None);
    body["category"] = json!("land");
    let (status, _) = post(&app, "/mint", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Query limit out of range
    let (status, _) = get(&app, "/market/listings?limit=200").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// QUERY SURFACE
// ============================================================================

#[tokio::test]
async fn test_listings_pagination_and_sort() {
    let (_dir, app, _state) = test_app(vec![]);

    post(&app, "/mint", mint_body("0xmint1", 1, Some("300"))).await;
    post(&app, "/mint", mint_body("0xmint2", 2, Some("100"))).await;
    post(&app, "/mint", mint_body("0xmint3", 3, Some("200"))).await;
    post(&app, "/mint", mint_body("0xmint4", 4, None)).await; // unlisted

    let (status, body) =
        get(&app, "/market/listings?sort_by=price&sort_order=asc&limit=2").await;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["pages"], 2);
    let items = data["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["token_id"], 2);
    assert_eq!(items[1]["token_id"], 3);

    let (_, body) = get(
        &app,
        "/market/listings?sort_by=price&sort_order=asc&limit=2&page=2",
    )
    .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["token_id"], 1);
}

#[tokio::test]
async fn test_price_range_filter() {
    let (_dir, app, _state) = test_app(vec![]);

    post(&app, "/mint", mint_body("0xmint1", 1, Some("300"))).await;
    post(&app, "/mint", mint_body("0xmint2", 2, Some("100"))).await;

    let (_, body) = get(&app, "/market/listings?min_price=200").await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["token_id"], 1);
}

#[tokio::test]
async fn test_stats_endpoint_reports_volume_as_string() {
    let (_dir, app, _state) = test_app(vec![]);

    post(
        &app,
        "/mint",
        mint_body("0xmint1", 1, Some("1000000000000000000")),
    )
    .await;
    post(
        &app,
        "/market/buy/1",
        json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000000000000000000" }),
    )
    .await;

    let (status, body) = get(&app, "/market/stats").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total_listed"], 0);
    assert_eq!(data["total_volume"], "1000000000000000000");
    let sales = data["recent_sales"].as_array().unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0]["fee"], "25000000000000000");
}

#[tokio::test]
async fn test_tokens_by_wallet() {
    let (_dir, app, _state) = test_app(vec![]);

    post(&app, "/mint", mint_body("0xmint1", 1, Some("1000"))).await;
    post(&app, "/mint", mint_body("0xmint2", 2, None)).await;
    post(
        &app,
        "/market/buy/1",
        json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000" }),
    )
    .await;

    let (_, body) = get(&app, &format!("/tokens/wallet/{}", BOB)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["token_id"], 1);

    let (_, body) = get(&app, &format!("/tokens/wallet/{}", ALICE)).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["token_id"], 2);
}

// ============================================================================
// USERS
// ============================================================================

#[tokio::test]
async fn test_profile_lazily_created_and_updated() {
    let (_dir, app, _state) = test_app(vec![]);

    // Unknown wallet: 404 until first reference
    let (status, _) = get(&app, &format!("/users/{}", BOB)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // PUT creates on first touch
    let (status, body) = put(
        &app,
        &format!("/users/{}", BOB),
        json!({ "username": "bob", "bio": "collector" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");

    // Minting references the creator; profile stats follow ownership
    post(&app, "/mint", mint_body("0xmint1", 1, Some("1000"))).await;
    post(
        &app,
        "/market/buy/1",
        json!({ "fact_id": "0xsale1", "buyer": BOB, "price": "1000" }),
    )
    .await;

    let (status, body) = get(&app, &format!("/users/{}", BOB)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");
    assert_eq!(body["data"]["stats"]["owned_tokens"], 1);
    assert_eq!(body["data"]["stats"]["created_tokens"], 0);

    let (_, body) = get(&app, &format!("/users/{}", ALICE)).await;
    assert_eq!(body["data"]["stats"]["created_tokens"], 1);
}

// ============================================================================
// SYNC
// ============================================================================

fn scripted_events() -> Vec<LedgerEvent> {
    vec![
        LedgerEvent {
            tx_hash: "0xmint1".to_string(),
            block_number: 1,
            payload: LedgerEventPayload::Minted {
                token_id: 1,
                creator: ALICE.to_string(),
                owner: ALICE.to_string(),
                purchasable: true,
                price: Some("1000".to_string()),
                metadata_uri: "sha256:meta".to_string(),
                name: "Token #1".to_string(),
                description: "scripted".to_string(),
                image: "sha256:img".to_string(),
                category: "art".to_string(),
                attributes: vec![],
            },
        },
        LedgerEvent {
            tx_hash: "0xsale1".to_string(),
            block_number: 2,
            payload: LedgerEventPayload::Sold {
                token_id: 1,
                buyer: BOB.to_string(),
                price: "1000".to_string(),
            },
        },
    ]
}

#[tokio::test]
async fn test_catch_up_scan_endpoint() {
    let (_dir, app, state) = test_app(scripted_events());

    let (status, body) = post(&app, "/sync", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["applied"], 2);
    assert_eq!(body["report"]["to_block"], 2);

    assert_eq!(state.store.token(1).unwrap().unwrap().owner, BOB);

    let (_, body) = get(&app, "/sync/status").await;
    assert_eq!(body["data"]["last_scanned_block"], 2);
    assert_eq!(body["data"]["mock_mode"], true);

    // Re-running the same scan redelivers everything; nothing reapplies
    let (_, body) = post(&app, "/sync", json!({ "from_block": 0, "to_block": 2 })).await;
    assert_eq!(body["report"]["applied"], 0);
    assert_eq!(body["report"]["duplicates"], 2);
}

#[tokio::test]
async fn test_sync_rejects_inverted_range() {
    let (_dir, app, _state) = test_app(vec![]);
    let (status, _) = post(&app, "/sync", json!({ "from_block": 5, "to_block": 1 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// MEDIA
// ============================================================================

#[tokio::test]
async fn test_media_store_and_fetch() {
    let (_dir, app, _state) = test_app(vec![]);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/media")
                .body(Body::from("sunset pixels".as_bytes().to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let address = body["address"].as_str().unwrap().to_string();
    assert!(address.starts_with("sha256:"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/media/{}", address))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"sunset pixels");
}
