// AlgoMint Marketplace Mirror - Main Entry Point
// Ledger facts in, consistent queryable mirror out.

use std::net::SocketAddr;

use algomint_mirror::app_state::AppState;
use algomint_mirror::config::Config;
use algomint_mirror::handlers::build_router;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("\n═══════════════════════════════════════════════");
    println!("     🖼️  AlgoMint Marketplace Mirror");
    println!("═══════════════════════════════════════════════\n");

    // Correctness-affecting configuration is required; abort on anything
    // missing rather than defaulting.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = match AppState::initialize(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("❌ Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    // Live subscription: poll the ledger head and feed new facts through the
    // reconciler. Catch-up scans stay available via POST /sync.
    let subscription = state.ingestor.clone();
    let interval = config.sync_interval_secs;
    tokio::spawn(async move {
        subscription.run_subscription(interval).await;
    });

    let app = build_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    println!("📋 Available Endpoints:");
    println!("   POST /facts                   - Submit a ledger fact (generic intake)");
    println!("   POST /mint                    - Apply a Minted fact");
    println!("   POST /market/list/:id         - Apply a Listed fact");
    println!("   POST /market/delist/:id       - Apply a Delisted fact");
    println!("   POST /market/buy/:id          - Apply a Sold fact");
    println!("   GET  /market/listings         - Paginated active listings");
    println!("   GET  /market/stats            - Volume, listed count, recent sales");
    println!("   GET  /tokens                  - Browse mirrored tokens");
    println!("   GET  /tokens/:id              - Token details + history");
    println!("   GET  /tokens/wallet/:wallet   - Tokens owned by a wallet");
    println!("   GET  /users/:wallet           - Profile + ownership stats");
    println!("   PUT  /users/:wallet           - Update profile");
    println!("   POST /sync                    - Catch-up scan of a block range");
    println!("   GET  /sync/status             - Ingest cursor and last report");
    println!("   POST /media                   - Store bytes, get content address");
    println!("\n📡 Listening on http://{}\n", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    // Flush the mirror store before exiting so the idempotency ledger and
    // token state hit disk together.
    let shutdown_state = state.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");

        println!("\n🛑 Shutdown signal received, flushing mirror store...");
        match shutdown_state.store.flush() {
            Ok(()) => println!("✅ Mirror store flushed"),
            Err(e) => eprintln!("❌ Failed to flush store: {}", e),
        }
        std::process::exit(0);
    });

    axum::serve(listener, app)
        .await
        .expect("server error");
}
