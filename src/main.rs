// =============================================================================
// Borealis Spot Engine — Main Entry Point
// =============================================================================
//
// The engine starts with the trading loop STOPPED for safety. The operator
// starts it explicitly via `POST /api/v1/control/start` (or sets
// BOREALIS_AUTOSTART=1 for unattended deployments).
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod config;
mod engine;
mod exchange;
mod execution;
mod guardrails;
mod indicators;
mod killswitch;
mod market;
mod playbooks;
mod position;
mod reserve;
mod risk;
mod scanner;
mod scheduler;
mod state;
mod store;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::rest::ApiState;
use crate::config::BotConfig;
use crate::engine::Engine;
use crate::exchange::binance::BinanceClient;
use crate::scheduler::Scheduler;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Borealis Spot Engine — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let user_id = std::env::var("BOREALIS_USER").unwrap_or_else(|_| "default".to_string());
    let db_path = std::env::var("BOREALIS_DB").unwrap_or_else(|_| "borealis.db".to_string());

    // ── 2. Store ─────────────────────────────────────────────────────────
    let store = Arc::new(Store::open(&db_path)?);

    // Seed (or refresh) the bootstrap user's config.
    let mut cfg = store.load_config(&user_id)?.unwrap_or_else(|| {
        info!(user_id, "no stored config — seeding defaults");
        BotConfig::default()
    });

    // Override the watchlist from the environment if provided.
    if let Ok(symbols) = std::env::var("BOREALIS_SYMBOLS") {
        let watchlist: Vec<String> = symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !watchlist.is_empty() {
            cfg.scanner.watchlist = watchlist;
        }
    }
    store.save_config(&user_id, &cfg)?;

    info!(
        user_id,
        watchlist = ?cfg.scanner.watchlist,
        bot_status = %cfg.bot_status,
        refresh_ms = cfg.scanner.refresh_ms,
        "configuration ready"
    );

    // ── 3. Exchange client ───────────────────────────────────────────────
    let api_key = std::env::var("BINANCE_API_KEY").unwrap_or_default();
    let api_secret = std::env::var("BINANCE_API_SECRET").unwrap_or_default();
    if api_key.is_empty() || api_secret.is_empty() {
        warn!("BINANCE_API_KEY/BINANCE_API_SECRET not set — signed endpoints will fail");
    }
    let binance = Arc::new(BinanceClient::new(api_key, api_secret));

    // ── 4. Engine + scheduler ────────────────────────────────────────────
    let engine = Arc::new(Engine::new(store, binance));
    let scheduler = Arc::new(Scheduler::new(engine.clone()));

    // Warm the exchange filter cache so the first tick doesn't pay for it.
    if let Err(e) = engine.filters.refresh(engine.exchange.as_ref()).await {
        warn!(error = %e, "initial exchange-info refresh failed — will retry on demand");
    }

    // ── 5. Operator API server ───────────────────────────────────────────
    let bind_addr =
        std::env::var("BOREALIS_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let api_state = Arc::new(ApiState {
        engine: engine.clone(),
        scheduler: scheduler.clone(),
        default_user: user_id.clone(),
    });

    let bind_addr_clone = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr_clone)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr_clone, "operator API listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    // ── 6. Optional autostart ────────────────────────────────────────────
    let autostart = std::env::var("BOREALIS_AUTOSTART")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if autostart {
        info!(user_id, "BOREALIS_AUTOSTART set — starting trading loop");
        if let Err(e) = scheduler.start(&user_id) {
            error!(user_id, error = %e, "failed to autostart trading loop");
        }
    } else {
        info!(
            user_id,
            "trading loop NOT started — use POST /api/v1/control/start"
        );
    }

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    // Let in-flight ticks finish; no new ticks start.
    scheduler.stop_all();

    info!("Borealis Spot Engine shut down complete.");
    Ok(())
}
