//! # Quorum Gateway
//!
//! Actix-web front door for the polling API. Every write-heavy route is
//! metered against a shared fixed-window counter before the request is
//! forwarded upstream.

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

use quorum_core::RateLimiter;
use quorum_core::ports::SystemClock;
use quorum_infra::build_store;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod observability;
mod state;
mod telemetry;

use config::AppConfig;
use observability::RequestIdMiddleware;
use state::{AppState, Upstream};
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Quorum gateway on {}:{}",
        config.host,
        config.port
    );

    let store = build_store(&config.rate_limit, Arc::new(SystemClock)).await;
    let limiter = RateLimiter::new(store, config.rate_limit.interval);

    let upstream = Upstream::new(config.upstream_url.clone(), config.upstream_timeout)
        .context("failed to build upstream HTTP client")?;
    let state = AppState::new(limiter.clone(), upstream);

    #[cfg(feature = "scheduler")]
    let mut scheduler = {
        let mut scheduler = background::Scheduler::new(background::SchedulerConfig::from_env())
            .await
            .context("failed to create scheduler")?;
        background::schedule_window_purge(&scheduler, limiter.store().clone())
            .await
            .context("failed to register rate window purge")?;
        scheduler.start().await.context("failed to start scheduler")?;
        scheduler
    };

    let on_store_failure = config.on_store_failure;
    HttpServer::new(move || {
        let limiter = limiter.clone();
        App::new()
            .wrap(RequestIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(move |cfg| handlers::configure_routes(cfg, &limiter, on_store_failure))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    #[cfg(feature = "scheduler")]
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler shutdown failed");
    }

    Ok(())
}
