use actix::prelude::*;
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod api;
mod cache;
mod config;
mod db;
mod ingest;
mod messaging;
mod metrics;
mod models;
mod service;
mod utils;

use actors::{CoordinatorActor, GetDlqActor, GetHealthMonitor, Shutdown};
use cache::OrderCache;
use config::{CliArgs, Command, ServeArgs};
use db::PgOrderStore;
use service::OrderService;
use utils::{retry_on_transient, retry_with_backoff, RetryConfig};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug order_cache serve
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_cache=debug")),
        )
        .init();

    match CliArgs::parse().command {
        Command::Serve(args) => serve(*args).await,
        Command::Publish(args) => {
            let published = messaging::run_publish(args).await?;
            tracing::info!("✅ Published {} order message(s)", published);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    tracing::info!("🚀 Starting order cache");

    // === 1. Connect to PostgreSQL (it may still be starting) ===
    tracing::info!("Connecting to PostgreSQL...");
    let store = retry_with_backoff(RetryConfig::startup(), "connect_postgres", |_| {
        PgOrderStore::connect(&args.database_url, args.database_max_connections)
    })
    .await
    .into_result()
    .context("PostgreSQL unreachable")?;

    db::schema::ensure_schema(store.pool())
        .await
        .context("failed to create schema")?;
    let pool = store.pool().clone();

    // === 2. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // === 3. Warm up the cache before any ingress opens ===
    let cache = Arc::new(OrderCache::new());
    let service = Arc::new(OrderService::new(
        Arc::new(store),
        cache,
        metrics.clone(),
        args.store_timeout(),
    ));

    let warm_up_timeout = args.warm_up_timeout();
    let loaded = retry_on_transient(RetryConfig::startup(), "warm_up", |_| {
        service.warm_up(warm_up_timeout)
    })
    .await
    .into_result()
    .context("cache warm-up failed")?;
    tracing::info!("🔥 Cache warmed with {} orders", loaded);

    // === 4. Background side: DLQ, health, ingest consumer ===
    let coordinator = CoordinatorActor::new(
        pool,
        service.clone(),
        metrics.clone(),
        args.consumer_config(),
    )
    .start();

    let health_monitor = coordinator
        .send(GetHealthMonitor)
        .await?
        .context("health monitor not started")?;
    let dlq_actor = coordinator
        .send(GetDlqActor)
        .await?
        .context("DLQ actor not started")?;

    // === 5. Operations listener ===
    let metrics_server = metrics::start_metrics_server(
        Arc::new(metrics.registry().clone()),
        health_monitor,
        dlq_actor,
        &args.http_host,
        args.metrics_port,
    )?;
    let metrics_handle = metrics_server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = metrics_server.await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    // === 6. Order API; runs until SIGINT/SIGTERM ===
    api::start_api_server(service, &args.http_host, args.http_port)?.await?;

    tracing::info!("🛑 API stopped, shutting down");
    coordinator.send(Shutdown).await?;
    metrics_handle.stop(true).await;

    tracing::info!("👋 Order cache stopped");
    Ok(())
}
