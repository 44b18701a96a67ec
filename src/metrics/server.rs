use actix::Addr;
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;

use crate::actors::{
    DlqActor, GetDlqMessages, GetDlqStats, GetSystemHealth, HealthMonitorActor, HealthStatus,
};

const DEFAULT_DLQ_LIMIT: i64 = 50;

/// Build the operations HTTP server (/metrics, /health, /dlq). The caller
/// decides where to run it.
pub fn start_metrics_server(
    registry: Arc<Registry>,
    health_monitor: Addr<HealthMonitorActor>,
    dlq_actor: Addr<DlqActor>,
    host: &str,
    port: u16,
) -> std::io::Result<Server> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(health_monitor.clone()))
            .app_data(web::Data::new(dlq_actor.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
            .route("/dlq", web::get().to(dlq_handler))
    })
    .workers(1)
    .bind((host, port))?
    .run();

    Ok(server)
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(health_monitor: web::Data<Addr<HealthMonitorActor>>) -> impl Responder {
    match health_monitor.send(GetSystemHealth).await {
        Ok(health) => {
            let body = serde_json::json!({
                "service": "order-cache",
                "status": health.overall_status.label(),
                "components": health.components,
                "check_time": health.check_time,
            });

            match health.overall_status {
                HealthStatus::Unhealthy(_) => HttpResponse::ServiceUnavailable().json(body),
                _ => HttpResponse::Ok().json(body),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "service": "order-cache",
                "status": "unhealthy",
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct DlqQuery {
    limit: Option<i64>,
}

fn dlq_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_DLQ_LIMIT).clamp(1, 500)
}

async fn dlq_handler(
    dlq_actor: web::Data<Addr<DlqActor>>,
    query: web::Query<DlqQuery>,
) -> impl Responder {
    let limit = dlq_limit(query.limit);

    let stats = dlq_actor.send(GetDlqStats).await;
    let messages = dlq_actor.send(GetDlqMessages { limit }).await;

    match (stats, messages) {
        (Ok(Ok(stats)), Ok(Ok(messages))) => HttpResponse::Ok().json(serde_json::json!({
            "stats": stats,
            "messages": messages,
        })),
        (stats, messages) => {
            tracing::error!(
                stats_ok = matches!(stats, Ok(Ok(_))),
                messages_ok = matches!(messages, Ok(Ok(_))),
                "Failed to read dead letter queue"
            );
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "failed to read dead letter queue",
            }))
        }
    }
}
