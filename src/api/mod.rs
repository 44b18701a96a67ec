mod errors;
mod handlers;

use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

use crate::service::OrderService;

// ============================================================================
// Read API
// ============================================================================
//
//   GET  /orders/{id}  -> 200 order | 404 | 500
//   POST /orders       -> 201 order | 400 | 500
//
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(handlers::create_order))
            .route("/{id}", web::get().to(handlers::get_order)),
    );
}

/// Build the API server. It only serves once awaited, after warm-up.
pub fn start_api_server(
    service: Arc<OrderService>,
    host: &str,
    port: u16,
) -> std::io::Result<Server> {
    tracing::info!("🌐 Starting order API on http://{}:{}/orders", host, port);

    let service = web::Data::from(service);
    let server = HttpServer::new(move || App::new().app_data(service.clone()).configure(configure))
        .bind((host, port))?
        .run();

    Ok(server)
}
