use actix_web::{web, HttpResponse};

use super::errors::ApiError;
use crate::service::OrderService;

pub(super) async fn get_order(
    service: web::Data<OrderService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let order_uid = path.into_inner();

    match service.get_order(&order_uid).await {
        Ok(Some(order)) => Ok(HttpResponse::Ok().json(order.as_ref())),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => {
            tracing::error!(order_uid = %order_uid, error = %e, "Order lookup failed");
            Err(e.into())
        }
    }
}

pub(super) async fn create_order(
    service: web::Data<OrderService>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    match service.create_order(&body).await {
        Ok(order) => {
            tracing::info!(order_uid = %order.order_uid, "Order created");
            Ok(HttpResponse::Created().json(order.as_ref()))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Order creation rejected");
            Err(e.into())
        }
    }
}
