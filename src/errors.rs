use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// JSON body rendered for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code for clients that branch on failures
    pub code: String,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product {product_id} is unavailable")]
    ProductUnavailable { product_id: Uuid },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Stock for product {product_id} changed during checkout; could not reserve {requested}")]
    StockConflict { product_id: Uuid, requested: i32 },

    #[error("Invalid shipping address: {0}")]
    InvalidShippingAddress(String),

    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Cannot transition order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// True for the two ways a checkout can lose on stock: at validation or at the
    /// conditional decrement.
    pub fn is_stock_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. } | Self::StockConflict { .. }
        )
    }

    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::ProductUnavailable { .. } => "product_unavailable",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::StockConflict { .. } => "stock_conflict",
            Self::InvalidShippingAddress(_) => "invalid_shipping_address",
            Self::InvalidPaymentMethod(_) => "invalid_payment_method",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Forbidden(_) => "forbidden",
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyCart
            | Self::InvalidShippingAddress(_)
            | Self::InvalidPaymentMethod(_)
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ProductUnavailable { .. } | Self::InsufficientStock { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::StockConflict { .. } | Self::InvalidStatusTransition { .. } => {
                StatusCode::CONFLICT
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.code().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn checkout_errors_map_to_client_statuses() {
        let product_id = Uuid::new_v4();
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::ProductUnavailable { product_id }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product_id,
                requested: 3,
                available: 1
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::StockConflict {
                product_id,
                requested: 1
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InvalidPaymentMethod("bitcoin".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn stock_errors_are_grouped() {
        let product_id = Uuid::new_v4();
        assert!(ServiceError::StockConflict {
            product_id,
            requested: 1
        }
        .is_stock_error());
        assert!(ServiceError::InsufficientStock {
            product_id,
            requested: 2,
            available: 0
        }
        .is_stock_error());
        assert!(!ServiceError::EmptyCart.is_stock_error());
        assert!(!ServiceError::ProductUnavailable { product_id }.is_stock_error());
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("pool exhausted".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(sea_orm::DbErr::Custom("boom".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Order 1 not found".into()).response_message(),
            "Not found: Order 1 not found"
        );
    }

    #[tokio::test]
    async fn error_response_carries_code_and_status() {
        let response = ServiceError::EmptyCart.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "empty_cart");
        assert_eq!(payload.message, "Cart is empty");
        assert_eq!(payload.error, "Bad Request");
    }
}
