use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use kiosk_engine::traits::ShopError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    RequestConflict(String),
    #[error("Payments are not available right now. {0}")]
    PaymentsUnavailable(String),
    #[error("The payment provider refused the request. {0}")]
    UpstreamGatewayError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::RequestConflict(_) => StatusCode::CONFLICT,
            Self::PaymentsUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamGatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<ShopError> for ServerError {
    fn from(e: ShopError) -> Self {
        match &e {
            ShopError::NotFound { .. } => Self::NoRecordFound(e.to_string()),
            ShopError::InvalidTransition { .. } | ShopError::InsufficientStock(_) | ShopError::VersionConflict { .. } => {
                Self::RequestConflict(e.to_string())
            },
            ShopError::GatewayUnavailable(_) => Self::PaymentsUnavailable(e.to_string()),
            ShopError::Gateway(_) => Self::UpstreamGatewayError(e.to_string()),
            ShopError::WebhookRejected(_) | ShopError::Validation(_) | ShopError::Money(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            ShopError::Database(_) => Self::BackendError(e.to_string()),
        }
    }
}
