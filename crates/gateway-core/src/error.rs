use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the gateway, carrying enough information to render the
/// unified error envelope below.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("provider '{0}' already exists")]
    ProviderAlreadyExists(String),

    #[error("no route for model '{0}'")]
    RouteNotFound(String),

    #[error("provider returned an error response")]
    ProviderResponseError {
        status: StatusCode,
        body: serde_json::Value,
    },

    #[error("failed to connect to provider: {0}")]
    ProviderConnectionError(String),

    #[error("provider request timed out")]
    ProviderTimeout,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ProviderNotFound(_) | Self::RouteNotFound(_) => StatusCode::NOT_FOUND,
            Self::ProviderAlreadyExists(_) => StatusCode::BAD_REQUEST,
            Self::ProviderResponseError { status, .. } => *status,
            Self::ProviderConnectionError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::ProviderAlreadyExists(_) => "invalid_request",
            Self::ProviderNotFound(_) => "provider_not_found",
            Self::RouteNotFound(_) => "route_not_found",
            Self::ProviderResponseError { .. } => "provider_response_error",
            Self::ProviderConnectionError(_) => "provider_connection_error",
            Self::ProviderTimeout => "provider_timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::ProviderAlreadyExists(_) => "validation_error",
            _ => "api_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    kind: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, details) = match &self {
            Self::ProviderResponseError { body, .. } => (
                body.get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("upstream provider returned an error")
                    .to_string(),
                Some(body.clone()),
            ),
            Self::Internal(err) => {
                log::error!("internal gateway error: {err:#}");
                ("internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                message,
                kind: self.error_type().to_string(),
                code: self.code().to_string(),
                details,
            },
        };

        (status, Json(envelope)).into_response()
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
