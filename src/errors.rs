use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::sessions::SessionError;

// -----------------------------------------------------------------------------
// ----- GatewayError ----------------------------------------------------------

/// Everything that can go wrong at the HTTP boundary.
///
/// Authentication failures render opaquely; the detail goes to the log.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Request body must be in JSON")]
    UnsupportedMediaType,

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream {target} unreachable: {reason}")]
    ProxyUpstreamUnreachable { target: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

// -----------------------------------------------------------------------------
// ----- GatewayError: Public --------------------------------------------------

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Session(e) if e.is_credential_error() => StatusCode::UNAUTHORIZED,
            GatewayError::Session(SessionError::StoreUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ConnectionRejected(_) => StatusCode::FORBIDDEN,
            GatewayError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ProxyUpstreamUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body text shown to the client.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Session(e) if e.is_credential_error() => "invalid credentials".into(),
            GatewayError::Session(SessionError::StoreUnavailable(_)) => {
                "session store unavailable".into()
            }
            GatewayError::Session(_) | GatewayError::Internal(_) => {
                "internal server error".into()
            }
            GatewayError::ConnectionRejected(_) => "forbidden".into(),
            GatewayError::ProxyUpstreamUnreachable { .. } => "bad gateway".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(%status, "{self}");
        } else {
            warn!(%status, "{self}");
        }

        (status, self.public_message()).into_response()
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
