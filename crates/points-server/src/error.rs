//! Error types for the control API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Point and
//! store errors convert into it at the dispatch boundary.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use points_core::PointError;
use points_store::StoreError;

/// Errors that can occur in the control API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request carried no credential or the wrong one.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested resource (point, command, backup, path) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A command argument was missing, malformed, or out of range.
    ///
    /// Reported as 404 like any other unresolvable command request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A request parameter outside a command was invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request would break a collection policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The request conflicts with current channel usage.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Writing or reading persisted state failed.
    #[error("persistence error: {0}")]
    Persistence(StoreError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::InvalidArgument(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PointError> for ApiError {
    fn from(e: PointError) -> Self {
        match e {
            PointError::OutOfRange { .. }
            | PointError::InvalidChoice { .. }
            | PointError::EmptyName => Self::InvalidArgument(e.to_string()),
            PointError::NotFound(_) => Self::NotFound(e.to_string()),
            PointError::LastPoint => Self::Forbidden(e.to_string()),
            PointError::NoFreeChannel | PointError::ChannelInUse(_) => {
                Self::Conflict(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownBackup(_) => Self::NotFound(e.to_string()),
            other => Self::Persistence(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Unauthorized => String::from("missing or incorrect credential"),
            Self::NotFound(msg)
            | Self::InvalidArgument(msg)
            | Self::BadRequest(msg)
            | Self::Forbidden(msg)
            | Self::Conflict(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Persistence(e) => e.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        if matches!(self, Self::Unauthorized) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"points\""),
            );
        }
        response
    }
}
