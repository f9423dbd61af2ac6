use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{AuthError, StoreError};

/// Rejection for the [`Authenticated`](super::Authenticated) extractor.
#[derive(Debug, thiserror::Error)]
pub enum AuthRejection {
    /// The request failed authentication; the stable error string is
    /// returned to the client with a 401.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// The session store failed; nothing about the client's credentials
    /// is revealed.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(error) => {
                (StatusCode::UNAUTHORIZED, error.to_string()).into_response()
            }
            Self::Store(ref error) => {
                tracing::error!(error = %error, "session store failure during authentication");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
