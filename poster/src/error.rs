//! Request failures and their HTTP mapping.
//!
//! Clients only ever see a fixed body per class of failure; the cause is
//! logged here, once, when the error is turned into a response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub const BAD_POST: &str = "bad post";
pub const INTERNAL_ERROR: &str = "internal error";

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    /// The write did not come from the allowed sender or was not signed correctly.
    #[error("unauthorized")]
    Unauthorized,

    /// The body exceeded the configured ceiling.
    #[error("payload too large")]
    PayloadTooLarge,

    /// The form was malformed or incomplete.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The media host or the post store failed.
    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),

    /// The page could not be rendered.
    #[error("render failure: {0:#}")]
    Render(anyhow::Error),
}

impl PostError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PostError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthorized => {
                tracing::warn!("rejected unauthorized post");
                BAD_POST
            }
            Self::PayloadTooLarge => {
                tracing::warn!("rejected oversized post");
                BAD_POST
            }
            Self::BadRequest(reason) => {
                tracing::warn!(reason = %reason, "got bad post");
                BAD_POST
            }
            Self::Upstream(err) => {
                tracing::error!(error = format!("{err:#}"), "upstream failure");
                INTERNAL_ERROR
            }
            Self::Render(err) => {
                tracing::error!(error = format!("{err:#}"), "failed to render posts");
                INTERNAL_ERROR
            }
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_hide_detail() {
        let resp = PostError::BadRequest("missing Body field".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = PostError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = PostError::PayloadTooLarge.into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn upstream_body_is_generic() {
        let resp = PostError::Upstream(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], INTERNAL_ERROR.as_bytes());
    }

    #[test]
    fn display_keeps_cause_chain() {
        let err = PostError::Render(anyhow::anyhow!("inner").context("outer"));
        assert_eq!(err.to_string(), "render failure: outer: inner");
    }
}
