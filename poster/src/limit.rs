use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use http_body::{LengthLimitError, Limited};

use crate::error::PostError;

/// Read a request body into memory, refusing anything over `limit` bytes.
///
/// A declared `Content-Length` over the limit is refused before reading.
/// Otherwise the stream is cut off as soon as the limit is crossed.
pub async fn read_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, PostError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if matches!(declared, Some(len) if len > limit as u64) {
        return Err(PostError::PayloadTooLarge);
    }

    match hyper::body::to_bytes(Limited::new(body, limit)).await {
        Ok(bytes) => Ok(bytes),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(PostError::PayloadTooLarge)
        }
        Err(err) => Err(PostError::BadRequest(format!("unable to read body: {err}"))),
    }
}
