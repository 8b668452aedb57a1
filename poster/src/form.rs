//! Decoding of submitted forms.
//!
//! Bodies arrive fully buffered (see [`crate::limit`]), so the same bytes
//! can be decoded once for the signature check and again for ingestion.

use std::convert::Infallible;

use bytes::Bytes;
use multer::Multipart;

use crate::error::PostError;
use crate::model::{MediaItem, PostCandidate};

/// Name of the field carrying the post text.
pub const BODY_FIELD: &str = "Body";

const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";
const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    UrlEncoded,
    Multipart,
}

impl Encoding {
    pub fn from_content_type(content_type: Option<&str>) -> Option<Self> {
        let essence = content_type?
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            URLENCODED => Some(Self::UrlEncoded),
            MULTIPART => Some(Self::Multipart),
            _ => None,
        }
    }
}

/// One decoded form part.
#[derive(Debug, Clone)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// Decode a buffered form body into its parts, in wire order.
pub async fn decode(content_type: Option<&str>, body: Bytes) -> Result<Vec<Part>, PostError> {
    match (Encoding::from_content_type(content_type), content_type) {
        (Some(Encoding::UrlEncoded), _) => Ok(url::form_urlencoded::parse(&body)
            .map(|(name, value)| Part::Text {
                name: name.into_owned(),
                value: value.into_owned(),
            })
            .collect()),
        (Some(Encoding::Multipart), Some(ct)) => decode_multipart(ct, body).await,
        _ => Err(PostError::BadRequest(format!(
            "unsupported content type {:?}",
            content_type
        ))),
    }
}

/// The body was bounded by the limiter before it got here, so the parser
/// adds no size limit of its own.
async fn decode_multipart(content_type: &str, body: Bytes) -> Result<Vec<Part>, PostError> {
    let boundary =
        multer::parse_boundary(content_type).map_err(|e| PostError::BadRequest(e.to_string()))?;
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = Multipart::new(stream, boundary);

    let mut parts = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PostError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(|s| s.to_string()) {
            Some(file_name) => {
                let content_type = field.content_type().map(|m| m.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| PostError::BadRequest(e.to_string()))?;
                parts.push(Part::File {
                    name,
                    file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| PostError::BadRequest(e.to_string()))?;
                parts.push(Part::Text { name, value });
            }
        }
    }
    Ok(parts)
}

/// Text parameters of a form, in wire order. File parts are skipped.
pub fn text_params(parts: &[Part]) -> Vec<(String, String)> {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { name, value } => Some((name.clone(), value.clone())),
            Part::File { .. } => None,
        })
        .collect()
}

/// Parse a buffered body into a post candidate.
///
/// Either the whole form is valid and a candidate comes back, or a single
/// `BadRequest` does.
pub async fn parse_post(content_type: Option<&str>, body: Bytes) -> Result<PostCandidate, PostError> {
    let parts = decode(content_type, body).await?;

    let mut text = None;
    let mut media = Vec::new();
    for part in parts {
        match part {
            Part::Text { name, value } => {
                if name == BODY_FIELD && text.is_none() {
                    text = Some(value);
                }
            }
            Part::File {
                file_name,
                content_type,
                bytes,
                ..
            } => {
                if bytes.is_empty() {
                    return Err(PostError::BadRequest(format!(
                        "attachment {file_name:?} is empty"
                    )));
                }
                let content_type = resolve_content_type(content_type, &file_name, &bytes);
                media.push(MediaItem {
                    bytes,
                    content_type,
                });
            }
        }
    }

    let body = text.ok_or_else(|| PostError::BadRequest(format!("missing {BODY_FIELD} field")))?;
    if body.trim().is_empty() && media.is_empty() {
        return Err(PostError::BadRequest("empty post".into()));
    }
    Ok(PostCandidate { body, media })
}

fn resolve_content_type(declared: Option<String>, file_name: &str, bytes: &[u8]) -> String {
    declared
        .filter(|ct| ct != OCTET_STREAM)
        .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
        .or_else(|| infer::get(bytes).map(|t| t.mime_type().to_string()))
        .unwrap_or_else(|| OCTET_STREAM.into())
}
