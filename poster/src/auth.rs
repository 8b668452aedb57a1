//! Write authorization.
//!
//! Every write must carry a webhook signature from the SMS provider and
//! name the single allowed sender. Anything short of that is rejected.

use axum::http::{header, HeaderMap, Uri};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::PostError;
use crate::form::{self, Encoding};

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";
pub const SENDER_PARAM: &str = "From";
pub const BODY_HASH_PARAM: &str = "bodySHA256";

/// Everything a provider may need to check a request.
pub struct SignedRequest<'a> {
    /// The full URL the sender requested.
    pub url: &'a str,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    pub encoding: Encoding,
    /// Text parameters of the form, in wire order.
    pub params: &'a [(String, String)],
}

impl SignedRequest<'_> {
    /// First value of the sender parameter, if any.
    pub fn sender(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == SENDER_PARAM)
            .map(|(_, v)| v.as_str())
    }
}

/// Checks that a request was signed by the upstream provider on behalf of
/// `allowed_sender`.
pub trait SignatureProvider: Send + Sync {
    fn validate(&self, request: &SignedRequest<'_>, allowed_sender: &str) -> bool;
}

/// Twilio webhook signatures: base64 HMAC-SHA1 of the URL plus the sorted
/// form parameters, keyed with the account auth token.
///
/// Bodies that are not urlencoded are signed through a `bodySHA256` query
/// parameter instead, and the signature covers the URL alone.
#[derive(Clone)]
pub struct TwilioSignature {
    auth_token: String,
}

impl TwilioSignature {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
        }
    }

    fn mac(&self, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
        let mut mac = HmacSha1::new_from_slice(self.auth_token.as_bytes()).ok()?;
        mac.update(url.as_bytes());
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();
        for (key, value) in sorted {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        Some(mac)
    }

    /// Compute the signature header value for a request.
    pub fn sign(&self, url: &str, params: &[(String, String)]) -> Option<String> {
        let mac = self.mac(url, params)?;
        Some(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Lowercase hex SHA-256 of a body, as carried in `bodySHA256`.
pub fn body_hash(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

fn body_hash_matches(url: &str, body: &[u8]) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let declared = parsed
        .query_pairs()
        .find(|(k, _)| k == BODY_HASH_PARAM)
        .map(|(_, v)| v.into_owned());
    match declared {
        Some(hash) => hash.eq_ignore_ascii_case(&body_hash(body)),
        None => false,
    }
}

impl SignatureProvider for TwilioSignature {
    fn validate(&self, request: &SignedRequest<'_>, allowed_sender: &str) -> bool {
        let provided = request
            .headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| STANDARD.decode(v.trim()).ok());
        let Some(provided) = provided else {
            debug!("missing or malformed signature header");
            return false;
        };

        let signed_params: &[(String, String)] = match request.encoding {
            Encoding::UrlEncoded => request.params,
            Encoding::Multipart => {
                if !body_hash_matches(request.url, request.body) {
                    debug!("body hash does not match");
                    return false;
                }
                &[]
            }
        };
        let Some(mac) = self.mac(request.url, signed_params) else {
            return false;
        };
        if mac.verify_slice(&provided).is_err() {
            debug!("signature mismatch");
            return false;
        }

        if request.sender() != Some(allowed_sender) {
            debug!("sender not allowed");
            return false;
        }
        true
    }
}

pub const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";

/// Scheme the client used, as reported by a TLS-terminating proxy.
/// Only `http` and `https` are believed; anything else means `http`.
fn forwarded_scheme(headers: &HeaderMap) -> &'static str {
    let proto = headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_ascii_lowercase());
    match proto.as_deref() {
        Some("https") => "https",
        _ => "http",
    }
}

/// Rebuild the URL the sender requested.
///
/// With a configured public base URL the path and query are appended to
/// it; otherwise the `Host` header is used, with the scheme taken from
/// `X-Forwarded-Proto`.
pub fn request_url(public_url: Option<&str>, headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    match public_url {
        Some(base) => Some(format!("{}{}", base.trim_end_matches('/'), path)),
        None => {
            let host = headers.get(header::HOST)?.to_str().ok()?;
            Some(format!("{}://{host}{path}", forwarded_scheme(headers)))
        }
    }
}

/// Gate a write request. Runs on the already size-limited body.
pub async fn authorize(
    provider: &dyn SignatureProvider,
    allowed_sender: &str,
    url: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<(), PostError> {
    let Some(url) = url else {
        debug!("unable to determine request url");
        return Err(PostError::Unauthorized);
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let Some(encoding) = Encoding::from_content_type(content_type) else {
        debug!("unsigned content type");
        return Err(PostError::Unauthorized);
    };
    let parts = form::decode(content_type, body.clone())
        .await
        .map_err(|_| PostError::Unauthorized)?;
    let params = form::text_params(&parts);

    let request = SignedRequest {
        url,
        headers,
        body,
        encoding,
        params: &params,
    };
    if provider.validate(&request, allowed_sender) {
        Ok(())
    } else {
        Err(PostError::Unauthorized)
    }
}
