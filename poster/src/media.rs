use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::PostError;
use crate::model::{NewPost, PostCandidate};

pub const IMGUR_UPLOAD_URL: &str = "https://api.imgur.com/3/image";

/// An external host that keeps uploaded media at a permanent URL.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> Result<Url>;
}

/// Anonymous uploads to Imgur, authenticated by client id.
#[derive(Clone)]
pub struct ImgurHost {
    client: reqwest::Client,
    client_id: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct ImgurResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgurImage>,
}

#[derive(Deserialize)]
struct ImgurImage {
    link: Option<String>,
}

impl ImgurHost {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self::with_endpoint(client_id, IMGUR_UPLOAD_URL)
    }

    pub fn with_endpoint(client_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MediaHost for ImgurHost {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> Result<Url> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name("upload")
            .mime_str(content_type)
            .context("invalid media content type")?;
        let form = reqwest::multipart::Form::new().part("image", part);
        let resp = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Client-ID {}", self.client_id))
            .multipart(form)
            .send()
            .await
            .context("imgur request failed")?
            .error_for_status()
            .context("imgur rejected upload")?;
        let body: ImgurResponse = resp.json().await.context("invalid imgur response")?;
        if !body.success {
            return Err(anyhow!("imgur reported failure"));
        }
        let link = body
            .data
            .and_then(|d| d.link)
            .ok_or_else(|| anyhow!("imgur response has no link"))?;
        Url::parse(&link).with_context(|| format!("imgur returned bad link {link:?}"))
    }
}

/// Upload every attachment of `candidate`, in order, and swap each for
/// its hosted URL.
///
/// Stops at the first failure. Media already uploaded for this post stays
/// on the host.
pub async fn upload_media(
    host: &dyn MediaHost,
    candidate: PostCandidate,
) -> Result<NewPost, PostError> {
    let mut urls = Vec::with_capacity(candidate.media.len());
    for (index, item) in candidate.media.into_iter().enumerate() {
        match host.upload(item.bytes, &item.content_type).await {
            Ok(url) => {
                debug!(index, url = %url, "uploaded media");
                urls.push(url);
            }
            Err(err) => {
                if !urls.is_empty() {
                    let orphaned: Vec<&str> = urls.iter().map(Url::as_str).collect();
                    warn!(?orphaned, "leaving orphaned media after failed upload");
                }
                return Err(PostError::Upstream(
                    err.context(format!("failed to upload media item {index}")),
                ));
            }
        }
    }
    Ok(NewPost::new(candidate.body, urls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaItem;
    use parking_lot::Mutex;

    /// Hands out sequential URLs, failing on the configured call.
    struct ScriptedHost {
        fail_at: Option<usize>,
        seen: Mutex<Vec<(Bytes, String)>>,
    }

    #[async_trait]
    impl MediaHost for ScriptedHost {
        async fn upload(&self, bytes: Bytes, content_type: &str) -> Result<Url> {
            let mut seen = self.seen.lock();
            let n = seen.len();
            seen.push((bytes, content_type.to_string()));
            if self.fail_at == Some(n) {
                anyhow::bail!("host down");
            }
            Ok(Url::parse(&format!("https://media.test/{n}"))?)
        }
    }

    fn candidate(n: usize) -> PostCandidate {
        PostCandidate {
            body: "hi".into(),
            media: (0..n)
                .map(|i| MediaItem {
                    bytes: Bytes::from(vec![i as u8 + 1]),
                    content_type: "image/png".into(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn uploads_in_attachment_order() {
        let host = ScriptedHost {
            fail_at: None,
            seen: Mutex::new(Vec::new()),
        };
        let post = upload_media(&host, candidate(3)).await.unwrap();
        let urls: Vec<&str> = post.media().iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://media.test/0",
                "https://media.test/1",
                "https://media.test/2"
            ]
        );
        let seen = host.seen.lock();
        let firsts: Vec<u8> = seen.iter().map(|(b, _)| b[0]).collect();
        assert_eq!(firsts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let host = ScriptedHost {
            fail_at: Some(1),
            seen: Mutex::new(Vec::new()),
        };
        let err = upload_media(&host, candidate(3)).await.unwrap_err();
        assert!(matches!(err, PostError::Upstream(_)));
        assert_eq!(host.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn text_only_post_needs_no_host_calls() {
        let host = ScriptedHost {
            fail_at: Some(0),
            seen: Mutex::new(Vec::new()),
        };
        let post = upload_media(&host, candidate(0)).await.unwrap();
        assert!(post.media().is_empty());
        assert_eq!(post.body(), "hi");
    }
}
