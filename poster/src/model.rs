use bytes::Bytes;
use url::Url;

/// A persisted post. Media URLs are listed in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub body: String,
    pub media: Vec<Url>,
    pub created_at: i64,
}

/// A post whose media has been fully resolved to hosted URLs.
///
/// This is the only shape a store accepts, so unresolved attachments
/// can never reach persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    body: String,
    media: Vec<Url>,
}

impl NewPost {
    pub fn new(body: impl Into<String>, media: Vec<Url>) -> Self {
        Self {
            body: body.into(),
            media,
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn media(&self) -> &[Url] {
        &self.media
    }

    /// Attach store-assigned identity.
    pub fn into_post(self, id: i64, created_at: i64) -> Post {
        Post {
            id,
            body: self.body,
            media: self.media,
            created_at,
        }
    }
}

/// A parsed submission whose attachments still live in memory.
#[derive(Debug, Clone)]
pub struct PostCandidate {
    pub body: String,
    pub media: Vec<MediaItem>,
}

/// One attachment as received.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub bytes: Bytes,
    pub content_type: String,
}
