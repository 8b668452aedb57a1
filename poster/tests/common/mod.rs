#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use poster::{
    api::{build_router, AppState},
    auth::{body_hash, TwilioSignature, BODY_HASH_PARAM, SIGNATURE_HEADER},
    config::Config,
    media::MediaHost,
    render::HtmlRenderer,
    store::{MemoryStore, PostStore},
};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::Url;

pub const TOKEN: &str = "twilio-auth-token";
pub const SENDER: &str = "+15550001111";
pub const BOUNDARY: &str = "poster-test-boundary";

/// Media host double: hands out sequential URLs and remembers every upload.
#[derive(Default)]
pub struct FakeHost {
    pub fail_at: Option<usize>,
    pub uploads: Mutex<Vec<(Vec<u8>, String)>>,
}

impl FakeHost {
    pub fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.uploads.lock().len()
    }
}

#[async_trait]
impl MediaHost for FakeHost {
    async fn upload(&self, bytes: Bytes, content_type: &str) -> anyhow::Result<Url> {
        let mut uploads = self.uploads.lock();
        let n = uploads.len();
        uploads.push((bytes.to_vec(), content_type.to_string()));
        if self.fail_at == Some(n) {
            anyhow::bail!("media host unavailable");
        }
        Ok(Url::parse(&format!("https://media.test/{n}"))?)
    }
}

pub struct Harness {
    pub addr: SocketAddr,
    pub server: JoinHandle<()>,
    pub store: Arc<dyn PostStore>,
    pub memory: Option<Arc<MemoryStore>>,
    pub host: Arc<FakeHost>,
}

impl Harness {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn stored(&self) -> usize {
        self.memory.as_ref().map(|m| m.len()).unwrap_or_default()
    }
}

pub fn test_config(addr: SocketAddr) -> Config {
    Config {
        bind: addr.to_string(),
        public_url: None,
        allowed_sender: SENDER.into(),
        auth_token: TOKEN.into(),
        imgur_client_id: "unused".into(),
        database_path: PathBuf::from(":memory:"),
        page_size: 10,
        body_limit_bytes: 32 * 1024,
        verbose: true,
    }
}

pub async fn spawn_with(
    tweak: impl FnOnce(&mut Config),
    host: FakeHost,
    store: Option<Arc<dyn PostStore>>,
) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let mut config = test_config(addr);
    tweak(&mut config);
    let host = Arc::new(host);
    let (store, memory): (Arc<dyn PostStore>, _) = match store {
        Some(store) => (store, None),
        None => {
            let memory = Arc::new(MemoryStore::new());
            (memory.clone(), Some(memory))
        }
    };
    let state = AppState {
        signer: Arc::new(TwilioSignature::new(config.auth_token.clone())),
        media: host.clone(),
        store: store.clone(),
        renderer: Arc::new(HtmlRenderer::default()),
        config: Arc::new(config),
    };
    let app = build_router(state);
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    Harness {
        addr,
        server,
        store,
        memory,
        host,
    }
}

pub async fn spawn_server() -> Harness {
    spawn_with(|_| {}, FakeHost::default(), None).await
}

/// A request ready to send: target URL, content type, body and signature.
pub struct Signed {
    pub url: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub signature: String,
}

impl Signed {
    pub async fn send(&self, client: &reqwest::Client) -> reqwest::Response {
        client
            .post(&self.url)
            .header("content-type", &self.content_type)
            .header(SIGNATURE_HEADER, &self.signature)
            .body(self.body.clone())
            .send()
            .await
            .unwrap()
    }
}

pub fn signed_urlencoded(base: &str, pairs: &[(&str, &str)], token: &str) -> Signed {
    let url = format!("{base}/posts");
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    let params: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let signature = TwilioSignature::new(token).sign(&url, &params).unwrap();
    Signed {
        url,
        content_type: "application/x-www-form-urlencoded".into(),
        body: ser.finish().into_bytes(),
        signature,
    }
}

/// Build a multipart body by hand so its hash can be signed before sending.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in fields {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (file_name, content_type, data) in files {
        out.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"media\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(data);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

pub fn signed_multipart(
    base: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &str, &[u8])],
    token: &str,
) -> Signed {
    let body = multipart_body(fields, files);
    let url = format!("{base}/posts?{BODY_HASH_PARAM}={}", body_hash(&body));
    let signature = TwilioSignature::new(token).sign(&url, &[]).unwrap();
    Signed {
        url,
        content_type: format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
        signature,
    }
}
