use crate::{
    auth::{self, SignatureProvider, TwilioSignature},
    config::Config,
    error::PostError,
    form, limit,
    media::{self, ImgurHost, MediaHost},
    pagination,
    render::{HtmlRenderer, Renderer},
    store::{PostStore, SqliteStore},
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, Request, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, warn, Level};

pub const NOT_FOUND_BODY: &str = "nothing to see here";

/// Everything a request handler needs. Built once at start-up and never
/// mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signer: Arc<dyn SignatureProvider>,
    pub media: Arc<dyn MediaHost>,
    pub store: Arc<dyn PostStore>,
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    /// Wire up the production collaborators described by `config`.
    pub fn new(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.database_path)?;
        Ok(Self {
            signer: Arc::new(TwilioSignature::new(config.auth_token.clone())),
            media: Arc::new(ImgurHost::new(config.imgur_client_id.clone())),
            store: Arc::new(store),
            renderer: Arc::new(HtmlRenderer::default()),
            config: Arc::new(config),
        })
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/posts", get(get_posts).post(create_post))
        .fallback(go_away)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/posts")])
}

async fn go_away() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

async fn get_posts(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Html<String>, PostError> {
    render_page(&state, pagination::page_from_query(query.as_deref())).await
}

async fn render_page(state: &AppState, page: u64) -> Result<Html<String>, PostError> {
    let listing = pagination::load(state.store.as_ref(), page, state.config.page_size).await?;
    debug!(page, posts = listing.posts.len(), "loaded posts");
    let html = state
        .renderer
        .render(&listing.posts, listing.nav)
        .map_err(PostError::Render)?;
    Ok(Html(html))
}

/// Accept a post from the allowed sender, then show the listing it landed in.
async fn create_post(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Html<String>, PostError> {
    let (parts, body) = request.into_parts();
    let bytes = limit::read_body(&parts.headers, body, state.config.body_limit_bytes).await?;
    if state.config.verbose {
        debug!(body = %String::from_utf8_lossy(&bytes), "request body");
    }

    let url = auth::request_url(state.config.public_url.as_deref(), &parts.headers, &parts.uri);
    auth::authorize(
        state.signer.as_ref(),
        &state.config.allowed_sender,
        url.as_deref(),
        &parts.headers,
        &bytes,
    )
    .await?;

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let candidate = form::parse_post(content_type, bytes).await?;
    let post = media::upload_media(state.media.as_ref(), candidate).await?;

    let hosted: Vec<String> = post.media().iter().map(|u| u.to_string()).collect();
    let stored = match state.store.put(post).await {
        Ok(stored) => stored,
        Err(err) => {
            if !hosted.is_empty() {
                warn!(orphaned = ?hosted, "post not saved, hosted media left behind");
            }
            return Err(PostError::Upstream(err.context("failed to save post")));
        }
    };
    info!(id = stored.id, media = hosted.len(), "created post");

    render_page(&state, pagination::page_from_query(parts.uri.query())).await
}

/// Run the HTTP server bound to the configured address.
pub async fn run_http_server(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.bind.parse()?;
    info!(
        addr = %addr,
        page_size = state.config.page_size,
        body_limit_bytes = state.config.body_limit_bytes,
        "serving posts"
    );
    if state.config.public_url.is_none() {
        warn!("no public url configured, signatures are checked against the Host header");
    }
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}
