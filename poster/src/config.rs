use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Command line options for the server.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Enable or disable verbose logging (true/false).
    #[arg(long)]
    pub verbose: Option<bool>,
    /// Path to the SQLite database holding posts.
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
///
/// Built once at start-up and shared read-only by every request.
#[derive(Clone)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// Externally visible base URL used when checking request signatures.
    pub public_url: Option<String>,
    /// The only sender allowed to publish.
    pub allowed_sender: String,
    /// Shared secret used by the signature provider.
    pub auth_token: String,
    /// Client id for the media host.
    pub imgur_client_id: String,
    /// Location of the post database.
    pub database_path: PathBuf,
    /// Number of posts shown per page.
    pub page_size: u32,
    /// Upper bound on request bodies, in bytes.
    pub body_limit_bytes: usize,
    /// Whether verbose logging is enabled.
    pub verbose: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("public_url", &self.public_url)
            .field("allowed_sender", &self.allowed_sender)
            .field("auth_token", &"<redacted>")
            .field("imgur_client_id", &"<redacted>")
            .field("database_path", &self.database_path)
            .field("page_size", &self.page_size)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("verbose", &self.verbose)
            .finish()
    }
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    posts: FilePosts,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    store: FileStore,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    public_url: Option<String>,
}

#[derive(Deserialize)]
struct FilePosts {
    #[serde(default = "default_page_size")]
    page_size: u32,
    #[serde(default = "default_body_limit")]
    body_limit_bytes: usize,
}

#[derive(Deserialize, Default)]
struct FileLogging {
    #[serde(default)]
    verbose: bool,
}

#[derive(Deserialize, Default)]
struct FileStore {
    #[serde(default)]
    path: Option<PathBuf>,
}

fn default_port() -> u16 {
    8080
}

fn default_page_size() -> u32 {
    10
}

/// 32 KiB.
pub fn default_body_limit() -> usize {
    32 * 1024
}

fn default_database() -> PathBuf {
    PathBuf::from("poster.db")
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_url: None,
        }
    }
}

impl Default for FilePosts {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!("env var {key} not set"),
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // built-in defaults
        let mut port = default_port();
        let mut public_url = None;
        let mut page_size = default_page_size();
        let mut body_limit_bytes = default_body_limit();
        let mut verbose = false;
        let mut database_path = default_database();

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("POSTER_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/poster.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            port = file_cfg.server.port;
            public_url = file_cfg.server.public_url;
            page_size = file_cfg.posts.page_size;
            body_limit_bytes = file_cfg.posts.body_limit_bytes;
            verbose = file_cfg.logging.verbose;
            if let Some(path) = file_cfg.store.path {
                database_path = path;
            }
        }

        // environment overrides
        if let Some(p) = env_parse::<u16>("POSTER_PORT") {
            port = p;
        }
        if let Ok(url) = std::env::var("PUBLIC_URL") {
            public_url = Some(url);
        }
        if let Some(n) = env_parse::<u32>("POSTER_PAGE_SIZE") {
            page_size = n;
        }
        if let Some(n) = env_parse::<usize>("POSTER_BODY_LIMIT") {
            body_limit_bytes = n;
        }
        if let Some(v) = env_parse::<bool>("POSTER_VERBOSE") {
            verbose = v;
        }
        if std::env::var("POSTER_ENV").as_deref() == Ok("DEV") {
            verbose = true;
        }
        if let Ok(path) = std::env::var("POSTER_DB") {
            database_path = PathBuf::from(path);
        }

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(v) = cli.verbose {
            verbose = v;
        }
        if let Some(path) = &cli.database {
            database_path = path.clone();
        }

        if port == 0 {
            anyhow::bail!("invalid_port");
        }
        if page_size == 0 {
            anyhow::bail!("page size must be at least 1");
        }
        if body_limit_bytes == 0 {
            anyhow::bail!("body limit must be at least 1 byte");
        }

        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("POSTER_BIND") {
            b
        } else {
            format!("0.0.0.0:{}", port)
        };

        Ok(Self {
            bind,
            public_url,
            allowed_sender: required_env("ALLOWED_SENDER")?,
            auth_token: required_env("TWILIO_AUTH_TOKEN")?,
            imgur_client_id: required_env("IMGUR_CLIENT_ID")?,
            database_path,
            page_size,
            body_limit_bytes,
            verbose,
        })
    }
}
