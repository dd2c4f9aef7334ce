use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use std::path::PathBuf;

/// Application name used for the cache directory
const APP_NAME: &str = "mojo-session";

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

/// Mojo session client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend API base URL
    #[arg(
        short = 'u',
        long,
        env = "API_BASE_URL",
        default_value = "http://localhost:8000/api"
    )]
    pub base_url: String,

    /// Login endpoint path, relative to the base URL
    #[arg(long, env = "LOGIN_PATH", default_value = "/login")]
    pub login_path: String,

    /// Token refresh endpoint path; without it every expiry is a logout
    #[arg(long, env = "REFRESH_PATH")]
    pub refresh_path: Option<String>,

    /// Where the session credential is persisted
    #[arg(short = 's', long, env = "SESSION_FILE")]
    pub session_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and persist the session
    Login {
        /// Account email (prompted if omitted)
        #[arg(short, long, env = "LOGIN_EMAIL")]
        email: Option<String>,
    },

    /// End the current session
    Logout,

    /// Show whether a session is active
    Status,

    /// Show the authenticated user
    Whoami,

    /// Send an authenticated request
    Request {
        /// HTTP method
        method: String,

        /// Path relative to the base URL, or an absolute URL
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Extra header as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub base_url: Url,
    pub login_path: String,
    pub refresh_path: Option<String>,

    // Session persistence
    pub session_file: PathBuf,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let base_url = Url::parse(&args.base_url)
            .with_context(|| format!("API_BASE_URL is not a valid URL: {}", args.base_url))?;

        let session_file = match args.session_file {
            Some(path) => expand_tilde(&path),
            None => default_session_file()?,
        };

        Ok(Config {
            base_url,
            login_path: args.login_path,
            refresh_path: args.refresh_path.filter(|p| !p.trim().is_empty()),
            session_file,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!("API_BASE_URL must use http or https, got: {}", other),
        }

        if self.login_path.trim().is_empty() {
            anyhow::bail!("LOGIN_PATH cannot be empty");
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }

    /// Resolved login endpoint
    pub fn login_url(&self) -> Result<Url> {
        join_url(&self.base_url, &self.login_path)
    }

    /// Resolved refresh endpoint, if the backend offers one
    pub fn refresh_url(&self) -> Result<Option<Url>> {
        self.refresh_path
            .as_deref()
            .map(|path| join_url(&self.base_url, path))
            .transpose()
    }
}

/// Resolve `path` against the API base URL.
///
/// Unlike [`Url::join`], the last segment of the base is kept, so
/// `https://host/api` + `/rates` is `https://host/api/rates`. Absolute URLs
/// are returned as-is.
pub fn join_url(base: &Url, path: &str) -> Result<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).with_context(|| format!("Invalid URL: {}", path));
    }

    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).with_context(|| format!("Invalid URL: {}", joined))
}

/// Parse a "Name: value" header argument
pub fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("Header must look like \"Name: value\", got: {}", raw))?;

    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("Invalid header name: {}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("Invalid value for header {}", name))?;

    Ok((name, value))
}

/// Default session file in the user cache directory
fn default_session_file() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("Could not find cache directory")?;
    Ok(cache_dir.join(APP_NAME).join(SESSION_FILE))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
