use std::error::Error as StdError;
use std::io;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid URL scheme: {0}")]
    InvalidUrlScheme(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Domain is blocked: {0}")]
    DomainBlocked(String),

    #[error("Domain is not in the allow list: {0}")]
    DomainNotAllowed(String),

    #[error("Localhost URLs are not allowed")]
    LocalhostBlocked,

    #[error("Private IP address is not allowed: {0}")]
    PrivateIpBlocked(String),

    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    #[error("DNS resolution failed: {0}")]
    DnsError(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Connection failed: {0}")]
    ConnectionError(String),

    #[error("Request timeout: {0}")]
    TimeoutError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Client error ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl PreviewError {
    /// Classifies a transport error into the network error taxonomy.
    ///
    /// reqwest wraps hyper, which wraps the resolver and the socket, so the
    /// interesting cause is usually a few levels down the source chain.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = err.to_string();

        if err.is_timeout() {
            return PreviewError::TimeoutError(message);
        }

        let mut source = err.source();
        while let Some(cause) = source {
            // raised by the redirect policy while checking a hop
            if let Some(rejected) = cause.downcast_ref::<PreviewError>() {
                return rejected.redirect_rejection(message);
            }
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionRefused => {
                        return PreviewError::ConnectionRefused(message)
                    }
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                        return PreviewError::ConnectionReset(message)
                    }
                    io::ErrorKind::TimedOut => return PreviewError::TimeoutError(message),
                    _ => {}
                }
            }
            let text = cause.to_string().to_lowercase();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return PreviewError::DnsError(message);
            }
            source = cause.source();
        }

        if err.is_connect() {
            PreviewError::ConnectionError(message)
        } else {
            PreviewError::FetchError(message)
        }
    }

    fn redirect_rejection(&self, message: String) -> Self {
        match self {
            PreviewError::UrlParseError(e) => PreviewError::UrlParseError(*e),
            PreviewError::InvalidUrlScheme(s) => PreviewError::InvalidUrlScheme(s.clone()),
            PreviewError::InvalidUrl(s) => PreviewError::InvalidUrl(s.clone()),
            PreviewError::DomainBlocked(s) => PreviewError::DomainBlocked(s.clone()),
            PreviewError::DomainNotAllowed(s) => PreviewError::DomainNotAllowed(s.clone()),
            PreviewError::LocalhostBlocked => PreviewError::LocalhostBlocked,
            PreviewError::PrivateIpBlocked(s) => PreviewError::PrivateIpBlocked(s.clone()),
            PreviewError::TooManyRedirects(limit) => PreviewError::TooManyRedirects(*limit),
            _ => PreviewError::FetchError(message),
        }
    }

    /// Maps a non-success HTTP status of the final response.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let code = status.as_u16();
        let reason = status.canonical_reason().unwrap_or("unknown status");
        match code {
            404 => PreviewError::NotFound(format!("{url} not found")),
            400..=499 => PreviewError::ClientError {
                status: code,
                message: format!("{reason} for {url}"),
            },
            500..=599 => PreviewError::ServerError {
                status: code,
                message: format!("{reason} for {url}"),
            },
            _ => PreviewError::FetchError(format!("unexpected status {code} for {url}")),
        }
    }

    pub fn log(&self) {
        match self {
            PreviewError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::InvalidUrlScheme(_)
            | PreviewError::InvalidUrl(_)
            | PreviewError::DomainBlocked(_)
            | PreviewError::DomainNotAllowed(_)
            | PreviewError::LocalhostBlocked
            | PreviewError::PrivateIpBlocked(_) => {
                warn!(error = %self, "URL rejected by validation");
            }
            PreviewError::TooManyRedirects(limit) => {
                warn!(limit, "Redirect limit reached");
            }
            PreviewError::DnsError(e) => {
                warn!(error = %e, "DNS lookup failed");
            }
            PreviewError::ConnectionRefused(e)
            | PreviewError::ConnectionReset(e)
            | PreviewError::ConnectionError(e) => {
                warn!(error = %e, "Connection failed");
            }
            PreviewError::TimeoutError(e) => {
                warn!(error = %e, "Request timed out");
            }
            PreviewError::NotFound(e) => {
                warn!(error = %e, "Resource not found");
            }
            PreviewError::ClientError { status, message } => {
                warn!(status = %status, error = %message, "Client error response");
            }
            PreviewError::ServerError { status, message } => {
                error!(status = %status, error = %message, "Server error response");
            }
            PreviewError::FetchError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::IoError(e) => {
                error!(error = %e, "Failed to spool attachment");
            }
        }
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(err: reqwest::Error) -> Self {
        PreviewError::from_reqwest(err)
    }
}
