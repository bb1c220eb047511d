use crate::security::{ContentLimits, UrlValidationConfig, UrlValidator};
use crate::PreviewError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// User agent of a desktop Firefox, so sites serve the same markup a person would see.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:104.0) Gecko/20100101 Firefox/104.0";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a single GET, with the body held in memory up to the size cap.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL after redirects; relative links resolve against this one.
    pub final_url: String,
    pub status_ok: bool,
    /// Lower-cased `content-type` header, empty when missing.
    pub content_type: String,
    pub content_disposition: Option<String>,
    /// What the server claims in `content-length`. Informational only.
    pub declared_size: Option<u64>,
    pub body: Bytes,
    /// The body went past the cap and was discarded.
    pub truncated: bool,
}

/// Fetcher configuration, fixed for the lifetime of the client it builds.
///
/// # Examples
/// ```ignore
/// let fetcher = Fetcher::new_with_config(FetcherConfig {
///     user_agent: "my-bot/1.0".to_string(),
///     timeout: Duration::from_secs(5),
///     ..Default::default()
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub headers: Option<HeaderMap>,
    pub url_validation: UrlValidationConfig,
    pub content_limits: ContentLimits,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            headers: None,
            url_validation: UrlValidationConfig::default(),
            content_limits: ContentLimits::default(),
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    validator: UrlValidator,
    limits: ContentLimits,
}

impl Fetcher {
    pub fn new() -> Result<Self, PreviewError> {
        Self::new_with_config(FetcherConfig::default())
    }

    pub fn new_with_config(config: FetcherConfig) -> Result<Self, PreviewError> {
        let validator = UrlValidator::new(config.url_validation);
        let mut client_builder = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .redirect(validator.redirect_policy());

        if let Some(headers) = config.headers {
            client_builder = client_builder.default_headers(headers);
        }

        let client = client_builder.build().map_err(|e| {
            warn!(error = %e, "Failed to create HTTP client");
            PreviewError::FetchError(format!("Failed to initialize HTTP client: {e}"))
        })?;
        debug!("Fetcher initialized");

        Ok(Self::with_client(client, validator, config.content_limits))
    }

    /// Wraps a prebuilt client. Only the first URL is checked by `validator`
    /// unless the client was built with [`UrlValidator::redirect_policy`].
    pub fn with_client(client: Client, validator: UrlValidator, content_limits: ContentLimits) -> Self {
        Self {
            client,
            validator,
            limits: content_limits,
        }
    }

    pub fn limits(&self) -> &ContentLimits {
        &self.limits
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, PreviewError> {
        let url = self.validator.validate(url)?;
        debug!(url = %url, "Starting fetch request");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(PreviewError::from_reqwest)?;

        let final_url = response.url().to_string();
        let status = response.status();
        // a final 3xx without a usable Location is still a response to preview
        if status.is_client_error() || status.is_server_error() {
            return Err(PreviewError::from_status(status, &final_url));
        }
        if final_url != url.as_str() {
            debug!(from = %url, to = %final_url, "Followed redirect");
        }

        let headers = response.headers();
        let content_type = header_str(headers, CONTENT_TYPE)
            .unwrap_or_default()
            .to_lowercase();
        let content_disposition = header_str(headers, CONTENT_DISPOSITION);
        let declared_size = header_str(headers, CONTENT_LENGTH)
            .and_then(|value| value.trim().parse::<u64>().ok());

        let (body, truncated) = read_capped(
            response.bytes_stream(),
            self.limits.max_content_size,
            self.limits.chunk_size,
        )
        .await?;

        if truncated {
            warn!(
                url = %final_url,
                declared_size = ?declared_size,
                cap = self.limits.max_content_size,
                "Response body exceeds size cap"
            );
        } else {
            debug!(url = %final_url, content_length = body.len(), "Fetched response body");
        }

        Ok(FetchResult {
            final_url,
            status_ok: true,
            content_type,
            content_disposition,
            declared_size,
            body,
            truncated,
        })
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(&name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Accumulates a byte stream until it ends or grows past `cap`.
///
/// Only bytes actually received count toward the cap. On overflow the
/// partial body is dropped and the second value is `true`.
pub async fn read_capped<S, E>(
    stream: S,
    cap: usize,
    chunk_size: usize,
) -> Result<(Bytes, bool), PreviewError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<PreviewError>,
{
    let mut stream = std::pin::pin!(stream);
    let chunk_size = chunk_size.max(1);
    let mut body = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for slice in chunk.chunks(chunk_size) {
            if body.len() + slice.len() > cap {
                return Ok((Bytes::new(), true));
            }
            body.extend_from_slice(slice);
        }
    }

    Ok((body.freeze(), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(sizes: &[usize]) -> impl Stream<Item = Result<Bytes, PreviewError>> {
        let items: Vec<Result<Bytes, PreviewError>> = sizes
            .iter()
            .map(|&n| Ok(Bytes::from(vec![b'x'; n])))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn test_read_capped_under_cap() {
        let (body, truncated) = read_capped(chunks(&[10, 20, 30]), 100, 8).await.unwrap();
        assert!(!truncated);
        assert_eq!(body.len(), 60);
    }

    #[tokio::test]
    async fn test_read_capped_exactly_cap() {
        let (body, truncated) = read_capped(chunks(&[50, 50]), 100, 16).await.unwrap();
        assert!(!truncated);
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_read_capped_over_cap_mid_stream() {
        let cap = 15 * 1024 * 1024;
        // a server can announce any size; only the received bytes matter here
        let sizes = vec![1024 * 1024; 16];
        let (body, truncated) = read_capped(chunks(&sizes), cap, 100 * 1024).await.unwrap();
        assert!(truncated);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_read_capped_single_huge_chunk() {
        let (body, truncated) = read_capped(chunks(&[101]), 100, 1000).await.unwrap();
        assert!(truncated);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_read_capped_propagates_stream_error() {
        let items: Vec<Result<Bytes, PreviewError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(PreviewError::ConnectionReset("peer went away".into())),
        ];
        let result = read_capped(stream::iter(items), 100, 10).await;
        assert!(matches!(result, Err(PreviewError::ConnectionReset(_))));
    }

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.url_validation.max_redirects, 10);
        assert_eq!(config.content_limits.max_content_size, 15 * 1024 * 1024);
    }
}
