use crate::{
    Fetcher, FetcherConfig, HtmlSanitizer, PreviewError, PreviewGenerator, PreviewReply,
    PreviewRequest, QuotedReply, UrlExtractor, UrlPreviewGenerator, UrlValidationConfig,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// PreviewService is the entry point for the messaging layer.
///
/// It owns one HTTP client, built once from [`PreviewServiceConfig`], and is
/// cheap to clone into concurrent message handlers. Nothing else is shared
/// between requests.
#[derive(Clone)]
pub struct PreviewService {
    extractor: UrlExtractor,
    pub generator: Arc<UrlPreviewGenerator>,
}

#[derive(Debug, Clone, Default)]
pub struct PreviewServiceConfig {
    pub fetcher_config: FetcherConfig,
    /// Prepended to the URL in the body of every deep-link.
    pub link_prefix: String,
}

impl PreviewServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetcher_config(mut self, fetcher_config: FetcherConfig) -> Self {
        self.fetcher_config = fetcher_config;
        self
    }

    pub fn with_url_validation(mut self, url_validation: UrlValidationConfig) -> Self {
        self.fetcher_config.url_validation = url_validation;
        self
    }

    pub fn with_link_prefix(mut self, link_prefix: impl Into<String>) -> Self {
        self.link_prefix = link_prefix.into();
        self
    }
}

impl PreviewService {
    pub fn new() -> Result<Self, PreviewError> {
        Self::new_with_config(PreviewServiceConfig::default())
    }

    pub fn new_with_config(config: PreviewServiceConfig) -> Result<Self, PreviewError> {
        debug!(link_prefix = %config.link_prefix, "Initializing PreviewService");

        let fetcher = Fetcher::new_with_config(config.fetcher_config)?;
        let sanitizer = HtmlSanitizer::with_link_prefix(config.link_prefix);
        Ok(Self::with_generator(UrlPreviewGenerator::new_with_sanitizer(
            fetcher, sanitizer,
        )))
    }

    pub fn with_generator(generator: UrlPreviewGenerator) -> Self {
        Self {
            extractor: UrlExtractor::new(),
            generator: Arc::new(generator),
        }
    }

    pub fn extract_url(&self, text: &str) -> Option<String> {
        self.extractor.extract(text)
    }

    /// Finds the first URL in `text` and builds its preview.
    ///
    /// Returns `None` when the message has no URL and also when the preview
    /// failed; failures are logged here and never reach the caller, so one
    /// bad link cannot disturb other messages.
    #[instrument(level = "debug", skip(self, text))]
    pub async fn extract_and_preview(
        &self,
        text: &str,
        reply_address: &str,
    ) -> Option<PreviewReply> {
        let url = self.extract_url(text)?;
        match self.generate_preview(&url, reply_address).await {
            Ok(reply) => {
                info!(url = %url, kind = reply_kind(&reply), "Preview ready");
                Some(reply)
            }
            Err(e) => {
                e.log();
                None
            }
        }
    }

    /// Same as [`extract_and_preview`](Self::extract_and_preview) for a
    /// request that was already matched, keeping the id of the message to quote.
    pub async fn handle_request<Id>(
        &self,
        request: PreviewRequest<Id>,
        reply_address: &str,
    ) -> Option<QuotedReply<Id>> {
        let reply = self
            .extract_and_preview(&request.url, reply_address)
            .await?;
        Some(QuotedReply {
            quoted_message_id: request.source_message_id,
            reply,
        })
    }

    pub async fn generate_preview(
        &self,
        url: &str,
        reply_address: &str,
    ) -> Result<PreviewReply, PreviewError> {
        self.generator.generate_preview(url, reply_address).await
    }
}

fn reply_kind(reply: &PreviewReply) -> &'static str {
    match reply {
        PreviewReply::TooLarge { .. } => "too_large",
        PreviewReply::HtmlPreview { .. } => "html",
        PreviewReply::FileAttachment(_) => "file",
    }
}
