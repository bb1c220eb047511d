use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

mod error;
mod extractor;
mod fetcher;
#[cfg(feature = "logging")]
mod logging;
mod preview_generator;
mod preview_service;
mod sanitizer;
mod security;
mod utils;

pub use error::PreviewError;
pub use extractor::UrlExtractor;
pub use fetcher::{read_capped, FetchResult, Fetcher, FetcherConfig, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_preview_card, setup_logging, LogConfig, LogLevelGuard};
pub use preview_generator::{infer_extension, UrlPreviewGenerator};
pub use preview_service::{PreviewService, PreviewServiceConfig};
pub use sanitizer::{decode_html, resolve_url, HtmlSanitizer, SanitizedPage, UNTITLED_PAGE};
pub use security::{ContentLimits, UrlValidationConfig, UrlValidator, CHUNK_SIZE, MAX_CONTENT_SIZE};
pub use utils::format_size;

/// Self-description a bot can send on `/help` or as its status line.
pub const HELP: &str = "I am a Delta Chat bot, send me any website URL to get a minimal preview. \
Example: https://delta.chat";

/// A URL found in an inbound message, tied to the message it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest<Id> {
    pub url: String,
    pub source_message_id: Id,
}

/// A reply ready for the messaging layer, quoting the message that asked for it.
#[derive(Debug)]
pub struct QuotedReply<Id> {
    pub quoted_message_id: Id,
    pub reply: PreviewReply,
}

/// What gets sent back for one URL.
#[derive(Debug)]
pub enum PreviewReply {
    /// The resource is bigger than the size cap; only a short notice is sent.
    TooLarge {
        content_type_label: String,
        size_label: String,
    },
    HtmlPreview {
        title: String,
        sanitized_html: String,
        plain_text_fallback: String,
    },
    FileAttachment(Attachment),
}

impl PreviewReply {
    /// Plain-text body of the reply message.
    pub fn text(&self) -> String {
        match self {
            PreviewReply::TooLarge {
                content_type_label,
                size_label,
            } => format!("Type: {content_type_label}\nSize: >{size_label}"),
            PreviewReply::HtmlPreview {
                plain_text_fallback,
                ..
            } => plain_text_fallback.clone(),
            PreviewReply::FileAttachment(_) => String::new(),
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            PreviewReply::HtmlPreview { sanitized_html, .. } => Some(sanitized_html),
            _ => None,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            PreviewReply::FileAttachment(attachment) => Some(attachment.path()),
            _ => None,
        }
    }
}

/// A downloaded file waiting to be attached.
///
/// The file lives in its own temporary directory, removed when the
/// attachment is dropped. Keep it alive until the message has been sent.
#[derive(Debug)]
pub struct Attachment {
    dir: TempDir,
    path: PathBuf,
    extension: String,
}

impl Attachment {
    pub(crate) fn new(dir: TempDir, path: PathBuf, extension: String) -> Self {
        Self {
            dir,
            path,
            extension,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension including the leading dot, or empty.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Removes the file now and reports any I/O failure, instead of relying on drop.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

#[async_trait]
pub trait PreviewGenerator {
    async fn generate_preview(
        &self,
        url: &str,
        reply_address: &str,
    ) -> Result<PreviewReply, PreviewError>;
}
