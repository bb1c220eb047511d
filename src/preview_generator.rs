use crate::fetcher::FetchResult;
use crate::utils::{format_size, primary_content_type};
use crate::{Attachment, Fetcher, HtmlSanitizer, PreviewError, PreviewGenerator, PreviewReply};
use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

/// Extensions for types where the first registered one is not the usual pick.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/javascript", "js"),
    ("application/octet-stream", "bin"),
    ("application/xml", "xml"),
    ("audio/mpeg", "mp3"),
    ("image/jpeg", "jpg"),
    ("image/svg+xml", "svg"),
    ("image/tiff", "tiff"),
    ("text/javascript", "js"),
    ("text/plain", "txt"),
    ("text/xml", "xml"),
    ("video/mp4", "mp4"),
    ("video/mpeg", "mpeg"),
];

/// Fetches a URL and turns the response into one [`PreviewReply`].
#[derive(Clone)]
pub struct UrlPreviewGenerator {
    pub fetcher: Fetcher,
    sanitizer: HtmlSanitizer,
}

impl UrlPreviewGenerator {
    pub fn new(fetcher: Fetcher) -> Self {
        Self::new_with_sanitizer(fetcher, HtmlSanitizer::new())
    }

    pub fn new_with_sanitizer(fetcher: Fetcher, sanitizer: HtmlSanitizer) -> Self {
        Self { fetcher, sanitizer }
    }

    /// Classifies a finished fetch. Oversized bodies become a notice, HTML
    /// is sanitized, anything else is written to a temporary file.
    pub async fn build_reply(
        &self,
        fetched: FetchResult,
        reply_address: &str,
    ) -> Result<PreviewReply, PreviewError> {
        if fetched.truncated {
            let content_type = primary_content_type(&fetched.content_type);
            return Ok(PreviewReply::TooLarge {
                content_type_label: if content_type.is_empty() {
                    "-".to_string()
                } else {
                    content_type.to_string()
                },
                size_label: format_size(self.fetcher.limits().max_content_size as u64),
            });
        }

        if fetched.content_type.contains("text/html") {
            let page = self.sanitizer.sanitize_bytes(
                &fetched.body,
                &fetched.content_type,
                &fetched.final_url,
                reply_address,
            );
            return Ok(PreviewReply::HtmlPreview {
                plain_text_fallback: page.title.clone(),
                title: page.title,
                sanitized_html: page.html,
            });
        }

        let extension = infer_extension(
            fetched.content_disposition.as_deref(),
            &fetched.final_url,
            &fetched.content_type,
        );
        let dir = tempfile::Builder::new().prefix("instantview").tempdir()?;
        let path = dir.path().join(format!("file{extension}"));
        tokio::fs::write(&path, &fetched.body).await?;
        debug!(
            path = %path.display(),
            size = fetched.body.len(),
            content_type = %fetched.content_type,
            "Spooled attachment"
        );

        Ok(PreviewReply::FileAttachment(Attachment::new(dir, path, extension)))
    }
}

#[async_trait]
impl PreviewGenerator for UrlPreviewGenerator {
    #[instrument(level = "debug", skip(self))]
    async fn generate_preview(
        &self,
        url: &str,
        reply_address: &str,
    ) -> Result<PreviewReply, PreviewError> {
        let fetched = self.fetcher.fetch(url).await?;
        self.build_reply(fetched, reply_address).await
    }
}

/// File extension (with leading dot) for a non-HTML download.
///
/// Tried in order: the `filename` of a `content-disposition` header, the
/// last segment of the URL path, the content-type. Empty if nothing fits.
pub fn infer_extension(
    content_disposition: Option<&str>,
    final_url: &str,
    content_type: &str,
) -> String {
    let from_name = content_disposition
        .and_then(parse_content_disposition_filename)
        .or_else(|| url_file_name(final_url))
        .and_then(|name| name.rsplit_once('.').and_then(|(_, ext)| clean_extension(ext)));
    if let Some(ext) = from_name {
        return format!(".{ext}");
    }

    let mime = primary_content_type(content_type).to_lowercase();
    extension_for_mime(&mime)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    if mime.is_empty() {
        return None;
    }
    PREFERRED_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied())
        })
}

/// Last path segment of `url` when it looks like a file name.
fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    last.contains('.').then(|| last.to_string())
}

/// Parse filename from Content-Disposition header value
fn parse_content_disposition_filename(value: &str) -> Option<String> {
    let patterns = ["filename=\"", "filename="];
    for pattern in patterns {
        if let Some(start) = value.find(pattern) {
            let rest = &value[start + pattern.len()..];
            if pattern.ends_with('"') {
                if let Some(end) = rest.find('"') {
                    return Some(rest[..end].to_string());
                }
            } else {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == ';')
                    .unwrap_or(rest.len());
                let filename = rest[..end].trim_matches('"');
                if !filename.is_empty() {
                    return Some(filename.to_string());
                }
            }
        }
    }
    None
}

/// Extensions end up in a file name, so only short alphanumeric ones pass.
fn clean_extension(ext: &str) -> Option<String> {
    let ok = !ext.is_empty()
        && ext.len() <= 16
        && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    ok.then(|| ext.to_string())
}
