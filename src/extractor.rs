use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"http[s]?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*(),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+")
        .unwrap()
});

/// Finds the URL a chat message is asking about.
///
/// Only the first match is used. The pattern is deliberately loose, so a
/// malformed URL can come out of here; the fetch is what rejects it.
#[derive(Clone, Default)]
pub struct UrlExtractor;

impl UrlExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        let url = URL_RE.find(text).map(|m| m.as_str().to_string());
        debug!(found = url.is_some(), "Scanned message for URL");
        url
    }
}
