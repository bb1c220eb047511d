//! Turns a fetched web page into markup that is safe to show in a chat
//! client's HTML viewer.
//!
//! Scripts, noscript blocks, hidden form controls and comments are dropped.
//! Links and resource URLs are made absolute against the page they came
//! from, and every `<a href>` is turned into a `mailto:` link back to the
//! bot, since the viewer cannot open web links itself.

use crate::utils::{page_base, page_root};
use ego_tree::NodeId;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use scraper::{Html, Node, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::form_urlencoded;

pub const UNTITLED_PAGE: &str = "Page without title";

// noscript content is raw text to the parser and would be written back unescaped
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script, noscript"));
static FORM_CONTROLS: LazyLock<Selector> = LazyLock::new(|| selector("button, input"));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static LINK_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    LINK_RULES
        .iter()
        .map(|rule| selector(&format!("{}[{}]", rule.tag, rule.attr)))
        .collect()
});

static HAS_SCHEME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+:").unwrap());
static META_CHARSET: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-z0-9_.:\-]+)"#).unwrap()
});

/// Attributes that get rewritten, with the prefixes that are left alone.
const LINK_RULES: [LinkRule; 4] = [
    LinkRule {
        tag: "a",
        attr: "href",
        keep: &["mailto:", "openpgp4fpr:", "#"],
    },
    LinkRule {
        tag: "img",
        attr: "src",
        keep: &["data:"],
    },
    LinkRule {
        tag: "source",
        attr: "src",
        keep: &["data:"],
    },
    LinkRule {
        tag: "link",
        attr: "href",
        keep: &[],
    },
];

struct LinkRule {
    tag: &'static str,
    attr: &'static str,
    keep: &'static [&'static str],
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPage {
    pub title: String,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct HtmlSanitizer {
    link_prefix: String,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text placed in front of every URL carried in a deep-link body.
    pub fn with_link_prefix(link_prefix: impl Into<String>) -> Self {
        Self {
            link_prefix: link_prefix.into(),
        }
    }

    /// Decodes a response body and sanitizes it. `content_type` is the raw
    /// header value and only consulted for its `charset` parameter.
    pub fn sanitize_bytes(
        &self,
        body: &[u8],
        content_type: &str,
        page_url: &str,
        bot_addr: &str,
    ) -> SanitizedPage {
        let html = decode_html(body, crate::utils::content_type_charset(content_type));
        self.sanitize(&html, page_url, bot_addr)
    }

    pub fn sanitize(&self, html: &str, page_url: &str, bot_addr: &str) -> SanitizedPage {
        let mut document = Html::parse_document(html);

        let removed = remove_unused_nodes(&mut document);
        let rewrites = self.rewrite_links(&document, page_url, bot_addr);
        let rewritten = rewrites.len();
        apply_rewrites(&mut document, rewrites);
        debug!(removed, rewritten, url = %page_url, "Sanitized HTML document");

        let title = document
            .select(&TITLE)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED_PAGE.to_string());

        SanitizedPage {
            title,
            html: document.html(),
        }
    }

    fn rewrite_links(
        &self,
        document: &Html,
        page_url: &str,
        bot_addr: &str,
    ) -> Vec<(NodeId, &'static str, String)> {
        let root = page_root(page_url);
        let base = page_base(page_url);
        let mut rewrites = Vec::new();

        for (rule, css) in LINK_RULES.iter().zip(LINK_SELECTORS.iter()) {
            for element in document.select(css) {
                let Some(value) = element.value().attr(rule.attr) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                let lower = value.to_lowercase();
                if rule.keep.iter().any(|prefix| lower.starts_with(prefix)) {
                    continue;
                }

                let mut target = resolve_url(value, root, base);
                if rule.tag == "a" {
                    target = self.deep_link(bot_addr, &target);
                }
                rewrites.push((element.id(), rule.attr, target));
            }
        }

        rewrites
    }

    /// `mailto:` link that asks the bot for a preview of `url`.
    pub fn deep_link(&self, bot_addr: &str, url: &str) -> String {
        let body: String =
            form_urlencoded::byte_serialize(format!("{}{}", self.link_prefix, url).as_bytes())
                .collect();
        format!("mailto:{bot_addr}?body={body}")
    }
}

/// Makes `value` absolute. `root` is scheme plus authority of the page,
/// `base` the page URL minus its last path segment.
pub fn resolve_url(value: &str, root: &str, base: &str) -> String {
    if value.starts_with("//") {
        let scheme = root.split(':').next().unwrap_or("https");
        format!("{scheme}:{value}")
    } else if value.starts_with('/') {
        format!("{root}{value}")
    } else if !HAS_SCHEME.is_match(value) {
        format!("{base}/{value}")
    } else {
        value.to_string()
    }
}

/// Picks the page encoding: byte order mark, then the header charset, then
/// a `<meta charset>` near the top of the document, then UTF-8.
pub fn decode_html(body: &[u8], header_charset: Option<&str>) -> String {
    let encoding = header_charset
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| {
            let head = &body[..body.len().min(1024)];
            META_CHARSET
                .captures(head)
                .and_then(|caps| caps.get(1))
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or(UTF_8);

    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

/// Detaches scripts, noscript, hidden controls and comments. Ids are
/// collected first, the tree is never changed while it is walked.
fn remove_unused_nodes(document: &mut Html) -> usize {
    let mut doomed: Vec<NodeId> = document.select(&SCRIPT).map(|el| el.id()).collect();
    doomed.extend(
        document
            .select(&FORM_CONTROLS)
            .filter(|el| el.value().attr("type") == Some("hidden"))
            .map(|el| el.id()),
    );
    doomed.extend(
        document
            .tree
            .root()
            .descendants()
            .filter(|node| node.value().is_comment())
            .map(|node| node.id()),
    );

    for id in &doomed {
        if let Some(mut node) = document.tree.get_mut(*id) {
            node.detach();
        }
    }
    doomed.len()
}

/// Stores the new attribute values in the tree itself, so the html5ever
/// serializer behind [`Html::html`] writes them out.
fn apply_rewrites(document: &mut Html, rewrites: Vec<(NodeId, &'static str, String)>) {
    for (id, attr, target) in rewrites {
        let Some(mut node) = document.tree.get_mut(id) else {
            continue;
        };
        if let Node::Element(element) = node.value() {
            if let Some(value) = element
                .attrs
                .iter_mut()
                .find_map(|(name, value)| {
                    (name.prefix.is_none() && &*name.local == attr).then_some(value)
                })
            {
                *value = target.as_str().into();
            }
        }
    }
}
