//! Which URLs the bot agrees to fetch, and how much of a body it keeps.
//!
//! A link in a chat message is untrusted input. Before the first request and
//! again on every redirect hop, the target must use an allowed scheme, pass
//! the domain lists and resolve to a public address when written as an IP.

use crate::error::PreviewError;
use reqwest::redirect;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;
use url::{Host, Url};

/// Largest body the bot will hold in memory or attach: 15 MiB.
pub const MAX_CONTENT_SIZE: usize = 15 * 1024 * 1024;

/// Slice size used while accumulating the response body: 100 KiB.
pub const CHUNK_SIZE: usize = 100 * 1024;

#[derive(Debug, Clone)]
pub struct UrlValidationConfig {
    /// Default: `http` and `https`.
    pub allowed_schemes: HashSet<String>,
    /// Refuse literal private, link-local and reserved addresses.
    pub block_private_ips: bool,
    /// Refuse `localhost`, `*.localhost` and loopback addresses.
    pub block_localhost: bool,
    /// Matched against the host and all its parent domains.
    pub blocked_domains: HashSet<String>,
    /// When not empty, only these domains (and their subdomains) are fetched
    /// and `blocked_domains` is not consulted.
    pub allowed_domains: HashSet<String>,
    /// Redirect hops followed before the fetch gives up.
    pub max_redirects: usize,
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            block_private_ips: true,
            block_localhost: true,
            blocked_domains: HashSet::new(),
            allowed_domains: HashSet::new(),
            max_redirects: 10,
        }
    }
}

impl UrlValidationConfig {
    /// Only the scheme check; for bots that must reach hosts on their own network.
    pub fn permissive() -> Self {
        Self {
            block_private_ips: false,
            block_localhost: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlValidator {
    config: UrlValidationConfig,
}

impl UrlValidator {
    pub fn new(config: UrlValidationConfig) -> Self {
        Self { config }
    }

    /// Parses `url_str` and applies [`check`](Self::check).
    pub fn validate(&self, url_str: &str) -> Result<Url, PreviewError> {
        let url = Url::parse(url_str)?;
        self.check(&url)?;
        Ok(url)
    }

    pub fn check(&self, url: &Url) -> Result<(), PreviewError> {
        if !self.config.allowed_schemes.contains(url.scheme()) {
            return Err(PreviewError::InvalidUrlScheme(url.scheme().to_string()));
        }

        let host = url
            .host()
            .ok_or_else(|| PreviewError::InvalidUrl(format!("{url} has no host")))?;

        if let Host::Domain(domain) = host {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if !self.config.allowed_domains.is_empty() {
                if !domain_matches(&domain, &self.config.allowed_domains) {
                    return Err(PreviewError::DomainNotAllowed(domain));
                }
            } else if domain_matches(&domain, &self.config.blocked_domains) {
                return Err(PreviewError::DomainBlocked(domain));
            }
            if self.config.block_localhost
                && (domain == "localhost" || domain.ends_with(".localhost"))
            {
                return Err(PreviewError::LocalhostBlocked);
            }
            return Ok(());
        }

        let ip = match host {
            Host::Ipv4(ip) => IpAddr::V4(ip),
            Host::Ipv6(ip) => IpAddr::V6(ip),
            Host::Domain(_) => return Ok(()),
        };
        if self.config.block_localhost && is_loopback(ip) {
            return Err(PreviewError::LocalhostBlocked);
        }
        if self.config.block_private_ips && is_internal_ip(ip) {
            return Err(PreviewError::PrivateIpBlocked(ip.to_string()));
        }
        Ok(())
    }

    /// Redirect policy for the HTTP client: each hop is checked like the
    /// first URL, and at most `max_redirects` hops are followed.
    pub fn redirect_policy(&self) -> redirect::Policy {
        let validator = self.clone();
        redirect::Policy::custom(move |attempt| {
            let limit = validator.config.max_redirects;
            if attempt.previous().len() > limit {
                return attempt.error(PreviewError::TooManyRedirects(limit));
            }
            match validator.check(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(e) => {
                    warn!(to = %attempt.url(), error = %e, "Redirect refused");
                    attempt.error(e)
                }
            }
        })
    }
}

fn domain_matches(domain: &str, list: &HashSet<String>) -> bool {
    list.iter().any(|entry| {
        domain
            .strip_suffix(entry.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.ends_with('.'))
    })
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

/// Addresses that never belong to a public web server.
fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        // 0.0.0.0/8
        || a == 0
        // 100.64.0.0/10, carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // multicast, reserved and broadcast
        || a >= 224
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fe80::/10
        || first & 0xffc0 == 0xfe80
        // fc00::/7
        || first & 0xfe00 == 0xfc00
        || ip.to_ipv4_mapped().is_some_and(is_internal_v4)
}

/// Content size limits applied while streaming a response body
#[derive(Debug, Clone)]
pub struct ContentLimits {
    pub max_content_size: usize,
    pub chunk_size: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            max_content_size: MAX_CONTENT_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_validator() -> UrlValidator {
        UrlValidator::new(UrlValidationConfig::default())
    }

    #[test]
    fn test_schemes_from_chat_links() {
        let validator = default_validator();

        assert!(validator.validate("https://delta.chat/en/").is_ok());
        assert!(validator.validate("http://example.com").is_ok());
        assert!(matches!(
            validator.validate("ftp://example.com"),
            Err(PreviewError::InvalidUrlScheme(_))
        ));
        assert!(matches!(
            validator.validate("file:///etc/passwd"),
            Err(PreviewError::InvalidUrlScheme(_))
        ));
    }

    #[test]
    fn test_loopback_in_every_spelling() {
        let validator = default_validator();

        for url in [
            "http://localhost/",
            "http://LOCALHOST./",
            "http://app.localhost/x",
            "http://127.0.0.1:8080/",
            "http://127.8.9.10/",
            "http://[::1]/",
            "http://[::ffff:127.0.0.1]/",
        ] {
            assert!(
                matches!(validator.validate(url), Err(PreviewError::LocalhostBlocked)),
                "{url} should be refused"
            );
        }
    }

    #[test]
    fn test_internal_ranges() {
        let validator = default_validator();

        for url in [
            "http://10.1.2.3/",
            "http://172.16.0.1/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://100.64.0.1/",
            "http://0.0.0.0/",
            "http://239.255.255.250/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:10.0.0.1]/",
        ] {
            assert!(
                matches!(validator.validate(url), Err(PreviewError::PrivateIpBlocked(_))),
                "{url} should be refused"
            );
        }
        assert!(validator.validate("http://93.184.216.34/").is_ok());
        assert!(validator.validate("http://100.128.0.1/").is_ok());
    }

    #[test]
    fn test_permissive_keeps_scheme_check() {
        let validator = UrlValidator::new(UrlValidationConfig::permissive());

        assert!(validator.validate("http://127.0.0.1:8080/page").is_ok());
        assert!(validator.validate("http://192.168.0.10/").is_ok());
        assert!(validator.validate("gopher://127.0.0.1").is_err());
    }

    #[test]
    fn test_domain_lists_match_on_label_boundaries() {
        let list: HashSet<String> = ["evil.com".to_string()].into();

        assert!(domain_matches("evil.com", &list));
        assert!(domain_matches("cdn.evil.com", &list));
        assert!(!domain_matches("notevil.com", &list));
        assert!(!domain_matches("evil.com.example", &list));
    }

    #[test]
    fn test_allow_list_overrides_block_list() {
        let mut config = UrlValidationConfig::default();
        config.allowed_domains.insert("delta.chat".to_string());
        config.blocked_domains.insert("delta.chat".to_string());
        let validator = UrlValidator::new(config);

        assert!(validator.validate("https://support.delta.chat/t/1").is_ok());
        assert!(matches!(
            validator.validate("https://example.org/"),
            Err(PreviewError::DomainNotAllowed(_))
        ));
    }

    #[test]
    fn test_content_limits_default() {
        let limits = ContentLimits::default();
        assert_eq!(limits.max_content_size, 15 * 1024 * 1024);
        assert_eq!(limits.chunk_size, 100 * 1024);
    }
}
