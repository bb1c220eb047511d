use unicode_width::UnicodeWidthChar;

/// Safely truncate a string, ensuring it is not truncated in the middle of multi-byte characters
///
/// This function will:
/// 1. Correctly handle Unicode characters (including Chinese, emoji, etc.)
/// 2. Add ellipsis when maximum length is reached
/// 3. Ensure the output string's display width does not exceed the specified length
#[cfg_attr(not(feature = "logging"), allow(dead_code))]
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthStr;

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + 3 > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str("...");
    result
}

/// Human readable size with binary units, e.g. `15.0MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1024.0 {
            return format!("{num:.1}{unit}B");
        }
        num /= 1024.0;
    }
    format!("{num:.1}YiB")
}

/// The content-type without parameters, e.g. `text/html` for
/// `text/html; charset=utf-8`. Empty when the header was missing.
pub fn primary_content_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Value of the `charset` parameter of a content-type header, if any.
pub fn content_type_charset(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Scheme and authority of `url`, without a trailing slash.
///
/// `https://example.com/a/b.html` gives `https://example.com`.
pub fn page_root(url: &str) -> &str {
    match path_start(url) {
        Some(index) => &url[..index],
        None => url,
    }
}

/// Directory of the page `url` points at, without a trailing slash.
///
/// `https://example.com/a/b.html` gives `https://example.com/a`. A URL with
/// no path at all is its own base.
pub fn page_base(url: &str) -> &str {
    match path_start(url) {
        Some(_) => url.rsplit_once('/').map(|(base, _)| base).unwrap_or(url),
        None => url,
    }
}

fn path_start(url: &str) -> Option<usize> {
    let authority = url.find("://").map(|i| i + 3).unwrap_or(0);
    url[authority..].find('/').map(|i| i + authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("Hello, world!", 10), "Hello, ...");
        assert_eq!(truncate_str("你好，世界！", 8), "你好...");
        assert_eq!(truncate_str("Hello 你好！", 10), "Hello ...");
        assert_eq!(truncate_str("Hi!", 10), "Hi!");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0B");
        assert_eq!(format_size(1023), "1023.0B");
        assert_eq!(format_size(1024), "1.0KiB");
        assert_eq!(format_size(1536), "1.5KiB");
        assert_eq!(format_size(15 * 1024 * 1024), "15.0MiB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0GiB");
    }

    #[test]
    fn test_primary_content_type() {
        assert_eq!(primary_content_type("text/html; charset=utf-8"), "text/html");
        assert_eq!(primary_content_type("image/png"), "image/png");
        assert_eq!(primary_content_type(""), "");
    }

    #[test]
    fn test_content_type_charset() {
        assert_eq!(
            content_type_charset("text/html; charset=ISO-8859-1"),
            Some("ISO-8859-1")
        );
        assert_eq!(
            content_type_charset("text/html;Charset=\"utf-8\""),
            Some("utf-8")
        );
        assert_eq!(content_type_charset("text/html"), None);
    }

    #[test]
    fn test_page_root_and_base() {
        let url = "https://example.com/a/b.html";
        assert_eq!(page_root(url), "https://example.com");
        assert_eq!(page_base(url), "https://example.com/a");

        assert_eq!(page_root("https://example.com/"), "https://example.com");
        assert_eq!(page_base("https://example.com/"), "https://example.com");

        assert_eq!(page_root("https://example.com"), "https://example.com");
        assert_eq!(page_base("https://example.com"), "https://example.com");

        assert_eq!(
            page_base("http://example.com:8080/dir/sub/?q=a/b"),
            "http://example.com:8080/dir/sub/?q=a"
        );
    }
}
