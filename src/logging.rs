use crate::utils::truncate_str;
use crate::PreviewReply;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Debug)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub log_level: String,
    pub console_output: bool,
    pub file_output: bool,
    /// Show timestamps on console lines.
    pub show_time: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            log_level: "info".into(),
            console_output: true,
            file_output: false,
            show_time: true,
        }
    }
}

fn create_separator(width: usize, ch: char) -> String {
    std::iter::repeat_n(ch, width).collect()
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut wrapped = String::new();
    let mut line_length = 0;

    for word in text.split_whitespace() {
        if line_length + word.len() + 1 > width {
            wrapped.push('\n');
            wrapped.push_str("  ");
            wrapped.push_str(word);
            line_length = word.len() + 2;
        } else {
            if line_length > 0 {
                wrapped.push(' ');
                line_length += 1;
            }
            wrapped.push_str(word);
            line_length += word.len();
        }
    }
    wrapped
}

pub fn log_preview_card(reply: &PreviewReply, url: &str) {
    const CARD_WIDTH: usize = 80;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 2;

    let (kind, detail) = match reply {
        PreviewReply::TooLarge {
            content_type_label,
            size_label,
        } => (
            "too large",
            format!("{content_type_label}, more than {size_label}"),
        ),
        PreviewReply::HtmlPreview {
            title,
            sanitized_html,
            ..
        } => ("html", format!("{title} ({} bytes)", sanitized_html.len())),
        PreviewReply::FileAttachment(attachment) => (
            "file",
            format!(
                "{} ({})",
                attachment.path().display(),
                if attachment.extension().is_empty() {
                    "no extension"
                } else {
                    attachment.extension()
                }
            ),
        ),
    };

    let horizontal_line = "═".repeat(CARD_WIDTH - 2);

    info!(
        "\n╔{}╗\n\
         URL: {}\n\
         Kind: {}\n\
         Detail: {}\n\
         ╚{}╝",
        horizontal_line,
        wrap_text(url, CONTENT_WIDTH - 5),
        kind,
        wrap_text(&detail, CONTENT_WIDTH - 8),
        horizontal_line,
    );
}

pub fn log_error_card<E: Display + std::error::Error>(url: &str, error: &E) {
    const CARD_WIDTH: usize = 70;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 8;

    let top_bottom = create_separator(CARD_WIDTH - 2, '═');
    let middle = create_separator(CARD_WIDTH - 2, '─');

    let mut error_details = error.to_string();
    if let Some(source) = error.source() {
        error_details = format!("{error_details} (cause: {source})");
    }

    error!(
        "\n╔═{}═╗\n\
         ║ URL: {:<width$} ║\n\
         ║{}║\n\
         ║ Error: {:<width$} ║\n\
         ╚═{}═╝",
        top_bottom,
        truncate_str(url, CONTENT_WIDTH),
        middle,
        truncate_str(&error_details, CONTENT_WIDTH),
        top_bottom,
        width = CONTENT_WIDTH
    );
}

/// Installs the global subscriber: console and/or a daily rolling file.
/// `RUST_LOG` overrides `log_level` when set.
pub fn setup_logging(config: LogConfig) -> io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers = Vec::new();

    if config.console_output {
        let console_layer = subscriber_fmt::layer()
            .with_target(false)
            .with_thread_ids(false);
        if config.show_time {
            layers.push(console_layer.boxed());
        } else {
            layers.push(console_layer.without_time().boxed());
        }
    }

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir)?;

        let file_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "instantview.log");

        let file_layer = subscriber_fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_writer(file_appender);

        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(io::Error::other)?;

    debug!("Logging system initialized with config: {:?}", config);
    Ok(())
}

pub struct LogLevelGuard {
    _guard: tracing::dispatcher::DefaultGuard,
}

impl LogLevelGuard {
    pub fn set_level(level: &str) -> Self {
        let filter = EnvFilter::new(level);
        let subscriber = tracing_subscriber::registry()
            .with(subscriber_fmt::layer())
            .with(filter);

        LogLevelGuard {
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("short line", 80), "short line");
        assert_eq!(wrap_text("aaa bbb ccc", 7), "aaa bbb\n  ccc");
    }

    #[test]
    fn test_cards_do_not_panic() {
        let _guard = LogLevelGuard::set_level("info");
        let reply = PreviewReply::TooLarge {
            content_type_label: "-".into(),
            size_label: "15.0MiB".into(),
        };
        log_preview_card(&reply, "https://example.com/huge.iso");
        log_error_card(
            "https://example.com",
            &crate::PreviewError::TimeoutError("operation timed out".into()),
        );
    }
}
