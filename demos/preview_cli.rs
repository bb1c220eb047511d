use clap::{Arg, ArgAction, Command};
use colored::Colorize;
use instantview::{
    log_error_card, log_preview_card, setup_logging, LogConfig, PreviewReply, PreviewService,
    PreviewServiceConfig, UrlValidationConfig, HELP,
};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("instantview preview")
        .version("0.1")
        .about(HELP)
        .arg(
            Arg::new("message")
                .help("Message text; the first URL in it is previewed")
                .required(true)
                .num_args(1..),
        )
        .arg(
            Arg::new("bot-addr")
                .long("bot-addr")
                .help("Address used in the mailto deep-links")
                .value_name("ADDR")
                .default_value("bot@example.org"),
        )
        .arg(
            Arg::new("link-prefix")
                .long("link-prefix")
                .help("Text put before the URL in deep-link bodies")
                .value_name("PREFIX")
                .default_value(""),
        )
        .arg(
            Arg::new("allow-private")
                .long("allow-private")
                .help("Allow private IPs and localhost")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-time")
                .long("no-time")
                .help("Omit timestamps from log lines")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    setup_logging(LogConfig {
        show_time: !matches.get_flag("no-time"),
        ..Default::default()
    })?;

    let text = matches
        .get_many::<String>("message")
        .map(|values| values.cloned().collect::<Vec<_>>())
        .unwrap_or_default()
        .join(" ");
    let bot_addr = matches.get_one::<String>("bot-addr").unwrap();
    let link_prefix = matches.get_one::<String>("link-prefix").unwrap();

    let mut config = PreviewServiceConfig::new().with_link_prefix(link_prefix.clone());
    if matches.get_flag("allow-private") {
        config = config.with_url_validation(UrlValidationConfig::permissive());
    }
    let service = PreviewService::new_with_config(config)?;

    let Some(url) = service.extract_url(&text) else {
        println!("{}", "No URL in message".yellow());
        return Ok(());
    };

    match service.generate_preview(&url, bot_addr).await {
        Ok(reply) => {
            log_preview_card(&reply, &url);
            match &reply {
                PreviewReply::TooLarge { .. } => println!("{}", reply.text().red()),
                PreviewReply::HtmlPreview { sanitized_html, .. } => {
                    println!("{}: {}", "Title".bold(), reply.text());
                    println!("{}", sanitized_html);
                }
                PreviewReply::FileAttachment(attachment) => {
                    println!(
                        "{}: {} ({} bytes)",
                        "File".bold(),
                        attachment.path().display(),
                        std::fs::metadata(attachment.path())?.len()
                    );
                }
            }
        }
        Err(e) => {
            log_error_card(&url, &e);
            println!("{}: {}", "Error".red().bold(), e);
        }
    }

    Ok(())
}
