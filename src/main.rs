use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod handlers;
mod utils;

#[cfg(test)]
mod test_support;

use config::Config;

/// Prints a formatted box with the given lines
/// Empty strings create empty lines, other strings are centered within the box
fn print_box(lines: &[&str]) {
    const BOX_WIDTH: usize = 60; // borders included
    const CONTENT_WIDTH: usize = BOX_WIDTH - 4; // minus "║  " and "  ║"

    eprintln!("\n\x1b[36m╔{}╗", "═".repeat(BOX_WIDTH - 2));

    for line in lines {
        if line.is_empty() {
            // Spacer
            eprintln!("║{}║", " ".repeat(BOX_WIDTH - 2));
        } else {
            // Color codes take no columns on screen
            let visible_len = strip_ansi_codes(line).chars().count();

            if visible_len < CONTENT_WIDTH {
                let total_padding = CONTENT_WIDTH - visible_len;
                let left_padding = total_padding / 2;
                let right_padding = total_padding - left_padding;

                eprintln!(
                    "║  {}{}{}\x1b[36m║",
                    " ".repeat(left_padding),
                    line,
                    " ".repeat(right_padding)
                );
            } else {
                // Too wide to center, print as is
                eprintln!("║  {}\x1b[36m  ║", line);
            }
        }
    }

    eprintln!("╚{}╝\x1b[0m\n", "═".repeat(BOX_WIDTH - 2));
}

/// Strips ANSI escape codes to calculate visible text length
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::new();
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            // CSI sequence runs up to its final letter
            if chars.next() == Some('[') {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn init_tracing(quiet: bool) {
    // RUST_LOG wins; otherwise info, or only errors in quiet mode.
    let default_level = if quiet { "error" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Values from .env act like real environment variables.
    dotenvy::dotenv().ok();

    let matches = config::cli().get_matches();
    let config = Config::from_matches(&matches);

    init_tracing(config.quiet);

    // Missing credentials are not fatal: the first backend call reports them.
    if config.backend.endpoint.is_empty() {
        warn!("AZURE_FORM_RECOGNIZER_ENDPOINT is not set - every analysis will fail");
    }
    if config.backend.api_key.is_empty() {
        warn!("AZURE_FORM_RECOGNIZER_KEY is not set - the backend will reject requests");
    }
    info!("Backend configuration: {:?}", config.backend);

    if !config.quiet {
        let listen = format!("\x1b[90m http://{}/ocr \x1b[0m", config.server.addr());
        print_box(&[
            "",
            "\x1b[1m\x1b[31m PDF OCR Gateway \x1b[0m",
            "",
            "\x1b[0m Azure Document Intelligence, prebuilt-read \x1b[0m",
            "",
            listen.as_str(),
            "",
        ]);
    }

    info!("Starting OCR gateway...");

    if let Err(e) = api::server::serve(config).await {
        error!("Failed to start server: {:#}", e);
        process::exit(1);
    }
}
