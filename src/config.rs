use clap::{Arg, ArgMatches, Command};
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::utils::document_intelligence::DEFAULT_LOCALE;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Settings for the remote Document Intelligence resource.
#[derive(Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub locale: String,
    pub poll_interval: Duration,
}

// The key stays out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("locale", &self.locale)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Process-wide configuration, built once at start-up and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub quiet: bool,
}

pub fn cli() -> Command {
    Command::new("pdf-ocr-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("HTTP service that extracts text from PDFs with Azure Document Intelligence")
        .long_about(
            "Exposes POST /ocr, which accepts a multipart form with either a `file`\n\
            upload or a `url` pointing to a PDF, runs the prebuilt-read model on it\n\
            and returns the recognized text as {\"Content\": \"...\"}.",
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .value_name("URL")
                .help("Document Intelligence endpoint [env: AZURE_FORM_RECOGNIZER_ENDPOINT]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .value_name("KEY")
                .help("Document Intelligence access key [env: AZURE_FORM_RECOGNIZER_KEY]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("ADDR")
                .help("Address to listen on [env: OCR_HOST] [default: 0.0.0.0]")
                .value_parser(clap::value_parser!(IpAddr))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("PORT")
                .help("Port to listen on [env: OCR_PORT] [default: 8000]")
                .value_parser(clap::value_parser!(u16))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .value_name("MS")
                .help("Delay between polls of a running analysis when the backend sends no Retry-After [env: OCR_POLL_INTERVAL_MS] [default: 1000]")
                .value_parser(clap::value_parser!(u64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("max-upload-mb")
                .long("max-upload-mb")
                .value_name("MB")
                .help("Largest accepted request body in MiB [env: OCR_MAX_UPLOAD_MB] [default: 50]")
                .value_parser(clap::value_parser!(usize))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors and skip the start-up banner")
                .action(clap::ArgAction::SetTrue),
        )
}

impl Config {
    /// Builds the configuration from parsed arguments, falling back to
    /// environment variables and then to defaults.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let endpoint = matches
            .get_one::<String>("endpoint")
            .cloned()
            .or_else(|| env::var("AZURE_FORM_RECOGNIZER_ENDPOINT").ok())
            .unwrap_or_default();

        let api_key = matches
            .get_one::<String>("key")
            .cloned()
            .or_else(|| env::var("AZURE_FORM_RECOGNIZER_KEY").ok())
            .unwrap_or_default();

        let host = matches
            .get_one::<IpAddr>("host")
            .copied()
            .or_else(|| env_parse("OCR_HOST"))
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let port = matches
            .get_one::<u16>("port")
            .copied()
            .or_else(|| env_parse("OCR_PORT"))
            .unwrap_or(DEFAULT_PORT);

        let poll_interval_ms = matches
            .get_one::<u64>("poll-interval-ms")
            .copied()
            .or_else(|| env_parse("OCR_POLL_INTERVAL_MS"))
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let max_upload_mb = matches
            .get_one::<usize>("max-upload-mb")
            .copied()
            .or_else(|| env_parse("OCR_MAX_UPLOAD_MB"))
            .unwrap_or(DEFAULT_MAX_UPLOAD_MB);

        Self {
            server: ServerConfig {
                host,
                port,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            },
            backend: BackendConfig {
                endpoint,
                api_key,
                locale: DEFAULT_LOCALE.to_string(),
                poll_interval: Duration::from_millis(poll_interval_ms),
            },
            quiet: matches.get_flag("quiet"),
        }
    }
}

/// Reads and parses an environment variable, ignoring values that do not parse.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}
