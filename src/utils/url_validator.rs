use reqwest::{header, redirect, Client, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

use crate::utils::content_guard::is_pdf_content_type;

/// How long the reachability probe may take, redirects included.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_REDIRECTS: usize = 10;

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidUrlReason {
    /// The string does not parse, or it has no scheme or no host.
    InvalidStructure,
    /// Anything other than `http` or `https`.
    UnsupportedScheme(String),
    /// The probe got an answer, but not a 200 carrying a PDF-like content type.
    NotAPdf { status: u16, content_type: String },
    /// The probe itself failed: DNS, refused connection, TLS, timeout, too many redirects.
    Unreachable(String),
}

impl fmt::Display for InvalidUrlReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidUrlReason::InvalidStructure => f.write_str("missing scheme or host"),
            InvalidUrlReason::UnsupportedScheme(scheme) => {
                write!(f, "unsupported scheme {:?}", scheme)
            }
            InvalidUrlReason::NotAPdf {
                status,
                content_type,
            } => write!(f, "status {} with content type {:?}", status, content_type),
            InvalidUrlReason::Unreachable(cause) => write!(f, "unreachable: {}", cause),
        }
    }
}

/// Outcome of [`UrlValidator::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlVerdict {
    Valid,
    Invalid(InvalidUrlReason),
}

impl UrlVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, UrlVerdict::Valid)
    }
}

/// Checks that a user-supplied URL is well formed, uses http(s) and answers a
/// HEAD request like a PDF would.
pub struct UrlValidator {
    client: Client,
}

impl UrlValidator {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Uses a caller-provided client for probing. Its timeout and redirect
    /// policy apply as configured.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Validates `raw`. Never fails: every problem, network errors included,
    /// becomes an [`UrlVerdict::Invalid`].
    pub async fn validate(&self, raw: &str) -> UrlVerdict {
        let url = match check_structure(raw) {
            Ok(url) => url,
            Err(reason) => return UrlVerdict::Invalid(reason),
        };

        info!("URL format looks valid: {}", url);
        self.probe(&url).await
    }

    async fn probe(&self, url: &Url) -> UrlVerdict {
        let response = match self.client.head(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Error during URL validation request: {}", e);
                return UrlVerdict::Invalid(InvalidUrlReason::Unreachable(e.to_string()));
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();

        if status == StatusCode::OK && is_pdf_content_type(&content_type) {
            info!(url = %url, final_url = %response.url(), "URL is accessible and likely points to a PDF file");
            UrlVerdict::Valid
        } else {
            error!(
                "URL is either not accessible or does not point to a PDF. Status Code: {}, Content-Type: {}",
                status.as_u16(),
                content_type
            );
            UrlVerdict::Invalid(InvalidUrlReason::NotAPdf {
                status: status.as_u16(),
                content_type,
            })
        }
    }
}

/// Structural checks that need no network access.
fn check_structure(raw: &str) -> Result<Url, InvalidUrlReason> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            error!("Invalid URL structure: {} ({})", raw, e);
            return Err(InvalidUrlReason::InvalidStructure);
        }
    };

    if url.host_str().map_or(true, str::is_empty) {
        error!("Invalid URL structure: {} (no host)", raw);
        return Err(InvalidUrlReason::InvalidStructure);
    }

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => {
            error!(
                "Unsupported URL scheme: {}. Only http and https are allowed.",
                other
            );
            Err(InvalidUrlReason::UnsupportedScheme(other.to_string()))
        }
    }
}
