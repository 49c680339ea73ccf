use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::config::BackendConfig;
use crate::utils::content_guard::safe_truncate_utf8;

/// Model used for plain text recognition.
pub const READ_MODEL_ID: &str = "prebuilt-read";

/// REST API version of the `formrecognizer` routes.
pub const API_VERSION: &str = "2023-07-31";

/// Locale hint sent with every analysis.
pub const DEFAULT_LOCALE: &str = "th";

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_BYTES: usize = 1024;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP {status}: ({code}) {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("analysis was accepted without an Operation-Location header")]
    MissingOperationLocation,

    #[error("analysis operation {status}: ({code}) {message}")]
    OperationFailed {
        status: String,
        code: String,
        message: String,
    },

    #[error("analysis operation reported unexpected status {0:?}")]
    UnexpectedStatus(String),

    #[error("analysis operation succeeded without an analyzeResult")]
    MissingResult,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Recognized text of an analyzed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pages: Vec<DocumentPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Absent or null on pages without any recognized text.
    #[serde(default, deserialize_with = "null_as_default")]
    pub lines: Vec<DocumentLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    /// Always present in a well-formed result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Reads an explicit `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
impl DocumentPage {
    /// Builds a page from line texts.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            page_number: None,
            lines: lines
                .into_iter()
                .map(|text| DocumentLine {
                    content: Some(text.into()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// A remote service that runs the read model and waits for its result.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    /// Has the backend fetch and analyze the document at `url`.
    async fn submit_from_url(&self, url: &str) -> Result<AnalyzeResult, AnalyzerError>;

    /// Uploads `content` and analyzes it.
    async fn submit_from_bytes(&self, content: Vec<u8>) -> Result<AnalyzeResult, AnalyzerError>;
}

/// Client for the Azure Document Intelligence (Form Recognizer) REST API.
pub struct DocumentIntelligenceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    locale: String,
    poll_interval: Duration,
}

impl DocumentIntelligenceClient {
    pub fn new(config: &BackendConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &BackendConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            locale: config.locale.clone(),
            poll_interval: config.poll_interval,
        }
    }

    fn analyze_url(&self) -> Result<Url, AnalyzerError> {
        let base = self.endpoint.trim_end_matches('/');
        let raw = format!("{}/formrecognizer/documentModels/{}:analyze", base, READ_MODEL_ID);
        let mut url = Url::parse(&raw).map_err(|source| AnalyzerError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        url.query_pairs_mut()
            .append_pair("api-version", API_VERSION)
            .append_pair("locale", &self.locale);
        Ok(url)
    }

    fn post_analyze(&self) -> Result<RequestBuilder, AnalyzerError> {
        Ok(self
            .client
            .post(self.analyze_url()?)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key))
    }

    /// Sends the analyze request and returns the operation to poll.
    async fn begin_analyze(&self, request: RequestBuilder) -> Result<String, AnalyzerError> {
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AnalyzerError::MissingOperationLocation)?;
        debug!("Analysis accepted, operation at {}", location);
        Ok(location.to_string())
    }

    /// Polls the operation until it either succeeds or fails.
    async fn poll_result(&self, operation_location: &str) -> Result<AnalyzeResult, AnalyzerError> {
        let mut polls = 0usize;
        loop {
            polls += 1;
            let response = self
                .client
                .get(operation_location)
                .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(api_error(response).await);
            }

            let delay = retry_after(&response).unwrap_or(self.poll_interval);
            let body = response.text().await?;
            let operation = serde_json::from_str::<AnalyzeOperation>(&body)?;

            match operation.status.to_ascii_lowercase().as_str() {
                "notstarted" | "running" => {
                    debug!(
                        "Analysis still {} after {} poll(s), retrying in {:?}",
                        operation.status, polls, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                "succeeded" => {
                    debug!("Full API result: {}", body);
                    return operation.analyze_result.ok_or(AnalyzerError::MissingResult);
                }
                "failed" | "canceled" => {
                    let detail = operation.error.unwrap_or_default();
                    return Err(AnalyzerError::OperationFailed {
                        status: operation.status,
                        code: detail.code,
                        message: detail.message,
                    });
                }
                _ => return Err(AnalyzerError::UnexpectedStatus(operation.status)),
            }
        }
    }

    async fn run(&self, request: RequestBuilder) -> Result<AnalyzeResult, AnalyzerError> {
        let operation_location = self.begin_analyze(request).await?;
        info!("Polling for the analysis result...");
        let result = self.poll_result(&operation_location).await?;
        info!(
            pages = result.pages.len(),
            "Document analysis completed successfully"
        );
        Ok(result)
    }
}

#[async_trait]
impl DocumentAnalyzer for DocumentIntelligenceClient {
    async fn submit_from_url(&self, url: &str) -> Result<AnalyzeResult, AnalyzerError> {
        info!("Initiating document analysis from URL: {}", url);
        let request = self
            .post_analyze()?
            .json(&serde_json::json!({ "urlSource": url }));
        self.run(request).await.map_err(|e| {
            error!("Error analyzing document from URL: {}", e);
            e
        })
    }

    async fn submit_from_bytes(&self, content: Vec<u8>) -> Result<AnalyzeResult, AnalyzerError> {
        info!(
            "Initiating document analysis from uploaded file ({} bytes)",
            content.len()
        );
        let request = self
            .post_analyze()?
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(content);
        self.run(request).await.map_err(|e| {
            error!("Error analyzing document from file: {}", e);
            e
        })
    }
}

/// Turns a non-success response into an [`AnalyzerError::Api`], keeping the
/// service's own error code and message when the body carries them.
async fn api_error(response: Response) -> AnalyzerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => AnalyzerError::Api {
            status: status.as_u16(),
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => AnalyzerError::Api {
            status: status.as_u16(),
            code: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message: safe_truncate_utf8(body.trim(), MAX_ERROR_BODY_BYTES, "..."),
        },
    }
}

/// Delay requested by the service through `Retry-After` (whole seconds).
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
