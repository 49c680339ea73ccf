//! Helpers shared by the unit tests: throwaway HTTP servers, a scripted
//! Document Intelligence backend and multipart body construction.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::utils::document_intelligence::{AnalyzeResult, AnalyzerError, DocumentAnalyzer};

pub async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");
    (listener, addr)
}

pub fn serve(listener: TcpListener, app: Router) {
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
}

/// A client that ignores proxy settings, so tests only talk to loopback.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .expect("test HTTP client")
}

/// How the mock backend behaves.
#[derive(Debug, Clone)]
pub struct BackendScript {
    pub analyze_status: u16,
    pub analyze_body: Value,
    pub omit_operation_location: bool,
    /// Polls answered with `running` before `operation` is returned.
    pub running_polls: usize,
    /// Body of the final poll response.
    pub operation: Value,
}

impl BackendScript {
    pub fn succeeding(operation: Value) -> Self {
        Self {
            analyze_status: 202,
            analyze_body: Value::Null,
            omit_operation_location: false,
            running_polls: 0,
            operation,
        }
    }

    pub fn rejecting(status: u16, body: Value) -> Self {
        Self {
            analyze_status: status,
            analyze_body: body,
            omit_operation_location: false,
            running_polls: 0,
            operation: Value::Null,
        }
    }
}

/// What the mock backend received.
#[derive(Debug, Clone, Default)]
pub struct SeenRequests {
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub locale: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub polls: usize,
    pub poll_api_key: Option<String>,
}

pub struct MockBackend {
    addr: SocketAddr,
    seen: Arc<Mutex<SeenRequests>>,
}

impl MockBackend {
    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn seen(&self) -> SeenRequests {
        self.seen.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct BackendState {
    script: Arc<BackendScript>,
    seen: Arc<Mutex<SeenRequests>>,
    operation_location: String,
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

// `prebuilt-read:analyze` is not a valid route pattern, so analyze requests
// land in the fallback.
async fn analyze(
    State(state): State<BackendState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST || !uri.path().ends_with("/prebuilt-read:analyze") {
        return StatusCode::NOT_FOUND.into_response();
    }

    {
        let mut seen = state.seen.lock().unwrap();
        seen.api_key = header_string(&headers, "ocp-apim-subscription-key");
        seen.content_type = header_string(&headers, "content-type");
        seen.body = body.to_vec();
        for (key, value) in url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "api-version" => seen.api_version = Some(value.into_owned()),
                "locale" => seen.locale = Some(value.into_owned()),
                _ => {}
            }
        }
    }

    let status = StatusCode::from_u16(state.script.analyze_status).unwrap();
    if !status.is_success() {
        return (status, Json(state.script.analyze_body.clone())).into_response();
    }

    let mut response = status.into_response();
    if !state.script.omit_operation_location {
        response.headers_mut().insert(
            "operation-location",
            HeaderValue::from_str(&state.operation_location).unwrap(),
        );
    }
    response
}

async fn poll(State(state): State<BackendState>, headers: HeaderMap) -> Json<Value> {
    let polls = {
        let mut seen = state.seen.lock().unwrap();
        seen.polls += 1;
        seen.poll_api_key = header_string(&headers, "ocp-apim-subscription-key");
        seen.polls
    };

    if polls <= state.script.running_polls {
        Json(json!({ "status": "running" }))
    } else {
        Json(state.script.operation.clone())
    }
}

/// Starts a fake Document Intelligence resource following `script`.
pub async fn spawn_backend(script: BackendScript) -> MockBackend {
    let (listener, addr) = bind().await;
    let seen = Arc::new(Mutex::new(SeenRequests::default()));
    let state = BackendState {
        script: Arc::new(script),
        seen: seen.clone(),
        operation_location: format!(
            "http://{}/formrecognizer/documentModels/prebuilt-read/analyzeResults/op-1?api-version=2023-07-31",
            addr
        ),
    };
    let app = Router::new()
        .route(
            "/formrecognizer/documentModels/prebuilt-read/analyzeResults/op-1",
            get(poll),
        )
        .fallback(analyze)
        .with_state(state);
    serve(listener, app);
    MockBackend { addr, seen }
}

/// What a [`ScriptedAnalyzer`] was asked to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Url(String),
    Bytes(Vec<u8>),
}

/// In-process analyzer returning a fixed outcome.
pub struct ScriptedAnalyzer {
    outcome: Result<AnalyzeResult, String>,
    submissions: Mutex<Vec<Submission>>,
}

impl ScriptedAnalyzer {
    pub fn returning(result: AnalyzeResult) -> Self {
        Self {
            outcome: Ok(result),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Fails every submission with a 503 carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    fn answer(&self, submission: Submission) -> Result<AnalyzeResult, AnalyzerError> {
        self.submissions.lock().unwrap().push(submission);
        match &self.outcome {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(AnalyzerError::Api {
                status: 503,
                code: "ServiceUnavailable".to_string(),
                message: message.clone(),
            }),
        }
    }
}

#[async_trait]
impl DocumentAnalyzer for ScriptedAnalyzer {
    async fn submit_from_url(&self, url: &str) -> Result<AnalyzeResult, AnalyzerError> {
        self.answer(Submission::Url(url.to_string()))
    }

    async fn submit_from_bytes(&self, content: Vec<u8>) -> Result<AnalyzeResult, AnalyzerError> {
        self.answer(Submission::Bytes(content))
    }
}

/// Analyzer that panics on every submission.
pub struct PanickingAnalyzer(pub &'static str);

#[async_trait]
impl DocumentAnalyzer for PanickingAnalyzer {
    async fn submit_from_url(&self, _url: &str) -> Result<AnalyzeResult, AnalyzerError> {
        panic!("{}", self.0)
    }

    async fn submit_from_bytes(&self, _content: Vec<u8>) -> Result<AnalyzeResult, AnalyzerError> {
        panic!("{}", self.0)
    }
}

pub const BOUNDARY: &str = "x-pdf-ocr-gateway-test";

/// One field of a multipart form.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, filename, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/pdf\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
