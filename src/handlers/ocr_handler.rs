use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::api::error::{ApiError, DocumentOrigin};
use crate::api::server::AppState;
use crate::api::types::OcrResponse;
use crate::utils::content_guard::looks_like_pdf;
use crate::utils::extract::extract_content;
use crate::utils::url_validator::UrlVerdict;

/// Pipeline stage a request is in, recorded on its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    ValidatingInput,
    Submitting,
    Extracting,
    Responding,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::ValidatingInput => "validating_input",
            Stage::Submitting => "submitting",
            Stage::Extracting => "extracting",
            Stage::Responding => "responding",
        }
    }

    fn enter(self) {
        Span::current().record("stage", self.as_str());
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub name: Option<String>,
    pub content: Bytes,
}

/// The multipart fields the endpoint understands.
#[derive(Debug, Default)]
pub struct OcrForm {
    pub file: Option<UploadedFile>,
    pub url: Option<String>,
}

/// A request reduced to its single document source.
#[derive(Debug)]
pub enum OcrInput {
    File(UploadedFile),
    Url(String),
}

impl OcrForm {
    /// Reads the `file` and `url` fields. Unknown fields are skipped; a
    /// repeated field keeps its last value.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(form_error)?
        {
            let field_name = field.name().map(str::to_string);
            match field_name.as_deref() {
                Some("file") => {
                    let name = field.file_name().map(str::to_string);
                    let content = field
                        .bytes()
                        .await
                        .map_err(form_error)?;
                    form.file = Some(UploadedFile { name, content });
                }
                Some("url") => {
                    let url = field
                        .text()
                        .await
                        .map_err(form_error)?;
                    form.url = Some(url);
                }
                other => debug!("Ignoring form field {:?}", other),
            }
        }
        Ok(form)
    }

    /// Enforces exactly one document source. An empty `url` counts as absent;
    /// whitespace does not.
    pub fn into_input(self) -> Result<OcrInput, ApiError> {
        let url = self.url.filter(|url| !url.is_empty());
        match (self.file, url) {
            (None, None) => Err(ApiError::MissingInput),
            (Some(_), Some(_)) => Err(ApiError::ConflictingInput),
            (Some(file), None) => {
                if file.content.is_empty() {
                    Err(ApiError::EmptyFile)
                } else {
                    Ok(OcrInput::File(file))
                }
            }
            (None, Some(url)) => Ok(OcrInput::Url(url)),
        }
    }

    fn describe(&self) -> String {
        let file = match &self.file {
            Some(file) => file.name.as_deref().unwrap_or("<unnamed>"),
            None => "None",
        };
        format!("File: {}, URL: {}", file, self.url.as_deref().unwrap_or("None"))
    }
}

/// Body limit hits are the client's fault; any other read failure is not.
fn form_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::UploadTooLarge
    } else {
        ApiError::Unexpected(err.body_text())
    }
}

/// `POST /ocr`: recognizes the text of an uploaded PDF or of a PDF URL.
pub async fn ocr_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<OcrResponse, ApiError> {
    let span = info_span!("ocr_request", request_id = %Uuid::new_v4(), stage = field::Empty);
    run_pipeline(state, multipart).instrument(span).await
}

async fn run_pipeline(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<OcrResponse, ApiError> {
    Stage::Received.enter();
    info!("Received OCR request.");

    let form = match multipart {
        Ok(multipart) => OcrForm::read(multipart).await?,
        Err(rejection) => {
            warn!("Request body is not a multipart form: {}", rejection);
            OcrForm::default()
        }
    };
    info!("{}", form.describe());

    Stage::ValidatingInput.enter();
    let input = form.into_input()?;
    let (origin, submission) = match input {
        OcrInput::File(file) => {
            info!("File detected in the request, processing it.");
            debug!("File read successfully, size: {} bytes", file.content.len());
            if !looks_like_pdf(&file.content) {
                warn!("Uploaded file does not start with a PDF signature; submitting anyway");
            }
            Stage::Submitting.enter();
            (
                DocumentOrigin::File,
                state.analyzer.submit_from_bytes(file.content.into()).await,
            )
        }
        OcrInput::Url(url) => {
            info!("URL detected in the request: {}", url);
            let verdict = state.validator.validate(&url).await;
            debug!(valid = verdict.is_valid(), "URL validation finished");
            if let UrlVerdict::Invalid(reason) = verdict {
                return Err(ApiError::InvalidUrl(reason));
            }
            Stage::Submitting.enter();
            (
                DocumentOrigin::Url,
                state.analyzer.submit_from_url(&url).await,
            )
        }
    };
    let result = submission.map_err(|error| ApiError::Analysis { origin, error })?;

    Stage::Extracting.enter();
    let extracted = extract_content(&result.pages)?;

    Stage::Responding.enter();
    info!(
        chars = extracted.content.chars().count(),
        "Returning extracted content as JSON response."
    );
    Ok(OcrResponse(extracted))
}
