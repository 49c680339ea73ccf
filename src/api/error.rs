use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use super::types::ErrorBody;
use crate::utils::document_intelligence::AnalyzerError;
use crate::utils::extract::ExtractionError;
use crate::utils::url_validator::InvalidUrlReason;

/// Where the document handed to the backend came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOrigin {
    Url,
    File,
}

impl fmt::Display for DocumentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOrigin::Url => f.write_str("URL"),
            DocumentOrigin::File => f.write_str("file"),
        }
    }
}

/// Every way an OCR request can fail. The display text is the `detail`
/// returned to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file or URL received in the request.")]
    MissingInput,

    #[error("Provide either a file or a valid URL, not both.")]
    ConflictingInput,

    #[error("Uploaded file is empty.")]
    EmptyFile,

    #[error("Request body exceeds the maximum upload size.")]
    UploadTooLarge,

    #[error("Invalid or inaccessible URL. Provide a valid PDF URL.")]
    InvalidUrl(InvalidUrlReason),

    #[error("Error analyzing document from {origin}: {error}")]
    Analysis {
        origin: DocumentOrigin,
        #[source]
        error: AnalyzerError,
    },

    #[error("Error extracting content: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingInput
            | ApiError::ConflictingInput
            | ApiError::EmptyFile
            | ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Analysis { .. } | ApiError::Extraction(_) | ApiError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = self.to_string();

        match &self {
            ApiError::InvalidUrl(reason) => {
                warn!(status = status.as_u16(), reason = %reason, "Rejecting request: {}", detail)
            }
            _ if status.is_client_error() => {
                warn!(status = status.as_u16(), "Rejecting request: {}", detail)
            }
            _ => error!(status = status.as_u16(), "Request failed: {}", detail),
        }

        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_client_errors() {
        for err in [
            ApiError::MissingInput,
            ApiError::ConflictingInput,
            ApiError::EmptyFile,
            ApiError::InvalidUrl(InvalidUrlReason::InvalidStructure),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn oversized_upload_is_payload_too_large() {
        let err = ApiError::UploadTooLarge;
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            err.to_string(),
            "Request body exceeds the maximum upload size."
        );
    }

    #[test]
    fn analysis_detail_names_origin_and_cause() {
        let err = ApiError::Analysis {
            origin: DocumentOrigin::File,
            error: AnalyzerError::MissingResult,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error analyzing document from file: analysis operation succeeded without an analyzeResult"
        );
    }

    #[test]
    fn extraction_detail_wraps_cause() {
        let err = ApiError::from(ExtractionError::MissingLineContent { page: 1, line: 3 });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error extracting content: line 3 on page 1 has no content"
        );
    }
}
