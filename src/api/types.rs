use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::error::ApiError;
use crate::utils::extract::ExtractedContent;

/// Media type of successful OCR responses. Clients of the service key on the
/// `utf-8-sig` charset; the body itself is plain UTF-8 without a BOM.
pub const OCR_CONTENT_TYPE: &str = "application/json; charset=utf-8-sig";

/// Body of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Successful `POST /ocr` response.
#[derive(Debug, Clone)]
pub struct OcrResponse(pub ExtractedContent);

impl IntoResponse for OcrResponse {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (
                [(header::CONTENT_TYPE, HeaderValue::from_static(OCR_CONTENT_TYPE))],
                body,
            )
                .into_response(),
            Err(e) => ApiError::Unexpected(e.to_string()).into_response(),
        }
    }
}
