use crate::classify::PlantPart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaneError {
    #[error("{0}")]
    MissingField(String),

    #[error("Field '{field}' must be numeric, got {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid request method")]
    InvalidMethod,

    #[error("No {0} detected in the image")]
    NotDetected(PlantPart),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model not available: {0}")]
    ModelUnavailable(String),

    #[error("{stage} exceeded deadline of {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("{model} expects {expected} features, got {actual}")]
    DimensionMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl CaneError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CaneError::MissingField(_)
            | CaneError::InvalidNumber { .. }
            | CaneError::InvalidInput(_)
            | CaneError::InvalidMethod
            | CaneError::NotDetected(_)
            | CaneError::Decode(_)
            | CaneError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            CaneError::FileTooLarge(_, _) | CaneError::PayloadTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            CaneError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            CaneError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            CaneError::ModelLoad(_) | CaneError::ModelUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CaneError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CaneError::MissingField(_) => "MISSING_FIELD",
            CaneError::InvalidNumber { .. } => "INVALID_NUMBER",
            CaneError::InvalidInput(_) => "INVALID_INPUT",
            CaneError::InvalidMethod => "INVALID_METHOD",
            CaneError::NotDetected(PlantPart::Bud) => "BUD_NOT_DETECTED",
            CaneError::NotDetected(PlantPart::Stem) => "STEM_NOT_DETECTED",
            CaneError::Decode(_) | CaneError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            CaneError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            CaneError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            CaneError::RequestTimeout => "REQUEST_TIMEOUT",
            CaneError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            CaneError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            CaneError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            CaneError::Timeout { .. } => "INFERENCE_TIMEOUT",
            CaneError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            CaneError::MalformedOutput(_) => "MALFORMED_MODEL_OUTPUT",
            CaneError::Inference(_) => "INFERENCE_ERROR",
            CaneError::Config(_) => "CONFIG_ERROR",
            CaneError::Io(_) => "IO_ERROR",
            CaneError::Ort(_) => "ORT_ERROR",
            CaneError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for CaneError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // error 字段保持为纯文本消息，code 用于客户端分支判断
        let error_response = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });

        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        let cases = [
            CaneError::MissingField("Bud image is required".to_string()),
            CaneError::InvalidNumber {
                field: "sunshine",
                value: "\"abc\"".to_string(),
            },
            CaneError::InvalidMethod,
            CaneError::NotDetected(PlantPart::Stem),
            CaneError::Decode("empty image".to_string()),
        ];
        for err in cases {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn not_detected_message_names_the_part() {
        assert_eq!(
            CaneError::NotDetected(PlantPart::Bud).to_string(),
            "No bud detected in the image"
        );
        assert_eq!(
            CaneError::NotDetected(PlantPart::Stem).error_code(),
            "STEM_NOT_DETECTED"
        );
    }

    #[test]
    fn internal_failures_are_server_errors() {
        let mismatch = CaneError::DimensionMismatch {
            model: "bud classifier",
            expected: 8868,
            actual: 12,
        };
        assert_eq!(mismatch.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mismatch.to_string(), "bud classifier expects 8868 features, got 12");

        let timeout = CaneError::Timeout {
            stage: "bud detection",
            secs: 30,
        };
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.error_code(), "INFERENCE_TIMEOUT");
    }

    #[test]
    fn layer_rejections_keep_their_status() {
        assert_eq!(CaneError::RequestTimeout.status_code(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(CaneError::RequestTimeout.error_code(), "REQUEST_TIMEOUT");
        assert_eq!(
            CaneError::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(CaneError::PayloadTooLarge.error_code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn missing_models_are_unavailable() {
        let err = CaneError::ModelUnavailable("sugar production regressor".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
