use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::inference::classifier::ClassifyError;
use crate::storage::upload_store::StorageError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("No file uploaded, expected a multipart field named `file`")]
    MissingFile,
    #[error("Invalid multipart payload: {0}")]
    Payload(#[from] actix_multipart::MultipartError),
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    /// Detail stays in the log; the body never names server paths.
    #[error("Failed to store upload")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("Prediction task was cancelled")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::MissingFile | PredictError::Payload(_) => StatusCode::BAD_REQUEST,
            PredictError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Storage(_) | PredictError::Classify(_) | PredictError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
