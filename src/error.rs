use crate::jobs::IntakeError;
use crate::progress::ProgressStoreError;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    /// Request was well-formed but failed input validation.
    Validation(String),
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                (Status::InternalServerError, "DatabaseError", e.to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::Validation(msg) => {
                log::debug!("validation failed: {}", msg);
                (Status::UnprocessableEntity, "ValidationError", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed request"),
            ("404", "Resource not found"),
            ("422", "Input failed validation"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<ProgressStoreError> for ApiError {
    fn from(err: ProgressStoreError) -> Self {
        match err {
            ProgressStoreError::Database(e) => ApiError::DatabaseError(e),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Progress(e) => e.into(),
            IntakeError::Queue(e) => ApiError::DatabaseError(e),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::InternalError(format!("I/O error: {}", err))
    }
}
