use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;

const ERROR_TYPE_PREFIX: &str = "https://uri.etsi.org/ngsi-ld/errors/";

#[derive(Debug)]
pub enum AppError {
    BadRequestData(String),
    InvalidRequest(String),
    NotFound(String),
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequestData(_) => "BadRequestData",
            AppError::InvalidRequest(_) => "InvalidRequest",
            AppError::NotFound(_) => "ResourceNotFound",
            AppError::Internal(_) => "InternalError",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            AppError::BadRequestData(_) => "Bad request data",
            AppError::InvalidRequest(_) => "Invalid request",
            AppError::NotFound(_) => "Resource not found",
            AppError::Internal(_) => "Internal error",
        }
    }

    fn problem(&self, detail: &str) -> ProblemDetails {
        ProblemDetails {
            error_type: format!("{}{}", ERROR_TYPE_PREFIX, self.kind()),
            title: self.title().to_string(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequestData(msg) => write!(f, "Bad request data: {}", msg),
            AppError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequestData(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::BadRequestData(msg) => HttpResponse::BadRequest().json(self.problem(msg)),
            AppError::InvalidRequest(msg) => HttpResponse::BadRequest().json(self.problem(msg)),
            AppError::NotFound(msg) => HttpResponse::NotFound().json(self.problem(msg)),
            AppError::Internal(msg) => {
                log::error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(self.problem(msg))
            }
        }
    }
}

#[derive(Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub detail: String,
}
