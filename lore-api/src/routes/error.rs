use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

use crate::{
    domain::services::{ResourceServiceError, SearchError},
    domain::extraction::ExtractionError,
    repositories::RepositoryError,
};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => Self::not_found(err.to_string()),
            RepositoryError::InvalidTransition(_, _) => Self::conflict(err.to_string()),
            RepositoryError::DatabaseError(ref e) => {
                tracing::error!("Database error: {:?}", e);
                Self::internal(err.to_string())
            }
            RepositoryError::CorruptRow(_) => {
                tracing::error!("{}", err);
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<ResourceServiceError> for ApiError {
    fn from(err: ResourceServiceError) -> Self {
        match err {
            ResourceServiceError::Extraction(ref extraction) => match extraction {
                ExtractionError::InvalidContentType(_)
                | ExtractionError::MissingUrl
                | ExtractionError::InvalidText => Self::bad_request(err.to_string()),
                ExtractionError::Fetch(_) | ExtractionError::Pdf(_) => {
                    Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
                }
            },
            ResourceServiceError::Repository(repository) => repository.into(),
            ResourceServiceError::UpdateOfFailedResource => Self::conflict(err.to_string()),
            ResourceServiceError::VectorStore(ref e) => {
                tracing::error!("Vector store error: {:?}", e);
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyQuestion => Self::bad_request(err.to_string()),
            SearchError::VectorStore(ref e) => {
                tracing::error!("Vector store error: {:?}", e);
                Self::internal(err.to_string())
            }
        }
    }
}
