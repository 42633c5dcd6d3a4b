use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Remote catalog unreachable or returned something unusable.
    #[error("catalog fetch failed: {0}")]
    Fetch(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] sea_orm::DbErr),

    /// Rating source unreachable or returned nothing for the user.
    #[error("import failed: {0}")]
    Import(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<wreq::Error> for AppError {
    fn from(err: wreq::Error) -> Self {
        Self::Import(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Fetch(_) | AppError::Import(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
