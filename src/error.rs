use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::server::protocol::ErrorBody;

#[derive(Error, Debug)]
pub enum ZimuError {
    #[error("{0}")]
    Validation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("In-flight computation abandoned for {0}")]
    InflightAbandoned(String),

    #[error("A transcription run is already in progress")]
    RunInProgress,

    #[error("Segment {index} failed: {message}")]
    SegmentFailed { index: usize, message: String },

    #[error("Server error: {0}")]
    Server(String),
}

impl ZimuError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ZimuError {
    fn from(err: anyhow::Error) -> Self {
        Self::Api(format!("{:#}", err))
    }
}

impl IntoResponse for ZimuError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "chunk_request_failed");
        } else {
            tracing::debug!(error = %self, "chunk_request_rejected");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ZimuError>;
