//! Error type for request handling and startup directory preparation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to prepare directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("failed to decode request file {name:?}: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("request file name {0:?} has no usable final component")]
    InvalidFileName(String),

    #[error("failed to write request file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize response: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Only an unparsable body maps to 400. Everything else, including
    /// failures while saving the request files, maps to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Directory { .. }
            | Self::Decode { .. }
            | Self::InvalidFileName(_)
            | Self::Write { .. }
            | Self::Serialize(_)
            | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::Directory { .. } => "failed to prepare request environment",
            Self::InvalidBody(_) => "invalid request body",
            Self::Decode { .. } | Self::InvalidFileName(_) | Self::Write { .. } => {
                "failed to save request files"
            }
            Self::Serialize(_) => "failed to create a response body",
            Self::Task(_) => "failed to handle the request",
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}
