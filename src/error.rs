use std::io;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Path is required")]
    MissingParameter,

    #[error("File/Directory does not exist: {0}")]
    NotFound(String),

    #[error("Path is outside the allowed root: {0}")]
    OutsideRoot(String),

    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    /// Wrap an I/O failure with the message shown to the client.
    pub fn internal(context: &'static str, source: io::Error) -> Self {
        Self::Internal { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::MissingParameter => StatusCode::BAD_REQUEST,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::OutsideRoot(_) => StatusCode::FORBIDDEN,
            ServeError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal details stay in the server log.
    pub fn public_message(&self) -> &'static str {
        match self {
            ServeError::MissingParameter => "Path is required",
            ServeError::NotFound(_) => "File/Directory does not exist",
            ServeError::OutsideRoot(_) => "Path is outside the allowed root",
            ServeError::Internal { context, .. } => *context,
        }
    }

    /// Plain-text error response, built without consuming the error.
    pub fn to_response(&self) -> Response {
        (
            self.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self.public_message()),
        )
            .into_response()
    }
}

/// Zip library errors carry no status of their own; fold them into I/O errors.
pub fn zip_error_to_io(error: zip::result::ZipError) -> io::Error {
    match error {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::other(other.to_string()),
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}
