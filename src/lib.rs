//! Fintrack is a backend for tracking personal finances.
//!
//! This library provides a JSON REST API for storing financial transactions
//! (expenses, income, sales and deposits) and the user-defined categories
//! that classify them, backed by a SQLite database.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod category;
mod db;
mod endpoints;
mod logging;
mod reset;
mod routing;
mod transaction;
mod transaction_type;

pub use app_state::AppState;
pub use db::{initialize, reset};
pub use logging::logging_middleware;
pub use routing::build_router;
pub use transaction_type::TransactionType;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A required field was missing from the request body.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A string could not be parsed as one of the four transaction types.
    #[error("\"{0}\" is not a valid transaction type")]
    InvalidTransactionType(String),

    /// A date string was not a valid `YYYY-MM-DD` calendar date.
    ///
    /// Callers should pass in the date string that caused the error followed
    /// by the original error as a string.
    #[error("could not parse date \"{0}\": {1}")]
    InvalidDate(String, String),

    /// A timestamp string was not a valid RFC 3339 instant.
    ///
    /// Callers should pass in the timestamp string that caused the error
    /// followed by the original error as a string.
    #[error("could not parse timestamp \"{0}\": {1}")]
    InvalidTimestamp(String, String),

    /// The request body was not valid JSON for the expected schema.
    #[error("invalid request body: {0}")]
    InvalidRequestBody(String),

    /// An empty string was used to create a category name.
    #[error("category name cannot be empty")]
    EmptyCategoryName,

    /// The `(type, name)` pair used to create or rename a category already
    /// exists in the database.
    #[error("the category already exists for this transaction type")]
    DuplicateCategory,

    /// A client-supplied transaction ID already exists in the database.
    #[error("a transaction with this ID already exists")]
    DuplicateTransactionId,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to rename a category that does not exist
    #[error("tried to rename a category that is not in the database")]
    RenameMissingCategory,

    /// Tried to delete a category that does not exist
    #[error("tried to delete a category that is not in the database")]
    DeleteMissingCategory,

    /// A timestamp could not be formatted as an RFC 3339 string.
    #[error("could not format timestamp: {0}")]
    TimestampFormat(String),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Codes 1555 and 2067 occur when a PRIMARY KEY or UNIQUE
            // constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if (sql_error.extended_code == 1555 || sql_error.extended_code == 2067)
                    && desc.ends_with("transaction.id") =>
            {
                Error::DuplicateTransactionId
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if (sql_error.extended_code == 1555 || sql_error.extended_code == 2067)
                    && desc.contains("category.") =>
            {
                Error::DuplicateCategory
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            Error::MissingField(_)
            | Error::InvalidTransactionType(_)
            | Error::InvalidDate(_, _)
            | Error::InvalidTimestamp(_, _)
            | Error::InvalidRequestBody(_)
            | Error::EmptyCategoryName
            | Error::DuplicateCategory
            | Error::DuplicateTransactionId => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::NotFound
            | Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::RenameMissingCategory
            | Error::DeleteMissingCategory => (StatusCode::NOT_FOUND, self.to_string()),
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
