//! The API route for wiping the database back to its seeded state.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde_json::json;

use crate::{AppState, Error, db::reset};

/// The state needed for resetting the database.
#[derive(Debug, Clone)]
pub struct ResetEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ResetEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for deleting all transactions and categories and
/// restoring the default category set.
///
/// This is destructive and has no confirmation step, so it is only reachable
/// via an explicit POST.
pub async fn reset_endpoint(State(state): State<ResetEndpointState>) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    reset(&connection)?;

    tracing::info!("database reset to the default category set");

    Ok(Json(json!({
        "success": true,
        "message": "Database reset successfully",
    }))
    .into_response())
}
