//! This file defines the `Transaction` type, the payload schema used to
//! create and update transactions, and the API routes for the transaction
//! type.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{
    Date, OffsetDateTime,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};
use uuid::Uuid;

use crate::{AppState, Error, TransactionType};

/// The format for calendar dates in request bodies and the database.
const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// A single financial event record, e.g. an expense or a deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The opaque unique identifier of the transaction.
    ///
    /// Immutable after creation.
    pub id: String,

    /// The signed amount of money involved.
    pub amount: f64,

    /// A short description of the transaction.
    pub description: String,

    /// The name of the category the transaction belongs to.
    ///
    /// This is free text: it is not enforced against the category table, so
    /// a transaction may reference a name that was never created or was
    /// later deleted. Renaming a category cascades here (see the category
    /// module); deleting one does not.
    pub category: String,

    /// The calendar date the transaction occurred on.
    pub date: Date,

    /// The kind of financial event the transaction records.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// Optional free-text notes, empty by default.
    pub notes: String,

    /// The instant the transaction was created or last modified.
    ///
    /// Stamped with the current instant when absent on create; always
    /// regenerated by the server on update.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The fields a client may supply when creating or updating a transaction.
///
/// On create, `amount`, `description`, `category`, `date` and `type` are
/// required; `id`, `notes` and `timestamp` are assigned by the server when
/// absent. On update, every field is optional and falls back to the stored
/// value, except `timestamp` which is ignored and always regenerated.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TransactionData {
    /// An optional client-chosen identifier.
    pub id: Option<String>,
    /// The signed amount of money involved.
    pub amount: Option<f64>,
    /// A short description of the transaction.
    pub description: Option<String>,
    /// The name of the category the transaction belongs to.
    pub category: Option<String>,
    /// The calendar date as a `YYYY-MM-DD` string.
    pub date: Option<String>,
    /// The transaction type as a string, e.g. `"expense"`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// Optional free-text notes.
    pub notes: Option<String>,
    /// An optional RFC 3339 creation instant.
    pub timestamp: Option<String>,
}

fn parse_date(text: &str) -> Result<Date, Error> {
    Date::parse(text, DATE_FORMAT)
        .map_err(|error| Error::InvalidDate(text.to_string(), error.to_string()))
}

fn parse_timestamp(text: &str) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::parse(text, &Rfc3339)
        .map_err(|error| Error::InvalidTimestamp(text.to_string(), error.to_string()))
}

/// Create a transaction in the database.
///
/// Assigns a fresh UUID when the client did not supply an `id`, an empty
/// string when it did not supply `notes`, and the current instant when it
/// did not supply a `timestamp`.
///
/// # Errors
/// This function will return an error if a required field is missing or
/// malformed, if a client-supplied `id` already exists, or if there is an
/// SQL error.
pub fn create_transaction(
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let amount = data.amount.ok_or(Error::MissingField("amount"))?;
    let description = data.description.ok_or(Error::MissingField("description"))?;
    let category = data.category.ok_or(Error::MissingField("category"))?;
    let date = parse_date(&data.date.ok_or(Error::MissingField("date"))?)?;
    let transaction_type = data
        .transaction_type
        .ok_or(Error::MissingField("type"))?
        .parse::<TransactionType>()?;
    let timestamp = match data.timestamp {
        Some(text) => parse_timestamp(&text)?,
        None => OffsetDateTime::now_utc(),
    };

    let transaction = Transaction {
        id: data.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        amount,
        description,
        category,
        date,
        transaction_type,
        notes: data.notes.unwrap_or_default(),
        timestamp,
    };

    insert_transaction(&transaction, connection)?;

    Ok(transaction)
}

/// Replace a transaction's mutable fields.
///
/// PUT replaces all mutable fields, falling back to the previous value when
/// a field is omitted. The `id` is immutable and the `timestamp` is always
/// set to the current instant.
///
/// # Errors
/// This function will return an error if `transaction_id` does not exist,
/// if a supplied field is malformed, or if there is an SQL error.
pub fn update_transaction(
    transaction_id: &str,
    data: TransactionData,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let existing = get_transaction(transaction_id, connection).map_err(|error| match error {
        Error::NotFound => Error::UpdateMissingTransaction,
        error => error,
    })?;

    let date = match data.date {
        Some(text) => parse_date(&text)?,
        None => existing.date,
    };
    let transaction_type = match data.transaction_type {
        Some(text) => text.parse::<TransactionType>()?,
        None => existing.transaction_type,
    };

    let updated = Transaction {
        id: existing.id,
        amount: data.amount.unwrap_or(existing.amount),
        description: data.description.unwrap_or(existing.description),
        category: data.category.unwrap_or(existing.category),
        date,
        transaction_type,
        notes: data.notes.unwrap_or(existing.notes),
        timestamp: OffsetDateTime::now_utc(),
    };

    let timestamp_text = format_timestamp(&updated.timestamp)?;
    connection.execute(
        "UPDATE \"transaction\"
         SET amount = ?1, description = ?2, category = ?3, date = ?4, type = ?5, notes = ?6, timestamp = ?7
         WHERE id = ?8;",
        (
            updated.amount,
            &updated.description,
            &updated.category,
            updated.date,
            updated.transaction_type.as_str(),
            &updated.notes,
            timestamp_text,
            &updated.id,
        ),
    )?;

    Ok(updated)
}

/// Retrieve a single transaction by its `id`.
///
/// # Errors
/// This function will return an error if `transaction_id` does not exist or
/// if there is an SQL error.
pub fn get_transaction(transaction_id: &str, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, amount, description, category, date, type, notes, timestamp
             FROM \"transaction\" WHERE id = :id;",
        )?
        .query_row(&[(":id", transaction_id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve all transactions, most recent date first.
///
/// Transactions that share a date are ordered by most recent write.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_transactions(connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, amount, description, category, date, type, notes, timestamp
             FROM \"transaction\" ORDER BY date DESC, timestamp DESC;",
        )?
        .query_map([], map_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Delete a transaction from the database.
///
/// Does not touch the category table.
///
/// # Errors
/// This function will return an error if there is an SQL error or if the
/// transaction doesn't exist.
pub fn delete_transaction(transaction_id: &str, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1;",
        [transaction_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTransaction);
    }

    Ok(())
}

/// Create the transaction table if it does not exist.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id TEXT PRIMARY KEY,
            amount REAL NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            type TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transaction_date ON \"transaction\"(date);",
    )?;

    Ok(())
}

fn insert_transaction(transaction: &Transaction, connection: &Connection) -> Result<(), Error> {
    let timestamp_text = format_timestamp(&transaction.timestamp)?;

    connection.execute(
        "INSERT INTO \"transaction\" (id, amount, description, category, date, type, notes, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
        (
            &transaction.id,
            transaction.amount,
            &transaction.description,
            &transaction.category,
            transaction.date,
            transaction.transaction_type.as_str(),
            &transaction.notes,
            timestamp_text,
        ),
    )?;

    Ok(())
}

fn format_timestamp(timestamp: &OffsetDateTime) -> Result<String, Error> {
    timestamp
        .format(&Rfc3339)
        .map_err(|error| Error::TimestampFormat(error.to_string()))
}

fn map_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let raw_type: String = row.get(5)?;
    let transaction_type = raw_type.parse::<TransactionType>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(error))
    })?;

    let raw_timestamp: String = row.get(7)?;
    let timestamp = OffsetDateTime::parse(&raw_timestamp, &Rfc3339).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(error))
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        amount: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        date: row.get(4)?,
        transaction_type,
        notes: row.get(6)?,
        timestamp,
    })
}

/// The state needed for listing transactions.
#[derive(Debug, Clone)]
pub struct ListTransactionsEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListTransactionsEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for updating a transaction.
#[derive(Debug, Clone)]
pub struct UpdateTransactionEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UpdateTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a transaction.
#[derive(Debug, Clone)]
pub struct DeleteTransactionEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteTransactionEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for listing all transactions, most recent date first.
pub async fn get_transactions_endpoint(
    State(state): State<ListTransactionsEndpointState>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions = get_all_transactions(&connection)?;

    Ok((StatusCode::OK, Json(transactions)).into_response())
}

/// A route handler for creating a new transaction.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionEndpointState>,
    payload: Result<Json<TransactionData>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(data) = payload.map_err(|rejection| Error::InvalidRequestBody(rejection.body_text()))?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = create_transaction(data, &connection)?;

    Ok((StatusCode::CREATED, Json(transaction)).into_response())
}

/// A route handler for updating a transaction.
///
/// PUT replaces all mutable fields, falling back to the previous value when
/// a field is omitted.
pub async fn update_transaction_endpoint(
    Path(transaction_id): Path<String>,
    State(state): State<UpdateTransactionEndpointState>,
    payload: Result<Json<TransactionData>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(data) = payload.map_err(|rejection| Error::InvalidRequestBody(rejection.body_text()))?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = update_transaction(&transaction_id, data, &connection)?;

    Ok((StatusCode::OK, Json(transaction)).into_response())
}

/// A route handler for deleting a transaction.
pub async fn delete_transaction_endpoint(
    Path(transaction_id): Path<String>,
    State(state): State<DeleteTransactionEndpointState>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_transaction(&transaction_id, &connection)?;

    Ok(Json(json!({ "success": true })).into_response())
}

#[cfg(test)]
mod transaction_query_tests {
    use std::{thread, time::Duration};

    use rusqlite::Connection;
    use time::macros::{date, datetime};

    use crate::{
        Error, TransactionType,
        transaction::{
            TransactionData, create_transaction, create_transaction_table, delete_transaction,
            get_all_transactions, get_transaction, update_transaction,
        },
    };

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_transaction_table(&connection).expect("Could not create transaction table");
        connection
    }

    fn groceries_data() -> TransactionData {
        TransactionData {
            amount: Some(45.99),
            description: Some("Groceries".to_string()),
            category: Some("Food".to_string()),
            date: Some("2023-09-03".to_string()),
            transaction_type: Some("expense".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn create_transaction_assigns_id_notes_and_timestamp() {
        let connection = get_test_db_connection();

        let transaction = create_transaction(groceries_data(), &connection)
            .expect("Could not create transaction");

        assert!(!transaction.id.is_empty());
        assert_eq!(transaction.notes, "");
        assert_eq!(transaction.date, date!(2023 - 09 - 03));
        assert_eq!(transaction.transaction_type, TransactionType::Expense);
        let age = time::OffsetDateTime::now_utc() - transaction.timestamp;
        assert!(age.whole_seconds().abs() < 5, "timestamp not near now");
    }

    #[test]
    fn create_transaction_keeps_client_supplied_timestamp() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            timestamp: Some("2001-01-01T00:00:00Z".to_string()),
            ..groceries_data()
        };

        let transaction = create_transaction(data, &connection).unwrap();

        assert_eq!(transaction.timestamp, datetime!(2001-01-01 00:00:00 UTC));
        let stored = get_transaction(&transaction.id, &connection).unwrap();
        assert_eq!(stored.timestamp, datetime!(2001-01-01 00:00:00 UTC));
    }

    #[test]
    fn create_transaction_fails_on_invalid_timestamp() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            timestamp: Some("yesterday".to_string()),
            ..groceries_data()
        };

        let result = create_transaction(data, &connection);

        assert!(matches!(result, Err(Error::InvalidTimestamp(text, _)) if text == "yesterday"));
    }

    #[test]
    fn update_transaction_ignores_client_supplied_timestamp() {
        let connection = get_test_db_connection();
        let inserted = create_transaction(groceries_data(), &connection).unwrap();

        let updated = update_transaction(
            &inserted.id,
            TransactionData {
                amount: Some(60.0),
                timestamp: Some("2001-01-01T00:00:00Z".to_string()),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert_ne!(updated.timestamp, datetime!(2001-01-01 00:00:00 UTC));
        assert!(updated.timestamp >= inserted.timestamp);
    }

    #[test]
    fn create_transaction_keeps_client_supplied_id_and_notes() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            id: Some("txn-1".to_string()),
            notes: Some("weekly shop".to_string()),
            ..groceries_data()
        };

        let transaction = create_transaction(data, &connection).unwrap();

        assert_eq!(transaction.id, "txn-1");
        assert_eq!(transaction.notes, "weekly shop");
    }

    #[test]
    fn create_transaction_fails_on_duplicate_id() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            id: Some("txn-1".to_string()),
            ..groceries_data()
        };
        create_transaction(data, &connection).unwrap();

        let duplicate = TransactionData {
            id: Some("txn-1".to_string()),
            ..groceries_data()
        };
        let result = create_transaction(duplicate, &connection);

        assert_eq!(result, Err(Error::DuplicateTransactionId));
    }

    #[test]
    fn create_transaction_fails_on_missing_required_fields() {
        let connection = get_test_db_connection();

        for (data, field) in [
            (
                TransactionData {
                    amount: None,
                    ..groceries_data()
                },
                "amount",
            ),
            (
                TransactionData {
                    description: None,
                    ..groceries_data()
                },
                "description",
            ),
            (
                TransactionData {
                    category: None,
                    ..groceries_data()
                },
                "category",
            ),
            (
                TransactionData {
                    date: None,
                    ..groceries_data()
                },
                "date",
            ),
            (
                TransactionData {
                    transaction_type: None,
                    ..groceries_data()
                },
                "type",
            ),
        ] {
            let result = create_transaction(data, &connection);

            assert_eq!(result, Err(Error::MissingField(field)));
        }
    }

    #[test]
    fn create_transaction_fails_on_invalid_type() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            transaction_type: Some("income".to_string()),
            ..groceries_data()
        };

        let result = create_transaction(data, &connection);

        assert_eq!(
            result,
            Err(Error::InvalidTransactionType("income".to_string()))
        );
    }

    #[test]
    fn create_transaction_fails_on_invalid_date() {
        let connection = get_test_db_connection();
        let data = TransactionData {
            date: Some("03/09/2023".to_string()),
            ..groceries_data()
        };

        let result = create_transaction(data, &connection);

        assert!(matches!(result, Err(Error::InvalidDate(text, _)) if text == "03/09/2023"));
    }

    #[test]
    fn get_transaction_round_trips() {
        let connection = get_test_db_connection();
        let inserted = create_transaction(groceries_data(), &connection).unwrap();

        let selected = get_transaction(&inserted.id, &connection);

        assert_eq!(selected, Ok(inserted));
    }

    #[test]
    fn get_transaction_with_unknown_id_returns_not_found() {
        let connection = get_test_db_connection();

        let selected = get_transaction("nope", &connection);

        assert_eq!(selected, Err(Error::NotFound));
    }

    #[test]
    fn get_all_transactions_orders_by_date_descending() {
        let connection = get_test_db_connection();
        for date_text in ["2023-09-03", "2023-12-25", "2023-01-01"] {
            create_transaction(
                TransactionData {
                    date: Some(date_text.to_string()),
                    ..groceries_data()
                },
                &connection,
            )
            .unwrap();
        }

        let transactions = get_all_transactions(&connection).unwrap();

        let dates: Vec<_> = transactions
            .iter()
            .map(|transaction| transaction.date)
            .collect();
        assert_eq!(
            dates,
            vec![
                date!(2023 - 12 - 25),
                date!(2023 - 09 - 03),
                date!(2023 - 01 - 01)
            ]
        );
    }

    #[test]
    fn update_transaction_replaces_supplied_fields_and_keeps_the_rest() {
        let connection = get_test_db_connection();
        let inserted = create_transaction(groceries_data(), &connection).unwrap();

        // Ensure the new timestamp is measurably later than the original.
        thread::sleep(Duration::from_millis(5));

        let updated = update_transaction(
            &inserted.id,
            TransactionData {
                amount: Some(60.0),
                notes: Some("forgot the milk".to_string()),
                ..Default::default()
            },
            &connection,
        )
        .unwrap();

        assert_eq!(updated.id, inserted.id);
        assert_eq!(updated.amount, 60.0);
        assert_eq!(updated.notes, "forgot the milk");
        assert_eq!(updated.description, inserted.description);
        assert_eq!(updated.category, inserted.category);
        assert_eq!(updated.date, inserted.date);
        assert!(updated.timestamp > inserted.timestamp);

        let stored = get_transaction(&inserted.id, &connection).unwrap();
        assert_eq!(stored, updated);
    }

    #[test]
    fn update_transaction_with_unknown_id_returns_not_found() {
        let connection = get_test_db_connection();

        let result = update_transaction("nope", TransactionData::default(), &connection);

        assert_eq!(result, Err(Error::UpdateMissingTransaction));
    }

    #[test]
    fn delete_transaction_removes_it_from_listing() {
        let connection = get_test_db_connection();
        let inserted = create_transaction(groceries_data(), &connection).unwrap();

        delete_transaction(&inserted.id, &connection).unwrap();

        assert_eq!(get_all_transactions(&connection), Ok(vec![]));
    }

    #[test]
    fn delete_transaction_twice_returns_not_found() {
        let connection = get_test_db_connection();
        let inserted = create_transaction(groceries_data(), &connection).unwrap();

        delete_transaction(&inserted.id, &connection).unwrap();
        let result = delete_transaction(&inserted.id, &connection);

        assert_eq!(result, Err(Error::DeleteMissingTransaction));
    }
}
