//! This file defines the `Category` type, the types needed to create and
//! rename a category and the API routes for the category type.
//! A category is a named classification bucket scoped to one transaction
//! type.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    extract::{FromRef, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, Error, TransactionType};

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// # Errors
    ///
    /// This function will return an [Error::EmptyCategoryName] if `name` is an empty string.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyCategoryName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CategoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CategoryName::new(s)
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A classification bucket for transactions, e.g. 'Food' or 'Salary'.
///
/// The pair `(type, name)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Category {
    /// The transaction type the category is scoped to.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// The name of the category.
    pub name: CategoryName,
}

/// All category names grouped by transaction type, in insertion order.
///
/// Every type is present in the listing, even when it has no categories.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryListing {
    /// Names of expense categories.
    pub expense: Vec<String>,
    /// Names of incoming sales categories.
    #[serde(rename = "sales-in")]
    pub sales_in: Vec<String>,
    /// Names of outgoing sales categories.
    #[serde(rename = "sales-out")]
    pub sales_out: Vec<String>,
    /// Names of deposit categories.
    pub deposit: Vec<String>,
}

/// Create a category in the database.
///
/// # Errors
/// This function will return an error if `(type, name)` already exists or if
/// there is an SQL error.
pub fn create_category(
    transaction_type: TransactionType,
    name: CategoryName,
    connection: &Connection,
) -> Result<Category, Error> {
    connection.execute(
        "INSERT INTO category (type, name) VALUES (?1, ?2);",
        (transaction_type.as_str(), name.as_ref()),
    )?;

    Ok(Category {
        transaction_type,
        name,
    })
}

/// Retrieve all categories, grouped by transaction type in insertion order.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_categories(connection: &Connection) -> Result<CategoryListing, Error> {
    let mut statement =
        connection.prepare("SELECT type, name FROM category ORDER BY rowid ASC;")?;
    let rows = statement.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut listing = CategoryListing::default();

    for row in rows {
        let (raw_type, name) = row.map_err(Error::from)?;

        match raw_type.parse::<TransactionType>()? {
            TransactionType::Expense => listing.expense.push(name),
            TransactionType::SalesIn => listing.sales_in.push(name),
            TransactionType::SalesOut => listing.sales_out.push(name),
            TransactionType::Deposit => listing.deposit.push(name),
        }
    }

    Ok(listing)
}

/// Rename a category and update every transaction that references it.
///
/// Both updates run in a single SQL transaction: either the category row and
/// all matching transactions change together, or neither does. Renaming a
/// category to its current name is a no-op success.
///
/// # Errors
/// This function will return an error if `(type, old_name)` does not exist,
/// if `(type, new_name)` is already taken by a different category, or if
/// there is an SQL error.
pub fn rename_category(
    transaction_type: TransactionType,
    old_name: &str,
    new_name: CategoryName,
    connection: &Connection,
) -> Result<Category, Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    if new_name.as_ref() != old_name {
        let target_exists: bool = transaction.query_row(
            "SELECT EXISTS (SELECT 1 FROM category WHERE type = ?1 AND name = ?2);",
            (transaction_type.as_str(), new_name.as_ref()),
            |row| row.get(0),
        )?;

        if target_exists {
            return Err(Error::DuplicateCategory);
        }
    }

    let rows_affected = transaction.execute(
        "UPDATE category SET name = ?1 WHERE type = ?2 AND name = ?3;",
        (new_name.as_ref(), transaction_type.as_str(), old_name),
    )?;

    if rows_affected == 0 {
        return Err(Error::RenameMissingCategory);
    }

    transaction.execute(
        "UPDATE \"transaction\" SET category = ?1 WHERE type = ?2 AND category = ?3;",
        (new_name.as_ref(), transaction_type.as_str(), old_name),
    )?;

    transaction.commit()?;

    Ok(Category {
        transaction_type,
        name: new_name,
    })
}

/// Delete a category from the database.
///
/// Does NOT cascade to transactions: rows that reference the deleted name
/// keep it.
///
/// # Errors
/// This function will return an error if there is an SQL error or if the
/// category doesn't exist.
pub fn delete_category(
    transaction_type: TransactionType,
    name: &str,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM category WHERE type = ?1 AND name = ?2;",
        (transaction_type.as_str(), name),
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingCategory);
    }

    Ok(())
}

/// Create the category table if it does not exist.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
            type TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (type, name)
        );",
        (),
    )?;

    Ok(())
}

/// The fields a client supplies when creating a category.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryData {
    /// The transaction type as a string, e.g. `"expense"`.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// The name of the new category.
    pub name: Option<String>,
}

/// The fields a client supplies when renaming a category.
///
/// Clients should send `new_name`; `name` is accepted as an alias.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RenameCategoryData {
    /// The new name of the category.
    pub new_name: Option<String>,
    /// Alias for `new_name`.
    pub name: Option<String>,
}

/// The state needed for listing categories.
#[derive(Debug, Clone)]
pub struct ListCategoriesEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ListCategoriesEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a category.
#[derive(Debug, Clone)]
pub struct CreateCategoryEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for renaming a category.
#[derive(Debug, Clone)]
pub struct RenameCategoryEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RenameCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a category.
#[derive(Debug, Clone)]
pub struct DeleteCategoryEndpointState {
    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteCategoryEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for listing all categories grouped by transaction type.
pub async fn get_categories_endpoint(
    State(state): State<ListCategoriesEndpointState>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let listing = get_all_categories(&connection)?;

    Ok((StatusCode::OK, Json(listing)).into_response())
}

/// A route handler for creating a new category.
pub async fn create_category_endpoint(
    State(state): State<CreateCategoryEndpointState>,
    payload: Result<Json<CategoryData>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(data) = payload.map_err(|rejection| Error::InvalidRequestBody(rejection.body_text()))?;

    let transaction_type = data
        .transaction_type
        .ok_or(Error::MissingField("type"))?
        .parse::<TransactionType>()?;
    let name = CategoryName::new(&data.name.ok_or(Error::MissingField("name"))?)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = create_category(transaction_type, name, &connection)?;

    Ok((StatusCode::CREATED, Json(category)).into_response())
}

/// A route handler for renaming a category and cascading the rename to its
/// transactions.
pub async fn rename_category_endpoint(
    Path((raw_type, old_name)): Path<(String, String)>,
    State(state): State<RenameCategoryEndpointState>,
    payload: Result<Json<RenameCategoryData>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(data) = payload.map_err(|rejection| Error::InvalidRequestBody(rejection.body_text()))?;

    let transaction_type = raw_type.parse::<TransactionType>()?;
    let new_name = data
        .new_name
        .or(data.name)
        .ok_or(Error::MissingField("new_name"))?;
    let new_name = CategoryName::new(&new_name)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = rename_category(transaction_type, &old_name, new_name, &connection)?;

    Ok((StatusCode::OK, Json(category)).into_response())
}

/// A route handler for deleting a category.
pub async fn delete_category_endpoint(
    Path((raw_type, name)): Path<(String, String)>,
    State(state): State<DeleteCategoryEndpointState>,
) -> Result<Response, Error> {
    let transaction_type = raw_type.parse::<TransactionType>()?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_category(transaction_type, &name, &connection)?;

    Ok(Json(json!({ "success": true })).into_response())
}

#[cfg(test)]
mod category_name_tests {
    use crate::{Error, category::CategoryName};

    #[test]
    fn new_fails_on_empty_string() {
        let name = CategoryName::new("");

        assert_eq!(name, Err(Error::EmptyCategoryName));
    }

    #[test]
    fn new_fails_on_just_whitespace() {
        let name = CategoryName::new("\n\t \r");

        assert_eq!(name, Err(Error::EmptyCategoryName));
    }

    #[test]
    fn new_trims_surrounding_whitespace() {
        let name = CategoryName::new("  Food  ").unwrap();

        assert_eq!(name.as_ref(), "Food");
    }
}
