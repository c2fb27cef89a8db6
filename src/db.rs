//! Database initialization and the destructive reset workflow.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error, TransactionType, category::create_category_table, transaction::create_transaction_table,
};

/// The categories every deployment starts with, per transaction type.
///
/// These are seeded on first run and restored by [reset].
pub const DEFAULT_CATEGORIES: [(TransactionType, &[&str]); 4] = [
    (
        TransactionType::Expense,
        &[
            "Food",
            "Housing",
            "Transportation",
            "Entertainment",
            "Utilities",
            "Healthcare",
            "Shopping",
            "Education",
            "Personal",
            "Miscellaneous",
        ],
    ),
    (
        TransactionType::SalesIn,
        &["Salary", "Freelance", "Investments", "Gifts", "Other Income"],
    ),
    (
        TransactionType::SalesOut,
        &[
            "Materials",
            "Services",
            "Equipment",
            "Marketing",
            "Business Expenses",
        ],
    ),
    (
        TransactionType::Deposit,
        &[
            "Savings",
            "Investment",
            "Emergency Fund",
            "Retirement",
            "Vacation Fund",
        ],
    ),
];

/// Create the application tables if they do not exist and, if the category
/// table is empty, seed it with the default category set.
///
/// The whole operation runs in a single exclusive SQL transaction so a
/// half-initialized database is never observable.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_transaction_table(&transaction)?;
    create_category_table(&transaction)?;

    let category_count: i64 =
        transaction.query_row("SELECT COUNT(*) FROM category;", [], |row| row.get(0))?;

    if category_count == 0 {
        seed_default_categories(&transaction)?;
    }

    transaction.commit()?;

    Ok(())
}

/// Delete all transactions and categories, then restore the default category
/// set.
///
/// This is destructive and non-reversible. Repeated invocation always yields
/// the same canonical default-category state.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn reset(connection: &Connection) -> Result<(), Error> {
    let transaction =
        SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    transaction.execute("DELETE FROM \"transaction\";", ())?;
    transaction.execute("DELETE FROM category;", ())?;
    seed_default_categories(&transaction)?;

    transaction.commit()?;

    Ok(())
}

fn seed_default_categories(connection: &Connection) -> Result<(), rusqlite::Error> {
    let mut statement =
        connection.prepare("INSERT INTO category (type, name) VALUES (?1, ?2);")?;

    for (transaction_type, names) in DEFAULT_CATEGORIES {
        for name in names {
            statement.execute((transaction_type.as_str(), name))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod db_tests {
    use rusqlite::Connection;

    use crate::{
        TransactionType,
        category::{CategoryName, create_category},
        db::{DEFAULT_CATEGORIES, initialize, reset},
    };

    fn count_categories(connection: &Connection, transaction_type: TransactionType) -> i64 {
        connection
            .query_row(
                "SELECT COUNT(*) FROM category WHERE type = :type;",
                &[(":type", transaction_type.as_str())],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn count_transactions(connection: &Connection) -> i64 {
        connection
            .query_row("SELECT COUNT(*) FROM \"transaction\";", [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    #[test]
    fn initialize_seeds_default_categories() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();

        for (transaction_type, names) in DEFAULT_CATEGORIES {
            assert_eq!(
                count_categories(&connection, transaction_type),
                names.len() as i64,
                "wrong number of default categories for type {transaction_type}"
            );
        }
    }

    #[test]
    fn initialize_twice_does_not_duplicate_categories() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).unwrap();
        initialize(&connection).unwrap();

        assert_eq!(count_categories(&connection, TransactionType::Expense), 10);
    }

    #[test]
    fn initialize_preserves_user_categories() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        create_category(
            TransactionType::Expense,
            CategoryName::new("Pets").unwrap(),
            &connection,
        )
        .unwrap();

        initialize(&connection).unwrap();

        assert_eq!(count_categories(&connection, TransactionType::Expense), 11);
    }

    #[test]
    fn reset_restores_canonical_state() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        create_category(
            TransactionType::Deposit,
            CategoryName::new("Boat Fund").unwrap(),
            &connection,
        )
        .unwrap();
        connection
            .execute(
                "INSERT INTO \"transaction\" (id, amount, description, category, date, type, notes, timestamp)
                 VALUES ('abc', 1.0, 'test', 'Food', '2024-01-01', 'expense', '', '2024-01-01T00:00:00Z');",
                (),
            )
            .unwrap();

        reset(&connection).unwrap();

        assert_eq!(count_transactions(&connection), 0);
        for (transaction_type, names) in DEFAULT_CATEGORIES {
            assert_eq!(
                count_categories(&connection, transaction_type),
                names.len() as i64
            );
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();

        reset(&connection).unwrap();
        reset(&connection).unwrap();

        assert_eq!(count_categories(&connection, TransactionType::SalesIn), 5);
    }
}
