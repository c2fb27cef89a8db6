//! Defines the four kinds of financial event the application tracks.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The kind of financial event a transaction records.
///
/// Categories are scoped to a single transaction type, so the same name may
/// exist under different types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    /// Money spent, e.g. groceries or rent.
    Expense,
    /// Incoming money, e.g. salary or freelance income.
    SalesIn,
    /// Outgoing business money, e.g. materials or marketing.
    SalesOut,
    /// Money set aside, e.g. savings or retirement funds.
    Deposit,
}

impl TransactionType {
    /// All transaction types in the order they are presented to clients.
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Expense,
        TransactionType::SalesIn,
        TransactionType::SalesOut,
        TransactionType::Deposit,
    ];

    /// The string stored in the database and used in URLs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::SalesIn => "sales-in",
            TransactionType::SalesOut => "sales-out",
            TransactionType::Deposit => "deposit",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(TransactionType::Expense),
            "sales-in" => Ok(TransactionType::SalesIn),
            "sales-out" => Ok(TransactionType::SalesOut),
            "deposit" => Ok(TransactionType::Deposit),
            other => Err(Error::InvalidTransactionType(other.to_string())),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
