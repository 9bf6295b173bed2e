use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether money comes in or goes out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Description prefix carried by ledger entries generated from a fixed
    /// transaction of this kind.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Income => "fixed-income",
            Self::Expense => "fixed-expense",
        }
    }
}

/// Where a ledger entry came from.
///
/// - `Manual`: entered by the user
/// - `Generated`: created by the materializer from a [`FixedTransaction`](super::FixedTransaction)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    Manual,
    Generated,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Generated => "generated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "generated" => Some(Self::Generated),
            _ => None,
        }
    }
}

/// A single booked income or expense in the ledger.
///
/// Generated entries keep a back-reference to the fixed transaction and the
/// period (`YYYY-MM`) their date falls in. Their description is always
/// `"<marker>: <fixed transaction name>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category_id: Uuid,
    pub description: String,
    /// The instant the entry is booked against.
    pub date: DateTime<Utc>,
    pub source: EntrySource,
    pub definition_id: Option<Uuid>,
    pub period: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for booking a transaction by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionInput {
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category_id: Uuid,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
}

/// Input for editing a transaction. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTransactionInput {
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub date: Option<DateTime<Utc>>,
}
