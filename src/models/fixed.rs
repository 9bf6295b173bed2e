use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::EntryKind;

/// A recurring income or expense, materialized into the ledger once per month.
///
/// Fixed transactions are templates: the user creates, edits and deactivates
/// them, the materializer only reads them. Deleting one also removes the
/// ledger entries that were generated from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category_id: Uuid,
    pub note: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FixedTransaction {
    /// The description every generated entry of this fixed transaction carries,
    /// e.g. `fixed-expense: Rent`.
    pub fn generated_description(&self) -> String {
        format!("{}: {}", self.kind.marker(), self.name)
    }
}

/// Input for creating a fixed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFixedTransactionInput {
    pub name: String,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub category_id: Uuid,
    pub note: Option<String>,
    /// Defaults to `true` when not specified.
    pub is_active: Option<bool>,
}

/// Input for editing a fixed transaction. All fields are optional for partial updates.
///
/// Edits never touch entries that were already generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFixedTransactionInput {
    pub name: Option<String>,
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub note: Option<String>,
    pub is_active: Option<bool>,
}
