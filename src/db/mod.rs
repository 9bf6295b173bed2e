mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Conflict, InvalidInput};
use crate::models::*;

const TRANSACTION_COLUMNS: &str = "id, user_id, kind, amount, category_id, description, date, \
     source, definition_id, period, created_at, updated_at";

const FIXED_COLUMNS: &str =
    "id, user_id, name, kind, amount, category_id, note, is_active, created_at, updated_at";

/// Criteria for the amount/category/kind existence check used by the legacy
/// deduplication policy.
#[derive(Debug, Clone)]
pub struct EntryMatch {
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub kind: EntryKind,
    pub amount: Option<Decimal>,
    pub period: Period,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "moneytracker")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("moneytracker.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Category operations
    // ============================================================

    pub fn list_categories(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, kind, color, icon, description, created_at
             FROM categories WHERE user_id = ? ORDER BY kind, name",
        )?;

        let categories = stmt
            .query_map([user_id.to_string()], map_category)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    pub fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let category = conn
            .query_row(
                "SELECT id, user_id, name, kind, color, icon, description, created_at
                 FROM categories WHERE id = ?",
                [id.to_string()],
                map_category,
            )
            .optional()?;
        Ok(category)
    }

    pub fn create_category(&self, user_id: Uuid, input: CreateCategoryInput) -> Result<Category> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO categories (id, user_id, name, kind, color, icon, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                &input.name,
                input.kind.as_str(),
                &input.color,
                &input.icon,
                &input.description,
                fmt_datetime(now),
            ),
        )?;

        Ok(Category {
            id,
            user_id,
            name: input.name,
            kind: input.kind,
            color: input.color,
            icon: input.icon,
            description: input.description,
            created_at: now,
        })
    }

    pub fn delete_category(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM categories WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Transaction operations
    // ============================================================

    /// Transactions of a user, newest first, optionally limited to one period.
    pub fn list_transactions(
        &self,
        user_id: Uuid,
        period: Option<Period>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let transactions = match period {
            Some(period) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions
                     WHERE user_id = ? AND date >= ? AND date < ?
                     ORDER BY date DESC, created_at DESC"
                ))?;
                let (start, end) = period_bounds(period);
                let rows = stmt
                    .query_map((user_id.to_string(), start, end), map_transaction)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions
                     WHERE user_id = ? ORDER BY date DESC, created_at DESC"
                ))?;
                let rows = stmt
                    .query_map([user_id.to_string()], map_transaction)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(transactions)
    }

    pub fn get_transaction(&self, user_id: Uuid, id: Uuid) -> Result<Option<Transaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let transaction = conn
            .query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ? AND user_id = ?"),
                (id.to_string(), user_id.to_string()),
                map_transaction,
            )
            .optional()?;
        Ok(transaction)
    }

    pub fn create_transaction(
        &self,
        user_id: Uuid,
        input: CreateTransactionInput,
    ) -> Result<Transaction> {
        ensure_non_negative(input.amount, "Transaction")?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO transactions
                (id, user_id, kind, amount, category_id, description, date, source, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'manual', ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                input.kind.as_str(),
                fmt_amount(input.amount),
                input.category_id.to_string(),
                &input.description,
                fmt_datetime(input.date),
                fmt_datetime(now),
                fmt_datetime(now),
            ),
        )?;

        Ok(Transaction {
            id,
            user_id,
            kind: input.kind,
            amount: input.amount,
            category_id: input.category_id,
            description: input.description,
            date: truncate_seconds(input.date),
            source: EntrySource::Manual,
            definition_id: None,
            period: None,
            created_at: truncate_seconds(now),
            updated_at: truncate_seconds(now),
        })
    }

    pub fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateTransactionInput,
    ) -> Result<Option<Transaction>> {
        if let Some(amount) = input.amount {
            ensure_non_negative(amount, "Transaction")?;
        }
        let Some(existing) = self.get_transaction(user_id, id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let kind = input.kind.unwrap_or(existing.kind);
        let amount = input.amount.unwrap_or(existing.amount);
        let category_id = input.category_id.unwrap_or(existing.category_id);
        let description = input.description.unwrap_or_else(|| existing.description.clone());
        let date = input.date.map(truncate_seconds).unwrap_or(existing.date);
        let (source, definition_id, period) = rekey_generated(&conn, &existing, date)?;

        conn.execute(
            "UPDATE transactions
             SET kind = ?, amount = ?, category_id = ?, description = ?, date = ?,
                 source = ?, definition_id = ?, period = ?, updated_at = ?
             WHERE id = ?",
            (
                kind.as_str(),
                fmt_amount(amount),
                category_id.to_string(),
                &description,
                fmt_datetime(date),
                source.as_str(),
                definition_id.map(|d| d.to_string()),
                &period,
                fmt_datetime(now),
                id.to_string(),
            ),
        )?;

        Ok(Some(Transaction {
            kind,
            amount,
            category_id,
            description,
            date,
            source,
            definition_id,
            period,
            updated_at: truncate_seconds(now),
            ..existing
        }))
    }

    pub fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM transactions WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Fixed transaction operations
    // ============================================================

    pub fn list_fixed_transactions(&self, user_id: Uuid) -> Result<Vec<FixedTransaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {FIXED_COLUMNS} FROM fixed_transactions WHERE user_id = ? ORDER BY name"
        ))?;

        let fixed = stmt
            .query_map([user_id.to_string()], map_fixed)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fixed)
    }

    pub fn get_fixed_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<FixedTransaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let fixed = conn
            .query_row(
                &format!("SELECT {FIXED_COLUMNS} FROM fixed_transactions WHERE id = ? AND user_id = ?"),
                (id.to_string(), user_id.to_string()),
                map_fixed,
            )
            .optional()?;
        Ok(fixed)
    }

    pub fn create_fixed_transaction(
        &self,
        user_id: Uuid,
        input: CreateFixedTransactionInput,
    ) -> Result<FixedTransaction> {
        ensure_non_negative(input.amount, "Fixed transaction")?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let is_active = input.is_active.unwrap_or(true);

        conn.execute(
            "INSERT INTO fixed_transactions
                (id, user_id, name, kind, amount, category_id, note, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                &input.name,
                input.kind.as_str(),
                fmt_amount(input.amount),
                input.category_id.to_string(),
                &input.note,
                is_active as i32,
                fmt_datetime(now),
                fmt_datetime(now),
            ),
        )?;

        Ok(FixedTransaction {
            id,
            user_id,
            name: input.name,
            kind: input.kind,
            amount: input.amount,
            category_id: input.category_id,
            note: input.note,
            is_active,
            created_at: truncate_seconds(now),
            updated_at: truncate_seconds(now),
        })
    }

    pub fn update_fixed_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateFixedTransactionInput,
    ) -> Result<Option<FixedTransaction>> {
        let Some(existing) = self.get_fixed_transaction(user_id, id)? else {
            return Ok(None);
        };
        if let Some(amount) = input.amount {
            ensure_non_negative(amount, "Fixed transaction")?;
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let kind = input.kind.unwrap_or(existing.kind);
        let amount = input.amount.unwrap_or(existing.amount);
        let category_id = input.category_id.unwrap_or(existing.category_id);
        let note = input.note.or(existing.note);
        let is_active = input.is_active.unwrap_or(existing.is_active);

        conn.execute(
            "UPDATE fixed_transactions
             SET name = ?, kind = ?, amount = ?, category_id = ?, note = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
            (
                &name,
                kind.as_str(),
                fmt_amount(amount),
                category_id.to_string(),
                &note,
                is_active as i32,
                fmt_datetime(now),
                id.to_string(),
            ),
        )?;

        Ok(Some(FixedTransaction {
            id,
            user_id,
            name,
            kind,
            amount,
            category_id,
            note,
            is_active,
            created_at: existing.created_at,
            updated_at: truncate_seconds(now),
        }))
    }

    pub fn delete_fixed_transaction(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM fixed_transactions WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    /// Active fixed transactions, for one user or for everyone.
    pub fn list_active_definitions(&self, user_id: Option<Uuid>) -> Result<Vec<FixedTransaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let fixed = match user_id {
            Some(user_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FIXED_COLUMNS} FROM fixed_transactions
                     WHERE is_active = 1 AND user_id = ? ORDER BY created_at, id"
                ))?;
                let rows = stmt
                    .query_map([user_id.to_string()], map_fixed)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FIXED_COLUMNS} FROM fixed_transactions
                     WHERE is_active = 1 ORDER BY created_at, id"
                ))?;
                let rows = stmt
                    .query_map([], map_fixed)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(fixed)
    }

    pub fn count_active_definitions(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM fixed_transactions WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Total amount of a user's active fixed transactions of one kind.
    pub fn sum_active_definitions(&self, user_id: Uuid, kind: EntryKind) -> Result<Decimal> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT amount FROM fixed_transactions WHERE user_id = ? AND kind = ? AND is_active = 1",
        )?;
        let amounts = stmt
            .query_map((user_id.to_string(), kind.as_str()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sum_amounts(amounts))
    }

    // ============================================================
    // Ledger queries used by the materializer and analyzer
    // ============================================================

    /// Count entries of a user in a period matching kind and, when given,
    /// category and exact amount.
    pub fn count_matching_entries(&self, filter: &EntryMatch) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let (start, end) = period_bounds(filter.period);
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE user_id = ?1 AND kind = ?2 AND date >= ?3 AND date < ?4
               AND (?5 IS NULL OR category_id = ?5)
               AND (?6 IS NULL OR amount = ?6)",
            (
                filter.user_id.to_string(),
                filter.kind.as_str(),
                start,
                end,
                filter.category_id.map(|c| c.to_string()),
                filter.amount.map(fmt_amount),
            ),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count generated entries back-referencing a fixed transaction for a period.
    pub fn count_generated_for(&self, definition_id: Uuid, period: Period) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE definition_id = ? AND period = ?",
            (definition_id.to_string(), period.key()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count entries of all users in a period whose description starts with a
    /// generated-entry marker. The prefix comparison is case-sensitive.
    pub fn count_marker_entries(&self, period: Period) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let (start, end) = period_bounds(period);
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE date >= ?1 AND date < ?2
               AND (substr(description, 1, length(?3)) = ?3
                    OR substr(description, 1, length(?4)) = ?4)",
            (
                start,
                end,
                format!("{}:", EntryKind::Income.marker()),
                format!("{}:", EntryKind::Expense.marker()),
            ),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count active fixed transactions that have no generated entry for a period.
    pub fn count_definitions_missing_entry(&self, period: Period) -> Result<i64> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count = conn.query_row(
            "SELECT COUNT(*) FROM fixed_transactions f
             WHERE f.is_active = 1
               AND NOT EXISTS (
                   SELECT 1 FROM transactions t
                   WHERE t.definition_id = f.id AND t.period = ?
               )",
            [period.key()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Book the entry for a fixed transaction in a period, dated to the first
    /// instant of the period.
    ///
    /// Returns `None` when an entry for the same fixed transaction and period
    /// already exists; the unique index decides, so concurrent callers cannot
    /// both succeed.
    pub fn insert_generated_entry(
        &self,
        definition: &FixedTransaction,
        period: Period,
    ) -> Result<Option<Transaction>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let description = definition.generated_description();
        let date = period.start();

        let rows = conn.execute(
            "INSERT OR IGNORE INTO transactions
                (id, user_id, kind, amount, category_id, description, date,
                 source, definition_id, period, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'generated', ?, ?, ?, ?)",
            (
                id.to_string(),
                definition.user_id.to_string(),
                definition.kind.as_str(),
                fmt_amount(definition.amount),
                definition.category_id.to_string(),
                &description,
                fmt_datetime(date),
                definition.id.to_string(),
                period.key(),
                fmt_datetime(now),
                fmt_datetime(now),
            ),
        )?;

        if rows == 0 {
            return Ok(None);
        }

        Ok(Some(Transaction {
            id,
            user_id: definition.user_id,
            kind: definition.kind,
            amount: definition.amount,
            category_id: definition.category_id,
            description,
            date,
            source: EntrySource::Generated,
            definition_id: Some(definition.id),
            period: Some(period.key()),
            created_at: truncate_seconds(now),
            updated_at: truncate_seconds(now),
        }))
    }

    /// Delete the entries generated from a fixed transaction.
    ///
    /// Always removes entries of the same user, category and kind whose
    /// description equals the fixed transaction's marker string exactly. With
    /// `include_back_references`, entries pointing at the fixed transaction by
    /// id are removed as well.
    pub fn delete_generated_entries(
        &self,
        definition: &FixedTransaction,
        include_back_references: bool,
    ) -> Result<usize> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut deleted = conn.execute(
            "DELETE FROM transactions
             WHERE user_id = ? AND category_id = ? AND kind = ? AND description = ?",
            (
                definition.user_id.to_string(),
                definition.category_id.to_string(),
                definition.kind.as_str(),
                definition.generated_description(),
            ),
        )?;

        if include_back_references {
            deleted += conn.execute(
                "DELETE FROM transactions WHERE definition_id = ?",
                [definition.id.to_string()],
            )?;
        }

        Ok(deleted)
    }

    /// Sum of a user's entries of one kind in a period, optionally for one category.
    pub fn sum_entries(
        &self,
        user_id: Uuid,
        kind: EntryKind,
        category_id: Option<Uuid>,
        period: Period,
    ) -> Result<Decimal> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let (start, end) = period_bounds(period);
        let mut stmt = conn.prepare(
            "SELECT amount FROM transactions
             WHERE user_id = ?1 AND kind = ?2 AND date >= ?3 AND date < ?4
               AND (?5 IS NULL OR category_id = ?5)",
        )?;
        let amounts = stmt
            .query_map(
                (
                    user_id.to_string(),
                    kind.as_str(),
                    start,
                    end,
                    category_id.map(|c| c.to_string()),
                ),
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sum_amounts(amounts))
    }

    pub fn count_entries(
        &self,
        user_id: Uuid,
        kind: EntryKind,
        category_id: Option<Uuid>,
        period: Period,
    ) -> Result<i64> {
        self.count_matching_entries(&EntryMatch {
            user_id,
            category_id,
            kind,
            amount: None,
            period,
        })
    }

    // ============================================================
    // Monthly budget operations
    // ============================================================

    pub fn get_budget(&self, user_id: Uuid, period: Period) -> Result<Option<MonthlyBudget>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let budget = conn
            .query_row(
                "SELECT id, user_id, year, month, amount, created_at, updated_at
                 FROM budgets WHERE user_id = ? AND year = ? AND month = ?",
                (user_id.to_string(), period.year(), period.month()),
                map_budget,
            )
            .optional()?;
        Ok(budget)
    }

    pub fn create_budget(&self, user_id: Uuid, input: CreateBudgetInput) -> Result<MonthlyBudget> {
        let period = Period::new(input.year, input.month)?;
        ensure_non_negative(input.amount, "Budget")?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO budgets (id, user_id, year, month, amount, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                period.year(),
                period.month(),
                fmt_amount(input.amount),
                fmt_datetime(now),
                fmt_datetime(now),
            ),
        )
        .map_err(|e| conflict_or(e, format!("Budget for {}", period)))?;

        Ok(MonthlyBudget {
            id,
            user_id,
            year: period.year(),
            month: period.month(),
            amount: input.amount,
            created_at: truncate_seconds(now),
            updated_at: truncate_seconds(now),
        })
    }

    pub fn update_budget(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateBudgetInput,
    ) -> Result<Option<MonthlyBudget>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = conn
            .query_row(
                "SELECT id, user_id, year, month, amount, created_at, updated_at
                 FROM budgets WHERE id = ? AND user_id = ?",
                (id.to_string(), user_id.to_string()),
                map_budget,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let period = Period::new(
            input.year.unwrap_or(existing.year),
            input.month.unwrap_or(existing.month),
        )?;
        let amount = input.amount.unwrap_or(existing.amount);
        ensure_non_negative(amount, "Budget")?;
        let now = Utc::now();

        conn.execute(
            "UPDATE budgets SET year = ?, month = ?, amount = ?, updated_at = ? WHERE id = ?",
            (
                period.year(),
                period.month(),
                fmt_amount(amount),
                fmt_datetime(now),
                id.to_string(),
            ),
        )
        .map_err(|e| conflict_or(e, format!("Budget for {}", period)))?;

        Ok(Some(MonthlyBudget {
            year: period.year(),
            month: period.month(),
            amount,
            updated_at: truncate_seconds(now),
            ..existing
        }))
    }

    pub fn delete_budget(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM budgets WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Category budget operations
    // ============================================================

    pub fn list_category_budgets(&self, user_id: Uuid, period: Period) -> Result<Vec<CategoryBudget>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, user_id, category_id, year, month, amount, created_at, updated_at
             FROM category_budgets WHERE user_id = ? AND year = ? AND month = ?
             ORDER BY created_at, id",
        )?;

        let budgets = stmt
            .query_map(
                (user_id.to_string(), period.year(), period.month()),
                map_category_budget,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(budgets)
    }

    pub fn sum_category_budgets(&self, user_id: Uuid, period: Period) -> Result<Decimal> {
        let budgets = self.list_category_budgets(user_id, period)?;
        Ok(budgets.iter().map(|b| b.amount).sum())
    }

    pub fn create_category_budget(
        &self,
        user_id: Uuid,
        input: CreateCategoryBudgetInput,
    ) -> Result<CategoryBudget> {
        let period = Period::new(input.year, input.month)?;
        ensure_non_negative(input.amount, "Category budget")?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO category_budgets
                (id, user_id, category_id, year, month, amount, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                input.category_id.to_string(),
                period.year(),
                period.month(),
                fmt_amount(input.amount),
                fmt_datetime(now),
                fmt_datetime(now),
            ),
        )
        .map_err(|e| conflict_or(e, format!("Category budget for {}", period)))?;

        Ok(CategoryBudget {
            id,
            user_id,
            category_id: input.category_id,
            year: period.year(),
            month: period.month(),
            amount: input.amount,
            created_at: truncate_seconds(now),
            updated_at: truncate_seconds(now),
        })
    }

    pub fn update_category_budget(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateCategoryBudgetInput,
    ) -> Result<Option<CategoryBudget>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let Some(existing) = conn
            .query_row(
                "SELECT id, user_id, category_id, year, month, amount, created_at, updated_at
                 FROM category_budgets WHERE id = ? AND user_id = ?",
                (id.to_string(), user_id.to_string()),
                map_category_budget,
            )
            .optional()?
        else {
            return Ok(None);
        };

        let period = Period::new(
            input.year.unwrap_or(existing.year),
            input.month.unwrap_or(existing.month),
        )?;
        let category_id = input.category_id.unwrap_or(existing.category_id);
        let amount = input.amount.unwrap_or(existing.amount);
        ensure_non_negative(amount, "Category budget")?;
        let now = Utc::now();

        conn.execute(
            "UPDATE category_budgets
             SET category_id = ?, year = ?, month = ?, amount = ?, updated_at = ?
             WHERE id = ?",
            (
                category_id.to_string(),
                period.year(),
                period.month(),
                fmt_amount(amount),
                fmt_datetime(now),
                id.to_string(),
            ),
        )
        .map_err(|e| conflict_or(e, format!("Category budget for {}", period)))?;

        Ok(Some(CategoryBudget {
            category_id,
            year: period.year(),
            month: period.month(),
            amount,
            updated_at: truncate_seconds(now),
            ..existing
        }))
    }

    pub fn delete_category_budget(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM category_budgets WHERE id = ? AND user_id = ?",
            (id.to_string(), user_id.to_string()),
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Row mapping
// ============================================================

fn map_category(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        kind: parse_kind(row.get::<_, String>(3)?),
        color: row.get(4)?,
        icon: row.get(5)?,
        description: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        kind: parse_kind(row.get::<_, String>(2)?),
        amount: parse_amount(row.get::<_, String>(3)?),
        category_id: parse_uuid(row.get::<_, String>(4)?),
        description: row.get(5)?,
        date: parse_datetime(row.get::<_, String>(6)?),
        source: EntrySource::from_str(&row.get::<_, String>(7)?).unwrap_or(EntrySource::Manual),
        definition_id: row.get::<_, Option<String>>(8)?.map(parse_uuid),
        period: row.get(9)?,
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn map_fixed(row: &Row<'_>) -> rusqlite::Result<FixedTransaction> {
    Ok(FixedTransaction {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        kind: parse_kind(row.get::<_, String>(3)?),
        amount: parse_amount(row.get::<_, String>(4)?),
        category_id: parse_uuid(row.get::<_, String>(5)?),
        note: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn map_budget(row: &Row<'_>) -> rusqlite::Result<MonthlyBudget> {
    Ok(MonthlyBudget {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        year: row.get(2)?,
        month: row.get(3)?,
        amount: parse_amount(row.get::<_, String>(4)?),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

fn map_category_budget(row: &Row<'_>) -> rusqlite::Result<CategoryBudget> {
    Ok(CategoryBudget {
        id: parse_uuid(row.get::<_, String>(0)?),
        user_id: parse_uuid(row.get::<_, String>(1)?),
        category_id: parse_uuid(row.get::<_, String>(2)?),
        year: row.get(3)?,
        month: row.get(4)?,
        amount: parse_amount(row.get::<_, String>(5)?),
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    })
}

// ============================================================
// Value encoding
// ============================================================

/// Timestamps are stored at second precision with a `Z` suffix so that string
/// comparison in SQL matches chronological order.
fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn truncate_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    parse_datetime(fmt_datetime(dt))
}

/// Amounts are stored normalized (`100` rather than `100.00`) so that equal
/// values compare equal as text.
fn fmt_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

fn period_bounds(period: Period) -> (String, String) {
    (fmt_datetime(period.start()), fmt_datetime(period.end()))
}

fn sum_amounts(amounts: Vec<String>) -> Decimal {
    amounts.into_iter().map(parse_amount).sum()
}

fn ensure_non_negative(amount: Decimal, what: &str) -> Result<()> {
    if amount.is_sign_negative() {
        return Err(InvalidInput(format!("{what} amount must not be negative")).into());
    }
    Ok(())
}

/// Provenance of a generated entry after its date moves to `date`.
///
/// The period key follows the date so the entry keeps counting for the month
/// it now sits in. When that month already holds the fixed transaction's
/// entry, the moved row becomes a manual entry instead.
fn rekey_generated(
    conn: &Connection,
    existing: &Transaction,
    date: DateTime<Utc>,
) -> Result<(EntrySource, Option<Uuid>, Option<String>)> {
    let (EntrySource::Generated, Some(definition_id)) = (existing.source, existing.definition_id)
    else {
        return Ok((existing.source, existing.definition_id, existing.period.clone()));
    };

    let key = Period::containing(date).key();
    if existing.period.as_deref() == Some(key.as_str()) {
        return Ok((EntrySource::Generated, Some(definition_id), Some(key)));
    }

    let taken: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE definition_id = ? AND period = ? AND id != ?",
        (definition_id.to_string(), &key, existing.id.to_string()),
        |row| row.get(0),
    )?;
    if taken > 0 {
        tracing::debug!(
            "Entry {} moved into {} which is already booked; keeping it as manual",
            existing.id,
            key
        );
        return Ok((EntrySource::Manual, None, None));
    }

    Ok((EntrySource::Generated, Some(definition_id), Some(key)))
}

fn conflict_or(err: rusqlite::Error, what: String) -> anyhow::Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => Conflict(what).into(),
        _ => err.into(),
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_kind(s: String) -> EntryKind {
    EntryKind::from_str(&s).unwrap_or(EntryKind::Expense)
}

fn parse_amount(s: String) -> Decimal {
    s.parse::<Decimal>().unwrap_or(Decimal::ZERO)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
