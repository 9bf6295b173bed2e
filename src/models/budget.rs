use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A spending ceiling for a whole month. Unique per (user, year, month).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyBudget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBudgetInput {
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBudgetInput {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub amount: Option<Decimal>,
}

/// A spending ceiling for one category in one month.
/// Unique per (user, category, year, month).
///
/// When no monthly budget is set, the sum of a month's category budgets acts
/// as the monthly ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryBudgetInput {
    pub category_id: Uuid,
    pub year: i32,
    pub month: u32,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategoryBudgetInput {
    pub category_id: Option<Uuid>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub amount: Option<Decimal>,
}
