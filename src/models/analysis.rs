use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time budget utilization for one month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAnalysis {
    pub year: i32,
    pub month: u32,
    /// Effective ceiling: the monthly budget, else the sum of category budgets, else zero.
    pub monthly_budget: Decimal,
    /// Sum of the user's active fixed expenses. Informational; generated
    /// entries are already part of `current_spending`.
    pub total_fixed_expenses: Decimal,
    pub current_spending: Decimal,
    pub remaining_budget: Decimal,
    /// Percentage of the ceiling spent, zero when there is no ceiling.
    pub budget_utilization: Decimal,
    pub days_remaining: u32,
    /// Amount that can still be spent per remaining day.
    pub daily_average: Decimal,
}

/// Spending against one category budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBudgetAnalysis {
    pub category_id: Uuid,
    pub category_name: Option<String>,
    pub category_color: Option<String>,
    pub category_icon: Option<String>,
    pub budget_amount: Decimal,
    pub spent_amount: Decimal,
    pub remaining_amount: Decimal,
    pub utilization_rate: Decimal,
    pub is_over_budget: bool,
    pub transaction_count: i64,
}

/// One month of the trailing budget history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetHistory {
    pub year: i32,
    pub month: u32,
    pub budget: Decimal,
    pub actual_spending: Decimal,
    /// Active fixed expenses; fixed income is excluded.
    pub fixed_expenses: Decimal,
    pub savings_rate: Decimal,
    pub budget_exceeded: bool,
}

/// What is left of a monthly budget once fixed expenses and spending are deducted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingBudget {
    pub year: i32,
    pub month: u32,
    pub monthly_budget: Decimal,
    pub fixed_expenses: Decimal,
    pub current_spending: Decimal,
    pub remaining_budget: Decimal,
}
