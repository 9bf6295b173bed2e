//! Budget utilization reports over the ledger.
//!
//! The analyzer never writes. Generated fixed-transaction entries are ordinary
//! expense or income rows by the time it reads them, so spending totals
//! include them without special handling.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::AnalysisError;
use crate::models::*;

#[derive(Clone)]
pub struct BudgetAnalyzer {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl BudgetAnalyzer {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Utilization of the month's ceiling by expense entries.
    ///
    /// A month without any budget configuration yields a zero ceiling, zero
    /// utilization and a zero daily allowance rather than an error.
    pub fn analyze(&self, user_id: Uuid, period: Period) -> Result<BudgetAnalysis, AnalysisError> {
        let ceiling = self.effective_ceiling(user_id, period)?;
        let spending = self
            .db
            .sum_entries(user_id, EntryKind::Expense, None, period)?;
        let total_fixed_expenses = self
            .db
            .sum_active_definitions(user_id, EntryKind::Expense)?;

        let remaining = ceiling - spending;
        let days_remaining = self.days_remaining(period);
        let daily_average = if days_remaining > 0 && remaining > Decimal::ZERO {
            (remaining / Decimal::from(days_remaining)).round_dp(2)
        } else {
            Decimal::ZERO
        };

        tracing::debug!(
            "Analyzed {} for {}: ceiling {}, spent {}",
            period,
            user_id,
            ceiling,
            spending
        );

        Ok(BudgetAnalysis {
            year: period.year(),
            month: period.month(),
            monthly_budget: ceiling,
            total_fixed_expenses,
            current_spending: spending,
            remaining_budget: remaining,
            budget_utilization: percentage(spending, ceiling),
            days_remaining,
            daily_average,
        })
    }

    /// One row per category budget of the month, in creation order.
    pub fn analyze_by_category(
        &self,
        user_id: Uuid,
        period: Period,
    ) -> Result<Vec<CategoryBudgetAnalysis>, AnalysisError> {
        let budgets = self.db.list_category_budgets(user_id, period)?;
        let mut rows = Vec::with_capacity(budgets.len());

        for budget in budgets {
            let spent = self.db.sum_entries(
                user_id,
                EntryKind::Expense,
                Some(budget.category_id),
                period,
            )?;
            let count = self.db.count_entries(
                user_id,
                EntryKind::Expense,
                Some(budget.category_id),
                period,
            )?;
            let category = self.db.get_category(budget.category_id)?;

            rows.push(CategoryBudgetAnalysis {
                category_id: budget.category_id,
                category_name: category.as_ref().map(|c| c.name.clone()),
                category_color: category.as_ref().and_then(|c| c.color.clone()),
                category_icon: category.as_ref().and_then(|c| c.icon.clone()),
                budget_amount: budget.amount,
                spent_amount: spent,
                remaining_amount: budget.amount - spent,
                utilization_rate: percentage(spent, budget.amount),
                is_over_budget: spent > budget.amount,
                transaction_count: count,
            });
        }

        Ok(rows)
    }

    /// The last `months_back` months, oldest first, ending with the current one.
    pub fn history(
        &self,
        user_id: Uuid,
        months_back: usize,
    ) -> Result<Vec<BudgetHistory>, AnalysisError> {
        let current = Period::containing(self.clock.now());
        let fixed_expenses = self
            .db
            .sum_active_definitions(user_id, EntryKind::Expense)?;

        current
            .trailing(months_back)
            .into_iter()
            .map(|period| -> Result<BudgetHistory, AnalysisError> {
                let budget = self.effective_ceiling(user_id, period)?;
                let actual = self
                    .db
                    .sum_entries(user_id, EntryKind::Expense, None, period)?;

                Ok(BudgetHistory {
                    year: period.year(),
                    month: period.month(),
                    budget,
                    actual_spending: actual,
                    fixed_expenses,
                    savings_rate: percentage(budget - actual, budget),
                    budget_exceeded: budget > Decimal::ZERO && actual > budget,
                })
            })
            .collect()
    }

    /// Monthly budget minus fixed expenses minus spending so far.
    ///
    /// Unlike [`analyze`](Self::analyze) this needs an explicit monthly budget.
    pub fn remaining_budget(
        &self,
        user_id: Uuid,
        period: Period,
    ) -> Result<RemainingBudget, AnalysisError> {
        let budget = self
            .db
            .get_budget(user_id, period)?
            .ok_or(AnalysisError::ConfigurationNotFound {
                what: "monthly budget",
                period,
            })?;
        let fixed_expenses = self
            .db
            .sum_active_definitions(user_id, EntryKind::Expense)?;
        let spending = self
            .db
            .sum_entries(user_id, EntryKind::Expense, None, period)?;

        Ok(RemainingBudget {
            year: period.year(),
            month: period.month(),
            monthly_budget: budget.amount,
            fixed_expenses,
            current_spending: spending,
            remaining_budget: budget.amount - fixed_expenses - spending,
        })
    }

    /// The monthly budget when set and non-zero, else the sum of the month's
    /// category budgets.
    fn effective_ceiling(&self, user_id: Uuid, period: Period) -> anyhow::Result<Decimal> {
        match self.db.get_budget(user_id, period)? {
            Some(budget) if !budget.amount.is_zero() => Ok(budget.amount),
            _ => self.db.sum_category_budgets(user_id, period),
        }
    }

    fn days_remaining(&self, period: Period) -> u32 {
        let now = self.clock.now();
        if !period.contains(now) {
            return period.days();
        }
        let left = (period.last_day() - now.date_naive()).num_days() + 1;
        u32::try_from(left.max(0)).unwrap_or(0)
    }
}

/// `part` as a percentage of `whole`, two decimals; zero when `whole` is zero.
fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|pct| pct.round_dp(2))
        .unwrap_or(Decimal::ZERO)
}
