//! Domain models for MoneyTracker.
//!
//! # Core Concepts
//!
//! - [`Transaction`]: A booked income or expense. Either entered by the user or
//!   generated from a fixed transaction.
//! - [`FixedTransaction`]: A recurring template that the materializer books into
//!   the ledger once per [`Period`].
//! - [`MonthlyBudget`] / [`CategoryBudget`]: Spending ceilings for a month, either
//!   overall or per category.
//! - [`Period`]: A calendar month with a half-open UTC range.
//!
//! Analysis results ([`BudgetAnalysis`], [`CategoryBudgetAnalysis`],
//! [`BudgetHistory`], [`RemainingBudget`]) are derived on demand and never stored.

mod analysis;
mod budget;
mod category;
mod fixed;
mod period;
mod transaction;

pub use analysis::*;
pub use budget::*;
pub use category::*;
pub use fixed::*;
pub use period::*;
pub use transaction::*;
