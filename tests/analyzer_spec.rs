use std::sync::Arc;

use chrono::{TimeZone, Utc};
use moneytracker::analyzer::BudgetAnalyzer;
use moneytracker::clock::FixedClock;
use moneytracker::db::Database;
use moneytracker::error::AnalysisError;
use moneytracker::models::*;
use rust_decimal::Decimal;
use speculate2::speculate;
use uuid::Uuid;

fn june() -> Period {
    Period::new(2026, 6).unwrap()
}

fn spend(db: &Database, user_id: Uuid, category_id: Uuid, amount: i64, period: Period) {
    db.create_transaction(
        user_id,
        CreateTransactionInput {
            kind: EntryKind::Expense,
            amount: Decimal::from(amount),
            category_id,
            description: "Shopping".to_string(),
            date: period.start() + chrono::Duration::days(2),
        },
    )
    .expect("Failed to create transaction");
}

fn set_budget(db: &Database, user_id: Uuid, period: Period, amount: i64) {
    db.create_budget(
        user_id,
        CreateBudgetInput {
            year: period.year(),
            month: period.month(),
            amount: Decimal::from(amount),
        },
    )
    .expect("Failed to create budget");
}

fn set_category_budget(db: &Database, user_id: Uuid, category_id: Uuid, amount: i64) {
    db.create_category_budget(
        user_id,
        CreateCategoryBudgetInput {
            category_id,
            year: 2026,
            month: 6,
            amount: Decimal::from(amount),
        },
    )
    .expect("Failed to create category budget");
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        // 10 June 2026; June has 30 days.
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 6, 10, 14, 0, 0).unwrap());
        let analyzer = BudgetAnalyzer::new(db.clone(), Arc::new(clock.clone()));
        let user_id = Uuid::new_v4();
        let category_id = Uuid::new_v4();
    }

    describe "analyze" {
        it "computes remaining budget and utilization" {
            set_budget(&db, user_id, june(), 1000);
            spend(&db, user_id, category_id, 400, june());

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.monthly_budget, Decimal::from(1000));
            assert_eq!(analysis.current_spending, Decimal::from(400));
            assert_eq!(analysis.remaining_budget, Decimal::from(600));
            assert_eq!(analysis.budget_utilization, Decimal::from(40));
        }

        it "counts days from today through the end of the current month" {
            set_budget(&db, user_id, june(), 1000);
            spend(&db, user_id, category_id, 400, june());

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.days_remaining, 21);
            assert_eq!(analysis.daily_average, Decimal::new(2857, 2));
        }

        it "uses the full length for other months" {
            let may = june().previous();

            let analysis = analyzer.analyze(user_id, may).expect("Analysis failed");

            assert_eq!(analysis.days_remaining, 31);
        }

        it "reports zero utilization and allowance without a ceiling" {
            spend(&db, user_id, category_id, 250, june());

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.monthly_budget, Decimal::ZERO);
            assert_eq!(analysis.budget_utilization, Decimal::ZERO);
            assert_eq!(analysis.daily_average, Decimal::ZERO);
            assert_eq!(analysis.remaining_budget, Decimal::from(-250));
        }

        it "falls back to the sum of category budgets" {
            set_budget(&db, user_id, june(), 0);
            set_category_budget(&db, user_id, category_id, 300);
            set_category_budget(&db, user_id, Uuid::new_v4(), 200);

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.monthly_budget, Decimal::from(500));
        }

        it "ignores income and other months" {
            set_budget(&db, user_id, june(), 1000);
            spend(&db, user_id, category_id, 100, june().previous());
            db.create_transaction(user_id, CreateTransactionInput {
                kind: EntryKind::Income,
                amount: Decimal::from(3000),
                category_id,
                description: "Salary".to_string(),
                date: june().start(),
            }).expect("Failed to create transaction");

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.current_spending, Decimal::ZERO);
        }

        it "reports active fixed expenses for display" {
            db.create_fixed_transaction(user_id, CreateFixedTransactionInput {
                name: "Rent".to_string(),
                kind: EntryKind::Expense,
                amount: Decimal::from(900),
                category_id,
                note: None,
                is_active: None,
            }).expect("Failed to create fixed transaction");

            let analysis = analyzer.analyze(user_id, june()).expect("Analysis failed");

            assert_eq!(analysis.total_fixed_expenses, Decimal::from(900));
            assert_eq!(analysis.current_spending, Decimal::ZERO);
        }
    }

    describe "analyze_by_category" {
        it "returns nothing without category budgets" {
            spend(&db, user_id, category_id, 40, june());

            let rows = analyzer.analyze_by_category(user_id, june()).expect("Analysis failed");

            assert!(rows.is_empty());
        }

        it "flags categories that went over budget" {
            let category = db.create_category(user_id, CreateCategoryInput {
                name: "Dining".to_string(),
                kind: EntryKind::Expense,
                color: Some("#ff8800".to_string()),
                icon: Some("fork".to_string()),
                description: None,
            }).expect("Failed to create category");
            set_category_budget(&db, user_id, category.id, 100);
            spend(&db, user_id, category.id, 80, june());
            spend(&db, user_id, category.id, 45, june());

            let rows = analyzer.analyze_by_category(user_id, june()).expect("Analysis failed");

            assert_eq!(rows.len(), 1);
            let row = &rows[0];
            assert_eq!(row.category_name, Some("Dining".to_string()));
            assert_eq!(row.category_icon, Some("fork".to_string()));
            assert_eq!(row.spent_amount, Decimal::from(125));
            assert_eq!(row.remaining_amount, Decimal::from(-25));
            assert_eq!(row.utilization_rate, Decimal::from(125));
            assert_eq!(row.transaction_count, 2);
            assert!(row.is_over_budget);
        }

        it "leaves category details empty for unknown categories" {
            set_category_budget(&db, user_id, category_id, 100);

            let rows = analyzer.analyze_by_category(user_id, june()).expect("Analysis failed");

            assert_eq!(rows.len(), 1);
            assert!(rows[0].category_name.is_none());
            assert!(!rows[0].is_over_budget);
        }
    }

    describe "history" {
        it "returns the trailing months oldest first ending now" {
            let history = analyzer.history(user_id, 6).expect("History failed");

            let months: Vec<(i32, u32)> = history.iter().map(|h| (h.year, h.month)).collect();
            assert_eq!(months, vec![(2026, 1), (2026, 2), (2026, 3), (2026, 4), (2026, 5), (2026, 6)]);
        }

        it "crosses year boundaries" {
            clock.set(Utc.with_ymd_and_hms(2027, 2, 3, 8, 0, 0).unwrap());

            let history = analyzer.history(user_id, 3).expect("History failed");

            let months: Vec<(i32, u32)> = history.iter().map(|h| (h.year, h.month)).collect();
            assert_eq!(months, vec![(2026, 12), (2027, 1), (2027, 2)]);
        }

        it "computes savings rate and the exceeded flag per month" {
            let may = june().previous();
            set_budget(&db, user_id, may, 1000);
            spend(&db, user_id, category_id, 1200, may);
            set_budget(&db, user_id, june(), 1000);
            spend(&db, user_id, category_id, 250, june());

            let history = analyzer.history(user_id, 2).expect("History failed");

            assert_eq!(history[0].savings_rate, Decimal::from(-20));
            assert!(history[0].budget_exceeded);
            assert_eq!(history[1].savings_rate, Decimal::from(75));
            assert!(!history[1].budget_exceeded);
        }

        it "caps an oversized window at the earliest month" {
            clock.set(Utc.with_ymd_and_hms(1, 3, 1, 0, 0, 0).unwrap());

            let history = analyzer.history(user_id, usize::MAX).expect("History failed");

            let months: Vec<(i32, u32)> = history.iter().map(|h| (h.year, h.month)).collect();
            assert_eq!(months, vec![(1, 1), (1, 2), (1, 3)]);
        }

        it "never flags a month without a budget as exceeded" {
            spend(&db, user_id, category_id, 500, june());

            let history = analyzer.history(user_id, 1).expect("History failed");

            assert_eq!(history[0].savings_rate, Decimal::ZERO);
            assert!(!history[0].budget_exceeded);
        }
    }

    describe "remaining_budget" {
        it "requires a monthly budget" {
            let result = analyzer.remaining_budget(user_id, june());

            assert!(matches!(result, Err(AnalysisError::ConfigurationNotFound { .. })));
        }

        it "deducts fixed expenses and spending" {
            set_budget(&db, user_id, june(), 1000);
            spend(&db, user_id, category_id, 200, june());
            db.create_fixed_transaction(user_id, CreateFixedTransactionInput {
                name: "Insurance".to_string(),
                kind: EntryKind::Expense,
                amount: Decimal::from(300),
                category_id,
                note: None,
                is_active: None,
            }).expect("Failed to create fixed transaction");

            let remaining = analyzer.remaining_budget(user_id, june()).expect("Query failed");

            assert_eq!(remaining.fixed_expenses, Decimal::from(300));
            assert_eq!(remaining.current_spending, Decimal::from(200));
            assert_eq!(remaining.remaining_budget, Decimal::from(500));
        }
    }
}
