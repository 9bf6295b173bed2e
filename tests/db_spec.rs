use chrono::{TimeZone, Utc};
use moneytracker::db::{Database, EntryMatch};
use moneytracker::error::{Conflict, InvalidInput};
use moneytracker::models::*;
use rust_decimal::Decimal;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_category(db: &Database, user_id: Uuid, kind: EntryKind) -> Category {
    db.create_category(
        user_id,
        CreateCategoryInput {
            name: "Housing".to_string(),
            kind,
            color: Some("#336699".to_string()),
            icon: None,
            description: None,
        },
    )
    .expect("Failed to create category")
}

fn create_fixed(
    db: &Database,
    user_id: Uuid,
    category_id: Uuid,
    name: &str,
    amount: i64,
) -> FixedTransaction {
    db.create_fixed_transaction(
        user_id,
        CreateFixedTransactionInput {
            name: name.to_string(),
            kind: EntryKind::Expense,
            amount: Decimal::from(amount),
            category_id,
            note: None,
            is_active: None,
        },
    )
    .expect("Failed to create fixed transaction")
}

fn book(db: &Database, user_id: Uuid, category_id: Uuid, amount: i64, day: u32) -> Transaction {
    db.create_transaction(
        user_id,
        CreateTransactionInput {
            kind: EntryKind::Expense,
            amount: Decimal::from(amount),
            category_id,
            description: "Groceries".to_string(),
            date: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
        },
    )
    .expect("Failed to create transaction")
}

fn march() -> Period {
    Period::new(2026, 3).unwrap()
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let user_id = Uuid::new_v4();
    }

    describe "categories" {
        it "creates and lists categories of one user only" {
            create_test_category(&db, user_id, EntryKind::Expense);
            create_test_category(&db, Uuid::new_v4(), EntryKind::Expense);

            let categories = db.list_categories(user_id).expect("Query failed");
            assert_eq!(categories.len(), 1);
            assert_eq!(categories[0].name, "Housing");
            assert_eq!(categories[0].color, Some("#336699".to_string()));
        }

        it "does not delete another user's category" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);

            assert!(!db.delete_category(Uuid::new_v4(), category.id).expect("Delete failed"));
            assert!(db.delete_category(user_id, category.id).expect("Delete failed"));
            assert!(db.get_category(category.id).expect("Query failed").is_none());
        }
    }

    describe "transactions" {
        it "stores manual entries with manual provenance" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let entry = book(&db, user_id, category.id, 42, 5);

            let found = db.get_transaction(user_id, entry.id)
                .expect("Query failed")
                .expect("Transaction missing");
            assert_eq!(found.amount, Decimal::from(42));
            assert_eq!(found.source, EntrySource::Manual);
            assert!(found.definition_id.is_none());
            assert!(found.period.is_none());
        }

        it "filters the listing by period using a half-open range" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            book(&db, user_id, category.id, 10, 1);
            book(&db, user_id, category.id, 20, 31);
            db.create_transaction(user_id, CreateTransactionInput {
                kind: EntryKind::Expense,
                amount: Decimal::from(30),
                category_id: category.id,
                description: String::new(),
                date: Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
            }).expect("Failed to create transaction");

            let in_march = db.list_transactions(user_id, Some(march())).expect("Query failed");
            assert_eq!(in_march.len(), 2);
            assert_eq!(in_march[0].amount, Decimal::from(20));

            let all = db.list_transactions(user_id, None).expect("Query failed");
            assert_eq!(all.len(), 3);
        }

        it "applies partial updates" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let entry = book(&db, user_id, category.id, 42, 5);

            let updated = db.update_transaction(user_id, entry.id, UpdateTransactionInput {
                amount: Some(Decimal::new(4550, 2)),
                ..Default::default()
            })
            .expect("Update failed")
            .expect("Transaction missing");

            assert_eq!(updated.amount, Decimal::new(4550, 2));
            assert_eq!(updated.description, "Groceries");
        }

        it "rejects negative amounts" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let err = db.create_transaction(user_id, CreateTransactionInput {
                kind: EntryKind::Expense,
                amount: Decimal::from(-1),
                category_id: category.id,
                description: String::new(),
                date: Utc::now(),
            }).unwrap_err();

            assert!(err.downcast_ref::<InvalidInput>().is_some());
        }

        it "sums and counts entries per category and period" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let other = create_test_category(&db, user_id, EntryKind::Expense);
            book(&db, user_id, category.id, 100, 2);
            book(&db, user_id, category.id, 50, 3);
            book(&db, user_id, other.id, 7, 3);

            let total = db.sum_entries(user_id, EntryKind::Expense, None, march()).expect("Sum failed");
            let only_one = db.sum_entries(user_id, EntryKind::Expense, Some(category.id), march())
                .expect("Sum failed");
            let count = db.count_entries(user_id, EntryKind::Expense, Some(category.id), march())
                .expect("Count failed");
            let income = db.sum_entries(user_id, EntryKind::Income, None, march()).expect("Sum failed");

            assert_eq!(total, Decimal::from(157));
            assert_eq!(only_one, Decimal::from(150));
            assert_eq!(count, 2);
            assert_eq!(income, Decimal::ZERO);
        }

        it "matches entries by amount regardless of decimal scale" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            book(&db, user_id, category.id, 100, 2);

            let count = db.count_matching_entries(&EntryMatch {
                user_id,
                category_id: Some(category.id),
                kind: EntryKind::Expense,
                amount: Some(Decimal::new(10000, 2)),
                period: march(),
            }).expect("Count failed");

            assert_eq!(count, 1);
        }
    }

    describe "fixed transactions" {
        it "defaults to active and lists by name" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            create_fixed(&db, user_id, category.id, "Rent", 900);
            create_fixed(&db, user_id, category.id, "Insurance", 80);

            let fixed = db.list_fixed_transactions(user_id).expect("Query failed");
            assert_eq!(fixed.len(), 2);
            assert_eq!(fixed[0].name, "Insurance");
            assert!(fixed.iter().all(|f| f.is_active));
        }

        it "sums only active fixed transactions of one kind" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            create_fixed(&db, user_id, category.id, "Rent", 900);
            let gym = create_fixed(&db, user_id, category.id, "Gym", 30);
            db.update_fixed_transaction(user_id, gym.id, UpdateFixedTransactionInput {
                is_active: Some(false),
                ..Default::default()
            }).expect("Update failed");

            let expenses = db.sum_active_definitions(user_id, EntryKind::Expense).expect("Sum failed");
            let income = db.sum_active_definitions(user_id, EntryKind::Income).expect("Sum failed");

            assert_eq!(expenses, Decimal::from(900));
            assert_eq!(income, Decimal::ZERO);
            assert_eq!(db.count_active_definitions().expect("Count failed"), 1);
        }
    }

    describe "generated entries" {
        it "books one entry per fixed transaction and period" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let rent = create_fixed(&db, user_id, category.id, "Rent", 900);

            let first = db.insert_generated_entry(&rent, march()).expect("Insert failed");
            let second = db.insert_generated_entry(&rent, march()).expect("Insert failed");

            let entry = first.expect("First insert should book an entry");
            assert!(second.is_none());
            assert_eq!(entry.description, "fixed-expense: Rent");
            assert_eq!(entry.source, EntrySource::Generated);
            assert_eq!(entry.definition_id, Some(rent.id));
            assert_eq!(entry.period, Some("2026-03".to_string()));
            assert_eq!(entry.date, march().start());
            assert_eq!(db.count_generated_for(rent.id, march()).expect("Count failed"), 1);
        }

        it "counts marker entries and fixed transactions without an entry" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let rent = create_fixed(&db, user_id, category.id, "Rent", 900);
            create_fixed(&db, user_id, category.id, "Insurance", 80);
            db.insert_generated_entry(&rent, march()).expect("Insert failed");
            book(&db, user_id, category.id, 12, 4);

            assert_eq!(db.count_marker_entries(march()).expect("Count failed"), 1);
            assert_eq!(db.count_definitions_missing_entry(march()).expect("Count failed"), 1);
        }

        it "deletes only entries with the exact marker description" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let rent = create_fixed(&db, user_id, category.id, "Rent", 900);
            db.insert_generated_entry(&rent, march()).expect("Insert failed");
            db.insert_generated_entry(&rent, march().next()).expect("Insert failed");
            db.create_transaction(user_id, CreateTransactionInput {
                kind: EntryKind::Expense,
                amount: Decimal::from(900),
                category_id: category.id,
                description: "fixed-expense: Rent deposit".to_string(),
                date: march().start(),
            }).expect("Failed to create transaction");

            let deleted = db.delete_generated_entries(&rent, false).expect("Delete failed");

            assert_eq!(deleted, 2);
            let left = db.list_transactions(user_id, None).expect("Query failed");
            assert_eq!(left.len(), 1);
            assert_eq!(left[0].description, "fixed-expense: Rent deposit");
        }

        it "deletes renamed entries by back-reference when asked" {
            let category = create_test_category(&db, user_id, EntryKind::Expense);
            let rent = create_fixed(&db, user_id, category.id, "Rent", 900);
            db.insert_generated_entry(&rent, march()).expect("Insert failed");
            let renamed = db.update_fixed_transaction(user_id, rent.id, UpdateFixedTransactionInput {
                name: Some("Apartment".to_string()),
                ..Default::default()
            })
            .expect("Update failed")
            .expect("Fixed transaction missing");

            assert_eq!(db.delete_generated_entries(&renamed, false).expect("Delete failed"), 0);
            assert_eq!(db.delete_generated_entries(&renamed, true).expect("Delete failed"), 1);
        }
    }

    describe "budgets" {
        it "rejects a second monthly budget for the same month" {
            db.create_budget(user_id, CreateBudgetInput { year: 2026, month: 3, amount: Decimal::from(1000) })
                .expect("Failed to create budget");

            let err = db.create_budget(user_id, CreateBudgetInput {
                year: 2026,
                month: 3,
                amount: Decimal::from(500),
            }).unwrap_err();

            assert!(err.downcast_ref::<Conflict>().is_some());
        }

        it "rejects an invalid month" {
            let err = db.create_budget(user_id, CreateBudgetInput {
                year: 2026,
                month: 13,
                amount: Decimal::from(500),
            }).unwrap_err();

            assert!(err.downcast_ref::<PeriodError>().is_some());
        }

        it "finds the budget of a period and updates it" {
            let budget = db.create_budget(user_id, CreateBudgetInput {
                year: 2026,
                month: 3,
                amount: Decimal::from(1000),
            }).expect("Failed to create budget");

            let updated = db.update_budget(user_id, budget.id, UpdateBudgetInput {
                amount: Some(Decimal::from(1200)),
                ..Default::default()
            })
            .expect("Update failed")
            .expect("Budget missing");
            let found = db.get_budget(user_id, march())
                .expect("Query failed")
                .expect("Budget missing");

            assert_eq!(updated.amount, Decimal::from(1200));
            assert_eq!(found.amount, Decimal::from(1200));
            assert!(db.get_budget(user_id, march().next()).expect("Query failed").is_none());
        }

        it "sums the category budgets of a month" {
            let housing = create_test_category(&db, user_id, EntryKind::Expense);
            let food = create_test_category(&db, user_id, EntryKind::Expense);
            for (category_id, amount) in [(housing.id, 900), (food.id, 300)] {
                db.create_category_budget(user_id, CreateCategoryBudgetInput {
                    category_id,
                    year: 2026,
                    month: 3,
                    amount: Decimal::from(amount),
                }).expect("Failed to create category budget");
            }

            let listed = db.list_category_budgets(user_id, march()).expect("Query failed");
            let total = db.sum_category_budgets(user_id, march()).expect("Sum failed");

            assert_eq!(listed.len(), 2);
            assert_eq!(total, Decimal::from(1200));
        }

        it "rejects a duplicate category budget" {
            let housing = create_test_category(&db, user_id, EntryKind::Expense);
            let input = CreateCategoryBudgetInput {
                category_id: housing.id,
                year: 2026,
                month: 3,
                amount: Decimal::from(900),
            };
            db.create_category_budget(user_id, input.clone()).expect("Failed to create category budget");

            let err = db.create_category_budget(user_id, input).unwrap_err();
            assert!(err.downcast_ref::<Conflict>().is_some());
        }
    }
}
