mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::analyzer::BudgetAnalyzer;
use crate::db::Database;
use crate::materializer::Materializer;
use crate::scheduler::Scheduler;

/// Handles shared by every request. All of them point at the same database.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub materializer: Materializer,
    pub analyzer: BudgetAnalyzer,
    pub scheduler: Scheduler,
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Categories
        .route("/users/{user_id}/categories", get(handlers::list_categories))
        .route("/users/{user_id}/categories", post(handlers::create_category))
        .route("/users/{user_id}/categories/{id}", delete(handlers::delete_category))
        // Transactions
        .route("/users/{user_id}/transactions", get(handlers::list_transactions))
        .route("/users/{user_id}/transactions", post(handlers::create_transaction))
        .route("/users/{user_id}/transactions/{id}", get(handlers::get_transaction))
        .route("/users/{user_id}/transactions/{id}", put(handlers::update_transaction))
        .route("/users/{user_id}/transactions/{id}", delete(handlers::delete_transaction))
        // Fixed transactions
        .route("/users/{user_id}/fixed-transactions", get(handlers::list_fixed_transactions))
        .route("/users/{user_id}/fixed-transactions", post(handlers::create_fixed_transaction))
        .route("/users/{user_id}/fixed-transactions/{id}", put(handlers::update_fixed_transaction))
        .route("/users/{user_id}/fixed-transactions/{id}", delete(handlers::delete_fixed_transaction))
        // Monthly budgets
        .route("/users/{user_id}/budgets", post(handlers::create_budget))
        .route("/users/{user_id}/budgets/{year}/{month}", get(handlers::get_budget))
        .route("/users/{user_id}/budgets/{id}", put(handlers::update_budget))
        .route("/users/{user_id}/budgets/{id}", delete(handlers::delete_budget))
        // Category budgets
        .route("/users/{user_id}/category-budgets", post(handlers::create_category_budget))
        .route("/users/{user_id}/category-budgets/{year}/{month}", get(handlers::list_category_budgets))
        .route("/users/{user_id}/category-budgets/{id}", put(handlers::update_category_budget))
        .route("/users/{user_id}/category-budgets/{id}", delete(handlers::delete_category_budget))
        // Analysis
        .route("/users/{user_id}/budget-analysis/{year}/{month}", get(handlers::get_budget_analysis))
        .route(
            "/users/{user_id}/budget-analysis/{year}/{month}/categories",
            get(handlers::get_category_budget_analysis),
        )
        .route("/users/{user_id}/budget-remaining/{year}/{month}", get(handlers::get_remaining_budget))
        .route("/users/{user_id}/budget-history", get(handlers::get_budget_history))
        // Scheduler
        .route("/scheduler/run", post(handlers::run_scheduler))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
