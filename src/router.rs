use crate::handlers::{
    ai::{ai_health, chat, market_data},
    finance::{get_financial_breakdown, get_financial_summary},
    health::health_check,
    transactions::{
        bulk_delete_transactions, create_transaction, delete_transaction, get_transaction,
        get_transaction_summary, get_transactions, update_transaction,
    },
    upload::{bulk_upload_transactions, get_upload_history, upload_file},
    users::{create_user, delete_user, email_available, get_user, get_users, update_user},
};
use crate::ingest::MAX_UPLOAD_BYTES;
use crate::middleware::rate_limit::rate_limit;
use crate::schemas::{ApiDoc, AppState};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // User CRUD routes
        .route("/api/users", get(get_users))
        .route("/api/users", post(create_user))
        .route("/api/users/email-available", get(email_available))
        .route("/api/users/:user_id", get(get_user))
        .route("/api/users/:user_id", put(update_user))
        .route("/api/users/:user_id", delete(delete_user))
        // Per-user transaction routes
        .route(
            "/api/users/:user_id/transactions",
            get(get_transactions)
                .post(create_transaction)
                .delete(bulk_delete_transactions),
        )
        .route(
            "/api/users/:user_id/transactions/summary",
            get(get_transaction_summary),
        )
        .route(
            "/api/users/:user_id/transactions/:transaction_id",
            get(get_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        // Aggregation routes
        .route(
            "/api/users/:user_id/finance/summary",
            get(get_financial_summary),
        )
        .route(
            "/api/users/:user_id/finance/breakdown",
            get(get_financial_breakdown),
        )
        // Statement ingestion routes
        .route("/api/upload/file", post(upload_file))
        .route("/api/upload/bulk", post(bulk_upload_transactions))
        .route("/api/upload/history/:user_id", get(get_upload_history))
        // Assistant routes
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/market-data", get(market_data))
        .route("/api/ai/health", get(ai_health))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(120)))
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
                .layer(from_fn_with_state(state.clone(), rate_limit)),
        )
        .with_state(state)
}
