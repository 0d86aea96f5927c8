use axum::Router;
use migration::{Migrator, MigratorTrait};
use moka::future::Cache;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;

use crate::ai::client::GeminiClient;
use crate::middleware::rate_limit::RateLimiter;
use crate::router::create_router;
use crate::schemas::AppState;

/// Create an in-memory SQLite database for testing
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    // Run migrations
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Create AppState for testing. The rate limiter is sized so tests never
/// trip it; the model client carries a dummy key and is only exercised by
/// tests that expect the external call to fail fast or never happen.
pub async fn setup_test_app_state() -> AppState {
    let db = setup_test_db().await;
    let cache = Cache::new(100);

    AppState {
        db,
        cache,
        gemini: GeminiClient::new("test-key".to_string(), "gemini-2.5-flash".to_string()),
        limiter: Arc::new(RateLimiter::new(100_000, Duration::from_secs(10))),
    }
}

/// Create axum app for testing
pub async fn setup_test_app() -> Router {
    let state = setup_test_app_state().await;
    create_router(state)
}
