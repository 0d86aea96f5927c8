use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::ai::client::GeminiClient;
use crate::finance::{FinancialBreakdown, FinancialSummary};
use crate::middleware::rate_limit::RateLimiter;

/// Application state shared across handlers
#[derive(Clone, Debug)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Cache for expensive aggregation responses
    pub cache: Cache<String, CachedData>,
    /// External generative-model client
    pub gemini: GeminiClient,
    /// Token-bucket admission control
    pub limiter: Arc<RateLimiter>,
}

/// Cached data types
#[derive(Clone, Debug)]
pub enum CachedData {
    Summary(FinancialSummary),
    Breakdown(FinancialBreakdown),
}

/// Query parameters for the finance summary endpoint
#[derive(Debug, Deserialize, ToSchema)]
pub struct SummaryQuery {
    /// Reporting period: day, week, month, year or all (default all)
    pub period: Option<String>,
}

/// Query parameters for the finance breakdown endpoint
#[derive(Debug, Deserialize, ToSchema)]
pub struct BreakdownQuery {
    /// Bucket grain: day, week, month or year (default month)
    #[serde(rename = "groupBy")]
    pub group_by: Option<String>,
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            success: false,
        }
    }
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::users::create_user,
        crate::handlers::users::get_users,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::users::email_available,
        crate::handlers::transactions::get_transactions,
        crate::handlers::transactions::get_transaction_summary,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::update_transaction,
        crate::handlers::transactions::delete_transaction,
        crate::handlers::transactions::bulk_delete_transactions,
        crate::handlers::finance::get_financial_summary,
        crate::handlers::finance::get_financial_breakdown,
        crate::handlers::upload::upload_file,
        crate::handlers::upload::bulk_upload_transactions,
        crate::handlers::upload::get_upload_history,
        crate::handlers::ai::chat,
        crate::handlers::ai::market_data,
        crate::handlers::ai::ai_health,
    ),
    components(
        schemas(
            ApiResponse<crate::handlers::users::UserResponse>,
            ApiResponse<Vec<crate::handlers::users::UserResponse>>,
            ApiResponse<crate::handlers::transactions::TransactionResponse>,
            ApiResponse<Vec<crate::handlers::transactions::TransactionResponse>>,
            ApiResponse<crate::finance::FinancialSummary>,
            ApiResponse<crate::finance::FinancialBreakdown>,
            ApiResponse<crate::finance::TransactionOverview>,
            ErrorResponse,
            HealthResponse,
            SummaryQuery,
            BreakdownQuery,
            crate::handlers::users::CreateUserRequest,
            crate::handlers::users::UpdateUserRequest,
            crate::handlers::users::UserResponse,
            crate::handlers::users::EmailAvailability,
            crate::handlers::users::UserDeletion,
            crate::handlers::transactions::TransactionResponse,
            crate::handlers::transactions::CreateTransactionRequest,
            crate::handlers::transactions::TransactionCreated,
            crate::handlers::transactions::BulkDeleteRequest,
            crate::handlers::transactions::BulkDeleteResult,
            crate::handlers::upload::StatementUploadData,
            crate::handlers::upload::BulkUploadRequest,
            crate::handlers::upload::BulkTransactionInput,
            crate::handlers::upload::BulkUploadData,
            crate::handlers::upload::UploadHistoryEntry,
            crate::handlers::ai::ChatRequest,
            crate::handlers::ai::ChatMessage,
            crate::handlers::ai::ChatData,
            crate::handlers::ai::AiHealthData,
            crate::ai::extraction::ValidatedTransaction,
            crate::finance::FinancialSummary,
            crate::finance::SummaryCounts,
            crate::finance::FinancialBreakdown,
            crate::finance::BreakdownSummary,
            crate::finance::BreakdownBucket,
            crate::finance::BucketCounts,
            crate::finance::TransactionOverview,
            crate::finance::TypeBucket,
            crate::finance::CategoryBucket,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "User profile endpoints"),
        (name = "transactions", description = "Per-user transaction endpoints"),
        (name = "finance", description = "Financial aggregation endpoints"),
        (name = "upload", description = "Statement ingestion endpoints"),
        (name = "ai", description = "Conversational assistant endpoints"),
    ),
    info(
        title = "Fintrack API",
        description = "Personal finance tracker API - transactions, aggregation and AI statement ingestion",
        version = "0.1.0",
    )
)]
pub struct ApiDoc;
