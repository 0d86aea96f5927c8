use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use model::entities::user_transaction;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{error, instrument};

use crate::finance::{self, FinancialBreakdown, FinancialSummary, Grain, Period};
use crate::schemas::{
    ApiResponse, AppState, BreakdownQuery, CachedData, ErrorResponse, SummaryQuery,
};

type HandlerError = (StatusCode, Json<ErrorResponse>);

async fn fetch_rows(
    state: &AppState,
    user_id: &str,
    failure: &'static str,
) -> Result<Vec<user_transaction::Model>, HandlerError> {
    user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id))
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to fetch rows for user {}: {}", user_id, db_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(failure, "AGGREGATION_ERROR")),
            )
        })
}

/// Get the rolled-up income/expense/balance summary for a relative period
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/finance/summary",
    tag = "finance",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("period" = Option<String>, Query, description = "day, week, month, year or all (default all)"),
    ),
    responses(
        (status = 200, description = "Summary computed successfully", body = ApiResponse<FinancialSummary>),
        (status = 400, description = "Invalid period", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_financial_summary(
    Path(user_id): Path<String>,
    Query(query): Query<SummaryQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FinancialSummary>>, HandlerError> {
    let Some(period) = Period::parse(query.period.as_deref()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "period must be one of 'day', 'week', 'month', 'year' or 'all'",
                "INVALID_PERIOD",
            )),
        ));
    };

    let cache_key = format!("finance_summary_{}_{}", user_id, period.label());
    if let Some(CachedData::Summary(summary)) = state.cache.get(&cache_key).await {
        return Ok(Json(ApiResponse {
            data: summary,
            message: "Financial summary retrieved from cache".to_string(),
            success: true,
        }));
    }

    let rows = fetch_rows(&state, &user_id, "Failed to fetch financial summary").await?;
    let summary = finance::summarize(&rows, period, Utc::now().date_naive());

    state
        .cache
        .insert(cache_key, CachedData::Summary(summary.clone()))
        .await;

    Ok(Json(ApiResponse {
        data: summary,
        message: "Financial summary retrieved successfully".to_string(),
        success: true,
    }))
}

/// Get the per-bucket income/expense breakdown at a calendar grain
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/finance/breakdown",
    tag = "finance",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("groupBy" = Option<String>, Query, description = "day, week, month or year (default month)"),
    ),
    responses(
        (status = 200, description = "Breakdown computed successfully", body = ApiResponse<FinancialBreakdown>),
        (status = 400, description = "Invalid grouping", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_financial_breakdown(
    Path(user_id): Path<String>,
    Query(query): Query<BreakdownQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<FinancialBreakdown>>, HandlerError> {
    let Some(grain) = Grain::parse(query.group_by.as_deref()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "groupBy must be one of 'day', 'week', 'month' or 'year'",
                "INVALID_GROUP_BY",
            )),
        ));
    };

    let cache_key = format!("finance_breakdown_{}_{}", user_id, grain.label());
    if let Some(CachedData::Breakdown(breakdown)) = state.cache.get(&cache_key).await {
        return Ok(Json(ApiResponse {
            data: breakdown,
            message: "Financial breakdown retrieved from cache".to_string(),
            success: true,
        }));
    }

    let rows = fetch_rows(&state, &user_id, "Failed to fetch financial breakdown").await?;
    let breakdown = finance::breakdown(&rows, grain);

    state
        .cache
        .insert(cache_key, CachedData::Breakdown(breakdown.clone()))
        .await;

    Ok(Json(ApiResponse {
        data: breakdown,
        message: "Financial breakdown retrieved successfully".to_string(),
        success: true,
    }))
}
