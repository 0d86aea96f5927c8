use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use model::entities::{
    user,
    user_transaction::{self, TransactionStatus, TransactionType},
};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::ai::extraction::ValidatedTransaction;
use crate::handlers::transactions::TransactionResponse;
use crate::ingest;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Rows inserted per statement to bound statement size.
const INSERT_BATCH_SIZE: usize = 100;

const ALLOWED_MIME_TYPES: [&str; 7] = [
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/pdf",
    "image/jpeg",
    "image/jpg",
    "image/png",
];

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>, code: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, code)),
    )
}

/// Candidate set extracted from an uploaded statement; nothing is persisted
/// until the bulk endpoint is called
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatementUploadData {
    pub file_name: String,
    pub file_type: String,
    pub total_transactions: usize,
    /// Rows the validation stage dropped; surfaced so callers can detect
    /// partial extraction quality
    pub discarded_transactions: usize,
    pub transactions: Vec<ValidatedTransaction>,
}

/// One caller-approved candidate row for bulk insertion
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BulkTransactionInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub transaction_type: TransactionType,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub category: Option<String>,
}

/// Request body for bulk persistence
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BulkUploadRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub transactions: Vec<BulkTransactionInput>,
}

/// Bulk persistence outcome with server-assigned ids
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadData {
    pub total_uploaded: usize,
    pub transactions: Vec<TransactionResponse>,
}

/// One day of ingestion activity in the upload history
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadHistoryEntry {
    pub upload_date: NaiveDate,
    pub transaction_count: u64,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub categories: String,
}

/// Upload a statement file and extract candidate transactions from it
#[utoipa::path(
    post,
    path = "/api/upload/file",
    tag = "upload",
    responses(
        (status = 200, description = "Candidates extracted successfully", body = ApiResponse<StatementUploadData>),
        (status = 400, description = "Invalid upload", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 500, description = "Extraction failed", body = ErrorResponse)
    )
)]
#[instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<StatementUploadData>>, HandlerError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART")
    })? {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("statement")
                    .to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(|e| {
                    bad_request(format!("Failed to read file: {}", e), "INVALID_MULTIPART")
                })?;
                file = Some((file_name, mime, data.to_vec()));
            }
            Some("userId") => {
                let value = field.text().await.map_err(|e| {
                    bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART")
                })?;
                user_id = Some(value);
            }
            _ => {}
        }
    }

    let Some((file_name, mime, data)) = file else {
        return Err(bad_request("No file uploaded", "NO_FILE"));
    };

    if user_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(bad_request("User ID is required", "USER_ID_REQUIRED"));
    }

    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(bad_request(
            "Invalid file type. Only CSV, Excel and PDF files are currently supported.",
            "INVALID_FILE_TYPE",
        ));
    }

    info!("Processing file: {}, Type: {}", file_name, mime);

    let outcome = ingest::process_statement(&state.gemini, &file_name, &mime, &data)
        .await
        .map_err(|e| {
            error!("Statement ingestion failed for {}: {}", file_name, e);
            (e.status_code(), Json(ErrorResponse::new(e.to_string(), e.code())))
        })?;

    Ok(Json(ApiResponse {
        data: StatementUploadData {
            file_name: outcome.file_name,
            file_type: outcome.mime_type,
            total_transactions: outcome.transactions.len(),
            discarded_transactions: outcome.discarded,
            transactions: outcome.transactions,
        },
        message: "Transactions extracted successfully".to_string(),
        success: true,
    }))
}

/// Persist a caller-approved candidate array in sequential batches.
///
/// Batches are independent: a mid-run failure leaves earlier batches
/// committed and surfaces one generic 500.
#[utoipa::path(
    post,
    path = "/api/upload/bulk",
    tag = "upload",
    request_body = BulkUploadRequest,
    responses(
        (status = 200, description = "Transactions persisted", body = ApiResponse<BulkUploadData>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Insert failed", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn bulk_upload_transactions(
    State(state): State<AppState>,
    Json(request): Json<BulkUploadRequest>,
) -> Result<Json<ApiResponse<BulkUploadData>>, HandlerError> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("User ID is required", "USER_ID_REQUIRED"));
    }

    if request.transactions.is_empty() {
        return Err(bad_request(
            "Transactions array is required and must not be empty",
            "EMPTY_TRANSACTIONS",
        ));
    }

    if request
        .transactions
        .iter()
        .any(|t| t.amount <= Decimal::ZERO)
    {
        return Err(bad_request(
            "Amount must be a positive number for every transaction",
            "INVALID_AMOUNT",
        ));
    }

    let user_found = user::Entity::find_by_id(request.user_id.clone())
        .one(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to look up user {}: {}", request.user_id, db_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Failed to upload transactions",
                    "DATABASE_ERROR",
                )),
            )
        })?;
    if user_found.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("User not found", "USER_NOT_FOUND")),
        ));
    }

    let now = Utc::now();
    let rows: Vec<user_transaction::ActiveModel> = request
        .transactions
        .into_iter()
        .map(|candidate| {
            let description = candidate.title.or(candidate.description);
            user_transaction::ActiveModel {
                id: NotSet,
                user_id: Set(request.user_id.clone()),
                amount: Set(candidate.amount),
                currency: Set("INR".to_string()),
                transaction_type: Set(candidate.transaction_type),
                status: Set(TransactionStatus::Completed),
                category: Set(candidate.category),
                tags: Set(serde_json::json!([])),
                merchant: Set(None),
                reference: Set(candidate.reference),
                description: Set(description),
                transaction_date: Set(candidate.date),
                receipt_url: Set(None),
                receipt_filename: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
        })
        .collect();

    // Sequential batches; batch N+1 starts only after batch N commits.
    let mut inserted: Vec<user_transaction::Model> = Vec::with_capacity(rows.len());
    for batch in rows.chunks(INSERT_BATCH_SIZE) {
        let models = user_transaction::Entity::insert_many(batch.to_vec())
            .exec_with_returning_many(&state.db)
            .await
            .map_err(|db_error| {
                error!(
                    "Bulk insert batch failed for user {}: {}",
                    request.user_id, db_error
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(
                        "Failed to upload transactions",
                        "BULK_INSERT_ERROR",
                    )),
                )
            })?;
        inserted.extend(models);
    }

    info!(
        "Bulk uploaded {} transactions for user {}",
        inserted.len(),
        request.user_id
    );

    Ok(Json(ApiResponse {
        data: BulkUploadData {
            total_uploaded: inserted.len(),
            transactions: inserted.into_iter().map(TransactionResponse::from).collect(),
        },
        message: "Transactions uploaded successfully".to_string(),
        success: true,
    }))
}

/// Get the last 30 days of bulk-ingested rows grouped by creation date
#[utoipa::path(
    get,
    path = "/api/upload/history/{user_id}",
    tag = "upload",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "History retrieved", body = ApiResponse<Vec<UploadHistoryEntry>>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_upload_history(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UploadHistoryEntry>>>, HandlerError> {
    let cutoff: DateTime<Utc> = Utc::now() - Duration::days(30);

    // Receipt-bearing rows were created interactively, not via ingestion.
    let rows = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .filter(user_transaction::Column::ReceiptFilename.is_null())
        .filter(user_transaction::Column::CreatedAt.gte(cutoff))
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to fetch upload history for {}: {}", user_id, db_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Failed to get upload history",
                    "DATABASE_ERROR",
                )),
            )
        })?;

    let mut days: BTreeMap<NaiveDate, (u64, Decimal, Vec<String>)> = BTreeMap::new();
    for row in rows {
        let day = row.created_at.date_naive();
        let entry = days
            .entry(day)
            .or_insert((0, Decimal::ZERO, Vec::new()));
        entry.0 += 1;
        entry.1 += row.amount;
        if let Some(category) = row.category {
            if !entry.2.contains(&category) {
                entry.2.push(category);
            }
        }
    }

    let history: Vec<UploadHistoryEntry> = days
        .into_iter()
        .rev()
        .take(10)
        .map(|(day, (count, total, mut categories))| {
            categories.sort();
            UploadHistoryEntry {
                upload_date: day,
                transaction_count: count,
                total_amount: total,
                categories: categories.join(", "),
            }
        })
        .collect();

    Ok(Json(ApiResponse {
        data: history,
        message: "Upload history retrieved successfully".to_string(),
        success: true,
    }))
}
