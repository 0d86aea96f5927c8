use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::Json,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, Utc};
use model::entities::{
    user,
    user_transaction::{self, TransactionStatus, TransactionType},
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::finance;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Request body for creating or replacing a transaction. Accepted as JSON or
/// as multipart form fields (with an optional `receipt` file part).
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CreateTransactionRequest {
    /// Transaction amount; must be positive
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// 3-letter currency code (default INR)
    pub currency: Option<String>,
    /// debit or credit
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    /// pending, completed or failed (default completed)
    pub status: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    /// Calendar date of the movement (default: today)
    pub transaction_date: Option<NaiveDate>,
}

/// Alias kept separate so the replace endpoint documents itself
pub type UpdateTransactionRequest = CreateTransactionRequest;

/// Transaction response model
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i32,
    pub user_id: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub currency: String,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub transaction_type: TransactionType,
    #[schema(value_type = String)]
    pub status: TransactionStatus,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub merchant: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    pub receipt_url: Option<String>,
    pub receipt_filename: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<user_transaction::Model> for TransactionResponse {
    fn from(model: user_transaction::Model) -> Self {
        let tags = serde_json::from_value(model.tags).unwrap_or_default();
        Self {
            id: model.id,
            user_id: model.user_id,
            amount: model.amount,
            currency: model.currency,
            transaction_type: model.transaction_type,
            status: model.status,
            category: model.category,
            tags,
            merchant: model.merchant,
            reference: model.reference,
            description: model.description,
            transaction_date: model.transaction_date,
            receipt_url: model.receipt_url,
            receipt_filename: model.receipt_filename,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Created-transaction payload, flagging whether a receipt was attached
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCreated {
    pub transaction: TransactionResponse,
    pub receipt_uploaded: bool,
}

/// Request body for bulk deletion
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BulkDeleteRequest {
    pub transaction_ids: Vec<i32>,
}

/// Bulk delete outcome: deleted rows and the ids that were not found for
/// this owner, reported separately in the same 200
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteResult {
    pub deleted_transactions: Vec<TransactionResponse>,
    pub not_found_transaction_ids: Vec<i32>,
}

struct ReceiptUpload {
    data: Vec<u8>,
    mime: String,
    filename: Option<String>,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>, code: &str) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(message, code)),
    )
}

fn internal(message: &str) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message, "DATABASE_ERROR")),
    )
}

fn parse_type(raw: &str) -> Option<TransactionType> {
    match raw {
        "debit" => Some(TransactionType::Debit),
        "credit" => Some(TransactionType::Credit),
        _ => None,
    }
}

fn parse_status(raw: &str) -> Option<TransactionStatus> {
    match raw {
        "pending" => Some(TransactionStatus::Pending),
        "completed" => Some(TransactionStatus::Completed),
        "failed" => Some(TransactionStatus::Failed),
        _ => None,
    }
}

/// Validate the shared required fields of create/replace requests.
fn validate_request(
    request: &CreateTransactionRequest,
) -> Result<(Decimal, TransactionType), HandlerError> {
    let amount = request.amount.ok_or_else(|| {
        bad_request(
            "Amount is required and must be a positive number",
            "INVALID_AMOUNT",
        )
    })?;
    if amount <= Decimal::ZERO {
        return Err(bad_request(
            "Amount is required and must be a positive number",
            "INVALID_AMOUNT",
        ));
    }

    let transaction_type = request
        .transaction_type
        .as_deref()
        .and_then(parse_type)
        .ok_or_else(|| {
            bad_request(
                "Type is required and must be either 'debit' or 'credit'",
                "INVALID_TYPE",
            )
        })?;

    Ok((amount, transaction_type))
}

fn validate_status(
    request: &CreateTransactionRequest,
) -> Result<TransactionStatus, HandlerError> {
    match request.status.as_deref() {
        None => Ok(TransactionStatus::Completed),
        Some(raw) => parse_status(raw).ok_or_else(|| {
            bad_request(
                "Status must be one of 'pending', 'completed' or 'failed'",
                "INVALID_STATUS",
            )
        }),
    }
}

async fn user_exists(state: &AppState, user_id: &str) -> Result<bool, HandlerError> {
    user::Entity::find_by_id(user_id.to_string())
        .one(&state.db)
        .await
        .map(|found| found.is_some())
        .map_err(|db_error| {
            error!("Failed to look up user {}: {}", user_id, db_error);
            internal("Failed to look up user")
        })
}

/// Read create-request fields out of a multipart form, collecting the
/// optional receipt part.
async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(CreateTransactionRequest, Option<ReceiptUpload>), HandlerError> {
    let mut request = CreateTransactionRequest::default();
    let mut receipt = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART")
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "receipt" {
            let mime = field
                .content_type()
                .unwrap_or("image/jpeg")
                .to_string();
            let filename = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                bad_request(format!("Failed to read receipt: {}", e), "INVALID_MULTIPART")
            })?;
            receipt = Some(ReceiptUpload {
                data: data.to_vec(),
                mime,
                filename,
            });
            continue;
        }

        let value = field.text().await.map_err(|e| {
            bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART")
        })?;
        match name.as_str() {
            "amount" => {
                request.amount = Decimal::from_str(value.trim()).ok();
            }
            "currency" => request.currency = Some(value),
            "type" => request.transaction_type = Some(value),
            "status" => request.status = Some(value),
            "category" => request.category = Some(value),
            "tags" => request.tags = Some(parse_tags(&value)),
            "merchant" => request.merchant = Some(value),
            "reference" => request.reference = Some(value),
            "description" => request.description = Some(value),
            "transaction_date" => {
                let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                    bad_request(
                        "transaction_date must be formatted YYYY-MM-DD",
                        "INVALID_DATE",
                    )
                })?;
                request.transaction_date = Some(date);
            }
            _ => {}
        }
    }

    Ok((request, receipt))
}

/// A tags form field is either a JSON array or a single tag.
fn parse_tags(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags,
        Err(_) if raw.trim().is_empty() => Vec::new(),
        Err(_) => vec![raw.trim().to_string()],
    }
}

fn receipt_to_data_url(receipt: &ReceiptUpload) -> (String, String) {
    let url = format!("data:{};base64,{}", receipt.mime, STANDARD.encode(&receipt.data));
    let filename = receipt
        .filename
        .clone()
        .unwrap_or_else(|| format!("receipt_{}.jpg", Utc::now().timestamp_millis()));
    (url, filename)
}

/// Get all transactions for a user, newest first
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/transactions",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Transactions retrieved successfully", body = ApiResponse<Vec<TransactionResponse>>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_transactions(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, HandlerError> {
    let transactions = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .order_by_desc(user_transaction::Column::TransactionDate)
        .order_by_desc(user_transaction::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to fetch transactions for {}: {}", user_id, db_error);
            internal("Failed to fetch transactions")
        })?;

    debug!("Found {} transactions for user {}", transactions.len(), user_id);

    Ok(Json(ApiResponse {
        data: transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
        message: "Transactions retrieved successfully".to_string(),
        success: true,
    }))
}

/// Get the all-time/current-day transaction overview for a user
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/transactions/summary",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Summary retrieved successfully", body = ApiResponse<crate::finance::TransactionOverview>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_transaction_summary(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<finance::TransactionOverview>>, HandlerError> {
    let rows = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to fetch summary rows for {}: {}", user_id, db_error);
            internal("Failed to fetch transactions summary")
        })?;

    let overview = finance::overview(&rows, Utc::now().date_naive());

    Ok(Json(ApiResponse {
        data: overview,
        message: "Transactions summary retrieved successfully".to_string(),
        success: true,
    }))
}

/// Get a specific transaction owned by a user
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/transactions/{transaction_id}",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("transaction_id" = i32, Path, description = "Transaction ID"),
    ),
    responses(
        (status = 200, description = "Transaction retrieved successfully", body = ApiResponse<TransactionResponse>),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_transaction(
    Path((user_id, transaction_id)): Path<(String, i32)>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TransactionResponse>>, HandlerError> {
    let found = user_transaction::Entity::find_by_id(transaction_id)
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .one(&state.db)
        .await
        .map_err(|_| internal("Failed to fetch transaction"))?;

    match found {
        Some(model) => Ok(Json(ApiResponse {
            data: TransactionResponse::from(model),
            message: "Transaction retrieved successfully".to_string(),
            success: true,
        })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Transaction not found or doesn't belong to this user",
                "TRANSACTION_NOT_FOUND",
            )),
        )),
    }
}

/// Create a new transaction, optionally attaching a receipt via multipart
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/transactions",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created successfully", body = ApiResponse<TransactionCreated>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn create_transaction(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    req: Request,
) -> Result<(StatusCode, Json<ApiResponse<TransactionCreated>>), HandlerError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (request, receipt) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART"))?;
        read_multipart(multipart).await?
    } else {
        let Json(request) = Json::<CreateTransactionRequest>::from_request(req, &())
            .await
            .map_err(|e| bad_request(format!("Invalid JSON body: {}", e), "INVALID_BODY"))?;
        (request, None)
    };

    let (amount, transaction_type) = validate_request(&request)?;
    let status = validate_status(&request)?;

    if !user_exists(&state, &user_id).await? {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("User not found", "USER_NOT_FOUND")),
        ));
    }

    let (receipt_url, receipt_filename) = match &receipt {
        Some(upload) => {
            let (url, filename) = receipt_to_data_url(upload);
            (Some(url), Some(filename))
        }
        None => (None, None),
    };

    let now = Utc::now();
    let new_transaction = user_transaction::ActiveModel {
        user_id: Set(user_id.clone()),
        amount: Set(amount),
        currency: Set(request.currency.unwrap_or_else(|| "INR".to_string())),
        transaction_type: Set(transaction_type),
        status: Set(status),
        category: Set(request.category),
        tags: Set(serde_json::json!(request.tags.unwrap_or_default())),
        merchant: Set(request.merchant),
        reference: Set(request.reference),
        description: Set(request.description),
        transaction_date: Set(request.transaction_date.unwrap_or_else(|| now.date_naive())),
        receipt_url: Set(receipt_url),
        receipt_filename: Set(receipt_filename),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_transaction.insert(&state.db).await {
        Ok(model) => {
            info!("Transaction {} created for user {}", model.id, user_id);
            let receipt_uploaded = receipt.is_some();
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse {
                    data: TransactionCreated {
                        transaction: TransactionResponse::from(model),
                        receipt_uploaded,
                    },
                    message: "Transaction created successfully".to_string(),
                    success: true,
                }),
            ))
        }
        Err(db_error) => {
            error!("Failed to create transaction for {}: {}", user_id, db_error);
            Err(internal("Failed to create transaction"))
        }
    }
}

/// Replace a transaction's fields; missing optional fields fall back to
/// their defaults
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/transactions/{transaction_id}",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("transaction_id" = i32, Path, description = "Transaction ID"),
    ),
    request_body = CreateTransactionRequest,
    responses(
        (status = 200, description = "Transaction updated successfully", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn update_transaction(
    Path((user_id, transaction_id)): Path<(String, i32)>,
    State(state): State<AppState>,
    Json(request): Json<UpdateTransactionRequest>,
) -> Result<Json<ApiResponse<TransactionResponse>>, HandlerError> {
    let (amount, transaction_type) = validate_request(&request)?;
    let status = validate_status(&request)?;

    let existing = user_transaction::Entity::find_by_id(transaction_id)
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .one(&state.db)
        .await
        .map_err(|_| internal("Failed to update transaction"))?;

    let Some(existing) = existing else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Transaction not found or doesn't belong to this user",
                "TRANSACTION_NOT_FOUND",
            )),
        ));
    };

    let mut active: user_transaction::ActiveModel = existing.into();
    active.amount = Set(amount);
    active.currency = Set(request.currency.unwrap_or_else(|| "INR".to_string()));
    active.transaction_type = Set(transaction_type);
    active.status = Set(status);
    active.category = Set(request.category);
    active.tags = Set(serde_json::json!(request.tags.unwrap_or_default()));
    active.merchant = Set(request.merchant);
    active.reference = Set(request.reference);
    active.description = Set(request.description);
    active.transaction_date = Set(request
        .transaction_date
        .unwrap_or_else(|| Utc::now().date_naive()));
    active.updated_at = Set(Utc::now());

    match active.update(&state.db).await {
        Ok(updated) => Ok(Json(ApiResponse {
            data: TransactionResponse::from(updated),
            message: "Transaction updated successfully".to_string(),
            success: true,
        })),
        Err(db_error) => {
            error!(
                "Failed to update transaction {} for {}: {}",
                transaction_id, user_id, db_error
            );
            Err(internal("Failed to update transaction"))
        }
    }
}

/// Delete a single transaction owned by a user
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/transactions/{transaction_id}",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
        ("transaction_id" = i32, Path, description = "Transaction ID"),
    ),
    responses(
        (status = 200, description = "Transaction deleted successfully", body = ApiResponse<TransactionResponse>),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_transaction(
    Path((user_id, transaction_id)): Path<(String, i32)>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TransactionResponse>>, HandlerError> {
    let existing = user_transaction::Entity::find_by_id(transaction_id)
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .one(&state.db)
        .await
        .map_err(|_| internal("Failed to delete transaction"))?;

    let Some(existing) = existing else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Transaction not found or doesn't belong to this user",
                "TRANSACTION_NOT_FOUND",
            )),
        ));
    };

    let deleted = TransactionResponse::from(existing.clone());
    let active: user_transaction::ActiveModel = existing.into();
    active
        .delete(&state.db)
        .await
        .map_err(|_| internal("Failed to delete transaction"))?;

    info!("Transaction {} deleted for user {}", transaction_id, user_id);

    Ok(Json(ApiResponse {
        data: deleted,
        message: "Transaction deleted successfully".to_string(),
        success: true,
    }))
}

/// Bulk delete transactions by id list; partial success is reported, not an
/// error
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/transactions",
    tag = "transactions",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Bulk delete completed", body = ApiResponse<BulkDeleteResult>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn bulk_delete_transactions(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<ApiResponse<BulkDeleteResult>>, HandlerError> {
    if request.transaction_ids.is_empty() {
        return Err(bad_request(
            "transaction_ids must be a non-empty array",
            "INVALID_TRANSACTION_IDS",
        ));
    }

    let found = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .filter(user_transaction::Column::Id.is_in(request.transaction_ids.clone()))
        .all(&state.db)
        .await
        .map_err(|_| internal("Failed to bulk delete transactions"))?;

    let found_ids: Vec<i32> = found.iter().map(|model| model.id).collect();
    let not_found: Vec<i32> = request
        .transaction_ids
        .iter()
        .copied()
        .filter(|id| !found_ids.contains(id))
        .collect();

    if !found_ids.is_empty() {
        user_transaction::Entity::delete_many()
            .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
            .filter(user_transaction::Column::Id.is_in(found_ids.clone()))
            .exec(&state.db)
            .await
            .map_err(|_| internal("Failed to bulk delete transactions"))?;
    }

    info!(
        "Bulk delete for user {}: {} deleted, {} not found",
        user_id,
        found_ids.len(),
        not_found.len()
    );

    Ok(Json(ApiResponse {
        data: BulkDeleteResult {
            deleted_transactions: found.into_iter().map(TransactionResponse::from).collect(),
            not_found_transaction_ids: not_found,
        },
        message: "Bulk delete completed".to_string(),
        success: true,
    }))
}
