use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use model::entities::{user, user_transaction};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use validator::ValidateEmail;

use crate::schemas::{ApiResponse, AppState, ErrorResponse};

/// Request body for creating a new user
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateUserRequest {
    /// Externally issued identifier; generated locally when absent
    pub id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Email address (format validated)
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
}

/// Request body for updating a user
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
}

/// User response model
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            image_url: model.image_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Query parameters for the email availability check
#[derive(Debug, Deserialize)]
pub struct EmailAvailableQuery {
    pub email: String,
}

/// Availability flag for a conflict-free duplicate check
#[derive(Debug, Serialize, ToSchema)]
pub struct EmailAvailability {
    pub email: String,
    pub available: bool,
}

/// Report returned after a user deletion, including the explicit child-row
/// cleanup verification
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDeletion {
    pub deleted_user: UserResponse,
    pub deleted_transactions_count: u64,
    pub remaining_transactions_count: u64,
}

/// Create a new user
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>), (StatusCode, Json<ErrorResponse>)> {
    let name = request.name.as_deref().map(str::trim).unwrap_or("");
    let email = request.email.as_deref().map(str::trim).unwrap_or("");
    if name.is_empty() || email.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Name and email are required",
                "MISSING_REQUIRED_FIELDS",
            )),
        ));
    }

    if !email.validate_email() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid email format", "INVALID_EMAIL")),
        ));
    }
    let name = name.to_string();
    let email = email.to_string();

    let id = request
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    debug!("Creating user {} with email {}", id, email);

    let now = Utc::now();
    let new_user = user::ActiveModel {
        id: Set(id.clone()),
        name: Set(name),
        email: Set(email),
        phone: Set(request.phone),
        image_url: Set(request.image_url),
        created_at: Set(now),
        updated_at: Set(now),
    };

    match new_user.insert(&state.db).await {
        Ok(user_model) => {
            info!("User created successfully with ID: {}", user_model.id);
            let response = ApiResponse {
                data: UserResponse::from(user_model),
                message: "User created successfully".to_string(),
                success: true,
            };
            Ok((StatusCode::CREATED, Json(response)))
        }
        Err(db_error) => {
            error!("Failed to create user '{}': {}", id, db_error);
            let message = db_error.to_string().to_lowercase();
            let error_response = if message.contains("unique") || message.contains("constraint") {
                ErrorResponse::new(
                    format!("User '{}' already exists", id),
                    "USER_ALREADY_EXISTS",
                )
            } else {
                ErrorResponse::new("Failed to create user", "DATABASE_ERROR")
            };
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(error_response)))
        }
    }
}

/// Get all users
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "Users retrieved successfully", body = ApiResponse<Vec<UserResponse>>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, StatusCode> {
    match user::Entity::find().all(&state.db).await {
        Ok(users) => {
            debug!("Retrieved {} users", users.len());
            let response = ApiResponse {
                data: users.into_iter().map(UserResponse::from).collect(),
                message: "Users retrieved successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Err(db_error) => {
            error!("Failed to retrieve users: {}", db_error);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Get a specific user by ID
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User retrieved successfully", body = ApiResponse<UserResponse>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserResponse>>, StatusCode> {
    match user::Entity::find_by_id(&user_id).one(&state.db).await {
        Ok(Some(user_model)) => {
            let response = ApiResponse {
                data: UserResponse::from(user_model),
                message: "User retrieved successfully".to_string(),
                success: true,
            };
            Ok(Json(response))
        }
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Update a user by ID; only supplied fields are touched
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated successfully", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn update_user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let existing = user::Entity::find_by_id(&user_id)
        .one(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to look up user {}: {}", user_id, db_error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update user", "DATABASE_ERROR")),
            )
        })?;

    let Some(existing) = existing else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("User not found", "USER_NOT_FOUND")),
        ));
    };

    let has_update = [
        request.name.as_deref(),
        request.email.as_deref(),
        request.phone.as_deref(),
        request.image_url.as_deref(),
    ]
    .iter()
    .any(|field| field.is_some_and(|value| !value.trim().is_empty()));

    if !has_update {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "At least one field must be provided and not empty",
                "EMPTY_UPDATE",
            )),
        ));
    }

    if let Some(email) = &request.email {
        if !email.validate_email() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid email format", "INVALID_EMAIL")),
            ));
        }
    }

    // Only supplied fields become SET columns; every value is bound.
    let mut active: user::ActiveModel = existing.into();
    if let Some(name) = request.name.filter(|v| !v.trim().is_empty()) {
        active.name = Set(name);
    }
    if let Some(email) = request.email.filter(|v| !v.trim().is_empty()) {
        active.email = Set(email);
    }
    if let Some(phone) = request.phone.filter(|v| !v.trim().is_empty()) {
        active.phone = Set(Some(phone));
    }
    if let Some(image_url) = request.image_url.filter(|v| !v.trim().is_empty()) {
        active.image_url = Set(Some(image_url));
    }
    active.updated_at = Set(Utc::now());

    match active.update(&state.db).await {
        Ok(updated) => {
            info!("User {} updated successfully", updated.id);
            Ok(Json(ApiResponse {
                data: UserResponse::from(updated),
                message: "User updated successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to update user {}: {}", user_id, db_error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update user", "DATABASE_ERROR")),
            ))
        }
    }
}

/// Delete a user and all owned transactions.
///
/// Child rows are deleted explicitly before the user row, and the remaining
/// count is verified afterwards instead of trusting declarative cascade.
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User deleted successfully", body = ApiResponse<UserDeletion>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_user(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserDeletion>>, (StatusCode, Json<ErrorResponse>)> {
    let internal = |db_error: sea_orm::DbErr| {
        error!("Failed to delete user {}: {}", user_id, db_error);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to delete user", "DATABASE_ERROR")),
        )
    };

    let Some(existing) = user::Entity::find_by_id(&user_id)
        .one(&state.db)
        .await
        .map_err(internal)?
    else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("User not found", "USER_NOT_FOUND")),
        ));
    };

    let owned = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .count(&state.db)
        .await
        .map_err(internal)?;

    // Delete children first, then the user.
    user_transaction::Entity::delete_many()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .exec(&state.db)
        .await
        .map_err(internal)?;

    let deleted = UserResponse::from(existing.clone());
    let active: user::ActiveModel = existing.into();
    active.delete(&state.db).await.map_err(internal)?;

    // Post-condition: no transactions may remain for the deleted user.
    let remaining = user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id.as_str()))
        .count(&state.db)
        .await
        .map_err(internal)?;

    if remaining > 0 {
        warn!(
            "User {} deleted but {} transactions remain",
            user_id, remaining
        );
    } else {
        info!(
            "User {} and {} transactions deleted successfully",
            user_id, owned
        );
    }

    Ok(Json(ApiResponse {
        data: UserDeletion {
            deleted_user: deleted,
            deleted_transactions_count: owned,
            remaining_transactions_count: remaining,
        },
        message: "User and all associated transactions deleted successfully".to_string(),
        success: true,
    }))
}

/// Check whether an email is free; always a 200 with an availability flag
#[utoipa::path(
    get,
    path = "/api/users/email-available",
    tag = "users",
    params(
        ("email" = String, Query, description = "Email address to check"),
    ),
    responses(
        (status = 200, description = "Availability computed", body = ApiResponse<EmailAvailability>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn email_available(
    Query(query): Query<EmailAvailableQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<EmailAvailability>>, StatusCode> {
    let taken = user::Entity::find()
        .filter(user::Column::Email.eq(query.email.as_str()))
        .count(&state.db)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ApiResponse {
        data: EmailAvailability {
            email: query.email,
            available: taken == 0,
        },
        message: "Email availability checked".to_string(),
        success: true,
    }))
}
