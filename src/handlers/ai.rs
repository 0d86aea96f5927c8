use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{Duration, NaiveDate, Utc};
use model::entities::user_transaction::{self, TransactionType};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, instrument, warn};
use utoipa::ToSchema;

use crate::finance::{Grain, bucket_key};
use crate::schemas::{ApiResponse, AppState, ErrorResponse};

const RECENT_TRANSACTION_CAP: usize = 100;
const TOP_MERCHANT_CAP: usize = 10;

/// One prior turn of the conversation
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request body for the conversational assistant
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "conversationHistory")]
    pub conversation_history: Option<Vec<ChatMessage>>,
}

/// Assistant reply
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatData {
    pub message: String,
    pub timestamp: String,
    /// Whether grounding data was available for this answer
    pub data_used: bool,
}

/// AI service liveness payload
#[derive(Debug, Serialize, ToSchema)]
pub struct AiHealthData {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct RecentTransaction {
    amount: Decimal,
    #[serde(rename = "type")]
    transaction_type: TransactionType,
    category: Option<String>,
    description: Option<String>,
    transaction_date: NaiveDate,
    currency: String,
}

#[derive(Debug, Serialize)]
struct CategorySpend {
    category: String,
    transaction_count: u64,
    total_amount: Decimal,
    avg_amount: Decimal,
}

#[derive(Debug, Serialize)]
struct MonthlyTrend {
    month: String,
    income: Decimal,
    expenses: Decimal,
}

#[derive(Debug, Serialize)]
struct MerchantSpend {
    description: String,
    frequency: u64,
    total_spent: Decimal,
}

/// Read-only aggregates grounding the assistant's answer.
#[derive(Debug, Serialize)]
struct FinancialContext {
    recent_transactions: Vec<RecentTransaction>,
    category_summary: Vec<CategorySpend>,
    monthly_trend: Vec<MonthlyTrend>,
    top_merchants: Vec<MerchantSpend>,
}

/// Build the grounding aggregates from the user's last six months of rows.
fn build_financial_context(
    rows: &[user_transaction::Model],
    today: NaiveDate,
) -> FinancialContext {
    let three_months_ago = today - Duration::days(90);

    let recent_transactions: Vec<RecentTransaction> = rows
        .iter()
        .filter(|row| row.transaction_date >= three_months_ago)
        .take(RECENT_TRANSACTION_CAP)
        .map(|row| RecentTransaction {
            amount: row.amount,
            transaction_type: row.transaction_type,
            category: row.category.clone(),
            description: row.description.clone(),
            transaction_date: row.transaction_date,
            currency: row.currency.clone(),
        })
        .collect();

    let mut categories: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();
    let mut merchants: BTreeMap<String, (u64, Decimal)> = BTreeMap::new();
    let mut months: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for row in rows {
        let month = bucket_key(row.transaction_date, Grain::Month);
        let trend = months.entry(month).or_insert((Decimal::ZERO, Decimal::ZERO));
        match row.transaction_type {
            TransactionType::Credit => trend.0 += row.amount,
            TransactionType::Debit => trend.1 += row.amount,
        }

        if row.transaction_type != TransactionType::Debit
            || row.transaction_date < three_months_ago
        {
            continue;
        }
        if let Some(category) = &row.category {
            let entry = categories
                .entry(category.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += row.amount;
        }
        if let Some(description) = &row.description {
            let entry = merchants
                .entry(description.clone())
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += row.amount;
        }
    }

    let mut category_summary: Vec<CategorySpend> = categories
        .into_iter()
        .map(|(category, (count, total))| CategorySpend {
            category,
            transaction_count: count,
            total_amount: total,
            avg_amount: total / Decimal::from(count),
        })
        .collect();
    category_summary.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));

    let mut top_merchants: Vec<MerchantSpend> = merchants
        .into_iter()
        .map(|(description, (frequency, total))| MerchantSpend {
            description,
            frequency,
            total_spent: total,
        })
        .collect();
    top_merchants.sort_by(|a, b| b.total_spent.cmp(&a.total_spent));
    top_merchants.truncate(TOP_MERCHANT_CAP);

    let monthly_trend: Vec<MonthlyTrend> = months
        .into_iter()
        .rev()
        .map(|(month, (income, expenses))| MonthlyTrend {
            month,
            income,
            expenses,
        })
        .collect();

    FinancialContext {
        recent_transactions,
        category_summary,
        monthly_trend,
        top_merchants,
    }
}

fn compose_prompt(
    message: &str,
    history: Option<&[ChatMessage]>,
    context: Option<&FinancialContext>,
) -> String {
    let mut prompt = String::from(
        "You are a helpful general-purpose assistant inside a personal finance app.\n\
         Answer the user's question directly and concisely, with light formatting only.\n\
         Use the financial data below only when the question is financially relevant;\n\
         otherwise ignore it and just answer the question.\n\n",
    );

    if let Some(history) = history {
        if !history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in history {
                prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
            }
            prompt.push('\n');
        }
    }

    if let Some(context) = context {
        let data = serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
        prompt.push_str(&format!(
            "User's transaction data (last months):\n{}\n\n",
            data
        ));
    }

    prompt.push_str(&format!("User's question: \"{}\"", message));
    prompt
}

/// Answer a free-text question, grounded in the user's recent financial data
/// when it can be gathered
#[utoipa::path(
    post,
    path = "/api/ai/chat",
    tag = "ai",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant replied", body = ApiResponse<ChatData>),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Model call failed", body = ErrorResponse)
    )
)]
#[instrument(skip(state, request))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatData>>, (StatusCode, Json<ErrorResponse>)> {
    let message = request
        .message
        .as_deref()
        .map(str::trim)
        .unwrap_or("");
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Message is required", "MESSAGE_REQUIRED")),
        ));
    }

    let Some(user_id) = request
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("User ID is required", "USER_ID_REQUIRED")),
        ));
    };

    // Grounding is best-effort: a storage failure degrades to an ungrounded
    // answer instead of failing the request.
    let today = Utc::now().date_naive();
    let six_months_ago = today - Duration::days(180);
    let context = match user_transaction::Entity::find()
        .filter(user_transaction::Column::UserId.eq(user_id))
        .filter(user_transaction::Column::TransactionDate.gte(six_months_ago))
        .order_by_desc(user_transaction::Column::TransactionDate)
        .all(&state.db)
        .await
    {
        Ok(rows) => Some(build_financial_context(&rows, today)),
        Err(db_error) => {
            warn!("Proceeding without grounding data: {}", db_error);
            None
        }
    };
    let data_used = context
        .as_ref()
        .is_some_and(|c| !c.recent_transactions.is_empty() || !c.monthly_trend.is_empty());

    let prompt = compose_prompt(
        message,
        request.conversation_history.as_deref(),
        context.as_ref(),
    );

    match state.gemini.generate(&prompt).await {
        Ok(reply) => Ok(Json(ApiResponse {
            data: ChatData {
                message: reply,
                timestamp: Utc::now().to_rfc3339(),
                data_used,
            },
            message: "AI response generated successfully".to_string(),
            success: true,
        })),
        Err(ai_error) => {
            error!("AI chat failed: {}", ai_error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Failed to process AI request. Please try again.",
                    "AI_ERROR",
                )),
            ))
        }
    }
}

/// Synthetic market values; a stand-in for a live market data feed
#[utoipa::path(
    get,
    path = "/api/ai/market-data",
    tag = "ai",
    responses(
        (status = 200, description = "Market data generated", body = ApiResponse<serde_json::Value>),
    )
)]
#[instrument]
pub async fn market_data() -> Json<ApiResponse<serde_json::Value>> {
    let mut rng = rand::thread_rng();

    let quote = |base: i64, spread: i64, rng: &mut rand::rngs::ThreadRng| {
        serde_json::json!({
            "value": base + rng.gen_range(-spread..=spread),
            "change": format!("{:.2}", rng.gen_range(-2.0..2.0)),
            "changePercent": format!("{:.2}", rng.gen_range(-2.0..2.0)),
        })
    };

    let data = serde_json::json!({
        "stocks": {
            "nifty50": quote(24_500, 100, &mut rng),
            "sensex": quote(80_500, 250, &mut rng),
            "bankNifty": quote(52_000, 150, &mut rng),
        },
        "commodities": {
            "gold": {
                "value": 75_000 + rng.gen_range(-500..=500),
                "change": format!("{:.2}", rng.gen_range(-100.0..100.0)),
                "changePercent": format!("{:.2}", rng.gen_range(-1.0..1.0)),
                "unit": "per 10g",
            },
            "silver": {
                "value": 95_000 + rng.gen_range(-1000..=1000),
                "change": format!("{:.2}", rng.gen_range(-250.0..250.0)),
                "changePercent": format!("{:.2}", rng.gen_range(-1.5..1.5)),
                "unit": "per kg",
            },
        },
        "crypto": {
            "bitcoin": quote(4_500_000, 50_000, &mut rng),
            "ethereum": quote(280_000, 10_000, &mut rng),
        },
        "lastUpdated": Utc::now().to_rfc3339(),
    });

    Json(ApiResponse {
        data,
        message: "Market data retrieved successfully".to_string(),
        success: true,
    })
}

/// AI service liveness
#[utoipa::path(
    get,
    path = "/api/ai/health",
    tag = "ai",
    responses(
        (status = 200, description = "AI service is running", body = ApiResponse<AiHealthData>),
    )
)]
#[instrument]
pub async fn ai_health() -> Json<ApiResponse<AiHealthData>> {
    Json(ApiResponse {
        data: AiHealthData {
            message: "AI service is running".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        },
        message: "AI service is running".to_string(),
        success: true,
    })
}
