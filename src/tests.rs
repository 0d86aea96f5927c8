#[cfg(test)]
mod integration_tests {
    use crate::schemas::{ApiResponse, ErrorResponse};
    use crate::test_utils::setup_test_app;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::{Value, json};

    async fn test_server() -> TestServer {
        TestServer::new(setup_test_app().await).unwrap()
    }

    /// Create a user through the API and return its id.
    async fn create_user(server: &TestServer, name: &str, email: &str) -> String {
        let response = server
            .post("/api/users")
            .json(&json!({ "name": name, "email": email }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        body.data["id"].as_str().unwrap().to_string()
    }

    /// Create a transaction through the API and return its id.
    async fn create_transaction(server: &TestServer, user_id: &str, body: Value) -> i64 {
        let response = server
            .post(&format!("/api/users/{}/transactions", user_id))
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        body.data["transaction"]["id"].as_i64().unwrap()
    }

    fn today() -> String {
        chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string()
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = test_server().await;

        let response = server.get("/health").await;

        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "connected");
    }

    #[tokio::test]
    async fn test_create_user() {
        let server = test_server().await;

        let response = server
            .post("/api/users")
            .json(&json!({ "name": "Asha", "email": "asha@example.com" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        assert!(body.success);
        assert_eq!(body.data["name"], "Asha");
        assert_eq!(body.data["email"], "asha@example.com");
        assert!(!body.data["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_user_with_external_id() {
        let server = test_server().await;

        let response = server
            .post("/api/users")
            .json(&json!({ "id": "idp_123", "name": "Asha", "email": "asha@example.com" }))
            .await;

        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["id"], "idp_123");
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let server = test_server().await;

        let response = server
            .post("/api/users")
            .json(&json!({ "name": "NoEmail" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert!(!body.success);
        assert_eq!(body.code, "MISSING_REQUIRED_FIELDS");

        let response = server
            .post("/api/users")
            .json(&json!({ "name": "Bad", "email": "not-an-email" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "INVALID_EMAIL");
    }

    #[tokio::test]
    async fn test_get_user_and_not_found() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server.get(&format!("/api/users/{}", user_id)).await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["id"], user_id.as_str());

        let response = server.get("/api/users/missing-user").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_email_availability_flag() {
        let server = test_server().await;
        create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .get("/api/users/email-available")
            .add_query_param("email", "asha@example.com")
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["available"], false);

        let response = server
            .get("/api/users/email-available")
            .add_query_param("email", "free@example.com")
            .await;
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["available"], true);
    }

    #[tokio::test]
    async fn test_update_user_partial_fields() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .put(&format!("/api/users/{}", user_id))
            .json(&json!({ "name": "Asha Rao" }))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["name"], "Asha Rao");
        // Untouched field survives the partial update.
        assert_eq!(body.data["email"], "asha@example.com");

        let response = server
            .put(&format!("/api/users/{}", user_id))
            .json(&json!({}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_user_removes_all_transactions() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        for amount in [100, 200] {
            create_transaction(
                &server,
                &user_id,
                json!({ "amount": amount, "type": "debit", "category": "Bills" }),
            )
            .await;
        }

        let response = server.delete(&format!("/api/users/{}", user_id)).await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["deletedTransactionsCount"], 2);
        assert_eq!(body.data["remainingTransactionsCount"], 0);

        // The user is gone and no owned rows survive.
        let response = server.get(&format!("/api/users/{}", user_id)).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let response = server
            .get(&format!("/api/users/{}/transactions", user_id))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_transaction_roundtrip() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let transaction_id = create_transaction(
            &server,
            &user_id,
            json!({
                "amount": 250,
                "type": "debit",
                "category": "Food & Drinks",
                "description": "Lunch",
                "transaction_date": "2024-05-10",
                "tags": ["food"]
            }),
        )
        .await;

        let response = server
            .get(&format!(
                "/api/users/{}/transactions/{}",
                user_id, transaction_id
            ))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["amount"], "250");
        assert_eq!(body.data["type"], "debit");
        assert_eq!(body.data["category"], "Food & Drinks");
        assert_eq!(body.data["transaction_date"], "2024-05-10");
        assert_eq!(body.data["tags"], json!(["food"]));
        assert_eq!(body.data["currency"], "INR");
        assert_eq!(body.data["status"], "completed");
    }

    #[tokio::test]
    async fn test_create_transaction_validation() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .post(&format!("/api/users/{}/transactions", user_id))
            .json(&json!({ "amount": -5, "type": "debit" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "INVALID_AMOUNT");

        let response = server
            .post(&format!("/api/users/{}/transactions", user_id))
            .json(&json!({ "amount": 5, "type": "transfer" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "INVALID_TYPE");

        let response = server
            .post("/api/users/missing-user/transactions")
            .json(&json!({ "amount": 5, "type": "debit" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_transaction_with_receipt_multipart() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let form = MultipartForm::new()
            .add_text("amount", "99")
            .add_text("type", "debit")
            .add_text("category", "Shopping")
            .add_part(
                "receipt",
                Part::bytes(b"fake-image-bytes".to_vec())
                    .file_name("receipt.png")
                    .mime_type("image/png"),
            );

        let response = server
            .post(&format!("/api/users/{}/transactions", user_id))
            .multipart(form)
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["receiptUploaded"], true);
        assert_eq!(body.data["transaction"]["receipt_filename"], "receipt.png");
        let receipt_url = body.data["transaction"]["receipt_url"].as_str().unwrap();
        assert!(receipt_url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_update_transaction_replaces_fields() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;
        let transaction_id = create_transaction(
            &server,
            &user_id,
            json!({
                "amount": 50,
                "type": "debit",
                "category": "Bills",
                "description": "Electricity"
            }),
        )
        .await;

        let response = server
            .put(&format!(
                "/api/users/{}/transactions/{}",
                user_id, transaction_id
            ))
            .json(&json!({
                "amount": 75,
                "type": "credit",
                "transaction_date": "2024-04-01"
            }))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["amount"], "75");
        assert_eq!(body.data["type"], "credit");
        // Full-field replace: omitted optional fields reset to defaults.
        assert_eq!(body.data["description"], Value::Null);
        assert_eq!(body.data["category"], Value::Null);

        let response = server
            .put(&format!("/api/users/{}/transactions/999", user_id))
            .json(&json!({ "amount": 75, "type": "credit" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_transaction() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;
        let transaction_id = create_transaction(
            &server,
            &user_id,
            json!({ "amount": 10, "type": "debit" }),
        )
        .await;

        let response = server
            .delete(&format!(
                "/api/users/{}/transactions/{}",
                user_id, transaction_id
            ))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .delete(&format!(
                "/api/users/{}/transactions/{}",
                user_id, transaction_id
            ))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_partial_success() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;
        let first = create_transaction(
            &server,
            &user_id,
            json!({ "amount": 10, "type": "debit" }),
        )
        .await;
        let second = create_transaction(
            &server,
            &user_id,
            json!({ "amount": 20, "type": "credit" }),
        )
        .await;

        let response = server
            .delete(&format!("/api/users/{}/transactions", user_id))
            .json(&json!({ "transaction_ids": [first, second, 999] }))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["deletedTransactions"].as_array().unwrap().len(), 2);
        assert_eq!(body.data["notFoundTransactionIds"], json!([999]));

        let response = server
            .delete(&format!("/api/users/{}/transactions", user_id))
            .json(&json!({ "transaction_ids": [] }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_financial_summary_day_scenario() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let date = today();
        for (amount, kind) in [(1000, "credit"), (300, "debit"), (200, "debit")] {
            create_transaction(
                &server,
                &user_id,
                json!({ "amount": amount, "type": kind, "transaction_date": date }),
            )
            .await;
        }

        let response = server
            .get(&format!("/api/users/{}/finance/summary", user_id))
            .add_query_param("period", "day")
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["period"], "day");
        assert_eq!(body.data["income"], "1000");
        assert_eq!(body.data["expenses"], "500");
        assert_eq!(body.data["balance"], "500");
        assert_eq!(body.data["transaction_count"]["income"], 1);
        assert_eq!(body.data["transaction_count"]["expenses"], 2);
    }

    #[tokio::test]
    async fn test_financial_summary_rejects_unknown_period() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .get(&format!("/api/users/{}/finance/summary", user_id))
            .add_query_param("period", "decade")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "INVALID_PERIOD");
    }

    #[tokio::test]
    async fn test_financial_breakdown_by_month() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        for (amount, kind, date) in [
            (500, "credit", "2024-01-10"),
            (200, "debit", "2024-02-10"),
            (100, "credit", "2024-03-10"),
            (40, "debit", "2024-03-12"),
        ] {
            create_transaction(
                &server,
                &user_id,
                json!({ "amount": amount, "type": kind, "transaction_date": date }),
            )
            .await;
        }

        let response = server
            .get(&format!("/api/users/{}/finance/breakdown", user_id))
            .add_query_param("groupBy", "month")
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["group_by"], "month");

        let breakdown = body.data["breakdown"].as_array().unwrap();
        let periods: Vec<&str> = breakdown
            .iter()
            .map(|bucket| bucket["period"].as_str().unwrap())
            .collect();
        assert_eq!(periods, vec!["2024-03", "2024-02", "2024-01"]);

        // One-sided buckets keep a zero on the other side.
        assert_eq!(breakdown[2]["income"], "500");
        assert_eq!(breakdown[2]["expenses"], "0");
        assert_eq!(breakdown[1]["income"], "0");
        assert_eq!(breakdown[1]["expenses"], "200");
        assert_eq!(breakdown[0]["balance"], "60");
        assert_eq!(breakdown[0]["transaction_count"]["total"], 2);

        assert_eq!(body.data["summary"]["total_income"], "600");
        assert_eq!(body.data["summary"]["total_expenses"], "240");
        assert_eq!(body.data["summary"]["total_balance"], "360");
        assert_eq!(body.data["summary"]["total_transactions"], 4);
    }

    #[tokio::test]
    async fn test_financial_breakdown_week_uses_iso_week_year() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        // 2021-01-01 belongs to ISO week 53 of 2020.
        create_transaction(
            &server,
            &user_id,
            json!({ "amount": 10, "type": "debit", "transaction_date": "2021-01-01" }),
        )
        .await;

        let response = server
            .get(&format!("/api/users/{}/finance/breakdown", user_id))
            .add_query_param("groupBy", "week")
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["breakdown"][0]["period"], "2020-W53");
    }

    #[tokio::test]
    async fn test_bulk_upload_persists_and_is_not_idempotent() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let payload = json!({
            "userId": user_id,
            "transactions": [
                { "title": "Salary", "date": "2024-01-31", "type": "credit", "amount": 2000, "category": "Income", "reference": "TXN-001" },
                { "title": "Coffee", "description": "STARBUCKS", "date": "2024-01-05", "type": "debit", "amount": 4.5, "category": "Food & Drinks" },
                { "description": "UBER", "date": "2024-01-06", "type": "debit", "amount": 12, "category": "Transportation" }
            ]
        });

        let response = server.post("/api/upload/bulk").json(&payload).await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["totalUploaded"], 3);
        let rows = body.data["transactions"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        // Title wins over description when both exist; reference passes through.
        assert_eq!(rows[0]["description"], "Salary");
        assert_eq!(rows[0]["reference"], "TXN-001");
        assert_eq!(rows[1]["description"], "Coffee");
        assert_eq!(rows[2]["description"], "UBER");
        assert_eq!(rows[0]["currency"], "INR");
        assert!(rows[0]["id"].as_i64().unwrap() > 0);

        // Resubmitting the same candidates duplicates rows; there is no
        // dedup key.
        let response = server.post("/api/upload/bulk").json(&payload).await;
        response.assert_status(StatusCode::OK);

        let response = server
            .get(&format!("/api/users/{}/transactions", user_id))
            .await;
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data.as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_bulk_upload_validation() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .post("/api/upload/bulk")
            .json(&json!({ "userId": user_id, "transactions": [] }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let response = server
            .post("/api/upload/bulk")
            .json(&json!({
                "userId": "missing-user",
                "transactions": [
                    { "title": "X", "date": "2024-01-05", "type": "debit", "amount": 5, "category": "Other" }
                ]
            }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server
            .post("/api/upload/bulk")
            .json(&json!({
                "userId": user_id,
                "transactions": [
                    { "title": "X", "date": "2024-01-05", "type": "debit", "amount": 0, "category": "Other" }
                ]
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_file_accept_stage_rejections() {
        let server = test_server().await;

        // No file part at all.
        let response = server
            .post("/api/upload/file")
            .multipart(MultipartForm::new().add_text("userId", "u1"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "NO_FILE");

        // File but no owning user.
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"Date,Description,Amount\n".to_vec())
                .file_name("statement.csv")
                .mime_type("text/csv"),
        );
        let response = server.post("/api/upload/file").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "USER_ID_REQUIRED");

        // MIME type outside the accept filter.
        let form = MultipartForm::new()
            .add_text("userId", "u1")
            .add_part(
                "file",
                Part::bytes(b"hello".to_vec())
                    .file_name("notes.txt")
                    .mime_type("text/plain"),
            );
        let response = server.post("/api/upload/file").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "INVALID_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_upload_file_images_have_no_parse_path() {
        let server = test_server().await;

        let form = MultipartForm::new()
            .add_text("userId", "u1")
            .add_part(
                "file",
                Part::bytes(b"\x89PNG\r\n".to_vec())
                    .file_name("receipt.png")
                    .mime_type("image/png"),
            );
        let response = server.post("/api/upload/file").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "UNSUPPORTED_FILE_TYPE");
    }

    #[tokio::test]
    async fn test_upload_file_malformed_csv_fails_before_extraction() {
        let server = test_server().await;

        let form = MultipartForm::new()
            .add_text("userId", "u1")
            .add_part(
                "file",
                Part::bytes(b"Date,Description,Amount\n2024-01-05,Coffee\n".to_vec())
                    .file_name("broken.csv")
                    .mime_type("text/csv"),
            );
        let response = server.post("/api/upload/file").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "FILE_PARSE_ERROR");
    }

    #[tokio::test]
    async fn test_upload_history_groups_by_day() {
        let server = test_server().await;
        let user_id = create_user(&server, "Asha", "asha@example.com").await;

        let response = server
            .post("/api/upload/bulk")
            .json(&json!({
                "userId": user_id,
                "transactions": [
                    { "title": "A", "date": "2024-01-05", "type": "debit", "amount": 5, "category": "Bills" },
                    { "title": "B", "date": "2024-01-06", "type": "debit", "amount": 10, "category": "Shopping" },
                    { "title": "C", "date": "2024-01-07", "type": "credit", "amount": 100, "category": "Income" }
                ]
            }))
            .await;
        response.assert_status(StatusCode::OK);

        let response = server
            .get(&format!("/api/upload/history/{}", user_id))
            .await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        let history = body.data.as_array().unwrap();
        // All three rows share one creation day.
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["transaction_count"], 3);
        assert_eq!(history[0]["total_amount"], "115");
        assert_eq!(history[0]["categories"], "Bills, Income, Shopping");
    }

    #[tokio::test]
    async fn test_ai_chat_validation() {
        let server = test_server().await;

        let response = server
            .post("/api/ai/chat")
            .json(&json!({ "userId": "u1" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "MESSAGE_REQUIRED");

        let response = server
            .post("/api/ai/chat")
            .json(&json!({ "message": "How much did I spend?" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert_eq!(body.code, "USER_ID_REQUIRED");
    }

    #[tokio::test]
    async fn test_ai_health_and_market_data() {
        let server = test_server().await;

        let response = server.get("/api/ai/health").await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert_eq!(body.data["message"], "AI service is running");

        let response = server.get("/api/ai/market-data").await;
        response.assert_status(StatusCode::OK);
        let body: ApiResponse<Value> = response.json();
        assert!(body.data["stocks"]["nifty50"]["value"].is_number());
        assert!(body.data["crypto"]["bitcoin"]["value"].is_number());
    }

    #[tokio::test]
    async fn test_rate_limit_headers_are_attached() {
        let server = test_server().await;

        let response = server.get("/health").await;
        response.assert_status(StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-limit"));
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        assert!(response.headers().contains_key("x-ratelimit-reset"));
    }
}
