//! Statement extraction contract.
//!
//! The model is prompted with the parsed statement content and a strict
//! output contract; its response is unwrapped from any code-fence markers,
//! parsed, and filtered row by row. Discarded rows are counted rather than
//! dropped silently so callers can see partial extraction quality.

use chrono::NaiveDate;
use model::entities::user_transaction::TransactionType;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Closed category set the model must pick from.
pub const CATEGORIES: [&str; 14] = [
    "Food & Drinks",
    "Shopping",
    "Transportation",
    "Entertainment",
    "Bills",
    "UPI",
    "Banking",
    "Investment",
    "Healthcare",
    "Education",
    "Travel",
    "Subscription",
    "Income",
    "Other",
];

/// Top-level shape the model must return.
#[derive(Debug, Deserialize)]
pub struct ExtractionPayload {
    pub transactions: Vec<CandidateTransaction>,
}

/// One extracted row as the model produced it; every field is optional until
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateTransaction {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, rename = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A candidate that survived validation and is ready for review/bulk insert.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ValidatedTransaction {
    pub title: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub transaction_type: TransactionType,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub category: String,
}

/// Strip Markdown code-fence wrapping from a model response.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse the cleaned response into the extraction contract. Any structural
/// mismatch is a pipeline failure, not a partial recovery.
pub fn parse_extraction(cleaned: &str) -> Result<ExtractionPayload, serde_json::Error> {
    serde_json::from_str(cleaned)
}

/// Filter candidates down to rows carrying every required field, returning
/// the survivors and the number of rows discarded.
pub fn validate_candidates(
    candidates: Vec<CandidateTransaction>,
) -> (Vec<ValidatedTransaction>, usize) {
    let total = candidates.len();
    let mut kept = Vec::with_capacity(total);

    for candidate in candidates {
        let Some(validated) = validate_candidate(candidate) else {
            continue;
        };
        kept.push(validated);
    }

    let discarded = total - kept.len();
    (kept, discarded)
}

fn validate_candidate(candidate: CandidateTransaction) -> Option<ValidatedTransaction> {
    let date = candidate
        .date
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())?;

    let transaction_type = match candidate.transaction_type.as_deref() {
        Some("debit") => TransactionType::Debit,
        Some("credit") => TransactionType::Credit,
        _ => return None,
    };

    let amount = candidate.amount?;
    if amount <= Decimal::ZERO {
        return None;
    }

    let title = candidate.title.filter(|t| !t.trim().is_empty());
    let description = candidate.description.filter(|d| !d.trim().is_empty());
    if title.is_none() && description.is_none() {
        return None;
    }

    let category = candidate.category.filter(|c| !c.trim().is_empty())?;

    Some(ValidatedTransaction {
        title,
        description,
        reference: candidate.reference,
        date,
        transaction_type,
        amount,
        category,
    })
}

/// Prompt for CSV/Excel content, embedding the parsed rows as JSON.
pub fn tabular_prompt(file_name: &str, format_label: &str, rows_json: &str) -> String {
    format!(
        r#"You are a financial data processor. Analyze the following {format_label} data and extract transactions.

File: {file_name}
Data: {rows_json}

{contract}"#,
        contract = output_contract("file"),
    )
}

/// Prompt for PDF content, embedding the raw extracted text.
pub fn pdf_prompt(file_name: &str, text: &str) -> String {
    format!(
        r#"You are a financial data processor. Analyze the following PDF text content and extract transactions.

File: {file_name}
Content: {text}

{contract}"#,
        contract = output_contract("PDF content"),
    )
}

fn output_contract(source_label: &str) -> String {
    let categories = CATEGORIES.join(", ");
    format!(
        r#"Please extract transaction data and return it in the following JSON format:
{{
  "transactions": [
    {{
      "title": "User-friendly, short, simple transaction title",
      "description": "Exact transaction description from the {source_label}",
      "reference": "Transaction ID or reference number",
      "date": "YYYY-MM-DD",
      "type": "debit" or "credit",
      "amount": 123.45,
      "category": "AI-generated category ({categories})"
    }}
  ]
}}

Rules for processing:
1. Title:
   - Generate a short, informal, easy-to-understand title based on the transaction description.
   - Examples: "Coffee at Starbucks", "Uber ride", "Grocery shopping", "Salary payment".
   - Avoid technical jargon or codes.
2. Description:
   - Use the exact description from the {source_label}.
3. Reference:
   - Extract any transaction ID, reference number, or unique identifier.
   - If not present, generate a meaningful identifier like "TXN-001".
4. Date:
   - Convert all dates to YYYY-MM-DD format.
5. Type & Amount:
   - If the amount is negative, make it positive and type = "debit".
   - If the amount is positive and appears to be income, type = "credit".
6. Category:
   - Generate an appropriate category for the transaction.
   - Use categories: {categories}.
7. Return only valid JSON, no explanations, no extra text."#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(json: &str) -> CandidateTransaction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn strips_code_fence_wrapping() {
        let raw = "```json\n{\"transactions\": []}\n```";
        assert_eq!(strip_code_fences(raw), "{\"transactions\": []}");

        let bare = "{\"transactions\": []}";
        assert_eq!(strip_code_fences(bare), bare);
    }

    #[test]
    fn parses_contract_payload() {
        let cleaned = r#"{"transactions": [{"title": "Coffee", "description": "STARBUCKS 4821", "reference": "TXN-001", "date": "2024-01-05", "type": "debit", "amount": 4.5, "category": "Food & Drinks"}]}"#;
        let payload = parse_extraction(cleaned).unwrap();
        assert_eq!(payload.transactions.len(), 1);
        assert_eq!(payload.transactions[0].title.as_deref(), Some("Coffee"));
    }

    #[test]
    fn missing_transactions_array_is_a_contract_failure() {
        assert!(parse_extraction(r#"{"rows": []}"#).is_err());
        assert!(parse_extraction("not json at all").is_err());
    }

    #[test]
    fn validation_keeps_complete_rows_and_counts_discards() {
        let candidates = vec![
            candidate(
                r#"{"title": "Salary", "description": "ACME PAYROLL", "date": "2024-01-31", "type": "credit", "amount": 2000, "category": "Income"}"#,
            ),
            // Missing category.
            candidate(
                r#"{"title": "Coffee", "description": "STARBUCKS", "date": "2024-01-05", "type": "debit", "amount": 4.5}"#,
            ),
            // Unparseable date.
            candidate(
                r#"{"title": "Ride", "description": "UBER", "date": "05/01/2024", "type": "debit", "amount": 12, "category": "Transportation"}"#,
            ),
            // Invalid type.
            candidate(
                r#"{"title": "Rent", "description": "LANDLORD", "date": "2024-01-01", "type": "transfer", "amount": 900, "category": "Bills"}"#,
            ),
        ];

        let (kept, discarded) = validate_candidates(candidates);
        assert_eq!(kept.len(), 1);
        assert_eq!(discarded, 3);
        assert_eq!(kept[0].category, "Income");
        assert_eq!(kept[0].transaction_type, TransactionType::Credit);
    }

    #[test]
    fn zero_and_negative_amounts_are_discarded() {
        let candidates = vec![
            candidate(
                r#"{"title": "Zero", "description": "X", "date": "2024-01-05", "type": "debit", "amount": 0, "category": "Other"}"#,
            ),
            candidate(
                r#"{"title": "Negative", "description": "Y", "date": "2024-01-05", "type": "debit", "amount": -5, "category": "Other"}"#,
            ),
        ];
        let (kept, discarded) = validate_candidates(candidates);
        assert!(kept.is_empty());
        assert_eq!(discarded, 2);
    }

    #[test]
    fn title_or_description_alone_is_enough() {
        let only_title = candidate(
            r#"{"title": "Coffee", "date": "2024-01-05", "type": "debit", "amount": 4, "category": "Food & Drinks"}"#,
        );
        let only_description = candidate(
            r#"{"description": "STARBUCKS", "date": "2024-01-05", "type": "debit", "amount": 4, "category": "Food & Drinks"}"#,
        );
        let neither = candidate(
            r#"{"date": "2024-01-05", "type": "debit", "amount": 4, "category": "Food & Drinks"}"#,
        );

        let (kept, discarded) = validate_candidates(vec![only_title, only_description, neither]);
        assert_eq!(kept.len(), 2);
        assert_eq!(discarded, 1);
    }

    #[test]
    fn prompts_embed_content_and_contract() {
        let prompt = tabular_prompt("statement.csv", "CSV", r#"[{"Amount": "4.50"}]"#);
        assert!(prompt.contains("statement.csv"));
        assert!(prompt.contains("CSV data"));
        assert!(prompt.contains("\"transactions\""));
        assert!(prompt.contains("Food & Drinks"));

        let prompt = pdf_prompt("statement.pdf", "raw text");
        assert!(prompt.contains("PDF text content"));
        assert!(prompt.contains("raw text"));
    }
}
