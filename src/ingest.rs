//! Statement ingestion pipeline.
//!
//! One request walks received -> parsed -> extracted -> validated -> returned,
//! with a failure exit at every stage. Nothing is persisted here; the caller
//! reviews the candidates and submits them to the bulk endpoint separately.

use axum::http::StatusCode;
use thiserror::Error;
use tracing::{debug, info};

use crate::ai::client::{AiError, GeminiClient};
use crate::ai::extraction::{
    self, ValidatedTransaction, parse_extraction, strip_code_fences, validate_candidates,
};
use crate::parsers::{self, FileKind, ParseError};

/// Upper bound on uploaded statement size.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("Failed to process file with AI")]
    Extraction(#[from] AiError),
    #[error("Failed to extract transaction data from file")]
    Contract(#[source] serde_json::Error),
    #[error("No valid transactions found in the file")]
    NoValidRows,
}

impl IngestError {
    /// Upstream failures are 500s; everything else is on the caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedType(_) => "UNSUPPORTED_FILE_TYPE",
            IngestError::Parse(_) => "FILE_PARSE_ERROR",
            IngestError::Extraction(_) => "AI_EXTRACTION_ERROR",
            IngestError::Contract(_) => "AI_RESPONSE_INVALID",
            IngestError::NoValidRows => "NO_VALID_TRANSACTIONS",
        }
    }
}

/// Outcome of a successful pipeline run.
#[derive(Debug)]
pub struct IngestedStatement {
    pub file_name: String,
    pub mime_type: String,
    pub transactions: Vec<ValidatedTransaction>,
    pub discarded: usize,
}

/// Run the full parse -> prompt -> validate pipeline for one uploaded file.
pub async fn process_statement(
    gemini: &GeminiClient,
    file_name: &str,
    mime_type: &str,
    data: &[u8],
) -> Result<IngestedStatement, IngestError> {
    let kind = FileKind::from_mime(mime_type)
        .ok_or_else(|| IngestError::UnsupportedType(mime_type.to_string()))?;

    let prompt = match kind {
        FileKind::Csv => {
            let rows = parsers::parse_csv(data)?;
            debug!("Parsed {} CSV rows from {}", rows.len(), file_name);
            let rows_json = serde_json::to_string_pretty(&rows)
                .map_err(IngestError::Contract)?;
            extraction::tabular_prompt(file_name, "CSV", &rows_json)
        }
        FileKind::Excel => {
            let rows = parsers::parse_spreadsheet(data)?;
            debug!("Parsed {} spreadsheet rows from {}", rows.len(), file_name);
            let rows_json = serde_json::to_string_pretty(&rows)
                .map_err(IngestError::Contract)?;
            extraction::tabular_prompt(file_name, "EXCEL", &rows_json)
        }
        FileKind::Pdf => {
            let text = parsers::extract_pdf_text(data)?;
            debug!("Extracted {} characters of PDF text from {}", text.len(), file_name);
            extraction::pdf_prompt(file_name, &text)
        }
        // Images pass the accept filter but have no parse path.
        FileKind::Image => {
            return Err(IngestError::UnsupportedType(mime_type.to_string()));
        }
    };

    let raw = gemini.generate(&prompt).await?;
    let cleaned = strip_code_fences(&raw);
    let payload = parse_extraction(&cleaned).map_err(IngestError::Contract)?;

    let (transactions, discarded) = validate_candidates(payload.transactions);
    if transactions.is_empty() {
        return Err(IngestError::NoValidRows);
    }

    info!(
        "Extracted {} transactions ({} discarded) from {}",
        transactions.len(),
        discarded,
        file_name
    );

    Ok(IngestedStatement {
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        transactions,
        discarded,
    })
}
