//! Format-specific statement parsers.
//!
//! Each adapter turns raw upload bytes into a normalized row set (ordered
//! header -> value mappings) or, for PDFs, a plain-text dump. The extraction
//! step works from these shapes only and never sees the original bytes.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{Map, Value};
use std::io::Cursor;
use thiserror::Error;

/// One parsed statement row: header name -> cell value.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse CSV file: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to parse spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("spreadsheet contains no worksheets")]
    EmptyWorkbook,
    #[error("failed to extract text from PDF: {0}")]
    Pdf(#[from] pdf_extract::OutputError),
}

/// Upload formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Excel,
    Pdf,
    Image,
}

impl FileKind {
    /// Map a MIME type onto a parse path. Returns `None` for types outside
    /// the accept filter.
    pub fn from_mime(mime: &str) -> Option<FileKind> {
        match mime {
            "text/csv" => Some(FileKind::Csv),
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(FileKind::Excel)
            }
            "application/pdf" => Some(FileKind::Pdf),
            "image/jpeg" | "image/jpg" | "image/png" => Some(FileKind::Image),
            _ => None,
        }
    }
}

/// Decode a CSV document into header->value rows, preserving file order.
/// Any malformed record fails the whole parse.
pub fn parse_csv(data: &[u8]) -> Result<Vec<Row>, ParseError> {
    let mut reader = csv::ReaderBuilder::new().from_reader(data);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(field.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Read the first worksheet of an Excel workbook. The first row is the
/// header; a blank header cell gets a synthesized `col_N` name. Rows with no
/// content at all are skipped; missing cells map to null.
pub fn parse_spreadsheet(data: &[u8]) -> Result<Vec<Row>, ParseError> {
    let cursor = Cursor::new(data.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::EmptyWorkbook)??;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let name = cell_to_string(cell);
                let name = name.trim();
                if name.is_empty() {
                    format!("col_{}", i + 1)
                } else {
                    name.to_string()
                }
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for data_row in rows_iter {
        if data_row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            let value = data_row.get(i).map(cell_to_value).unwrap_or(Value::Null);
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Extract the whole document's plain text; no layout or table structure is
/// preserved.
pub fn extract_pdf_text(data: &[u8]) -> Result<String, ParseError> {
    Ok(pdf_extract::extract_text_from_mem(data)?)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => Value::String(datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Value::Null,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) => Value::Null,
    }
}
