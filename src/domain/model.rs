use crate::utils::error::{EtlError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }
}

/// An in-memory table: rows keyed by column name plus the column order in
/// which the columns were first seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frame from JSON objects. Non-object values become a single
    /// `value` column.
    pub fn from_json_rows<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut frame = Frame::new();
        for value in values {
            match value {
                Value::Object(obj) => {
                    let mut data = HashMap::with_capacity(obj.len());
                    for (key, value) in obj {
                        frame.register_column(&key);
                        data.insert(key, value);
                    }
                    frame.rows.push(Record { data });
                }
                other => {
                    frame.register_column("value");
                    let mut data = HashMap::new();
                    data.insert("value".to_string(), other);
                    frame.rows.push(Record { data });
                }
            }
        }
        frame
    }

    /// Reads a JSON array of objects, a single object, or JSON lines.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Array(items)) => Ok(Self::from_json_rows(items)),
            Ok(single @ Value::Object(_)) => Ok(Self::from_json_rows([single])),
            Ok(_) => Err(EtlError::ProcessingError {
                message: "JSON content must be an array of objects or an object".to_string(),
            }),
            Err(_) => {
                let text = std::str::from_utf8(bytes).map_err(|e| EtlError::ProcessingError {
                    message: format!("JSON content is not valid UTF-8: {}", e),
                })?;
                let mut values = Vec::new();
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    values.push(serde_json::from_str::<Value>(line)?);
                }
                Ok(Self::from_json_rows(values))
            }
        }
    }

    /// Reads delimited text with a header row. Every cell is kept as a string.
    pub fn from_delimited(bytes: &[u8], sep: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sep)
            .has_headers(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            let data = columns
                .iter()
                .zip(row.iter())
                .map(|(column, cell)| (column.clone(), Value::String(cell.to_string())))
                .collect();
            rows.push(Record { data });
        }

        Ok(Frame { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Concatenates `other` below `self`, keeping the union of columns.
    pub fn extend(&mut self, other: Frame) {
        for column in &other.columns {
            self.register_column(column);
        }
        self.rows.extend(other.rows);
    }

    /// Removes the given columns. Returns the names that were not present.
    pub fn drop_columns(&mut self, columns: &[String]) -> Vec<String> {
        let mut missing = Vec::new();
        for column in columns {
            if let Some(pos) = self.columns.iter().position(|c| c == column) {
                self.columns.remove(pos);
                for row in &mut self.rows {
                    row.data.remove(column);
                }
            } else {
                missing.push(column.clone());
            }
        }
        missing
    }

    /// Sets `name` to `value` on every row, appending the column if new.
    pub fn with_column(&mut self, name: &str, value: Value) {
        self.register_column(name);
        for row in &mut self.rows {
            row.data.insert(name.to_string(), value.clone());
        }
    }

    /// Renders the frame as delimited text with a header row.
    pub fn to_delimited(&self, sep: u8) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(sep)
            .from_writer(Vec::new());

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(self.columns.iter().map(|c| cell_text(row.data.get(c))))?;
        }

        let bytes = writer.into_inner().map_err(|e| EtlError::ProcessingError {
            message: format!("Failed to flush delimited output: {}", e),
        })?;
        String::from_utf8(bytes).map_err(|e| EtlError::ProcessingError {
            message: format!("Delimited output is not valid UTF-8: {}", e),
        })
    }

    fn register_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }
}

pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub const SOURCE_COLUMN: &str = "_etl_source";
pub const DOWNLOADED_AT_COLUMN: &str = "_etl_downloaded_at_utc";

/// Tags every row with where it came from and when it was downloaded.
pub fn add_ingestion_metadata(frame: &mut Frame, source: &str, downloaded_at: DateTime<Utc>) {
    frame.with_column(SOURCE_COLUMN, Value::String(source.to_string()));
    frame.with_column(
        DOWNLOADED_AT_COLUMN,
        Value::String(downloaded_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    );
}

/// What to do when a step produces no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfEmpty {
    #[default]
    Warn,
    Skip,
    Fail,
}

impl std::str::FromStr for IfEmpty {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "warn" => Ok(IfEmpty::Warn),
            "skip" => Ok(IfEmpty::Skip),
            "fail" => Ok(IfEmpty::Fail),
            other => Err(EtlError::validation(format!(
                "if_empty must be one of warn, skip, fail; got '{}'",
                other
            ))),
        }
    }
}

impl IfEmpty {
    /// Applies the policy to an empty result. `Ok(())` means the caller
    /// continues with the empty data.
    pub fn handle(self, what: &str) -> Result<()> {
        match self {
            IfEmpty::Warn => {
                tracing::warn!("⚠️ {} returned no data", what);
                Ok(())
            }
            IfEmpty::Skip => {
                tracing::info!("⏭️ {} returned no data, skipping", what);
                Ok(())
            }
            IfEmpty::Fail => Err(EtlError::EmptyData {
                message: what.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub processed_records: Vec<Record>,
    pub csv_output: String,
    pub tsv_output: String,
    pub frame: Frame,
}
