//! JSON import/export for [`Dataset`].
//!
//! Two layouts are accepted: a JSON array of flat objects, or JSON Lines
//! (one object per line, chosen by a `.jsonl` / `.ndjson` extension).
//! Column order is the order in which keys are first seen.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{ColgenError, Result};
use crate::types::Dataset;

/// Record layout on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// `[{...}, {...}]`
    Array,
    /// `{...}\n{...}\n`
    Lines,
}

impl RecordFormat {
    /// Pick a layout from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                Self::Lines
            }
            _ => Self::Array,
        }
    }
}

/// Load a dataset from disk.
pub fn read_path(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|e| ColgenError::io(path, e))?;
    let dataset = match RecordFormat::from_path(path) {
        RecordFormat::Array => parse_array(&content),
        RecordFormat::Lines => parse_lines(&content),
    }?;
    tracing::debug!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "dataset loaded"
    );
    Ok(dataset)
}

/// Write a dataset to disk in the layout implied by the extension.
pub fn write_path(dataset: &Dataset, path: &Path) -> Result<()> {
    let content = match RecordFormat::from_path(path) {
        RecordFormat::Array => {
            let records = to_records(dataset);
            let mut out = serde_json::to_string_pretty(&records)
                .map_err(|e| ColgenError::Dataset(format!("serialize failed: {e}")))?;
            out.push('\n');
            out
        }
        RecordFormat::Lines => {
            let mut out = String::new();
            for record in to_records(dataset) {
                let line = serde_json::to_string(&record)
                    .map_err(|e| ColgenError::Dataset(format!("serialize failed: {e}")))?;
                out.push_str(&line);
                out.push('\n');
            }
            out
        }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ColgenError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| ColgenError::io(path, e))
}

/// Parse a JSON array of flat objects.
pub fn parse_array(content: &str) -> Result<Dataset> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ColgenError::Dataset(format!("invalid JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(ColgenError::Dataset(
            "expected a JSON array of objects at the top level".into(),
        ));
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| into_object(item, i))
        .collect::<Result<Vec<_>>>()?;
    from_records(records)
}

/// Parse JSON Lines; blank lines are skipped.
pub fn parse_lines(content: &str) -> Result<Dataset> {
    let records = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: Value = serde_json::from_str(line)
                .map_err(|e| ColgenError::Dataset(format!("line {}: invalid JSON: {e}", i + 1)))?;
            into_object(value, i)
        })
        .collect::<Result<Vec<_>>>()?;
    from_records(records)
}

/// Render the table back into JSON objects.
pub fn to_records(dataset: &Dataset) -> Vec<Value> {
    dataset
        .rows()
        .map(|row| {
            let map: Map<String, Value> = dataset
                .columns()
                .iter()
                .zip(row)
                .map(|(col, cell)| (col.clone(), Value::String(cell.clone())))
                .collect();
            Value::Object(map)
        })
        .collect()
}

fn into_object(value: Value, index: usize) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ColgenError::Dataset(format!(
            "record {index} is not an object (got {})",
            type_name(&other)
        ))),
    }
}

fn from_records(records: Vec<Map<String, Value>>) -> Result<Dataset> {
    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut dataset = Dataset::new(columns.iter().cloned());
    for record in &records {
        let cells = columns
            .iter()
            .map(|col| record.get(col).map(cell_text).unwrap_or_default());
        dataset.push_row(cells)?;
    }
    Ok(dataset)
}

/// Text form of a scalar cell; nested values keep their JSON encoding.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
