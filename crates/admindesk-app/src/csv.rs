// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! CSV reading and writing for list export and bulk import.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::display::value_from_input;
use crate::{EntityDescriptor, EntityRecord, FieldSpec, ID_FIELD};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsvError {
    #[error("CSV input is empty; expected a header row")]
    MissingHeader,
    #[error("line {line}: {message}")]
    Malformed { line: u64, message: String },
    #[error("line {line}: expected {expected} values, found {found}")]
    RowWidth {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("header has no editable {entity} column; expected one of: {expected}")]
    NoEditableColumns { entity: String, expected: String },
    #[error("line {line}, column {field}: {message}")]
    InvalidValue {
        line: u64,
        field: String,
        message: String,
    },
}

impl CsvError {
    fn malformed(error: csv::Error) -> Self {
        Self::Malformed {
            line: error.position().map_or(0, csv::Position::line),
            message: error.to_string(),
        }
    }
}

pub fn default_export_name(descriptor: &EntityDescriptor) -> String {
    format!("{}.csv", descriptor.service)
}

/// Writes `_id` followed by `columns`, one row per record.
pub fn export_csv<W: Write>(
    rows: &[Arc<EntityRecord>],
    columns: &[&FieldSpec],
    writer: W,
) -> Result<()> {
    let mut out = WriterBuilder::new().from_writer(writer);

    let mut header = vec![ID_FIELD];
    header.extend(columns.iter().map(|spec| spec.name));
    out.write_record(&header).context("write CSV header")?;

    for row in rows {
        let mut cells = vec![export_value(row.get(ID_FIELD))];
        cells.extend(columns.iter().map(|spec| export_value(row.get(spec.name))));
        out.write_record(&cells).context("write CSV row")?;
    }
    out.flush().context("flush CSV output")?;
    Ok(())
}

fn export_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(object)) => object
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| Value::Object(object.clone()).to_string()),
        Some(other) => other.to_string(),
    }
}

/// Create payloads for every data row. Columns the entity cannot write
/// (`_id`, metadata, unknown names) are ignored. Errors name the line the
/// offending row starts on.
pub fn records_from_csv(
    descriptor: &EntityDescriptor,
    text: &str,
) -> Result<Vec<Map<String, Value>>, CsvError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let header = reader.headers().map_err(CsvError::malformed)?.clone();
    if header.is_empty() {
        return Err(CsvError::MissingHeader);
    }

    let columns: Vec<Option<&FieldSpec>> = header
        .iter()
        .map(|name| {
            descriptor
                .editable_fields()
                .find(|spec| spec.name == name.trim())
        })
        .collect();
    if columns.iter().all(Option::is_none) {
        return Err(CsvError::NoEditableColumns {
            entity: descriptor.kind.label().to_owned(),
            expected: descriptor
                .editable_fields()
                .map(|spec| spec.name)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(CsvError::malformed)?;
        records.push(payload_from_row(&columns, &row)?);
    }
    Ok(records)
}

fn payload_from_row(
    columns: &[Option<&FieldSpec>],
    row: &StringRecord,
) -> Result<Map<String, Value>, CsvError> {
    let line = row.position().map_or(0, csv::Position::line);
    if row.len() != columns.len() {
        return Err(CsvError::RowWidth {
            line,
            expected: columns.len(),
            found: row.len(),
        });
    }
    let mut record = Map::new();
    for (spec, raw) in columns.iter().zip(row.iter()) {
        let Some(spec) = spec else {
            continue;
        };
        let value = value_from_input(spec.kind, raw).map_err(|error| CsvError::InvalidValue {
            line,
            field: spec.name.to_owned(),
            message: error.to_string(),
        })?;
        record.insert(spec.name.to_owned(), value);
    }
    Ok(record)
}
