// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde_json::Value;
use thiserror::Error;

/// Inline message used when a failure carries nothing displayable.
pub const UPDATE_FAILED_MESSAGE: &str = "Failed to update info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, timeout, TLS. The request never got an answer.
    Transport,
    /// The remote answered with a non-success status.
    Rejected { status: u16 },
    /// The remote answered but the body was not what the contract promises.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: String,
    pub errors: Option<Value>,
}

impl RemoteFailure {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transport,
            message: message.into(),
            errors: None,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Decode,
            message: message.into(),
            errors: None,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>, errors: Option<Value>) -> Self {
        Self {
            kind: FailureKind::Rejected { status },
            message: message.into(),
            errors,
        }
    }

    /// Build from an error body of the form `{name, message, code, errors}`.
    /// Anything else keeps the raw text as the message.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => {
                let message = object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                let errors = object
                    .get("errors")
                    .filter(|errors| !errors.is_null())
                    .cloned();
                Self::rejected(status, message, errors)
            }
            _ => Self::rejected(status, body.trim(), None),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, FailureKind::Rejected { status: 404 })
    }
}

/// Field name to message, in the order the remote reported them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrorMap {
    entries: Vec<(String, String)>,
}

impl FieldErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second message for the same field is appended to the first.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        let message = message.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(name, _)| *name == field) {
            existing.push_str("; ");
            existing.push_str(&message);
            return;
        }
        self.entries.push((field, message));
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    pub fn summary(&self) -> String {
        self.iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedError {
    Fields(FieldErrorMap),
    Message(String),
}

impl MappedError {
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Fields(fields) => fields.get(name),
            Self::Message(_) => None,
        }
    }

    /// One line for a status bar or notification body.
    pub fn summary(&self) -> String {
        match self {
            Self::Fields(fields) => fields.summary(),
            Self::Message(message) => message.clone(),
        }
    }
}

pub fn map_failure(failure: &RemoteFailure) -> Option<MappedError> {
    if let Some(fields) = failure.errors.as_ref().and_then(field_errors) {
        return Some(MappedError::Fields(fields));
    }
    non_empty(&failure.message).map(MappedError::Message)
}

/// Same mapping for a raw error body that has not been wrapped yet.
pub fn map_failure_value(body: &Value) -> Option<MappedError> {
    let object = body.as_object()?;
    if let Some(fields) = object.get("errors").and_then(field_errors) {
        return Some(MappedError::Fields(fields));
    }
    object
        .get("message")
        .and_then(Value::as_str)
        .and_then(non_empty)
        .map(MappedError::Message)
}

pub fn map_or_fallback(failure: &RemoteFailure, fallback: &str) -> MappedError {
    map_failure(failure).unwrap_or_else(|| MappedError::Message(fallback.to_owned()))
}

/// Accepts `{field: {message}}`, `{field: "message"}`, and
/// `[{path | field, message}]`. Entries without a usable message are skipped;
/// `None` when nothing survives.
fn field_errors(errors: &Value) -> Option<FieldErrorMap> {
    let mut mapped = FieldErrorMap::new();
    match errors {
        Value::Object(entries) => {
            for (field, entry) in entries {
                if let Some(message) = entry_message(entry) {
                    mapped.insert(field.clone(), message);
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let Some(object) = entry.as_object() else {
                    continue;
                };
                let field = object
                    .get("path")
                    .or_else(|| object.get("field"))
                    .and_then(Value::as_str)
                    .and_then(non_empty);
                if let (Some(field), Some(message)) = (field, entry_message(entry)) {
                    mapped.insert(field, message);
                }
            }
        }
        _ => {}
    }
    (!mapped.is_empty()).then_some(mapped)
}

fn entry_message(entry: &Value) -> Option<String> {
    match entry {
        Value::String(message) => non_empty(message),
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .and_then(non_empty),
        _ => None,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
