// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::FieldKind;

/// Table cell text for one field value.
pub fn cell_text(value: Option<&Value>, kind: FieldKind, now: OffsetDateTime) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match (kind, value) {
        (_, Value::Null) => String::new(),
        (FieldKind::Timestamp, Value::String(raw)) => match parse_timestamp(raw) {
            Some(at) => format_relative(at, now),
            None => raw.clone(),
        },
        (FieldKind::UserRef, Value::Object(user)) => user
            .get("name")
            .or_else(|| user.get("_id"))
            .map(plain_text)
            .unwrap_or_default(),
        (FieldKind::Bool, Value::Bool(flag)) => String::from(if *flag { "yes" } else { "no" }),
        (FieldKind::LongText, Value::String(text)) => {
            text.lines().next().unwrap_or_default().to_owned()
        }
        _ => plain_text(value),
    }
}

/// Text a dialog input starts from.
pub fn input_text(value: Option<&Value>) -> String {
    value.map(plain_text).unwrap_or_default()
}

/// Lowercased text a column filter matches against.
pub fn search_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Object(object)) => object
            .get("name")
            .or_else(|| object.get("_id"))
            .map(plain_text)
            .unwrap_or_default(),
        Some(other) => plain_text(other),
        None => String::new(),
    }
    .to_lowercase()
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Converts operator input into the JSON value a field of `kind` holds.
pub fn value_from_input(kind: FieldKind, input: &str) -> Result<Value> {
    match kind {
        FieldKind::Text | FieldKind::LongText | FieldKind::UserRef => {
            Ok(Value::String(input.to_owned()))
        }
        FieldKind::Bool => parse_bool_input(input).map(Value::Bool),
        FieldKind::Timestamp => {
            let trimmed = input.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            parse_timestamp(trimmed)
                .map(|_| Value::String(trimmed.to_owned()))
                .ok_or_else(|| {
                    anyhow!("timestamp {trimmed:?} is not RFC 3339, e.g. 2026-01-02T15:04:05Z")
                })
        }
    }
}

pub fn parse_bool_input(input: &str) -> Result<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "no" | "n" | "0" | "off" | "" => Ok(false),
        other => bail!("{other:?} is not a yes/no value; use true or false"),
    }
}

pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Coarse relative phrase such as "3 hours ago" or "in a day".
pub fn format_relative(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let delta = now - then;
    let phrase = relative_phrase(delta.abs());
    if delta.is_negative() {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

fn relative_phrase(delta: Duration) -> String {
    let seconds = delta.whole_seconds();
    let minutes = (seconds as f64 / 60.0).round() as i64;
    let hours = (seconds as f64 / 3_600.0).round() as i64;
    let days = (seconds as f64 / 86_400.0).round() as i64;

    if seconds < 45 {
        "a few seconds".to_owned()
    } else if seconds < 90 {
        "a minute".to_owned()
    } else if minutes < 45 {
        format!("{minutes} minutes")
    } else if minutes < 90 {
        "an hour".to_owned()
    } else if hours < 22 {
        format!("{hours} hours")
    } else if hours < 36 {
        "a day".to_owned()
    } else if days < 26 {
        format!("{days} days")
    } else if days < 45 {
        "a month".to_owned()
    } else if days < 320 {
        format!("{} months", ((days as f64) / 30.4).round().max(2.0) as i64)
    } else if days < 548 {
        "a year".to_owned()
    } else {
        format!("{} years", ((days as f64) / 365.0).round().max(2.0) as i64)
    }
}
