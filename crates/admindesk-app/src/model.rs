// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::RecordId;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const CREATED_BY_FIELD: &str = "createdBy";
pub const UPDATED_AT_FIELD: &str = "updatedAt";
pub const UPDATED_BY_FIELD: &str = "updatedBy";

/// Fields the remote side owns. Never part of an outgoing payload.
pub const SERVER_OWNED_FIELDS: [&str; 5] = [
    ID_FIELD,
    CREATED_AT_FIELD,
    CREATED_BY_FIELD,
    UPDATED_AT_FIELD,
    UPDATED_BY_FIELD,
];

pub fn is_server_owned(field: &str) -> bool {
    SERVER_OWNED_FIELDS.contains(&field)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Roles,
    ServiceSettings,
}

impl EntityKind {
    pub const ALL: [Self; 2] = [Self::Roles, Self::ServiceSettings];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::ServiceSettings => "servicesettings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "roles" => Some(Self::Roles),
            "servicesettings" | "service_settings" | "service-settings" => {
                Some(Self::ServiceSettings)
            }
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Roles => "roles",
            Self::ServiceSettings => "service settings",
        }
    }

    pub const fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            Self::Roles => &ROLES,
            Self::ServiceSettings => &SERVICE_SETTINGS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    LongText,
    Bool,
    Timestamp,
    UserRef,
}

impl FieldKind {
    /// Value a create dialog starts from.
    pub fn blank_value(self) -> Value {
        match self {
            Self::Text | Self::LongText => Value::String(String::new()),
            Self::Bool => Value::Bool(false),
            Self::Timestamp | Self::UserRef => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub editable: bool,
}

impl FieldSpec {
    const fn editable(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            editable: true,
        }
    }

    const fn read_only(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            editable: false,
        }
    }
}

const METADATA_FIELDS: [FieldSpec; 4] = [
    FieldSpec::read_only(CREATED_AT_FIELD, "created at", FieldKind::Timestamp),
    FieldSpec::read_only(CREATED_BY_FIELD, "created by", FieldKind::UserRef),
    FieldSpec::read_only(UPDATED_AT_FIELD, "updated at", FieldKind::Timestamp),
    FieldSpec::read_only(UPDATED_BY_FIELD, "updated by", FieldKind::UserRef),
];

/// Everything the generic table, dialog, and reconciler need to know about
/// one entity type: its schema, which fields a client may write, and the
/// remote service path it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub service: &'static str,
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
    pub metadata: &'static [FieldSpec],
}

pub static ROLES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Roles,
    service: "roles",
    title: "Roles",
    fields: &[
        FieldSpec::editable("name", "name", FieldKind::Text),
        FieldSpec::editable("description", "description", FieldKind::LongText),
        FieldSpec::editable("isDefault", "is default", FieldKind::Bool),
    ],
    metadata: &METADATA_FIELDS,
};

pub static SERVICE_SETTINGS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::ServiceSettings,
    service: "servicesettings",
    title: "Service settings",
    fields: &[
        FieldSpec::editable("name", "name", FieldKind::Text),
        FieldSpec::editable("value", "value", FieldKind::Text),
        FieldSpec::editable("description", "description", FieldKind::LongText),
    ],
    metadata: &METADATA_FIELDS,
};

impl EntityDescriptor {
    /// Entity fields followed by server-owned metadata; the table's column set.
    pub fn schema(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields.iter().chain(self.metadata.iter())
    }

    pub fn editable_fields(&self) -> impl Iterator<Item = &'static FieldSpec> {
        self.fields
            .iter()
            .filter(|spec| spec.editable && !is_server_owned(spec.name))
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.schema().find(|spec| spec.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn is_editable(&self, name: &str) -> bool {
        self.editable_fields().any(|spec| spec.name == name)
    }
}

/// One remote record: an open JSON object plus the fixed metadata fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<RecordId> {
        record_id_of(&self.fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl From<Map<String, Value>> for EntityRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

pub(crate) fn record_id_of(fields: &Map<String, Value>) -> Option<RecordId> {
    match fields.get(ID_FIELD)? {
        Value::String(id) if !id.is_empty() => Some(RecordId::new(id.clone())),
        Value::Number(id) => Some(RecordId::new(id.to_string())),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn flip(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

pub const PAGE_SIZE_OPTIONS: [usize; 4] = [10, 50, 250, 500];
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Which slice of the remote list the row collection currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: usize,
    pub limit: usize,
    pub total: usize,
}

impl PageWindow {
    pub const fn first(limit: usize) -> Self {
        Self {
            skip: 0,
            limit,
            total: 0,
        }
    }

    pub const fn has_next(&self) -> bool {
        self.skip + self.limit < self.total
    }

    pub const fn has_prev(&self) -> bool {
        self.skip > 0
    }

    pub fn next(&self) -> Self {
        Self {
            skip: self.skip + self.limit,
            ..*self
        }
    }

    pub fn prev(&self) -> Self {
        Self {
            skip: self.skip.saturating_sub(self.limit),
            ..*self
        }
    }

    /// "{first} to {last} of {total}" style report, 1-based.
    pub fn report(&self, shown: usize) -> String {
        if shown == 0 {
            return format!("0 of {}", self.total);
        }
        format!(
            "{} to {} of {}",
            self.skip + 1,
            self.skip + shown,
            self.total.max(self.skip + shown)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogKind {
    Edit,
    Create,
    FilterFields,
    HideFields,
    ColumnFilter,
    Export,
    Import,
    ConfirmDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Table,
    Dialog(DialogKind),
}
