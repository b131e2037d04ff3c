// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::model::record_id_of;
use crate::{EntityDescriptor, EntityRecord, MappedError, RecordId};

/// Immutable snapshot of the values an open dialog is editing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityDraft {
    fields: Map<String, Value>,
}

impl EntityDraft {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn id(&self) -> Option<RecordId> {
        record_id_of(&self.fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_record(&self) -> EntityRecord {
        EntityRecord::from(self.fields.clone())
    }
}

/// Working copy behind one edit or create dialog.
///
/// Every write produces a fresh `Arc<EntityDraft>`, so a snapshot handed out
/// earlier (for example the one a pending submission was built from) keeps
/// its values.
#[derive(Debug, Clone, Default)]
pub struct EntityDraftStore {
    current: Arc<EntityDraft>,
    touched: BTreeSet<String>,
    errors: Option<MappedError>,
}

impl EntityDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, record: &EntityRecord) {
        self.current = Arc::new(EntityDraft {
            fields: record.fields().clone(),
        });
        self.touched.clear();
        self.errors = None;
    }

    pub fn seed_blank(&mut self, descriptor: &EntityDescriptor) {
        let fields = descriptor
            .editable_fields()
            .map(|spec| (spec.name.to_owned(), spec.kind.blank_value()))
            .collect();
        self.current = Arc::new(EntityDraft { fields });
        self.touched.clear();
        self.errors = None;
    }

    pub fn set_field(&mut self, key: &str, value: Value) {
        let mut fields = self.current.fields.clone();
        fields.insert(key.to_owned(), value);
        self.current = Arc::new(EntityDraft { fields });
        self.touched.insert(key.to_owned());
        self.errors = None;
    }

    pub fn current(&self) -> Arc<EntityDraft> {
        Arc::clone(&self.current)
    }

    pub fn reset(&mut self) {
        self.current = Arc::default();
        self.touched.clear();
        self.errors = None;
    }

    pub fn is_touched(&self, key: &str) -> bool {
        self.touched.contains(key)
    }

    pub fn is_dirty(&self) -> bool {
        !self.touched.is_empty()
    }

    pub fn show_errors(&mut self, errors: MappedError) {
        self.errors = Some(errors);
    }

    pub fn errors(&self) -> Option<&MappedError> {
        self.errors.as_ref()
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.errors.as_ref().and_then(|errors| errors.field(key))
    }
}
