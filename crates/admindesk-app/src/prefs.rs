// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{EntityKind, Notification, NotificationSink, UserId};

pub const PREFERENCES_TITLE: &str = "Column preferences";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceKind {
    #[serde(rename = "filterFields")]
    FilterFields,
    #[serde(rename = "hideFields")]
    HideFields,
}

impl PreferenceKind {
    pub const ALL: [Self; 2] = [Self::FilterFields, Self::HideFields];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FilterFields => "filterFields",
            Self::HideFields => "hideFields",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "filterFields" => Some(Self::FilterFields),
            "hideFields" => Some(Self::HideFields),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreferenceKey {
    pub user: UserId,
    pub entity: EntityKind,
    pub kind: PreferenceKind,
}

impl PreferenceKey {
    pub fn new(user: &UserId, entity: EntityKind, kind: PreferenceKind) -> Self {
        Self {
            user: user.clone(),
            entity,
            kind,
        }
    }
}

/// Which columns one user can filter on and which they have hidden, for one
/// entity kind. The two sets are independent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnPreference {
    pub filter_fields: BTreeSet<String>,
    pub hide_fields: BTreeSet<String>,
}

impl ColumnPreference {
    pub fn fields(&self, kind: PreferenceKind) -> &BTreeSet<String> {
        match kind {
            PreferenceKind::FilterFields => &self.filter_fields,
            PreferenceKind::HideFields => &self.hide_fields,
        }
    }

    fn fields_mut(&mut self, kind: PreferenceKind) -> &mut BTreeSet<String> {
        match kind {
            PreferenceKind::FilterFields => &mut self.filter_fields,
            PreferenceKind::HideFields => &mut self.hide_fields,
        }
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hide_fields.contains(field)
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.filter_fields.contains(field)
    }
}

/// Durable storage for preference field lists.
pub trait PreferenceBackend {
    fn get(&self, key: &PreferenceKey) -> Result<Option<Vec<String>>>;
    fn set(&self, key: &PreferenceKey, fields: &[String]) -> Result<()>;
}

impl<B: PreferenceBackend + ?Sized> PreferenceBackend for &B {
    fn get(&self, key: &PreferenceKey) -> Result<Option<Vec<String>>> {
        (**self).get(key)
    }

    fn set(&self, key: &PreferenceKey, fields: &[String]) -> Result<()> {
        (**self).set(key, fields)
    }
}

/// Cached view over a [`PreferenceBackend`]. Never fails: backend trouble
/// turns into a notification and the list keeps rendering.
#[derive(Debug)]
pub struct PreferenceStore<B> {
    backend: B,
    cache: HashMap<(UserId, EntityKind), ColumnPreference>,
}

impl<B: PreferenceBackend> PreferenceStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cached(&self, user: &UserId, entity: EntityKind) -> Option<&ColumnPreference> {
        self.cache.get(&(user.clone(), entity))
    }

    pub fn load(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference {
        let fallback = self.cached(user, entity).cloned().unwrap_or_default();
        let mut loaded = ColumnPreference::default();
        let mut failed = false;

        for kind in PreferenceKind::ALL {
            let key = PreferenceKey::new(user, entity, kind);
            match self.backend.get(&key) {
                Ok(Some(fields)) => {
                    *loaded.fields_mut(kind) = known_fields(entity, fields);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        user = %user,
                        entity = entity.as_str(),
                        kind = kind.as_str(),
                        error = %format!("{error:#}"),
                        "preference load failed; using last known value"
                    );
                    *loaded.fields_mut(kind) = fallback.fields(kind).clone();
                    failed = true;
                }
            }
        }

        if failed {
            sink.alert(Notification::warning(
                PREFERENCES_TITLE,
                format!(
                    "Could not load saved columns for {}; showing defaults",
                    entity.label()
                ),
            ));
        }
        self.cache.insert((user.clone(), entity), loaded.clone());
        loaded
    }

    /// Replaces one of the two sets. The cache changes before the write and
    /// stays changed if the write fails.
    pub fn save(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        kind: PreferenceKind,
        fields: impl IntoIterator<Item = String>,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference {
        let fields = known_fields(entity, fields);
        let entry = self.cache.entry((user.clone(), entity)).or_default();
        *entry.fields_mut(kind) = fields.clone();
        let updated = entry.clone();

        let key = PreferenceKey::new(user, entity, kind);
        let fields: Vec<String> = fields.into_iter().collect();
        match self.backend.set(&key, &fields) {
            Ok(()) => debug!(
                user = %user,
                entity = entity.as_str(),
                kind = kind.as_str(),
                count = fields.len(),
                "preference saved"
            ),
            Err(error) => {
                warn!(
                    user = %user,
                    entity = entity.as_str(),
                    kind = kind.as_str(),
                    error = %format!("{error:#}"),
                    "preference save failed"
                );
                sink.alert(Notification::error(
                    PREFERENCES_TITLE,
                    format!("Failed to save column preferences: {error}"),
                ));
            }
        }
        updated
    }
}

fn known_fields(entity: EntityKind, fields: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    let descriptor = entity.descriptor();
    fields
        .into_iter()
        .filter(|field| descriptor.has_field(field))
        .collect()
}
