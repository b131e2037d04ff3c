// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EntityKind, EntityRecord, RecordId, RemoteFailure, SortDirection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery {
    pub limit: usize,
    pub skip: usize,
    pub sort: Option<(String, SortDirection)>,
}

impl FindQuery {
    pub fn page(limit: usize, skip: usize) -> Self {
        Self {
            limit,
            skip,
            sort: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FindPage {
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
    pub data: Vec<EntityRecord>,
}

/// The remote collection one entity kind is bound to.
///
/// `create` and `patch` return the record as the remote stored it; callers
/// reconcile from that value, never from what they sent.
pub trait RemoteService {
    fn get(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure>;
    fn find(&self, query: &FindQuery) -> Result<FindPage, RemoteFailure>;
    fn create(&self, payload: &Map<String, Value>) -> Result<EntityRecord, RemoteFailure>;
    fn patch(
        &self,
        id: &RecordId,
        payload: &Map<String, Value>,
    ) -> Result<EntityRecord, RemoteFailure>;
    fn remove(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure>;
}

impl<S: RemoteService + ?Sized> RemoteService for &S {
    fn get(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        (**self).get(id)
    }

    fn find(&self, query: &FindQuery) -> Result<FindPage, RemoteFailure> {
        (**self).find(query)
    }

    fn create(&self, payload: &Map<String, Value>) -> Result<EntityRecord, RemoteFailure> {
        (**self).create(payload)
    }

    fn patch(
        &self,
        id: &RecordId,
        payload: &Map<String, Value>,
    ) -> Result<EntityRecord, RemoteFailure> {
        (**self).patch(id, payload)
    }

    fn remove(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        (**self).remove(id)
    }
}

/// Hands out a service handle per entity kind that can move onto a worker
/// thread.
pub trait ServiceProvider {
    type Service: RemoteService + Send + 'static;

    fn service(&self, kind: EntityKind) -> Self::Service;
}
