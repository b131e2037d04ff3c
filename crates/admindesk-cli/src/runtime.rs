// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{
    ColumnPreference, EditSubmissionController, EntityKind, FetchTicket, NotificationSink,
    PreferenceBackend, PreferenceKind, PreferenceStore, RecordId, RemoteService, SaveTicket,
    ServiceProvider, UserId,
};
use admindesk_tui::{AppRuntime, InternalEvent};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, warn};

/// Remote calls for the TUI. `spawn_*` run each request on its own thread
/// and post the result back, so the draw loop never blocks on the network.
pub struct ApiRuntime<P, B> {
    provider: P,
    prefs: PreferenceStore<B>,
    user: UserId,
    page_size: usize,
}

impl<P: ServiceProvider, B: PreferenceBackend> ApiRuntime<P, B> {
    pub fn new(provider: P, backend: B, user: UserId, page_size: usize) -> Self {
        Self {
            provider,
            prefs: PreferenceStore::new(backend),
            user,
            page_size,
        }
    }

    fn run_detached<F>(&self, what: &str, tx: Sender<InternalEvent>, job: F) -> Result<()>
    where
        F: FnOnce() -> InternalEvent + Send + 'static,
    {
        thread::Builder::new()
            .name(format!("admindesk-{what}"))
            .spawn(move || {
                if tx.send(job()).is_err() {
                    debug!("event loop gone; dropping remote result");
                }
            })
            .map(|_| ())
            .with_context(|| format!("spawn {what} worker"))
    }
}

impl<P: ServiceProvider, B: PreferenceBackend> AppRuntime for ApiRuntime<P, B> {
    type Provider = P;

    fn user(&self) -> UserId {
        self.user.clone()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn provider(&self) -> &P {
        &self.provider
    }

    fn load_preference(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference {
        self.prefs.load(user, entity, sink)
    }

    fn save_preference(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        kind: PreferenceKind,
        fields: Vec<String>,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference {
        self.prefs.save(user, entity, kind, fields, sink)
    }

    fn spawn_fetch(&mut self, ticket: FetchTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let service = self.provider.service(ticket.kind);
        self.run_detached("fetch", tx, move || {
            let result = service.find(&ticket.query);
            if let Err(failure) = &result {
                warn!(entity = ticket.kind.as_str(), error = %failure, "fetch failed");
            }
            InternalEvent::FetchFinished { ticket, result }
        })
    }

    fn spawn_save(&mut self, ticket: SaveTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let service = self.provider.service(ticket.kind);
        self.run_detached("save", tx, move || {
            let result = EditSubmissionController::execute(&service, &ticket.submission);
            InternalEvent::SaveFinished { ticket, result }
        })
    }

    fn spawn_delete(
        &mut self,
        kind: EntityKind,
        id: RecordId,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let service = self.provider.service(kind);
        self.run_detached("delete", tx, move || {
            let result = service.remove(&id);
            InternalEvent::DeleteFinished { kind, id, result }
        })
    }

    fn spawn_import(
        &mut self,
        kind: EntityKind,
        payloads: Vec<Map<String, Value>>,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let service = self.provider.service(kind);
        self.run_detached("import", tx, move || {
            let results = payloads
                .iter()
                .map(|payload| service.create(payload))
                .collect();
            InternalEvent::ImportFinished { kind, results }
        })
    }
}
