// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::display::search_text;
use crate::submit::outcome_for;
use crate::{
    ColumnPreference, DialogToken, EditSubmissionController, EntityDescriptor, EntityDraft,
    EntityDraftStore, EntityKind, EntityRecord, FieldSpec, FindPage, FindQuery, MappedError,
    Notification, NotificationSink, PageWindow, PendingSubmission, PreferenceBackend,
    PreferenceKind, PreferenceStore, RecordId, RemoteFailure, RemoteService, RowCollection,
    SortDirection, SubmissionOutcome, SubmitError, SubmitTarget, UPDATE_FAILED_MESSAGE, UserId,
    map_or_fallback,
};

pub const CREATE_FAILED_MESSAGE: &str = "Failed to create info";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete info";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogMode {
    Edit(RecordId),
    Create,
}

/// One open edit or create dialog: its draft and its submission gate.
#[derive(Debug, Clone)]
pub struct EditDialog {
    token: DialogToken,
    mode: DialogMode,
    drafts: EntityDraftStore,
    controller: EditSubmissionController,
}

impl EditDialog {
    pub fn token(&self) -> DialogToken {
        self.token
    }

    pub fn mode(&self) -> &DialogMode {
        &self.mode
    }

    pub fn draft(&self) -> Arc<EntityDraft> {
        self.drafts.current()
    }

    pub fn is_saving(&self) -> bool {
        self.controller.is_saving()
    }

    pub fn errors(&self) -> Option<&MappedError> {
        self.drafts.errors()
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.drafts.field_error(field)
    }

    pub fn is_touched(&self, field: &str) -> bool {
        self.drafts.is_touched(field)
    }
}

/// Everything needed to hand a save back to the session that started it.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    pub kind: EntityKind,
    pub dialog: DialogToken,
    pub submission: PendingSubmission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub kind: EntityKind,
    pub generation: u64,
    pub query: FindQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    PageLoaded { total: usize },
    RowReplaced(RecordId),
    RowInserted(RecordId),
    RowRemoved(RecordId),
    DialogClosed(DialogToken),
    DialogFailed(DialogToken),
}

/// List state for one entity kind: the current page of rows, paging and
/// sorting, column preferences, and at most one open dialog.
#[derive(Debug, Clone)]
pub struct ListSession {
    descriptor: &'static EntityDescriptor,
    user: UserId,
    rows: RowCollection,
    page: PageWindow,
    /// Window asked for by the fetch in progress; `page` only moves once it lands.
    requested: Option<PageWindow>,
    sort: Option<(String, SortDirection)>,
    column_filters: BTreeMap<String, String>,
    preference: ColumnPreference,
    dialog: Option<EditDialog>,
    next_token: u64,
    fetch_generation: u64,
    loading: bool,
}

impl ListSession {
    pub fn new(descriptor: &'static EntityDescriptor, user: UserId, page_size: usize) -> Self {
        Self {
            descriptor,
            user,
            rows: RowCollection::new(),
            page: PageWindow::first(page_size.max(1)),
            requested: None,
            sort: None,
            column_filters: BTreeMap::new(),
            preference: ColumnPreference::default(),
            dialog: None,
            next_token: 1,
            fetch_generation: 0,
            loading: false,
        }
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    pub fn kind(&self) -> EntityKind {
        self.descriptor.kind
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn rows(&self) -> &RowCollection {
        &self.rows
    }

    /// The window of the rows currently shown.
    pub fn page(&self) -> PageWindow {
        self.page
    }

    /// The window the next fetch asks for.
    pub fn requested_page(&self) -> PageWindow {
        self.requested.unwrap_or(self.page)
    }

    pub fn sort(&self) -> Option<&(String, SortDirection)> {
        self.sort.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn preference(&self) -> &ColumnPreference {
        &self.preference
    }

    pub fn dialog(&self) -> Option<&EditDialog> {
        self.dialog.as_ref()
    }

    pub fn query(&self) -> FindQuery {
        let window = self.requested_page();
        FindQuery {
            limit: window.limit,
            skip: window.skip,
            sort: self.sort.clone(),
        }
    }

    // Paging and sorting

    /// Starts a page fetch. Only the most recent ticket may land.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetch_generation += 1;
        self.loading = true;
        FetchTicket {
            kind: self.kind(),
            generation: self.fetch_generation,
            query: self.query(),
        }
    }

    pub fn complete_fetch(
        &mut self,
        ticket: &FetchTicket,
        result: Result<FindPage, RemoteFailure>,
        sink: &mut dyn NotificationSink,
    ) -> Vec<SessionEvent> {
        if ticket.generation != self.fetch_generation {
            debug!(
                service = self.descriptor.service,
                generation = ticket.generation,
                "dropping superseded page fetch"
            );
            return Vec::new();
        }
        self.loading = false;
        match result {
            Ok(page) => vec![self.load_page(page)],
            Err(failure) => {
                self.requested = None;
                warn!(service = self.descriptor.service, error = %failure, "page fetch failed");
                sink.alert(Notification::error(
                    format!("Load {}", self.descriptor.kind.label()),
                    map_or_fallback(&failure, LOAD_FAILED_MESSAGE).summary(),
                ));
                Vec::new()
            }
        }
    }

    pub fn load_page(&mut self, page: FindPage) -> SessionEvent {
        let limit = self.requested.take().map_or(self.page.limit, |window| window.limit);
        self.page = PageWindow {
            skip: page.skip,
            limit,
            total: page.total.max(page.skip + page.data.len()),
        };
        self.rows.replace_all(page.data);
        debug!(
            service = self.descriptor.service,
            rows = self.rows.len(),
            total = self.page.total,
            "page loaded"
        );
        SessionEvent::PageLoaded {
            total: self.page.total,
        }
    }

    pub fn fetch_page<S: RemoteService + ?Sized>(
        &mut self,
        service: &S,
        sink: &mut dyn NotificationSink,
    ) -> Vec<SessionEvent> {
        let ticket = self.begin_fetch();
        let result = service.find(&ticket.query);
        self.complete_fetch(&ticket, result, sink)
    }

    pub fn next_page(&mut self) -> bool {
        let window = self.requested_page();
        if !window.has_next() {
            return false;
        }
        self.requested = Some(window.next());
        true
    }

    pub fn prev_page(&mut self) -> bool {
        let window = self.requested_page();
        if !window.has_prev() {
            return false;
        }
        self.requested = Some(window.prev());
        true
    }

    pub fn set_page_size(&mut self, size: usize) -> bool {
        let window = self.requested_page();
        if size == 0 || size == window.limit {
            return false;
        }
        self.requested = Some(PageWindow {
            skip: 0,
            limit: size,
            total: window.total,
        });
        true
    }

    /// Ascending, then descending, then unsorted.
    pub fn toggle_sort(&mut self, field: &str) -> bool {
        if !self.descriptor.has_field(field) {
            return false;
        }
        self.sort = match self.sort.take() {
            Some((current, SortDirection::Asc)) if current == field => {
                Some((current, SortDirection::Desc))
            }
            Some((current, SortDirection::Desc)) if current == field => None,
            _ => Some((field.to_owned(), SortDirection::Asc)),
        };
        self.requested = Some(PageWindow {
            skip: 0,
            ..self.requested_page()
        });
        true
    }

    // Columns

    pub fn visible_columns(&self) -> Vec<&'static FieldSpec> {
        self.descriptor
            .schema()
            .filter(|spec| !self.preference.is_hidden(spec.name))
            .collect()
    }

    pub fn is_filterable(&self, field: &str) -> bool {
        self.preference.is_filterable(field)
    }

    pub fn column_filter(&self, field: &str) -> Option<&str> {
        self.column_filters.get(field).map(String::as_str)
    }

    pub fn set_column_filter(&mut self, field: &str, text: &str) -> bool {
        if !self.is_filterable(field) {
            return false;
        }
        let text = text.trim();
        if text.is_empty() {
            self.column_filters.remove(field);
        } else {
            self.column_filters
                .insert(field.to_owned(), text.to_lowercase());
        }
        true
    }

    pub fn clear_column_filters(&mut self) {
        self.column_filters.clear();
    }

    /// Rows on the current page that pass every column filter.
    pub fn visible_rows(&self) -> Vec<Arc<EntityRecord>> {
        self.rows
            .iter()
            .filter(|row| {
                self.column_filters
                    .iter()
                    .all(|(field, needle)| search_text(row.get(field)).contains(needle.as_str()))
            })
            .cloned()
            .collect()
    }

    pub fn apply_preference(&mut self, preference: ColumnPreference) {
        self.column_filters
            .retain(|field, _| preference.is_filterable(field));
        self.preference = preference;
    }

    pub fn load_preferences<B: PreferenceBackend>(
        &mut self,
        store: &mut PreferenceStore<B>,
        sink: &mut dyn NotificationSink,
    ) {
        let preference = store.load(&self.user, self.kind(), sink);
        self.apply_preference(preference);
    }

    pub fn save_preference<B: PreferenceBackend>(
        &mut self,
        store: &mut PreferenceStore<B>,
        kind: PreferenceKind,
        fields: impl IntoIterator<Item = String>,
        sink: &mut dyn NotificationSink,
    ) {
        let preference = store.save(&self.user, self.kind(), kind, fields, sink);
        self.apply_preference(preference);
    }

    // Dialogs

    pub fn open_editor(&mut self, id: &RecordId) -> Option<DialogToken> {
        let record = Arc::clone(self.rows.find(id)?);
        let mut drafts = EntityDraftStore::new();
        drafts.seed(&record);
        Some(self.open_dialog(DialogMode::Edit(id.clone()), drafts))
    }

    pub fn open_creator(&mut self) -> DialogToken {
        let mut drafts = EntityDraftStore::new();
        drafts.seed_blank(self.descriptor);
        self.open_dialog(DialogMode::Create, drafts)
    }

    fn open_dialog(&mut self, mode: DialogMode, drafts: EntityDraftStore) -> DialogToken {
        let token = DialogToken::new(self.next_token);
        self.next_token += 1;
        if let Some(previous) = self.dialog.take() {
            debug!(
                token = previous.token.get(),
                "replacing open dialog; its pending save will only touch the list"
            );
        }
        self.dialog = Some(EditDialog {
            token,
            mode,
            drafts,
            controller: EditSubmissionController::new(self.descriptor),
        });
        token
    }

    pub fn close_dialog(&mut self) -> Option<DialogToken> {
        self.dialog.take().map(|dialog| dialog.token)
    }

    /// Writes one draft field. Only editable fields are accepted.
    pub fn set_field(&mut self, key: &str, value: Value) -> bool {
        if !self.descriptor.is_editable(key) {
            return false;
        }
        let Some(dialog) = self.dialog.as_mut() else {
            return false;
        };
        dialog.drafts.set_field(key, value);
        true
    }

    // Saving

    pub fn begin_save(&mut self) -> Result<SaveTicket, SubmitError> {
        let kind = self.kind();
        let dialog = self.dialog.as_mut().ok_or(SubmitError::NoOpenDialog)?;
        let target = match &dialog.mode {
            DialogMode::Edit(id) => SubmitTarget::Update(id.clone()),
            DialogMode::Create => SubmitTarget::Create,
        };
        let draft = dialog.drafts.current();
        let submission = dialog.controller.begin(&draft, target)?;
        Ok(SaveTicket {
            kind,
            dialog: dialog.token,
            submission,
        })
    }

    /// Applies a finished save. The list is reconciled whether or not the
    /// dialog is still open; dialog state only changes if it is.
    pub fn complete_save(
        &mut self,
        ticket: SaveTicket,
        result: Result<EntityRecord, RemoteFailure>,
        sink: &mut dyn NotificationSink,
    ) -> Vec<SessionEvent> {
        let SaveTicket {
            dialog: token,
            submission,
            ..
        } = ticket;
        let mut events = Vec::new();

        let open = self
            .dialog
            .as_mut()
            .filter(|dialog| dialog.token == token);
        let dialog_open = open.is_some();
        let outcome = match open {
            Some(dialog) => match dialog.controller.finish(submission.request_id, result) {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(token = token.get(), %error, "ignoring save result");
                    return events;
                }
            },
            None => {
                debug!(
                    token = token.get(),
                    "dialog closed before its save resolved; updating list only"
                );
                outcome_for(submission.target, result)
            }
        };

        match outcome {
            SubmissionOutcome::Saved { target, record } => {
                sink.alert(self.saved_notification(&target));
                self.reconcile_saved(target, record, &mut events);
                if dialog_open {
                    self.dialog = None;
                    events.push(SessionEvent::DialogClosed(token));
                }
            }
            SubmissionOutcome::Failed { target, error } => {
                let (title, message) = match target {
                    SubmitTarget::Create => ("Create info", CREATE_FAILED_MESSAGE),
                    SubmitTarget::Update(_) => ("Edit info", UPDATE_FAILED_MESSAGE),
                };
                sink.alert(Notification::error(title, message));
                if let Some(dialog) = self.dialog.as_mut().filter(|dialog| dialog.token == token)
                {
                    dialog.drafts.show_errors(error);
                    events.push(SessionEvent::DialogFailed(token));
                }
            }
        }
        events
    }

    pub fn save<S: RemoteService + ?Sized>(
        &mut self,
        service: &S,
        sink: &mut dyn NotificationSink,
    ) -> Result<Vec<SessionEvent>, SubmitError> {
        let ticket = self.begin_save()?;
        let result = EditSubmissionController::execute(service, &ticket.submission);
        Ok(self.complete_save(ticket, result, sink))
    }

    fn saved_notification(&self, target: &SubmitTarget) -> Notification {
        match target {
            SubmitTarget::Create => Notification::success(
                "Create info",
                format!("Info {} created successfully", self.descriptor.service),
            ),
            SubmitTarget::Update(_) => Notification::success(
                "Edit info",
                format!("Info {} updated successfully", self.descriptor.service),
            ),
        }
    }

    fn reconcile_saved(
        &mut self,
        target: SubmitTarget,
        record: EntityRecord,
        events: &mut Vec<SessionEvent>,
    ) {
        match target {
            SubmitTarget::Update(id) => {
                if self.rows.replace(&id, record) {
                    events.push(SessionEvent::RowReplaced(id));
                }
            }
            SubmitTarget::Create => {
                if let Some(event) = self.apply_created(record) {
                    events.push(event);
                }
            }
        }
    }

    /// Puts a record the remote just created at the top of the page.
    pub fn apply_created(&mut self, record: EntityRecord) -> Option<SessionEvent> {
        let id = record.id();
        if self.rows.insert(record) {
            self.page.total += 1;
        }
        id.map(SessionEvent::RowInserted)
    }

    // Deleting

    pub fn complete_delete(
        &mut self,
        id: &RecordId,
        result: Result<EntityRecord, RemoteFailure>,
        sink: &mut dyn NotificationSink,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match result {
            Ok(_) => {
                if self.rows.remove(id) {
                    self.page.total = self.page.total.saturating_sub(1);
                    events.push(SessionEvent::RowRemoved(id.clone()));
                }
                let editing_removed = self
                    .dialog
                    .as_ref()
                    .is_some_and(|dialog| dialog.mode == DialogMode::Edit(id.clone()));
                if editing_removed && let Some(token) = self.close_dialog() {
                    events.push(SessionEvent::DialogClosed(token));
                }
                sink.alert(Notification::success(
                    "Delete info",
                    format!("Info {} deleted successfully", self.descriptor.service),
                ));
            }
            Err(failure) => {
                warn!(service = self.descriptor.service, %id, error = %failure, "delete failed");
                sink.alert(Notification::error(
                    "Delete info",
                    map_or_fallback(&failure, DELETE_FAILED_MESSAGE).summary(),
                ));
            }
        }
        events
    }

    // Importing

    pub fn complete_import(
        &mut self,
        results: Vec<Result<EntityRecord, RemoteFailure>>,
        sink: &mut dyn NotificationSink,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let mut failures = Vec::new();
        let mut created = 0;
        for result in results {
            match result {
                Ok(record) => {
                    created += 1;
                    events.extend(self.apply_created(record));
                }
                Err(failure) => failures.push(failure),
            }
        }
        if created > 0 {
            sink.alert(Notification::success(
                "Import info",
                format!("Imported {created} {}", self.descriptor.kind.label()),
            ));
        }
        if let Some(first) = failures.first() {
            sink.alert(Notification::error(
                "Import info",
                format!(
                    "{} rows failed; first error: {}",
                    failures.len(),
                    map_or_fallback(first, CREATE_FAILED_MESSAGE).summary()
                ),
            ));
        }
        events
    }
}
