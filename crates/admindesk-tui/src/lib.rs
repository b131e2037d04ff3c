// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::csv::{default_export_name, export_csv, records_from_csv};
use admindesk_app::display::{cell_text, input_text, value_from_input};
use admindesk_app::{
    AlertLevel, AppCommand, AppEvent, AppMode, AppState, ColumnPreference, DEFAULT_PAGE_SIZE,
    DialogKind, DialogMode, DialogToken, EditSubmissionController, EntityKind, EntityRecord,
    FetchTicket, FieldKind, FieldSpec, FindPage, ListSession, MappedError, Notification,
    NotificationSink, PAGE_SIZE_OPTIONS, PreferenceKind, RecordId, RemoteFailure, RemoteService,
    SaveTicket, ServiceProvider, SessionEvent, SortDirection, SubmitError, UserId,
};
use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

const FILTER_MARK_ACTIVE: &str = "▼";
const SORT_MARK_ASC: &str = "↑";
const SORT_MARK_DESC: &str = "↓";
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);

/// Everything the event loop needs from the outside world. The blocking
/// calls run on whatever thread the `spawn_*` methods choose; the defaults
/// run inline and post the result straight back.
pub trait AppRuntime {
    type Provider: ServiceProvider;

    fn user(&self) -> UserId;
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }
    /// Source of the per-kind remote services.
    fn provider(&self) -> &Self::Provider;
    fn load_preference(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference;
    fn save_preference(
        &mut self,
        user: &UserId,
        entity: EntityKind,
        kind: PreferenceKind,
        fields: Vec<String>,
        sink: &mut dyn NotificationSink,
    ) -> ColumnPreference;

    fn spawn_fetch(&mut self, ticket: FetchTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let result = self.provider().service(ticket.kind).find(&ticket.query);
        send(&tx, InternalEvent::FetchFinished { ticket, result })
    }

    fn spawn_save(&mut self, ticket: SaveTicket, tx: Sender<InternalEvent>) -> Result<()> {
        let service = self.provider().service(ticket.kind);
        let result = EditSubmissionController::execute(&service, &ticket.submission);
        send(&tx, InternalEvent::SaveFinished { ticket, result })
    }

    fn spawn_delete(
        &mut self,
        kind: EntityKind,
        id: RecordId,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self.provider().service(kind).remove(&id);
        send(&tx, InternalEvent::DeleteFinished { kind, id, result })
    }

    fn spawn_import(
        &mut self,
        kind: EntityKind,
        payloads: Vec<Map<String, Value>>,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let service = self.provider().service(kind);
        let results = payloads
            .iter()
            .map(|payload| service.create(payload))
            .collect();
        send(&tx, InternalEvent::ImportFinished { kind, results })
    }
}

pub fn send(tx: &Sender<InternalEvent>, event: InternalEvent) -> Result<()> {
    tx.send(event)
        .map_err(|_| anyhow!("runtime event channel closed"))
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    FetchFinished {
        ticket: FetchTicket,
        result: Result<FindPage, RemoteFailure>,
    },
    SaveFinished {
        ticket: SaveTicket,
        result: Result<EntityRecord, RemoteFailure>,
    },
    DeleteFinished {
        kind: EntityKind,
        id: RecordId,
        result: Result<EntityRecord, RemoteFailure>,
    },
    ImportFinished {
        kind: EntityKind,
        results: Vec<Result<EntityRecord, RemoteFailure>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TableUiState {
    selected_row: usize,
    selected_col: usize,
}

#[derive(Debug, Clone)]
struct TabView {
    session: ListSession,
    table: TableUiState,
    loaded: bool,
}

impl TabView {
    fn new(kind: EntityKind, user: &UserId, page_size: usize) -> Self {
        Self {
            session: ListSession::new(kind.descriptor(), user.clone(), page_size),
            table: TableUiState::default(),
            loaded: false,
        }
    }

    fn selected_record(&self) -> Option<RecordId> {
        self.session
            .visible_rows()
            .get(self.table.selected_row)
            .and_then(|row| row.id())
    }

    fn selected_column(&self) -> Option<&'static FieldSpec> {
        self.session
            .visible_columns()
            .get(self.table.selected_col)
            .copied()
    }

    fn clamp_cursor(&mut self) {
        let rows = self.session.visible_rows().len();
        let columns = self.session.visible_columns().len();
        self.table.selected_row = self.table.selected_row.min(rows.saturating_sub(1));
        self.table.selected_col = self.table.selected_col.min(columns.saturating_sub(1));
    }
}

#[derive(Debug, Clone)]
struct TabViews {
    roles: TabView,
    service_settings: TabView,
}

impl TabViews {
    fn new(user: &UserId, page_size: usize) -> Self {
        Self {
            roles: TabView::new(EntityKind::Roles, user, page_size),
            service_settings: TabView::new(EntityKind::ServiceSettings, user, page_size),
        }
    }

    fn get(&self, kind: EntityKind) -> &TabView {
        match kind {
            EntityKind::Roles => &self.roles,
            EntityKind::ServiceSettings => &self.service_settings,
        }
    }

    fn get_mut(&mut self, kind: EntityKind) -> &mut TabView {
        match kind {
            EntityKind::Roles => &mut self.roles,
            EntityKind::ServiceSettings => &mut self.service_settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    token: DialogToken,
    field_index: usize,
    input: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PickerUiState {
    kind: PreferenceKind,
    cursor: usize,
    chosen: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PromptPurpose {
    ColumnFilter(&'static FieldSpec),
    Export,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PromptUiState {
    purpose: PromptPurpose,
    input: String,
}

#[derive(Debug, Clone)]
struct ViewData {
    tabs: TabViews,
    form: Option<FormUiState>,
    picker: Option<PickerUiState>,
    prompt: Option<PromptUiState>,
    pending_delete: Option<RecordId>,
    help_visible: bool,
    status_token: u64,
    now: OffsetDateTime,
}

impl ViewData {
    fn new(user: &UserId, page_size: usize) -> Self {
        Self {
            tabs: TabViews::new(user, page_size),
            form: None,
            picker: None,
            prompt: None,
            pending_delete: None,
            help_visible: false,
            status_token: 0,
            now: OffsetDateTime::now_utc(),
        }
    }

    fn active(&self, state: &AppState) -> &TabView {
        self.tabs.get(state.active_tab)
    }

    fn active_mut(&mut self, state: &AppState) -> &mut TabView {
        self.tabs.get_mut(state.active_tab)
    }
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let user = runtime.user();
    let mut view_data = ViewData::new(&user, runtime.page_size());
    let (internal_tx, internal_rx) = mpsc::channel();
    activate_tab(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);
        view_data.now = OffsetDateTime::now_utc();

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        handle_internal_event(state, view_data, tx, event);
    }
}

fn handle_internal_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: InternalEvent,
) {
    let mut sink: Vec<Notification> = Vec::new();
    match event {
        InternalEvent::ClearStatus { token } => {
            if token == view_data.status_token {
                state.dispatch(AppCommand::ClearStatus);
            }
            return;
        }
        InternalEvent::FetchFinished { ticket, result } => {
            let tab = view_data.tabs.get_mut(ticket.kind);
            tab.session.complete_fetch(&ticket, result, &mut sink);
            tab.clamp_cursor();
        }
        InternalEvent::SaveFinished { ticket, result } => {
            let kind = ticket.kind;
            let events = view_data
                .tabs
                .get_mut(kind)
                .session
                .complete_save(ticket, result, &mut sink);
            apply_session_events(state, view_data, kind, &events);
        }
        InternalEvent::DeleteFinished { kind, id, result } => {
            let events = view_data
                .tabs
                .get_mut(kind)
                .session
                .complete_delete(&id, result, &mut sink);
            apply_session_events(state, view_data, kind, &events);
        }
        InternalEvent::ImportFinished { kind, results } => {
            let events = view_data
                .tabs
                .get_mut(kind)
                .session
                .complete_import(results, &mut sink);
            apply_session_events(state, view_data, kind, &events);
        }
    }
    publish(state, view_data, tx, sink);
}

fn apply_session_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    kind: EntityKind,
    events: &[SessionEvent],
) {
    for event in events {
        match event {
            SessionEvent::DialogClosed(token) => {
                if view_data.form.as_ref().is_some_and(|form| form.token == *token) {
                    view_data.form = None;
                    if matches!(
                        state.mode,
                        AppMode::Dialog(DialogKind::Edit | DialogKind::Create)
                    ) {
                        state.dispatch(AppCommand::CloseDialog);
                    }
                }
            }
            SessionEvent::DialogFailed(token) => {
                debug!(token = token.get(), "save rejected; dialog stays open");
            }
            SessionEvent::RowInserted(_) => {
                if state.active_tab == kind {
                    view_data.tabs.get_mut(kind).table.selected_row = 0;
                }
            }
            SessionEvent::PageLoaded { .. }
            | SessionEvent::RowReplaced(_)
            | SessionEvent::RowRemoved(_) => {}
        }
    }
    view_data.tabs.get_mut(kind).clamp_cursor();
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn bump_status(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::Info(message.into()));
    bump_status(view_data, internal_tx);
}

/// Every notification reaches the status line; the last one stays visible.
fn publish(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    notifications: Vec<Notification>,
) {
    if notifications.is_empty() {
        return;
    }
    for notification in notifications {
        if notification.level == AlertLevel::Error {
            warn!(title = %notification.title, message = %notification.message, "notification");
        }
        state.dispatch(AppCommand::Notify(notification));
    }
    bump_status(view_data, internal_tx);
}

fn activate_tab<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let kind = state.active_tab;
    let tab = view_data.tabs.get_mut(kind);
    if tab.loaded {
        return;
    }
    tab.loaded = true;

    let mut sink: Vec<Notification> = Vec::new();
    let user = tab.session.user().clone();
    let preference = runtime.load_preference(&user, kind, &mut sink);
    tab.session.apply_preference(preference);
    publish(state, view_data, internal_tx, sink);
    start_fetch(state, runtime, view_data, internal_tx, kind);
}

fn start_fetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    kind: EntityKind,
) {
    let ticket = view_data.tabs.get_mut(kind).session.begin_fetch();
    if let Err(error) = runtime.spawn_fetch(ticket.clone(), internal_tx.clone()) {
        let mut sink: Vec<Notification> = Vec::new();
        view_data.tabs.get_mut(kind).session.complete_fetch(
            &ticket,
            Err(RemoteFailure::transport(format!("{error:#}"))),
            &mut sink,
        );
        publish(state, view_data, internal_tx, sink);
    }
}

fn dispatch_and_activate<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::TabChanged(_)))
    {
        view_data.pending_delete = None;
        activate_tab(state, runtime, view_data, internal_tx);
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.prompt.is_some() {
        handle_prompt_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.picker.is_some() {
        handle_picker_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.form.is_some() {
        handle_form_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.pending_delete.is_some() {
        handle_delete_confirm_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    handle_table_key(state, runtime, view_data, internal_tx, key);
    false
}

fn handle_table_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let kind = state.active_tab;
    match (key.code, key.modifiers) {
        (KeyCode::Char('f'), KeyModifiers::NONE) => {
            dispatch_and_activate(state, runtime, view_data, AppCommand::NextTab, internal_tx);
        }
        (KeyCode::Char('b'), KeyModifiers::NONE) => {
            dispatch_and_activate(state, runtime, view_data, AppCommand::PrevTab, internal_tx);
        }
        (KeyCode::Char('j') | KeyCode::Down, _) => move_row(view_data.active_mut(state), 1),
        (KeyCode::Char('k') | KeyCode::Up, _) => move_row(view_data.active_mut(state), -1),
        (KeyCode::Char('l') | KeyCode::Right, _) => move_col(view_data.active_mut(state), 1),
        (KeyCode::Char('h') | KeyCode::Left, _) => move_col(view_data.active_mut(state), -1),
        (KeyCode::Char('g'), KeyModifiers::NONE) => {
            view_data.active_mut(state).table.selected_row = 0;
        }
        (KeyCode::Char('G'), _) => {
            let tab = view_data.active_mut(state);
            tab.table.selected_row = tab.session.visible_rows().len().saturating_sub(1);
        }
        (KeyCode::Char(']'), _) => {
            if view_data.active_mut(state).session.next_page() {
                start_fetch(state, runtime, view_data, internal_tx, kind);
            } else {
                emit_status(state, view_data, internal_tx, "already on the last page");
            }
        }
        (KeyCode::Char('['), _) => {
            if view_data.active_mut(state).session.prev_page() {
                start_fetch(state, runtime, view_data, internal_tx, kind);
            } else {
                emit_status(state, view_data, internal_tx, "already on the first page");
            }
        }
        (KeyCode::Char('z'), KeyModifiers::NONE) => {
            let session = &mut view_data.active_mut(state).session;
            let size = next_page_size(session.requested_page().limit);
            session.set_page_size(size);
            start_fetch(state, runtime, view_data, internal_tx, kind);
            emit_status(state, view_data, internal_tx, format!("rows per page: {size}"));
        }
        (KeyCode::Char('s'), KeyModifiers::NONE) => {
            let tab = view_data.active_mut(state);
            let Some(spec) = tab.selected_column() else {
                return;
            };
            tab.session.toggle_sort(spec.name);
            let message = match tab.session.sort() {
                Some((_, SortDirection::Asc)) => format!("sort: {} ascending", spec.label),
                Some((_, SortDirection::Desc)) => format!("sort: {} descending", spec.label),
                None => "sort cleared".to_owned(),
            };
            start_fetch(state, runtime, view_data, internal_tx, kind);
            emit_status(state, view_data, internal_tx, message);
        }
        (KeyCode::Char('r'), KeyModifiers::NONE) => {
            start_fetch(state, runtime, view_data, internal_tx, kind);
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) | (KeyCode::Enter, _) => {
            let tab = view_data.active_mut(state);
            let Some(id) = tab.selected_record() else {
                emit_status(state, view_data, internal_tx, "no row selected");
                return;
            };
            match tab.session.open_editor(&id) {
                Some(token) => open_form(state, view_data, token, DialogKind::Edit),
                None => emit_status(
                    state,
                    view_data,
                    internal_tx,
                    format!("row {id} is no longer on this page; press r to reload"),
                ),
            }
        }
        (KeyCode::Char('a'), KeyModifiers::NONE) => {
            let token = view_data.active_mut(state).session.open_creator();
            open_form(state, view_data, token, DialogKind::Create);
        }
        (KeyCode::Char('d'), KeyModifiers::NONE) => {
            let Some(id) = view_data.active(state).selected_record() else {
                emit_status(state, view_data, internal_tx, "no row selected");
                return;
            };
            view_data.pending_delete = Some(id.clone());
            state.dispatch(AppCommand::OpenDialog(DialogKind::ConfirmDelete));
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("delete {id}? press y to confirm"),
            );
        }
        (KeyCode::Char('F'), _) => open_picker(state, view_data, PreferenceKind::FilterFields),
        (KeyCode::Char('H'), _) => open_picker(state, view_data, PreferenceKind::HideFields),
        (KeyCode::Char('/'), _) => {
            let tab = view_data.active(state);
            let Some(spec) = tab.selected_column() else {
                return;
            };
            if !tab.session.is_filterable(spec.name) {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    format!("{} is not filterable; add it with F", spec.label),
                );
                return;
            }
            let input = tab.session.column_filter(spec.name).unwrap_or_default().to_owned();
            open_prompt(state, view_data, PromptPurpose::ColumnFilter(spec), input);
        }
        (KeyCode::Char('n'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            let tab = view_data.active_mut(state);
            tab.session.clear_column_filters();
            tab.clamp_cursor();
            emit_status(state, view_data, internal_tx, "column filters cleared");
        }
        (KeyCode::Char('x'), KeyModifiers::NONE) => {
            let name = default_export_name(view_data.active(state).session.descriptor());
            open_prompt(state, view_data, PromptPurpose::Export, name);
        }
        (KeyCode::Char('i'), KeyModifiers::NONE) => {
            open_prompt(state, view_data, PromptPurpose::Import, String::new());
        }
        (KeyCode::Char('?'), _) => view_data.help_visible = true,
        _ => {}
    }
}

fn move_row(tab: &mut TabView, delta: isize) {
    let rows = tab.session.visible_rows().len();
    tab.table.selected_row = step(tab.table.selected_row, delta, rows);
}

fn move_col(tab: &mut TabView, delta: isize) {
    let columns = tab.session.visible_columns().len();
    tab.table.selected_col = step(tab.table.selected_col, delta, columns);
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    current.saturating_add_signed(delta).min(len - 1)
}

fn next_page_size(current: usize) -> usize {
    PAGE_SIZE_OPTIONS
        .iter()
        .copied()
        .find(|size| *size > current)
        .unwrap_or(PAGE_SIZE_OPTIONS[0])
}

fn editable_fields(view_data: &ViewData, state: &AppState) -> Vec<&'static FieldSpec> {
    view_data
        .active(state)
        .session
        .descriptor()
        .editable_fields()
        .collect()
}

fn open_form(state: &mut AppState, view_data: &mut ViewData, token: DialogToken, kind: DialogKind) {
    view_data.form = Some(FormUiState {
        token,
        field_index: 0,
        input: String::new(),
    });
    load_form_input(state, view_data);
    state.dispatch(AppCommand::OpenDialog(kind));
}

/// Refills the text buffer from the draft value of the focused field.
fn load_form_input(state: &AppState, view_data: &mut ViewData) {
    let fields = editable_fields(view_data, state);
    let draft = view_data
        .active(state)
        .session
        .dialog()
        .map(|dialog| dialog.draft());
    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    let Some(spec) = fields.get(form.field_index) else {
        return;
    };
    form.input = draft
        .as_ref()
        .map(|draft| input_text(draft.get(spec.name)))
        .unwrap_or_default();
}

fn close_form(state: &mut AppState, view_data: &mut ViewData) {
    view_data.active_mut(state).session.close_dialog();
    view_data.form = None;
    state.dispatch(AppCommand::CloseDialog);
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let fields = editable_fields(view_data, state);
    let saving = view_data
        .active(state)
        .session
        .dialog()
        .is_some_and(|dialog| dialog.is_saving());

    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            close_form(state, view_data);
            return;
        }
        (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            submit_form(state, runtime, view_data, internal_tx);
            return;
        }
        (KeyCode::Enter, _) => {
            submit_form(state, runtime, view_data, internal_tx);
            return;
        }
        (KeyCode::Tab | KeyCode::Down, _) => {
            if let Some(form) = view_data.form.as_mut() {
                form.field_index = (form.field_index + 1) % fields.len().max(1);
            }
            load_form_input(state, view_data);
            return;
        }
        (KeyCode::BackTab | KeyCode::Up, _) => {
            if let Some(form) = view_data.form.as_mut() {
                let len = fields.len().max(1);
                form.field_index = (form.field_index + len - 1) % len;
            }
            load_form_input(state, view_data);
            return;
        }
        _ => {}
    }

    if saving {
        emit_status(state, view_data, internal_tx, "save in progress");
        return;
    }

    let Some(form) = view_data.form.as_mut() else {
        return;
    };
    let Some(spec) = fields.get(form.field_index).copied() else {
        return;
    };

    let input = match (spec.kind, key.code) {
        (FieldKind::Bool, KeyCode::Char(' ')) => {
            let current = value_from_input(FieldKind::Bool, &form.input)
                .ok()
                .and_then(|value| value.as_bool())
                .unwrap_or(false);
            (!current).to_string()
        }
        (FieldKind::Bool, KeyCode::Char(choice @ ('y' | 'n'))) => choice.to_string(),
        (FieldKind::Bool, _) => return,
        (_, KeyCode::Char(ch)) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let mut next = form.input.clone();
            next.push(ch);
            next
        }
        (_, KeyCode::Backspace) => {
            let mut next = form.input.clone();
            next.pop();
            next
        }
        _ => return,
    };

    match value_from_input(spec.kind, &input) {
        Ok(value) => {
            form.input = match &value {
                Value::Bool(flag) => flag.to_string(),
                _ => input,
            };
            view_data.active_mut(state).session.set_field(spec.name, value);
        }
        Err(error) => emit_status(state, view_data, internal_tx, format!("{error:#}")),
    }
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let tab = view_data.active_mut(state);
    let label = tab.session.descriptor().kind.label();
    match tab.session.begin_save() {
        Ok(ticket) => {
            emit_status(state, view_data, internal_tx, format!("saving {label}…"));
            if let Err(error) = runtime.spawn_save(ticket.clone(), internal_tx.clone()) {
                let mut sink: Vec<Notification> = Vec::new();
                let kind = ticket.kind;
                let events = view_data.tabs.get_mut(kind).session.complete_save(
                    ticket,
                    Err(RemoteFailure::transport(format!("{error:#}"))),
                    &mut sink,
                );
                apply_session_events(state, view_data, kind, &events);
                publish(state, view_data, internal_tx, sink);
            }
        }
        Err(SubmitError::InFlight) => {
            emit_status(state, view_data, internal_tx, "save already in progress");
        }
        Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
    }
}

fn handle_delete_confirm_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(id) = view_data.pending_delete.take() else {
        return;
    };
    state.dispatch(AppCommand::CloseDialog);
    if key.code != KeyCode::Char('y') {
        emit_status(state, view_data, internal_tx, "delete canceled");
        return;
    }
    let kind = state.active_tab;
    if let Err(error) = runtime.spawn_delete(kind, id.clone(), internal_tx.clone()) {
        let mut sink: Vec<Notification> = Vec::new();
        let events = view_data.tabs.get_mut(kind).session.complete_delete(
            &id,
            Err(RemoteFailure::transport(format!("{error:#}"))),
            &mut sink,
        );
        apply_session_events(state, view_data, kind, &events);
        publish(state, view_data, internal_tx, sink);
    }
}

fn open_picker(state: &mut AppState, view_data: &mut ViewData, kind: PreferenceKind) {
    let chosen = view_data
        .active(state)
        .session
        .preference()
        .fields(kind)
        .clone();
    view_data.picker = Some(PickerUiState {
        kind,
        cursor: 0,
        chosen,
    });
    let dialog = match kind {
        PreferenceKind::FilterFields => DialogKind::FilterFields,
        PreferenceKind::HideFields => DialogKind::HideFields,
    };
    state.dispatch(AppCommand::OpenDialog(dialog));
}

fn handle_picker_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let schema: Vec<&'static FieldSpec> = view_data
        .active(state)
        .session
        .descriptor()
        .schema()
        .collect();
    let Some(picker) = view_data.picker.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc => {
            view_data.picker = None;
            state.dispatch(AppCommand::CloseDialog);
        }
        KeyCode::Char('j') | KeyCode::Down => {
            picker.cursor = step(picker.cursor, 1, schema.len());
        }
        KeyCode::Char('k') | KeyCode::Up => {
            picker.cursor = step(picker.cursor, -1, schema.len());
        }
        KeyCode::Char(' ') => {
            if let Some(spec) = schema.get(picker.cursor)
                && !picker.chosen.remove(spec.name)
            {
                picker.chosen.insert(spec.name.to_owned());
            }
        }
        KeyCode::Enter => {
            let kind = picker.kind;
            let fields: Vec<String> = picker.chosen.iter().cloned().collect();
            view_data.picker = None;
            state.dispatch(AppCommand::CloseDialog);

            let entity = state.active_tab;
            let user = view_data.active(state).session.user().clone();
            let mut sink: Vec<Notification> = Vec::new();
            let preference = runtime.save_preference(&user, entity, kind, fields, &mut sink);
            let tab = view_data.active_mut(state);
            tab.session.apply_preference(preference);
            tab.clamp_cursor();
            if sink.is_empty() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    format!("saved {} columns for {}", picker_noun(kind), entity.label()),
                );
            } else {
                publish(state, view_data, internal_tx, sink);
            }
        }
        _ => {}
    }
}

fn picker_noun(kind: PreferenceKind) -> &'static str {
    match kind {
        PreferenceKind::FilterFields => "filterable",
        PreferenceKind::HideFields => "hidden",
    }
}

fn open_prompt(
    state: &mut AppState,
    view_data: &mut ViewData,
    purpose: PromptPurpose,
    input: String,
) {
    let dialog = match purpose {
        PromptPurpose::ColumnFilter(_) => DialogKind::ColumnFilter,
        PromptPurpose::Export => DialogKind::Export,
        PromptPurpose::Import => DialogKind::Import,
    };
    view_data.prompt = Some(PromptUiState { purpose, input });
    state.dispatch(AppCommand::OpenDialog(dialog));
}

fn handle_prompt_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(prompt) = view_data.prompt.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Esc => {
            view_data.prompt = None;
            state.dispatch(AppCommand::CloseDialog);
        }
        KeyCode::Backspace => {
            prompt.input.pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            prompt.input.push(ch);
        }
        KeyCode::Enter => {
            let Some(prompt) = view_data.prompt.take() else {
                return;
            };
            state.dispatch(AppCommand::CloseDialog);
            let message = match prompt.purpose {
                PromptPurpose::ColumnFilter(spec) => {
                    apply_column_filter(state, view_data, spec, &prompt.input)
                }
                PromptPurpose::Export => export_rows(state, view_data, &prompt.input)
                    .unwrap_or_else(|error| format!("export failed: {error:#}")),
                PromptPurpose::Import => {
                    import_rows(state, runtime, view_data, internal_tx, &prompt.input)
                        .unwrap_or_else(|error| format!("import failed: {error:#}"))
                }
            };
            emit_status(state, view_data, internal_tx, message);
        }
        _ => {}
    }
}

fn apply_column_filter(
    state: &AppState,
    view_data: &mut ViewData,
    spec: &'static FieldSpec,
    input: &str,
) -> String {
    let tab = view_data.active_mut(state);
    tab.session.set_column_filter(spec.name, input);
    tab.clamp_cursor();
    match tab.session.column_filter(spec.name) {
        Some(needle) => format!("{} contains {needle:?}", spec.label),
        None => format!("{} filter cleared", spec.label),
    }
}

fn export_rows(state: &AppState, view_data: &ViewData, input: &str) -> Result<String> {
    let path = prompt_path(input)?;
    let session = &view_data.active(state).session;
    let rows = session.visible_rows();
    let columns = session.visible_columns();
    let file = fs::File::create(&path)
        .with_context(|| format!("create {}; pick a writable path", path.display()))?;
    export_csv(&rows, &columns, BufWriter::new(file))
        .with_context(|| format!("write {}", path.display()))?;
    Ok(format!("exported {} rows to {}", rows.len(), path.display()))
}

fn import_rows<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &ViewData,
    internal_tx: &Sender<InternalEvent>,
    input: &str,
) -> Result<String> {
    let path = prompt_path(input)?;
    let text = fs::read_to_string(&path)
        .with_context(|| format!("read {}; check the path and permissions", path.display()))?;
    let descriptor = view_data.active(state).session.descriptor();
    let payloads = records_from_csv(descriptor, &text)
        .with_context(|| format!("parse {}", path.display()))?;
    if payloads.is_empty() {
        return Ok(format!("{} has no rows to import", path.display()));
    }
    let count = payloads.len();
    runtime.spawn_import(descriptor.kind, payloads, internal_tx.clone())?;
    Ok(format!("importing {count} {}…", descriptor.kind.label()))
}

fn prompt_path(input: &str) -> Result<PathBuf> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("file path must not be empty"));
    }
    Ok(PathBuf::from(trimmed))
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let selected = EntityKind::ALL
        .iter()
        .position(|kind| *kind == state.active_tab)
        .unwrap_or(0);
    let tab_titles = EntityKind::ALL
        .iter()
        .map(|kind| tab_title(view_data.tabs.get(*kind)))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().title("admindesk").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_table(frame, layout[1], view_data.active(state), view_data.now);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(status_style(state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status_widget, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(70, 60, frame.area());
        frame.render_widget(Clear, area);
        let tab = view_data.active(state);
        let title = match tab.session.dialog().map(|dialog| dialog.mode()) {
            Some(DialogMode::Create) => format!("new {}", tab.session.descriptor().title),
            _ => format!("edit {}", tab.session.descriptor().title),
        };
        let body = Paragraph::new(render_form_text(tab, form))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    if let Some(picker) = &view_data.picker {
        let area = centered_rect(50, 60, frame.area());
        frame.render_widget(Clear, area);
        let title = match picker.kind {
            PreferenceKind::FilterFields => "filterable columns",
            PreferenceKind::HideFields => "hidden columns",
        };
        let body = Paragraph::new(render_picker_text(view_data.active(state), picker))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(body, area);
    }

    if let Some(prompt) = &view_data.prompt {
        let area = centered_rect(60, 20, frame.area());
        frame.render_widget(Clear, area);
        let body = Paragraph::new(format!("{}_", prompt.input)).block(
            Block::default()
                .title(prompt_title(&prompt.purpose))
                .borders(Borders::ALL),
        );
        frame.render_widget(body, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 60, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, tab: &TabView, now: OffsetDateTime) {
    let columns = tab.session.visible_columns();
    let widths = vec![Constraint::Min(8); columns.len().max(1)];

    let header = Row::new(columns.iter().map(|spec| {
        Cell::from(header_label(&tab.session, spec)).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = tab
        .session
        .visible_rows()
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            let selected_row = row_index == tab.table.selected_row;
            let cells = columns
                .iter()
                .enumerate()
                .map(|(column_index, spec)| {
                    let mut style = Style::default();
                    if !spec.editable {
                        style = style.fg(Color::Gray);
                    }
                    if selected_row {
                        style = style.bg(Color::DarkGray);
                    }
                    if selected_row && column_index == tab.table.selected_col {
                        style = Style::default()
                            .fg(Color::Black)
                            .bg(Color::Cyan)
                            .add_modifier(Modifier::BOLD);
                    }
                    Cell::from(cell_text(row.get(spec.name), spec.kind, now)).style(style)
                })
                .collect::<Vec<_>>();
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(tab))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn tab_title(tab: &TabView) -> String {
    let title = tab.session.descriptor().title;
    if tab.session.is_loading() {
        format!("{title} …")
    } else {
        title.to_owned()
    }
}

fn table_title(tab: &TabView) -> String {
    let shown = tab.session.rows().len();
    let filtered = tab.session.visible_rows().len();
    let mut title = format!(
        "{} | {} | {} per page",
        tab.session.descriptor().title,
        tab.session.page().report(shown),
        tab.session.page().limit
    );
    if filtered != shown {
        title.push_str(&format!(" | {filtered} match"));
    }
    title
}

fn header_label(session: &ListSession, spec: &FieldSpec) -> String {
    let mut label = spec.label.to_owned();
    if let Some((field, direction)) = session.sort()
        && field == spec.name
    {
        label.push(' ');
        label.push_str(match direction {
            SortDirection::Asc => SORT_MARK_ASC,
            SortDirection::Desc => SORT_MARK_DESC,
        });
    }
    if session.column_filter(spec.name).is_some() {
        label.push(' ');
        label.push_str(FILTER_MARK_ACTIVE);
    }
    label
}

fn render_form_text(tab: &TabView, form: &FormUiState) -> String {
    let Some(dialog) = tab.session.dialog() else {
        return String::new();
    };
    let draft = dialog.draft();
    let mut lines = Vec::new();
    for (index, spec) in tab.session.descriptor().editable_fields().enumerate() {
        let focused = index == form.field_index;
        let value = if focused {
            format!("{}_", form.input)
        } else {
            match spec.kind {
                FieldKind::Bool => {
                    cell_text(draft.get(spec.name), spec.kind, OffsetDateTime::UNIX_EPOCH)
                }
                _ => input_text(draft.get(spec.name)),
            }
        };
        let marker = if focused { ">" } else { " " };
        let touched = if dialog.is_touched(spec.name) { "*" } else { "" };
        lines.push(format!("{marker} {}{touched}: {value}", spec.label));
        if let Some(error) = dialog.field_error(spec.name) {
            lines.push(format!("    ! {error}"));
        }
    }
    if let Some(MappedError::Message(message)) = dialog.errors() {
        lines.push(String::new());
        lines.push(format!("! {message}"));
    }
    lines.push(String::new());
    if dialog.is_saving() {
        lines.push("saving…".to_owned());
    } else {
        lines.push(
            "tab/shift+tab field | type to edit | space toggle | enter save | esc cancel"
                .to_owned(),
        );
    }
    lines.join("\n")
}

fn render_picker_text(tab: &TabView, picker: &PickerUiState) -> String {
    let mut lines: Vec<String> = tab
        .session
        .descriptor()
        .schema()
        .enumerate()
        .map(|(index, spec)| {
            let cursor = if index == picker.cursor { ">" } else { " " };
            let mark = if picker.chosen.contains(spec.name) { "x" } else { " " };
            format!("{cursor} [{mark}] {}", spec.label)
        })
        .collect();
    lines.push(String::new());
    lines.push("j/k move | space toggle | enter save as pref | esc cancel".to_owned());
    lines.join("\n")
}

fn prompt_title(purpose: &PromptPurpose) -> String {
    match purpose {
        PromptPurpose::ColumnFilter(spec) => format!("filter {}", spec.label),
        PromptPurpose::Export => "export CSV to".to_owned(),
        PromptPurpose::Import => "import CSV from".to_owned(),
    }
}

fn status_style(state: &AppState) -> Style {
    match state.status.as_ref().and_then(|status| status.level) {
        Some(AlertLevel::Error) => Style::default().fg(Color::Red),
        Some(AlertLevel::Warning) => Style::default().fg(Color::Yellow),
        Some(AlertLevel::Success) => Style::default().fg(Color::Green),
        None => Style::default().fg(Color::Yellow),
    }
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }
    let mode = match state.mode {
        AppMode::Table => "NAV",
        AppMode::Dialog(DialogKind::Edit) => "EDIT",
        AppMode::Dialog(DialogKind::Create) => "NEW",
        AppMode::Dialog(DialogKind::FilterFields | DialogKind::HideFields) => "COLS",
        AppMode::Dialog(DialogKind::ColumnFilter) => "FILTER",
        AppMode::Dialog(DialogKind::Export | DialogKind::Import) => "FILE",
        AppMode::Dialog(DialogKind::ConfirmDelete) => "DELETE",
    };
    let hints = match state.mode {
        AppMode::Table => {
            "j/k/h/l | b/f tabs | [/] page z size | s sort | e edit a add d del | F/H cols / filter | x/i csv | ? help | ctrl+q"
        }
        AppMode::Dialog(DialogKind::ConfirmDelete) => "y confirm | any key cancel",
        AppMode::Dialog(_) => "enter apply | esc cancel",
    };
    match &state.status {
        Some(status) => format!("{mode} | {} | {hints}", status.text),
        None => format!("{mode} | {hints}"),
    }
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help\n\
nav: j/k rows | h/l columns | g/G first/last | b/f tabs\n\
list: [/] prev/next page | z rows per page | s sort column | r reload\n\
edit: e or enter edit row | a add | d delete (y to confirm)\n\
columns: F filterable | H hidden | / filter column | ctrl+n clear filters\n\
csv: x export visible rows | i import file\n\
form: tab/shift+tab field | space or y/n toggle | enter or ctrl+s save | esc cancel\n\
pickers: j/k move | space toggle | enter save as pref | esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
