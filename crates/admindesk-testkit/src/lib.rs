// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::display::search_text;
use admindesk_app::{
    CREATED_AT_FIELD, CREATED_BY_FIELD, EntityKind, EntityRecord, FindPage, FindQuery, ID_FIELD,
    PreferenceBackend, PreferenceKey, RecordId, RemoteFailure, RemoteService, ServiceProvider,
    SortDirection, UPDATED_AT_FIELD, UPDATED_BY_FIELD,
};
use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

const ROLE_NAMES: [&str; 12] = [
    "Administrator",
    "Editor",
    "Viewer",
    "Auditor",
    "Support",
    "Billing",
    "Developer",
    "Operator",
    "Moderator",
    "Analyst",
    "Reviewer",
    "Guest",
];

const ROLE_SCOPES: [&str; 8] = [
    "platform",
    "content",
    "billing",
    "reporting",
    "support queue",
    "deployments",
    "user directory",
    "audit log",
];

const ROLE_VERBS: [&str; 5] = ["Full access to", "Read-only view of", "Manages", "Approves", "Triages"];

const SETTING_KEYS: [(&str, &[&str]); 10] = [
    ("mail.smtp.host", &["smtp.internal", "mail.example.com", "localhost"]),
    ("mail.smtp.port", &["25", "465", "587"]),
    ("mail.from", &["noreply@example.com", "ops@example.com"]),
    ("auth.session.ttl", &["15m", "1h", "12h"]),
    ("auth.password.min_length", &["8", "12", "16"]),
    ("storage.bucket", &["uploads-prod", "uploads-staging"]),
    ("storage.max_upload_mb", &["10", "25", "100"]),
    ("ui.locale", &["en-US", "de-DE", "fr-FR"]),
    ("jobs.retry.limit", &["3", "5", "10"]),
    ("audit.retention.days", &["30", "90", "365"]),
];

const SETTING_NOTES: [&str; 6] = [
    "Set by the platform team.",
    "Change only during a maintenance window.",
    "Read at startup; restart workers after editing.",
    "Overrides the environment default.",
    "Shared by every tenant.",
    "",
];

const OPERATORS: [(&str, &str); 4] = [
    ("u-0001", "Avery Walker"),
    ("u-0002", "Jordan Hill"),
    ("u-0003", "Riley Evans"),
    ("u-0004", "Quinn Foster"),
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Deterministic role and service-setting records for demos and tests.
#[derive(Debug, Clone)]
pub struct AdminFaker {
    rng: DeterministicRng,
    seed: u64,
    serial: u64,
}

impl AdminFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
            serial: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn records(&mut self, kind: EntityKind, count: usize, now: OffsetDateTime) -> Vec<EntityRecord> {
        (0..count)
            .map(|index| match kind {
                EntityKind::Roles => self.role(index, now),
                EntityKind::ServiceSettings => self.service_setting(index, now),
            })
            .collect()
    }

    pub fn role(&mut self, index: usize, now: OffsetDateTime) -> EntityRecord {
        let base = ROLE_NAMES[index % ROLE_NAMES.len()];
        let name = if index < ROLE_NAMES.len() {
            base.to_owned()
        } else {
            format!("{base} {}", index / ROLE_NAMES.len() + 1)
        };
        let description = format!("{} {}", self.pick(&ROLE_VERBS), self.pick(&ROLE_SCOPES));
        let record = EntityRecord::new()
            .with(ID_FIELD, self.next_id())
            .with("name", name)
            .with("description", description)
            .with("isDefault", index == 2);
        self.stamp(record, now)
    }

    pub fn service_setting(&mut self, index: usize, now: OffsetDateTime) -> EntityRecord {
        let (key, values) = SETTING_KEYS[index % SETTING_KEYS.len()];
        let name = if index < SETTING_KEYS.len() {
            key.to_owned()
        } else {
            format!("{key}.{}", index / SETTING_KEYS.len() + 1)
        };
        let record = EntityRecord::new()
            .with(ID_FIELD, self.next_id())
            .with("name", name)
            .with("value", self.pick(values))
            .with("description", self.pick(&SETTING_NOTES));
        self.stamp(record, now)
    }

    fn stamp(&mut self, record: EntityRecord, now: OffsetDateTime) -> EntityRecord {
        let created = now - Duration::minutes(self.rng.int_n(60 * 24 * 120) as i64 + 60);
        let updated = if self.rng.bool() {
            created + Duration::minutes(self.rng.int_n(60 * 24 * 30) as i64)
        } else {
            created
        };
        let updated = updated.min(now);
        let creator = self.operator();
        let updater = self.operator();
        record
            .with(CREATED_AT_FIELD, rfc3339(created))
            .with(CREATED_BY_FIELD, creator)
            .with(UPDATED_AT_FIELD, rfc3339(updated))
            .with(UPDATED_BY_FIELD, updater)
    }

    fn operator(&mut self) -> Value {
        let (id, name) = OPERATORS[self.rng.int_n(OPERATORS.len())];
        json!({ ID_FIELD: id, "name": name })
    }

    fn next_id(&mut self) -> String {
        self.serial += 1;
        format!("{:08x}{:016x}", self.seed as u32, self.serial)
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Get,
    Find,
    Create,
    Patch,
    Remove,
}

/// One call the fake remote received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub kind: EntityKind,
    pub op: RemoteOp,
    pub id: Option<RecordId>,
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Default)]
struct RemoteState {
    collections: BTreeMap<EntityKind, Vec<EntityRecord>>,
    scripted: HashMap<(EntityKind, RemoteOp), VecDeque<RemoteFailure>>,
    calls: Vec<RemoteCall>,
    next_id: u64,
    clock: Option<OffsetDateTime>,
    ticks: i64,
}

/// In-memory stand-in for the REST API. Clones share one backing state, so
/// a handle kept by a test sees what worker threads did through another.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded collections for `--demo`.
    pub fn demo(seed: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut faker = AdminFaker::new(seed);
        let remote = Self::new();
        remote.seed(EntityKind::Roles, faker.records(EntityKind::Roles, 24, now));
        remote.seed(
            EntityKind::ServiceSettings,
            faker.records(EntityKind::ServiceSettings, 14, now),
        );
        remote
    }

    /// Stamps written records with `start + n` seconds instead of wall time.
    pub fn with_clock(self, start: OffsetDateTime) -> Self {
        self.lock().clock = Some(start);
        self
    }

    pub fn with_records(self, kind: EntityKind, records: Vec<EntityRecord>) -> Self {
        self.seed(kind, records);
        self
    }

    pub fn seed(&self, kind: EntityKind, records: Vec<EntityRecord>) {
        self.lock().collections.entry(kind).or_default().extend(records);
    }

    /// Makes the next `op` on `kind` fail once with `failure`.
    pub fn fail_next(&self, kind: EntityKind, op: RemoteOp, failure: RemoteFailure) {
        self.lock()
            .scripted
            .entry((kind, op))
            .or_default()
            .push_back(failure);
    }

    pub fn records(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.lock()
            .collections
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, kind: EntityKind, op: RemoteOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind && call.op == op)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServiceProvider for FakeRemote {
    type Service = FakeService;

    fn service(&self, kind: EntityKind) -> Self::Service {
        FakeService {
            kind,
            remote: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeService {
    kind: EntityKind,
    remote: FakeRemote,
}

impl FakeService {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    fn enter(
        &self,
        op: RemoteOp,
        id: Option<&RecordId>,
        payload: Option<&Map<String, Value>>,
    ) -> Result<MutexGuard<'_, RemoteState>, RemoteFailure> {
        let mut state = self.remote.lock();
        state.calls.push(RemoteCall {
            kind: self.kind,
            op,
            id: id.cloned(),
            payload: payload.cloned(),
        });
        if let Some(failure) = state
            .scripted
            .get_mut(&(self.kind, op))
            .and_then(VecDeque::pop_front)
        {
            return Err(failure);
        }
        Ok(state)
    }

    fn not_found(&self, id: &RecordId) -> RemoteFailure {
        RemoteFailure::rejected(404, format!("No record found for id '{id}'"), None)
    }
}

impl RemoteService for FakeService {
    fn get(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        let state = self.enter(RemoteOp::Get, Some(id), None)?;
        state
            .collections
            .get(&self.kind)
            .and_then(|rows| rows.iter().find(|row| row.id().as_ref() == Some(id)))
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    fn find(&self, query: &FindQuery) -> Result<FindPage, RemoteFailure> {
        let state = self.enter(RemoteOp::Find, None, None)?;
        let mut rows = state.collections.get(&self.kind).cloned().unwrap_or_default();
        if let Some((field, direction)) = &query.sort {
            rows.sort_by_cached_key(|row| search_text(row.get(field)));
            if *direction == SortDirection::Desc {
                rows.reverse();
            }
        }
        let total = rows.len();
        let data = rows.into_iter().skip(query.skip).take(query.limit).collect();
        Ok(FindPage {
            total,
            limit: query.limit,
            skip: query.skip,
            data,
        })
    }

    fn create(&self, payload: &Map<String, Value>) -> Result<EntityRecord, RemoteFailure> {
        let mut state = self.enter(RemoteOp::Create, None, Some(payload))?;
        let mut record = EntityRecord::from(payload.clone());
        require_name(&record)?;

        state.next_id += 1;
        let id = format!("fake{:020}", state.next_id);
        let now = state.stamp()?;
        record.set(ID_FIELD, Value::String(id));
        record.set(CREATED_AT_FIELD, Value::String(now.clone()));
        record.set(CREATED_BY_FIELD, actor());
        record.set(UPDATED_AT_FIELD, Value::String(now));
        record.set(UPDATED_BY_FIELD, actor());

        state
            .collections
            .entry(self.kind)
            .or_default()
            .insert(0, record.clone());
        Ok(record)
    }

    fn patch(
        &self,
        id: &RecordId,
        payload: &Map<String, Value>,
    ) -> Result<EntityRecord, RemoteFailure> {
        let mut state = self.enter(RemoteOp::Patch, Some(id), Some(payload))?;
        let now = state.stamp()?;
        let row = state
            .collections
            .get_mut(&self.kind)
            .and_then(|rows| rows.iter_mut().find(|row| row.id().as_ref() == Some(id)))
            .ok_or_else(|| self.not_found(id))?;

        let mut updated = row.clone();
        for (key, value) in payload {
            updated.set(key.clone(), value.clone());
        }
        require_name(&updated)?;
        updated.set(UPDATED_AT_FIELD, Value::String(now));
        updated.set(UPDATED_BY_FIELD, actor());
        *row = updated.clone();
        Ok(updated)
    }

    fn remove(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        let mut state = self.enter(RemoteOp::Remove, Some(id), None)?;
        let rows = state.collections.entry(self.kind).or_default();
        let index = rows
            .iter()
            .position(|row| row.id().as_ref() == Some(id))
            .ok_or_else(|| self.not_found(id))?;
        Ok(rows.remove(index))
    }
}

impl RemoteState {
    fn stamp(&mut self) -> Result<String, RemoteFailure> {
        self.ticks += 1;
        let at = match self.clock {
            Some(start) => start + Duration::seconds(self.ticks),
            None => OffsetDateTime::now_utc(),
        };
        at.format(&Rfc3339)
            .map_err(|error| RemoteFailure::transport(format!("format fake timestamp: {error}")))
    }
}

fn require_name(record: &EntityRecord) -> Result<(), RemoteFailure> {
    let blank = record
        .get("name")
        .and_then(Value::as_str)
        .is_none_or(|name| name.trim().is_empty());
    if blank {
        return Err(validation_failure(&[("name", "name is required")]));
    }
    Ok(())
}

fn actor() -> Value {
    json!({ ID_FIELD: "u-demo", "name": "Demo Operator" })
}

/// A 400 body shaped the way the API reports schema validation errors.
pub fn validation_failure(fields: &[(&str, &str)]) -> RemoteFailure {
    let errors: Map<String, Value> = fields
        .iter()
        .map(|(field, message)| {
            (
                (*field).to_owned(),
                json!({ "message": message, "path": field }),
            )
        })
        .collect();
    RemoteFailure::rejected(400, "Validation failed", Some(Value::Object(errors)))
}

/// Preference backend held in memory; can be switched off to exercise the
/// degraded paths.
#[derive(Debug, Default)]
pub struct MemoryPreferenceBackend {
    rows: Mutex<HashMap<PreferenceKey, Vec<String>>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryPreferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &PreferenceKey) -> Option<Vec<String>> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("preference storage is offline");
        }
        Ok(())
    }
}

impl PreferenceBackend for MemoryPreferenceBackend {
    fn get(&self, key: &PreferenceKey) -> Result<Option<Vec<String>>> {
        self.check()?;
        Ok(self.stored(key))
    }

    fn set(&self, key: &PreferenceKey, fields: &[String]) -> Result<()> {
        self.check()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), fields.to_vec());
        Ok(())
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("admindesk.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

pub fn fixture_now() -> OffsetDateTime {
    OffsetDateTime::parse(fixture_datetime(), &Rfc3339).expect("fixture datetime parses")
}

pub fn role_record(id: &str, name: &str, is_default: bool) -> EntityRecord {
    EntityRecord::new()
        .with(ID_FIELD, id)
        .with("name", name)
        .with("isDefault", is_default)
        .with(CREATED_AT_FIELD, fixture_datetime())
        .with(UPDATED_AT_FIELD, fixture_datetime())
}

pub fn setting_record(id: &str, name: &str, value: &str) -> EntityRecord {
    EntityRecord::new()
        .with(ID_FIELD, id)
        .with("name", name)
        .with("value", value)
        .with("description", "")
        .with(CREATED_AT_FIELD, fixture_datetime())
        .with(UPDATED_AT_FIELD, fixture_datetime())
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_default()
}
