// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{
    AlertLevel, EntityKind, Notification, PreferenceKey, PreferenceKind, PreferenceStore, UserId,
};
use admindesk_db::{Store, validate_db_path};
use anyhow::Result;

fn key(user: &str, entity: EntityKind, kind: PreferenceKind) -> PreferenceKey {
    PreferenceKey::new(&UserId::from(user), entity, kind)
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|field| (*field).to_owned()).collect()
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("/tmp/admindesk.db").is_ok());
    assert!(validate_db_path(":memory:").is_ok());
}

#[test]
fn missing_preference_reads_as_none() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    assert_eq!(
        store.get_preference(&key("u1", EntityKind::Roles, PreferenceKind::FilterFields))?,
        None
    );
    Ok(())
}

#[test]
fn put_preference_upserts_per_kind() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let filter = key("u1", EntityKind::Roles, PreferenceKind::FilterFields);
    let hide = key("u1", EntityKind::Roles, PreferenceKind::HideFields);

    store.put_preference(&filter, &owned(&["name"]))?;
    store.put_preference(&hide, &owned(&["description"]))?;
    store.put_preference(&filter, &owned(&["name", "isDefault"]))?;

    assert_eq!(
        store.get_preference(&filter)?,
        Some(owned(&["name", "isDefault"]))
    );
    assert_eq!(store.get_preference(&hide)?, Some(owned(&["description"])));

    let listed = store.list_preferences(&UserId::from("u1"))?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].kind, PreferenceKind::FilterFields);
    assert_eq!(listed[1].kind, PreferenceKind::HideFields);
    Ok(())
}

#[test]
fn preferences_survive_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("prefs.db");
    let user = UserId::from("operator");

    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let mut prefs = PreferenceStore::new(store);
        let mut sink: Vec<Notification> = Vec::new();
        prefs.save(
            &user,
            EntityKind::ServiceSettings,
            PreferenceKind::HideFields,
            owned(&["description", "createdBy"]),
            &mut sink,
        );
        assert!(sink.is_empty());
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    let mut prefs = PreferenceStore::new(store);
    let mut sink: Vec<Notification> = Vec::new();
    let loaded = prefs.load(&user, EntityKind::ServiceSettings, &mut sink);

    assert!(loaded.is_hidden("description"));
    assert!(loaded.is_hidden("createdBy"));
    assert!(loaded.filter_fields.is_empty());
    assert!(sink.is_empty());
    Ok(())
}

#[test]
fn broken_table_degrades_to_warning() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store
        .raw_connection()
        .execute_batch("DROP TABLE column_preferences;")?;

    let mut prefs = PreferenceStore::new(store);
    let mut sink: Vec<Notification> = Vec::new();
    let loaded = prefs.load(&UserId::from("u1"), EntityKind::Roles, &mut sink);

    assert!(loaded.hide_fields.is_empty());
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].level, AlertLevel::Warning);
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    store.raw_connection().execute_batch(
        "
            DROP TABLE column_preferences;
            CREATE TABLE column_preferences (
              user_id TEXT NOT NULL,
              entity TEXT NOT NULL,
              kind TEXT NOT NULL,
              fields TEXT NOT NULL
            );
            ",
    )?;

    let err = store
        .bootstrap()
        .expect_err("schema validation should fail");
    let message = err.to_string();
    assert!(message.contains("table `column_preferences` is missing required columns"));
    assert!(message.contains("updated_at"));
    Ok(())
}

#[test]
fn bootstrap_rejects_foreign_database() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE projects (id INTEGER PRIMARY KEY);")?;

    let err = store.bootstrap().expect_err("unrelated tables");
    assert!(
        err.to_string()
            .contains("missing required table `column_preferences`")
    );
    Ok(())
}
