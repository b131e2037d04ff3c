// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{
    AlertLevel, EditSubmissionController, EntityKind, ListSession, Notification, PreferenceKind,
    PreferenceStore, RecordId, RemoteFailure, RemoteService, ServiceProvider, SessionEvent, UserId,
};
use admindesk_db::Store;
use admindesk_testkit::{
    FakeRemote, MemoryPreferenceBackend, RemoteOp, fixture_now, role_record, setting_record,
    validation_failure,
};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

fn loaded_session(remote: &FakeRemote, kind: EntityKind) -> ListSession {
    let mut session = ListSession::new(kind.descriptor(), UserId::from("operator"), 10);
    let mut sink: Vec<Notification> = Vec::new();
    session.fetch_page(&remote.service(kind), &mut sink);
    assert!(sink.is_empty(), "initial fetch should be quiet: {sink:?}");
    session
}

#[test]
fn toggling_default_updates_row_and_closes_dialog() -> Result<()> {
    let remote = FakeRemote::new()
        .with_clock(fixture_now())
        .with_records(EntityKind::Roles, vec![role_record("r1", "Admin", false)]);
    let service = remote.service(EntityKind::Roles);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    let token = session
        .open_editor(&RecordId::from("r1"))
        .expect("r1 is on the page");
    assert!(session.set_field("isDefault", json!(true)));
    let events = session.save(&service, &mut sink)?;

    assert_eq!(
        events,
        vec![
            SessionEvent::RowReplaced(RecordId::from("r1")),
            SessionEvent::DialogClosed(token),
        ]
    );
    assert!(session.dialog().is_none());
    let row = &session.rows().rows()[0];
    assert_eq!(row.get("isDefault"), Some(&json!(true)));
    assert_eq!(row.get("updatedAt"), Some(&json!("2026-02-19T12:34:57Z")));

    let successes: Vec<_> = sink
        .iter()
        .filter(|notification| notification.level == AlertLevel::Success)
        .collect();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].title, "Edit info");

    let patch = remote
        .calls()
        .into_iter()
        .find(|call| call.op == RemoteOp::Patch)
        .expect("a patch was sent");
    let payload = patch.payload.expect("patch carries a payload");
    assert_eq!(payload.get("isDefault"), Some(&json!(true)));
    assert!(!payload.contains_key("_id"));
    assert!(!payload.contains_key("updatedAt"));
    Ok(())
}

#[test]
fn rejected_edit_keeps_dialog_and_rows() -> Result<()> {
    let remote = FakeRemote::new()
        .with_records(EntityKind::Roles, vec![role_record("r1", "Admin", false)]);
    remote.fail_next(
        EntityKind::Roles,
        RemoteOp::Patch,
        validation_failure(&[("name", "required")]),
    );
    let service = remote.service(EntityKind::Roles);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();
    let before: Vec<_> = session.rows().rows().to_vec();

    let token = session
        .open_editor(&RecordId::from("r1"))
        .expect("r1 is on the page");
    session.set_field("name", json!(""));
    let events = session.save(&service, &mut sink)?;

    assert_eq!(events, vec![SessionEvent::DialogFailed(token)]);
    let dialog = session.dialog().expect("dialog stays open");
    assert_eq!(dialog.field_error("name"), Some("required"));
    assert!(!dialog.is_saving());
    for (old, new) in before.iter().zip(session.rows().iter()) {
        assert!(Arc::ptr_eq(old, new));
    }
    assert!(
        sink.iter()
            .all(|notification| notification.level != AlertLevel::Success)
    );
    assert_eq!(remote.records(EntityKind::Roles)[0].get("name"), Some(&json!("Admin")));

    // Editing the draft again clears the shown errors and the retry lands.
    session.set_field("name", json!("Administrators"));
    assert!(session.dialog().is_some_and(|dialog| dialog.errors().is_none()));
    session.save(&service, &mut sink)?;
    assert!(session.dialog().is_none());
    assert_eq!(
        session.rows().rows()[0].get("name"),
        Some(&json!("Administrators"))
    );
    Ok(())
}

#[test]
fn create_through_remote_validation() -> Result<()> {
    let remote = FakeRemote::new().with_records(
        EntityKind::ServiceSettings,
        vec![setting_record("s1", "mail.from", "noreply@example.com")],
    );
    let service = remote.service(EntityKind::ServiceSettings);
    let mut session = loaded_session(&remote, EntityKind::ServiceSettings);
    let mut sink: Vec<Notification> = Vec::new();

    session.open_creator();
    session.set_field("value", json!("587"));
    session.save(&service, &mut sink)?;
    let dialog = session.dialog().expect("blank name keeps the dialog open");
    assert_eq!(dialog.field_error("name"), Some("name is required"));
    assert_eq!(sink.last().map(|n| n.title.as_str()), Some("Create info"));

    session.set_field("name", json!("mail.smtp.port"));
    let events = session.save(&service, &mut sink)?;
    assert!(matches!(events[0], SessionEvent::RowInserted(_)));
    assert_eq!(session.rows().len(), 2);
    assert_eq!(session.page().total, 2);
    assert_eq!(
        session.rows().rows()[0].get("name"),
        Some(&json!("mail.smtp.port"))
    );
    assert_eq!(remote.records(EntityKind::ServiceSettings).len(), 2);
    Ok(())
}

#[test]
fn worker_thread_result_for_closed_dialog_still_reconciles() -> Result<()> {
    let remote = FakeRemote::new()
        .with_clock(fixture_now())
        .with_records(
            EntityKind::Roles,
            vec![role_record("r1", "Admin", false), role_record("r2", "Editor", false)],
        );
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    session.open_editor(&RecordId::from("r2"));
    session.set_field("name", json!("Editors"));
    let ticket = session.begin_save()?;

    let (tx, rx) = mpsc::channel();
    let service = remote.service(EntityKind::Roles);
    let submission = ticket.submission.clone();
    let worker = thread::spawn(move || {
        let result = EditSubmissionController::execute(&service, &submission);
        tx.send(result).expect("receiver alive");
    });

    // The operator moves on before the save lands.
    session.close_dialog();
    let other = session
        .open_editor(&RecordId::from("r1"))
        .expect("r1 is on the page");

    let result = rx.recv()?;
    worker.join().expect("worker joins");
    let events = session.complete_save(ticket, result, &mut sink);

    assert_eq!(events, vec![SessionEvent::RowReplaced(RecordId::from("r2"))]);
    assert_eq!(session.dialog().map(|dialog| dialog.token()), Some(other));
    assert_eq!(session.rows().rows()[1].get("name"), Some(&json!("Editors")));
    assert_eq!(sink.len(), 1);
    Ok(())
}

#[test]
fn refetch_after_save_agrees_with_local_reconcile() -> Result<()> {
    let remote = FakeRemote::new()
        .with_clock(fixture_now())
        .with_records(EntityKind::Roles, vec![role_record("r1", "Admin", false)]);
    let service = remote.service(EntityKind::Roles);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    session.open_editor(&RecordId::from("r1"));
    session.set_field("description", json!("Everything"));
    session.save(&service, &mut sink)?;
    let local = session.rows().rows()[0].as_ref().clone();

    session.fetch_page(&service, &mut sink);
    assert_eq!(session.rows().rows()[0].as_ref(), &local);
    assert_eq!(service.get(&RecordId::from("r1"))?, local);
    Ok(())
}

#[test]
fn paging_walks_the_remote_collection() -> Result<()> {
    let remote = FakeRemote::demo(9);
    let service = remote.service(EntityKind::Roles);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    assert_eq!(session.page().total, 24);
    assert_eq!(session.rows().len(), 10);
    assert_eq!(session.page().report(session.rows().len()), "1 to 10 of 24");

    assert!(session.next_page());
    assert!(session.next_page());
    session.fetch_page(&service, &mut sink);
    assert_eq!(session.rows().len(), 4);
    assert_eq!(session.page().report(session.rows().len()), "21 to 24 of 24");
    assert!(!session.next_page());

    assert!(session.set_page_size(50));
    session.fetch_page(&service, &mut sink);
    assert_eq!(session.rows().len(), 24);
    assert!(sink.is_empty());
    Ok(())
}

#[test]
fn failed_fetch_keeps_rows_and_warns() -> Result<()> {
    let remote =
        FakeRemote::new().with_records(EntityKind::Roles, vec![role_record("r1", "Admin", false)]);
    let service = remote.service(EntityKind::Roles);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    remote.fail_next(
        EntityKind::Roles,
        RemoteOp::Find,
        RemoteFailure::transport("connection refused"),
    );
    session.fetch_page(&service, &mut sink);

    assert_eq!(session.rows().len(), 1);
    assert!(!session.is_loading());
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].level, AlertLevel::Error);
    assert_eq!(sink[0].message, "connection refused");
    Ok(())
}

#[test]
fn saved_preferences_shape_the_table_after_restart() -> Result<()> {
    let (_dir, path) = admindesk_testkit::temp_db_path()?;
    let remote = FakeRemote::demo(1);

    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let mut prefs = PreferenceStore::new(store);
        let mut session = loaded_session(&remote, EntityKind::Roles);
        let mut sink: Vec<Notification> = Vec::new();
        session.save_preference(
            &mut prefs,
            PreferenceKind::HideFields,
            vec!["description".to_owned(), "createdBy".to_owned()],
            &mut sink,
        );
        session.save_preference(
            &mut prefs,
            PreferenceKind::FilterFields,
            vec!["name".to_owned()],
            &mut sink,
        );
        assert!(sink.is_empty());
    }

    let store = Store::open(&path)?;
    store.bootstrap()?;
    let mut prefs = PreferenceStore::new(store);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();
    session.load_preferences(&mut prefs, &mut sink);

    let columns: Vec<&str> = session
        .visible_columns()
        .iter()
        .map(|spec| spec.name)
        .collect();
    assert!(!columns.contains(&"description"));
    assert!(!columns.contains(&"createdBy"));
    assert!(session.set_column_filter("name", "admin"));
    assert_eq!(session.visible_rows().len(), 1);
    Ok(())
}

#[test]
fn offline_preferences_degrade_without_blocking() {
    let backend = MemoryPreferenceBackend::new();
    let remote =
        FakeRemote::new().with_records(EntityKind::Roles, vec![role_record("r1", "Admin", false)]);
    let mut prefs = PreferenceStore::new(&backend);
    let mut session = loaded_session(&remote, EntityKind::Roles);
    let mut sink: Vec<Notification> = Vec::new();

    backend.set_unavailable(true);
    session.save_preference(
        &mut prefs,
        PreferenceKind::HideFields,
        vec!["isDefault".to_owned()],
        &mut sink,
    );
    assert!(session.preference().is_hidden("isDefault"));
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].level, AlertLevel::Error);

    session.load_preferences(&mut prefs, &mut sink);
    assert!(session.preference().is_hidden("isDefault"));
    assert_eq!(sink.len(), 2);
    assert_eq!(sink[1].level, AlertLevel::Warning);
    assert_eq!(backend.writes(), 0);
}
