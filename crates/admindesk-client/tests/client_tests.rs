// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{
    EntityKind, FailureKind, FindQuery, MappedError, RecordId, RemoteService, SortDirection,
    map_failure,
};
use admindesk_client::Client;
use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

fn json_response(status: u16, body: &str) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn start() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    Ok((server, addr))
}

#[test]
fn unreachable_server_is_a_transport_failure() {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50), None)
        .expect("client should initialize");

    let failure = client
        .service(EntityKind::Roles)
        .find(&FindQuery::page(10, 0))
        .expect_err("nothing listens on port 1");
    assert_eq!(failure.kind, FailureKind::Transport);
    assert!(failure.message.contains("start the API server"));

    let error = client.ping().expect_err("ping should fail too");
    assert!(format!("{error:#}").contains("fix [server] base_url"));
}

#[test]
fn find_sends_paging_and_sort_and_reads_paginated_body() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.method(), &Method::Get);
        let url = url::Url::parse(&format!("http://mock{}", request.url()))
            .expect("request url parses");
        assert_eq!(url.path(), "/roles");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("$limit".to_owned(), "10".to_owned()),
                ("$skip".to_owned(), "20".to_owned()),
                ("$sort[name]".to_owned(), "-1".to_owned()),
            ]
        );
        request
            .respond(json_response(
                200,
                r#"{"total":21,"limit":10,"skip":20,"data":[{"_id":"r21","name":"Zed"}]}"#,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), None)?;
    let page = client.service(EntityKind::Roles).find(&FindQuery {
        limit: 10,
        skip: 20,
        sort: Some(("name".to_owned(), SortDirection::Desc)),
    })?;

    assert_eq!(page.total, 21);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id(), Some(RecordId::from("r21")));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn find_accepts_bare_array() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(200, r#"[{"_id":"s1","name":"mail"}]"#))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), None)?;
    let page = client
        .service(EntityKind::ServiceSettings)
        .find(&FindQuery::page(50, 0))?;
    assert_eq!(page.total, 1);
    assert_eq!(page.limit, 50);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn patch_sends_payload_and_bearer_token() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        assert_eq!(request.method(), &Method::Patch);
        assert_eq!(request.url(), "/roles/r1");
        let auth = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("Authorization"))
            .map(|header| header.value.as_str().to_owned());
        assert_eq!(auth.as_deref(), Some("Bearer secret"));

        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("request body readable");
        let payload: Value = serde_json::from_str(&body).expect("payload is JSON");
        assert_eq!(payload, json!({"isDefault": true}));

        request
            .respond(json_response(
                200,
                r#"{"_id":"r1","name":"Admin","isDefault":true,"updatedAt":"2026-02-01T00:00:00Z"}"#,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), Some("secret"))?;
    let mut payload = Map::new();
    payload.insert("isDefault".to_owned(), json!(true));
    let record = client
        .service(EntityKind::Roles)
        .patch(&RecordId::from("r1"), &payload)?;

    assert_eq!(record.get("isDefault"), Some(&json!(true)));
    assert_eq!(record.get("updatedAt"), Some(&json!("2026-02-01T00:00:00Z")));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn validation_error_body_maps_to_field_errors() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.method(), &Method::Post);
        assert_eq!(request.url(), "/roles");
        request
            .respond(json_response(
                400,
                r#"{"name":"BadRequest","message":"Validation failed","code":400,"errors":{"name":{"message":"required"}}}"#,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), None)?;
    let failure = client
        .service(EntityKind::Roles)
        .create(&Map::new())
        .expect_err("server rejects payload");

    assert_eq!(failure.kind, FailureKind::Rejected { status: 400 });
    let Some(MappedError::Fields(fields)) = map_failure(&failure) else {
        panic!("expected field errors, got {failure:?}");
    };
    assert_eq!(fields.get("name"), Some("required"));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn remove_hits_record_path_and_reports_not_found() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(request.method(), &Method::Delete);
        assert_eq!(request.url(), "/servicesettings/gone");
        request
            .respond(json_response(
                404,
                r#"{"name":"NotFound","message":"No record found for id 'gone'","code":404}"#,
            ))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), None)?;
    let failure = client
        .service(EntityKind::ServiceSettings)
        .remove(&RecordId::from("gone"))
        .expect_err("record is gone");

    assert!(failure.is_not_found());
    assert_eq!(failure.message, "No record found for id 'gone'");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn malformed_success_body_is_a_decode_failure() -> Result<()> {
    let (server, addr) = start()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(200, r#""just a string""#))
            .expect("response should succeed");
    });

    let client = Client::new(&addr, Duration::from_secs(1), None)?;
    let failure = client
        .service(EntityKind::Roles)
        .get(&RecordId::from("r1"))
        .expect_err("string is not a record");
    assert_eq!(failure.kind, FailureKind::Decode);

    handle.join().expect("server thread should join");
    Ok(())
}
