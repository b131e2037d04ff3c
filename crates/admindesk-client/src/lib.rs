// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use admindesk_app::{
    EntityKind, EntityRecord, FindPage, FindQuery, RecordId, RemoteFailure, RemoteService,
    ServiceProvider, SortDirection,
};
use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Connection settings shared by every per-entity service handle.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    access_token: Option<String>,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, access_token: Option<&str>) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("server.base_url must not be empty");
        }
        let base_url = Url::parse(&format!("{trimmed}/")).with_context(|| {
            format!("server.base_url {trimmed:?} is not a valid URL, e.g. http://localhost:3030")
        })?;
        if base_url.cannot_be_a_base() {
            bail!("server.base_url {trimmed:?} cannot hold service paths; use an http(s) URL");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            access_token: access_token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn service(&self, kind: EntityKind) -> ServiceClient {
        ServiceClient {
            client: self.clone(),
            service: kind.descriptor().service,
        }
    }

    /// One cheap list call, for `--check`.
    pub fn ping(&self) -> Result<()> {
        let service = self.service(EntityKind::Roles);
        service
            .find(&FindQuery::page(1, 0))
            .map(|_| ())
            .with_context(|| {
                format!(
                    "cannot list roles at {}; start the API server or fix [server] base_url",
                    self.base_url()
                )
            })
    }
}

impl ServiceProvider for Client {
    type Service = ServiceClient;

    fn service(&self, kind: EntityKind) -> Self::Service {
        Client::service(self, kind)
    }
}

/// REST handle for one collection: `GET/POST /{service}` and
/// `GET/PATCH/DELETE /{service}/{id}`.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    service: &'static str,
}

impl ServiceClient {
    pub fn service_name(&self) -> &'static str {
        self.service
    }

    fn collection_url(&self) -> Result<Url, RemoteFailure> {
        let mut url = self.client.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteFailure::transport("server.base_url cannot hold service paths"))?
            .pop_if_empty()
            .push(self.service);
        Ok(url)
    }

    fn record_url(&self, id: &RecordId) -> Result<Url, RemoteFailure> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|()| RemoteFailure::transport("server.base_url cannot hold service paths"))?
            .push(id.as_str());
        Ok(url)
    }

    fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, RemoteFailure> {
        let request = match &self.client.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .map_err(|error| connection_error(self.client.base_url(), self.client.timeout, error))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "remote call finished");
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, RemoteFailure> {
        response
            .json::<T>()
            .map_err(|error| RemoteFailure::decode(format!("decode {what}: {error}")))
    }
}

impl RemoteService for ServiceClient {
    fn get(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        let url = self.record_url(id)?;
        let response = self.send(self.client.http.get(url.clone()), &url)?;
        Self::decode(response, &format!("{} record {id}", self.service))
    }

    fn find(&self, query: &FindQuery) -> Result<FindPage, RemoteFailure> {
        let mut url = self.collection_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("$limit", &query.limit.to_string())
                .append_pair("$skip", &query.skip.to_string());
            if let Some((field, direction)) = &query.sort {
                let order = match direction {
                    SortDirection::Asc => "1",
                    SortDirection::Desc => "-1",
                };
                pairs.append_pair(&format!("$sort[{field}]"), order);
            }
        }
        let response = self.send(self.client.http.get(url.clone()), &url)?;
        let body: FindBody = Self::decode(response, &format!("{} list", self.service))?;
        Ok(match body {
            FindBody::List(data) => FindPage {
                total: query.skip + data.len(),
                limit: query.limit,
                skip: query.skip,
                data,
            },
            FindBody::Page(page) => page,
        })
    }

    fn create(&self, payload: &Map<String, Value>) -> Result<EntityRecord, RemoteFailure> {
        let url = self.collection_url()?;
        let response = self.send(self.client.http.post(url.clone()).json(payload), &url)?;
        Self::decode(response, &format!("created {} record", self.service))
    }

    fn patch(
        &self,
        id: &RecordId,
        payload: &Map<String, Value>,
    ) -> Result<EntityRecord, RemoteFailure> {
        let url = self.record_url(id)?;
        let response = self.send(self.client.http.patch(url.clone()).json(payload), &url)?;
        Self::decode(response, &format!("updated {} record {id}", self.service))
    }

    fn remove(&self, id: &RecordId) -> Result<EntityRecord, RemoteFailure> {
        let url = self.record_url(id)?;
        let response = self.send(self.client.http.delete(url.clone()), &url)?;
        Self::decode(response, &format!("removed {} record {id}", self.service))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FindBody {
    List(Vec<EntityRecord>),
    Page(FindPage),
}

fn connection_error(base_url: &str, timeout: Duration, error: reqwest::Error) -> RemoteFailure {
    if error.is_timeout() {
        return RemoteFailure::transport(format!(
            "{base_url} did not answer within {}ms -- raise [server] timeout or check the server",
            timeout.as_millis()
        ));
    }
    RemoteFailure::transport(format!(
        "cannot reach {base_url} -- start the API server or fix [server] base_url ({error})"
    ))
}

fn clean_error_response(status: StatusCode, body: &str) -> RemoteFailure {
    let failure = RemoteFailure::from_body(status.as_u16(), body);
    if failure.errors.is_some() || (!failure.message.is_empty() && !body.contains('<')) {
        return failure;
    }
    let message = if !body.is_empty() && body.len() < 100 && !body.contains('<') {
        format!("server error ({}): {}", status.as_u16(), body.trim())
    } else {
        format!("server returned {}", status.as_u16())
    };
    RemoteFailure::rejected(status.as_u16(), message, None)
}

#[cfg(test)]
mod tests {
    use super::{Client, clean_error_response};
    use admindesk_app::{EntityKind, FailureKind};
    use reqwest::StatusCode;
    use std::time::Duration;

    #[test]
    fn base_url_must_be_usable() {
        assert!(Client::new("", Duration::from_secs(1), None).is_err());
        assert!(Client::new("not a url", Duration::from_secs(1), None).is_err());
        let client = Client::new("http://api.local:3030/", Duration::from_secs(1), Some("  "))
            .expect("valid base url");
        assert_eq!(client.base_url(), "http://api.local:3030");
        assert!(client.access_token.is_none());
    }

    #[test]
    fn service_urls_nest_under_base_path() {
        let client = Client::new("http://api.local/v2", Duration::from_secs(1), None)
            .expect("valid base url");
        let service = client.service(EntityKind::ServiceSettings);
        assert_eq!(
            service
                .record_url(&"abc 1".into())
                .expect("url builds")
                .as_str(),
            "http://api.local/v2/servicesettings/abc%201"
        );
    }

    #[test]
    fn html_error_pages_are_summarised() {
        let failure = clean_error_response(
            StatusCode::BAD_GATEWAY,
            "<html><body>upstream exploded</body></html>",
        );
        assert_eq!(failure.kind, FailureKind::Rejected { status: 502 });
        assert_eq!(failure.message, "server returned 502");
    }

    #[test]
    fn empty_error_body_names_status() {
        let failure = clean_error_response(StatusCode::FORBIDDEN, "");
        assert_eq!(failure.message, "server returned 403");
    }
}
