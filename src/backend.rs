use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::BackendConfig;
use crate::record::{RecordEventRequest, RecordSink};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const EVENTS_TABLE: &str = "match_events";
const ASSIGNMENTS_TABLE: &str = "match_tracker_assignments";
const VIDEO_BUCKET: &str = "videos";

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

/// REST, storage and function endpoints of the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    url: String,
    key: String,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.url
    }

    pub fn insert_event(&self, request: &RecordEventRequest) -> Result<()> {
        let url = format!("{}/rest/v1/{EVENTS_TABLE}", self.url);
        let resp = self
            .authed(http_client()?.post(&url))
            .header("Prefer", "return=minimal")
            .json(request)
            .send()
            .context("event insert request failed")?;
        ensure_success(resp).map(|_| ())
    }

    pub fn fetch_assigned_event_types(&self, match_id: &str, tracker_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/rest/v1/{ASSIGNMENTS_TABLE}?match_id=eq.{match_id}&tracker_user_id=eq.{tracker_id}&select=assigned_event_types,assigned_event_type",
            self.url
        );
        let resp = self
            .authed(http_client()?.get(&url))
            .send()
            .context("assignment request failed")?;
        let body = ensure_success(resp)?
            .text()
            .context("failed reading assignment body")?;
        parse_assignment_json(&body)
    }

    pub fn upload_object(&self, object_path: &str, bytes: Vec<u8>) -> Result<()> {
        let url = format!("{}/storage/v1/object/{VIDEO_BUCKET}/{object_path}", self.url);
        let resp = self
            .authed(http_client()?.post(&url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .with_context(|| format!("upload of {object_path} failed"))?;
        ensure_success(resp).map(|_| ())
    }

    pub fn invoke_function(&self, name: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}/functions/v1/{name}", self.url);
        let resp = self
            .authed(http_client()?.post(&url))
            .json(payload)
            .send()
            .with_context(|| format!("function {name} request failed"))?;
        let body = ensure_success(resp)?
            .text()
            .with_context(|| format!("failed reading {name} response"))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).with_context(|| format!("invalid {name} response json"))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(USER_AGENT, "tracker_terminal")
            .header("apikey", &self.key)
            .header(AUTHORIZATION, format!("Bearer {}", self.key))
    }
}

/// Downloads a public link in one request.
pub fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let resp = http_client()?
        .get(url)
        .header(USER_AGENT, "tracker_terminal")
        .send()
        .with_context(|| format!("download of {url} failed"))?;
    let bytes = ensure_success(resp)?
        .bytes()
        .context("failed reading download body")?;
    Ok(bytes.to_vec())
}

fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(anyhow!("http {}: {}", status, body.trim()))
}

/// Sends each resolved event straight to the backend events table.
pub struct RestEventSink {
    client: BackendClient,
}

impl RestEventSink {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

impl RecordSink for RestEventSink {
    fn submit(&mut self, request: &RecordEventRequest) -> Result<()> {
        self.client.insert_event(request)
    }
}

#[derive(Debug, Deserialize)]
struct AssignmentRow {
    #[serde(default)]
    assigned_event_types: Option<Vec<String>>,
    #[serde(default)]
    assigned_event_type: Option<String>,
}

/// Flattens a tracker's assignment rows into one ordered, de-duplicated list
/// of event-type keys. `null` parses as no assignment.
pub fn parse_assignment_json(raw: &str) -> Result<Vec<String>> {
    let rows = serde_json::from_str::<Option<Vec<AssignmentRow>>>(raw)
        .context("invalid assignment json")?
        .unwrap_or_default();
    let mut out: Vec<String> = Vec::new();
    for row in rows {
        let listed = row.assigned_event_types.unwrap_or_default();
        for key in listed.into_iter().chain(row.assigned_event_type) {
            let key = key.trim().to_ascii_lowercase();
            if !key.is_empty() && !out.contains(&key) {
                out.push(key);
            }
        }
    }
    Ok(out)
}
