//! HTTP transport shared by the *arr v3 API shapes.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use serde_json::Value;

use crate::error::HuntError;
use crate::protocol::{WantedItem, WantedKind, WantedPage};
use crate::retry::{AttemptError, RetryPolicy};

const API_PREFIX: &str = "api/v3";

/// Blocking *arr v3 client backed by `ureq`.
pub struct ArrHttpClient {
    instance_name: String,
    base_url: String,
    api_key: String,
    http_client: ureq::Agent,
    retry: RetryPolicy,
}

impl ArrHttpClient {
    pub fn new(
        instance_name: &str,
        base_url: &str,
        api_key: &str,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build();
        Self {
            instance_name: instance_name.to_string(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client,
            retry,
        }
    }

    fn api_url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let url = format!(
            "{}/{API_PREFIX}/{}",
            self.base_url,
            endpoint.trim_start_matches('/')
        );
        if params.is_empty() {
            return url;
        }
        let query_parts: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        format!("{url}?{}", query_parts.join("&"))
    }

    fn classify(err: ureq::Error) -> AttemptError {
        match err {
            ureq::Error::Status(code, _) if code == 429 || code >= 500 => {
                AttemptError::Transient(format!("HTTP {code}"))
            }
            ureq::Error::Status(code, response) => {
                AttemptError::Permanent(format!("HTTP {code} {}", response.status_text()))
            }
            ureq::Error::Transport(transport) => AttemptError::Transient(transport.to_string()),
        }
    }

    fn decode(response: ureq::Response) -> Result<Value, AttemptError> {
        response
            .into_json::<Value>()
            .map_err(|err| AttemptError::Permanent(format!("response decode failed: {err}")))
    }

    /// GET with retries. The error string is already instance-agnostic.
    pub fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, String> {
        let url = self.api_url(endpoint, params);
        debug!("[{}] GET {}", self.instance_name, url);
        let operation = format!("[{}] GET {endpoint}", self.instance_name);
        self.retry.run(&operation, || {
            let response = self
                .http_client
                .get(&url)
                .set("X-Api-Key", &self.api_key)
                .set("Accept", "application/json")
                .call()
                .map_err(Self::classify)?;
            Self::decode(response)
        })
    }

    /// POST a JSON body with retries. Any 2xx status is an acceptance; the
    /// response body is never read, so an empty `201` still counts.
    pub fn post_json(&self, endpoint: &str, body: &Value) -> Result<(), String> {
        let url = self.api_url(endpoint, &[]);
        debug!("[{}] POST {} {}", self.instance_name, url, body);
        let operation = format!("[{}] POST {endpoint}", self.instance_name);
        self.retry.run(&operation, || {
            self.http_client
                .post(&url)
                .set("X-Api-Key", &self.api_key)
                .send_json(body)
                .map(|_| ())
                .map_err(Self::classify)
        })
    }

    /// `GET system/status`, returning the reported version.
    pub fn system_version(&self) -> Result<String, HuntError> {
        let status = self
            .get_json("system/status", &[])
            .map_err(|reason| self.unreachable(None, reason))?;
        Ok(status
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Fetches one wanted page and normalizes it with `parse_record`.
    pub fn fetch_wanted_page(
        &self,
        kind: WantedKind,
        params: &[(&str, String)],
        parse_record: fn(&Value, WantedKind) -> Option<WantedItem>,
    ) -> Result<WantedPage, HuntError> {
        let payload = self
            .get_json(kind.wanted_endpoint(), params)
            .map_err(|reason| self.unreachable(Some(kind), reason))?;
        Ok(parse_wanted_page(&self.instance_name, &payload, kind, parse_record))
    }

    /// POSTs a `command` payload; any failure becomes `TriggerFailed`.
    pub fn post_command(&self, item_id: i64, command: &Value) -> Result<(), HuntError> {
        self.post_json("command", command)
            .map_err(|reason| HuntError::TriggerFailed {
                instance: self.instance_name.clone(),
                item_id,
                reason,
            })
    }

    fn unreachable(&self, kind: Option<WantedKind>, reason: String) -> HuntError {
        HuntError::InstanceUnreachable {
            instance: self.instance_name.clone(),
            kind,
            reason,
        }
    }
}

/// Splits a `{ totalRecords, records: [...] }` payload into a [`WantedPage`].
/// Records the parser rejects (no numeric id) are dropped.
pub fn parse_wanted_page(
    instance_name: &str,
    payload: &Value,
    kind: WantedKind,
    parse_record: fn(&Value, WantedKind) -> Option<WantedItem>,
) -> WantedPage {
    let total_count = payload
        .get("totalRecords")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let records = payload
        .get("records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        match parse_record(record, kind) {
            Some(item) => items.push(item),
            None => debug!("[{instance_name}] skipping {kind} record without an id"),
        }
    }
    WantedPage { items, total_count }
}

/// Parses an *arr timestamp (`2024-03-01T20:00:00Z`, with or without
/// fractional seconds) or a bare `YYYY-MM-DD` date.
pub fn parse_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn bool_field(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}
