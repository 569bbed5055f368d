//! Azure DevOps work-item tracking client.
//!
//! [`WorkItemApi`] is the seam the fetcher and service depend on;
//! [`AzureDevOpsClient`] is the blocking `ureq` implementation that talks to
//! `https://dev.azure.com/{org}/{project}/_apis/wit`.
//!
//! # Error mapping
//!
//! | Status    | Error                          |
//! |-----------|--------------------------------|
//! | 401, 403  | [`DevOpsError::Unauthorized`]  |
//! | 404       | [`DevOpsError::NotFound`]      |
//! | other     | [`DevOpsError::Http`]          |
//!
//! The response body's `message` field, when present, is attached as detail.
//! A body that is not JSON is ignored.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::{ConnectionConfig, FetchConfig};
use crate::error::DevOpsError;
use crate::model::{RawWorkItem, WiqlResult, WorkItemBatch, WorkItemState};

const API_VERSION: &str = "7.0";

/// Remote operations the engine needs.
///
/// Implementations must be shareable across the scoped threads of a fetch
/// wave.
pub trait WorkItemApi: Send + Sync {
    /// Execute a WIQL query.
    ///
    /// # Errors
    ///
    /// Any non-success response or transport failure.
    fn run_wiql(&self, query: &str) -> Result<WiqlResult, DevOpsError>;

    /// Fetch full records (fields and relations) for at most 200 ids.
    ///
    /// # Errors
    ///
    /// Any non-success response or transport failure.
    fn fetch_batch(&self, ids: &[u32]) -> Result<Vec<RawWorkItem>, DevOpsError>;

    /// Set `System.State` on one work item.
    ///
    /// # Errors
    ///
    /// Any non-success response or transport failure.
    fn update_state(&self, id: u32, state: &WorkItemState) -> Result<(), DevOpsError>;
}

pub struct AzureDevOpsClient {
    agent: ureq::Agent,
    base_uri: String,
    auth_header: String,
}

// The auth header carries the PAT; keep it out of debug output.
impl std::fmt::Debug for AzureDevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDevOpsClient")
            .field("base_uri", &self.base_uri)
            .finish_non_exhaustive()
    }
}

impl AzureDevOpsClient {
    /// Build a client. Validates the connection settings before anything
    /// else, so a blank organization, project or PAT never reaches the wire.
    ///
    /// # Errors
    ///
    /// Returns [`DevOpsError::Config`] when the connection is incomplete.
    pub fn new(connection: &ConnectionConfig, fetch: &FetchConfig) -> Result<Self, DevOpsError> {
        connection.validate()?;

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .user_agent(concat!("devops-assistant/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self {
            agent,
            base_uri: base_uri(connection),
            auth_header: basic_auth_header(&connection.pat),
        })
    }

    #[must_use]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }
}

impl WorkItemApi for AzureDevOpsClient {
    #[instrument(skip(self, query), fields(len = query.len()))]
    fn run_wiql(&self, query: &str) -> Result<WiqlResult, DevOpsError> {
        let url = wiql_url(&self.base_uri);
        debug!(%url, "running wiql");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.auth_header)
            .send_json(json!({ "query": query }))
            .map_err(map_ureq_error)?;

        response
            .into_json::<WiqlResult>()
            .map_err(|err| DevOpsError::Decode(format!("wiql response: {err}")))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    fn fetch_batch(&self, ids: &[u32]) -> Result<Vec<RawWorkItem>, DevOpsError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = batch_url(&self.base_uri, ids);
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth_header)
            .call()
            .map_err(map_ureq_error)?;

        response
            .into_json::<WorkItemBatch>()
            .map(|batch| batch.value)
            .map_err(|err| DevOpsError::Decode(format!("work item batch: {err}")))
    }

    #[instrument(skip(self))]
    fn update_state(&self, id: u32, state: &WorkItemState) -> Result<(), DevOpsError> {
        let url = item_url(&self.base_uri, id);

        self.agent
            .request("PATCH", &url)
            .set("Authorization", &self.auth_header)
            .set("Content-Type", "application/json-patch+json")
            .send_string(&state_patch(state).to_string())
            .map_err(map_ureq_error)?;

        Ok(())
    }
}

/// `https://dev.azure.com/{org}/{project}/_apis/wit`.
#[must_use]
pub fn base_uri(connection: &ConnectionConfig) -> String {
    format!(
        "https://dev.azure.com/{}/{}/_apis/wit",
        encode_segment(connection.organization.trim()),
        encode_segment(connection.project.trim())
    )
}

/// `POST` target for a WIQL query.
#[must_use]
pub fn wiql_url(base: &str) -> String {
    format!("{base}/wiql?api-version={API_VERSION}")
}

/// `GET` target for one batch, relations expanded.
#[must_use]
pub fn batch_url(base: &str, ids: &[u32]) -> String {
    let csv: Vec<String> = ids.iter().map(u32::to_string).collect();
    format!(
        "{base}/workitems?ids={}&$expand=relations&api-version={API_VERSION}",
        csv.join(",")
    )
}

/// `PATCH` target for a single item.
#[must_use]
pub fn item_url(base: &str, id: u32) -> String {
    format!("{base}/workitems/{id}?api-version={API_VERSION}")
}

/// `Basic base64(":" + pat)`.
#[must_use]
pub fn basic_auth_header(pat: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{pat}")))
}

/// JSON-Patch document setting `System.State`.
#[must_use]
pub fn state_patch(state: &WorkItemState) -> Value {
    json!([{ "op": "add", "path": "/fields/System.State", "value": state.as_str() }])
}

/// Map a non-success response to the error taxonomy.
#[must_use]
pub fn map_http_error(status: u16, reason: &str, body: &str) -> DevOpsError {
    let detail = body_message(body);
    match status {
        401 | 403 => DevOpsError::Unauthorized { status, detail },
        404 => DevOpsError::NotFound { detail },
        _ => DevOpsError::Http {
            status,
            reason: reason.to_string(),
            detail,
        },
    }
}

fn map_ureq_error(err: ureq::Error) -> DevOpsError {
    match err {
        ureq::Error::Status(status, response) => {
            let reason = response.status_text().to_string();
            let body = response.into_string().unwrap_or_default();
            map_http_error(status, &reason, &body)
        }
        ureq::Error::Transport(transport) => DevOpsError::Transport(transport.to_string()),
    }
}

fn body_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn encode_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(' ', "%20")
}
