//! reqwest-backed client for the daemon's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::DaemonApi;
use crate::error::ClientError;
use crate::model::{
    BranchConflict, BranchSuggestion, DaemonConfig, SpawnRequest, SpawnResult, Workspace,
    BRANCH_CONFLICT_PREFIX,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SuggestBranchRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct NicknameRequest<'a> {
    nickname: &'a str,
}

#[derive(Debug, Deserialize)]
struct SeedResponse {
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Daemon client over HTTP.
#[derive(Clone)]
pub struct HttpDaemon {
    base_url: Url,
    client: Client,
}

impl HttpDaemon {
    /// `base_url` is the daemon root, e.g. `http://127.0.0.1:7337`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let raw = base_url.into();
        let base_url = Url::parse(raw.trim_end_matches('/'))
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
            .ok_or_else(|| ClientError::InvalidUrl(raw.clone()))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// WebSocket URL streaming a session's terminal.
    pub fn terminal_url(&self, session_id: &str) -> String {
        let mut url = self.endpoint(&["ws", "terminal", session_id]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) and ws(s) are all special schemes, so the switch succeeds
        let _ = url.set_scheme(scheme);
        url.to_string()
    }

    /// Base URL extended by `segments`, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push("api");
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let text = self.send_text(request).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_text(&self, request: RequestBuilder) -> Result<String, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(extract_error_message(&text)));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }
        Ok(text)
    }
}

/// Pull a human-readable message out of an error body.
///
/// JSON bodies of the form `{"error": .., "details": ..}` are unpacked; a
/// `branch_conflict:` message is returned untouched so callers can
/// recognize it.
fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(trimmed) else {
        return trimmed.to_string();
    };

    let candidates = [parsed.error.as_deref(), parsed.details.as_deref()];
    if let Some(conflict) = candidates
        .iter()
        .flatten()
        .find(|msg| msg.trim_start().starts_with(BRANCH_CONFLICT_PREFIX))
    {
        return conflict.to_string();
    }

    match (parsed.error, parsed.details) {
        (Some(error), Some(details)) => format!("{}: {}", error, details),
        (Some(error), None) => error,
        (None, Some(details)) => details,
        (None, None) => trimmed.to_string(),
    }
}

#[async_trait]
impl DaemonApi for HttpDaemon {
    async fn get_config(&self) -> Result<DaemonConfig, ClientError> {
        self.send_json(self.client.get(self.url(&["config"]))).await
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ClientError> {
        let workspaces: Vec<Workspace> = self.send_json(self.client.get(self.url(&["sessions"]))).await?;
        Ok(workspaces.into_iter().map(Workspace::normalize).collect())
    }

    async fn spawn(&self, request: &SpawnRequest) -> Result<Vec<SpawnResult>, ClientError> {
        tracing::debug!(
            repo = %request.repo,
            branch = %request.branch,
            units = request.targets.total(),
            "Sending spawn request"
        );
        self.send_json(self.client.post(self.url(&["spawn"])).json(request))
            .await
    }

    async fn check_branch_conflict(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<BranchConflict, ClientError> {
        let request = self
            .client
            .get(self.url(&["check-branch-conflict"]))
            .query(&[("repo", repo), ("branch", branch)]);
        self.send_json(request).await
    }

    async fn suggest_branch(&self, prompt: &str) -> Result<BranchSuggestion, ClientError> {
        let request = self
            .client
            .post(self.url(&["suggest-branch"]))
            .json(&SuggestBranchRequest { prompt });
        self.send_json(request).await
    }

    async fn dispose_session(&self, session_id: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url(&["dispose", session_id]));
        self.send_text(request).await.map(|_| ())
    }

    async fn update_nickname(&self, session_id: &str, nickname: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .put(self.url(&["sessions-nickname", session_id]))
            .json(&NicknameRequest { nickname });
        self.send_text(request).await.map(|_| ())
    }

    async fn seed_lines(&self, session_id: &str, lines: usize) -> Result<Vec<String>, ClientError> {
        let request = self
            .client
            .get(self.url(&["sessions", session_id, "seed"]))
            .query(&[("lines", lines)]);
        let response: SeedResponse = self.send_json(request).await?;
        Ok(response.lines)
    }
}
