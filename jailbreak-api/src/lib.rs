//! Minimal jAILBREAK backend API client.
//!
//! This crate provides a focused client for the game backend with:
//! - Player endpoints (level listing, password validation, gatekeeper chat)
//! - Admin endpoints (level CRUD, prompt component library)
//! - Wire types that accept the loose id shapes the backend emits

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const BASE_URL_VAR: &str = "JAILBREAK_API_URL";
const AUTH_TOKEN_VAR: &str = "JAILBREAK_AUTH_TOKEN";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Every route lives under this path segment of the backend origin.
const API_SEGMENT: &str = "api";

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Backend URL not configured - set JAILBREAK_API_URL")]
    NoBaseUrl,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the backend reported that the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }
}

/// jAILBREAK backend client.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
    base: Url,
    auth_token: Option<String>,
}

impl Client {
    /// Create a client for the backend at origin `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::NoBaseUrl);
        }
        let base = Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("Backend URL {base_url} cannot carry a path")));
        }

        Ok(Self {
            client,
            base_url,
            base,
            auth_token: None,
        })
    }

    /// Create a client from `JAILBREAK_API_URL` and, if set, `JAILBREAK_AUTH_TOKEN`.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var(BASE_URL_VAR).map_err(|_| Error::NoBaseUrl)?;
        let client = Self::new(base_url)?;
        Ok(match std::env::var(AUTH_TOKEN_VAR) {
            Ok(token) if !token.trim().is_empty() => client.with_auth_token(token.trim()),
            _ => client,
        })
    }

    /// Send `token` in the `Authorization` header of every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The backend root this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ------------------------------------------------------------------
    // Player endpoints
    // ------------------------------------------------------------------

    /// `GET /levels`
    pub async fn levels(&self) -> Result<Vec<PublicLevel>, Error> {
        let response: LevelsResponse<PublicLevel> =
            self.send_json(self.client.get(self.url(&["levels"])?)).await?;
        Ok(response.levels)
    }

    /// `POST /levels/{level_id}/validate`
    pub async fn validate_password(&self, level_id: &str, password: &str) -> Result<bool, Error> {
        let url = self.url(&["levels", level_id, "validate"])?;
        let response: ValidateResponse = self
            .send_json(
                self.client
                    .post(url)
                    .json(&ValidateRequest { password }),
            )
            .await?;
        Ok(response.is_correct)
    }

    /// `POST /levels/{level_id}/chat/{session_id}`
    pub async fn chat(
        &self,
        level_id: &str,
        session_id: &str,
        request: &ChatRequest,
    ) -> Result<String, Error> {
        let url = self.url(&["levels", level_id, "chat", session_id])?;
        let response: ChatReply = self
            .send_json(self.client.post(url).json(request))
            .await?;
        Ok(response.reply)
    }

    // ------------------------------------------------------------------
    // Admin endpoints
    // ------------------------------------------------------------------

    /// `GET /admin/levels`
    pub async fn admin_levels(&self) -> Result<Vec<AdminLevel>, Error> {
        let response: LevelsResponse<AdminLevel> =
            self.send_json(self.client.get(self.url(&["admin", "levels"])?)).await?;
        Ok(response.levels)
    }

    /// `POST /admin/levels`
    pub async fn create_level(&self, name: &str) -> Result<AdminLevel, Error> {
        let response: CreateLevelResponse = self
            .send_json(
                self.client
                    .post(self.url(&["admin", "levels"])?)
                    .json(&CreateLevelRequest { name }),
            )
            .await?;
        Ok(response.level)
    }

    /// `PATCH /admin/levels/{level_id}` with only the fields that changed.
    pub async fn modify_level(&self, level_id: &str, patch: &LevelPatchBody) -> Result<(), Error> {
        let url = self.url(&["admin", "levels", level_id])?;
        self.send_unit(self.client.patch(url).json(patch)).await
    }

    /// `DELETE /admin/levels/{level_id}`
    pub async fn delete_level(&self, level_id: &str) -> Result<(), Error> {
        let url = self.url(&["admin", "levels", level_id])?;
        self.send_unit(self.client.delete(url)).await
    }

    /// `GET /admin/prompt/components`, in library order.
    pub async fn components(&self) -> Result<Vec<ComponentBody>, Error> {
        let response: ComponentsResponse = self
            .send_json(self.client.get(self.url(&["admin", "prompt", "components"])?))
            .await?;
        Ok(response.components)
    }

    /// `POST /admin/prompt/components`
    pub async fn create_component(&self, text: &str) -> Result<WireId, Error> {
        let response: CreateComponentResponse = self
            .send_json(
                self.client
                    .post(self.url(&["admin", "prompt", "components"])?)
                    .json(&CreateComponentRequest { text }),
            )
            .await?;
        Ok(response.component_id)
    }

    /// `PUT /admin/prompt/components/{component_id}`
    pub async fn update_component(&self, component_id: &str, new_text: &str) -> Result<(), Error> {
        let url = self.url(&["admin", "prompt", "components", component_id])?;
        self.send_unit(
            self.client
                .put(url)
                .json(&UpdateComponentRequest { new_text }),
        )
        .await
    }

    /// `DELETE /admin/prompt/components/{component_id}`
    pub async fn delete_component(&self, component_id: &str) -> Result<(), Error> {
        let url = self.url(&["admin", "prompt", "components", component_id])?;
        self.send_unit(self.client.delete(url)).await
    }

    /// `POST /admin/prompt/components/{component_id}/move`
    pub async fn move_component(
        &self,
        component_id: &str,
        direction: MoveDirection,
    ) -> Result<(), Error> {
        let url = self.url(&["admin", "prompt", "components", component_id, "move"])?;
        self.send_unit(
            self.client
                .post(url)
                .json(&MoveComponentRequest { direction }),
        )
        .await
    }

    /// Route URL under the API prefix. Each segment is percent-encoded, so
    /// ids containing `/`, `?` or `#` stay inside their own segment.
    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Backend URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push(API_SEGMENT)
            .extend(segments);
        Ok(url)
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(token)
                    .map_err(|e| Error::Config(format!("Invalid auth token: {e}")))?,
            );
        }
        Ok(headers)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, Error> {
        let request = request
            .headers(self.build_headers()?)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        debug!(method = %request.method(), url = %request.url(), "backend request");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    async fn send_unit(&self, request: RequestBuilder) -> Result<(), Error> {
        self.send(request).await.map(|_| ())
    }
}

// ============================================================================
// Public wire types
// ============================================================================

/// An id as the backend sends it.
///
/// Ids have been observed as bare numbers, bare strings, and
/// single-element arrays of either. Callers normalise these at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(u64),
    Text(String),
    List(Vec<WireId>),
}

impl WireId {
    /// Collapse to a single scalar string, or `None` if the shape is not
    /// a scalar or a one-element list of a scalar.
    pub fn into_scalar(self) -> Option<String> {
        match self {
            WireId::Number(n) => Some(n.to_string()),
            WireId::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            WireId::List(mut items) if items.len() == 1 => match items.pop() {
                Some(WireId::List(_)) | None => None,
                Some(inner) => inner.into_scalar(),
            },
            WireId::List(_) => None,
        }
    }
}

impl From<&str> for WireId {
    fn from(value: &str) -> Self {
        match value.parse::<u64>() {
            Ok(n) => WireId::Number(n),
            Err(_) => WireId::Text(value.to_string()),
        }
    }
}

/// A level as listed to players. Never carries the password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicLevel {
    #[serde(alias = "level_id")]
    pub id: WireId,
    pub name: String,
    pub difficulty: String,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub next: Vec<WireId>,
}

/// A level as the admin endpoints expose it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLevel {
    #[serde(alias = "id")]
    pub level_id: WireId,
    pub name: String,
    pub password: String,
    pub difficulty: String,
    #[serde(default)]
    pub prompt_components: Vec<WireId>,
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub next: Vec<WireId>,
}

/// Partial level update. Absent fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelPatchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_components: Option<Vec<WireId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Vec<WireId>>,
}

/// A prompt component in the admin library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentBody {
    #[serde(alias = "id")]
    pub component_id: WireId,
    #[serde(default)]
    pub text: String,
}

/// Body of a chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_info: UserInfo,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_info: UserInfo {
                username: username.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub username: String,
}

/// Direction for reordering prompt components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

// ============================================================================
// Internal request/response bodies
// ============================================================================

#[derive(Deserialize)]
struct LevelsResponse<T> {
    levels: Vec<T>,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    is_correct: bool,
}

#[derive(Deserialize)]
struct ChatReply {
    reply: String,
}

#[derive(Serialize)]
struct CreateLevelRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateLevelResponse {
    level: AdminLevel,
}

#[derive(Deserialize)]
struct ComponentsResponse {
    components: Vec<ComponentBody>,
}

#[derive(Serialize)]
struct CreateComponentRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct CreateComponentResponse {
    component_id: WireId,
}

#[derive(Serialize)]
struct UpdateComponentRequest<'a> {
    new_text: &'a str,
}

#[derive(Serialize)]
struct MoveComponentRequest {
    direction: MoveDirection,
}
