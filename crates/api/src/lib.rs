pub mod error;
pub mod locator;
pub mod models;

use std::time::Duration;

use error::{ApiError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

pub use locator::BuildQuery;
pub use models::{Artifact, BuildDetails, BuildList, BuildStopPayload, BuildTrigger};

const JSON: &str = "application/json";
const BEARER_PREFIX: &str = "Bearer ";

/// How HTTP status codes of responses are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Status codes are ignored; any body that parses is a success.
    #[default]
    Lenient,
    /// Non-2xx responses are turned into typed errors before the body is parsed.
    Strict,
}

/// Settings fixed at construction time. A zero duration disables that timeout.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub tls_handshake_timeout: Duration,
    pub insecure: bool,
    pub status_policy: StatusPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            tls_handshake_timeout: Duration::from_secs(10),
            insecure: false,
            status_policy: StatusPolicy::default(),
        }
    }

    pub fn with_timeouts(
        mut self,
        request_timeout: Duration,
        connect_timeout: Duration,
        tls_handshake_timeout: Duration,
    ) -> Self {
        self.request_timeout = request_timeout;
        self.connect_timeout = connect_timeout;
        self.tls_handshake_timeout = tls_handshake_timeout;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// reqwest bounds TCP connect and TLS handshake with a single timeout, so
    /// the enabled parts are added up. `None` when both are disabled.
    pub fn connect_bound(&self) -> Option<Duration> {
        let bound = self.connect_timeout + self.tls_handshake_timeout;
        (!bound.is_zero()).then_some(bound)
    }
}

/// Client for the TeamCity REST API.
///
/// Cloning is cheap and clones share the underlying connection pool. Every
/// method performs exactly one request and never retries.
#[derive(Clone)]
pub struct TeamcityClient {
    client: Client,
    server_url: String,
    token: String,
    status_policy: StatusPolicy,
}

impl TeamcityClient {
    /// Build the HTTP transport. Neither the URL nor the token is validated
    /// here; a malformed base URL is reported by the first request.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(format!("teamcity-cli/{}", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure);

        if !config.request_timeout.is_zero() {
            builder = builder.timeout(config.request_timeout);
        }

        if let Some(bound) = config.connect_bound() {
            builder = builder.connect_timeout(bound);
        }

        let client = builder.build().map_err(ApiError::ClientBuild)?;

        Ok(Self {
            client,
            server_url: config.base_url.trim_end_matches('/').to_string(),
            token: normalize_token(&config.token).to_string(),
            status_policy: config.status_policy,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// The token as sent after `Bearer `.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Fetch a build by ID, decoding into any type matching the response.
    pub async fn get_build<T: DeserializeOwned>(&self, id: i64) -> Result<T> {
        let url = self.url(&format!("/app/rest/builds/id:{id}"))?;
        let response = self.send(Method::GET, url, None).await?;
        let body = read_body(response).await?;
        decode(&body)
    }

    /// Queue a build and return the ID the server assigned to it.
    pub async fn start_build(&self, trigger: &BuildTrigger) -> Result<i64> {
        let payload = encode(&trigger.payload())?;
        debug!(
            build_type = %trigger.build_type_id,
            branch = %trigger.branch,
            payload = %String::from_utf8_lossy(&payload),
            "Queueing build"
        );

        let url = self.url("/app/rest/buildQueue")?;
        let response = self.send(Method::POST, url, Some(payload)).await?;
        let body = read_body(response).await?;
        let details: BuildDetails = decode(&body)?;

        debug!(id = details.id, "Build queued");
        Ok(details.id)
    }

    /// Remove a build from the queue. Builds that already started are
    /// rejected by the server, not by this client.
    pub async fn cancel_queued_build(&self, id: i64, comment: &str) -> Result<()> {
        let url = self.url(&format!("/app/rest/buildQueue/{id}"))?;
        self.post_stop(url, comment).await
    }

    /// Stop a running build.
    pub async fn stop_build(&self, id: i64, comment: &str) -> Result<()> {
        let url = self.url(&format!("/app/rest/builds/{id}"))?;
        self.post_stop(url, comment).await
    }

    /// Download an artifact file. `path` is relative to the build's artifact
    /// root. The content is returned as-is together with its declared type.
    pub async fn get_artifact(&self, path: &str, id: i64) -> Result<Artifact> {
        let url = self.url(&format!(
            "/app/rest/builds/id:{id}/artifacts/content/{}",
            path.trim_start_matches('/')
        ))?;
        let response = self.send(Method::GET, url, None).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content = read_body(response).await?;

        Ok(Artifact {
            content,
            content_type,
        })
    }

    /// List builds matching `query`.
    pub async fn get_all_builds(&self, query: &BuildQuery) -> Result<BuildList> {
        let mut url = self.url("/app/rest/builds/")?;
        url.set_query(Some(&format!("locator={}", query.locator())));

        let response = self.send(Method::GET, url, None).await?;
        let body = read_body(response).await?;
        decode(&body)
    }

    async fn post_stop(&self, url: Url, comment: &str) -> Result<()> {
        let payload = encode(&BuildStopPayload::new(comment))?;
        let response = self.send(Method::POST, url, Some(payload)).await?;
        let body = read_body(response).await?;

        debug!(body = %String::from_utf8_lossy(&body), "Stop request answered");
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{}", self.server_url, path);
        Url::parse(&raw).map_err(|err| {
            error!(url = %raw, error = %err, "Invalid request URL");
            ApiError::InvalidUrl(err)
        })
    }

    async fn send(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<Response> {
        debug!(method = %method, url = %url, "Sending request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token)
            .header(ACCEPT, JSON)
            .header(CONTENT_TYPE, JSON);

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|err| {
            error!(method = %method, url = %url, error = %err, "Request failed");
            ApiError::RequestFailed(err)
        })?;

        debug!(status = %response.status(), url = %url, "Received response");
        self.check_status(response).await
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if self.status_policy == StatusPolicy::Lenient || status.is_success() {
            return Ok(response);
        }

        let resource = response.url().path().to_string();
        let err = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthenticationFailed {
                message: response_text(response, "Invalid or expired credentials").await,
            },
            StatusCode::NOT_FOUND => ApiError::NotFound { resource },
            StatusCode::BAD_REQUEST => ApiError::BadRequest {
                message: response_text(response, "Bad request").await,
            },
            status => ApiError::ServerError {
                status: status.as_u16(),
                message: response_text(response, &format!("Unexpected status: {status}")).await,
            },
        };

        error!(status = status.as_u16(), error = %err, "Server rejected request");
        Err(err)
    }
}

/// Strip a leading `Bearer ` so callers may pass either form of the token.
pub fn normalize_token(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token)
}

async fn response_text(response: Response, fallback: &str) -> String {
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => fallback.to_string(),
    }
}

async fn read_body(response: Response) -> Result<Vec<u8>> {
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|err| {
            error!(error = %err, "Failed to read response body");
            ApiError::ReadBody(err)
        })
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| {
        error!(error = %err, "Failed to serialize request body");
        ApiError::Encode(err)
    })
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        error!(
            error = %err,
            body = %String::from_utf8_lossy(body),
            "Failed to parse JSON response"
        );
        ApiError::Decode(err)
    })
}
