use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum WavelineError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// One file ready to be sent to `/sync/upload`.
///
/// `file` and `dir` are server-relative and always use `/`; `separator` is
/// the host separator so the server can rebuild native paths.
#[derive(Debug)]
pub struct UploadDescriptor {
    pub data: tokio::fs::File,
    pub len: u64,
    pub name: String,
    pub file: String,
    pub dir: String,
    pub separator: String,
    pub roots: Vec<String>,
}

#[derive(Clone)]
pub struct WavelineClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl WavelineClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, WavelineError> {
        Self::with_http(Client::new(), base_url, api_key)
    }

    pub fn with_http(
        http: Client,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, WavelineError> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Checks that the server is reachable and accepts the API key.
    pub async fn ping(&self) -> Result<(), WavelineError> {
        let url = self.endpoint("/")?;
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    /// Asks the server which of `files` it still needs.
    pub async fn plan_sync(
        &self,
        files: &[String],
        roots: &[String],
        separator: &str,
    ) -> Result<Vec<String>, WavelineError> {
        let url = self.endpoint("/sync")?;
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .json(&SyncPlanRequest {
                files,
                roots,
                separator,
            })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn upload_file(&self, descriptor: UploadDescriptor) -> Result<(), WavelineError> {
        let url = self.endpoint("/sync/upload")?;
        let roots = serde_json::to_string(&descriptor.roots)?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(descriptor.data));
        let data = Part::stream_with_length(body, descriptor.len).file_name(descriptor.name.clone());
        let form = Form::new()
            .part("data", data)
            .text("name", descriptor.name)
            .text("file", descriptor.file)
            .text("dir", descriptor.dir)
            .text("separator", descriptor.separator)
            .text("root", roots);
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::ensure_success(response).await.map(|_| ())
    }

    fn endpoint(&self, path: &str) -> Result<Url, WavelineError> {
        // Paths are appended to the configured server URL, keeping any base path.
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, WavelineError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WavelineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|err| err.message)
            .unwrap_or(body);
        Err(WavelineError::Api { status, message })
    }
}

impl WavelineError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            WavelineError::Api { status, .. } => Some(classify_api_status(*status)),
            WavelineError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ApiErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Serialize)]
struct SyncPlanRequest<'a> {
    files: &'a [String],
    roots: &'a [String],
    separator: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
