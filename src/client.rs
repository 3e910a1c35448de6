use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_CHUNKS,
};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest};

/// Base URL used when neither `--api` nor `OPENAI_URL` is given.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:11434/v1";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// An ordered stream of chunks for one response.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Anything that can stream a chat completion.
///
/// The turn loop only ever sees this trait, so tests can script responses.
#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Issue `request` and return its chunks in arrival order.
    ///
    /// Dropping the returned stream closes the underlying connection.
    async fn stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream>;

    /// The logger that should see messages reconstructed from this client's streams.
    fn logger(&self) -> Option<&dyn ClientLogger> {
        None
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAi {
    api_key: Option<String>,
    client: ReqwestClient,
    base_url: Url,
    endpoint: Url,
    connect_timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl OpenAi {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// Requests carry `Authorization: Bearer <api_key>` only when a key is given.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, None)
    }

    /// Create a new client with a custom connect timeout.
    ///
    /// Only connecting is bounded; a streamed answer may take as long as the model needs.
    pub fn with_options(
        base_url: &str,
        api_key: Option<String>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::url(format!("invalid API URL {base_url:?}: {e}"), Some(e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let endpoint = base_url.join("chat/completions").map_err(|e| {
            Error::url(
                format!("cannot derive chat/completions from {base_url}: {e}"),
                Some(e),
            )
        })?;

        let api_key = api_key.filter(|key| !key.is_empty());
        if let Some(key) = api_key.as_ref() {
            HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                Error::authentication("API key contains characters not allowed in a header")
            })?;
        }

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            endpoint,
            connect_timeout,
            logger: None,
        })
    }

    /// Attach a logger that sees every request and chunk.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The base URL, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        if let Some(key) = self.api_key.as_ref() {
            // Validated in the constructor.
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(header::AUTHORIZATION, value);
            }
        }
        headers
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(format!(
                "Request timed out after {:.0}s: {e}",
                self.connect_timeout.as_secs_f64()
            ))
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // OpenAI sends an object; Ollama sends a bare string.
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorBody {
            Detail(ErrorDetail),
            Message(String),
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let (error_type, message, param) =
            match serde_json::from_str::<ErrorResponse>(&error_body).map(|r| r.error) {
                Ok(ErrorBody::Detail(detail)) => (
                    detail.error_type,
                    detail.message.unwrap_or_else(|| error_body.clone()),
                    detail.param,
                ),
                Ok(ErrorBody::Message(message)) => (None, message, None),
                Err(_) => (None, error_body, None),
            };

        Error::from_status(status_code, error_type, message, param, retry_after)
    }
}

impl fmt::Debug for OpenAi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAi")
            .field("endpoint", &self.endpoint.as_str())
            .field("has_api_key", &self.api_key.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait]
impl ChatCompletions for OpenAi {
    async fn stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        CLIENT_REQUESTS.click();
        if let Some(logger) = self.logger.as_ref() {
            logger.log_request(request);
        }

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                self.request_error(e)
            })?;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let logger = self.logger.clone();
        let chunks = process_sse(response.bytes_stream()).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                STREAM_CHUNKS.click();
                if let Some(logger) = logger.as_ref() {
                    logger.log_stream_chunk(chunk);
                }
            }
        });
        Ok(Box::pin(chunks))
    }

    fn logger(&self) -> Option<&dyn ClientLogger> {
        self.logger.as_deref()
    }
}
