//! Segmentation service seam and its HTTP client.
//!
//! [`SegmentationService`] is the only thing the pipeline knows about the
//! model that actually cuts out the foreground. [`HttpSegmentationService`]
//! talks to a remote service over HTTP:
//!
//! ```text
//! POST <endpoint>
//! Content-Type: application/json
//! Authorization: Bearer <api key>          (optional)
//!
//! {"image": "<url or data URI>"}
//!
//! 200 OK
//! Content-Type: image/png
//! <binary image>
//! ```
//!
//! No timeout and no retry are applied. A hung service stalls the caller.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use crate::{ImagePayload, ImageRef, SegmentationError};

/// Path appended to endpoints given as a bare host.
pub const DEFAULT_SEGMENTATION_PATH: &str = "/remove-background";

/// Something that turns an image into a background-free image.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    /// Segment one image and return the foreground as a binary image.
    ///
    /// # Errors
    ///
    /// Any failure loading, transferring or processing the image.
    async fn segment(&self, image: &ImageRef) -> Result<ImagePayload, SegmentationError>;
}

#[async_trait]
impl<S: SegmentationService + ?Sized> SegmentationService for Arc<S> {
    async fn segment(&self, image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
        (**self).segment(image).await
    }
}

/// Configuration for [`HttpSegmentationService`].
#[derive(Debug, Clone)]
pub struct HttpSegmentationConfig {
    /// Service URL, either the full endpoint or just the host.
    pub endpoint: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// User-Agent header value.
    pub user_agent: String,
}

impl HttpSegmentationConfig {
    /// Configuration for `endpoint` without authentication.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            user_agent: format!("meme-bgremove/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Serialize)]
struct SegmentRequest<'a> {
    image: &'a str,
}

/// Segmentation service reached over HTTP.
#[derive(Clone)]
pub struct HttpSegmentationService {
    inner: Arc<InnerClient>,
}

struct InnerClient {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpSegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSegmentationService")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("authenticated", &self.inner.api_key.is_some())
            .finish()
    }
}

impl HttpSegmentationService {
    /// Create a client for `endpoint` without authentication.
    ///
    /// `endpoint` may be either the full service URL or just the host (in
    /// which case [`DEFAULT_SEGMENTATION_PATH`] is appended).
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidEndpoint`] if the URL is malformed.
    /// Returns [`SegmentationError::Http`] if the HTTP client fails to build.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SegmentationError> {
        Self::with_config(HttpSegmentationConfig::new(endpoint))
    }

    /// Create a client from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidEndpoint`] if the URL is malformed.
    /// Returns [`SegmentationError::Http`] if the HTTP client fails to build.
    pub fn with_config(config: HttpSegmentationConfig) -> Result<Self, SegmentationError> {
        let mut endpoint = Url::parse(&config.endpoint)
            .map_err(|e| SegmentationError::InvalidEndpoint(e.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SegmentationError::InvalidEndpoint(format!(
                "unsupported scheme: {}",
                endpoint.scheme()
            )));
        }
        if endpoint.path().is_empty() || endpoint.path() == "/" {
            endpoint.set_path(DEFAULT_SEGMENTATION_PATH);
        }

        let http = Client::builder().user_agent(config.user_agent).build()?;

        Ok(Self {
            inner: Arc::new(InnerClient {
                http,
                endpoint,
                api_key: config.api_key,
            }),
        })
    }

    /// The resolved endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }
}

#[async_trait]
impl SegmentationService for HttpSegmentationService {
    async fn segment(&self, image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
        let mut request = self
            .inner
            .http
            .post(self.inner.endpoint.clone())
            .json(&SegmentRequest {
                image: image.as_str(),
            });
        if let Some(api_key) = &self.inner.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body
            };
            return Err(match status {
                StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => {
                    SegmentationError::UnsupportedInput(message)
                }
                _ => SegmentationError::Service {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        tracing::debug!(
            size = bytes.len(),
            content_type = content_type.as_deref().unwrap_or("unknown"),
            "Segmentation service responded"
        );
        Ok(ImagePayload::new(bytes.to_vec(), content_type))
    }
}
