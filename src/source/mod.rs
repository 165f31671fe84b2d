use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

use crate::query::ListingQuery;

pub const DEFAULT_USER_AGENT: &str = concat!("listsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum SourceBuildError {
    #[error("invalid base URL: {url}")]
    InvalidBaseUrl { url: String },

    #[error("invalid header '{header}', expected 'Key: Value'")]
    InvalidHeader { header: String },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },
}

/// Where refreshed listing documents come from.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Full HTML document served for the filtered root route.
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<String, FetchError>;
}

#[derive(Clone, Debug)]
pub struct SourceOptions {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub proxy: Option<String>,
    pub header: Option<String>,
    pub follow_redirects: bool,
    /// Honour HTTP_PROXY and friends when no explicit proxy is set.
    pub use_env_proxy: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001/".to_string(),
            timeout_seconds: 10,
            proxy: None,
            header: None,
            follow_redirects: true,
            use_env_proxy: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpListingSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpListingSource {
    pub fn new(options: &SourceOptions) -> Result<Self, SourceBuildError> {
        let base = Url::parse(options.base_url.trim()).map_err(|_| {
            SourceBuildError::InvalidBaseUrl {
                url: options.base_url.clone(),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(SourceBuildError::InvalidBaseUrl {
                url: options.base_url.clone(),
            });
        }
        let client = build_client(options)?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Loads any page of the site as text; used for the initial page and for
    /// navigation targets.
    pub async fn fetch_document(&self, url: &Url) -> Result<String, FetchError> {
        let started = tokio::time::Instant::now();
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                source: e,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            source: e,
        })?;
        debug!(
            %url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched document"
        );
        Ok(body)
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<String, FetchError> {
        let url = query.listing_url(&self.base);
        self.fetch_document(&url).await
    }
}

fn parse_header(
    raw: &str,
) -> Result<(reqwest::header::HeaderName, reqwest::header::HeaderValue), SourceBuildError> {
    let invalid = || SourceBuildError::InvalidHeader {
        header: raw.to_string(),
    };
    let (key, value) = raw.split_once(':').ok_or_else(invalid)?;
    let key = reqwest::header::HeaderName::from_str(key.trim()).map_err(|_| invalid())?;
    let value = reqwest::header::HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((key, value))
}

pub fn build_client(options: &SourceOptions) -> Result<reqwest::Client, SourceBuildError> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        reqwest::header::HeaderValue::from_static(DEFAULT_USER_AGENT),
    );
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("text/html,application/xhtml+xml"),
    );
    if let Some(raw) = options.header.as_deref().filter(|h| !h.trim().is_empty()) {
        let (key, value) = parse_header(raw)?;
        headers.append(key, value);
    }

    let redirect_policy = if options.follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect_policy)
        .timeout(Duration::from_secs(options.timeout_seconds.max(1)));

    if let Some(proxy) = options.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| SourceBuildError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    } else if !options.use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| SourceBuildError::HttpClientBuild { source: e })
}
