// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! Performing requests against the status port
//!
//! The core only describes requests. A [`Fetcher`] carries them out; the
//! default [`HttpFetcher`] talks HTTP with `reqwest`, and tests substitute
//! scripted fetchers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::trace;

use crate::config::DashboardConfig;
use crate::error::{ConfigError, FetchError};
use crate::event::{Request, Response};
use crate::snapshot::{GraphSeries, StatusSnapshot};

/// Performs the three kinds of request the dashboard issues
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// `GET /status.json`
    async fn status(&self, timeout: Duration) -> Result<StatusSnapshot, FetchError>;

    /// `GET /counterdata?<metric>`
    async fn series(&self, metric: &str, timeout: Duration) -> Result<GraphSeries, FetchError>;

    /// `GET <url>`, where `url` may be relative to the server
    async fn text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Carry out `request` and wrap the outcome with its ticket
pub async fn execute<F: Fetcher + ?Sized>(fetcher: &F, request: Request) -> Response {
    match request {
        Request::Status { ticket, timeout } => Response::Status {
            ticket,
            result: fetcher.status(timeout).await,
        },
        Request::Series {
            ticket,
            metric,
            timeout,
        } => Response::Series {
            ticket,
            result: fetcher.series(&metric, timeout).await,
        },
        Request::Motd {
            ticket,
            url,
            timeout,
        } => Response::Motd {
            ticket,
            result: fetcher.text(&url, timeout).await,
        },
    }
}

/// [`Fetcher`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Url,
}

impl HttpFetcher {
    /// Create a fetcher for the server configured in `config`
    pub fn new(config: &DashboardConfig) -> Result<Self, ConfigError> {
        let base = config.base()?;
        let client = Client::builder()
            .user_agent(concat!("aprsc-dash/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self { client, base })
    }

    /// The server base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get(&self, url: Url, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        trace!(%url, ?timeout, "GET");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Server(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn status(&self, timeout: Duration) -> Result<StatusSnapshot, FetchError> {
        let response = self.get(status_url(&self.base)?, timeout).await?;
        let body = response.bytes().await.map_err(classify)?;
        StatusSnapshot::from_slice(&body)
    }

    async fn series(&self, metric: &str, timeout: Duration) -> Result<GraphSeries, FetchError> {
        let response = self.get(series_url(&self.base, metric)?, timeout).await?;
        let body = response.bytes().await.map_err(classify)?;
        GraphSeries::from_slice(&body)
    }

    async fn text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self.get(resolve(&self.base, url)?, timeout).await?;
        response.text().await.map_err(classify)
    }
}

fn status_url(base: &Url) -> Result<Url, FetchError> {
    resolve(base, "status.json")
}

/// The metric goes into the query verbatim: `/counterdata?totals.clients`
fn series_url(base: &Url, metric: &str) -> Result<Url, FetchError> {
    let mut url = resolve(base, "counterdata")?;
    url.set_query(Some(metric));
    Ok(url)
}

fn resolve(base: &Url, path: &str) -> Result<Url, FetchError> {
    base.join(path)
        .map_err(|e| FetchError::Network(format!("invalid URL {path:?}: {e}")))
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::RequestTimeout
    } else if let Some(status) = error.status() {
        FetchError::Server(status.as_u16())
    } else if error.is_decode() || error.is_body() {
        FetchError::InvalidBody(error.to_string())
    } else {
        FetchError::Network(error.to_string())
    }
}
