//! Contains the HTTP target requested by every iteration.

use std::time::Duration;

use reqwest::StatusCode;

/// Something an iteration can issue a single request against.
#[async_trait::async_trait]
pub trait Target: Send + Sync + 'static {
    /// Issues one request and returns the response status.
    async fn get(&self) -> anyhow::Result<StatusCode>;
}

/// A target that sends `GET` requests to a fixed URL.
#[derive(Debug)]
pub struct HttpTarget {
    url: String,
    client: reqwest::Client,
}

impl HttpTarget {
    /// Creates a new `HttpTarget` for the given URL.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("bucketsync-loadtest/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url: url.into(),
            client: builder.build()?,
        })
    }
}

#[async_trait::async_trait]
impl Target for HttpTarget {
    async fn get(&self) -> anyhow::Result<StatusCode> {
        let response = self.client.get(&self.url).send().await?;
        Ok(response.status())
    }
}
