use eyre::{eyre, Result};
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;

/// Pings an uptime-monitor URL after each completed submission attempt
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// The URL to GET
    url: String,
    /// The HTTP client
    client: Client,
}

impl HealthCheck {
    /// Create a health check for `url`
    ///
    /// # Errors
    /// * If the HTTP client cannot be built
    pub fn new(url: impl Into<String>) -> Result<Self> {
        // Create a client with a timeout
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Health check from an optional URL; empty means disabled
    ///
    /// # Errors
    /// * If the HTTP client cannot be built
    pub fn from_url(url: Option<&str>) -> Result<Option<Self>> {
        url.filter(|url| !url.is_empty()).map(Self::new).transpose()
    }

    /// The pinged URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one ping
    ///
    /// # Errors
    /// * If the request fails or the monitor answers with an error status
    pub async fn send(&self) -> Result<()> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(eyre!("Health check returned {}", response.status()));
        }
        debug!("healthcheck: pinged {}", self.url);
        Ok(())
    }

    /// Send one ping, logging instead of failing
    pub async fn ping(&self) {
        if let Err(e) = self.send().await {
            warn!("healthcheck: {e}");
        }
    }
}
