//! HTTP health probe.
//!
//! # Responsibilities
//! - GET the service's health URL with a deadline
//! - Report 2xx as healthy, anything else as unhealthy

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time;
use url::Url;

use super::check::HealthCheck;
use crate::error::ProviderError;

const USER_AGENT: &str = "provider-shield-health-check";

pub struct HttpProbe {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl HealthCheck for HttpProbe {
    fn check(&self) -> BoxFuture<'static, Result<bool, ProviderError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let response = match time::timeout(timeout, client.get(url.clone()).send()).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(url = %url, "Health check failed: timeout");
                    return Err(ProviderError::timeout(format!(
                        "no response from {} within {:?}",
                        url, timeout
                    )));
                }
            };

            let healthy = response.status().is_success();
            if !healthy {
                tracing::warn!(
                    url = %url,
                    status = %response.status(),
                    "Health check failed: non-success status"
                );
            }
            Ok(healthy)
        })
    }
}
