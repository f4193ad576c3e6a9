//! Client and harness configuration.

use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sqs::config::Credentials;
use serde::{Deserialize, Serialize};

/// Environment variable holding the service endpoint, e.g.
/// `http://localhost:4566` for LocalStack.
pub const ENDPOINT_ENV: &str = "SQS_ENDPOINT_URL";

/// Region used when neither the config nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// How to reach the queue service.
///
/// All fields are optional; unset fields fall back to the SDK's default
/// provider chains (environment, profile, instance metadata).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Service endpoint, e.g. a LocalStack URL
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    /// Static credentials replacing the default provider chain
    pub credentials: Option<Credentials>,
}

impl ClientConfig {
    /// Reads the endpoint from [`ENDPOINT_ENV`]. Everything else comes from
    /// the SDK defaults.
    pub fn from_env() -> Self {
        let endpoint_url = std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());

        Self {
            endpoint_url,
            ..Self::default()
        }
    }

    /// Configuration for a LocalStack endpoint with its static test
    /// credentials.
    pub fn local(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(endpoint_url.into()),
            region: Some(DEFAULT_REGION.to_string()),
            credentials: Some(Credentials::new("test", "test", None, None, "static")),
        }
    }

    /// Overrides the region, which otherwise comes from the environment or
    /// falls back to [`DEFAULT_REGION`].
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Builds an SDK config loader from the set fields.
    ///
    /// # Returns
    ///
    /// A loader that can still be customised before calling `load`
    pub fn loader(&self) -> aws_config::ConfigLoader {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        loader = match &self.region {
            Some(region) => loader.region(Region::new(region.clone())),
            None => loader.region(
                // supports loading region from known env variables
                RegionProviderChain::default_provider().or_else(Region::from_static(DEFAULT_REGION)),
            ),
        };

        if let Some(endpoint_url) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        if let Some(credentials) = &self.credentials {
            loader = loader.credentials_provider(credentials.clone());
        }

        loader
    }

    /// Resolves the full SDK configuration, consulting provider chains for
    /// anything not set here.
    pub async fn load(&self) -> SdkConfig {
        self.loader().load().await
    }
}

/// Polling parameters of the drain-and-verify harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Messages requested per receive call (1 to 10).
    pub max_messages: i32,
    /// Long-poll wait per receive call, in seconds.
    pub wait_time_seconds: u64,
    /// Non-empty receive rounds a drain or collect may take. The receive
    /// that finds the queue empty does not count; a queue still delivering
    /// after this many rounds fails the harness.
    pub max_rounds: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time_seconds: 1,
            max_rounds: 100,
        }
    }
}

impl HarnessConfig {
    /// [`Self::wait_time_seconds`] as a [`Duration`].
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }
}
