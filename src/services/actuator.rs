//! Appliance switching via the Telldus Live HTTP API or a local mock

use crate::domain::clock::epoch_ms;
use crate::domain::types::ActuatorCommand;
use crate::infra::config::{ActuatorConfig, ActuatorMode};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Something that can switch the controlled appliance on or off
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn switch(&self, command: ActuatorCommand) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

/// Build the actuator selected by `actuator.mode`
pub fn build_actuator(config: &ActuatorConfig) -> anyhow::Result<Arc<dyn Actuator>> {
    match config.mode {
        ActuatorMode::Http => Ok(Arc::new(TelldusActuator::new(config)?)),
        ActuatorMode::Mock => Ok(Arc::new(MockActuator::new())),
    }
}

/// Telldus Live outlet switched with OAuth 1.0 PLAINTEXT signed GETs
pub struct TelldusActuator {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
    public_key: String,
    private_key: String,
    token: String,
    token_secret: String,
}

impl TelldusActuator {
    pub fn new(config: &ActuatorConfig) -> anyhow::Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build actuator HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            device_id: config.device_id.clone(),
            public_key: config.public_key.clone(),
            private_key: config.private_key.clone(),
            token: config.token.clone(),
            token_secret: config.token_secret.clone(),
        })
    }

    fn endpoint(&self, command: ActuatorCommand) -> String {
        let method = match command {
            ActuatorCommand::On => "turnOn",
            ActuatorCommand::Off => "turnOff",
        };
        format!("{}/device/{}", self.base_url, method)
    }

    /// Signed GET for `command`; the device id goes in the encoded query
    fn request(
        &self,
        command: ActuatorCommand,
        nonce: &str,
        timestamp_secs: u64,
    ) -> reqwest::RequestBuilder {
        self.client
            .get(self.endpoint(command))
            .query(&[("id", self.device_id.as_str())])
            .header("Authorization", self.authorization(nonce, timestamp_secs))
            .header("Accept", "application/json")
    }

    /// OAuth header value; the nonce must differ on every request
    fn authorization(&self, nonce: &str, timestamp_secs: u64) -> String {
        format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_nonce=\"{}\", oauth_signature=\"{}%26{}\", \
             oauth_signature_method=\"PLAINTEXT\", oauth_timestamp=\"{}\", oauth_token=\"{}\", \
             oauth_version=\"1.0\"",
            self.public_key, nonce, self.private_key, self.token_secret, timestamp_secs, self.token
        )
    }
}

#[async_trait]
impl Actuator for TelldusActuator {
    async fn switch(&self, command: ActuatorCommand) -> anyhow::Result<()> {
        let nonce = uuid::Uuid::now_v7().simple().to_string();
        let response = self
            .request(command, &nonce, epoch_ms() / 1000)
            .send()
            .await
            .with_context(|| format!("actuator request for {} failed", command.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("actuator returned HTTP {} for {}", status.as_u16(), command.as_str());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telldus"
    }
}

/// Logs commands and acknowledges them locally
///
/// Records every command it receives; can be told to fail for tests.
#[derive(Default)]
pub struct MockActuator {
    received: parking_lot::Mutex<Vec<ActuatorCommand>>,
    fail: AtomicBool,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `switch` calls fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn received(&self) -> Vec<ActuatorCommand> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn switch(&self, command: ActuatorCommand) -> anyhow::Result<()> {
        self.received.lock().push(command);
        if self.fail.load(Ordering::Relaxed) {
            anyhow::bail!("mock actuator failure");
        }
        info!(command = %command.as_str(), mock = true, "actuator_switched");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
