use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use crate::config::WebhookConfig;
use super::{Alert, AnomalySink};

/// Posts anomaly alerts as JSON to an HTTP endpoint
pub struct WebhookSink {
    url: String,
    headers: std::collections::HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            anyhow::bail!("webhook url is empty");
        }
        Ok(Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl AnomalySink for WebhookSink {
    fn name(&self) -> &str { "webhook" }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let payload = json!({
            "instance": &alert.instance,
            "device_id": &alert.device_id,
            "severity": alert.severity.to_string(),
            "value": alert.value,
            "rolling_average": alert.mean,
            "std_dev": alert.std_dev,
            "z_score": alert.z_score,
            "message": &alert.message,
            "timestamp": alert.timestamp.to_rfc3339(),
        });

        let mut req = self.client.post(&self.url).json(&payload);
        for (k, v) in &self.headers {
            req = req.header(k, v);
        }

        req.send().await?.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url() {
        let config = WebhookConfig {
            enabled: true,
            url: String::new(),
            headers: Default::default(),
        };
        assert!(WebhookSink::new(&config).is_err());
    }
}
