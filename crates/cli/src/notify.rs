//! Notification sinks available from the command line.

use std::time::Duration;

use async_trait::async_trait;
use mph::NotificationSink;
use serde_json::json;
use tracing::{info, warn};

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
	async fn send(&self, message: &str, title: &str) {
		info!(target = "mph.notify", title, message, "notification");
	}
}

/// Posts markdown messages to a chat webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
	client: reqwest::Client,
	url: String,
}

impl WebhookNotifier {
	pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
		let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
		Ok(Self { client, url: url.into() })
	}
}

pub(crate) fn markdown_payload(message: &str, title: &str) -> serde_json::Value {
	json!({
		"msgtype": "markdown",
		"markdown": {
			"title": title,
			"text": format!("### {title}\n{message}"),
		},
	})
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
	async fn send(&self, message: &str, title: &str) {
		let result = self
			.client
			.post(&self.url)
			.json(&markdown_payload(message, title))
			.send()
			.await
			.and_then(|response| response.error_for_status());
		match result {
			Ok(_) => info!(target = "mph.notify", title, "webhook notification delivered"),
			Err(err) => warn!(target = "mph.notify", title, error = %err, "webhook notification failed"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn payload_is_markdown_message() {
		let payload = markdown_payload("- Token: 1\n", "Login succeeded");
		assert_eq!(payload["msgtype"], "markdown");
		assert_eq!(payload["markdown"]["title"], "Login succeeded");
		assert_eq!(payload["markdown"]["text"], "### Login succeeded\n- Token: 1\n");
	}
}
