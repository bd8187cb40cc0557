//! Outbound notification seam.

use async_trait::async_trait;
use mph_protocol::SessionRecord;

/// Fire-and-forget message delivery. Implementations log their own failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
	async fn send(&self, message: &str, title: &str);
}

/// Sink that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
	async fn send(&self, _message: &str, _title: &str) {}
}

/// Markdown body announcing a completed login.
pub fn login_message(record: &SessionRecord) -> String {
	let expiry = record.expiry.as_ref().map(|e| e.expiry_time.as_str()).unwrap_or("unknown");
	let mut message = format!("Login succeeded\n- Token: {}\n- Expiry: {}\n", record.token, expiry);
	if let Some(name) = record.ext.as_ref().and_then(|p| p.name.as_deref()) {
		message.push_str(&format!("- Account: {name}\n"));
	}
	message
}

#[cfg(test)]
mod tests {
	use mph_protocol::{AccountProfile, Expiry};

	use super::*;

	#[test]
	fn login_message_carries_token_and_expiry() {
		let record = SessionRecord {
			token: "778899".into(),
			expiry: Some(Expiry {
				expiry_timestamp: 0,
				expiry_time: "2030-01-02 03:04:05".into(),
				remaining_seconds: 0,
			}),
			ext: Some(AccountProfile {
				name: Some("Daily".into()),
				..Default::default()
			}),
			..Default::default()
		};
		let message = login_message(&record);
		assert!(message.contains("- Token: 778899"));
		assert!(message.contains("- Expiry: 2030-01-02 03:04:05"));
		assert!(message.ends_with("- Account: Daily\n"));
	}
}
