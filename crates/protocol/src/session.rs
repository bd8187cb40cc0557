//! Persisted login session shapes.

use serde::{Deserialize, Serialize};

use crate::cookie::Cookie;

/// Expiry of the session-critical cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Expiry {
	/// Unix seconds.
	pub expiry_timestamp: i64,
	/// Local wall-clock rendering, `YYYY-MM-DD HH:MM:SS`.
	pub expiry_time: String,
	/// Seconds left at the time the expiry was computed; negative when already past.
	pub remaining_seconds: i64,
}

/// Account metadata scraped from the authenticated home page.
///
/// Every field is best-effort; the home page layout changes often.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
	#[serde(default, rename = "wx_app_name")]
	pub name: Option<String>,
	#[serde(default, rename = "wx_logo")]
	pub logo: Option<String>,
	#[serde(default, rename = "wx_read_yesterday")]
	pub read_yesterday: Option<String>,
	#[serde(default, rename = "wx_share_yesterday")]
	pub share_yesterday: Option<String>,
	#[serde(default, rename = "wx_watch_yesterday")]
	pub watch_yesterday: Option<String>,
	#[serde(default, rename = "wx_yuan_count")]
	pub original_count: Option<String>,
	#[serde(default, rename = "wx_user_count")]
	pub user_count: Option<String>,
}

impl AccountProfile {
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

/// Authenticated session captured after a successful handshake or refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
	pub token: String,
	pub cookies: Vec<Cookie>,
	pub cookie_header: String,
	pub expiry: Option<Expiry>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ext: Option<AccountProfile>,
}

impl SessionRecord {
	/// True when the critical cookie expiry exists and lies after `now` (unix seconds).
	pub fn logged_in(&self, now: i64) -> bool {
		self.expiry.as_ref().is_some_and(|e| e.expiry_timestamp > now)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn expiry(ts: i64) -> Expiry {
		Expiry {
			expiry_timestamp: ts,
			expiry_time: String::new(),
			remaining_seconds: 0,
		}
	}

	#[test]
	fn logged_in_requires_future_expiry() {
		let mut record = SessionRecord::default();
		assert!(!record.logged_in(100));

		record.expiry = Some(expiry(100));
		assert!(!record.logged_in(100));
		assert!(record.logged_in(99));
	}

	#[test]
	fn profile_uses_legacy_key_names() {
		let profile = AccountProfile {
			name: Some("Daily".into()),
			..Default::default()
		};
		let json = serde_json::to_value(&profile).unwrap();
		assert_eq!(json["wx_app_name"], "Daily");
		assert!(!profile.is_empty());
		assert!(AccountProfile::default().is_empty());
	}
}
