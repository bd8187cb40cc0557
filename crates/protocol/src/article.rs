//! Extracted article record handed to the article store.

use serde::{Deserialize, Serialize};

/// Publishing account an article belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
	pub name: String,
	pub logo: String,
	/// Platform-internal account token, still base64 encoded.
	pub biz: String,
}

/// A fetched and cleaned article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
	pub id: String,
	pub url: String,
	pub title: String,
	pub author: String,
	/// Unix seconds.
	pub publish_time: i64,
	/// Sanitized HTML.
	pub content: String,
	pub images: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pic_url: Option<String>,
	pub account: AccountRef,
	/// Stable external account id, `MP_WXS_<decoded biz>`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mp_id: Option<String>,
}

impl Article {
	/// Copy of the article without its HTML body, for log lines.
	pub fn summary(&self) -> serde_json::Value {
		serde_json::json!({
			"id": self.id,
			"title": self.title,
			"author": self.author,
			"publishTime": self.publish_time,
			"images": self.images.len(),
			"mpId": self.mp_id,
		})
	}
}
