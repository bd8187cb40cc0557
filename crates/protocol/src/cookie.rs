//! Browser cookie as captured from, and injected into, a browsing context.

use serde::{Deserialize, Serialize};

/// A single browser cookie.
///
/// `expires` is seconds since the Unix epoch. Browsers report session cookies
/// with `-1`, so any value `<= 0` is treated as "no expiry".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: String::new(),
			path: None,
			expires: None,
			http_only: false,
			secure: false,
		}
	}

	pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = domain.into();
		self
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn with_expires(mut self, expires: f64) -> Self {
		self.expires = Some(expires);
		self
	}

	/// Expiry in whole unix seconds, or `None` for session cookies.
	pub fn expiry_secs(&self) -> Option<i64> {
		self.expires.filter(|ts| *ts > 0.0).map(|ts| ts.floor() as i64)
	}
}

/// Renders cookies as a request-header style string: `a=1; b=2; `.
///
/// The trailing separator is kept because the persisted credential file has
/// always stored the header in this form.
pub fn cookie_header(cookies: &[Cookie]) -> String {
	cookies.iter().map(|c| format!("{}={}; ", c.name, c.value)).collect()
}

/// Parses a `name=value; name2=value2` string back into domain-less cookies.
///
/// Malformed pairs are skipped.
pub fn parse_cookie_header(header: &str) -> Vec<Cookie> {
	header
		.split(';')
		.filter_map(|pair| {
			let (name, value) = pair.trim().split_once('=')?;
			let name = name.trim();
			if name.is_empty() {
				return None;
			}
			Some(Cookie::new(name, value.trim()))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_cookies_have_no_expiry() {
		assert_eq!(Cookie::new("a", "1").with_expires(-1.0).expiry_secs(), None);
		assert_eq!(Cookie::new("a", "1").expiry_secs(), None);
		assert_eq!(Cookie::new("a", "1").with_expires(1_700_000_000.7).expiry_secs(), Some(1_700_000_000));
	}

	#[test]
	fn header_keeps_order_and_trailing_separator() {
		let cookies = vec![Cookie::new("slave_sid", "abc"), Cookie::new("token", "42")];
		assert_eq!(cookie_header(&cookies), "slave_sid=abc; token=42; ");
	}

	#[test]
	fn header_parse_skips_malformed_pairs() {
		let parsed = parse_cookie_header("a=1; broken; =x; b = 2 ; ");
		let names: Vec<_> = parsed.iter().map(|c| (c.name.as_str(), c.value.as_str())).collect();
		assert_eq!(names, vec![("a", "1"), ("b", "2")]);
	}

	#[test]
	fn deserializes_browser_shape() {
		let cookie: Cookie = serde_json::from_str(
			r#"{"name":"slave_sid","value":"v","domain":".mp.weixin.qq.com","path":"/","expires":1735689600.5,"httpOnly":true,"secure":true}"#,
		)
		.unwrap();
		assert!(cookie.http_only);
		assert_eq!(cookie.path.as_deref(), Some("/"));
		assert_eq!(cookie.expiry_secs(), Some(1_735_689_600));
	}
}
