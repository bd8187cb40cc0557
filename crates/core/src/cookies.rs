//! Session expiry derived from the captured cookie set.

use chrono::{Local, TimeZone};
use mph_protocol::{Cookie, Expiry};

pub use mph_protocol::cookie_header;

/// Cookie that must outlive the session, absent any configuration.
pub const DEFAULT_CRITICAL_COOKIE: &str = "slave_sid";

/// Computes the session expiry from `cookies`.
///
/// Every name in `critical` must be present with a positive expiry, otherwise
/// the session is treated as not established. The earliest expiry wins.
pub fn session_expiry<S: AsRef<str>>(cookies: &[Cookie], critical: &[S], now: i64) -> Option<Expiry> {
	let mut earliest: Option<i64> = None;
	for name in critical {
		let ts = cookies.iter().filter(|c| c.name == name.as_ref()).filter_map(Cookie::expiry_secs).max()?;
		earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
	}
	earliest.map(|ts| expiry_at(ts, now))
}

/// Builds an [`Expiry`] for `timestamp` rendered in the local timezone.
pub fn expiry_at(timestamp: i64, now: i64) -> Expiry {
	Expiry {
		expiry_timestamp: timestamp,
		expiry_time: format_local(timestamp),
		remaining_seconds: timestamp - now,
	}
}

fn format_local(timestamp: i64) -> String {
	Local
		.timestamp_opt(timestamp, 0)
		.single()
		.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
		.unwrap_or_default()
}

/// First cookie whose name contains `token`, case-insensitively.
pub fn find_token_cookie(cookies: &[Cookie]) -> Option<&str> {
	cookies
		.iter()
		.find(|c| c.name.to_ascii_lowercase().contains("token") && !c.value.is_empty())
		.map(|c| c.value.as_str())
}

#[cfg(test)]
mod tests {
	use super::*;

	const NOW: i64 = 1_700_000_000;

	#[test]
	fn missing_critical_cookie_means_no_session() {
		let cookies = vec![Cookie::new("data_ticket", "x").with_expires((NOW + 100) as f64)];
		assert_eq!(session_expiry(&cookies, &[DEFAULT_CRITICAL_COOKIE], NOW), None);
	}

	#[test]
	fn session_scoped_critical_cookie_means_no_session() {
		let cookies = vec![Cookie::new("slave_sid", "x").with_expires(-1.0)];
		assert_eq!(session_expiry(&cookies, &["slave_sid"], NOW), None);
	}

	#[test]
	fn earliest_critical_expiry_wins() {
		let cookies = vec![
			Cookie::new("slave_sid", "a").with_expires((NOW + 500) as f64),
			Cookie::new("slave_user", "b").with_expires((NOW + 200) as f64),
			Cookie::new("unrelated", "c").with_expires((NOW + 10) as f64),
		];
		let expiry = session_expiry(&cookies, &["slave_sid", "slave_user"], NOW).unwrap();
		assert_eq!(expiry.expiry_timestamp, NOW + 200);
		assert_eq!(expiry.remaining_seconds, 200);
		assert_eq!(expiry.expiry_time.len(), "YYYY-MM-DD HH:MM:SS".len());
	}

	#[test]
	fn past_expiry_reports_negative_remaining() {
		let cookies = vec![Cookie::new("slave_sid", "a").with_expires((NOW - 60) as f64)];
		let expiry = session_expiry(&cookies, &["slave_sid"], NOW).unwrap();
		assert_eq!(expiry.remaining_seconds, -60);
	}

	#[test]
	fn token_cookie_lookup_is_case_insensitive() {
		let cookies = vec![Cookie::new("slave_sid", "a"), Cookie::new("mp_Token", ""), Cookie::new("XToken", "42")];
		assert_eq!(find_token_cookie(&cookies), Some("42"));
		assert_eq!(find_token_cookie(&cookies[..1]), None);
	}
}
