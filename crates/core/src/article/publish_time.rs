//! Normalisation of the free-form publish time shown on article pages.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone};
use tracing::warn;

type Attempt<Tz> = fn(&str, &DateTime<Tz>) -> Option<i64>;

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y年%m月%d日 %H:%M", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y年%m月%d日"];

/// Parses `raw` in the timezone of `now`, trying each known shape in order.
pub fn parse_publish_time<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<i64> {
	let raw = raw.trim();
	if raw.is_empty() {
		return None;
	}
	let attempts: [Attempt<Tz>; 4] = [rfc3339::<Tz>, date_time::<Tz>, date_only::<Tz>, month_day::<Tz>];
	attempts.iter().find_map(|attempt| attempt(raw, now))
}

/// Like [`parse_publish_time`], falling back to `now` with a warning.
pub fn publish_timestamp<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> i64 {
	parse_publish_time(raw, now).unwrap_or_else(|| {
		warn!(target = "mph.fetch", raw, "unrecognised publish time, using current time");
		now.timestamp()
	})
}

fn rfc3339<Tz: TimeZone>(raw: &str, _now: &DateTime<Tz>) -> Option<i64> {
	DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.timestamp())
}

fn date_time<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<i64> {
	DATE_TIME_FORMATS
		.iter()
		.find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
		.and_then(|naive| local_timestamp(&now.timezone(), naive))
}

fn date_only<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<i64> {
	DATE_FORMATS
		.iter()
		.find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
		.and_then(|date| local_timestamp(&now.timezone(), date.and_hms_opt(0, 0, 0)?))
}

/// `MM月DD日` belongs to the current year unless that lands after `now`, in
/// which case it is from last year.
fn month_day<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> Option<i64> {
	let tz = now.timezone();
	let in_year = |year: i32| {
		NaiveDate::parse_from_str(&format!("{year}年{raw}"), "%Y年%m月%d日")
			.ok()
			.and_then(|date| local_timestamp(&tz, date.and_hms_opt(0, 0, 0)?))
	};

	let year = now.year();
	match in_year(year) {
		Some(ts) if ts > now.timestamp() => in_year(year - 1),
		Some(ts) => Some(ts),
		// Feb 29 outside a leap year can only be last year's date.
		None => in_year(year - 1),
	}
}

fn local_timestamp<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<i64> {
	tz.from_local_datetime(&naive).earliest().map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
	use chrono::FixedOffset;

	use super::*;

	fn beijing() -> FixedOffset {
		FixedOffset::east_opt(8 * 3600).unwrap()
	}

	fn now() -> DateTime<FixedOffset> {
		beijing().with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
	}

	fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
		beijing().with_ymd_and_hms(y, m, d, h, min, s).unwrap().timestamp()
	}

	#[test]
	fn full_date_time_formats() {
		assert_eq!(parse_publish_time("2024-01-01 12:30:45", &now()), Some(at(2024, 1, 1, 12, 30, 45)));
		assert_eq!(parse_publish_time("2024年03月24日 17:14", &now()), Some(at(2024, 3, 24, 17, 14, 0)));
		assert_eq!(parse_publish_time(" 2024-01-01 12:30 ", &now()), Some(at(2024, 1, 1, 12, 30, 0)));
		assert_eq!(parse_publish_time("2024-01-01T04:30:45Z", &now()), Some(at(2024, 1, 1, 12, 30, 45)));
	}

	#[test]
	fn date_only_formats_are_midnight() {
		assert_eq!(parse_publish_time("2023-07-09", &now()), Some(at(2023, 7, 9, 0, 0, 0)));
		assert_eq!(parse_publish_time("2023年07月09日", &now()), Some(at(2023, 7, 9, 0, 0, 0)));
	}

	#[test]
	fn month_day_uses_current_year_when_not_in_future() {
		assert_eq!(parse_publish_time("02月10日", &now()), Some(at(2024, 2, 10, 0, 0, 0)));
		assert_eq!(parse_publish_time("03月01日", &now()), Some(at(2024, 3, 1, 0, 0, 0)));
	}

	#[test]
	fn month_day_after_now_rolls_back_a_year() {
		assert_eq!(parse_publish_time("12月25日", &now()), Some(at(2023, 12, 25, 0, 0, 0)));
	}

	#[test]
	fn next_day_is_last_year() {
		let now = beijing().with_ymd_and_hms(2024, 3, 23, 12, 0, 0).unwrap();
		assert_eq!(parse_publish_time("03月24日", &now), Some(at(2023, 3, 24, 0, 0, 0)));
		assert_eq!(parse_publish_time("03月23日", &now), Some(at(2024, 3, 23, 0, 0, 0)));
	}

	#[test]
	fn leap_day_outside_leap_year_is_last_leap_year() {
		let now = beijing().with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
		assert_eq!(parse_publish_time("02月29日", &now), Some(at(2024, 2, 29, 0, 0, 0)));
	}

	#[test]
	fn unparseable_falls_back_to_now() {
		assert_eq!(parse_publish_time("yesterday", &now()), None);
		assert_eq!(parse_publish_time("", &now()), None);
		assert_eq!(publish_timestamp("yesterday", &now()), now().timestamp());
	}
}
