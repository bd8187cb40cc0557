//! Identifiers derived from article URLs and page source.

use std::sync::LazyLock;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;

/// Namespace prefix for account ids derived from the biz token.
pub const MP_ID_PREFIX: &str = "MP_WXS_";

/// Links and page source carry base64 both with and without `=` padding.
const ANY_PADDING: GeneralPurposeConfig = GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const URL_SAFE_ANY_PADDING: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, ANY_PADDING);
const STANDARD_ANY_PADDING: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, ANY_PADDING);

static SHORT_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/s/([A-Za-z0-9_-]+)").expect("short id regex should compile"));

static BIZ_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
	[
		Regex::new(r"[?&]__biz=([^&#]+)").expect("url biz regex should compile"),
		Regex::new(r#"var biz = "([^"]+)""#).expect("source biz regex should compile"),
		Regex::new(r#"window\.__biz=([^&"'\s;]+)"#).expect("window biz regex should compile"),
	]
});

/// Article id from a `/s/<segment>` URL.
///
/// The segment is unpadded URL-safe base64 of the internal id. When it does
/// not decode to UTF-8 the segment itself is the id; URLs without a segment
/// yield an empty id.
pub fn article_id_from_url(url: &str) -> String {
	let Some(segment) = SHORT_ID.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str()) else {
		return String::new();
	};
	URL_SAFE_ANY_PADDING
		.decode(segment)
		.ok()
		.and_then(|bytes| String::from_utf8(bytes).ok())
		.unwrap_or_else(|| segment.to_string())
}

/// Biz token from the article URL, falling back to the page source.
///
/// The token is percent-decoded but left base64 encoded.
pub fn extract_biz(url: &str, page_source: Option<&str>) -> Option<String> {
	let (url_pattern, source_patterns) = BIZ_PATTERNS.split_first()?;
	let raw = url_pattern
		.captures(url)
		.or_else(|| page_source.and_then(|src| source_patterns.iter().find_map(|re| re.captures(src))))?
		.get(1)?
		.as_str();
	let decoded = urlencoding::decode(raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.to_string());
	let decoded = decoded.trim().to_string();
	(!decoded.is_empty()).then_some(decoded)
}

/// `MP_WXS_<decoded biz>`, or `None` when the token is not base64 text.
pub fn mp_id_from_biz(biz: &str) -> Option<String> {
	let bytes = STANDARD_ANY_PADDING.decode(biz.trim()).ok()?;
	let inner = String::from_utf8(bytes).ok()?;
	(!inner.is_empty()).then(|| format!("{MP_ID_PREFIX}{inner}"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_id_decodes_without_padding() {
		// "3891625763" encodes to Mzg5MTYyNTc2Mw== and appears unpadded in links.
		assert_eq!(article_id_from_url("https://mp.weixin.qq.com/s/Mzg5MTYyNTc2Mw"), "3891625763");
		assert_eq!(article_id_from_url("https://mp.weixin.qq.com/s/MzE?scene=1"), "31");
	}

	#[test]
	fn undecodable_segment_is_returned_raw() {
		assert_eq!(article_id_from_url("https://mp.weixin.qq.com/s/qfe2F6Dcw-uPXW_XW7UAIg"), "qfe2F6Dcw-uPXW_XW7UAIg");
		assert_eq!(article_id_from_url("https://mp.weixin.qq.com/s/a"), "a");
	}

	#[test]
	fn url_without_segment_has_empty_id() {
		assert_eq!(article_id_from_url("https://mp.weixin.qq.com/s?__biz=MzA&mid=1"), "");
		assert_eq!(article_id_from_url(""), "");
	}

	#[test]
	fn biz_prefers_url_then_source() {
		let url = "https://mp.weixin.qq.com/s?__biz=MzA5NjM%3D&mid=2";
		assert_eq!(extract_biz(url, Some(r#"var biz = "other""#)).as_deref(), Some("MzA5NjM="));

		let source = r#"<script>var biz = "MzI1NjA=" || "";</script>"#;
		assert_eq!(extract_biz("https://mp.weixin.qq.com/s/abc", Some(source)).as_deref(), Some("MzI1NjA="));

		let legacy = r#"<script>window.__biz=MzkwMQ==&amp;x=1</script>"#;
		assert_eq!(extract_biz("https://mp.weixin.qq.com/s/abc", Some(legacy)).as_deref(), Some("MzkwMQ=="));

		assert_eq!(extract_biz("https://mp.weixin.qq.com/s/abc", None), None);
	}

	#[test]
	fn mp_id_wraps_decoded_biz() {
		assert_eq!(mp_id_from_biz("MzA5NjM=").as_deref(), Some("MP_WXS_30963"));
		assert_eq!(mp_id_from_biz("not base64!"), None);
	}

	#[test]
	fn mp_id_accepts_unpadded_biz() {
		assert_eq!(mp_id_from_biz("MzE").as_deref(), Some("MP_WXS_31"));
		assert_eq!(mp_id_from_biz("MzA5NjM").as_deref(), Some("MP_WXS_30963"));
		assert_eq!(mp_id_from_biz("a"), None);
	}
}
