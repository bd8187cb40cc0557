//! Per-field extraction from a loaded article page.
//!
//! Fields are read independently. A failing field is logged at debug level and
//! left empty; it never aborts the others.

use chrono::{DateTime, TimeZone};
use mph_protocol::{AccountRef, Article};
use tracing::debug;

use super::ident::{article_id_from_url, extract_biz, mp_id_from_biz};
use super::publish_time::publish_timestamp;
use crate::engine::{BrowserPage, evaluate_string};
use crate::error::Result;
use crate::sanitize::{ContentSanitizer, image_urls};

pub const TITLE_META: &str = r#"meta[property="og:title"]"#;
pub const AUTHOR: &str = "#meta_content .rich_media_meta_text";
pub const PUBLISH_TIME: &str = "#publish_time";
pub const PRIMARY_CONTENT: &str = "#js_content";
pub const GALLERY_CONTENT: &str = "#js_article";
pub const ACCOUNT_NAME: &str = "#js_wx_follow_nickname";
pub const ACCOUNT_LOGO: &str = "#js_like_profile_bar .wx_follow_avatar img";

pub const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

/// Builds an [`Article`] from the page currently showing `url`.
pub async fn extract_article<Tz: TimeZone>(page: &dyn BrowserPage, url: &str, sanitizer: &ContentSanitizer, now: &DateTime<Tz>) -> Article {
	let title = match field("title", page.attribute(TITLE_META, "content").await) {
		Some(title) => title,
		None => field("title", evaluate_string(page, "document.title").await).unwrap_or_default(),
	};
	let author = field("author", page.inner_text(AUTHOR).await).unwrap_or_default();
	let raw_time = field("publish_time", page.inner_text(PUBLISH_TIME).await).unwrap_or_default();
	let primary = field("content", page.inner_html(PRIMARY_CONTENT).await);
	let gallery = field("gallery", page.inner_html(GALLERY_CONTENT).await);

	let images = gallery.as_deref().map(image_urls).unwrap_or_default();
	let content = gallery.or(primary).map(|html| sanitizer.sanitize(&html)).unwrap_or_default();

	let account = extract_account(page, url).await;
	let mp_id = mp_id_from_biz(&account.biz);

	Article {
		id: article_id_from_url(url),
		url: url.to_string(),
		title,
		author,
		publish_time: publish_timestamp(&raw_time, now),
		content,
		pic_url: images.first().cloned(),
		images,
		account,
		mp_id,
	}
}

async fn extract_account(page: &dyn BrowserPage, url: &str) -> AccountRef {
	let name = field("account.name", page.inner_text(ACCOUNT_NAME).await).unwrap_or_default();
	let logo = field("account.logo", page.attribute(ACCOUNT_LOGO, "src").await).unwrap_or_default();
	let biz = match extract_biz(url, None) {
		Some(biz) => biz,
		None => {
			let source = field("page_source", page.content().await.map(Some));
			extract_biz(url, source.as_deref()).unwrap_or_default()
		}
	};
	AccountRef { name, logo, biz }
}

/// Trimmed non-empty value, logging and swallowing engine errors.
fn field(name: &'static str, result: Result<Option<String>>) -> Option<String> {
	match result {
		Ok(value) => value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()),
		Err(err) => {
			debug!(target = "mph.fetch", field = name, error = %err, "field extraction failed");
			None
		}
	}
}
