//! Reading the authenticated session out of a logged-in page.

use mph_protocol::{AccountProfile, SessionRecord, cookie_header};
use tracing::debug;
use url::Url;

use crate::config::{ProfileSelectors, SessionConfig};
use crate::cookies::{find_token_cookie, session_expiry};
use crate::engine::{BrowserPage, evaluate_string};
use crate::error::Result;

const LOCAL_STORAGE_TOKEN: &str = "window.localStorage ? localStorage.getItem('token') : null";
const SESSION_STORAGE_TOKEN: &str = "window.sessionStorage ? sessionStorage.getItem('token') : null";

/// Captures token, cookies, expiry and account profile from `page`.
///
/// The token is looked up in the URL query, local storage, session storage and
/// finally any cookie named like `token`; `previous_token` is kept when all of
/// those come up empty.
pub(crate) async fn capture_session(page: &dyn BrowserPage, config: &SessionConfig, previous_token: Option<&str>, now: i64) -> Result<SessionRecord> {
	let url = page.current_url().await?;
	let cookies = page.cookies().await?;

	let mut token = token_from_url(&url);
	if token.is_none() {
		token = storage_token(page, LOCAL_STORAGE_TOKEN).await;
	}
	if token.is_none() {
		token = storage_token(page, SESSION_STORAGE_TOKEN).await;
	}
	let token = token
		.or_else(|| find_token_cookie(&cookies).map(str::to_string))
		.or_else(|| previous_token.map(str::to_string))
		.unwrap_or_default();

	let expiry = session_expiry(&cookies, &config.critical_cookies, now);
	let profile = read_profile(page, &config.profile).await;
	debug!(
		target = "mph.session",
		cookies = cookies.len(),
		has_token = !token.is_empty(),
		has_expiry = expiry.is_some(),
		"session captured"
	);

	Ok(SessionRecord {
		token,
		cookie_header: cookie_header(&cookies),
		cookies,
		expiry,
		ext: (!profile.is_empty()).then_some(profile),
	})
}

pub(crate) fn token_from_url(url: &str) -> Option<String> {
	let parsed = Url::parse(url).ok()?;
	parsed
		.query_pairs()
		.find(|(key, value)| key == "token" && !value.is_empty())
		.map(|(_, value)| value.into_owned())
}

async fn storage_token(page: &dyn BrowserPage, expression: &str) -> Option<String> {
	match evaluate_string(page, expression).await {
		Ok(value) => value,
		Err(err) => {
			debug!(target = "mph.session", error = %err, "storage token lookup failed");
			None
		}
	}
}

async fn read_profile(page: &dyn BrowserPage, selectors: &ProfileSelectors) -> AccountProfile {
	let text = |selector: &str| {
		let selector = selector.to_string();
		async move { page.inner_text(&selector).await.ok().flatten().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) }
	};

	AccountProfile {
		name: text(&selectors.name).await,
		logo: page.attribute(&selectors.logo, "src").await.ok().flatten().filter(|s| !s.is_empty()),
		read_yesterday: text(&selectors.read_yesterday).await,
		share_yesterday: text(&selectors.share_yesterday).await,
		watch_yesterday: text(&selectors.watch_yesterday).await,
		original_count: text(&selectors.original_count).await,
		user_count: text(&selectors.user_count).await,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_comes_from_query() {
		assert_eq!(
			token_from_url("https://mp.weixin.qq.com/cgi-bin/home?t=home/index&lang=zh_CN&token=1029384756").as_deref(),
			Some("1029384756")
		);
		assert_eq!(token_from_url("https://mp.weixin.qq.com/cgi-bin/home?token="), None);
		assert_eq!(token_from_url("not a url"), None);
	}
}
