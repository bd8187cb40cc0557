//! One browsing context: a dedicated browser process with a single page.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
	self, ClearBrowserCookiesParams, CookieParam, SetBlockedUrLsParams, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, ReloadParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use mph::{BrowserPage, Cookie, HarvestError, LaunchOptions, Result};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::launch::{IMAGE_PATTERNS, MOBILE_VIEWPORT};

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

pub(crate) fn engine_err(err: CdpError) -> HarvestError {
	HarvestError::Engine(err.to_string())
}

/// `document.querySelector(selector)` wrapped so that a missing element
/// evaluates to `null` instead of throwing.
fn query_js(selector: &str, body: &str) -> String {
	let selector = Value::String(selector.to_string());
	format!("(() => {{ const el = document.querySelector({selector}); return el ? {body} : null; }})()")
}

fn visible_js(selector: &str) -> String {
	query_js(
		selector,
		"(() => { const r = el.getBoundingClientRect(); const s = getComputedStyle(el); \
		 return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; })()",
	)
}

pub struct ChromiumPage {
	browser: Browser,
	page: Page,
	handler: JoinHandle<()>,
	profile_dir: PathBuf,
}

impl ChromiumPage {
	pub(crate) fn new(browser: Browser, page: Page, handler: JoinHandle<()>, profile_dir: PathBuf) -> Self {
		Self {
			browser,
			page,
			handler,
			profile_dir,
		}
	}

	/// Applies user agent, viewport and request blocking before first use.
	pub(crate) async fn prepare(&self, options: &LaunchOptions, user_agent: Option<&str>) -> Result<()> {
		if let Some(agent) = user_agent {
			self.page.execute(SetUserAgentOverrideParams::new(agent)).await.map_err(engine_err)?;
		}
		if options.mobile {
			let (width, height) = MOBILE_VIEWPORT;
			self.page
				.execute(SetDeviceMetricsOverrideParams::new(width as i64, height as i64, 3.0, true))
				.await
				.map_err(engine_err)?;
		}
		if options.block_images {
			self.page.execute(network::EnableParams::default()).await.map_err(engine_err)?;
			let urls = IMAGE_PATTERNS.iter().map(|p| p.to_string()).collect::<Vec<_>>();
			self.page.execute(SetBlockedUrLsParams::new(urls)).await.map_err(engine_err)?;
		}
		Ok(())
	}

	async fn query(&self, selector: &str, body: &str) -> Result<Option<String>> {
		let value = self.evaluate(&query_js(selector, body)).await?;
		Ok(match value {
			Value::Null => None,
			Value::String(s) => Some(s),
			other => Some(other.to_string()),
		})
	}

	async fn is_visible(&self, selector: &str) -> Result<bool> {
		Ok(self.evaluate(&visible_js(selector)).await? == Value::Bool(true))
	}
}

#[async_trait]
impl BrowserPage for ChromiumPage {
	async fn goto(&self, url: &str) -> Result<()> {
		self.page.goto(url).await.map_err(|err| HarvestError::navigation(url, err))?;
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		self.page.execute(ReloadParams::default()).await.map_err(engine_err)?;
		self.page.wait_for_navigation().await.map_err(engine_err)?;
		Ok(())
	}

	async fn current_url(&self) -> Result<String> {
		Ok(self.page.url().await.map_err(engine_err)?.unwrap_or_default())
	}

	async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			if self.is_visible(selector).await? {
				return Ok(());
			}
			if tokio::time::Instant::now() >= deadline {
				return Err(HarvestError::element(selector, format!("not visible within {timeout:?}")));
			}
			tokio::time::sleep(VISIBILITY_POLL).await;
		}
	}

	async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
		let name = Value::String(name.to_string());
		self.query(selector, &format!("el.getAttribute({name})")).await
	}

	async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
		self.query(selector, "el.innerText").await
	}

	async fn inner_html(&self, selector: &str) -> Result<Option<String>> {
		self.query(selector, "el.innerHTML").await
	}

	async fn click(&self, selector: &str) -> Result<()> {
		let element = self.page.find_element(selector).await.map_err(|err| HarvestError::element(selector, err))?;
		element.click().await.map_err(|err| HarvestError::element(selector, err))?;
		Ok(())
	}

	async fn screenshot_element(&self, selector: &str, path: &Path) -> Result<u64> {
		let element = self.page.find_element(selector).await.map_err(|err| HarvestError::element(selector, err))?;
		let bytes = element
			.screenshot(CaptureScreenshotFormat::Png)
			.await
			.map_err(|err| HarvestError::element(selector, err))?;
		tokio::fs::write(path, &bytes).await?;
		debug!(target = "mph.engine", selector, path = %path.display(), bytes = bytes.len(), "element screenshot saved");
		Ok(bytes.len() as u64)
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result = self.page.evaluate(expression).await.map_err(engine_err)?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn content(&self) -> Result<String> {
		self.page.content().await.map_err(engine_err)
	}

	async fn cookies(&self) -> Result<Vec<Cookie>> {
		let cookies = self.page.get_cookies().await.map_err(engine_err)?;
		Ok(cookies
			.into_iter()
			.map(|c| Cookie {
				expires: (!c.session && c.expires > 0.0).then_some(c.expires),
				name: c.name,
				value: c.value,
				domain: c.domain,
				path: Some(c.path),
				http_only: c.http_only,
				secure: c.secure,
			})
			.collect())
	}

	async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		let mut params = Vec::with_capacity(cookies.len());
		for cookie in cookies {
			let mut builder = CookieParam::builder()
				.name(cookie.name.clone())
				.value(cookie.value.clone())
				.http_only(cookie.http_only)
				.secure(cookie.secure);
			if !cookie.domain.is_empty() {
				builder = builder.domain(cookie.domain.clone());
			}
			if let Some(path) = &cookie.path {
				builder = builder.path(path.clone());
			}
			if let Some(expires) = cookie.expires {
				builder = builder.expires(TimeSinceEpoch::new(expires));
			}
			params.push(builder.build().map_err(HarvestError::Engine)?);
		}
		self.page.set_cookies(params).await.map_err(engine_err)?;
		Ok(())
	}

	async fn clear_cookies(&self) -> Result<()> {
		self.page.execute(ClearBrowserCookiesParams::default()).await.map_err(engine_err)?;
		Ok(())
	}

	async fn close(self: Box<Self>) -> Result<()> {
		let ChromiumPage {
			mut browser,
			page,
			handler,
			profile_dir,
		} = *self;

		if let Err(err) = page.close().await {
			debug!(target = "mph.engine", error = %err, "page close failed");
		}
		let result = browser.close().await.map(|_| ()).map_err(engine_err);
		if let Err(err) = browser.wait().await {
			debug!(target = "mph.engine", error = %err, "browser wait failed");
		}
		handler.abort();

		if let Err(err) = std::fs::remove_dir_all(&profile_dir) {
			if err.kind() != std::io::ErrorKind::NotFound {
				warn!(target = "mph.engine", path = %profile_dir.display(), error = %err, "failed to remove browser profile");
			}
		}
		result
	}
}
