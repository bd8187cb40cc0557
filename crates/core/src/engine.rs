//! Browser automation seam.
//!
//! The orchestrator and the fetcher only ever talk to a [`BrowserEngine`],
//! which launches isolated browsing contexts, each exposed as one
//! [`BrowserPage`]. `mph-chromium` provides the DevTools implementation and
//! [`crate::testing::FakeEngine`] a scripted one.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use mph_protocol::Cookie;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;

/// Chromium-family browser to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
	#[default]
	Chromium,
	Chrome,
	Edge,
}

impl fmt::Display for BrowserKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			BrowserKind::Chromium => write!(f, "chromium"),
			BrowserKind::Chrome => write!(f, "chrome"),
			BrowserKind::Edge => write!(f, "edge"),
		}
	}
}

/// Options for one browsing context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
	pub headless: bool,
	/// Phone viewport and user agent.
	pub mobile: bool,
	/// Abort png/jpg/jpeg requests.
	pub block_images: bool,
	/// Engines pick a random desktop agent when unset.
	pub user_agent: Option<String>,
}

impl LaunchOptions {
	pub fn headless(headless: bool) -> Self {
		Self {
			headless,
			..Default::default()
		}
	}
}

/// Launches isolated browsing contexts.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
	async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>>;
}

/// A single page inside its own browsing context.
///
/// Element accessors return `Ok(None)` when nothing matches the selector and
/// reserve `Err` for engine failures.
#[async_trait]
pub trait BrowserPage: Send + Sync {
	async fn goto(&self, url: &str) -> Result<()>;

	async fn reload(&self) -> Result<()>;

	async fn current_url(&self) -> Result<String>;

	/// Waits until `selector` matches a visible element.
	async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

	async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

	/// Rendered text of the first match.
	async fn inner_text(&self, selector: &str) -> Result<Option<String>>;

	async fn inner_html(&self, selector: &str) -> Result<Option<String>>;

	async fn click(&self, selector: &str) -> Result<()>;

	/// Writes a PNG of the first match to `path` and returns the byte count.
	async fn screenshot_element(&self, selector: &str, path: &Path) -> Result<u64>;

	/// Evaluates a JavaScript expression and returns its JSON value.
	async fn evaluate(&self, expression: &str) -> Result<Value>;

	/// Serialized document source.
	async fn content(&self) -> Result<String>;

	async fn cookies(&self) -> Result<Vec<Cookie>>;

	async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()>;

	async fn clear_cookies(&self) -> Result<()>;

	/// Closes the page, its context and the browser process behind it.
	async fn close(self: Box<Self>) -> Result<()>;
}

/// Owns a launched page and guarantees it gets closed.
///
/// Call [`BrowserScope::release`] on every path that can await. If the scope
/// is dropped instead (early return, panic, cancelled future) the close is
/// spawned onto the current runtime.
pub struct BrowserScope {
	page: Option<Box<dyn BrowserPage>>,
	label: &'static str,
}

impl BrowserScope {
	pub async fn launch(engine: &dyn BrowserEngine, options: &LaunchOptions, label: &'static str) -> Result<Self> {
		let page = engine.launch(options).await?;
		debug!(target = "mph.engine", scope = label, "browsing context opened");
		Ok(Self { page: Some(page), label })
	}

	pub fn page(&self) -> &dyn BrowserPage {
		match &self.page {
			Some(page) => page.as_ref(),
			None => unreachable!("page is only taken by release or drop"),
		}
	}

	/// Hands the page to a longer-lived owner without closing it.
	pub fn into_page(mut self) -> Box<dyn BrowserPage> {
		match self.page.take() {
			Some(page) => page,
			None => unreachable!("page is only taken by release or drop"),
		}
	}

	pub async fn release(mut self) -> Result<()> {
		match self.page.take() {
			Some(page) => {
				let result = page.close().await;
				debug!(target = "mph.engine", scope = self.label, ok = result.is_ok(), "browsing context closed");
				result
			}
			None => Ok(()),
		}
	}
}

impl Drop for BrowserScope {
	fn drop(&mut self) {
		let Some(page) = self.page.take() else {
			return;
		};
		let label = self.label;
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn(async move {
					if let Err(err) = page.close().await {
						warn!(target = "mph.engine", scope = label, error = %err, "deferred context close failed");
					}
				});
			}
			Err(_) => warn!(target = "mph.engine", scope = label, "browsing context dropped outside a runtime and leaked"),
		}
	}
}

/// Reads a string-valued expression, treating `null` and non-strings as absent.
pub async fn evaluate_string(page: &dyn BrowserPage, expression: &str) -> Result<Option<String>> {
	Ok(match page.evaluate(expression).await? {
		Value::String(s) if !s.is_empty() => Some(s),
		_ => None,
	})
}
