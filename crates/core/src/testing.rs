//! Scripted browser engine for tests.
//!
//! Documents are registered per URL; a page shows the document whose URL is
//! the longest prefix of its current location. An optional [`LoginScript`]
//! simulates the QR handshake: polling the login page eventually lands on the
//! home page and grants the session cookies.
//!
//! # Example
//!
//! ```ignore
//! let (engine, controller) = FakeEngineBuilder::new()
//!     .document("https://example.com/a", FakeDocument::new().with_body_text("hello"))
//!     .build();
//! let fetcher = ContentFetcher::new(Arc::new(engine), FetchConfig::default(), &BrowserSettings::default())?;
//! fetcher.fetch_one("https://example.com/a").await;
//! assert_eq!(controller.launches(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mph_protocol::Cookie;
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{BrowserEngine, BrowserPage, LaunchOptions};
use crate::error::{HarvestError, Result};

/// One element of a scripted document.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
	pub text: Option<String>,
	pub html: Option<String>,
	pub attributes: HashMap<String, String>,
	/// Clicking moves the page here.
	pub navigates_to: Option<String>,
}

impl FakeElement {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn text(text: impl Into<String>) -> Self {
		Self {
			text: Some(text.into()),
			..Self::default()
		}
	}

	pub fn html(html: impl Into<String>) -> Self {
		Self {
			html: Some(html.into()),
			..Self::default()
		}
	}

	pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	pub fn navigates_to(mut self, url: impl Into<String>) -> Self {
		self.navigates_to = Some(url.into());
		self
	}
}

/// A scripted page.
#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
	pub title: String,
	pub body_text: String,
	pub source: String,
	pub local_storage_token: Option<String>,
	pub session_storage_token: Option<String>,
	pub elements: HashMap<String, FakeElement>,
}

impl FakeDocument {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	pub fn with_body_text(mut self, text: impl Into<String>) -> Self {
		self.body_text = text.into();
		self
	}

	pub fn with_source(mut self, source: impl Into<String>) -> Self {
		self.source = source.into();
		self
	}

	pub fn with_local_storage_token(mut self, token: impl Into<String>) -> Self {
		self.local_storage_token = Some(token.into());
		self
	}

	pub fn with_session_storage_token(mut self, token: impl Into<String>) -> Self {
		self.session_storage_token = Some(token.into());
		self
	}

	pub fn with_element(mut self, selector: impl Into<String>, element: FakeElement) -> Self {
		self.elements.insert(selector.into(), element);
		self
	}
}

/// Simulated QR handshake.
#[derive(Debug, Clone)]
pub struct LoginScript {
	pub login_url: String,
	/// Where a scanned login page lands, usually the home URL with a token.
	pub landing_url: String,
	pub qr_selector: String,
	/// Cookies granted on landing.
	pub cookies: Vec<Cookie>,
	/// Land after this many URL polls. `None` waits for [`FakeController::scan`].
	pub scan_after_polls: Option<usize>,
}

impl LoginScript {
	pub fn new(login_url: impl Into<String>, landing_url: impl Into<String>) -> Self {
		Self {
			login_url: login_url.into(),
			landing_url: landing_url.into(),
			qr_selector: ".login__type__container__scan__qrcode".to_string(),
			cookies: Vec::new(),
			scan_after_polls: Some(1),
		}
	}

	pub fn with_qr_selector(mut self, selector: impl Into<String>) -> Self {
		self.qr_selector = selector.into();
		self
	}

	pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
		self.cookies = cookies;
		self
	}

	pub fn scan_after_polls(mut self, polls: Option<usize>) -> Self {
		self.scan_after_polls = polls;
		self
	}
}

/// Builder for [`FakeEngine`] and its [`FakeController`].
pub struct FakeEngineBuilder {
	documents: HashMap<String, FakeDocument>,
	failing: HashSet<String>,
	login: Option<LoginScript>,
	qr_bytes: u64,
}

impl FakeEngineBuilder {
	pub fn new() -> Self {
		Self {
			documents: HashMap::new(),
			failing: HashSet::new(),
			login: None,
			qr_bytes: 2048,
		}
	}

	pub fn document(mut self, url: impl Into<String>, document: FakeDocument) -> Self {
		self.documents.insert(url.into(), document);
		self
	}

	/// Navigating to `url` fails.
	pub fn failing_url(mut self, url: impl Into<String>) -> Self {
		self.failing.insert(url.into());
		self
	}

	pub fn login(mut self, script: LoginScript) -> Self {
		self.login = Some(script);
		self
	}

	/// Size of every element screenshot.
	pub fn qr_bytes(mut self, bytes: u64) -> Self {
		self.qr_bytes = bytes;
		self
	}

	pub fn build(mut self) -> (FakeEngine, FakeController) {
		if let Some(login) = &self.login {
			let qr = login.qr_selector.clone();
			self.documents
				.entry(login.login_url.clone())
				.or_default()
				.elements
				.entry(qr)
				.or_insert_with(|| FakeElement::new().with_attr("src", "data:image/png;base64,"));
		}

		let shared = Arc::new(Shared {
			documents: self.documents,
			failing: self.failing,
			login: self.login,
			qr_bytes: self.qr_bytes,
			state: Mutex::new(SharedState::default()),
		});
		(
			FakeEngine {
				shared: Arc::clone(&shared),
			},
			FakeController { shared },
		)
	}
}

impl Default for FakeEngineBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct Shared {
	documents: HashMap<String, FakeDocument>,
	failing: HashSet<String>,
	login: Option<LoginScript>,
	qr_bytes: u64,
	state: Mutex<SharedState>,
}

#[derive(Default)]
struct SharedState {
	launches: usize,
	closes: usize,
	reloads: usize,
	scanned: bool,
	expired: bool,
	visited: Vec<String>,
	added_cookies: Vec<Cookie>,
	launch_options: Vec<LaunchOptions>,
}

impl Shared {
	fn document(&self, url: &str) -> Option<&FakeDocument> {
		if let Some(doc) = self.documents.get(url) {
			return Some(doc);
		}
		self.documents
			.iter()
			.filter(|(key, _)| url.starts_with(key.as_str()))
			.max_by_key(|(key, _)| key.len())
			.map(|(_, doc)| doc)
	}
}

/// Inspects and steers a [`FakeEngine`] from the test body.
#[derive(Clone)]
pub struct FakeController {
	shared: Arc<Shared>,
}

impl FakeController {
	/// Marks the QR code as scanned; the next poll lands on the home page.
	pub fn scan(&self) {
		self.shared.state.lock().scanned = true;
	}

	/// Reloading a logged-in page now lands back on the login page, which
	/// stays there.
	pub fn expire_session(&self) {
		self.shared.state.lock().expired = true;
	}

	pub fn launches(&self) -> usize {
		self.shared.state.lock().launches
	}

	pub fn closes(&self) -> usize {
		self.shared.state.lock().closes
	}

	pub fn reloads(&self) -> usize {
		self.shared.state.lock().reloads
	}

	pub fn visited(&self) -> Vec<String> {
		self.shared.state.lock().visited.clone()
	}

	pub fn added_cookies(&self) -> Vec<Cookie> {
		self.shared.state.lock().added_cookies.clone()
	}

	pub fn launch_options(&self) -> Vec<LaunchOptions> {
		self.shared.state.lock().launch_options.clone()
	}
}

/// Scripted [`BrowserEngine`].
pub struct FakeEngine {
	shared: Arc<Shared>,
}

#[async_trait]
impl BrowserEngine for FakeEngine {
	async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
		{
			let mut state = self.shared.state.lock();
			state.launches += 1;
			state.launch_options.push(options.clone());
		}
		Ok(Box::new(FakePage {
			shared: Arc::clone(&self.shared),
			page: Mutex::new(PageState {
				url: "about:blank".to_string(),
				polls: 0,
				cookies: Vec::new(),
			}),
		}))
	}
}

struct PageState {
	url: String,
	polls: usize,
	cookies: Vec<Cookie>,
}

struct FakePage {
	shared: Arc<Shared>,
	page: Mutex<PageState>,
}

impl FakePage {
	fn with_element<T>(&self, selector: &str, f: impl FnOnce(&FakeElement) -> T) -> Option<T> {
		let url = self.page.lock().url.clone();
		self.shared.document(&url).and_then(|doc| doc.elements.get(selector)).map(f)
	}

	fn with_document<T: Default>(&self, f: impl FnOnce(&FakeDocument) -> T) -> T {
		let url = self.page.lock().url.clone();
		self.shared.document(&url).map(f).unwrap_or_default()
	}
}

#[async_trait]
impl BrowserPage for FakePage {
	async fn goto(&self, url: &str) -> Result<()> {
		self.shared.state.lock().visited.push(url.to_string());
		if self.shared.failing.contains(url) {
			return Err(HarvestError::navigation(url, "net::ERR_CONNECTION_RESET"));
		}
		let mut page = self.page.lock();
		page.url = url.to_string();
		page.polls = 0;
		Ok(())
	}

	async fn reload(&self) -> Result<()> {
		let expired = {
			let mut state = self.shared.state.lock();
			state.reloads += 1;
			state.expired
		};
		if expired {
			if let Some(login) = &self.shared.login {
				let mut page = self.page.lock();
				page.url = login.login_url.clone();
				page.cookies.clear();
			}
		}
		Ok(())
	}

	async fn current_url(&self) -> Result<String> {
		let (scanned, expired) = {
			let state = self.shared.state.lock();
			(state.scanned, state.expired)
		};
		let mut page = self.page.lock();
		if let Some(login) = &self.shared.login {
			if page.url == login.login_url && !expired {
				page.polls += 1;
				if scanned || login.scan_after_polls.is_some_and(|n| page.polls >= n) {
					page.url = login.landing_url.clone();
					page.cookies.extend(login.cookies.iter().cloned());
				}
			}
		}
		Ok(page.url.clone())
	}

	async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
		match self.with_element(selector, |_| ()) {
			Some(()) => Ok(()),
			None => Err(HarvestError::element(selector, format!("not visible within {timeout:?}"))),
		}
	}

	async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
		Ok(self.with_element(selector, |el| el.attributes.get(name).cloned()).flatten())
	}

	async fn inner_text(&self, selector: &str) -> Result<Option<String>> {
		Ok(self.with_element(selector, |el| el.text.clone().unwrap_or_default()))
	}

	async fn inner_html(&self, selector: &str) -> Result<Option<String>> {
		Ok(self.with_element(selector, |el| el.html.clone().unwrap_or_default()))
	}

	async fn click(&self, selector: &str) -> Result<()> {
		let target = self.with_element(selector, |el| el.navigates_to.clone());
		match target {
			Some(Some(url)) => self.goto(&url).await,
			Some(None) => Ok(()),
			None => Err(HarvestError::element(selector, "no such element")),
		}
	}

	async fn screenshot_element(&self, selector: &str, path: &Path) -> Result<u64> {
		if self.with_element(selector, |_| ()).is_none() {
			return Err(HarvestError::element(selector, "no such element"));
		}
		let bytes = vec![0x89u8; self.shared.qr_bytes as usize];
		std::fs::write(path, bytes)?;
		Ok(self.shared.qr_bytes)
	}

	async fn evaluate(&self, expression: &str) -> Result<Value> {
		let value = self.with_document(|doc| {
			let text = if expression.contains("localStorage") {
				doc.local_storage_token.clone()
			} else if expression.contains("sessionStorage") {
				doc.session_storage_token.clone()
			} else if expression.contains("document.title") {
				Some(doc.title.clone())
			} else if expression.contains("document.body") {
				Some(doc.body_text.clone())
			} else {
				None
			};
			text.map(Value::String).unwrap_or(Value::Null)
		});
		Ok(value)
	}

	async fn content(&self) -> Result<String> {
		Ok(self.with_document(|doc| doc.source.clone()))
	}

	async fn cookies(&self) -> Result<Vec<Cookie>> {
		Ok(self.page.lock().cookies.clone())
	}

	async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		self.shared.state.lock().added_cookies.extend(cookies.iter().cloned());
		let mut page = self.page.lock();
		for cookie in cookies {
			page.cookies.retain(|c| c.name != cookie.name);
			page.cookies.push(cookie.clone());
		}
		Ok(())
	}

	async fn clear_cookies(&self) -> Result<()> {
		self.page.lock().cookies.clear();
		Ok(())
	}

	async fn close(self: Box<Self>) -> Result<()> {
		self.shared.state.lock().closes += 1;
		Ok(())
	}
}
