//! Article acquisition: navigation, classification, extraction.
//!
//! Every fetch runs in its own browsing context with cleared cookies. Pages
//! showing a terminal state (deleted, under review, challenge, ...) end the
//! fetch with the matching [`FetchOutcome`] and are never retried.

pub mod classify;
pub mod extract;
pub mod ident;
pub mod publish_time;

use std::sync::Arc;

use chrono::Local;
use mph_protocol::{Article, Cookie};
use tracing::{debug, info, warn};

pub use classify::{TerminalState, classify};
pub use ident::{MP_ID_PREFIX, article_id_from_url, extract_biz, mp_id_from_biz};
pub use publish_time::{parse_publish_time, publish_timestamp};

use crate::config::{BrowserSettings, FetchConfig};
use crate::engine::{BrowserEngine, BrowserPage, BrowserScope, LaunchOptions, evaluate_string};
use crate::error::{HarvestError, Result};
use crate::sanitize::ContentSanitizer;
use crate::store::ArticleStore;

/// Result of fetching one URL.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
	Fetched(Box<Article>),
	Deleted,
	UnderReview,
	Violation,
	VerificationChallenge,
	SendFailed,
	TransientError(String),
}

impl FetchOutcome {
	pub fn label(&self) -> &'static str {
		match self {
			FetchOutcome::Fetched(_) => "fetched",
			FetchOutcome::TransientError(_) => "transient_error",
			FetchOutcome::Deleted => TerminalState::Deleted.as_str(),
			FetchOutcome::UnderReview => TerminalState::UnderReview.as_str(),
			FetchOutcome::Violation => TerminalState::Violation.as_str(),
			FetchOutcome::VerificationChallenge => TerminalState::VerificationChallenge.as_str(),
			FetchOutcome::SendFailed => TerminalState::SendFailed.as_str(),
		}
	}

	pub fn article(&self) -> Option<&Article> {
		match self {
			FetchOutcome::Fetched(article) => Some(&**article),
			_ => None,
		}
	}

	pub fn into_article(self) -> Option<Article> {
		match self {
			FetchOutcome::Fetched(article) => Some(*article),
			_ => None,
		}
	}
}

impl From<TerminalState> for FetchOutcome {
	fn from(state: TerminalState) -> Self {
		match state {
			TerminalState::VerificationChallenge => FetchOutcome::VerificationChallenge,
			TerminalState::Deleted => FetchOutcome::Deleted,
			TerminalState::UnderReview => FetchOutcome::UnderReview,
			TerminalState::Violation => FetchOutcome::Violation,
			TerminalState::SendFailed => FetchOutcome::SendFailed,
		}
	}
}

/// Fetches and extracts articles, one browsing context per URL.
pub struct ContentFetcher {
	engine: Arc<dyn BrowserEngine>,
	launch: LaunchOptions,
	config: FetchConfig,
	sanitizer: ContentSanitizer,
	session_cookies: Option<Vec<Cookie>>,
}

impl ContentFetcher {
	pub fn new(engine: Arc<dyn BrowserEngine>, config: FetchConfig, browser: &BrowserSettings) -> Result<Self> {
		let sanitizer = ContentSanitizer::new(config.sanitize.clone())?;
		Ok(Self {
			engine,
			launch: LaunchOptions::headless(browser.headless),
			config,
			sanitizer,
			session_cookies: None,
		})
	}

	/// Browses with these cookies instead of anonymously. The cookies are only
	/// read, never written back.
	pub fn with_session_cookies(mut self, cookies: Vec<Cookie>) -> Self {
		self.session_cookies = Some(cookies);
		self
	}

	pub fn with_launch_options(mut self, launch: LaunchOptions) -> Self {
		self.launch = launch;
		self
	}

	/// Fetches one article. Never returns an error: failures become
	/// [`FetchOutcome::TransientError`].
	pub async fn fetch_one(&self, url: &str) -> FetchOutcome {
		let scope = match BrowserScope::launch(self.engine.as_ref(), &self.launch, "fetch").await {
			Ok(scope) => scope,
			Err(err) => {
				warn!(target = "mph.fetch", url, error = %err, "could not open browsing context");
				return FetchOutcome::TransientError(err.to_string());
			}
		};

		let result = self.fetch_in(scope.page(), url).await;
		if let Err(err) = scope.release().await {
			warn!(target = "mph.fetch", url, error = %err, "failed to close browsing context");
		}

		match result {
			Ok(outcome) => {
				debug!(target = "mph.fetch", url, outcome = outcome.label(), "fetch finished");
				outcome
			}
			Err(err) => {
				warn!(target = "mph.fetch", url, error = %err, "fetch failed");
				FetchOutcome::TransientError(err.to_string())
			}
		}
	}

	async fn fetch_in(&self, page: &dyn BrowserPage, url: &str) -> Result<FetchOutcome> {
		page.clear_cookies().await?;
		if let Some(cookies) = &self.session_cookies {
			page.add_cookies(cookies).await?;
		}
		page.goto("about:blank").await?;

		match tokio::time::timeout(self.config.navigation_timeout(), page.goto(url)).await {
			Ok(result) => result?,
			Err(_) => return Err(HarvestError::navigation(url, format!("timed out after {:?}", self.config.navigation_timeout()))),
		}

		let body = evaluate_string(page, extract::BODY_TEXT).await?.unwrap_or_default();
		if let Some(state) = classify(&body) {
			info!(target = "mph.fetch", url, state = state.as_str(), "terminal page state");
			return Ok(state.into());
		}

		let article = extract::extract_article(page, url, &self.sanitizer, &Local::now()).await;
		Ok(FetchOutcome::Fetched(Box::new(article)))
	}

	/// Fetches `urls` one after another and hands each article to `store`.
	///
	/// Blank entries are skipped. A fixed delay separates consecutive items.
	/// Returns how many articles were fetched and accepted by the store.
	pub async fn fetch_batch(&self, urls: &[String], account_override: Option<&str>, store: &dyn ArticleStore) -> usize {
		let total = urls.len();
		let mut stored = 0;

		for (i, url) in urls.iter().enumerate() {
			let url = url.trim();
			if url.is_empty() {
				continue;
			}
			info!(target = "mph.fetch", index = i + 1, total, url, "fetching article");

			match self.fetch_one(url).await {
				FetchOutcome::Fetched(mut article) => {
					if let Some(account) = account_override {
						article.mp_id = Some(account.to_string());
					}
					match store.upsert(&article, true).await {
						Ok(true) => {
							stored += 1;
							info!(target = "mph.fetch", url, article = %article.summary(), "article stored");
						}
						Ok(false) => info!(target = "mph.fetch", url, id = %article.id, "article already stored"),
						Err(err) => warn!(target = "mph.fetch", url, error = %err, "article store rejected item"),
					}
				}
				other => warn!(target = "mph.fetch", url, outcome = other.label(), "article not stored"),
			}

			if i + 1 < total {
				tokio::time::sleep(self.config.batch_delay()).await;
			}
		}

		info!(target = "mph.fetch", stored, total, "batch finished");
		stored
	}
}
