//! Chromium DevTools implementation of [`mph::BrowserEngine`].
//!
//! Every [`launch`](mph::BrowserEngine::launch) starts a separate browser
//! process with its own throwaway profile directory, so contexts never share
//! cookies or storage. The page is closed together with its browser.

mod launch;
mod page;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use mph::{BrowserEngine, BrowserPage, BrowserSettings, LaunchOptions, Result};
use tracing::{debug, info, warn};

pub use launch::{IMAGE_PATTERNS, MOBILE_USER_AGENT, MOBILE_VIEWPORT, find_executable};
pub use page::ChromiumPage;

use crate::page::engine_err;

pub struct ChromiumEngine {
	settings: BrowserSettings,
	launches: AtomicU64,
}

impl ChromiumEngine {
	pub fn new(settings: BrowserSettings) -> Self {
		Self {
			settings,
			launches: AtomicU64::new(0),
		}
	}

	pub fn settings(&self) -> &BrowserSettings {
		&self.settings
	}

	fn profile_dir(&self) -> PathBuf {
		let n = self.launches.fetch_add(1, Ordering::Relaxed);
		std::env::temp_dir().join(format!("mph-chromium-{}-{n}", std::process::id()))
	}
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
	async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
		let profile_dir = self.profile_dir();
		let config = launch::browser_config(&self.settings, options, &profile_dir)?;

		let (mut browser, mut handler) = Browser::launch(config).await.map_err(engine_err)?;
		let handler = tokio::spawn(async move {
			while let Some(event) = handler.next().await {
				if let Err(err) = event {
					debug!(target = "mph.engine", error = %err, "devtools handler error");
				}
			}
		});

		let page = match browser.new_page("about:blank").await {
			Ok(page) => page,
			Err(err) => {
				if let Err(close_err) = browser.close().await {
					warn!(target = "mph.engine", error = %close_err, "failed to close browser after launch error");
				}
				handler.abort();
				return Err(engine_err(err));
			}
		};

		let user_agent = launch::pick_user_agent(&self.settings, options);
		let page = ChromiumPage::new(browser, page, handler, profile_dir);
		if let Err(err) = page.prepare(options, user_agent.as_deref()).await {
			if let Err(close_err) = Box::new(page).close().await {
				warn!(target = "mph.engine", error = %close_err, "failed to close browser after setup error");
			}
			return Err(err);
		}

		info!(
			target = "mph.engine",
			browser = %self.settings.kind,
			headless = options.headless,
			mobile = options.mobile,
			block_images = options.block_images,
			"browser context launched"
		);
		Ok(Box::new(page))
	}
}
