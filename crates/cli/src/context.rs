use std::sync::Arc;

use anyhow::Context as _;
use mph::credentials::load_session;
use mph::{BrowserEngine, ContentFetcher, CredentialStore, FileCredentialStore, HarvestConfig, HarvestError, LaunchOptions, NotificationSink, SessionOrchestrator};
use mph_chromium::ChromiumEngine;
use tracing::debug;

use crate::cli::Cli;
use crate::notify::{LogNotifier, WebhookNotifier};

pub const WEBHOOK_ENV: &str = "MPH_WEBHOOK_URL";

/// Resolved configuration shared by every command.
pub struct CommandContext {
	pub config: HarvestConfig,
	webhook: Option<String>,
}

impl CommandContext {
	pub fn load(cli: &Cli) -> anyhow::Result<Self> {
		let mut config = HarvestConfig::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
		if cli.headful {
			config.browser.headless = false;
		}
		if let Some(browser) = cli.browser {
			config.browser.kind = browser.into();
		}
		let webhook = cli
			.webhook
			.clone()
			.or_else(|| std::env::var(WEBHOOK_ENV).ok())
			.filter(|url| !url.trim().is_empty());

		debug!(target = "mph", data_dir = %config.data_dir.display(), browser = %config.browser.kind, headless = config.browser.headless, "configuration loaded");
		Ok(Self { config, webhook })
	}

	pub fn engine(&self) -> Arc<dyn BrowserEngine> {
		Arc::new(ChromiumEngine::new(self.config.browser.clone()))
	}

	pub fn credentials(&self) -> anyhow::Result<Arc<dyn CredentialStore>> {
		let path = self.config.credentials_path();
		let store = FileCredentialStore::open(&path).with_context(|| format!("opening credentials {}", path.display()))?;
		Ok(Arc::new(store))
	}

	pub fn notifier(&self) -> anyhow::Result<Arc<dyn NotificationSink>> {
		Ok(match &self.webhook {
			Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
			None => Arc::new(LogNotifier),
		})
	}

	pub fn orchestrator(&self) -> anyhow::Result<SessionOrchestrator> {
		Ok(SessionOrchestrator::new(self.engine(), &self.config, self.credentials()?, self.notifier()?)?)
	}

	pub fn fetcher(&self, with_session: bool, mobile: bool) -> anyhow::Result<ContentFetcher> {
		let mut fetcher = ContentFetcher::new(self.engine(), self.config.fetch.clone(), &self.config.browser)?;
		if mobile {
			fetcher = fetcher.with_launch_options(LaunchOptions {
				headless: self.config.browser.headless,
				mobile: true,
				..LaunchOptions::default()
			});
		}
		if with_session || self.config.fetch.use_session_cookies {
			let credentials = self.credentials()?;
			let record = load_session(credentials.as_ref()).ok_or(HarvestError::NotLoggedIn)?;
			fetcher = fetcher.with_session_cookies(record.cookies);
		}
		Ok(fetcher)
	}
}
