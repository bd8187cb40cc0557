//! Harvester configuration.
//!
//! Loaded from a JSON file where every field is optional. Relative paths are
//! resolved against `dataDir`. Environment overrides are applied last.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::BrowserKind;
use crate::error::{HarvestError, Result};
use crate::sanitize::SanitizeRules;

/// Desktop user agents a fresh browsing context picks from.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
	"Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
	"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestConfig {
	pub data_dir: PathBuf,
	pub credentials_file: PathBuf,
	pub session: SessionConfig,
	pub fetch: FetchConfig,
	pub browser: BrowserSettings,
}

impl Default for HarvestConfig {
	fn default() -> Self {
		Self {
			data_dir: PathBuf::from("."),
			credentials_file: PathBuf::from("data/wx.lic"),
			session: SessionConfig::default(),
			fetch: FetchConfig::default(),
			browser: BrowserSettings::default(),
		}
	}
}

impl HarvestConfig {
	/// Reads `path`, falling back to defaults when the file does not exist.
	pub fn load(path: &Path) -> Result<Self> {
		let mut config = match fs::read_to_string(path) {
			Ok(raw) => serde_json::from_str::<Self>(&raw).map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
			Err(err) => return Err(err.into()),
		};
		config.apply_env();
		config.validate()?;
		Ok(config)
	}

	/// Applies `MPH_DATA_DIR` and the headful switches `MPH_NOT_HEADLESS` / `NOT_HEADLESS`.
	pub fn apply_env(&mut self) {
		if let Some(dir) = std::env::var_os("MPH_DATA_DIR").filter(|v| !v.is_empty()) {
			self.data_dir = PathBuf::from(dir);
		}
		if env_flag("MPH_NOT_HEADLESS") || env_flag("NOT_HEADLESS") {
			self.browser.headless = false;
		}
	}

	pub fn validate(&self) -> Result<()> {
		let s = &self.session;
		if s.login_url.is_empty() || s.home_url.is_empty() {
			return Err(HarvestError::Config("session.loginUrl and session.homeUrl must be set".into()));
		}
		if s.poll_interval_ms == 0 {
			return Err(HarvestError::Config("session.pollIntervalMs must be positive".into()));
		}
		if s.critical_cookies.is_empty() {
			return Err(HarvestError::Config("session.criticalCookies must name at least one cookie".into()));
		}
		Ok(())
	}

	pub fn resolve(&self, path: &Path) -> PathBuf {
		if path.is_absolute() { path.to_path_buf() } else { self.data_dir.join(path) }
	}

	pub fn qr_path(&self) -> PathBuf {
		self.resolve(&self.session.qr_file)
	}

	pub fn lock_path(&self) -> PathBuf {
		self.resolve(&self.session.lock_file)
	}

	pub fn credentials_path(&self) -> PathBuf {
		self.resolve(&self.credentials_file)
	}
}

fn env_flag(name: &str) -> bool {
	std::env::var(name)
		.map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
		.unwrap_or(false)
}

/// Login handshake and keep-alive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	pub login_url: String,
	/// Landing URL prefix that proves the handshake completed.
	pub home_url: String,
	pub qr_selector: String,
	pub qr_file: PathBuf,
	pub lock_file: PathBuf,
	/// Snapshots at or below this size are blank renders.
	pub qr_min_bytes: u64,
	pub qr_visible_ms: u64,
	pub settle_ms: u64,
	pub login_timeout_secs: u64,
	pub poll_interval_ms: u64,
	/// Zero disables the keep-alive loop.
	pub refresh_interval_secs: u64,
	pub lock_ttl_secs: u64,
	pub confirm_selector: String,
	pub confirm_wait_ms: u64,
	pub critical_cookies: Vec<String>,
	/// Title of the login notification.
	pub notice_title: String,
	pub profile: ProfileSelectors,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			login_url: "https://mp.weixin.qq.com/".into(),
			home_url: "https://mp.weixin.qq.com/cgi-bin/home".into(),
			qr_selector: ".login__type__container__scan__qrcode".into(),
			qr_file: PathBuf::from("static/wx_qrcode.png"),
			lock_file: PathBuf::from("data/.lock"),
			qr_min_bytes: 364,
			qr_visible_ms: 1_000,
			settle_ms: 2_000,
			login_timeout_secs: 120,
			poll_interval_ms: 500,
			refresh_interval_secs: 3660 * 24,
			lock_ttl_secs: 300,
			confirm_selector: "#jumpUrl".into(),
			confirm_wait_ms: 1_000,
			critical_cookies: vec!["slave_sid".into()],
			notice_title: "Login succeeded".into(),
			profile: ProfileSelectors::default(),
		}
	}
}

impl SessionConfig {
	pub fn qr_visible(&self) -> Duration {
		Duration::from_millis(self.qr_visible_ms)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	pub fn login_timeout(&self) -> Duration {
		Duration::from_secs(self.login_timeout_secs)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn refresh_interval(&self) -> Option<Duration> {
		(self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
	}

	pub fn lock_ttl(&self) -> Duration {
		Duration::from_secs(self.lock_ttl_secs)
	}

	pub fn confirm_wait(&self) -> Duration {
		Duration::from_millis(self.confirm_wait_ms)
	}

	/// True when `url` is the authenticated home page.
	pub fn is_home(&self, url: &str) -> bool {
		url.starts_with(&self.home_url)
	}
}

/// Selectors for the account summary on the authenticated home page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSelectors {
	pub name: String,
	pub logo: String,
	pub read_yesterday: String,
	pub share_yesterday: String,
	pub watch_yesterday: String,
	pub original_count: String,
	pub user_count: String,
}

impl Default for ProfileSelectors {
	fn default() -> Self {
		const CARD: &str = "#app > div:nth-of-type(2) > div:nth-of-type(1)";
		Self {
			name: format!("{CARD} > div:nth-of-type(1) > div > div:nth-of-type(1) > div"),
			logo: format!("{CARD} > div:nth-of-type(1) > div > div:nth-of-type(1) > img"),
			read_yesterday: format!("{CARD} > div:nth-of-type(2) > div > ul > li:nth-of-type(1) > em"),
			share_yesterday: format!("{CARD} > div:nth-of-type(2) > div > ul > li:nth-of-type(2) > em"),
			watch_yesterday: format!("{CARD} > div:nth-of-type(2) > div > ul > li:nth-of-type(3) > em > a > span"),
			original_count: format!("{CARD} > div:nth-of-type(1) > div > div:nth-of-type(2) > div > span"),
			user_count: format!("{CARD} > div:nth-of-type(1) > div > div:nth-of-type(3) > div > span"),
		}
	}
}

/// Article fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchConfig {
	/// Pause between batch items.
	pub batch_delay_ms: u64,
	/// Upper bound for a single page navigation.
	pub navigation_timeout_secs: u64,
	/// Reuse persisted session cookies instead of browsing anonymously.
	pub use_session_cookies: bool,
	pub sanitize: SanitizeRules,
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			batch_delay_ms: 3_000,
			navigation_timeout_secs: 30,
			use_session_cookies: false,
			sanitize: SanitizeRules::default(),
		}
	}
}

impl FetchConfig {
	pub fn batch_delay(&self) -> Duration {
		Duration::from_millis(self.batch_delay_ms)
	}

	pub fn navigation_timeout(&self) -> Duration {
		Duration::from_secs(self.navigation_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
	pub kind: BrowserKind,
	pub headless: bool,
	/// Explicit browser binary; discovered on `PATH` when unset.
	pub executable: Option<PathBuf>,
	pub user_agents: Vec<String>,
}

impl Default for BrowserSettings {
	fn default() -> Self {
		Self {
			kind: BrowserKind::default(),
			headless: true,
			executable: None,
			user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn missing_file_yields_defaults() {
		let dir = TempDir::new().unwrap();
		let config = HarvestConfig::load(&dir.path().join("absent.json")).unwrap();
		assert_eq!(config.session.qr_min_bytes, 364);
		assert_eq!(config.session.refresh_interval(), Some(Duration::from_secs(87_840)));
		assert_eq!(config.fetch.batch_delay(), Duration::from_secs(3));
		assert_eq!(config.session.critical_cookies, vec!["slave_sid".to_string()]);
	}

	#[test]
	fn partial_file_keeps_other_defaults() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("mph.json");
		fs::write(&path, r#"{"session":{"loginTimeoutSecs":5,"refreshIntervalSecs":0},"fetch":{"batchDelayMs":10}}"#).unwrap();

		let config = HarvestConfig::load(&path).unwrap();
		assert_eq!(config.session.login_timeout(), Duration::from_secs(5));
		assert_eq!(config.session.refresh_interval(), None);
		assert_eq!(config.session.home_url, "https://mp.weixin.qq.com/cgi-bin/home");
		assert_eq!(config.fetch.batch_delay_ms, 10);
	}

	#[test]
	fn malformed_file_is_config_error() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("mph.json");
		fs::write(&path, "{not json").unwrap();
		assert!(matches!(HarvestConfig::load(&path), Err(HarvestError::Config(_))));
	}

	#[test]
	fn relative_paths_resolve_against_data_dir() {
		let config = HarvestConfig {
			data_dir: PathBuf::from("/srv/mph"),
			..Default::default()
		};
		assert_eq!(config.lock_path(), PathBuf::from("/srv/mph/data/.lock"));
		assert_eq!(config.qr_path(), PathBuf::from("/srv/mph/static/wx_qrcode.png"));
		assert_eq!(config.resolve(Path::new("/abs/file")), PathBuf::from("/abs/file"));
	}

	#[test]
	fn home_detection_is_prefix_match() {
		let session = SessionConfig::default();
		assert!(session.is_home("https://mp.weixin.qq.com/cgi-bin/home?t=home/index&token=1"));
		assert!(!session.is_home("https://mp.weixin.qq.com/"));
	}
}
