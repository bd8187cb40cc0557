//! Browser discovery and per-context launch configuration.

use std::path::{Path, PathBuf};

use chromiumoxide::browser::BrowserConfig;
use mph::{BrowserKind, BrowserSettings, HarvestError, LaunchOptions, Result};
use rand::seq::SliceRandom;

pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";

/// Phone viewport used for mobile contexts.
pub const MOBILE_VIEWPORT: (u32, u32) = (375, 812);

/// Request patterns aborted when images are blocked.
pub const IMAGE_PATTERNS: &[&str] = &["*.png", "*.jpg", "*.jpeg"];

fn candidates(kind: BrowserKind) -> &'static [&'static str] {
	match kind {
		BrowserKind::Chromium => &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable", "chrome"],
		BrowserKind::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
		BrowserKind::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
	}
}

/// Configured executable, else the first matching binary on `PATH`.
pub fn find_executable(settings: &BrowserSettings) -> Option<PathBuf> {
	if let Some(path) = &settings.executable {
		return Some(path.clone());
	}
	candidates(settings.kind).iter().find_map(|name| which::which(name).ok())
}

pub(crate) fn browser_config(settings: &BrowserSettings, options: &LaunchOptions, profile_dir: &Path) -> Result<BrowserConfig> {
	let mut builder = BrowserConfig::builder().user_data_dir(profile_dir);
	if !options.headless {
		builder = builder.with_head();
	}

	match find_executable(settings) {
		Some(path) => builder = builder.chrome_executable(path),
		// chromiumoxide runs its own detection for plain Chromium
		None if settings.kind == BrowserKind::Chromium => {}
		None => return Err(HarvestError::Engine(format!("no {} executable found on PATH", settings.kind))),
	}

	if options.mobile {
		let (width, height) = MOBILE_VIEWPORT;
		builder = builder.window_size(width, height);
	}

	builder
		.arg("--disable-blink-features=AutomationControlled")
		.arg("--no-first-run")
		.build()
		.map_err(HarvestError::Engine)
}

/// Explicit agent, else the phone agent in mobile mode, else a random
/// configured desktop agent.
pub(crate) fn pick_user_agent(settings: &BrowserSettings, options: &LaunchOptions) -> Option<String> {
	if let Some(agent) = &options.user_agent {
		return Some(agent.clone());
	}
	if options.mobile {
		return Some(MOBILE_USER_AGENT.to_string());
	}
	settings.user_agents.choose(&mut rand::thread_rng()).cloned()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_executable_wins() {
		let settings = BrowserSettings {
			kind: BrowserKind::Edge,
			executable: Some(PathBuf::from("/opt/edge/msedge")),
			..BrowserSettings::default()
		};
		assert_eq!(find_executable(&settings), Some(PathBuf::from("/opt/edge/msedge")));
	}

	#[test]
	fn user_agent_precedence() {
		let settings = BrowserSettings {
			user_agents: vec!["desktop-a".into()],
			..BrowserSettings::default()
		};

		let explicit = LaunchOptions {
			user_agent: Some("custom".into()),
			mobile: true,
			..LaunchOptions::default()
		};
		assert_eq!(pick_user_agent(&settings, &explicit).as_deref(), Some("custom"));

		let mobile = LaunchOptions {
			mobile: true,
			..LaunchOptions::default()
		};
		assert_eq!(pick_user_agent(&settings, &mobile).as_deref(), Some(MOBILE_USER_AGENT));

		assert_eq!(pick_user_agent(&settings, &LaunchOptions::default()).as_deref(), Some("desktop-a"));
	}

	#[test]
	fn no_configured_agents_leaves_browser_default() {
		let settings = BrowserSettings {
			user_agents: Vec::new(),
			..BrowserSettings::default()
		};
		assert_eq!(pick_user_agent(&settings, &LaunchOptions::default()), None);
	}
}
