use std::path::PathBuf;
use std::time::Duration;

use mph_runtime::LockError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
	#[error("a login attempt is already running")]
	LockContention,

	#[error("login attempt {attempt} timed out after {waited:?} without reaching the home page")]
	LoginTimeout { attempt: String, waited: Duration },

	#[error("QR snapshot {path} is {size} bytes, expected more than {floor}")]
	CaptureFailure { path: PathBuf, size: u64, floor: u64 },

	#[error("session expired, landed on {url}")]
	SessionExpired { url: String },

	#[error("not logged in")]
	NotLoggedIn,

	#[error("login attempt {attempt} cancelled")]
	Cancelled { attempt: String },

	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	#[error("element {selector}: {message}")]
	Element { selector: String, message: String },

	#[error("browser engine error: {0}")]
	Engine(String),

	#[error("store error: {0}")]
	Store(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Lock(#[from] LockError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl HarvestError {
	pub fn navigation(url: impl Into<String>, message: impl ToString) -> Self {
		Self::Navigation {
			url: url.into(),
			message: message.to_string(),
		}
	}

	pub fn element(selector: impl Into<String>, message: impl ToString) -> Self {
		Self::Element {
			selector: selector.into(),
			message: message.to_string(),
		}
	}
}

pub type Result<T> = std::result::Result<T, HarvestError>;
