//! JSON envelope printed on stdout for every command.

use std::time::Instant;

use mph::HarvestError;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
	pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	LoginInProgress,
	LoginTimeout,
	QrCaptureFailed,
	SessionExpired,
	NotLoggedIn,
	Cancelled,
	NavigationFailed,
	SelectorNotFound,
	BrowserLaunchFailed,
	StoreError,
	ConfigError,
	IoError,
	InternalError,
}

impl ErrorCode {
	pub fn from_error(err: &anyhow::Error) -> Self {
		match err.downcast_ref::<HarvestError>() {
			Some(HarvestError::LockContention) => ErrorCode::LoginInProgress,
			Some(HarvestError::Lock(_)) => ErrorCode::LoginInProgress,
			Some(HarvestError::LoginTimeout { .. }) => ErrorCode::LoginTimeout,
			Some(HarvestError::CaptureFailure { .. }) => ErrorCode::QrCaptureFailed,
			Some(HarvestError::SessionExpired { .. }) => ErrorCode::SessionExpired,
			Some(HarvestError::NotLoggedIn) => ErrorCode::NotLoggedIn,
			Some(HarvestError::Cancelled { .. }) => ErrorCode::Cancelled,
			Some(HarvestError::Navigation { .. }) => ErrorCode::NavigationFailed,
			Some(HarvestError::Element { .. }) => ErrorCode::SelectorNotFound,
			Some(HarvestError::Engine(_)) => ErrorCode::BrowserLaunchFailed,
			Some(HarvestError::Store(_)) => ErrorCode::StoreError,
			Some(HarvestError::Config(_)) | Some(HarvestError::Json(_)) => ErrorCode::ConfigError,
			Some(HarvestError::Io(_)) => ErrorCode::IoError,
			None if err.downcast_ref::<std::io::Error>().is_some() => ErrorCode::IoError,
			None => ErrorCode::InternalError,
		}
	}
}

impl<T: Serialize> CommandResult<T> {
	pub fn success(command: &str, data: T, started: Instant) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data: Some(data),
			error: None,
			duration_ms: started.elapsed().as_millis() as u64,
		}
	}
}

impl CommandResult<()> {
	pub fn failure(command: &str, err: &anyhow::Error, started: Instant) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: None,
			error: Some(CommandError {
				code: ErrorCode::from_error(err),
				message: format!("{err:#}"),
			}),
			duration_ms: started.elapsed().as_millis() as u64,
		}
	}
}

/// Writes `result` as one line of JSON on stdout.
pub fn print_result<T: Serialize>(result: &CommandResult<T>) {
	match serde_json::to_string(result) {
		Ok(json) => println!("{json}"),
		Err(err) => eprintln!("failed to serialize command result: {err}"),
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;
	use std::time::Duration;

	use serde_json::json;

	use super::*;

	#[test]
	fn failure_envelope_carries_code() {
		let err = anyhow::Error::new(HarvestError::CaptureFailure {
			path: PathBuf::from("static/wx_qrcode.png"),
			size: 100,
			floor: 364,
		});
		let result = CommandResult::failure("login", &err, Instant::now());
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["ok"], false);
		assert_eq!(value["error"]["code"], "QR_CAPTURE_FAILED");
		assert!(value.get("data").is_none());
	}

	#[test]
	fn context_wrapped_errors_keep_their_code() {
		let err = anyhow::Error::new(HarvestError::LoginTimeout {
			attempt: "a1".into(),
			waited: Duration::from_secs(1),
		})
		.context("login failed");
		assert_eq!(ErrorCode::from_error(&err), ErrorCode::LoginTimeout);
		assert_eq!(ErrorCode::from_error(&anyhow::anyhow!("boom")), ErrorCode::InternalError);
	}

	#[test]
	fn success_envelope_uses_camel_case() {
		let result = CommandResult::success("status", json!({"loggedIn": false}), Instant::now());
		let value = serde_json::to_value(&result).unwrap();
		assert_eq!(value["ok"], true);
		assert!(value.get("durationMs").is_some());
		assert_eq!(value["data"]["loggedIn"], false);
	}
}
