//! Integration tests for the commands that never launch a browser.
//!
//! Each test runs the `mph` binary inside its own temporary data directory.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn run_mph(data_dir: &Path, args: &[&str]) -> (bool, Value, String) {
	let config = data_dir.join("mph.json");
	let config = config.to_string_lossy().to_string();
	let mut full_args = vec!["--config", config.as_str()];
	full_args.extend_from_slice(args);

	let output = Command::new(env!("CARGO_BIN_EXE_mph"))
		.args(&full_args)
		.env("MPH_DATA_DIR", data_dir)
		.env_remove("MPH_WEBHOOK_URL")
		.env_remove("RUST_LOG")
		.output()
		.expect("failed to execute mph");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let json = serde_json::from_str(stdout.trim()).unwrap_or_else(|err| panic!("expected JSON stdout: {err}\nstdout:\n{stdout}\nstderr:\n{stderr}"));
	(output.status.success(), json, stderr)
}

#[test]
fn status_without_session_reports_logged_out() {
	let dir = TempDir::new().unwrap();
	let (success, json, stderr) = run_mph(dir.path(), &["status"]);

	assert!(success, "status failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "status");
	assert_eq!(json["data"]["loggedIn"], false);
	assert_eq!(json["data"]["qr"]["exists"], false);
}

#[test]
fn status_removes_stale_login_artifacts() {
	let dir = TempDir::new().unwrap();
	std::fs::create_dir_all(dir.path().join("data")).unwrap();
	std::fs::create_dir_all(dir.path().join("static")).unwrap();
	std::fs::write(dir.path().join("data/.lock"), "locked").unwrap();
	std::fs::write(dir.path().join("static/wx_qrcode.png"), vec![0u8; 1024]).unwrap();

	let (success, json, stderr) = run_mph(dir.path(), &["status"]);

	assert!(success, "status failed: {stderr}");
	assert_eq!(json["data"]["qr"]["exists"], false);
	assert!(!dir.path().join("data/.lock").exists());
	assert!(!dir.path().join("static/wx_qrcode.png").exists());
}

#[test]
fn login_reports_attempt_owned_by_another_process() {
	let dir = TempDir::new().unwrap();
	std::fs::create_dir_all(dir.path().join("data")).unwrap();
	let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
	let record = serde_json::json!({
		"pid": std::process::id(),
		"attemptId": "other-process",
		"acquiredAt": now,
		"heartbeatAt": now,
		"ttlSecs": 600,
	});
	std::fs::write(dir.path().join("data/.lock"), record.to_string()).unwrap();

	let (success, json, stderr) = run_mph(dir.path(), &["login"]);

	assert!(success, "login failed: {stderr}");
	assert_eq!(json["data"]["alreadyRunning"], true);
	assert_eq!(json["data"]["attemptId"], "other-process");
	assert_eq!(json["data"]["qrReady"], false);
	assert!(dir.path().join("data/.lock").exists(), "the other holder keeps its lock");
}

#[test]
fn logout_clears_stored_credentials() {
	let dir = TempDir::new().unwrap();
	std::fs::create_dir_all(dir.path().join("data")).unwrap();
	let credentials = dir.path().join("data/wx.lic");
	std::fs::write(&credentials, r#"{"token":"1234","cookie":"slave_sid=abc; ","other":"kept"}"#).unwrap();

	let (success, json, stderr) = run_mph(dir.path(), &["logout"]);
	assert!(success, "logout failed: {stderr}");
	assert_eq!(json["data"]["loggedIn"], false);

	let stored: Value = serde_json::from_str(&std::fs::read_to_string(&credentials).unwrap()).unwrap();
	assert!(stored.get("token").is_none());
	assert!(stored.get("cookie").is_none());
	assert_eq!(stored["other"], "kept");
}

#[test]
fn malformed_config_fails_with_config_error() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("mph.json"), "{broken").unwrap();

	let (success, json, _) = run_mph(dir.path(), &["status"]);
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
}
