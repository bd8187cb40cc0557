//! Holder liveness checks for lock records.

#[cfg(unix)]
use std::path::Path;
#[cfg(any(unix, windows))]
use std::process::Command;
#[cfg(unix)]
use std::process::Stdio;

/// Returns `true` when a process with `pid` appears to exist.
///
/// Platforms without a cheap check report every non-zero PID as alive, which
/// leaves staleness detection to the lock heartbeat alone.
pub fn pid_is_alive(pid: u32) -> bool {
	if pid == 0 {
		return false;
	}
	if pid == std::process::id() {
		return true;
	}
	os_reports_alive(pid)
}

#[cfg(unix)]
fn os_reports_alive(pid: u32) -> bool {
	if Path::new("/proc").join(pid.to_string()).exists() {
		return true;
	}
	Command::new("kill")
		.arg("-0")
		.arg(pid.to_string())
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.status()
		.map(|status| status.success())
		.unwrap_or(false)
}

#[cfg(windows)]
fn os_reports_alive(pid: u32) -> bool {
	let filter = format!("PID eq {pid}");
	match Command::new("tasklist").args(["/FI", &filter, "/FO", "CSV", "/NH"]).output() {
		Ok(output) if output.status.success() => {
			let needle = format!("\"{pid}\"");
			String::from_utf8_lossy(&output.stdout).lines().any(|line| line.split(',').nth(1) == Some(needle.as_str()))
		}
		_ => true,
	}
}

#[cfg(not(any(unix, windows)))]
fn os_reports_alive(_pid: u32) -> bool {
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn current_process_is_alive() {
		assert!(pid_is_alive(std::process::id()));
	}

	#[test]
	fn pid_zero_is_never_alive() {
		assert!(!pid_is_alive(0));
	}

	#[cfg(unix)]
	#[test]
	fn exited_child_is_not_alive() {
		let mut child = std::process::Command::new("true").spawn().unwrap();
		let pid = child.id();
		child.wait().unwrap();
		assert!(!pid_is_alive(pid));
	}
}
