//! Cross-process login lock.
//!
//! The lock is a small JSON file. The record is written to a private staging
//! file first and then hard-linked onto the lock path, so acquisition is
//! atomic and the lock never appears empty. Heartbeats replace the record by
//! rename. Its presence means "a login attempt is in progress" unless the
//! record is stale: the heartbeat is older than the TTL, or the holder process
//! is gone. Stale records are reclaimed on the next acquisition.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::liveness::pid_is_alive;

#[derive(Debug, Error)]
pub enum LockError {
	#[error("lock file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("lock record encode failed: {0}")]
	Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;

/// On-disk lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
	pub pid: u32,
	pub attempt_id: String,
	/// Unix seconds.
	pub acquired_at: u64,
	/// Unix seconds of the last heartbeat.
	pub heartbeat_at: u64,
	pub ttl_secs: u64,
}

impl LockRecord {
	fn new(attempt_id: &str, ttl: Duration) -> Self {
		let now = now_secs();
		Self {
			pid: std::process::id(),
			attempt_id: attempt_id.to_string(),
			acquired_at: now,
			heartbeat_at: now,
			ttl_secs: ttl.as_secs().max(1),
		}
	}

	/// A record is stale once its heartbeat lapsed or its holder exited.
	pub fn is_stale(&self, now: u64) -> bool {
		now.saturating_sub(self.heartbeat_at) > self.ttl_secs || !pid_is_alive(self.pid)
	}
}

/// Result of inspecting the lock path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
	Free,
	Held(LockRecord),
	/// Present but reclaimable. `None` when the file holds no readable record,
	/// e.g. a bare marker left by an older build.
	Stale(Option<LockRecord>),
}

/// Login lock bound to one path.
#[derive(Debug, Clone)]
pub struct LoginLock {
	path: PathBuf,
	ttl: Duration,
}

impl LoginLock {
	pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
		Self { path: path.into(), ttl }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Reads the lock path without modifying it.
	pub fn inspect(&self) -> Result<LockState> {
		let raw = match fs::read_to_string(&self.path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LockState::Free),
			Err(source) => return Err(self.io_err(source)),
		};

		match serde_json::from_str::<LockRecord>(&raw) {
			Ok(record) if record.is_stale(now_secs()) => Ok(LockState::Stale(Some(record))),
			Ok(record) => Ok(LockState::Held(record)),
			Err(_) => Ok(LockState::Stale(None)),
		}
	}

	/// True when a live attempt holds the lock.
	pub fn is_held(&self) -> Result<bool> {
		Ok(matches!(self.inspect()?, LockState::Held(_)))
	}

	/// Attempts to take the lock for `attempt_id`.
	///
	/// Returns `Ok(None)` when a live holder owns it. A stale record is removed
	/// and acquisition retried once.
	pub fn try_acquire(&self, attempt_id: &str) -> Result<Option<LockGuard>> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
		}

		for _ in 0..2 {
			let record = LockRecord::new(attempt_id, self.ttl);
			let staged = write_staged(&self.path, &record).map_err(|source| self.io_err(source))?;
			let linked = fs::hard_link(&staged, &self.path);
			remove_staged(&staged);
			match linked {
				Ok(()) => {
					debug!(target = "mph.lock", path = %self.path.display(), attempt = attempt_id, "login lock acquired");
					return Ok(Some(LockGuard {
						path: self.path.clone(),
						record,
						released: false,
					}));
				}
				Err(err) if err.kind() == ErrorKind::AlreadyExists => match self.inspect()? {
					LockState::Held(holder) => {
						debug!(target = "mph.lock", holder_pid = holder.pid, holder_attempt = %holder.attempt_id, "login lock busy");
						return Ok(None);
					}
					LockState::Stale(previous) => {
						warn!(
							target = "mph.lock",
							path = %self.path.display(),
							holder_pid = previous.as_ref().map(|r| r.pid),
							"reclaiming stale login lock"
						);
						self.remove_if_unchanged(previous.as_ref())?;
					}
					LockState::Free => {}
				},
				Err(source) => return Err(self.io_err(source)),
			}
		}

		Ok(None)
	}

	/// Removes the lock file when it is stale. Live locks are left untouched.
	pub fn clear_stale(&self) -> Result<bool> {
		match self.inspect()? {
			LockState::Stale(previous) => {
				self.remove_if_unchanged(previous.as_ref())?;
				Ok(true)
			}
			LockState::Free | LockState::Held(_) => Ok(false),
		}
	}

	fn remove_if_unchanged(&self, expected: Option<&LockRecord>) -> Result<()> {
		let current = fs::read_to_string(&self.path).ok().and_then(|raw| serde_json::from_str::<LockRecord>(&raw).ok());
		if current.as_ref() != expected {
			return Ok(());
		}
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(source) => Err(self.io_err(source)),
		}
	}

	fn io_err(&self, source: std::io::Error) -> LockError {
		LockError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

/// Held login lock. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct LockGuard {
	path: PathBuf,
	record: LockRecord,
	released: bool,
}

impl LockGuard {
	pub fn record(&self) -> &LockRecord {
		&self.record
	}

	/// Refreshes the heartbeat so other processes keep treating the lock as live.
	pub fn heartbeat(&mut self) -> Result<()> {
		if !self.still_owned() {
			warn!(target = "mph.lock", path = %self.path.display(), attempt = %self.record.attempt_id, "lock taken over, heartbeat skipped");
			return Ok(());
		}
		self.record.heartbeat_at = now_secs();
		let staged = write_staged(&self.path, &self.record).map_err(|source| self.io_err(source))?;
		let result = fs::rename(&staged, &self.path).map_err(|source| self.io_err(source));
		if result.is_err() {
			remove_staged(&staged);
		}
		result
	}

	fn io_err(&self, source: std::io::Error) -> LockError {
		LockError::Io {
			path: self.path.clone(),
			source,
		}
	}

	fn still_owned(&self) -> bool {
		let owner = fs::read_to_string(&self.path).ok().and_then(|raw| serde_json::from_str::<LockRecord>(&raw).ok());
		owner.is_some_and(|owner| owner.pid == self.record.pid && owner.attempt_id == self.record.attempt_id)
	}

	/// Releases the lock, reporting filesystem errors.
	pub fn release(mut self) -> Result<()> {
		self.released = true;
		self.remove_owned()
	}

	fn remove_owned(&self) -> Result<()> {
		// Never delete a record another attempt wrote after reclaiming ours.
		let owner = fs::read_to_string(&self.path).ok().and_then(|raw| serde_json::from_str::<LockRecord>(&raw).ok());
		if owner.is_some_and(|owner| owner.pid != self.record.pid || owner.attempt_id != self.record.attempt_id) {
			return Ok(());
		}
		match fs::remove_file(&self.path) {
			Ok(()) => {
				debug!(target = "mph.lock", path = %self.path.display(), attempt = %self.record.attempt_id, "login lock released");
				Ok(())
			}
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(source) => Err(self.io_err(source)),
		}
	}
}

impl Drop for LockGuard {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		if let Err(err) = self.remove_owned() {
			warn!(target = "mph.lock", error = %err, "failed to release login lock on drop");
		}
	}
}

static STAGED: AtomicU64 = AtomicU64::new(0);

/// Writes `record` next to `path` under a unique name, so the lock path only
/// ever changes by link or rename and is never seen half written.
fn write_staged(path: &Path, record: &LockRecord) -> std::io::Result<PathBuf> {
	let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "lock".into());
	let n = STAGED.fetch_add(1, Ordering::Relaxed);
	let staged = path.with_file_name(format!("{name}.{}.{n}.tmp", std::process::id()));
	let body = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
	let mut file = OpenOptions::new().write(true).create_new(true).open(&staged)?;
	file.write_all(&body)?;
	file.sync_all()?;
	Ok(staged)
}

fn remove_staged(staged: &Path) {
	if let Err(err) = fs::remove_file(staged) {
		if err.kind() != ErrorKind::NotFound {
			warn!(target = "mph.lock", path = %staged.display(), error = %err, "failed to remove staged lock record");
		}
	}
}

fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	fn lock_in(dir: &TempDir) -> LoginLock {
		LoginLock::new(dir.path().join("data").join(".lock"), Duration::from_secs(60))
	}

	#[test]
	fn second_acquire_sees_live_holder() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);

		let guard = lock.try_acquire("a1").unwrap().expect("first acquire succeeds");
		assert!(lock.is_held().unwrap());
		assert!(lock.try_acquire("a2").unwrap().is_none());

		guard.release().unwrap();
		assert_eq!(lock.inspect().unwrap(), LockState::Free);
	}

	#[test]
	fn dropping_guard_releases() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		{
			let _guard = lock.try_acquire("a1").unwrap().unwrap();
			assert!(lock.path().exists());
		}
		assert!(!lock.path().exists());
	}

	#[test]
	fn dead_holder_is_reclaimed() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
		let orphan = LockRecord {
			pid: 0,
			attempt_id: "crashed".into(),
			acquired_at: now_secs(),
			heartbeat_at: now_secs(),
			ttl_secs: 600,
		};
		fs::write(lock.path(), serde_json::to_vec(&orphan).unwrap()).unwrap();

		assert_eq!(lock.inspect().unwrap(), LockState::Stale(Some(orphan)));
		let guard = lock.try_acquire("fresh").unwrap().expect("stale lock reclaimed");
		assert_eq!(guard.record().attempt_id, "fresh");
	}

	#[test]
	fn lapsed_heartbeat_is_stale() {
		let record = LockRecord {
			pid: std::process::id(),
			attempt_id: "old".into(),
			acquired_at: 1_000,
			heartbeat_at: 1_000,
			ttl_secs: 30,
		};
		assert!(!record.is_stale(1_030));
		assert!(record.is_stale(1_031));
	}

	#[test]
	fn bare_marker_from_older_build_is_stale() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		fs::create_dir_all(lock.path().parent().unwrap()).unwrap();
		fs::write(lock.path(), "1712345678.123").unwrap();

		assert_eq!(lock.inspect().unwrap(), LockState::Stale(None));
		assert!(lock.clear_stale().unwrap());
		assert_eq!(lock.inspect().unwrap(), LockState::Free);
	}

	#[test]
	fn clear_stale_leaves_live_lock() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		let _guard = lock.try_acquire("live").unwrap().unwrap();
		assert!(!lock.clear_stale().unwrap());
		assert!(lock.path().exists());
	}

	#[test]
	fn release_skips_foreign_record() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		let guard = lock.try_acquire("mine").unwrap().unwrap();

		let foreign = LockRecord::new("theirs", Duration::from_secs(60));
		fs::write(lock.path(), serde_json::to_vec(&foreign).unwrap()).unwrap();
		guard.release().unwrap();
		assert!(lock.path().exists());
	}

	#[test]
	fn heartbeat_rewrites_record() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		let mut guard = lock.try_acquire("hb").unwrap().unwrap();
		guard.heartbeat().unwrap();
		let LockState::Held(record) = lock.inspect().unwrap() else {
			panic!("lock should be held");
		};
		assert_eq!(record.attempt_id, "hb");
		assert!(record.heartbeat_at >= record.acquired_at);
	}

	#[test]
	fn heartbeat_never_exposes_a_reclaimable_lock() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		let mut guard = lock.try_acquire("holder").unwrap().unwrap();
		let done = std::sync::atomic::AtomicBool::new(false);

		let intrusions = std::thread::scope(|scope| {
			let contender = scope.spawn(|| {
				let mut acquired = 0;
				while !done.load(Ordering::Relaxed) {
					match lock.try_acquire("intruder").unwrap() {
						Some(other) => {
							acquired += 1;
							std::mem::forget(other);
						}
						None => assert!(lock.is_held().unwrap()),
					}
				}
				acquired
			});
			for _ in 0..500 {
				guard.heartbeat().unwrap();
			}
			done.store(true, Ordering::Relaxed);
			contender.join().unwrap()
		});

		assert_eq!(intrusions, 0);
		let LockState::Held(record) = lock.inspect().unwrap() else {
			panic!("lock should still be held");
		};
		assert_eq!(record.attempt_id, "holder");
		let leftovers = fs::read_dir(lock.path().parent().unwrap()).unwrap().count();
		assert_eq!(leftovers, 1, "staging files must not accumulate");
	}

	#[test]
	fn heartbeat_leaves_a_taken_over_lock_alone() {
		let dir = TempDir::new().unwrap();
		let lock = lock_in(&dir);
		let mut guard = lock.try_acquire("mine").unwrap().unwrap();

		let foreign = LockRecord::new("theirs", Duration::from_secs(60));
		fs::write(lock.path(), serde_json::to_vec(&foreign).unwrap()).unwrap();
		guard.heartbeat().unwrap();

		let LockState::Held(record) = lock.inspect().unwrap() else {
			panic!("lock should be held");
		};
		assert_eq!(record.attempt_id, "theirs");
	}
}
