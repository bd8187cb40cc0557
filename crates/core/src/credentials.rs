//! Key/value persistence for the captured session.
//!
//! The store holds a flat JSON object. The session occupies five keys:
//! `token`, `cookie` (header string), `cookies` (full cookie list), `expiry`
//! and `ext_data` (account profile).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use mph_protocol::{AccountProfile, Cookie, Expiry, SessionRecord, parse_cookie_header};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

pub const KEY_TOKEN: &str = "token";
pub const KEY_COOKIE: &str = "cookie";
pub const KEY_COOKIES: &str = "cookies";
pub const KEY_EXPIRY: &str = "expiry";
pub const KEY_EXT: &str = "ext_data";

/// Small persisted key/value structure.
///
/// Writes are buffered until [`CredentialStore::save`].
pub trait CredentialStore: Send + Sync {
	fn get(&self, key: &str) -> Option<Value>;

	fn get_or(&self, key: &str, default: Value) -> Value {
		self.get(key).unwrap_or(default)
	}

	fn set(&self, key: &str, value: Value);

	fn remove(&self, key: &str);

	fn save(&self) -> Result<()>;

	/// Discards unsaved writes and re-reads the backing storage.
	fn reload(&self) -> Result<()>;
}

/// JSON file backed store.
#[derive(Debug)]
pub struct FileCredentialStore {
	path: PathBuf,
	data: Mutex<BTreeMap<String, Value>>,
}

impl FileCredentialStore {
	/// Opens `path`, starting empty when the file is missing or blank.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let data = read_map(&path)?;
		Ok(Self {
			path,
			data: Mutex::new(data),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

fn read_map(path: &Path) -> Result<BTreeMap<String, Value>> {
	match fs::read_to_string(path) {
		Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
		Ok(raw) => Ok(serde_json::from_str(&raw)?),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
		Err(err) => Err(err.into()),
	}
}

impl CredentialStore for FileCredentialStore {
	fn get(&self, key: &str) -> Option<Value> {
		self.data.lock().get(key).cloned()
	}

	fn set(&self, key: &str, value: Value) {
		self.data.lock().insert(key.to_string(), value);
	}

	fn remove(&self, key: &str) {
		self.data.lock().remove(key);
	}

	fn save(&self) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		let json = serde_json::to_string_pretty(&*self.data.lock())?;
		let tmp = self.path.with_extension("tmp");
		fs::write(&tmp, json)?;
		fs::rename(&tmp, &self.path)?;
		Ok(())
	}

	fn reload(&self) -> Result<()> {
		let fresh = read_map(&self.path)?;
		*self.data.lock() = fresh;
		Ok(())
	}
}

/// In-process store for callers that do not persist credentials.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
	saved: Mutex<BTreeMap<String, Value>>,
	pending: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Snapshot of what the last `save` committed.
	pub fn saved(&self) -> BTreeMap<String, Value> {
		self.saved.lock().clone()
	}
}

impl CredentialStore for MemoryCredentialStore {
	fn get(&self, key: &str) -> Option<Value> {
		self.pending.lock().get(key).cloned()
	}

	fn set(&self, key: &str, value: Value) {
		self.pending.lock().insert(key.to_string(), value);
	}

	fn remove(&self, key: &str) {
		self.pending.lock().remove(key);
	}

	fn save(&self) -> Result<()> {
		let snapshot = self.pending.lock().clone();
		*self.saved.lock() = snapshot;
		Ok(())
	}

	fn reload(&self) -> Result<()> {
		let snapshot = self.saved.lock().clone();
		*self.pending.lock() = snapshot;
		Ok(())
	}
}

/// Overwrites the stored session with `record` in one save.
///
/// Returns `false` without touching the store when the token is empty.
pub fn persist_session(store: &dyn CredentialStore, record: &SessionRecord) -> Result<bool> {
	if record.token.is_empty() {
		debug!(target = "mph.session", "empty token, session not persisted");
		return Ok(false);
	}
	store.set(KEY_TOKEN, Value::String(record.token.clone()));
	store.set(KEY_COOKIE, Value::String(record.cookie_header.clone()));
	store.set(KEY_COOKIES, serde_json::to_value(&record.cookies)?);
	store.set(KEY_EXPIRY, serde_json::to_value(&record.expiry)?);
	match &record.ext {
		Some(profile) => store.set(KEY_EXT, serde_json::to_value(profile)?),
		None => store.remove(KEY_EXT),
	}
	store.save()?;
	store.reload()?;
	Ok(true)
}

/// Reads the stored session, `None` when no token was ever persisted.
pub fn load_session(store: &dyn CredentialStore) -> Option<SessionRecord> {
	let token = store.get(KEY_TOKEN).and_then(|v| v.as_str().map(str::to_string)).filter(|t| !t.is_empty())?;
	let cookie_header = store.get(KEY_COOKIE).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
	let cookies = store
		.get(KEY_COOKIES)
		.and_then(|v| serde_json::from_value::<Vec<Cookie>>(v).ok())
		.unwrap_or_else(|| parse_cookie_header(&cookie_header));
	let expiry = store.get(KEY_EXPIRY).and_then(|v| serde_json::from_value::<Option<Expiry>>(v).ok()).flatten();
	let ext = store
		.get(KEY_EXT)
		.and_then(|v| serde_json::from_value::<AccountProfile>(v).ok())
		.filter(|p| !p.is_empty());

	Some(SessionRecord {
		token,
		cookies,
		cookie_header,
		expiry,
		ext,
	})
}

/// Removes every session key and saves.
pub fn clear_session(store: &dyn CredentialStore) -> Result<()> {
	for key in [KEY_TOKEN, KEY_COOKIE, KEY_COOKIES, KEY_EXPIRY, KEY_EXT] {
		store.remove(key);
	}
	store.save()
}
