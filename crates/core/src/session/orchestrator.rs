use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use mph_protocol::{AccountProfile, Cookie, SessionRecord};
use mph_runtime::{LockGuard, LockState, LoginLock};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::capture::capture_session;
use super::state::{LoginState, SessionState};
use crate::config::{HarvestConfig, SessionConfig};
use crate::credentials::{CredentialStore, clear_session, load_session, persist_session};
use crate::engine::{BrowserEngine, BrowserPage, BrowserScope, LaunchOptions};
use crate::error::{HarvestError, Result};
use crate::notify::{NotificationSink, login_message};

/// Called once after a successful login, with the captured session and the
/// account profile when one was scraped.
pub type CompletionHook = Box<dyn FnOnce(&SessionRecord, Option<&AccountProfile>) + Send + 'static>;

/// Called once when the QR snapshot has been written.
pub type QrReadyHook = Box<dyn FnOnce(&Path) + Send + 'static>;

/// Answer to [`SessionOrchestrator::request_login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginTicket {
	pub qr_path: PathBuf,
	/// Whether the QR snapshot is already on disk.
	pub qr_ready: bool,
	/// Another attempt (here or in another process) owns the login.
	pub already_running: bool,
	pub attempt_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrStatus {
	pub path: PathBuf,
	pub exists: bool,
	pub attempting: bool,
}

#[derive(Debug, Clone, Copy)]
struct Progress {
	qr_ready: bool,
	finished: bool,
}

/// Drives the QR-code login handshake and keeps the session alive.
///
/// Cloning is cheap; clones share the same state. At most one attempt runs at a
/// time across every process pointing at the same lock file.
#[derive(Clone)]
pub struct SessionOrchestrator {
	inner: Arc<Inner>,
}

struct Inner {
	engine: Arc<dyn BrowserEngine>,
	config: SessionConfig,
	launch: LaunchOptions,
	qr_path: PathBuf,
	lock: LoginLock,
	credentials: Arc<dyn CredentialStore>,
	notifier: Arc<dyn NotificationSink>,
	state: Mutex<SessionState>,
	/// Page left open after a successful login; reloaded by the keep-alive.
	kept_page: tokio::sync::Mutex<Option<Box<dyn BrowserPage>>>,
	refresh_cancel: Mutex<Option<CancellationToken>>,
	attempt_cancel: Mutex<Option<CancellationToken>>,
	attempt_task: Mutex<Option<JoinHandle<Result<SessionRecord>>>>,
	progress: watch::Sender<Progress>,
	shutdown: CancellationToken,
	attempts: AtomicU64,
}

impl SessionOrchestrator {
	/// Builds an orchestrator and cleans up after any previous run.
	///
	/// A stale lock file is removed, a leftover QR snapshot is removed unless a
	/// live attempt owns it, and persisted credentials are restored.
	pub fn new(engine: Arc<dyn BrowserEngine>, config: &HarvestConfig, credentials: Arc<dyn CredentialStore>, notifier: Arc<dyn NotificationSink>) -> Result<Self> {
		config.validate()?;
		let lock = LoginLock::new(config.lock_path(), config.session.lock_ttl());
		let qr_path = config.qr_path();

		if lock.clear_stale()? {
			info!(target = "mph.lock", path = %lock.path().display(), "removed stale login lock");
		}
		if !lock.is_held()? {
			remove_quietly(&qr_path);
		}

		let mut state = SessionState::default();
		if let Some(record) = load_session(credentials.as_ref()) {
			if record.logged_in(now_secs()) {
				info!(target = "mph.session", "restored persisted session");
				state.state = LoginState::LoggedIn;
			}
			state.record = Some(record);
		}

		let launch = LaunchOptions {
			headless: config.browser.headless,
			..LaunchOptions::default()
		};
		let (progress, _) = watch::channel(Progress {
			qr_ready: false,
			finished: true,
		});

		Ok(Self {
			inner: Arc::new(Inner {
				engine,
				config: config.session.clone(),
				launch,
				qr_path,
				lock,
				credentials,
				notifier,
				state: Mutex::new(state),
				kept_page: tokio::sync::Mutex::new(None),
				refresh_cancel: Mutex::new(None),
				attempt_cancel: Mutex::new(None),
				attempt_task: Mutex::new(None),
				progress,
				shutdown: CancellationToken::new(),
				attempts: AtomicU64::new(0),
			}),
		})
	}

	/// Launch options used for the login browser.
	pub fn with_launch_options(self, launch: LaunchOptions) -> Self {
		match Arc::try_unwrap(self.inner) {
			Ok(mut inner) => {
				inner.launch = launch;
				Self { inner: Arc::new(inner) }
			}
			Err(inner) => {
				warn!(target = "mph.session", "launch options ignored, orchestrator already shared");
				Self { inner }
			}
		}
	}

	/// Starts a login attempt in the background and returns immediately.
	///
	/// When an attempt is already running the ticket says so and nothing new
	/// is started. Use [`wait_for_qr`](Self::wait_for_qr) and
	/// [`wait_for_attempt`](Self::wait_for_attempt) to follow progress.
	pub async fn request_login(&self, on_complete: Option<CompletionHook>, on_qr_ready: Option<QrReadyHook>) -> Result<LoginTicket> {
		let inner = &self.inner;
		if inner.state.lock().state == LoginState::Attempting {
			return Ok(self.busy_ticket());
		}

		let attempt = inner.next_attempt_id();
		let Some(guard) = inner.lock.try_acquire(&attempt)? else {
			info!(target = "mph.lock", path = %inner.lock.path().display(), "login lock held elsewhere");
			return Ok(self.busy_ticket());
		};

		inner.stop_keep_alive().await;
		remove_quietly(&inner.qr_path);
		{
			let mut state = inner.state.lock();
			state.transition(LoginState::Attempting);
			state.attempt = Some(attempt.clone());
			state.qr_ready = false;
			state.last_error = None;
		}
		inner.progress.send_replace(Progress {
			qr_ready: false,
			finished: false,
		});

		let cancel = inner.shutdown.child_token();
		*inner.attempt_cancel.lock() = Some(cancel.clone());
		let task = tokio::spawn(Arc::clone(inner).run_attempt(guard, attempt.clone(), cancel, on_complete, on_qr_ready));
		*inner.attempt_task.lock() = Some(task);

		info!(target = "mph.session", attempt = %attempt, "login attempt requested");
		Ok(LoginTicket {
			qr_path: inner.qr_path.clone(),
			qr_ready: false,
			already_running: false,
			attempt_id: Some(attempt),
		})
	}

	fn busy_ticket(&self) -> LoginTicket {
		let attempt_id = {
			let state = self.inner.state.lock();
			state.attempt.clone().filter(|_| state.state == LoginState::Attempting)
		};
		let attempt_id = attempt_id.or_else(|| match self.inner.lock.inspect() {
			Ok(LockState::Held(record)) => Some(record.attempt_id),
			_ => None,
		});
		LoginTicket {
			qr_path: self.inner.qr_path.clone(),
			qr_ready: self.inner.qr_path.exists(),
			already_running: true,
			attempt_id,
		}
	}

	/// Waits until the QR snapshot exists, the attempt ends, or `timeout`
	/// passes. Returns whether the snapshot is on disk.
	pub async fn wait_for_qr(&self, timeout: std::time::Duration) -> bool {
		let mut rx = self.inner.progress.subscribe();
		let ready = match tokio::time::timeout(timeout, rx.wait_for(|p| p.qr_ready || p.finished)).await {
			Ok(Ok(progress)) => progress.qr_ready,
			_ => false,
		};
		ready || self.inner.qr_path.exists()
	}

	/// Waits for the attempt started by this orchestrator to finish.
	///
	/// Without a local attempt this reports the current session, or
	/// [`HarvestError::LockContention`] while another process holds the lock.
	pub async fn wait_for_attempt(&self) -> Result<SessionRecord> {
		let task = self.inner.attempt_task.lock().take();
		if let Some(task) = task {
			return task.await.map_err(|err| HarvestError::Engine(format!("login task failed: {err}")))?;
		}
		if let Some(record) = self.session().filter(|r| r.logged_in(now_secs())) {
			return Ok(record);
		}
		if self.inner.lock.is_held()? {
			return Err(HarvestError::LockContention);
		}
		Err(HarvestError::NotLoggedIn)
	}

	/// Reloads the kept page and re-captures the session.
	///
	/// Landing anywhere but the home page marks the session expired, stops the
	/// keep-alive and closes the page.
	pub async fn refresh(&self) -> Result<SessionRecord> {
		self.inner.refresh().await
	}

	/// Logs in with a stored or given token instead of a QR scan.
	///
	/// Returns `true` when a live session was captured and persisted. Failures
	/// are logged and reported as `false`.
	pub async fn login_with_token(&self, token: Option<&str>) -> bool {
		match self.inner.token_login(token).await {
			Ok(logged_in) => logged_in,
			Err(err) => {
				warn!(target = "mph.session", error = %err, "token login failed");
				self.inner.state.lock().last_error = Some(err.to_string());
				false
			}
		}
	}

	/// Stops everything and forgets the persisted session.
	pub async fn logout(&self) -> Result<()> {
		self.inner.stop_all().await;
		clear_session(self.inner.credentials.as_ref())?;
		self.inner.state.lock().record = None;
		info!(target = "mph.session", "logged out");
		Ok(())
	}

	/// Stops any attempt and the keep-alive. Persisted credentials are kept.
	pub async fn shutdown(&self) {
		self.inner.stop_all().await;
		info!(target = "mph.session", "session orchestrator stopped");
	}

	pub fn state(&self) -> LoginState {
		self.inner.state.lock().state
	}

	pub fn is_logged_in(&self) -> bool {
		self.inner.state.lock().logged_in(now_secs())
	}

	pub fn session(&self) -> Option<SessionRecord> {
		self.inner.state.lock().record.clone()
	}

	pub fn last_error(&self) -> Option<String> {
		self.inner.state.lock().last_error.clone()
	}

	pub fn attempt_id(&self) -> Option<String> {
		self.inner.state.lock().attempt.clone()
	}

	pub fn qr_status(&self) -> QrStatus {
		QrStatus {
			path: self.inner.qr_path.clone(),
			exists: self.inner.qr_path.exists(),
			attempting: self.state() == LoginState::Attempting,
		}
	}

	pub fn config(&self) -> &SessionConfig {
		&self.inner.config
	}

	/// Whether the keep-alive currently holds an open page.
	pub async fn has_kept_page(&self) -> bool {
		self.inner.kept_page.lock().await.is_some()
	}
}

impl Inner {
	fn next_attempt_id(&self) -> String {
		let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
		format!("{}-{}-{n}", std::process::id(), Utc::now().timestamp_millis())
	}

	async fn run_attempt(
		self: Arc<Self>,
		mut guard: LockGuard,
		attempt: String,
		cancel: CancellationToken,
		on_complete: Option<CompletionHook>,
		on_qr_ready: Option<QrReadyHook>,
	) -> Result<SessionRecord> {
		let result = match self.handshake(&mut guard, &attempt, &cancel, on_qr_ready).await {
			Ok((record, scope)) => self.complete(record, scope, on_complete).await,
			Err(err) => Err(err),
		};

		if let Err(err) = guard.release() {
			warn!(target = "mph.lock", error = %err, "failed to release login lock");
		}
		remove_quietly(&self.qr_path);

		match &result {
			Ok(record) => {
				info!(
					target = "mph.session",
					attempt = %attempt,
					expiry = record.expiry.as_ref().map(|e| e.expiry_time.as_str()).unwrap_or(""),
					"login succeeded"
				);
				self.start_keep_alive();
			}
			Err(err) => {
				warn!(target = "mph.session", attempt = %attempt, error = %err, "login attempt failed");
				let mut state = self.state.lock();
				if state.attempt.as_deref() == Some(attempt.as_str()) && state.state == LoginState::Attempting {
					state.transition(LoginState::Failed);
					state.last_error = Some(err.to_string());
				}
			}
		}

		self.state.lock().qr_ready = false;
		self.progress.send_modify(|p| p.finished = true);
		result
	}

	async fn handshake(
		&self,
		guard: &mut LockGuard,
		attempt: &str,
		cancel: &CancellationToken,
		on_qr_ready: Option<QrReadyHook>,
	) -> Result<(SessionRecord, BrowserScope)> {
		let scope = BrowserScope::launch(self.engine.as_ref(), &self.launch, "login").await?;

		let outcome = tokio::select! {
			outcome = self.drive_login(scope.page(), guard, attempt, on_qr_ready) => outcome,
			_ = cancel.cancelled() => Err(HarvestError::Cancelled { attempt: attempt.to_string() }),
		};

		match outcome {
			Ok(record) => Ok((record, scope)),
			Err(err) => {
				if let Err(close_err) = scope.release().await {
					warn!(target = "mph.session", error = %close_err, "failed to close login browser");
				}
				Err(err)
			}
		}
	}

	async fn drive_login(&self, page: &dyn BrowserPage, guard: &mut LockGuard, attempt: &str, on_qr_ready: Option<QrReadyHook>) -> Result<SessionRecord> {
		let config = &self.config;
		page.goto(&config.login_url).await?;
		tokio::time::sleep(config.settle()).await;
		page.wait_visible(&config.qr_selector, config.qr_visible()).await?;

		if let Some(parent) = self.qr_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let size = page.screenshot_element(&config.qr_selector, &self.qr_path).await?;
		if size <= config.qr_min_bytes {
			return Err(HarvestError::CaptureFailure {
				path: self.qr_path.clone(),
				size,
				floor: config.qr_min_bytes,
			});
		}

		self.state.lock().qr_ready = true;
		self.progress.send_modify(|p| p.qr_ready = true);
		info!(target = "mph.session", attempt, path = %self.qr_path.display(), bytes = size, "QR code ready for scanning");
		if let Some(hook) = on_qr_ready {
			hook(&self.qr_path);
		}

		let started = Instant::now();
		let beat_every = self.lock.ttl() / 3;
		let mut last_beat = started;
		loop {
			let url = page.current_url().await?;
			if config.is_home(&url) {
				break;
			}
			let waited = started.elapsed();
			if waited >= config.login_timeout() {
				return Err(HarvestError::LoginTimeout {
					attempt: attempt.to_string(),
					waited,
				});
			}
			if last_beat.elapsed() >= beat_every {
				if let Err(err) = guard.heartbeat() {
					warn!(target = "mph.lock", error = %err, "lock heartbeat failed");
				}
				last_beat = Instant::now();
			}
			tokio::time::sleep(config.poll_interval()).await;
		}

		info!(target = "mph.session", attempt, "QR code scanned, capturing session");
		tokio::time::sleep(config.settle()).await;

		let now = now_secs();
		let record = capture_session(page, config, None, now).await?;
		if !record.logged_in(now) {
			return Err(HarvestError::NotLoggedIn);
		}
		Ok(record)
	}

	async fn complete(&self, record: SessionRecord, scope: BrowserScope, on_complete: Option<CompletionHook>) -> Result<SessionRecord> {
		let failure = match persist_session(self.credentials.as_ref(), &record) {
			Ok(true) => None,
			Ok(false) => {
				warn!(target = "mph.session", "home page reached but no token was captured");
				Some(HarvestError::NotLoggedIn)
			}
			Err(err) => Some(err),
		};
		if let Some(err) = failure {
			if let Err(close_err) = scope.release().await {
				warn!(target = "mph.session", error = %close_err, "failed to close login browser");
			}
			return Err(err);
		}

		let previous = self.kept_page.lock().await.replace(scope.into_page());
		if let Some(page) = previous {
			close_quietly(page).await;
		}
		{
			let mut state = self.state.lock();
			state.transition(LoginState::LoggedIn);
			state.record = Some(record.clone());
			state.last_error = None;
		}

		self.notifier.send(&login_message(&record), &self.config.notice_title).await;
		if let Some(hook) = on_complete {
			hook(&record, record.ext.as_ref());
		}
		Ok(record)
	}

	async fn refresh(&self) -> Result<SessionRecord> {
		let mut kept = self.kept_page.lock().await;
		let Some(page) = kept.as_deref() else {
			return Err(HarvestError::NotLoggedIn);
		};

		let previous_token = {
			let mut state = self.state.lock();
			if !state.transition(LoginState::Refreshing) {
				return Err(HarvestError::NotLoggedIn);
			}
			state.record.as_ref().map(|r| r.token.clone())
		};

		match self.reload_and_capture(page, previous_token.as_deref()).await {
			Ok(record) => {
				match persist_session(self.credentials.as_ref(), &record) {
					Ok(true) => {}
					Ok(false) => warn!(target = "mph.session", "refreshed session has no token, not persisted"),
					Err(err) => warn!(target = "mph.session", error = %err, "failed to persist refreshed session"),
				}
				let mut state = self.state.lock();
				state.transition(LoginState::LoggedIn);
				state.record = Some(record.clone());
				debug!(target = "mph.session", "session refreshed");
				Ok(record)
			}
			Err(err) => {
				{
					let mut state = self.state.lock();
					state.transition(LoginState::Expired);
					state.last_error = Some(err.to_string());
				}
				if let Some(token) = self.refresh_cancel.lock().take() {
					token.cancel();
				}
				if let Some(page) = kept.take() {
					close_quietly(page).await;
				}
				warn!(target = "mph.session", error = %err, "session refresh failed");
				Err(err)
			}
		}
	}

	async fn reload_and_capture(&self, page: &dyn BrowserPage, previous_token: Option<&str>) -> Result<SessionRecord> {
		page.reload().await?;
		let url = page.current_url().await?;
		if !self.config.is_home(&url) {
			return Err(HarvestError::SessionExpired { url });
		}
		let now = now_secs();
		let record = capture_session(page, &self.config, previous_token, now).await?;
		if !record.logged_in(now) {
			return Err(HarvestError::SessionExpired { url });
		}
		Ok(record)
	}

	fn start_keep_alive(self: &Arc<Self>) {
		let Some(interval) = self.config.refresh_interval() else {
			debug!(target = "mph.session", "session keep-alive disabled");
			return;
		};

		let token = self.shutdown.child_token();
		if let Some(old) = self.refresh_cancel.lock().replace(token.clone()) {
			old.cancel();
		}
		let weak: Weak<Self> = Arc::downgrade(self);

		tokio::spawn(async move {
			debug!(target = "mph.session", interval_secs = interval.as_secs(), "session keep-alive started");
			loop {
				tokio::select! {
					_ = token.cancelled() => break,
					_ = tokio::time::sleep(interval) => {}
				}
				if token.is_cancelled() {
					break;
				}
				let Some(inner) = weak.upgrade() else {
					break;
				};
				if !inner.state.lock().logged_in(now_secs()) {
					info!(target = "mph.session", "session no longer live, keep-alive stopping");
					break;
				}
				if inner.refresh().await.is_err() {
					break;
				}
			}
			debug!(target = "mph.session", "session keep-alive stopped");
		});
	}

	async fn stop_keep_alive(&self) {
		if let Some(token) = self.refresh_cancel.lock().take() {
			token.cancel();
		}
		let page = self.kept_page.lock().await.take();
		if let Some(page) = page {
			close_quietly(page).await;
		}
	}

	async fn stop_all(&self) {
		if let Some(token) = self.attempt_cancel.lock().take() {
			token.cancel();
		}
		let attempting = self.state.lock().state == LoginState::Attempting;
		if attempting {
			let mut rx = self.progress.subscribe();
			let _ = rx.wait_for(|p| p.finished).await;
		}
		self.attempt_task.lock().take();
		self.stop_keep_alive().await;

		let mut state = self.state.lock();
		state.transition(LoginState::Idle);
		state.attempt = None;
		state.qr_ready = false;
	}

	async fn token_login(&self, token: Option<&str>) -> Result<bool> {
		let stored = load_session(self.credentials.as_ref());
		let token = token
			.map(str::to_string)
			.or_else(|| stored.as_ref().map(|s| s.token.clone()))
			.filter(|t| !t.is_empty())
			.ok_or(HarvestError::NotLoggedIn)?;

		let scope = BrowserScope::launch(self.engine.as_ref(), &self.launch, "token-login").await?;
		let result = self.drive_token_login(scope.page(), &token, stored.as_ref()).await;
		if let Err(err) = scope.release().await {
			warn!(target = "mph.session", error = %err, "failed to close token login browser");
		}
		let record = result?;

		if !record.logged_in(now_secs()) {
			info!(target = "mph.session", "token login did not produce a live session");
			return Ok(false);
		}
		if !persist_session(self.credentials.as_ref(), &record)? {
			warn!(target = "mph.session", "token login captured no token, nothing persisted");
			return Ok(false);
		}
		{
			let mut state = self.state.lock();
			state.transition(LoginState::LoggedIn);
			state.record = Some(record.clone());
			state.last_error = None;
		}
		self.notifier.send(&login_message(&record), &self.config.notice_title).await;
		info!(target = "mph.session", "token login succeeded");
		Ok(true)
	}

	async fn drive_token_login(&self, page: &dyn BrowserPage, token: &str, stored: Option<&SessionRecord>) -> Result<SessionRecord> {
		let config = &self.config;
		let url = format!("{}?t=home/index&lang=zh_CN&token={}", config.home_url, urlencoding::encode(token));
		page.goto(&url).await?;

		let host = Url::parse(&config.home_url)
			.ok()
			.and_then(|u| u.host_str().map(str::to_string))
			.unwrap_or_default();
		let mut cookies: Vec<Cookie> = stored.map(|s| s.cookies.clone()).unwrap_or_default();
		cookies.push(Cookie::new("token", token));
		let cookies: Vec<Cookie> = cookies.into_iter().map(|c| scoped_cookie(c, &host)).collect();
		page.add_cookies(&cookies).await?;

		page.wait_visible(&config.confirm_selector, config.confirm_wait()).await?;
		page.click(&config.confirm_selector).await?;
		tokio::time::sleep(config.settle()).await;

		capture_session(page, config, Some(token), now_secs()).await
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.shutdown.cancel();
		if let Some(page) = self.kept_page.get_mut().take() {
			if let Ok(handle) = tokio::runtime::Handle::try_current() {
				handle.spawn(close_quietly(page));
			}
		}
	}
}

fn scoped_cookie(mut cookie: Cookie, host: &str) -> Cookie {
	if cookie.domain.is_empty() {
		cookie.domain = host.to_string();
	}
	if cookie.path.is_none() {
		cookie.path = Some("/".to_string());
	}
	cookie
}

async fn close_quietly(page: Box<dyn BrowserPage>) {
	if let Err(err) = page.close().await {
		warn!(target = "mph.session", error = %err, "failed to close kept page");
	}
}

fn remove_quietly(path: &Path) {
	match std::fs::remove_file(path) {
		Ok(()) => debug!(target = "mph.session", path = %path.display(), "removed QR snapshot"),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
		Err(err) => warn!(target = "mph.session", path = %path.display(), error = %err, "failed to remove QR snapshot"),
	}
}

fn now_secs() -> i64 {
	Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cookies_without_scope_get_the_home_host() {
		let cookie = scoped_cookie(Cookie::new("slave_sid", "abc"), "mp.weixin.qq.com");
		assert_eq!(cookie.domain, "mp.weixin.qq.com");
		assert_eq!(cookie.path.as_deref(), Some("/"));

		let cookie = scoped_cookie(Cookie::new("a", "b").with_domain(".qq.com").with_path("/cgi-bin"), "mp.weixin.qq.com");
		assert_eq!(cookie.domain, ".qq.com");
		assert_eq!(cookie.path.as_deref(), Some("/cgi-bin"));
	}
}
