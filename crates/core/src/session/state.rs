//! Login state machine.

use std::fmt;

use mph_protocol::SessionRecord;
use serde::Serialize;
use tracing::debug;

/// Orchestrator state.
///
/// `Idle -> Attempting -> {LoggedIn, Failed}` for a login attempt and
/// `LoggedIn -> Refreshing -> {LoggedIn, Expired}` for keep-alive. `Failed`
/// and `Expired` need a new login; nothing retries automatically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
	#[default]
	Idle,
	Attempting,
	LoggedIn,
	Refreshing,
	Failed,
	Expired,
}

impl LoginState {
	pub fn can_transition(self, to: LoginState) -> bool {
		use LoginState::*;
		match (self, to) {
			// logout and shutdown reset from anywhere
			(_, Idle) => true,
			(Idle | Failed | Expired | LoggedIn | Refreshing, Attempting) => true,
			(Attempting, LoggedIn | Failed) => true,
			(LoggedIn, Refreshing) => true,
			(Refreshing, LoggedIn | Expired) => true,
			// token login upgrades an idle or lapsed orchestrator in place
			(Idle | Failed | Expired | LoggedIn, LoggedIn) => true,
			_ => false,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			LoginState::Idle => "idle",
			LoginState::Attempting => "attempting",
			LoginState::LoggedIn => "logged_in",
			LoginState::Refreshing => "refreshing",
			LoginState::Failed => "failed",
			LoginState::Expired => "expired",
		}
	}
}

impl fmt::Display for LoginState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Mutable orchestrator state, always accessed under one lock.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
	pub state: LoginState,
	pub record: Option<SessionRecord>,
	pub attempt: Option<String>,
	pub qr_ready: bool,
	pub last_error: Option<String>,
}

impl SessionState {
	/// Moves to `to`, returning `false` and leaving the state alone when the
	/// transition is not allowed.
	pub fn transition(&mut self, to: LoginState) -> bool {
		if !self.state.can_transition(to) {
			debug!(target = "mph.session", from = %self.state, to = %to, "ignored state transition");
			return false;
		}
		debug!(target = "mph.session", from = %self.state, to = %to, "state transition");
		self.state = to;
		true
	}

	pub fn logged_in(&self, now: i64) -> bool {
		self.record.as_ref().is_some_and(|r| r.logged_in(now))
	}
}

#[cfg(test)]
mod tests {
	use super::LoginState::*;
	use super::*;

	#[test]
	fn attempt_and_refresh_paths_are_allowed() {
		assert!(Idle.can_transition(Attempting));
		assert!(Attempting.can_transition(LoggedIn));
		assert!(Attempting.can_transition(Failed));
		assert!(LoggedIn.can_transition(Refreshing));
		assert!(Refreshing.can_transition(Expired));
		assert!(Refreshing.can_transition(LoggedIn));
	}

	#[test]
	fn terminal_states_do_not_refresh() {
		assert!(!Failed.can_transition(Refreshing));
		assert!(!Expired.can_transition(Refreshing));
		assert!(!Idle.can_transition(Expired));
		assert!(!Attempting.can_transition(Refreshing));
	}

	#[test]
	fn rejected_transition_keeps_state() {
		let mut state = SessionState::default();
		assert!(!state.transition(Refreshing));
		assert_eq!(state.state, Idle);
		assert!(state.transition(Attempting));
		assert_eq!(state.state, Attempting);
	}
}
