//! Process-level coordination for mp-harvest.
//!
//! Only one QR login attempt may run per data directory, across every process
//! sharing it. The [`lock`] module implements that exclusivity as a JSON lock
//! record carrying its holder's PID and a heartbeat, so a crashed holder can
//! be detected and reclaimed instead of blocking logins forever.

pub mod liveness;
pub mod lock;

pub use liveness::pid_is_alive;
pub use lock::{LockError, LockGuard, LockRecord, LockState, LoginLock};
