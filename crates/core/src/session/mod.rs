//! QR-code login orchestration.
//!
//! [`SessionOrchestrator`] owns the login browser, the cross-process login
//! lock and the keep-alive loop that periodically reloads the logged-in page.

mod capture;
mod orchestrator;
mod state;

pub use orchestrator::{CompletionHook, LoginTicket, QrReadyHook, QrStatus, SessionOrchestrator};
pub use state::LoginState;
