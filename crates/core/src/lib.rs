//! Session orchestration and article acquisition for the mp publishing
//! platform.
//!
//! - [`session::SessionOrchestrator`] runs the QR-code login handshake under a
//!   cross-process lock and keeps the resulting session alive.
//! - [`article::ContentFetcher`] loads article pages, classifies terminal
//!   states and extracts sanitized content.
//! - [`sanitize::ContentSanitizer`] and [`cookies`] are pure helpers usable on
//!   their own.
//!
//! Browsers are reached through the [`engine::BrowserEngine`] seam; the
//! `mph-chromium` crate implements it over the DevTools protocol and
//! [`testing`] provides a scripted fake.

pub mod article;
pub mod config;
pub mod cookies;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod notify;
pub mod sanitize;
pub mod session;
pub mod store;
pub mod testing;

pub use article::{ContentFetcher, FetchOutcome, TerminalState};
pub use config::{BrowserSettings, FetchConfig, HarvestConfig, ProfileSelectors, SessionConfig};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use engine::{BrowserEngine, BrowserKind, BrowserPage, BrowserScope, LaunchOptions};
pub use error::{HarvestError, Result};
pub use mph_protocol::{AccountProfile, AccountRef, Article, Cookie, Expiry, SessionRecord};
pub use notify::{NoopNotifier, NotificationSink};
pub use sanitize::{ContentSanitizer, SanitizeRules};
pub use session::{LoginState, LoginTicket, SessionOrchestrator};
pub use store::{ArticleStore, MemoryArticleStore};
