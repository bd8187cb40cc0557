//! Data shapes for the mp-harvest pipeline.
//!
//! This crate contains the serde-serializable records exchanged between the
//! session orchestrator, the content fetcher, and the external stores. These
//! types are the "storage layer" view of the system: the shapes persisted in
//! the credential file and handed to article sinks.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no I/O, no browser access
//! * Stable on disk: field names match what the credential file already holds
//! * Cheap to clone: callers receive copies, never shared mutable state
//!
//! Behavior built on top of these types lives in `mp-harvest`.

pub mod article;
pub mod cookie;
pub mod session;

pub use article::*;
pub use cookie::*;
pub use session::*;
