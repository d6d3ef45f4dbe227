//! Per-request HTTP sessions with pluggable storage.
//!
//! A [`SessionManager`] builds one [`StoreHandle`] from a [`SessionConfig`] at start-up.
//! Each request then wraps its headers and that handle in a [`SessionContext`]:
//!
//! - **cookie**: the whole session is a signed (optionally encrypted) cookie,
//! - **file**: one file per session, the cookie carries a signed id,
//! - **sqlite**: one row per session, the cookie carries a signed id.
//!
//! Session values are dynamically typed; custom types must be registered with
//! [`values::register`] before a session holding them can be saved.
pub mod codec;
pub mod config;
pub mod context;
pub mod cookies;
pub mod errors;
pub mod keys;
pub mod manager;
pub mod options;
pub mod session;
pub mod store;
pub mod values;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use errors::SessionError;
pub use manager::{SessionManager, StoreKind};
pub use options::Options;
pub use session::Session;
pub use store::{Store, StoreHandle};
pub use values::{Value, Values};
