//! Generational in-memory session store.
//!
//! This crate keeps authenticated sessions in memory with:
//! - A short-term window of generations that rotates on a fixed interval
//! - An optional long-term window for sessions kept past normal expiry
//! - Background promotion of sessions that are read while aging
//! - One-shot random tokens for handing a session to another client
//! - Listener and secondary-storage hooks
//!
//! # Example
//!
//! ```rust,ignore
//! use sessiond_store::{RotationClock, SessionRecord, SessionStore, StoreConfig};
//!
//! let store = SessionStore::new(
//!     StoreConfig::default()
//!         .with_max_sessions(10_000)
//!         .with_short_term_interval(Duration::from_secs(600)),
//! );
//! let clock = RotationClock::start(store.clone());
//!
//! let session = store.add_session(SessionRecord::new("42", "1"), false)?;
//! let token = session.random_token();
//! ```

mod clock;
mod config;
mod error;
mod generation;
mod listener;
mod promotion;
mod record;
mod storage;
mod store;
mod token;
mod window;

pub use clock::RotationClock;
pub use config::{
    DEFAULT_LONG_TERM_DEPTH, DEFAULT_LONG_TERM_INTERVAL, DEFAULT_MAX_SESSIONS,
    DEFAULT_RANDOM_TOKEN_TTL, DEFAULT_SHORT_TERM_DEPTH, DEFAULT_SHORT_TERM_INTERVAL, StoreConfig,
};
pub use error::{Error, Result};
pub use listener::SessionListener;
pub use record::{SessionHandle, SessionRecord, SessionSnapshot};
pub use storage::{NoStorage, SessionStorage};
pub use store::{SessionLocation, SessionStore, StoreStats};
pub use window::WindowKind;
