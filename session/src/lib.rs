//! Session management for HTTP clients
//!
//! This crate keeps server-side state for clients identified by a cookie. The `Manager`
//! binds the cookie lifecycle to a storage backend implementing the `Provider` trait,
//! looked up by name in a `ProviderRegistry`. The in-memory backend lives in `adapters`.

pub mod adapters;
pub mod cookie;
pub mod id;
pub mod manager;
pub mod registry;
pub mod store;

pub use adapters::{MemoryProvider, MemorySession};
pub use manager::{GcHandle, Manager};
pub use registry::ProviderRegistry;
pub use store::{Provider, ProviderRef, Session, SessionRef, SessionStore};

pub use sessionkit_core::{SessionError, SessionResult};
