// Shared pieces of the session suite:
// - Error taxonomy used by every crate
// - Configuration loading

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
