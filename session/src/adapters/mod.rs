pub mod in_memory;

pub use in_memory::{MemoryProvider, MemorySession, MEMORY_PROVIDER};
