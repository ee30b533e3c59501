use std::collections::HashMap;

use sessionkit_core::{SessionError, SessionResult};
use tracing::debug;

use crate::store::ProviderRef;

/// Storage backends available to managers, keyed by name.
///
/// Owned by the composition root. Each backend registers itself through an explicit
/// initialization call at startup (see `adapters::in_memory::register`).
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderRef>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under `name`.
    ///
    /// # Panics
    ///
    /// Registration happens once at startup, so an empty name or a name registered
    /// twice is a programming error and panics.
    pub fn register(&mut self, name: impl Into<String>, provider: ProviderRef) {
        let name = name.into();
        if name.is_empty() {
            panic!("session: register called with an empty provider name");
        }
        if self.providers.contains_key(&name) {
            panic!("session: register called twice for provider {}", name);
        }

        debug!(provider = %name, "Registered session provider");
        self.providers.insert(name, provider);
    }

    /// Look up a backend by name
    pub fn lookup(&self, name: &str) -> SessionResult<ProviderRef> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::UnknownProvider(name.to_string()))
    }

    /// Registered backend names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
