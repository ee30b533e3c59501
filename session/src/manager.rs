use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use sessionkit_core::{validate_cookie_name, ManagerConfig, SessionError, SessionResult};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cookie::{append_set_cookie, read_cookie, SetCookie};
use crate::id::generate_session_id;
use crate::registry::ProviderRegistry;
use crate::store::{ProviderRef, SessionRef};

/// Binds the session cookie to a storage backend.
///
/// `session_start`, `session_destroy` and `gc` are serialized against each other by one
/// lock. Reads and writes through the returned session handles do not take it; the
/// backend synchronizes those itself.
#[derive(Debug)]
pub struct Manager {
    cookie_name: String,
    max_lifetime: Duration,
    provider: ProviderRef,
    lock: Mutex<()>,
    gc_started: AtomicBool,
}

impl Manager {
    /// Create a manager bound to the backend registered as `provider_name`
    pub fn new(
        registry: &ProviderRegistry,
        provider_name: &str,
        cookie_name: impl Into<String>,
        max_lifetime: Duration,
    ) -> SessionResult<Self> {
        let cookie_name = cookie_name.into();
        validate_cookie_name(&cookie_name)?;
        if max_lifetime.is_zero() {
            return Err(SessionError::Config(
                "max lifetime must be greater than zero".to_string(),
            ));
        }
        let provider = registry.lookup(provider_name)?;

        info!(
            provider = %provider_name,
            cookie = %cookie_name,
            max_lifetime_secs = max_lifetime.as_secs(),
            "Session manager ready"
        );

        Ok(Self {
            cookie_name,
            max_lifetime,
            provider,
            lock: Mutex::new(()),
            gc_started: AtomicBool::new(false),
        })
    }

    pub fn from_config(registry: &ProviderRegistry, config: &ManagerConfig) -> SessionResult<Self> {
        config.validate()?;
        Self::new(
            registry,
            &config.provider,
            config.cookie_name.clone(),
            config.max_lifetime(),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// The bound storage backend
    pub fn provider(&self) -> &ProviderRef {
        &self.provider
    }

    /// Return the session for this request, creating one when needed.
    ///
    /// A request without the cookie gets a new session and a `Set-Cookie` header on the
    /// response. A cookie naming a session the backend no longer knows (destroyed,
    /// expired or forged) is treated the same way: the caller gets a fresh, empty
    /// session under a new identifier.
    pub async fn session_start(
        &self,
        request: &HeaderMap,
        response: &mut HeaderMap,
    ) -> SessionResult<SessionRef> {
        let _guard = self.lock.lock().await;

        if let Some(session_id) = read_cookie(request, &self.cookie_name) {
            match self.provider.read(&session_id, self.max_lifetime).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_not_found() => {
                    debug!("Session cookie names an unknown session, issuing a new one");
                }
                Err(e) => return Err(e),
            }
        }

        self.create_session(response).await
    }

    async fn create_session(&self, response: &mut HeaderMap) -> SessionResult<SessionRef> {
        let session_id = generate_session_id()?;
        let session = self.provider.init(&session_id).await?;

        let cookie = SetCookie::session(&self.cookie_name, &session_id, self.max_lifetime);
        append_set_cookie(response, &cookie)?;

        debug!(session_id = %session_id, "Started new session");
        Ok(session)
    }

    /// Destroy the session named by the request cookie and expire the cookie.
    ///
    /// Without the cookie this does nothing. A session that is already gone is not an error.
    pub async fn session_destroy(
        &self,
        request: &HeaderMap,
        response: &mut HeaderMap,
    ) -> SessionResult<()> {
        let Some(session_id) = read_cookie(request, &self.cookie_name) else {
            return Ok(());
        };

        let _guard = self.lock.lock().await;
        match self.provider.destroy(&session_id).await {
            Ok(()) => debug!(session_id = %session_id, "Session destroyed"),
            Err(e) if e.is_not_found() => {
                debug!(session_id = %session_id, "Session already gone")
            }
            Err(e) => return Err(e),
        }

        append_set_cookie(response, &SetCookie::expired(&self.cookie_name))
    }

    /// Run one sweep, returning how many sessions were reclaimed
    pub async fn gc(&self) -> SessionResult<usize> {
        let _guard = self.lock.lock().await;
        self.provider.gc(self.max_lifetime).await
    }

    /// Start the periodic sweep on the tokio runtime.
    ///
    /// The first sweep runs right away, the next one `max_lifetime` after the previous
    /// finished, so sweeps never overlap. Only one task may run per manager.
    pub fn start_gc(self: &Arc<Self>) -> SessionResult<GcHandle> {
        if self.gc_started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::Config(
                "session GC task already started".to_string(),
            ));
        }

        let manager = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                match manager.gc().await {
                    Ok(reclaimed) => debug!(reclaimed, "Session GC sweep finished"),
                    Err(e) => warn!(error = %e, "Session GC sweep failed"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(manager.max_lifetime) => {}
                    _ = &mut shutdown_rx => {
                        info!("Session GC received shutdown signal");
                        break;
                    }
                }
            }
        });

        Ok(GcHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }
}

/// Running periodic sweep. Dropping the handle also stops the task.
#[derive(Debug)]
pub struct GcHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GcHandle {
    /// Stop the sweep loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "Session GC task panicked");
        }
    }
}
