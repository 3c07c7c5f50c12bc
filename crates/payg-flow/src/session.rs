//! Session provider: exactly one shared browser per run.
//!
//! The provider owns the session's lifecycle. [`SessionProvider::acquire`]
//! launches the browser, [`SessionProvider::release`] tears it down, and
//! [`SessionProvider::with_session`] scopes the two so teardown also runs
//! when the body fails or panics.

use crate::config::RunConfig;
use crate::driver::{BrowserDriver, Launcher};
use crate::ident::{CorrelationId, IdSource, RandomIds};
use crate::result::{FlowError, FlowResult};
use crate::sink::DiagnosticSink;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Diagnostic label for session lifecycle lines
pub const SESSION_LABEL: &str = "BrowserFixture";

/// A live browser session, shared read-only by every scenario of the run
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: CorrelationId,
    driver: Arc<dyn BrowserDriver>,
    open_contexts: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Correlation id of the session
    #[must_use]
    pub const fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Browser behind the session
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    /// Contexts opened on this session and not yet closed
    #[must_use]
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    pub(crate) fn context_opened(&self) {
        self.open_contexts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn context_closed(&self) {
        // Saturating: a double close must not wrap the counter
        let _ = self
            .open_contexts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[derive(Debug)]
enum SessionSlot {
    Vacant,
    Launching(CorrelationId),
    Live(CorrelationId),
}

/// Provisions and tears down the run's single browser session
#[derive(Debug)]
pub struct SessionProvider {
    config: Arc<RunConfig>,
    launcher: Arc<dyn Launcher>,
    sink: Arc<DiagnosticSink>,
    ids: Arc<dyn IdSource>,
    slot: Mutex<SessionSlot>,
}

impl SessionProvider {
    /// Create a provider that launches through `launcher`
    #[must_use]
    pub fn new(
        config: Arc<RunConfig>,
        launcher: Arc<dyn Launcher>,
        sink: Arc<DiagnosticSink>,
    ) -> Self {
        Self {
            config,
            launcher,
            sink,
            ids: Arc::new(RandomIds),
            slot: Mutex::new(SessionSlot::Vacant),
        }
    }

    /// Use a different id source
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, SessionSlot> {
        // The slot holds no invariant a panicking holder could break
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a session is live or launching
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(*self.slot(), SessionSlot::Vacant)
    }

    /// Launch the run's browser.
    ///
    /// # Errors
    ///
    /// `SessionAlreadyActive` while another session is live or launching;
    /// `BrowserLaunch` when the browser cannot be started.
    pub async fn acquire(&self) -> FlowResult<SessionHandle> {
        let id = {
            let mut slot = self.slot();
            match &*slot {
                SessionSlot::Live(id) | SessionSlot::Launching(id) => {
                    return Err(FlowError::SessionAlreadyActive {
                        id: id.to_string(),
                    });
                }
                SessionSlot::Vacant => {}
            }
            let id = self.ids.next_id();
            *slot = SessionSlot::Launching(id.clone());
            id
        };

        self.sink
            .log(SESSION_LABEL, format!("New browser ({id}) being created..."));
        tracing::info!(
            session = %id,
            headless = self.config.headless,
            slow_motion_ms = self.config.slow_motion_ms,
            "launching browser"
        );

        match self.launcher.launch(&self.config).await {
            Ok(driver) => {
                *self.slot() = SessionSlot::Live(id.clone());
                tracing::debug!(session = %id, backend = driver.backend(), "browser ready");
                Ok(SessionHandle {
                    id,
                    driver,
                    open_contexts: Arc::new(AtomicUsize::new(0)),
                })
            }
            Err(e) => {
                *self.slot() = SessionSlot::Vacant;
                tracing::error!(session = %id, error = %e, "browser launch failed");
                Err(e)
            }
        }
    }

    /// Tear the session down.
    ///
    /// Contexts still open are closed with the browser; a warning names how
    /// many. The slot is vacated even when closing the browser fails.
    ///
    /// # Errors
    ///
    /// `NoActiveSession` when `handle` is not the live session; otherwise
    /// whatever the browser reported while closing.
    pub async fn release(&self, handle: SessionHandle) -> FlowResult<()> {
        {
            let slot = self.slot();
            match &*slot {
                SessionSlot::Live(id) if *id == handle.id => {}
                _ => return Err(FlowError::NoActiveSession),
            }
        }

        let leaked = handle.open_contexts();
        if leaked > 0 {
            tracing::warn!(
                session = %handle.id,
                contexts = leaked,
                "releasing session with contexts still open"
            );
        }

        let closed = handle.driver.close().await;
        *self.slot() = SessionSlot::Vacant;
        self.sink
            .log(SESSION_LABEL, format!("Browser {} torn down", handle.id));
        if let Err(e) = &closed {
            tracing::warn!(session = %handle.id, error = %e, "browser close reported an error");
        }
        closed
    }

    /// Run `body` with a fresh session and release it afterwards, whether
    /// the body returns or panics. A panic is resumed after teardown.
    ///
    /// # Errors
    ///
    /// Acquisition errors. A failure to release is logged, not returned.
    pub async fn with_session<'r, T, F>(&self, body: F) -> FlowResult<T>
    where
        F: FnOnce(SessionHandle) -> BoxFuture<'r, T>,
    {
        let session = self.acquire().await?;
        let outcome = AssertUnwindSafe(body(session.clone()))
            .catch_unwind()
            .await;
        if let Err(e) = self.release(session).await {
            tracing::warn!(error = %e, "session release failed");
        }
        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ident::SequentialIds;
    use crate::mock::Storefront;

    fn provider(store: &Storefront) -> (SessionProvider, Arc<DiagnosticSink>) {
        let sink = Arc::new(DiagnosticSink::disabled(0).with_capture());
        let provider = SessionProvider::new(
            Arc::new(RunConfig::default()),
            Arc::new(store.launcher()),
            Arc::clone(&sink),
        )
        .with_ids(Arc::new(SequentialIds::new("s", 1)));
        (provider, sink)
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let store = Storefront::new();
        let (provider, sink) = provider(&store);

        let session = provider.acquire().await.unwrap();
        assert!(provider.is_active());
        assert_eq!(session.id().as_str(), "s1");
        provider.release(session).await.unwrap();

        assert!(!provider.is_active());
        assert_eq!(store.stats().live_browsers(), 0);
        let messages: Vec<_> = sink.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec!["New browser (s1) being created...", "Browser s1 torn down"]
        );
        assert!(sink.entries().iter().all(|e| e.label == SESSION_LABEL));
    }

    #[tokio::test]
    async fn test_second_acquire_rejected() {
        let store = Storefront::new();
        let (provider, _) = provider(&store);
        let session = provider.acquire().await.unwrap();
        let err = provider.acquire().await.unwrap_err();
        assert!(matches!(err, FlowError::SessionAlreadyActive { ref id } if id == "s1"));
        provider.release(session).await.unwrap();
        assert_eq!(store.stats().launches, 1);
    }

    #[tokio::test]
    async fn test_release_without_acquire() {
        let store = Storefront::new();
        let (provider, _) = provider(&store);
        let session = provider.acquire().await.unwrap();
        let stale = session.clone();
        provider.release(session).await.unwrap();
        assert!(matches!(
            provider.release(stale).await,
            Err(FlowError::NoActiveSession)
        ));
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_slot_vacant() {
        let store = Storefront::new().with_launch_failure();
        let (provider, _) = provider(&store);
        assert!(matches!(
            provider.acquire().await,
            Err(FlowError::BrowserLaunch { .. })
        ));
        assert!(!provider.is_active());
    }

    #[tokio::test]
    async fn test_with_session_releases_on_return() {
        let store = Storefront::new();
        let (provider, _) = provider(&store);
        let id = provider
            .with_session(|s| async move { s.id().to_string() }.boxed())
            .await
            .unwrap();
        assert_eq!(id, "s1");
        assert!(!provider.is_active());
        assert_eq!(store.stats().live_browsers(), 0);
    }

    #[tokio::test]
    async fn test_with_session_releases_on_panic() {
        let store = Storefront::new();
        let (provider, sink) = provider(&store);
        let caught = AssertUnwindSafe(provider.with_session(|_s| {
            async move {
                let explode = true;
                if explode {
                    panic!("scenario blew up");
                }
                0_u8
            }
            .boxed()
        }))
        .catch_unwind()
        .await;
        assert!(caught.is_err());
        assert!(!provider.is_active());
        assert_eq!(store.stats().live_browsers(), 0);
        assert_eq!(sink.entries_mentioning("torn down").len(), 1);
    }

    #[tokio::test]
    async fn test_context_counter_saturates() {
        let store = Storefront::new();
        let (provider, _) = provider(&store);
        let handle = provider.acquire().await.unwrap();
        handle.context_closed();
        assert_eq!(handle.open_contexts(), 0);
        handle.context_opened();
        handle.context_opened();
        handle.context_closed();
        assert_eq!(handle.open_contexts(), 1);
    }
}
