//! Isolation provider: one fresh browsing context and page per scenario.
//!
//! A context has its own cookies, storage and cache, so consent given in
//! one scenario never leaks into another. When recording is enabled each
//! context gets its own GIF, written on close and named after the context.
//!
//! [`PageHandle`] is the scenario's only way to touch the page. Every
//! interaction auto-waits (bounded by the step timeout), is followed by the
//! slow-motion delay, and feeds a frame to the recorder.

use crate::config::{RunConfig, MAX_STEP_TIMEOUT_MS};
use crate::driver::{ContextOptions, LoadState, PageDriver};
use crate::ident::{CorrelationId, IdSource, RandomIds};
use crate::locator::Locator;
use crate::recording::{VideoConfig, VideoRecorder};
use crate::result::{FlowError, FlowResult};
use crate::session::SessionHandle;
use crate::sink::DiagnosticSink;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Diagnostic label for context lifecycle lines
pub const CONTEXT_LABEL: &str = "PageFixture";

/// Result of a scoped page run
#[derive(Debug)]
pub struct PageRun<T> {
    /// Context the body ran in
    pub context_id: CorrelationId,
    /// Recording written on close
    pub video: Option<PathBuf>,
    /// What the body returned
    pub value: T,
}

/// A page inside its own context, exclusively owned by one scenario
#[derive(Debug)]
pub struct PageHandle {
    id: CorrelationId,
    session: SessionHandle,
    page: Box<dyn PageDriver>,
    config: Arc<RunConfig>,
    recorder: Option<VideoRecorder>,
    actions: usize,
    closed: bool,
}

impl PageHandle {
    /// Correlation id of the context
    #[must_use]
    pub const fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Id of the owning session
    #[must_use]
    pub const fn session_id(&self) -> &CorrelationId {
        self.session.id()
    }

    /// Page actions performed so far
    #[must_use]
    pub const fn actions(&self) -> usize {
        self.actions
    }

    /// Frames captured so far
    #[must_use]
    pub fn frames(&self) -> usize {
        self.recorder.as_ref().map_or(0, VideoRecorder::frame_count)
    }

    fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.config.step_timeout())
            .unwrap_or_else(|| now + Duration::from_millis(MAX_STEP_TIMEOUT_MS))
    }

    async fn pause_until(&self, deadline: Instant) {
        let now = Instant::now();
        let remaining = deadline.saturating_duration_since(now);
        tokio::time::sleep(self.config.poll_interval().min(remaining)).await;
    }

    async fn after_action(&mut self) {
        self.actions += 1;
        let slow = self.config.slow_motion();
        if !slow.is_zero() {
            tokio::time::sleep(slow).await;
        }
        if self.recorder.is_none() {
            return;
        }
        let shot = match self.page.screenshot().await {
            Ok(shot) => shot,
            Err(e) => {
                tracing::warn!(context = %self.id, error = %e, "frame capture failed");
                return;
            }
        };
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.capture(&shot) {
                tracing::warn!(context = %self.id, error = %e, "frame decode failed");
            }
        }
    }

    /// Navigate and wait for `DOMContentLoaded`
    pub async fn goto(&mut self, url: &str) -> FlowResult<()> {
        let timeout = self.config.step_timeout();
        tracing::debug!(context = %self.id, url, "goto");
        tokio::time::timeout(timeout, self.page.goto(url, LoadState::DomContentLoaded))
            .await
            .map_err(|_| FlowError::Timeout {
                waited_for: format!("navigation to {url}"),
                ms: self.config.step_timeout_ms,
            })??;
        self.after_action().await;
        Ok(())
    }

    /// Current number of matches, without waiting
    pub async fn count(&mut self, locator: &Locator) -> FlowResult<usize> {
        self.page.count(locator).await
    }

    /// Wait until at least `min` elements match
    pub async fn wait_for_count(&mut self, locator: &Locator, min: usize) -> FlowResult<usize> {
        let deadline = self.deadline();
        let mut failed = None;
        loop {
            let polled = self.page.count(locator).await;
            if let Some(n) = retry_driver_error(polled, &mut failed)? {
                if n >= min {
                    return Ok(n);
                }
            }
            if Instant::now() >= deadline {
                if let Some(e) = failed {
                    return Err(e);
                }
                return Err(FlowError::Timeout {
                    waited_for: format!("{locator} to match at least {min} element(s)"),
                    ms: self.config.step_timeout_ms,
                });
            }
            self.pause_until(deadline).await;
        }
    }

    /// Poll until the `index`-th match is visible or `deadline` passes
    async fn visible_by(
        &mut self,
        locator: &Locator,
        index: usize,
        deadline: Instant,
    ) -> FlowResult<bool> {
        let mut failed = None;
        loop {
            let polled = self.page.is_visible(locator, index).await;
            if retry_driver_error(polled, &mut failed)? == Some(true) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return failed.map_or(Ok(false), Err);
            }
            self.pause_until(deadline).await;
        }
    }

    /// Match count once it reaches `needed` or stops changing for the
    /// settle window. Zero matches are waited out until the deadline.
    ///
    /// A settled count below `needed` is read once more before it is
    /// returned, so a batch landing on the last poll is not missed.
    async fn settled_count(
        &mut self,
        locator: &Locator,
        needed: usize,
        deadline: Instant,
    ) -> FlowResult<usize> {
        let settle = self.config.settle();
        let mut failed = None;
        let mut last: Option<usize> = None;
        let mut stable_since = Instant::now();
        loop {
            let polled = self.page.count(locator).await;
            if let Some(n) = retry_driver_error(polled, &mut failed)? {
                if last != Some(n) {
                    last = Some(n);
                    stable_since = Instant::now();
                }
            }
            let seen = last.unwrap_or(0);
            if seen >= needed {
                return Ok(seen);
            }
            let now = Instant::now();
            if seen > 0 && failed.is_none() && now.duration_since(stable_since) >= settle {
                let polled = self.page.count(locator).await;
                match retry_driver_error(polled, &mut failed)? {
                    Some(n) if n == seen => return Ok(seen),
                    Some(n) => {
                        last = Some(n);
                        stable_since = Instant::now();
                        continue;
                    }
                    None => {}
                }
            }
            if now >= deadline {
                if let Some(e) = failed {
                    return Err(e);
                }
                if seen == 0 {
                    return Err(FlowError::Timeout {
                        waited_for: format!("{locator} to appear"),
                        ms: self.config.step_timeout_ms,
                    });
                }
                return Ok(seen);
            }
            self.pause_until(deadline).await;
        }
    }

    /// Click the single element matching `locator`.
    ///
    /// Waits for it to be visible, then fails with `StrictModeViolation`
    /// if more than one element matches.
    pub async fn click(&mut self, locator: &Locator) -> FlowResult<()> {
        let deadline = self.deadline();
        if !self.visible_by(locator, 0, deadline).await? {
            return Err(FlowError::Timeout {
                waited_for: format!("{locator} to be visible"),
                ms: self.config.step_timeout_ms,
            });
        }
        let count = self.page.count(locator).await?;
        if count > 1 {
            return Err(FlowError::StrictModeViolation {
                locator: locator.to_string(),
                count,
            });
        }
        self.dispatch_click(locator, 0).await
    }

    /// Click the `index`-th match (zero-based).
    ///
    /// Fails with `OrdinalOutOfRange` as soon as the match count has settled
    /// at or below `index`, without waiting out the step timeout.
    pub async fn click_nth(&mut self, locator: &Locator, index: usize) -> FlowResult<()> {
        let deadline = self.deadline();
        let available = self.settled_count(locator, index + 1, deadline).await?;
        if available <= index {
            return Err(FlowError::OrdinalOutOfRange {
                locator: locator.to_string(),
                index,
                available,
            });
        }
        if !self.visible_by(locator, index, deadline).await? {
            return Err(FlowError::Timeout {
                waited_for: format!("{locator} #{index} to be visible"),
                ms: self.config.step_timeout_ms,
            });
        }
        self.dispatch_click(locator, index).await
    }

    async fn dispatch_click(&mut self, locator: &Locator, index: usize) -> FlowResult<()> {
        tracing::debug!(context = %self.id, %locator, index, "click");
        if !self.page.click(locator, index).await? {
            return Err(FlowError::driver(format!(
                "{locator} #{index} detached before it could be clicked"
            )));
        }
        self.after_action().await;
        Ok(())
    }

    /// Whether the first match is visible right now
    pub async fn is_visible(&mut self, locator: &Locator) -> FlowResult<bool> {
        self.page.is_visible(locator, 0).await
    }

    /// Wait up to the step timeout for the first match to become visible
    pub async fn wait_visible(&mut self, locator: &Locator) -> FlowResult<bool> {
        let deadline = self.deadline();
        self.visible_by(locator, 0, deadline).await
    }

    /// Assert the first match becomes visible within the step timeout
    pub async fn expect_visible(&mut self, locator: &Locator) -> FlowResult<()> {
        if self.wait_visible(locator).await? {
            Ok(())
        } else {
            Err(FlowError::AssertionFailed {
                message: format!(
                    "expected {locator} to be visible within {}ms",
                    self.config.step_timeout_ms
                ),
            })
        }
    }

    /// Assert no match is visible within the step timeout
    pub async fn expect_hidden(&mut self, locator: &Locator) -> FlowResult<()> {
        let deadline = self.deadline();
        let mut failed = None;
        loop {
            let polled = self.page.is_visible(locator, 0).await;
            if retry_driver_error(polled, &mut failed)? == Some(false) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                if let Some(e) = failed {
                    return Err(e);
                }
                return Err(FlowError::AssertionFailed {
                    message: format!(
                        "expected {locator} to be hidden within {}ms",
                        self.config.step_timeout_ms
                    ),
                });
            }
            self.pause_until(deadline).await;
        }
    }
}

/// A driver error inside a polling loop reads as "not yet": a navigation
/// tears down the page's execution context while queries are in flight.
/// The error is kept so the loop can report it at the deadline; a
/// successful poll clears it. Other errors end the loop.
fn retry_driver_error<T>(
    polled: FlowResult<T>,
    failed: &mut Option<FlowError>,
) -> FlowResult<Option<T>> {
    match polled {
        Ok(value) => {
            *failed = None;
            Ok(Some(value))
        }
        Err(e @ FlowError::Driver { .. }) => {
            tracing::trace!(error = %e, "query failed, polling again");
            *failed = Some(e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        if !self.closed {
            // Cannot await teardown here; the browser reclaims the context on session close
            tracing::warn!(context = %self.id, "page dropped without being closed");
            self.session.context_closed();
        }
    }
}

/// Opens and closes per-scenario contexts on a session
#[derive(Debug)]
pub struct IsolationProvider {
    config: Arc<RunConfig>,
    sink: Arc<DiagnosticSink>,
    ids: Arc<dyn IdSource>,
}

impl IsolationProvider {
    /// Create a provider
    #[must_use]
    pub fn new(config: Arc<RunConfig>, sink: Arc<DiagnosticSink>) -> Self {
        Self {
            config,
            sink,
            ids: Arc::new(RandomIds),
        }
    }

    /// Use a different id source
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Where a context's recording is written
    #[must_use]
    pub fn video_path(&self, id: &CorrelationId) -> PathBuf {
        self.config.video_dir.join(format!("{id}.gif"))
    }

    /// Create a fresh context and page on `session`
    pub async fn open(&self, session: &SessionHandle) -> FlowResult<PageHandle> {
        let id = self.ids.next_id();
        let options = ContextOptions::from_config(id.clone(), &self.config);
        let limit: Duration = self.config.step_timeout();
        let page = tokio::time::timeout(limit, session.driver().new_context(options))
            .await
            .map_err(|_| FlowError::Context {
                message: format!("context {id} was not created within {}ms", limit.as_millis()),
            })??;
        session.context_opened();
        tracing::debug!(session = %session.id(), context = %id, "context opened");

        let recorder = self
            .config
            .record_video
            .then(|| VideoRecorder::new(VideoConfig::from_run_config(&self.config)));

        Ok(PageHandle {
            id,
            session: session.clone(),
            page,
            config: Arc::clone(&self.config),
            recorder,
            actions: 0,
            closed: false,
        })
    }

    /// Dispose of the context and write its recording. Never fails; problems
    /// are logged. Returns the recording path, if one was written.
    pub async fn close(&self, mut handle: PageHandle) -> Option<PathBuf> {
        if let Err(e) = handle.page.close().await {
            tracing::warn!(context = %handle.id, error = %e, "context close reported an error");
        }
        handle.closed = true;
        handle.session.context_closed();

        let video = match handle.recorder.take() {
            Some(recorder) => {
                let path = self.video_path(&handle.id);
                match tokio::task::spawn_blocking(move || recorder.finish(&path)).await {
                    Ok(Ok(written)) => written,
                    Ok(Err(e)) => {
                        tracing::warn!(context = %handle.id, error = %e, "recording not saved");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(context = %handle.id, error = %e, "recording task failed");
                        None
                    }
                }
            }
            None => None,
        };

        let shown = video
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());
        self.sink.log(
            CONTEXT_LABEL,
            format!("Context {} torn down. Video at {shown}", handle.id),
        );
        video
    }

    /// Run `body` against a fresh page and close it afterwards, whether the
    /// body returns or panics. A panic is resumed after teardown.
    ///
    /// The body's future may borrow the page but nothing else short-lived;
    /// move `Arc`s into the closure for shared state.
    pub async fn with_page<T, F>(&self, session: &SessionHandle, body: F) -> FlowResult<PageRun<T>>
    where
        F: for<'a> FnOnce(&'a mut PageHandle) -> BoxFuture<'a, T>,
    {
        let mut page = self.open(session).await?;
        let context_id = page.id().clone();
        let outcome = AssertUnwindSafe(body(&mut page)).catch_unwind().await;
        let video = self.close(page).await;
        match outcome {
            Ok(value) => Ok(PageRun {
                context_id,
                video,
                value,
            }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
