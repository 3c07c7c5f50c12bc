//! Browser capability traits.
//!
//! ```text
//! Launcher ──launch──▶ BrowserDriver ──new_context──▶ PageDriver
//!  (per run)            (one session)                 (one per scenario)
//! ```
//!
//! Two implementations exist: the chromiumoxide backend in the `browser` module
//! (feature `browser`) and the in-memory storefront in [`crate::mock`].
//! Everything above this module talks only to the traits.

use crate::config::RunConfig;
use crate::ident::CorrelationId;
use crate::locator::Locator;
use crate::result::FlowResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// When navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// `DOMContentLoaded` fired
    #[default]
    DomContentLoaded,
    /// `load` fired
    Load,
}

impl LoadState {
    /// `document.readyState` values that satisfy this state
    #[must_use]
    pub const fn ready_states(self) -> &'static [&'static str] {
        match self {
            Self::DomContentLoaded => &["interactive", "complete"],
            Self::Load => &["complete"],
        }
    }
}

/// Options for a new isolated browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Correlation id of the context
    pub id: CorrelationId,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
}

impl ContextOptions {
    /// Options carrying the run's viewport
    #[must_use]
    pub fn from_config(id: CorrelationId, config: &RunConfig) -> Self {
        Self {
            id,
            viewport_width: config.viewport_width,
            viewport_height: config.viewport_height,
        }
    }
}

/// Screenshot data with metadata
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Raw PNG data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timestamp when screenshot was taken
    pub timestamp: std::time::SystemTime,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: std::time::SystemTime::now(),
        }
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }
}

/// A launched browser shared by every scenario of a run
#[async_trait]
pub trait BrowserDriver: Send + Sync + fmt::Debug {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Create a fresh context (own cookies, storage, cache) with one page
    async fn new_context(&self, options: ContextOptions) -> FlowResult<Box<dyn PageDriver>>;

    /// Shut the browser down
    async fn close(&self) -> FlowResult<()>;
}

/// One page inside an isolated context, exclusively owned by a scenario.
///
/// Methods never wait on their own; auto-waiting lives one level up in
/// [`crate::isolation::PageHandle`].
#[async_trait]
pub trait PageDriver: Send + Sync + fmt::Debug {
    /// Navigate and wait for `state`
    async fn goto(&mut self, url: &str, state: LoadState) -> FlowResult<()>;

    /// Number of elements currently matching
    async fn count(&mut self, locator: &Locator) -> FlowResult<usize>;

    /// Click the `index`-th match; `Ok(false)` when it does not exist
    async fn click(&mut self, locator: &Locator, index: usize) -> FlowResult<bool>;

    /// Whether the `index`-th match exists and is rendered
    async fn is_visible(&mut self, locator: &Locator, index: usize) -> FlowResult<bool>;

    /// Capture the viewport as PNG
    async fn screenshot(&mut self) -> FlowResult<Screenshot>;

    /// Dispose of the page and its context
    async fn close(&mut self) -> FlowResult<()>;
}

/// Starts a browser for a run
#[async_trait]
pub trait Launcher: Send + Sync + fmt::Debug {
    /// Launch with the run's settings
    async fn launch(&self, config: &RunConfig) -> FlowResult<Arc<dyn BrowserDriver>>;
}
