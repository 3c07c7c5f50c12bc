//! payg-flow: end-to-end test of the pay-as-you-go handset checkout journey.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ScenarioRunner                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  SessionProvider ──acquire──▶ SessionHandle (one per run)        │
//! │        │                          │                              │
//! │        │                 IsolationProvider ──open──▶ PageHandle  │
//! │        │                          │          (one per scenario)  │
//! │        │                          ▼                              │
//! │        │                  FlowExecutor::run(page, scenario)      │
//! │        │                          │                              │
//! │        ▼                          ▼                              │
//! │  release ◀──────────────── close (video path)                    │
//! │                                                                  │
//! │  DiagnosticSink: [DD/MM/YYYY, HH:MM:SS] [label] message          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The browser sits behind [`BrowserDriver`]/[`PageDriver`]: chromium over
//! CDP with the `browser` feature, or the in-memory [`Storefront`].

#![warn(missing_docs)]

#[cfg(feature = "browser")]
pub mod browser;
mod config;
mod driver;
mod flow;
mod ident;
mod isolation;
mod locator;
pub mod mock;
#[allow(clippy::cast_possible_truncation)]
mod recording;
mod result;
mod runner;
mod scenario;
mod session;
mod sink;

#[cfg(feature = "browser")]
pub use browser::CdpLauncher;
pub use config::{
    ConfigOverrides, Profile, ProfileSettings, RunConfig, DEBUG_ENV, DEFAULT_BASE_URL,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLE_MS, DEFAULT_STEP_TIMEOUT_MS, MAX_STEP_TIMEOUT_MS,
};
pub use driver::{BrowserDriver, ContextOptions, Launcher, LoadState, PageDriver, Screenshot};
pub use flow::{
    Action, FlowExecutor, FlowLocators, FlowReport, FlowStep, PostCondition, StepPlan, FLOW_LABEL,
};
pub use ident::{CorrelationId, IdSource, RandomIds, SequentialIds};
pub use isolation::{IsolationProvider, PageHandle, PageRun, CONTEXT_LABEL};
pub use locator::{normalize, Locator, Role, Selector, TextMatch};
pub use mock::{SimulatedLauncher, StoreStats, Storefront};
pub use recording::{VideoConfig, VideoFrame, VideoRecorder, MAX_FRAME_WIDTH};
pub use result::{FlowError, FlowResult, StepFailure};
pub use runner::{RunObserver, RunSummary, ScenarioOutcome, ScenarioRunner, Verdict};
pub use scenario::{Scenario, ScenarioMatrix, DEFAULT_PAIRS};
pub use session::{SessionHandle, SessionProvider, SESSION_LABEL};
pub use sink::{DiagnosticEntry, DiagnosticSink, TIMESTAMP_FORMAT};

/// Everything a test or binary usually needs
pub mod prelude {
    pub use super::{
        DiagnosticSink, FlowError, FlowExecutor, FlowResult, FlowStep, IsolationProvider,
        PageHandle, RunConfig, RunSummary, Scenario, ScenarioMatrix, ScenarioRunner,
        SessionProvider, Storefront, Verdict,
    };
}
