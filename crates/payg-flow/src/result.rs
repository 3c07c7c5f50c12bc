//! Result and error types for the checkout flow.

use crate::flow::FlowStep;
use crate::scenario::Scenario;
use thiserror::Error;

/// Result type for flow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Errors that can occur while provisioning fixtures or driving the flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// A session is already live for this run
    #[error("Session {id} is already active; release it before acquiring another")]
    SessionAlreadyActive {
        /// Correlation id of the live session
        id: String,
    },

    /// Release was requested but no matching session is live
    #[error("No active session to release")]
    NoActiveSession,

    /// Browsing context could not be created or disposed
    #[error("Browser context error: {message}")]
    Context {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Low-level automation failure reported by the driver
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    Timeout {
        /// What was being waited for
        waited_for: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Requested ordinal is past the last matching element
    #[error("Index {index} is out of range for {locator}: only {available} matching element(s)")]
    OrdinalOutOfRange {
        /// Locator description
        locator: String,
        /// Requested zero-based index
        index: usize,
        /// Number of elements that matched
        available: usize,
    },

    /// A single-element action matched more than one element
    #[error("Strict mode violation: {locator} resolved to {count} elements")]
    StrictModeViolation {
        /// Locator description
        locator: String,
        /// Number of elements that matched
        count: usize,
    },

    /// Post-condition of a flow step did not hold
    #[error("Post-condition '{check}' failed: {message}")]
    PostConditionFailed {
        /// Name of the check
        check: String,
        /// Error message
        message: String,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Video recording error
    #[error("Video recording failed: {message}")]
    Recording {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// A scenario task panicked
    #[error("Scenario panicked: {message}")]
    Panicked {
        /// Panic payload, if it was a string
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl FlowError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Assertion-class errors make a scenario `Failed`; everything else
    /// makes it `Broken`.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertionFailed { .. }
                | Self::PostConditionFailed { .. }
                | Self::OrdinalOutOfRange { .. }
        )
    }

    /// Build a `Panicked` error from a caught panic payload
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { message }
    }
}

/// A flow failure attributed to the named step that produced it
#[derive(Debug, Error)]
#[error("step {step} failed for {scenario}: {cause}")]
pub struct StepFailure {
    /// Step that failed
    pub step: FlowStep,
    /// Scenario being run
    pub scenario: Scenario,
    /// Underlying error
    #[source]
    pub cause: FlowError,
}

impl StepFailure {
    /// Create a new step failure
    #[must_use]
    pub const fn new(step: FlowStep, scenario: Scenario, cause: FlowError) -> Self {
        Self {
            step,
            scenario,
            cause,
        }
    }
}
