//! Run configuration.
//!
//! A single debug/production switch expands into the browser settings; the
//! resolved [`RunConfig`] is built once at start-up and handed to every
//! component by `Arc` instead of being read from ambient state.

use crate::result::{FlowError, FlowResult};
use crate::scenario::ScenarioMatrix;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable carrying the debug switch
pub const DEBUG_ENV: &str = "PAYG_FLOW_DEBUG";

/// Home page of the retail site under test
pub const DEFAULT_BASE_URL: &str = "https://www.vodafone.ie";

/// Default per-step wait budget (30 seconds, matching the browser default)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Longest accepted per-step wait budget (one hour)
pub const MAX_STEP_TIMEOUT_MS: u64 = 3_600_000;

/// Default polling interval for auto-waiting
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// How long a match count must stay unchanged before an ordinal is judged
/// out of range.
///
/// A listing that renders in batches with a pause longer than this between
/// batches is judged on the partial count; raise `settle_ms` for such pages.
/// A longer window delays every genuine bounds failure by the same amount.
pub const DEFAULT_SETTLE_MS: u64 = 750;

/// Debug or production profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Visible window, slowed down, chatty console
    Debug,
    /// Headless, full speed, silent console
    #[default]
    Production,
}

impl Profile {
    /// Map the boolean switch onto a profile
    #[must_use]
    pub const fn from_debug(debug: bool) -> Self {
        if debug {
            Self::Debug
        } else {
            Self::Production
        }
    }

    /// Read the switch from [`DEBUG_ENV`]; unset means production
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(DEBUG_ENV)
            .ok()
            .map(|v| Self::from_debug(parse_flag(&v)))
    }

    /// Whether this is the debug profile
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Browser settings implied by the profile
    #[must_use]
    pub const fn settings(self) -> ProfileSettings {
        match self {
            Self::Debug => ProfileSettings {
                headless: false,
                slow_motion_ms: 200,
                verbosity: 2,
            },
            Self::Production => ProfileSettings {
                headless: true,
                slow_motion_ms: 0,
                verbosity: 0,
            },
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// The three values the profile switch controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSettings {
    /// Run without a visible window
    pub headless: bool,
    /// Delay inserted after every page action
    pub slow_motion_ms: u64,
    /// 0 = silent console, >= 1 mirrors diagnostics to the console
    pub verbosity: u8,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Profile the settings were derived from
    pub profile: Profile,
    /// Run without a visible window
    pub headless: bool,
    /// Delay inserted after every page action
    pub slow_motion_ms: u64,
    /// Console mirroring level for the diagnostic sink
    pub verbosity: u8,
    /// Home page of the site under test
    pub base_url: String,
    /// Diagnostic log file
    pub log_path: PathBuf,
    /// Directory receiving one recording per context
    pub video_dir: PathBuf,
    /// Whether contexts record video
    pub record_video: bool,
    /// Wait budget for each step
    pub step_timeout_ms: u64,
    /// Polling interval for auto-waiting
    pub poll_interval_ms: u64,
    /// Stable-count window for ordinal bounds checks
    pub settle_ms: u64,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Scenarios to run
    pub scenarios: ScenarioMatrix,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::for_profile(Profile::default())
    }
}

impl RunConfig {
    /// Expand a profile into a full configuration
    #[must_use]
    pub fn for_profile(profile: Profile) -> Self {
        let settings = profile.settings();
        Self {
            profile,
            headless: settings.headless,
            slow_motion_ms: settings.slow_motion_ms,
            verbosity: settings.verbosity,
            base_url: DEFAULT_BASE_URL.to_string(),
            log_path: PathBuf::from("log.log"),
            video_dir: PathBuf::from("videos"),
            record_video: true,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            settle_ms: DEFAULT_SETTLE_MS,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
            scenarios: ScenarioMatrix::default(),
        }
    }

    /// Resolve from an optional YAML file and the environment switch.
    ///
    /// Precedence, lowest first: profile defaults, file, [`DEBUG_ENV`].
    pub fn resolve(path: Option<&Path>) -> FlowResult<Self> {
        let overrides = match path {
            Some(p) => ConfigOverrides::load(p)?,
            None => ConfigOverrides::default(),
        };
        let env_profile = Profile::from_env();
        Ok(overrides.apply_to(env_profile))
    }

    /// Parse a YAML document of overrides on top of its profile
    pub fn from_yaml_str(yaml: &str) -> FlowResult<Self> {
        let overrides: ConfigOverrides = serde_yaml_ng::from_str(yaml)?;
        Ok(overrides.apply_to(None))
    }

    /// Switch profile, resetting the three profile-controlled values
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        let settings = profile.settings();
        self.profile = profile;
        self.headless = settings.headless;
        self.slow_motion_ms = settings.slow_motion_ms;
        self.verbosity = settings.verbosity;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the diagnostic log path
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set the video directory
    #[must_use]
    pub fn with_video_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.video_dir = dir.into();
        self
    }

    /// Enable or disable per-context recording
    #[must_use]
    pub const fn with_record_video(mut self, record: bool) -> Self {
        self.record_video = record;
        self
    }

    /// Set the per-step timeout
    #[must_use]
    pub const fn with_step_timeout_ms(mut self, ms: u64) -> Self {
        self.step_timeout_ms = ms;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the settle window for ordinal bounds checks
    #[must_use]
    pub const fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    /// Set the slow-motion delay
    #[must_use]
    pub const fn with_slow_motion_ms(mut self, ms: u64) -> Self {
        self.slow_motion_ms = ms;
        self
    }

    /// Set console verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Replace the scenario matrix
    #[must_use]
    pub fn with_scenarios(mut self, scenarios: ScenarioMatrix) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Step timeout as a `Duration`
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Poll interval as a `Duration`
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Settle window as a `Duration`
    #[must_use]
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Slow-motion delay as a `Duration`
    #[must_use]
    pub const fn slow_motion(&self) -> Duration {
        Duration::from_millis(self.slow_motion_ms)
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> FlowResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(FlowError::config("base_url must not be empty"));
        }
        if self.step_timeout_ms == 0 {
            return Err(FlowError::config("step_timeout_ms must be positive"));
        }
        if self.step_timeout_ms > MAX_STEP_TIMEOUT_MS {
            return Err(FlowError::config(format!(
                "step_timeout_ms must not exceed {MAX_STEP_TIMEOUT_MS}"
            )));
        }
        if self.scenarios.is_empty() {
            return Err(FlowError::config("scenario matrix is empty"));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(FlowError::config("viewport dimensions must be positive"));
        }
        Ok(())
    }
}

/// Partial configuration as written in a YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigOverrides {
    /// The debug/production switch
    pub debug: Option<bool>,
    /// Override headless mode
    pub headless: Option<bool>,
    /// Override slow-motion delay
    pub slow_motion_ms: Option<u64>,
    /// Override console verbosity
    pub verbosity: Option<u8>,
    /// Override base URL
    pub base_url: Option<String>,
    /// Override log path
    pub log_path: Option<PathBuf>,
    /// Override video directory
    pub video_dir: Option<PathBuf>,
    /// Override recording switch
    pub record_video: Option<bool>,
    /// Override step timeout
    pub step_timeout_ms: Option<u64>,
    /// Override poll interval
    pub poll_interval_ms: Option<u64>,
    /// Override settle window
    pub settle_ms: Option<u64>,
    /// Override viewport width
    pub viewport_width: Option<u32>,
    /// Override viewport height
    pub viewport_height: Option<u32>,
    /// Override chromium path
    pub chromium_path: Option<String>,
    /// Override sandbox mode
    pub sandbox: Option<bool>,
    /// Override the scenario matrix
    pub scenarios: Option<ScenarioMatrix>,
}

impl ConfigOverrides {
    /// Load overrides from a YAML file
    pub fn load(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FlowError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml_ng::from_str(&text)?)
    }

    /// Apply on top of profile defaults. A profile forced from outside (the
    /// environment switch) wins over the file's `debug` key while explicit
    /// per-field overrides in the file still apply.
    #[must_use]
    pub fn apply_to(self, forced_profile: Option<Profile>) -> RunConfig {
        let profile = forced_profile
            .or_else(|| self.debug.map(Profile::from_debug))
            .unwrap_or_default();
        let mut config = RunConfig::for_profile(profile);

        if let Some(v) = self.headless {
            config.headless = v;
        }
        if let Some(v) = self.slow_motion_ms {
            config.slow_motion_ms = v;
        }
        if let Some(v) = self.verbosity {
            config.verbosity = v;
        }
        if let Some(v) = self.base_url {
            config.base_url = v;
        }
        if let Some(v) = self.log_path {
            config.log_path = v;
        }
        if let Some(v) = self.video_dir {
            config.video_dir = v;
        }
        if let Some(v) = self.record_video {
            config.record_video = v;
        }
        if let Some(v) = self.step_timeout_ms {
            config.step_timeout_ms = v;
        }
        if let Some(v) = self.poll_interval_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.settle_ms {
            config.settle_ms = v;
        }
        if let Some(v) = self.viewport_width {
            config.viewport_width = v;
        }
        if let Some(v) = self.viewport_height {
            config.viewport_height = v;
        }
        if self.chromium_path.is_some() {
            config.chromium_path = self.chromium_path;
        }
        if let Some(v) = self.sandbox {
            config.sandbox = v;
        }
        if let Some(v) = self.scenarios {
            config.scenarios = v;
        }
        config
    }
}
