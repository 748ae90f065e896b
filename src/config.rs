use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};
use crate::types::{DEFAULT_HISTORY_WINDOW, DEFAULT_STEP_BUDGET};

const CONFIG_DIR_NAME: &str = "page-pilot";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub run: RunConfig,
    pub oracle: OracleConfig,
    pub browser: BrowserConfig,
    pub pacing: PacingConfig,
    pub warmup: WarmupConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub step_budget: usize,
    /// How many recent history entries the oracle sees.
    pub history_window: usize,
    /// Pause between steps, `[min, max]` in milliseconds.
    pub step_delay_ms: [u64; 2],
    pub ready_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            step_delay_ms: [800, 1500],
            ready_timeout_secs: 10,
        }
    }
}

impl RunConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Stored key; falls back to `ANTHROPIC_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com/v1".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Declared mobile mode: phone-sized viewport, programmatic clicks.
    pub mobile: bool,
    pub chrome_path: Option<PathBuf>,
    /// Attach to an already running Chrome instead of launching one.
    pub debugger_url: Option<String>,
    pub window_size: [u32; 2],
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            mobile: false,
            chrome_path: None,
            debugger_url: None,
            window_size: [1366, 768],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub enabled: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub sites: Vec<String>,
    pub dismiss_consent: bool,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sites: vec![
                "https://example.com".to_string(),
                "https://httpbin.org/headers".to_string(),
            ],
            dismiss_consent: true,
        }
    }
}

impl AgentConfig {
    /// Defaults, then the TOML file, then the process environment.
    ///
    /// An explicit `path` must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> AgentResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Overlays environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> AgentResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = var("ANTHROPIC_API_KEY") {
            if self.oracle.api_key.is_none() {
                self.oracle.api_key = Some(key);
            }
        }
        if let Some(model) = var("PAGE_PILOT_MODEL") {
            self.oracle.model = model;
        }
        if let Some(steps) = var("PAGE_PILOT_MAX_STEPS") {
            self.run.step_budget = steps.trim().parse().map_err(|_| {
                AgentError::Config(format!("PAGE_PILOT_MAX_STEPS is not a number: {steps:?}"))
            })?;
        }
        if let Some(flag) = var("PAGE_PILOT_MOBILE") {
            self.browser.mobile = parse_flag("PAGE_PILOT_MOBILE", &flag)?;
        }
        if let Some(flag) = var("PAGE_PILOT_HEADLESS") {
            self.browser.headless = parse_flag("PAGE_PILOT_HEADLESS", &flag)?;
        }
        if let Some(path) = var("CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
        if let Some(url) = var("CHROME_DEBUGGER_URL") {
            self.browser.debugger_url = Some(url);
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn parse_flag(name: &str, raw: &str) -> AgentResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Config(format!("{name} is not a boolean: {raw:?}"))),
    }
}
