//! The contract between the agent and a live browser page.
//!
//! Everything the summarizer and executor need from the browser goes through
//! [`PageDriver`]. The production implementation lives in `hands.rs`; tests use
//! a scripted fake.

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::errors::DriverError;
use crate::types::BoundingBox;

pub const READY_STATE_JS: &str = "document.readyState";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How to find an element again after the page scan enumerated it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(String),
    Name { tag: String, name: String },
    /// Structural CSS path computed in the page, e.g. `body > div:nth-of-type(2) > a`.
    Css(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "id:{id}"),
            Locator::Name { tag, name } => write!(f, "name:{tag}:{name}"),
            Locator::Css(path) => write!(f, "css:{path}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Delete,
    /// Select the whole content of the focused field.
    SelectAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectBy {
    Text,
    Value,
    Index,
}

impl SelectBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "label" => Some(SelectBy::Text),
            "value" => Some(SelectBy::Value),
            "index" => Some(SelectBy::Index),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SelectBy::Text => "text",
            SelectBy::Value => "value",
            SelectBy::Index => "index",
        }
    }
}

pub trait PageDriver {
    /// An opaque reference to one live element. Only valid until the page mutates.
    type Handle: Clone + fmt::Debug;

    fn current_url(&self) -> Result<String, DriverError>;

    fn title(&self) -> Result<String, DriverError>;

    /// Evaluates `script` in page context and returns a JSON-compatible value.
    fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    fn resolve(&self, locator: &Locator) -> Result<Self::Handle, DriverError>;

    fn scroll_into_view(&self, element: &Self::Handle) -> Result<(), DriverError>;

    fn bounding_box(&self, element: &Self::Handle) -> Result<BoundingBox, DriverError>;

    /// Dispatches a real pointer click at the element centre shifted by (`dx`, `dy`).
    fn pointer_click(&self, element: &Self::Handle, dx: f64, dy: f64) -> Result<(), DriverError>;

    /// Calls the element's own `click()` from script.
    fn programmatic_click(&self, element: &Self::Handle) -> Result<(), DriverError>;

    /// Moves document focus to the element, failing with `NotInteractable`
    /// if it does not take it.
    fn focus(&self, element: &Self::Handle) -> Result<(), DriverError>;

    fn read_value(&self, element: &Self::Handle) -> Result<String, DriverError>;

    fn clear_value(&self, element: &Self::Handle) -> Result<(), DriverError>;

    fn press_key(&self, element: &Self::Handle, key: Key) -> Result<(), DriverError>;

    /// Types `text` into the element, which must already hold focus.
    fn send_text(&self, element: &Self::Handle, text: &str) -> Result<(), DriverError>;

    fn submit_owning_form(&self, element: &Self::Handle) -> Result<(), DriverError>;

    fn submit_first_form(&self) -> Result<(), DriverError>;

    fn select_option(
        &self,
        element: &Self::Handle,
        by: SelectBy,
        option: &str,
    ) -> Result<(), DriverError>;

    fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// PNG bytes of the current viewport.
    fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Polls `document.readyState` until it is `complete` or `timeout` expires.
    fn wait_until_ready(&self, timeout: Duration) -> Result<(), DriverError> {
        let started = Instant::now();
        loop {
            if let Ok(Value::String(state)) = self.evaluate(READY_STATE_JS) {
                if state == "complete" {
                    return Ok(());
                }
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout(timeout.as_millis() as u64));
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }
}
