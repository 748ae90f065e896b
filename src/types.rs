use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AgentError;

pub const MAX_LINKS: usize = 50;
pub const MAX_BUTTONS: usize = 30;
pub const MAX_SELECT_OPTIONS: usize = 20;
pub const SHOWN_SELECT_OPTIONS: usize = 10;
pub const MAX_TEXT_SNIPPETS: usize = 20;
/// Snippets must be strictly longer than this many characters...
pub const TEXT_SNIPPET_MIN_CHARS: usize = 20;
/// ...and strictly shorter than this many.
pub const TEXT_SNIPPET_MAX_CHARS: usize = 500;

pub const DEFAULT_STEP_BUDGET: usize = 20;
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// The four element classes the summarizer scans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Input,
    Link,
    Button,
    Select,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Input => "input",
            ElementKind::Link => "link",
            ElementKind::Button => "button",
            ElementKind::Select => "select",
        }
    }
}

/// What an input field is probably for, guessed from its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Search,
    Email,
    Password,
    Username,
    Phone,
    Text,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Search => "search",
            Purpose::Email => "email",
            Purpose::Password => "password",
            Purpose::Username => "username",
            Purpose::Phone => "phone",
            Purpose::Text => "text",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewport-relative rectangle as reported by `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_rendered(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// One interactive element as it appears in a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub reference_id: String,
    pub kind: ElementKind,
    /// Only inputs carry a purpose.
    pub purpose: Option<Purpose>,
    pub label: String,
    pub current_value: Option<String>,
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_height: f64,
    #[serde(default)]
    pub scroll_width: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: f64,
    pub y: f64,
}

/// Bounded description of one page state, produced once per step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
    pub scroll: ScrollOffset,
    pub elements: Vec<ElementDescriptor>,
    pub text: Vec<String>,
}

impl Summary {
    pub fn of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &ElementDescriptor> {
        self.elements.iter().filter(move |e| e.kind == kind)
    }
}

/// The closed set of actions the oracle may propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Type,
    Click,
    Submit,
    Scroll,
    Select,
    Done,
    Error,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Type => "type",
            ActionKind::Click => "click",
            ActionKind::Submit => "submit",
            ActionKind::Scroll => "scroll",
            ActionKind::Select => "select",
            ActionKind::Done => "done",
            ActionKind::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ActionKind::Done | ActionKind::Error)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type" => Ok(ActionKind::Type),
            "click" => Ok(ActionKind::Click),
            "submit" => Ok(ActionKind::Submit),
            "scroll" => Ok(ActionKind::Scroll),
            "select" => Ok(ActionKind::Select),
            "done" => Ok(ActionKind::Done),
            "error" => Ok(ActionKind::Error),
            _ => Err(AgentError::UnknownAction(s.to_string())),
        }
    }
}

/// The oracle's recommendation for the next interaction.
///
/// `parameters` is kept as the raw JSON map the oracle sent; the typed
/// accessors below are tolerant of strings where numbers or booleans
/// were expected, since oracle output is untrusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action: ActionKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub progress: String,
}

impl ActionProposal {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            parameters: Map::new(),
            reasoning: String::new(),
            progress: String::new(),
        }
    }

    pub fn error(reasoning: impl Into<String>, progress: impl Into<String>) -> Self {
        Self {
            action: ActionKind::Error,
            parameters: Map::new(),
            reasoning: reasoning.into(),
            progress: progress.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.str_param("element_id")
            .or_else(|| self.str_param("reference_id"))
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Text parameters are passed through untrimmed; whitespace may be meaningful.
    pub fn text_param(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn bool_param(&self, key: &str) -> Option<bool> {
        match self.parameters.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn int_param(&self, key: &str) -> Option<i64> {
        match self.parameters.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Final answer carried by a `done` proposal.
    pub fn result_text(&self) -> String {
        self.text_param("result")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.progress.clone()).filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| "Task completed".to_string())
    }
}

/// Compacted record of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub step_index: usize,
    pub action: ActionKind,
    pub parameters: Map<String, Value>,
    pub url_at_time: String,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Step {}: {} {}",
            self.step_index,
            self.action,
            Value::Object(self.parameters.clone())
        )
    }
}

/// Per-run state, mutated only by the control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    pub goal: String,
    pub step_index: usize,
    pub step_budget: usize,
    pub history: Vec<HistoryEntry>,
}

impl TaskContext {
    pub fn new(goal: impl Into<String>, step_budget: usize) -> Self {
        Self {
            goal: goal.into(),
            step_index: 0,
            step_budget,
            history: Vec::new(),
        }
    }

    pub fn recent_history(&self, window: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    pub fn budget_left(&self) -> bool {
        self.step_index < self.step_budget
    }
}

/// What a caller gets back from a run, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub result_or_error: String,
    pub steps_taken: usize,
    pub history: Vec<HistoryEntry>,
}
