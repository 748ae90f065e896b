//! Scripted stand-ins for the browser and the oracle, used by unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::brain::ReasoningOracle;
use crate::dom::Scan;
use crate::driver::{Key, Locator, PageDriver, READY_STATE_JS, SelectBy};
use crate::errors::{AgentError, DriverError};
use crate::timing::Pacer;
use crate::types::BoundingBox;

const FAKE_BOX: BoundingBox = BoundingBox {
    x: 10.0,
    y: 20.0,
    width: 120.0,
    height: 40.0,
};

fn rect() -> Value {
    json!({ "x": FAKE_BOX.x, "y": FAKE_BOX.y, "width": FAKE_BOX.width, "height": FAKE_BOX.height })
}

pub(crate) fn input(id: &str, name: &str, placeholder: &str, input_type: &str) -> Value {
    json!({
        "tag": "input",
        "input_type": input_type,
        "name": name,
        "id": id,
        "placeholder": placeholder,
        "value": "",
        "aria_label": "",
        "path": format!("body > form > input[data-fake='{id}{name}']"),
        "rect": rect(),
    })
}

pub(crate) fn link(text: &str, href: &str, n: usize) -> Value {
    json!({
        "id": "",
        "href": href,
        "text": text,
        "title": "",
        "path": format!("body > a:nth-of-type({})", n + 1),
        "rect": rect(),
    })
}

pub(crate) fn button(id: &str, text: &str) -> Value {
    json!({
        "tag": "button",
        "button_type": "submit",
        "id": id,
        "name": "",
        "text": text,
        "aria_label": "",
        "path": format!("body > button[data-fake='{id}']"),
        "rect": rect(),
    })
}

pub(crate) fn select(id: &str, options: &[&str], selected_index: i64) -> Value {
    let options: Vec<Value> = options
        .iter()
        .map(|t| json!({ "value": t.to_lowercase(), "text": t }))
        .collect();
    json!({
        "id": id,
        "name": "",
        "selected_index": selected_index,
        "options": options,
        "path": format!("body > select[data-fake='{id}']"),
        "rect": rect(),
    })
}

/// A page whose scan results are canned and whose primitives are recorded.
///
/// Handles are the locator's display string, e.g. `id:q`.
pub(crate) struct FakePage {
    url: RefCell<String>,
    title: String,
    inputs: Vec<Value>,
    links: Vec<Value>,
    buttons: Vec<Value>,
    selects: Vec<Value>,
    text: Vec<String>,
    scans_fail: bool,
    never_ready: bool,
    no_forms: bool,
    unresolvable: HashSet<String>,
    pointer_rejects: HashSet<String>,
    script_click_rejects: HashSet<String>,
    focus_rejects: HashSet<String>,
    formless: HashSet<String>,
    select_options: HashMap<String, Vec<(String, String)>>,
    calls: RefCell<Vec<String>>,
    focused: RefCell<Option<String>>,
    values: RefCell<HashMap<String, String>>,
    selected_all: RefCell<HashSet<String>>,
    chosen: RefCell<HashMap<String, String>>,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        Self {
            url: RefCell::new("https://example.com/".to_string()),
            title: "Fake page".to_string(),
            inputs: Vec::new(),
            links: Vec::new(),
            buttons: Vec::new(),
            selects: Vec::new(),
            text: Vec::new(),
            scans_fail: false,
            never_ready: false,
            no_forms: false,
            unresolvable: HashSet::new(),
            pointer_rejects: HashSet::new(),
            script_click_rejects: HashSet::new(),
            focus_rejects: HashSet::new(),
            formless: HashSet::new(),
            select_options: HashMap::new(),
            calls: RefCell::new(Vec::new()),
            focused: RefCell::new(None),
            values: RefCell::new(HashMap::new()),
            selected_all: RefCell::new(HashSet::new()),
            chosen: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn with_input(mut self, raw: Value) -> Self {
        self.inputs.push(raw);
        self
    }

    pub(crate) fn with_link(mut self, raw: Value) -> Self {
        self.links.push(raw);
        self
    }

    pub(crate) fn with_button(mut self, raw: Value) -> Self {
        self.buttons.push(raw);
        self
    }

    pub(crate) fn with_select(mut self, raw: Value) -> Self {
        let handle = format!("id:{}", raw["id"].as_str().unwrap_or_default());
        let options = raw["options"]
            .as_array()
            .map(|opts| {
                opts.iter()
                    .map(|o| {
                        (
                            o["value"].as_str().unwrap_or_default().to_string(),
                            o["text"].as_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.select_options.insert(handle, options);
        self.selects.push(raw);
        self
    }

    pub(crate) fn with_text(mut self, text: &str) -> Self {
        self.text.push(text.to_string());
        self
    }

    pub(crate) fn with_value(self, handle: &str, value: &str) -> Self {
        self.values
            .borrow_mut()
            .insert(handle.to_string(), value.to_string());
        self
    }

    pub(crate) fn failing_scans(mut self) -> Self {
        self.scans_fail = true;
        self
    }

    pub(crate) fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub(crate) fn without_forms(mut self) -> Self {
        self.no_forms = true;
        self
    }

    pub(crate) fn unresolvable(mut self, handle: &str) -> Self {
        self.unresolvable.insert(handle.to_string());
        self
    }

    pub(crate) fn rejecting_pointer(mut self, handle: &str) -> Self {
        self.pointer_rejects.insert(handle.to_string());
        self
    }

    pub(crate) fn rejecting_script_click(mut self, handle: &str) -> Self {
        self.script_click_rejects.insert(handle.to_string());
        self
    }

    /// The element refuses focus, so typed keys never reach it.
    pub(crate) fn unfocusable(mut self, handle: &str) -> Self {
        self.focus_rejects.insert(handle.to_string());
        self
    }

    pub(crate) fn formless(mut self, handle: &str) -> Self {
        self.formless.insert(handle.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub(crate) fn value_of(&self, handle: &str) -> String {
        self.values
            .borrow()
            .get(handle)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn chosen_option(&self, handle: &str) -> Option<String> {
        self.chosen.borrow().get(handle).cloned()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn take_focus(&self, element: &String) -> Result<(), DriverError> {
        if self.focus_rejects.contains(element) {
            return Err(DriverError::NotInteractable(format!("{element} cannot take focus")));
        }
        *self.focused.borrow_mut() = Some(element.clone());
        Ok(())
    }
}

impl PageDriver for FakePage {
    type Handle = String;

    fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.url.borrow().clone())
    }

    fn title(&self) -> Result<String, DriverError> {
        Ok(self.title.clone())
    }

    fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        if let Some(scan) = Scan::from_script(script) {
            if self.scans_fail {
                return Err(DriverError::Script("scan failed".into()));
            }
            return Ok(match scan {
                Scan::Inputs => Value::Array(self.inputs.clone()),
                Scan::Links => Value::Array(self.links.clone()),
                Scan::Buttons => Value::Array(self.buttons.clone()),
                Scan::Selects => Value::Array(self.selects.clone()),
                Scan::Text => json!(self.text),
                Scan::Viewport => json!({
                    "width": 1280, "height": 800, "scroll_height": 3000, "scroll_width": 1280
                }),
                Scan::ScrollOffset => json!({ "x": 0, "y": 0 }),
            });
        }
        if script == READY_STATE_JS {
            let state = if self.never_ready { "loading" } else { "complete" };
            return Ok(json!(state));
        }
        self.record(format!("script:{script}"));
        if script.contains("innerHeight") {
            return Ok(json!(800));
        }
        Ok(Value::Null)
    }

    fn resolve(&self, locator: &Locator) -> Result<String, DriverError> {
        let key = locator.to_string();
        if self.unresolvable.contains(&key) {
            return Err(DriverError::NotFound(key));
        }
        Ok(key)
    }

    fn scroll_into_view(&self, element: &String) -> Result<(), DriverError> {
        self.record(format!("scroll_into_view:{element}"));
        Ok(())
    }

    fn bounding_box(&self, _element: &String) -> Result<BoundingBox, DriverError> {
        Ok(FAKE_BOX)
    }

    fn pointer_click(&self, element: &String, dx: f64, dy: f64) -> Result<(), DriverError> {
        self.record(format!("pointer_click:{element}:{dx:.1}:{dy:.1}"));
        if self.pointer_rejects.contains(element) {
            return Err(DriverError::NotInteractable(element.clone()));
        }
        // Clicking something unfocusable still blurs the previous field.
        if self.take_focus(element).is_err() {
            *self.focused.borrow_mut() = None;
        }
        Ok(())
    }

    fn programmatic_click(&self, element: &String) -> Result<(), DriverError> {
        self.record(format!("js_click:{element}"));
        if self.script_click_rejects.contains(element) {
            return Err(DriverError::NotInteractable(element.clone()));
        }
        Ok(())
    }

    fn focus(&self, element: &String) -> Result<(), DriverError> {
        self.record(format!("focus:{element}"));
        self.take_focus(element)
    }

    fn read_value(&self, element: &String) -> Result<String, DriverError> {
        Ok(self.value_of(element))
    }

    fn clear_value(&self, element: &String) -> Result<(), DriverError> {
        self.record(format!("clear:{element}"));
        self.values.borrow_mut().remove(element);
        Ok(())
    }

    fn press_key(&self, element: &String, key: Key) -> Result<(), DriverError> {
        self.record(format!("key:{element}:{key:?}"));
        if matches!(key, Key::SelectAll | Key::Enter) {
            self.take_focus(element)?;
        }
        let mut values = self.values.borrow_mut();
        match key {
            Key::SelectAll => {
                self.selected_all.borrow_mut().insert(element.clone());
            }
            Key::Delete | Key::Backspace if self.selected_all.borrow_mut().remove(element) => {
                values.remove(element);
            }
            Key::Backspace => {
                if let Some(v) = values.get_mut(element) {
                    v.pop();
                }
            }
            Key::Delete | Key::Enter => {}
        }
        Ok(())
    }

    fn send_text(&self, element: &String, text: &str) -> Result<(), DriverError> {
        if self.focused.borrow().as_deref() != Some(element.as_str()) {
            return Err(DriverError::NotInteractable(format!("{element} does not have focus")));
        }
        self.record(format!("text:{element}:{text}"));
        let mut values = self.values.borrow_mut();
        if self.selected_all.borrow_mut().remove(element) {
            values.remove(element);
        }
        values.entry(element.clone()).or_default().push_str(text);
        Ok(())
    }

    fn submit_owning_form(&self, element: &String) -> Result<(), DriverError> {
        self.record(format!("submit_form:{element}"));
        if self.formless.contains(element) {
            return Err(DriverError::Script("no owning form".into()));
        }
        Ok(())
    }

    fn submit_first_form(&self) -> Result<(), DriverError> {
        self.record("submit_first_form".to_string());
        if self.no_forms {
            return Err(DriverError::NotFound("form".into()));
        }
        Ok(())
    }

    fn select_option(
        &self,
        element: &String,
        by: SelectBy,
        option: &str,
    ) -> Result<(), DriverError> {
        self.record(format!("select:{element}:{}:{option}", by.as_str()));
        let options = self
            .select_options
            .get(element)
            .ok_or_else(|| DriverError::Script("not a select".into()))?;
        let found = match by {
            SelectBy::Text => options.iter().find(|(_, t)| t == option),
            SelectBy::Value => options.iter().find(|(v, _)| v == option),
            SelectBy::Index => option.trim().parse::<usize>().ok().and_then(|i| options.get(i)),
        };
        let (_, text) = found.ok_or_else(|| DriverError::Script("option not found".into()))?;
        self.chosen
            .borrow_mut()
            .insert(element.clone(), text.clone());
        Ok(())
    }

    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.record(format!("navigate:{url}"));
        *self.url.borrow_mut() = url.to_string();
        Ok(())
    }

    fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Takes every chance and draws every midpoint, so the rare branches run.
pub(crate) struct EagerPacer;

impl Pacer for EagerPacer {
    fn pause(&self, _min_ms: u64, _max_ms: u64) {}

    fn chance(&self, _p: f64) -> bool {
        true
    }

    fn uniform(&self, lo: f64, hi: f64) -> f64 {
        (lo + hi) / 2.0
    }
}

/// Replays canned oracle replies in order; `Err` entries simulate transport faults.
pub(crate) struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, String>>>,
    repeat: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            repeat: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always(reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            repeat: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, AgentError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match (next, &self.repeat) {
            (Some(Ok(reply)), _) => Ok(reply),
            (Some(Err(fault)), _) => Err(AgentError::OracleCommunication(fault)),
            (None, Some(reply)) => Ok(reply.clone()),
            (None, None) => Err(AgentError::OracleCommunication("no scripted reply left".into())),
        }
    }
}
