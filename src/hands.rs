use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::driver::{Key, Locator, PageDriver, SelectBy};
use crate::errors::{AgentResult, DriverError};
use crate::types::BoundingBox;

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 6 Pro) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Mobile Safari/537.36";
const MOBILE_WINDOW: (u32, u32) = (412, 915);

const HIT_TEST_FN: &str = r#"function(x, y) {
  const hit = document.elementFromPoint(x, y);
  return hit && (hit === this || this.contains(hit)) ? 'ok' : 'covered';
}"#;
const BOUNDS_FN: &str = r#"function() {
  const r = this.getBoundingClientRect();
  return JSON.stringify({ x: r.x, y: r.y, width: r.width, height: r.height });
}"#;
const CLICK_FN: &str = "function() { this.click(); return 'ok'; }";
const FOCUS_FN: &str =
    "function() { this.focus(); return document.activeElement === this ? 'ok' : 'not-focused'; }";
const HAS_FOCUS_FN: &str =
    "function() { return document.activeElement === this ? 'ok' : 'not-focused'; }";
const VALUE_FN: &str = "function() { return this.value == null ? '' : String(this.value); }";
const CLEAR_FN: &str = r#"function() {
  this.value = '';
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return 'ok';
}"#;
const SELECT_ALL_FN: &str = r#"function() {
  this.focus();
  if (typeof this.select === 'function') { this.select(); return 'ok'; }
  const range = document.createRange();
  range.selectNodeContents(this);
  const sel = window.getSelection();
  sel.removeAllRanges();
  sel.addRange(range);
  return 'ok';
}"#;
const SUBMIT_FORM_FN: &str = r#"function() {
  const form = this.form || this.closest('form');
  if (!form) return 'no-form';
  if (typeof form.requestSubmit === 'function') { form.requestSubmit(); } else { form.submit(); }
  return 'ok';
}"#;
const SUBMIT_FIRST_FORM_JS: &str = r#"(() => {
  const form = document.querySelector('form');
  if (!form) return 'no-form';
  if (typeof form.requestSubmit === 'function') { form.requestSubmit(); } else { form.submit(); }
  return 'ok';
})()"#;
const SELECT_OPTION_FN: &str = r#"function(by, wanted) {
  if (this.tagName !== 'SELECT') return 'not-select';
  const opts = Array.from(this.options);
  let idx = -1;
  if (by === 'index') {
    const n = parseInt(wanted, 10);
    if (!Number.isNaN(n) && n >= 0 && n < opts.length) idx = n;
  } else if (by === 'value') {
    idx = opts.findIndex(o => o.value === wanted);
  } else {
    idx = opts.findIndex(o => o.text.trim() === wanted.trim());
  }
  if (idx < 0) return 'not-found';
  this.selectedIndex = idx;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return 'ok';
}"#;

/// A live element addressed by selector plus the DOM node it resolved to.
///
/// Each primitive looks the selector up again; if it now lands on a different
/// node the handle is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeHandle {
    selector: String,
    backend_node_id: u32,
}

/// Browser plus the tab the agent drives.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Attaches to `debugger_url` when configured, otherwise launches Chrome.
    pub fn launch(config: &BrowserConfig) -> AgentResult<Self> {
        let session = match &config.debugger_url {
            Some(url) => Self::attach(url)?,
            None => Self::start(config)?,
        };
        if config.mobile {
            session
                .tab
                .set_user_agent(MOBILE_USER_AGENT, None, Some("Android"))
                .map_err(browser_err)?;
        }
        Ok(session)
    }

    fn attach(url: &str) -> AgentResult<Self> {
        info!(%url, "attaching to running Chrome");
        let browser = Browser::connect(url.to_string()).map_err(browser_err)?;

        let existing = {
            let tabs = browser
                .get_tabs()
                .lock()
                .map_err(|e| DriverError::Browser(e.to_string()))?;
            tabs.first().cloned()
        };
        let tab = match existing {
            Some(tab) => {
                debug!("using existing tab");
                tab
            }
            None => browser.new_tab().map_err(browser_err)?,
        };

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn start(config: &BrowserConfig) -> AgentResult<Self> {
        let window_size = if config.mobile {
            MOBILE_WINDOW
        } else {
            (config.window_size[0], config.window_size[1])
        };
        let path = config.chrome_path.clone().or_else(find_chrome);
        info!(headless = config.headless, ?path, "launching Chrome");

        let options = LaunchOptions {
            headless: config.headless,
            path,
            window_size: Some(window_size),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };

        let browser = Browser::new(options).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        tab.navigate_to("about:blank").map_err(browser_err)?;
        info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Re-finds the element behind `handle`, rejecting it if the node changed.
    fn element(&self, handle: &ChromeHandle) -> Result<Element<'_>, DriverError> {
        let element = self
            .tab
            .find_element(&handle.selector)
            .map_err(|_| DriverError::NotFound(handle.selector.clone()))?;
        if element.backend_node_id != handle.backend_node_id {
            return Err(DriverError::NotFound(format!("{} (stale)", handle.selector)));
        }
        Ok(element)
    }

    fn call(
        &self,
        handle: &ChromeHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Value, DriverError> {
        let element = self.element(handle)?;
        let result = element
            .call_js_fn(function, args, false)
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    /// Runs a status-returning function and maps anything but `ok` to an error.
    fn call_status(
        &self,
        handle: &ChromeHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<(), DriverError> {
        match self.call(handle, function, args)? {
            Value::String(s) if s == "ok" => Ok(()),
            other => Err(DriverError::Script(format!(
                "{} returned {other}",
                handle.selector
            ))),
        }
    }
}

impl PageDriver for BrowserSession {
    type Handle = ChromeHandle;

    fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.tab.get_url())
    }

    fn title(&self) -> Result<String, DriverError> {
        self.tab.get_title().map_err(browser_err)
    }

    fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn resolve(&self, locator: &Locator) -> Result<ChromeHandle, DriverError> {
        let selector = css_selector(locator);
        let element = self
            .tab
            .find_element(&selector)
            .map_err(|_| DriverError::NotFound(locator.to_string()))?;
        Ok(ChromeHandle {
            backend_node_id: element.backend_node_id,
            selector,
        })
    }

    fn scroll_into_view(&self, element: &ChromeHandle) -> Result<(), DriverError> {
        self.element(element)?
            .scroll_into_view()
            .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
        Ok(())
    }

    fn bounding_box(&self, element: &ChromeHandle) -> Result<BoundingBox, DriverError> {
        let raw = self.call(element, BOUNDS_FN, Vec::new())?;
        let text = raw
            .as_str()
            .ok_or_else(|| DriverError::Script("bounding box not returned".into()))?;
        serde_json::from_str(text).map_err(|e| DriverError::Script(e.to_string()))
    }

    fn pointer_click(&self, element: &ChromeHandle, dx: f64, dy: f64) -> Result<(), DriverError> {
        let found = self.element(element)?;
        let mut point = found
            .get_midpoint()
            .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
        point.x += dx;
        point.y += dy;

        let hit = found
            .call_js_fn(HIT_TEST_FN, vec![json!(point.x), json!(point.y)], false)
            .map_err(|e| DriverError::Script(e.to_string()))?;
        if hit.value != Some(json!("ok")) {
            return Err(DriverError::NotInteractable(format!(
                "{} is covered at ({:.0}, {:.0})",
                element.selector, point.x, point.y
            )));
        }

        self.tab
            .click_point(point)
            .map_err(|e| DriverError::NotInteractable(e.to_string()))?;
        Ok(())
    }

    fn programmatic_click(&self, element: &ChromeHandle) -> Result<(), DriverError> {
        self.call_status(element, CLICK_FN, Vec::new())
    }

    fn focus(&self, element: &ChromeHandle) -> Result<(), DriverError> {
        match self.call(element, FOCUS_FN, Vec::new())? {
            Value::String(s) if s == "ok" => Ok(()),
            _ => Err(DriverError::NotInteractable(format!(
                "{} cannot take focus",
                element.selector
            ))),
        }
    }

    fn read_value(&self, element: &ChromeHandle) -> Result<String, DriverError> {
        Ok(self
            .call(element, VALUE_FN, Vec::new())?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    fn clear_value(&self, element: &ChromeHandle) -> Result<(), DriverError> {
        self.call_status(element, CLEAR_FN, Vec::new())
    }

    fn press_key(&self, element: &ChromeHandle, key: Key) -> Result<(), DriverError> {
        let name = match key {
            Key::SelectAll => return self.call_status(element, SELECT_ALL_FN, Vec::new()),
            Key::Enter => {
                self.focus(element)?;
                "Enter"
            }
            Key::Backspace => "Backspace",
            Key::Delete => "Delete",
        };
        self.tab.press_key(name).map_err(browser_err)?;
        Ok(())
    }

    fn send_text(&self, element: &ChromeHandle, text: &str) -> Result<(), DriverError> {
        // Keystrokes go to whatever holds document focus.
        if self.call(element, HAS_FOCUS_FN, Vec::new())? != json!("ok") {
            return Err(DriverError::NotInteractable(format!(
                "{} does not have focus",
                element.selector
            )));
        }
        self.tab.type_str(text).map_err(browser_err)?;
        Ok(())
    }

    fn submit_owning_form(&self, element: &ChromeHandle) -> Result<(), DriverError> {
        self.call_status(element, SUBMIT_FORM_FN, Vec::new())
    }

    fn submit_first_form(&self) -> Result<(), DriverError> {
        match self.evaluate(SUBMIT_FIRST_FORM_JS)? {
            Value::String(s) if s == "ok" => Ok(()),
            _ => Err(DriverError::NotFound("form".into())),
        }
    }

    fn select_option(
        &self,
        element: &ChromeHandle,
        by: SelectBy,
        option: &str,
    ) -> Result<(), DriverError> {
        self.call_status(
            element,
            SELECT_OPTION_FN,
            vec![json!(by.as_str()), json!(option)],
        )
    }

    fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(browser_err)?;
        Ok(())
    }

    fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(browser_err)
    }
}

fn browser_err(e: impl std::fmt::Display) -> DriverError {
    DriverError::Browser(e.to_string())
}

fn css_selector(locator: &Locator) -> String {
    match locator {
        Locator::Id(id) => format!("[id=\"{}\"]", css_escape(id)),
        Locator::Name { tag, name } => format!("{tag}[name=\"{}\"]", css_escape(name)),
        Locator::Css(path) => path.clone(),
    }
}

fn css_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Looks in the usual install locations; `None` lets headless_chrome search itself.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join(r"Google\Chrome\Application\chrome.exe"));
    }

    let found = candidates.into_iter().find(|p| p.exists());
    if found.is_none() {
        warn!("no Chrome found in the usual locations");
    }
    found
}
