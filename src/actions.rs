use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{Key, PageDriver, SelectBy};
use crate::errors::{AgentError, AgentResult, DriverError};
use crate::refs::ElementRefStore;
use crate::timing::Pacer;
use crate::types::{ActionKind, ActionProposal};

const VIEWPORT_HEIGHT_JS: &str = "window.innerHeight";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "top" => Some(ScrollDirection::Top),
            "bottom" => Some(ScrollDirection::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Declared mobile mode: direct clear primitive and programmatic clicks.
    pub mobile: bool,
    /// Bound on the page-ready wait after a click or submit.
    pub ready_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            mobile: false,
            ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Performs one proposed interaction against the live page.
///
/// Reads the reference store, never writes it, and never lets a fault escape:
/// every outcome is folded into the `bool` returned by [`execute`](Self::execute).
pub struct ActionExecutor<'a, D: PageDriver> {
    driver: &'a D,
    pacer: &'a dyn Pacer,
    options: ExecutorOptions,
}

impl<'a, D: PageDriver> ActionExecutor<'a, D> {
    pub fn new(driver: &'a D, pacer: &'a dyn Pacer, options: ExecutorOptions) -> Self {
        Self {
            driver,
            pacer,
            options,
        }
    }

    pub fn execute(&self, proposal: &ActionProposal, refs: &ElementRefStore<D::Handle>) -> bool {
        match self.dispatch(proposal, refs) {
            Ok(()) => {
                info!(action = %proposal.action, "action succeeded");
                true
            }
            Err(e) => {
                warn!(action = %proposal.action, error = %e, "action failed");
                false
            }
        }
    }

    fn dispatch(
        &self,
        proposal: &ActionProposal,
        refs: &ElementRefStore<D::Handle>,
    ) -> AgentResult<()> {
        match proposal.action {
            ActionKind::Type => {
                let element = target(proposal, refs)?;
                let text = proposal
                    .text_param("text")
                    .ok_or(AgentError::MissingParameter("text"))?;
                let clear_first = proposal.bool_param("clear_first").unwrap_or(true);
                self.type_text(element, &text, clear_first)
            }
            ActionKind::Click => {
                let element = target(proposal, refs)?;
                let programmatic = proposal.bool_param("programmatic").unwrap_or(false);
                self.click(element, programmatic)?;
                self.settle_page();
                Ok(())
            }
            ActionKind::Submit => {
                match proposal.reference_id() {
                    Some(id) => self.submit(Some(refs.resolve(id)?))?,
                    None => self.submit(None)?,
                }
                self.settle_page();
                Ok(())
            }
            ActionKind::Select => {
                let element = target(proposal, refs)?;
                let option = proposal
                    .text_param("option")
                    .ok_or(AgentError::MissingParameter("option"))?;
                let by_raw = proposal.str_param("by").unwrap_or("text");
                let by = SelectBy::parse(by_raw).ok_or_else(|| AgentError::InvalidParameter {
                    name: "by",
                    value: by_raw.to_string(),
                })?;
                self.select(element, &option, by)
            }
            ActionKind::Scroll => {
                let raw = proposal.str_param("direction").unwrap_or("down");
                let direction =
                    ScrollDirection::parse(raw).ok_or_else(|| AgentError::InvalidParameter {
                        name: "direction",
                        value: raw.to_string(),
                    })?;
                self.scroll(direction, proposal.int_param("amount"))
            }
            ActionKind::Done | ActionKind::Error => {
                Err(AgentError::UnknownAction(format!(
                    "'{}' is terminal and has no page interaction",
                    proposal.action
                )))
            }
        }
    }

    /// Off-screen elements are not reliably interactable, so every element
    /// action starts here.
    fn bring_into_view(&self, element: &D::Handle, min_ms: u64, max_ms: u64) -> AgentResult<()> {
        self.driver
            .scroll_into_view(element)
            .map_err(AgentError::from_interaction)?;
        self.pacer.pause(min_ms, max_ms);
        Ok(())
    }

    pub fn type_text(&self, element: &D::Handle, text: &str, clear_first: bool) -> AgentResult<()> {
        self.bring_into_view(element, 500, 1200)?;

        // A script click does not move focus, so a covered field is focused directly.
        self.driver
            .pointer_click(element, 0.0, 0.0)
            .or_else(|e| match e {
                DriverError::NotInteractable(_) => self.driver.focus(element),
                other => Err(other),
            })
            .map_err(AgentError::from_interaction)?;
        self.pacer.pause(300, 700);

        let has_content = self
            .driver
            .read_value(element)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if clear_first && has_content {
            if self.options.mobile {
                self.driver.clear_value(element)?;
            } else {
                self.driver.press_key(element, Key::SelectAll)?;
                self.pacer.pause(100, 300);
                self.driver.press_key(element, Key::Delete)?;
            }
            self.pacer.pause(300, 600);
        }

        self.type_like_human(element, text)?;
        debug!(chars = text.chars().count(), "typed text");
        Ok(())
    }

    fn type_like_human(&self, element: &D::Handle, text: &str) -> AgentResult<()> {
        let words: Vec<&str> = text.split(' ').collect();
        for (i, word) in words.iter().enumerate() {
            if word.chars().count() > 3 && self.pacer.chance(0.05) {
                // Overshoot by one wrong letter, back out two, retype the last.
                let wrong = LETTERS[(self.pacer.uniform(0.0, 25.999) as usize).min(25)] as char;
                self.driver.send_text(element, &format!("{word}{wrong}"))?;
                self.pacer.pause(200, 400);
                self.driver.press_key(element, Key::Backspace)?;
                self.pacer.pause(100, 200);
                self.driver.press_key(element, Key::Backspace)?;
                self.pacer.pause(100, 200);
                if let Some(last) = word.chars().last() {
                    self.driver.send_text(element, &last.to_string())?;
                }
                self.pacer.pause(100, 200);
            } else {
                for c in word.chars() {
                    self.driver.send_text(element, &c.to_string())?;
                    if "aeiou".contains(c.to_ascii_lowercase()) {
                        self.pacer.pause(80, 120);
                    } else {
                        self.pacer.pause(120, 180);
                    }
                    if self.pacer.chance(0.03) {
                        self.pacer.pause(300, 800);
                    }
                }
            }

            if i + 1 < words.len() {
                self.driver.send_text(element, " ")?;
                self.pacer.pause(150, 250);
                if self.pacer.chance(0.1) {
                    self.pacer.pause(500, 1200);
                }
            }
        }
        Ok(())
    }

    /// Offset pointer click with a single programmatic fallback.
    pub fn click(&self, element: &D::Handle, programmatic: bool) -> AgentResult<()> {
        self.bring_into_view(element, 300, 600)?;

        if programmatic || self.options.mobile {
            self.driver
                .programmatic_click(element)
                .map_err(AgentError::from_interaction)?;
        } else {
            match self.offset_click(element) {
                Ok(()) => {}
                Err(DriverError::NotInteractable(reason)) => {
                    warn!(%reason, "pointer click rejected, falling back to programmatic click");
                    self.driver
                        .programmatic_click(element)
                        .map_err(AgentError::from_interaction)?;
                }
                Err(other) => return Err(AgentError::from_interaction(other)),
            }
        }

        self.pacer.pause(500, 1000);
        Ok(())
    }

    /// Clicks somewhere inside the inner quarter of the element box.
    fn offset_click(&self, element: &D::Handle) -> Result<(), DriverError> {
        let bounds = self.driver.bounding_box(element)?;
        let dx = self.pacer.uniform(-bounds.width / 4.0, bounds.width / 4.0);
        let dy = self.pacer.uniform(-bounds.height / 4.0, bounds.height / 4.0);
        self.driver.pointer_click(element, dx, dy)
    }

    pub fn submit(&self, element: Option<&D::Handle>) -> AgentResult<()> {
        let Some(element) = element else {
            self.driver.submit_first_form()?;
            self.pacer.pause(1000, 2000);
            return Ok(());
        };

        self.bring_into_view(element, 300, 500)?;
        if let Err(e) = self.driver.submit_owning_form(element) {
            debug!(error = %e, "form submit failed, confirming with Enter");
            self.driver.press_key(element, Key::Enter)?;
        }
        self.pacer.pause(1000, 2000);
        Ok(())
    }

    pub fn select(&self, element: &D::Handle, option: &str, by: SelectBy) -> AgentResult<()> {
        self.bring_into_view(element, 300, 500)?;
        self.driver.select_option(element, by, option)?;
        debug!(option, by = by.as_str(), "option selected");
        Ok(())
    }

    pub fn scroll(&self, direction: ScrollDirection, amount: Option<i64>) -> AgentResult<()> {
        if self.pacer.chance(0.3) {
            let micro = self.pacer.uniform(10.0, 50.0).round();
            self.driver
                .evaluate(&format!("window.scrollBy(0, {micro});"))?;
            self.pacer.pause(100, 300);
        }

        let script = match direction {
            ScrollDirection::Down | ScrollDirection::Up => {
                let (lo, hi) = if direction == ScrollDirection::Down {
                    (0.5, 0.9)
                } else {
                    (0.3, 0.7)
                };
                let distance = match amount {
                    Some(px) => px.abs() as f64 + self.pacer.uniform(-20.0, 20.0),
                    None => self.viewport_height() * self.pacer.uniform(lo, hi),
                };
                let signed = if direction == ScrollDirection::Down {
                    distance
                } else {
                    -distance
                };
                format!("window.scrollBy({{ top: {}, behavior: 'smooth' }});", signed.round())
            }
            ScrollDirection::Top => "window.scrollTo({ top: 0, behavior: 'smooth' });".to_string(),
            ScrollDirection::Bottom => {
                "window.scrollTo({ top: document.body.scrollHeight, behavior: 'smooth' });"
                    .to_string()
            }
        };
        self.driver.evaluate(&script)?;
        self.pacer.pause(300, 1500);

        if self.pacer.chance(0.2) {
            let correction = self.pacer.uniform(-30.0, 30.0).round();
            self.driver
                .evaluate(&format!("window.scrollBy(0, {correction});"))?;
            self.pacer.pause(200, 400);
        }
        debug!(?direction, "scrolled");
        Ok(())
    }

    fn viewport_height(&self) -> f64 {
        self.driver
            .evaluate(VIEWPORT_HEIGHT_JS)
            .ok()
            .and_then(|v| v.as_f64())
            .filter(|h| *h > 0.0)
            .unwrap_or(800.0)
    }

    /// Navigation may follow a click or submit; give the page a bounded chance to load.
    fn settle_page(&self) {
        if let Err(e) = self.driver.wait_until_ready(self.options.ready_timeout) {
            warn!(error = %e, "page not ready after action");
        }
        self.pacer.pause(500, 1000);
    }
}

fn target<'s, H>(proposal: &ActionProposal, refs: &'s ElementRefStore<H>) -> AgentResult<&'s H> {
    let id = proposal
        .reference_id()
        .ok_or(AgentError::MissingParameter("element_id"))?;
    refs.resolve(id)
}
