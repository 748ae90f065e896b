use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::driver::{Locator, PageDriver};
use crate::refs::ElementRefStore;
use crate::types::{
    BoundingBox, ElementDescriptor, ElementKind, MAX_BUTTONS, MAX_LINKS, MAX_SELECT_OPTIONS,
    MAX_TEXT_SNIPPETS, Purpose, SHOWN_SELECT_OPTIONS, ScrollOffset, Summary,
    TEXT_SNIPPET_MAX_CHARS, TEXT_SNIPPET_MIN_CHARS, Viewport,
};

/// Helpers shared by every scan script. Read-only: nothing in the page is
/// modified, elements are addressed afterwards by id, name or CSS path.
const SCAN_PRELUDE: &str = r#"
  const visible = (el) => {
    const r = el.getBoundingClientRect();
    if (!(r.width > 0 && r.height > 0)) return null;
    if (el.offsetParent === null && getComputedStyle(el).position !== 'fixed') return null;
    return r;
  };
  const rect = (r) => ({ x: r.x, y: r.y, width: r.width, height: r.height });
  const cssPath = (el) => {
    const parts = [];
    while (el && el.nodeType === 1 && el !== document.documentElement) {
      const tag = el.tagName.toLowerCase();
      const parent = el.parentElement;
      if (!parent) { parts.unshift(tag); break; }
      const same = Array.from(parent.children).filter(c => c.tagName === el.tagName);
      parts.unshift(same.length > 1 ? tag + ':nth-of-type(' + (same.indexOf(el) + 1) + ')' : tag);
      el = parent;
    }
    return parts.join(' > ');
  };
  const sharedName = (el) => !!el.name && document.getElementsByName(el.name).length > 1;
"#;

const INPUTS_BODY: &str = r#"
  const out = [];
  const skip = new Set(['hidden', 'submit', 'button', 'reset', 'image']);
  document.querySelectorAll('input, textarea').forEach(el => {
    if (skip.has(el.type)) return;
    const r = visible(el);
    if (!r) return;
    out.push({
      tag: el.tagName.toLowerCase(),
      input_type: el.type || 'text',
      name: el.name || '',
      shared_name: sharedName(el),
      id: el.id || '',
      placeholder: el.placeholder || '',
      value: el.value || '',
      aria_label: el.getAttribute('aria-label') || '',
      path: cssPath(el),
      rect: rect(r)
    });
  });
  return out;
"#;

const LINKS_BODY: &str = r#"
  const out = [];
  document.querySelectorAll('a[href]').forEach(el => {
    const r = visible(el);
    if (!r) return;
    const text = (el.innerText || el.textContent || '').trim();
    if (!text) return;
    out.push({
      id: el.id || '',
      href: el.href,
      text: text.substring(0, 100),
      title: el.title || '',
      path: cssPath(el),
      rect: rect(r)
    });
  });
  return out;
"#;

const BUTTONS_BODY: &str = r#"
  const out = [];
  document.querySelectorAll('button, input[type="submit"], input[type="button"], [role="button"]').forEach(el => {
    const r = visible(el);
    if (!r) return;
    const text = (el.innerText || el.textContent || el.value || '').trim();
    if (!text && el.type !== 'submit') return;
    out.push({
      tag: el.tagName.toLowerCase(),
      button_type: el.type || 'button',
      id: el.id || '',
      name: el.name || '',
      shared_name: sharedName(el),
      text: text.substring(0, 50),
      aria_label: el.getAttribute('aria-label') || '',
      path: cssPath(el),
      rect: rect(r)
    });
  });
  return out;
"#;

const SELECTS_BODY: &str = r#"
  const out = [];
  document.querySelectorAll('select').forEach(el => {
    const r = visible(el);
    if (!r) return;
    out.push({
      id: el.id || '',
      name: el.name || '',
      shared_name: sharedName(el),
      selected_index: el.selectedIndex,
      options: Array.from(el.options).slice(0, 20).map(o => ({ value: o.value, text: o.text })),
      path: cssPath(el),
      rect: rect(r)
    });
  });
  return out;
"#;

const TEXT_BODY: &str = r#"
  const texts = [];
  ['h1', 'h2', 'h3', 'article', 'main', '.result', 'p'].forEach(sel => {
    document.querySelectorAll(sel).forEach(el => {
      const r = el.getBoundingClientRect();
      if (!(r.width > 0 && r.height > 0)) return;
      const t = (el.innerText || el.textContent || '').trim();
      if (t.length > 20 && t.length < 500) texts.push(t);
    });
  });
  return [...new Set(texts)].slice(0, 20);
"#;

const VIEWPORT_BODY: &str = r#"
  return {
    width: window.innerWidth,
    height: window.innerHeight,
    scroll_height: document.documentElement.scrollHeight,
    scroll_width: document.documentElement.scrollWidth
  };
"#;

const SCROLL_BODY: &str = r#"
  return {
    x: window.pageXOffset || document.documentElement.scrollLeft,
    y: window.pageYOffset || document.documentElement.scrollTop
  };
"#;

/// One independent in-page query. A failure in one never affects the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Inputs,
    Links,
    Buttons,
    Selects,
    Text,
    Viewport,
    ScrollOffset,
}

impl Scan {
    pub const ALL: [Scan; 7] = [
        Scan::Inputs,
        Scan::Links,
        Scan::Buttons,
        Scan::Selects,
        Scan::Text,
        Scan::Viewport,
        Scan::ScrollOffset,
    ];

    /// Comment embedded at the top of the script, handy for recognizing it in logs.
    pub fn marker(self) -> &'static str {
        match self {
            Scan::Inputs => "/* scan:inputs */",
            Scan::Links => "/* scan:links */",
            Scan::Buttons => "/* scan:buttons */",
            Scan::Selects => "/* scan:selects */",
            Scan::Text => "/* scan:text */",
            Scan::Viewport => "/* scan:viewport */",
            Scan::ScrollOffset => "/* scan:scroll */",
        }
    }

    fn body(self) -> &'static str {
        match self {
            Scan::Inputs => INPUTS_BODY,
            Scan::Links => LINKS_BODY,
            Scan::Buttons => BUTTONS_BODY,
            Scan::Selects => SELECTS_BODY,
            Scan::Text => TEXT_BODY,
            Scan::Viewport => VIEWPORT_BODY,
            Scan::ScrollOffset => SCROLL_BODY,
        }
    }

    /// The result is serialized with `JSON.stringify` so it survives the
    /// trip back regardless of how the driver returns objects.
    pub fn script(self) -> String {
        format!(
            "{marker}\n(() => {{{prelude}\n  const result = (() => {{{body}}})();\n  return JSON.stringify(result);\n}})()",
            marker = self.marker(),
            prelude = SCAN_PRELUDE,
            body = self.body(),
        )
    }

    pub fn from_script(script: &str) -> Option<Scan> {
        Scan::ALL.into_iter().find(|s| script.starts_with(s.marker()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInput {
    tag: String,
    input_type: String,
    name: String,
    /// Another element on the page carries the same `name`, e.g. a radio group.
    shared_name: bool,
    id: String,
    placeholder: String,
    value: String,
    aria_label: String,
    path: String,
    rect: BoundingBox,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLink {
    id: String,
    href: String,
    text: String,
    title: String,
    path: String,
    rect: BoundingBox,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawButton {
    tag: String,
    button_type: String,
    id: String,
    name: String,
    /// Another element on the page carries the same `name`, e.g. a radio group.
    shared_name: bool,
    text: String,
    aria_label: String,
    path: String,
    rect: BoundingBox,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawOption {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSelect {
    id: String,
    name: String,
    /// Another element on the page carries the same `name`, e.g. a radio group.
    shared_name: bool,
    selected_index: i64,
    options: Vec<RawOption>,
    path: String,
    rect: BoundingBox,
}

/// Keyword rules for input purpose, checked in order; the first hit wins.
const PURPOSE_RULES: &[(Purpose, &[&str])] = &[
    (Purpose::Search, &["search", "query"]),
    (Purpose::Email, &["email"]),
    (Purpose::Password, &["password"]),
    (Purpose::Username, &["user", "login"]),
    (Purpose::Phone, &["phone", "tel"]),
];

/// Guesses what an input is for from its name, id, placeholder and aria-label.
pub fn classify_input(
    name: &str,
    id: &str,
    placeholder: &str,
    aria_label: &str,
    input_type: &str,
) -> Purpose {
    let combined = format!("{name} {id} {placeholder} {aria_label}").to_lowercase();
    for &(purpose, keywords) in PURPOSE_RULES {
        let special = match purpose {
            Purpose::Search => name == "q",
            Purpose::Password => input_type.eq_ignore_ascii_case("password"),
            _ => false,
        };
        if special || keywords.iter().any(|k| combined.contains(k)) {
            return purpose;
        }
    }
    Purpose::Text
}

/// Prefers the id, then a page-unique name, then the structural path.
fn locator_for(tag: &str, id: &str, name: &str, shared_name: bool, path: &str) -> Option<Locator> {
    if !id.is_empty() {
        Some(Locator::Id(id.to_string()))
    } else if !name.is_empty() && !shared_name {
        Some(Locator::Name {
            tag: tag.to_string(),
            name: name.to_string(),
        })
    } else if !path.is_empty() {
        Some(Locator::Css(path.to_string()))
    } else {
        None
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Character-safe truncation with a trailing ellipsis.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

/// Owns the reference counter; every call mints a fresh store.
pub struct PageSummarizer {
    next_id: usize,
    generation: u64,
    ready_timeout: Duration,
}

impl PageSummarizer {
    pub fn new(ready_timeout: Duration) -> Self {
        Self {
            next_id: 0,
            generation: 0,
            ready_timeout,
        }
    }

    /// Scans the live page. Never fails: anything that cannot be read is left out.
    pub fn summarize<D: PageDriver>(
        &mut self,
        driver: &D,
    ) -> (Summary, ElementRefStore<D::Handle>) {
        self.next_id = 0;
        self.generation += 1;
        let mut store = ElementRefStore::new(self.generation);

        if let Err(e) = driver.wait_until_ready(self.ready_timeout) {
            warn!(error = %e, "page not ready, summarizing best-effort snapshot");
        }

        let mut summary = Summary {
            url: driver.current_url().unwrap_or_else(|_| "unknown".into()),
            title: driver.title().unwrap_or_else(|_| "untitled".into()),
            viewport: scan_one(driver, Scan::Viewport).unwrap_or_default(),
            scroll: scan_one::<_, ScrollOffset>(driver, Scan::ScrollOffset).unwrap_or_default(),
            ..Summary::default()
        };

        self.collect_inputs(driver, &mut store, &mut summary.elements);
        self.collect_links(driver, &mut store, &mut summary.elements);
        self.collect_buttons(driver, &mut store, &mut summary.elements);
        self.collect_selects(driver, &mut store, &mut summary.elements);
        summary.text = collect_text(driver);

        debug!(
            generation = self.generation,
            elements = summary.elements.len(),
            bound = store.len(),
            snippets = summary.text.len(),
            url = %summary.url,
            "page summarized"
        );
        (summary, store)
    }

    /// Resolves a live handle and binds it under a freshly minted ID.
    fn bind<D: PageDriver>(
        &mut self,
        driver: &D,
        store: &mut ElementRefStore<D::Handle>,
        kind: ElementKind,
        locator: Option<Locator>,
    ) -> Option<String> {
        let locator = locator?;
        match driver.resolve(&locator) {
            Ok(handle) => {
                let reference_id = format!("{}_{}", kind.as_str(), self.next_id);
                self.next_id += 1;
                store.bind(reference_id.clone(), handle);
                Some(reference_id)
            }
            Err(e) => {
                debug!(%locator, error = %e, "dropping element that could not be re-resolved");
                None
            }
        }
    }

    fn collect_inputs<D: PageDriver>(
        &mut self,
        driver: &D,
        store: &mut ElementRefStore<D::Handle>,
        out: &mut Vec<ElementDescriptor>,
    ) {
        for raw in scan_list::<_, RawInput>(driver, Scan::Inputs) {
            if !raw.rect.is_rendered() || raw.input_type.eq_ignore_ascii_case("hidden") {
                continue;
            }
            let locator = locator_for(&raw.tag, &raw.id, &raw.name, raw.shared_name, &raw.path);
            let Some(reference_id) = self.bind(driver, store, ElementKind::Input, locator) else {
                continue;
            };
            let purpose = classify_input(
                &raw.name,
                &raw.id,
                &raw.placeholder,
                &raw.aria_label,
                &raw.input_type,
            );
            let label = if raw.aria_label.is_empty() {
                raw.placeholder.clone()
            } else {
                raw.aria_label
            };
            out.push(ElementDescriptor {
                reference_id,
                kind: ElementKind::Input,
                purpose: Some(purpose),
                label,
                current_value: Some(raw.value),
                bounding_box: raw.rect,
                input_type: non_empty(raw.input_type),
                placeholder: non_empty(raw.placeholder),
                href: None,
                options: Vec::new(),
            });
        }
    }

    fn collect_links<D: PageDriver>(
        &mut self,
        driver: &D,
        store: &mut ElementRefStore<D::Handle>,
        out: &mut Vec<ElementDescriptor>,
    ) {
        let links = scan_list::<_, RawLink>(driver, Scan::Links)
            .into_iter()
            .filter(|l| l.rect.is_rendered() && !l.text.trim().is_empty())
            .take(MAX_LINKS);
        for raw in links {
            let locator = locator_for("a", &raw.id, "", false, &raw.path);
            let Some(reference_id) = self.bind(driver, store, ElementKind::Link, locator) else {
                continue;
            };
            let label = if raw.text.trim().is_empty() {
                raw.title
            } else {
                raw.text.trim().to_string()
            };
            out.push(ElementDescriptor {
                reference_id,
                kind: ElementKind::Link,
                purpose: None,
                label,
                current_value: None,
                bounding_box: raw.rect,
                input_type: None,
                placeholder: None,
                href: non_empty(raw.href),
                options: Vec::new(),
            });
        }
    }

    fn collect_buttons<D: PageDriver>(
        &mut self,
        driver: &D,
        store: &mut ElementRefStore<D::Handle>,
        out: &mut Vec<ElementDescriptor>,
    ) {
        let buttons = scan_list::<_, RawButton>(driver, Scan::Buttons)
            .into_iter()
            .filter(|b| b.rect.is_rendered())
            .take(MAX_BUTTONS);
        for raw in buttons {
            let locator = locator_for(&raw.tag, &raw.id, &raw.name, raw.shared_name, &raw.path);
            let Some(reference_id) = self.bind(driver, store, ElementKind::Button, locator) else {
                continue;
            };
            let label = [raw.text.trim(), raw.aria_label.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("Submit")
                .to_string();
            out.push(ElementDescriptor {
                reference_id,
                kind: ElementKind::Button,
                purpose: None,
                label,
                current_value: None,
                bounding_box: raw.rect,
                input_type: non_empty(raw.button_type),
                placeholder: None,
                href: None,
                options: Vec::new(),
            });
        }
    }

    fn collect_selects<D: PageDriver>(
        &mut self,
        driver: &D,
        store: &mut ElementRefStore<D::Handle>,
        out: &mut Vec<ElementDescriptor>,
    ) {
        for raw in scan_list::<_, RawSelect>(driver, Scan::Selects) {
            if !raw.rect.is_rendered() {
                continue;
            }
            let locator = locator_for("select", &raw.id, &raw.name, raw.shared_name, &raw.path);
            let Some(reference_id) = self.bind(driver, store, ElementKind::Select, locator) else {
                continue;
            };
            let current = usize::try_from(raw.selected_index)
                .ok()
                .and_then(|i| raw.options.get(i))
                .map(|o| o.text.trim().to_string())
                .unwrap_or_default();
            let options: Vec<String> = raw
                .options
                .into_iter()
                .take(MAX_SELECT_OPTIONS)
                .map(|o| o.text.trim().to_string())
                .collect();
            let label = if raw.name.is_empty() { raw.id } else { raw.name };
            out.push(ElementDescriptor {
                reference_id,
                kind: ElementKind::Select,
                purpose: None,
                label,
                current_value: Some(current),
                bounding_box: raw.rect,
                input_type: None,
                placeholder: None,
                href: None,
                options,
            });
        }
    }
}

fn scan_one<D: PageDriver, T: DeserializeOwned>(driver: &D, scan: Scan) -> Option<T> {
    let value = match driver.evaluate(&scan.script()) {
        Ok(value) => value,
        Err(e) => {
            debug!(?scan, error = %e, "page scan failed");
            return None;
        }
    };
    // Some drivers hand back the stringified JSON untouched.
    let value = match value {
        serde_json::Value::String(s) => serde_json::from_str(&s).ok()?,
        other => other,
    };
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(?scan, error = %e, "page scan returned unexpected shape");
            None
        }
    }
}

fn scan_list<D: PageDriver, T: DeserializeOwned>(driver: &D, scan: Scan) -> Vec<T> {
    let Some(items) = scan_one::<_, Vec<serde_json::Value>>(driver, scan) else {
        return Vec::new();
    };
    // Decode item by item so one odd element does not cost the whole category.
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

fn collect_text<D: PageDriver>(driver: &D) -> Vec<String> {
    let mut seen = HashSet::new();
    scan_list::<_, String>(driver, Scan::Text)
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| {
            let n = t.chars().count();
            n > TEXT_SNIPPET_MIN_CHARS && n < TEXT_SNIPPET_MAX_CHARS
        })
        .filter(|t| seen.insert(t.clone()))
        .take(MAX_TEXT_SNIPPETS)
        .collect()
}

impl Summary {
    /// Text rendering handed to the oracle, grouped by category.
    pub fn render(&self) -> String {
        let mut out = format!("=== Page: {} ===\n", self.title);
        out.push_str(&format!("URL: {}\n", self.url));
        out.push_str(&format!(
            "Viewport: {:.0}x{:.0}\n",
            self.viewport.width, self.viewport.height
        ));
        out.push_str(&format!(
            "Scroll: {:.0}/{:.0}\n\n",
            self.scroll.y, self.viewport.scroll_height
        ));

        out.push_str("=== Interactive Elements ===\n");
        if self.elements.is_empty() {
            out.push_str("(none found)\n");
        }

        let inputs: Vec<_> = self.of_kind(ElementKind::Input).collect();
        if !inputs.is_empty() {
            out.push_str("\nInput Fields:\n");
            for e in inputs {
                let purpose = e.purpose.unwrap_or(Purpose::Text);
                out.push_str(&format!("  [{}] {} input", e.reference_id, purpose));
                if let Some(placeholder) = &e.placeholder {
                    out.push_str(&format!(" (placeholder: '{placeholder}')"));
                }
                if let Some(value) = e.current_value.as_deref().filter(|v| !v.is_empty()) {
                    out.push_str(&format!(" [value: '{}']", clip(value, 30)));
                }
                out.push('\n');
            }
        }

        let buttons: Vec<_> = self.of_kind(ElementKind::Button).collect();
        if !buttons.is_empty() {
            out.push_str("\nButtons:\n");
            for e in buttons {
                out.push_str(&format!("  [{}] '{}'\n", e.reference_id, e.label));
            }
        }

        let links: Vec<_> = self.of_kind(ElementKind::Link).collect();
        if !links.is_empty() {
            out.push_str("\nLinks:\n");
            for e in links {
                out.push_str(&format!("  [{}] {}\n", e.reference_id, clip(&e.label, 50)));
            }
        }

        let selects: Vec<_> = self.of_kind(ElementKind::Select).collect();
        if !selects.is_empty() {
            out.push_str("\nDropdowns:\n");
            for e in selects {
                let shown: Vec<&str> = e
                    .options
                    .iter()
                    .take(SHOWN_SELECT_OPTIONS)
                    .map(String::as_str)
                    .collect();
                let more = if e.options.len() > SHOWN_SELECT_OPTIONS { ", ..." } else { "" };
                out.push_str(&format!(
                    "  [{}] Select: {} (options: {}{})\n",
                    e.reference_id,
                    e.current_value.as_deref().unwrap_or(""),
                    shown.join(", "),
                    more
                ));
            }
        }

        if !self.text.is_empty() {
            out.push_str("\n=== Page Content ===\n");
            for t in &self.text {
                out.push_str(&format!("• {}\n", clip(t, 100)));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FakePage};

    fn summarize(page: &FakePage) -> (Summary, ElementRefStore<String>) {
        PageSummarizer::new(Duration::from_millis(10)).summarize(page)
    }

    #[test]
    fn search_box_named_q_is_search() {
        assert_eq!(classify_input("q", "", "Search", "", "text"), Purpose::Search);
        assert_eq!(classify_input("q", "", "", "", "text"), Purpose::Search);
    }

    #[test]
    fn email_rule_precedes_username_rule() {
        assert_eq!(classify_input("user_email", "", "", "", "text"), Purpose::Email);
    }

    #[test]
    fn password_by_type_or_name() {
        assert_eq!(classify_input("pw", "", "", "", "password"), Purpose::Password);
        assert_eq!(classify_input("new_password", "", "", "", "text"), Purpose::Password);
    }

    #[test]
    fn remaining_purposes() {
        assert_eq!(classify_input("", "login", "", "", "text"), Purpose::Username);
        assert_eq!(classify_input("", "", "Phone number", "", "text"), Purpose::Phone);
        assert_eq!(classify_input("city", "", "", "", "text"), Purpose::Text);
    }

    #[test]
    fn every_rendered_reference_is_bound() {
        let page = FakePage::new()
            .with_input(testing::input("q", "q", "Search", "text"))
            .with_input(testing::input("", "email", "", "email"))
            .with_button(testing::button("go", "Search"))
            .with_link(testing::link("Docs", "https://example.com/docs", 1))
            .with_select(testing::select("size", &["S", "M", "L"], 1));

        let (summary, store) = summarize(&page);
        let rendered = summary.render();

        assert_eq!(summary.elements.len(), 5);
        assert_eq!(store.len(), 5);
        for id in referenced_ids(&rendered) {
            assert!(store.contains(&id), "{id} rendered but not bound");
        }
        for e in &summary.elements {
            assert!(store.get(&e.reference_id).is_some());
        }
    }

    #[test]
    fn unresolvable_elements_are_dropped_not_dangling() {
        let page = FakePage::new()
            .with_input(testing::input("gone", "", "", "text"))
            .with_input(testing::input("stays", "", "", "text"))
            .unresolvable("id:gone");

        let (summary, store) = summarize(&page);
        assert_eq!(summary.elements.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(!summary.render().contains("gone"));
    }

    #[test]
    fn radio_group_members_get_distinct_handles() {
        let radio = |value: &str, n: usize| {
            let mut raw = testing::input("", "size", "", "radio");
            raw["shared_name"] = serde_json::json!(true);
            raw["value"] = serde_json::json!(value);
            raw["path"] = serde_json::json!(format!("body > form > input:nth-of-type({n})"));
            raw
        };
        let page = FakePage::new()
            .with_input(radio("s", 1))
            .with_input(radio("m", 2))
            .with_input(testing::input("", "email", "", "email"));

        let (summary, store) = summarize(&page);
        assert_eq!(store.len(), 3);
        let handles: Vec<&String> = summary
            .elements
            .iter()
            .filter_map(|e| store.get(&e.reference_id))
            .collect();
        assert_eq!(handles[0], "css:body > form > input:nth-of-type(1)");
        assert_eq!(handles[1], "css:body > form > input:nth-of-type(2)");
        // A name nobody else uses is still the preferred locator.
        assert_eq!(handles[2], "name:input:email");
    }

    #[test]
    fn locator_prefers_id_then_unique_name_then_path() {
        let path = "body > input";
        assert_eq!(
            locator_for("input", "q", "q", false, path),
            Some(Locator::Id("q".into()))
        );
        assert_eq!(
            locator_for("input", "", "q", true, path),
            Some(Locator::Css(path.into()))
        );
        assert_eq!(locator_for("input", "", "", false, ""), None);
    }

    #[test]
    fn caps_links_and_buttons() {
        let mut page = FakePage::new();
        for i in 0..80 {
            page = page.with_link(testing::link(&format!("Result {i}"), "https://example.com", i));
        }
        for i in 0..40 {
            page = page.with_button(testing::button(&format!("b{i}"), &format!("Button {i}")));
        }

        let (summary, store) = summarize(&page);
        assert_eq!(summary.of_kind(ElementKind::Link).count(), MAX_LINKS);
        assert_eq!(summary.of_kind(ElementKind::Button).count(), MAX_BUTTONS);
        assert_eq!(store.len(), MAX_LINKS + MAX_BUTTONS);
    }

    #[test]
    fn select_options_are_capped_and_shown_partially() {
        let options: Vec<String> = (0..30).map(|i| format!("opt{i}")).collect();
        let refs: Vec<&str> = options.iter().map(String::as_str).collect();
        let page = FakePage::new().with_select(testing::select("many", &refs, 0));

        let (summary, _) = summarize(&page);
        let select = summary.of_kind(ElementKind::Select).next().unwrap();
        assert_eq!(select.options.len(), MAX_SELECT_OPTIONS);
        assert_eq!(select.current_value.as_deref(), Some("opt0"));

        let rendered = summary.render();
        assert!(rendered.contains("opt9"));
        assert!(!rendered.contains("opt10"));
    }

    #[test]
    fn text_snippets_are_deduplicated_and_windowed() {
        let long = "x".repeat(600);
        let mut page = FakePage::new()
            .with_text("too short")
            .with_text(&long)
            .with_text("A paragraph that is long enough to keep.")
            .with_text("A paragraph that is long enough to keep.");
        for i in 0..30 {
            page = page.with_text(&format!("Another distinct snippet number {i}"));
        }

        let (summary, _) = summarize(&page);
        assert_eq!(summary.text.len(), MAX_TEXT_SNIPPETS);
        assert_eq!(summary.text[0], "A paragraph that is long enough to keep.");
        assert_eq!(summary.text[1], "Another distinct snippet number 0");
    }

    #[test]
    fn unchanged_page_summarizes_identically() {
        let page = FakePage::new()
            .with_input(testing::input("q", "q", "Search", "text"))
            .with_button(testing::button("go", "Go"))
            .with_link(testing::link("Home", "https://example.com/", 0));
        let mut summarizer = PageSummarizer::new(Duration::from_millis(10));

        let (first, first_store) = summarizer.summarize(&page);
        let (second, second_store) = summarizer.summarize(&page);

        let shape = |s: &Summary| {
            s.elements
                .iter()
                .map(|e| (e.kind, e.purpose, e.label.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&first), shape(&second));
        assert_ne!(first_store.generation(), second_store.generation());
    }

    #[test]
    fn total_scan_failure_yields_empty_summary() {
        let page = FakePage::new()
            .with_input(testing::input("q", "q", "", "text"))
            .failing_scans();

        let (summary, store) = summarize(&page);
        assert!(summary.elements.is_empty());
        assert!(store.is_empty());
        assert!(summary.render().contains("(none found)"));
    }

    #[test]
    fn render_groups_by_category() {
        let page = FakePage::new()
            .with_input(testing::input("q", "q", "Search", "text"))
            .with_button(testing::button("go", "Go"));
        let (summary, _) = summarize(&page);
        let rendered = summary.render();

        assert!(rendered.starts_with("=== Page: Fake page ==="));
        assert!(rendered.contains("URL: https://example.com/"));
        assert!(rendered.contains("Viewport: 1280x800"));
        assert!(rendered.contains("[input_0] search input (placeholder: 'Search')"));
        assert!(rendered.contains("[button_1] 'Go'"));
    }

    #[test]
    fn scripts_are_recognizable_by_marker() {
        for scan in Scan::ALL {
            assert_eq!(Scan::from_script(&scan.script()), Some(scan));
        }
    }

    fn referenced_ids(rendered: &str) -> Vec<String> {
        rendered
            .split('[')
            .skip(1)
            .filter_map(|chunk| chunk.split(']').next())
            .filter(|id| id.contains('_') && !id.contains(':') && !id.contains(' '))
            .map(str::to_string)
            .collect()
    }
}
