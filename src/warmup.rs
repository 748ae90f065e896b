//! Optional exploratory behaviour around a run: warm-up visits before the task
//! and consent-banner dismissal after opening a page.
//!
//! None of this is needed for a task to succeed; failures are logged and skipped.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::actions::{ActionExecutor, ScrollDirection};
use crate::driver::{Locator, PageDriver};
use crate::timing::Pacer;

/// Accept buttons of common cookie-consent dialogs, tried in order.
pub const CONSENT_SELECTORS: &[&str] = &[
    "button[id*='accept']",
    "button[id*='Accept']",
    "button[id*='agree']",
    "button[aria-label*='Accept']",
    "button[aria-label*='Agree']",
];

/// Visits one or two of `sites`, dwelling briefly and sometimes scrolling.
///
/// Returns how many visits loaded.
pub fn warm_up<D: PageDriver>(
    executor: &ActionExecutor<'_, D>,
    driver: &D,
    pacer: &dyn Pacer,
    sites: &[String],
    ready_timeout: Duration,
) -> usize {
    if sites.is_empty() {
        return 0;
    }
    let most = sites.len().min(2);
    let count = (pacer.uniform(1.0, most as f64 + 1.0) as usize).clamp(1, most);
    let start = (pacer.uniform(0.0, sites.len() as f64) as usize) % sites.len();

    let mut visited = 0;
    for site in sites.iter().cycle().skip(start).take(count) {
        info!(%site, "warming up session");
        if let Err(e) = driver.navigate(site) {
            warn!(%site, error = %e, "warm-up visit failed");
            continue;
        }
        if let Err(e) = driver.wait_until_ready(ready_timeout) {
            debug!(%site, error = %e, "warm-up page still loading");
        }
        visited += 1;
        pacer.pause(2000, 5000);

        if pacer.chance(0.3) {
            if let Err(e) = executor.scroll(ScrollDirection::Down, None) {
                debug!(%site, error = %e, "warm-up scroll failed");
            }
            pacer.pause(1000, 2000);
        }
    }
    visited
}

/// Clicks the first consent accept button present on the page, if any.
pub fn dismiss_consent<D: PageDriver>(
    executor: &ActionExecutor<'_, D>,
    driver: &D,
    pacer: &dyn Pacer,
) -> bool {
    for selector in CONSENT_SELECTORS {
        let Ok(button) = driver.resolve(&Locator::Css((*selector).to_string())) else {
            continue;
        };
        match executor.click(&button, false) {
            Ok(()) => {
                info!(selector, "dismissed consent banner");
                pacer.pause(800, 1200);
                return true;
            }
            Err(e) => debug!(selector, error = %e, "consent button not clickable"),
        }
    }
    false
}
