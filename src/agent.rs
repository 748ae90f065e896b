use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::actions::{ActionExecutor, ExecutorOptions};
use crate::brain::{DecisionEngine, ReasoningOracle};
use crate::config::{AgentConfig, WarmupConfig};
use crate::dom::PageSummarizer;
use crate::driver::PageDriver;
use crate::errors::{AgentError, AgentResult, DriverError};
use crate::timing::Pacer;
use crate::types::{ActionKind, HistoryEntry, RunOutcome, TaskContext};
use crate::warmup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Drives one browser page toward a goal: summarize, decide, execute, repeat.
///
/// The agent owns the page for the whole run. Steps never overlap; the only
/// way to stop a run early is the cancel flag, checked between steps.
pub struct Agent<D: PageDriver, O: ReasoningOracle> {
    driver: D,
    summarizer: PageSummarizer,
    engine: DecisionEngine<O>,
    pacer: Arc<dyn Pacer>,
    options: ExecutorOptions,
    step_budget: usize,
    step_delay_ms: [u64; 2],
    warmup: WarmupConfig,
    state: RunState,
    cancel: Arc<AtomicBool>,
}

impl<D: PageDriver, O: ReasoningOracle> Agent<D, O> {
    pub fn new(driver: D, oracle: O, config: &AgentConfig, pacer: Arc<dyn Pacer>) -> Self {
        let ready_timeout = config.run.ready_timeout();
        Self {
            driver,
            summarizer: PageSummarizer::new(ready_timeout),
            engine: DecisionEngine::new(oracle, config.run.history_window),
            pacer,
            options: ExecutorOptions {
                mobile: config.browser.mobile,
                ready_timeout,
            },
            step_budget: config.run.step_budget,
            step_delay_ms: config.run.step_delay_ms,
            warmup: config.warmup.clone(),
            state: RunState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Setting the returned flag ends the run at the next step boundary.
    /// The flag is cleared when a run finishes, so it stops one run only.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Navigates to the start page, with optional warm-up visits first.
    ///
    /// A slow page is tolerated; only a failed navigation is an error.
    pub fn open(&self, url: &str) -> AgentResult<()> {
        let executor = ActionExecutor::new(&self.driver, self.pacer.as_ref(), self.options);

        if self.warmup.enabled {
            warmup::warm_up(
                &executor,
                &self.driver,
                self.pacer.as_ref(),
                &self.warmup.sites,
                self.options.ready_timeout,
            );
        }

        info!(%url, "opening start page");
        self.driver.navigate(url)?;
        match self.driver.wait_until_ready(self.options.ready_timeout) {
            Ok(()) => {}
            Err(DriverError::Timeout(_)) => {
                let e = AgentError::PageLoadTimeout(self.options.ready_timeout.as_secs());
                warn!(%url, error = %e, "continuing with partially loaded page");
            }
            Err(e) => return Err(e.into()),
        }
        self.pacer.pause(1000, 2500);

        if self.warmup.dismiss_consent {
            warmup::dismiss_consent(&executor, &self.driver, self.pacer.as_ref());
        }
        Ok(())
    }

    pub async fn run(&mut self, goal: &str) -> RunOutcome {
        self.state = RunState::Running;
        let mut task = TaskContext::new(goal, self.step_budget);
        info!(goal, budget = self.step_budget, "run started");

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return self.finish(task, false, AgentError::Cancelled.to_string());
            }
            if !task.budget_left() {
                return self.finish(task, false, AgentError::StepBudgetExhausted.to_string());
            }
            task.step_index += 1;
            info!(step = task.step_index, budget = task.step_budget, "step");

            let (summary, refs) = self.summarizer.summarize(&self.driver);
            let proposal = self.engine.decide(&task, &summary.render()).await;

            match proposal.action {
                ActionKind::Done => {
                    let result = proposal.result_text();
                    return self.finish(task, true, result);
                }
                ActionKind::Error => {
                    let reason = if proposal.reasoning.trim().is_empty() {
                        "Unknown error".to_string()
                    } else {
                        proposal.reasoning
                    };
                    return self.finish(task, false, reason);
                }
                _ => {}
            }

            let url_at_time = self
                .driver
                .current_url()
                .unwrap_or_else(|_| summary.url.clone());
            let executor = ActionExecutor::new(&self.driver, self.pacer.as_ref(), self.options);
            if !executor.execute(&proposal, &refs) {
                warn!(step = task.step_index, action = %proposal.action, "step failed, re-planning");
            }

            task.history.push(HistoryEntry {
                step_index: task.step_index,
                action: proposal.action,
                parameters: proposal.parameters,
                url_at_time,
            });

            let [min, max] = self.step_delay_ms;
            self.pacer.pause(min, max);
        }
    }

    fn finish(&mut self, task: TaskContext, success: bool, result_or_error: String) -> RunOutcome {
        self.cancel.store(false, Ordering::SeqCst);
        self.state = if success {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        if success {
            info!(steps = task.step_index, result = %result_or_error, "run succeeded");
        } else {
            warn!(steps = task.step_index, error = %result_or_error, "run failed");
        }
        RunOutcome {
            success,
            result_or_error,
            steps_taken: task.step_index,
            history: task.history,
        }
    }
}
