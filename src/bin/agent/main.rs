use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use page_pilot::driver::PageDriver;
use page_pilot::timing::{HumanPacer, NoPacing, Pacer};
use page_pilot::{Agent, AgentConfig, AnthropicOracle, BrowserSession, RunOutcome};

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Drive a Chrome tab toward a goal described in plain language", long_about = None)]
#[command(version)]
struct Cli {
    /// What the agent should accomplish
    #[arg(short, long)]
    task: String,

    /// Page to start from
    #[arg(short = 'u', long, default_value = "https://www.google.com")]
    start_url: String,

    /// Config file (defaults to <config dir>/page-pilot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Phone-sized viewport and programmatic clicks
    #[arg(long, conflicts_with = "desktop")]
    mobile: bool,

    /// Desktop viewport and pointer clicks
    #[arg(long)]
    desktop: bool,

    /// Step budget for this run
    #[arg(long)]
    max_steps: Option<usize>,

    /// Anthropic API key (overrides ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Disable human-like pauses and jitter
    #[arg(long)]
    no_jitter: bool,

    /// Save a PNG of the final page here
    #[arg(long)]
    screenshot: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut AgentConfig) {
        if self.headless {
            config.browser.headless = true;
        }
        if self.mobile {
            config.browser.mobile = true;
        }
        if self.desktop {
            config.browser.mobile = false;
        }
        if let Some(steps) = self.max_steps {
            config.run.step_budget = steps;
        }
        if let Some(key) = &self.api_key {
            config.oracle.api_key = Some(key.clone());
        }
        if self.no_jitter {
            config.pacing.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("page_pilot=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AgentConfig::load(cli.config.as_deref()).context("loading configuration")?;
    cli.apply(&mut config);

    let oracle = AnthropicOracle::new(&config.oracle).context("creating oracle client")?;

    let browser_config = config.browser.clone();
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&browser_config))
        .await
        .context("browser launch panicked")?
        .context("launching Chrome")?;

    let pacer: Arc<dyn Pacer> = if config.pacing.enabled {
        Arc::new(HumanPacer)
    } else {
        Arc::new(NoPacing)
    };
    let mut agent = Agent::new(session, oracle, &config, pacer);

    let cancel = agent.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    agent
        .open(&cli.start_url)
        .with_context(|| format!("opening {}", cli.start_url))?;
    let outcome = agent.run(&cli.task).await;

    if let Some(path) = &cli.screenshot {
        match agent.driver().screenshot() {
            Ok(png) => {
                std::fs::write(path, png)
                    .with_context(|| format!("writing screenshot to {}", path.display()))?;
                info!(path = %path.display(), "screenshot saved");
            }
            Err(e) => warn!(error = %e, "could not capture screenshot"),
        }
    }

    print_outcome(&outcome);
    // Dropping the session is what shuts the launched Chrome down.
    drop(agent);
    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    println!("{}", "=".repeat(60));
    if outcome.success {
        println!("SUCCESS after {} steps", outcome.steps_taken);
        println!("Result: {}", outcome.result_or_error);
    } else {
        println!("FAILED after {} steps", outcome.steps_taken);
        println!("Error: {}", outcome.result_or_error);
    }

    if !outcome.history.is_empty() {
        println!();
        println!("Recent actions:");
        let start = outcome.history.len().saturating_sub(5);
        for entry in &outcome.history[start..] {
            println!("  {entry}");
            println!("    at {}", entry.url_at_time);
        }
    }
    println!("{}", "=".repeat(60));
}
