//! A browser agent that works toward a natural-language goal one action at a time.
//!
//! Each step summarizes the live page into addressable elements ([`dom`]),
//! asks a reasoning oracle for the next action ([`brain`]), and performs it
//! against the page ([`actions`]). [`agent::Agent`] owns the loop.

pub mod actions;
pub mod agent;
pub mod brain;
pub mod config;
pub mod dom;
pub mod driver;
pub mod errors;
pub mod hands;
pub mod refs;
pub mod timing;
pub mod types;
pub mod warmup;

#[cfg(test)]
mod testing;

pub use agent::{Agent, RunState};
pub use brain::{AnthropicOracle, DecisionEngine, ReasoningOracle};
pub use config::AgentConfig;
pub use errors::{AgentError, AgentResult, DriverError};
pub use hands::BrowserSession;
pub use types::{ActionKind, ActionProposal, RunOutcome};
