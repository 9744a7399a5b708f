//! # drover-runtime
//!
//! Executor strategies, the hook callback bridge, and the session
//! orchestrator.
//!
//! - **Executors**: four strategies behind one [`executor::Executor`]
//!   contract, selected by (execution mode × command kind)
//! - **Callback bridge**: per-session loopback HTTP listener correlating
//!   hook deliveries to in-flight interactions
//! - **Race resolver**: joins process exit with hook delivery under a
//!   bounded wait
//! - **Orchestrator**: per-session serialization, auto-play, parallel
//!   child-session fan-out, cleanup
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: drover-core, drover-remote.
//! Depended on by: embedding applications.

#![deny(unsafe_code)]

pub mod agent;
pub mod bridge;
pub mod config;
pub mod emitter;
pub mod errors;
pub mod executor;
pub mod orchestrator;
pub mod race;
pub mod resources;
pub mod scratch;

// Re-export main public API
pub use agent::{AgentClient, AgentRunOptions, CliAgentClient};
pub use bridge::CallbackBridge;
pub use config::RuntimeConfig;
pub use emitter::RunnerEventEmitter;
pub use errors::RuntimeError;
pub use executor::{select_strategy, Executor, Strategy};
pub use orchestrator::Orchestrator;
pub use race::{join_process_and_hook, WaitOutcome};
pub use resources::SessionResources;
pub use scratch::ScratchSpace;
