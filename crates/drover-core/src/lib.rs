//! # drover-core
//!
//! Foundation types for the drover session runner.
//!
//! This crate provides the shared vocabulary the runtime and remote-client
//! crates depend on:
//!
//! - **Protocol types**: [`types::Session`], [`types::Interaction`],
//!   [`types::Command`], [`types::CommandResult`]
//! - **Event unions**: [`events::AgentEvent`] for embedded agent streams,
//!   [`events::ServerNotification`] for the remote push channel,
//!   [`events::HookEnvelope`] for forwarded hook deliveries,
//!   [`events::RunnerEvent`] for local lifecycle broadcast
//! - **Logging**: [`logging::init`] tracing bootstrap
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `drover-remote` and `drover-runtime`.

#![deny(unsafe_code)]

pub mod events;
pub mod logging;
pub mod types;
