//! # drover-remote
//!
//! Typed client for the remote command queue and event sink.
//!
//! The remote store is the authoritative source of "next command," session
//! status, and completion notifications. This crate only covers the surface
//! the runtime consumes:
//!
//! - [`RemoteStore::get_next_command`] — session snapshot with the next
//!   pending interaction
//! - [`RemoteStore::submit_result`] — fire-and-forget from the
//!   orchestrator's perspective
//! - [`RemoteStore::post_event`] — raw signal forwarding (agent stream
//!   events, hook envelopes)
//!
//! [`HttpRemoteStore`] is the production implementation;
//! [`testutil::RecordingStore`] is the in-memory double used across the
//! workspace's tests.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod testutil;

pub use client::{HttpRemoteStore, RemoteStore, SubmitResult};
pub use errors::RemoteError;
