//! Completion race resolver.
//!
//! Two independent signals indicate that an interactive-agent interaction
//! is done: the host process exiting and a hook delivery reaching the
//! callback bridge. Either may arrive first, be duplicated, or be lost.
//! Process exit is always awaited (command execution is unbounded); only
//! the hook wait is bounded.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

/// Tagged outcome of the joint wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Process exit and hook delivery both arrived inside the window.
    BothArrived,
    /// The window elapsed (or the bridge went away) before the hook
    /// arrived; the caller proceeds with the process result alone.
    TimedOut,
}

/// Await process exit, then race the hook signal against a bounded window.
///
/// The hook may already have fired while the process was still running;
/// the buffered one-shot makes that case resolve immediately. Returns the
/// process output either way — the hook's only role is synchronization,
/// not data.
pub async fn join_process_and_hook<F, T>(
    process: F,
    hook: oneshot::Receiver<()>,
    window: Duration,
) -> (T, WaitOutcome)
where
    F: Future<Output = T>,
{
    let output = process.await;
    match tokio::time::timeout(window, hook).await {
        Ok(Ok(())) => (output, WaitOutcome::BothArrived),
        Ok(Err(_)) => {
            warn!("hook channel closed before delivery; proceeding with process result");
            (output, WaitOutcome::TimedOut)
        }
        Err(_) => (output, WaitOutcome::TimedOut),
    }
}
