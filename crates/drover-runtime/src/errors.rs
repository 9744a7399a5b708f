//! Runtime error types.
//!
//! Only two families are allowed to abort an `execute()` call: validation
//! (wrong command kind routed to a strategy) and listener-bind failures.
//! Everything else is normalized into a failed `CommandResult` so the
//! session loop never halts on a single bad command.

use drover_core::types::CommandKind;
use drover_remote::RemoteError;
use thiserror::Error;

/// Errors surfaced by the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A strategy received a command kind it does not support. This is a
    /// programming-contract check, not a recoverable runtime condition.
    #[error("strategy expected a {expected:?} command, got {got:?}")]
    WrongCommandKind {
        /// Kind the strategy supports.
        expected: CommandKind,
        /// Kind it was handed.
        got: CommandKind,
    },

    /// The callback bridge failed to bind its loopback listener.
    #[error("callback bridge failed to bind: {0}")]
    BridgeBind(#[source] std::io::Error),

    /// A callback URL or registration was requested before `start()`.
    #[error("callback bridge has not been started")]
    BridgeNotStarted,

    /// The bridge was already started.
    #[error("callback bridge already started")]
    BridgeAlreadyStarted,

    /// A second handler was registered for an interaction whose first
    /// registration has not fired. Usage error.
    #[error("handler already registered for interaction {interaction_id}")]
    DuplicateRegistration {
        /// Offending interaction id.
        interaction_id: String,
    },

    /// Remote store failure on a path where it must surface
    /// (`get_next_command`).
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
