//! Tracing bootstrap for binaries and integration harnesses embedding the
//! runner.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "DROVER_LOG";

/// Initialize the global tracing subscriber.
///
/// Filter comes from `DROVER_LOG` (falling back to `info`). Safe to call
/// more than once; subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
