// SPDX-License-Identifier: Apache-2.0
//! Tracing initialization shared by every binary and test harness in the
//! workspace.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber driven by `RUST_LOG` (defaulting
/// to `info`). Safe to call more than once — only the first call takes
/// effect, so library code and tests can both call it unconditionally.
pub fn init() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
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
