//! Tracing setup for binaries and tests embedding the engine

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber once per process.
///
/// `RUST_LOG` takes precedence; otherwise the engine logs at `info`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("reconciliation_core=info"));

        // Another subscriber may already be installed by the host application
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
