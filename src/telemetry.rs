use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a stderr tracing subscriber (if one is not already active).
///
/// `RUST_LOG` wins when set. Otherwise only warnings are shown, or debug
/// output for this crate when `verbose` is on. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let fallback = if verbose { "warn,cxmatrix=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}
