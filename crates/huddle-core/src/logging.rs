use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::CallConfig;

const DEFAULT_FILTER: &str = "huddle_core=info";

/// Install the fmt subscriber. Safe to call more than once; only the first
/// call has an effect. `RUST_LOG` wins over `config.log_filter`.
pub fn init_logging(config: &CallConfig) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| configured_filter(config.log_filter.as_deref()));
        // Another subscriber may already be installed by the host.
        if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
            tracing::debug!("global subscriber already set, keeping it");
        }
    });
}

/// Filter from the config directive, or the crate default when it is
/// missing or does not parse.
fn configured_filter(directive: Option<&str>) -> EnvFilter {
    match directive.map(EnvFilter::try_new) {
        Some(Ok(filter)) => filter,
        Some(Err(e)) => {
            eprintln!("invalid log_filter, using {DEFAULT_FILTER}: {e}");
            EnvFilter::new(DEFAULT_FILTER)
        }
        None => EnvFilter::new(DEFAULT_FILTER),
    }
}
