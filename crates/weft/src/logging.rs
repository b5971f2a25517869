#![forbid(unsafe_code)]

//! Log output for applications.
//!
//! The runtime only emits `tracing` events. With the `logging` feature,
//! [`init`] installs a formatting subscriber filtered by `RUST_LOG`
//! (default `weft=info`).

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "weft=info,weft_runtime=info";

/// Install the global subscriber. Returns `false` if one was already set.
#[cfg(feature = "logging")]
pub fn init() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Without the `logging` feature there is nothing to install.
#[cfg(not(feature = "logging"))]
pub fn init() -> bool {
    tracing::debug!("weft built without the logging feature");
    false
}
