use tracing_subscriber::EnvFilter;

/// Environment variable that forces debug-level output regardless of `RUST_LOG`.
pub const DEBUG_ENV_VAR: &str = "SMAA_HARNESS_DEBUG";

/// Initialize tracing and bridge `log` to `tracing`.
/// Calling this multiple times is safe (subsequent attempts are ignored).
pub fn init_tracing(enable_debug: bool) {
    // Bridge `log` records into `tracing` so wgpu's `log` output is captured
    let _ = tracing_log::LogTracer::init();

    // Prefer explicit debug flag, otherwise fall back to RUST_LOG or default to info
    let env_filter = if enable_debug {
        EnvFilter::new("debug,wgpu_core=warn,wgpu_hal=warn,naga=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,wgpu_core=warn,wgpu_hal=warn"))
    };

    // `try_init` would install a second log bridge and bail out before the
    // subscriber is set, so register it directly.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_names(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn debug_requested() -> bool {
    std::env::var_os(DEBUG_ENV_VAR).is_some()
}
