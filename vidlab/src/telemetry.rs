use tracing_subscriber::EnvFilter;

/**
    Install the fmt subscriber. `RUST_LOG` wins over the verbosity flag.
*/
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .try_init();

    media_decode::set_log_level(verbose);
}
