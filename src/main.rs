//! chef-harness entry point

fn main() {
    // Diagnostics go to stderr so the console report on stdout stays readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    chef_harness::cli::run();
}
