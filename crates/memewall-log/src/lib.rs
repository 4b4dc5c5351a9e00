// ABOUTME: Shared logging setup for all memewall binaries
// ABOUTME: Two functions: init() for plain stderr, init_for() for the service crates

use tracing_subscriber::EnvFilter;

/// Standard logging to stderr. Default: INFO level, RUST_LOG override.
/// Used by one-shot CLI commands.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. Default: INFO for the named crates, WARN for
/// everything else (hyper, rustls and slack-morphism are chatty at INFO).
/// Used by the long-running service.
pub fn init_for(crate_names: &[&str]) {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    for name in crate_names {
        let directive = format!("{}=info", name.replace('-', "_"));
        filter = filter.add_directive(
            directive
                .parse()
                .unwrap_or_else(|_| tracing::Level::INFO.into()),
        );
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
