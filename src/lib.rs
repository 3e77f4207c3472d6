pub mod bot;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod cursor_worker;
pub mod dispatcher;
pub mod events;
pub mod names;
pub mod query;
pub mod registry;
pub mod repository;
pub mod rpc;
pub mod scanner;
pub mod telegram;

/// Installs the fmt subscriber, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
