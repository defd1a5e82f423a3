pub mod commands;
pub mod db;
pub mod error;
pub mod menu;
pub mod models;
pub mod state;
pub mod webhook;

pub use error::{AppError, AppResult};
pub use state::AppState;

/// Install the `env_logger` backend. `RUST_LOG` overrides the default level
/// (debug in debug builds, info in release). Safe to call more than once.
pub fn init_logging() {
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        // Also log in release mode but at info level
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    if builder.try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}
