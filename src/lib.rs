pub mod api;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod messages;
pub mod metadata;
pub mod search;
pub mod security;
pub mod telegram;
pub mod transport;
pub mod utils;

pub use commands::AppState;
pub use config::AppConfig;
pub use errors::{AppError, Result};
