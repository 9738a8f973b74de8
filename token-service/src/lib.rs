pub mod api;
pub mod config;
pub mod domain;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use config::AppConfig;
pub use server::Server;
pub use utils::errors::{Result, TokenServiceError};
