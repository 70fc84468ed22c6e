pub mod config;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod repositories;

pub use config::{Backend, Config, ConfigError};
pub use observability::init_observability;
