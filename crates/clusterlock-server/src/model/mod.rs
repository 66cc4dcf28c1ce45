//! Data models module
//!
//! - `constants` - Configuration keys and defaults
//! - `config` - Layered configuration (file, environment, flags)

pub mod config;
pub mod constants;

pub use config::Configuration;
