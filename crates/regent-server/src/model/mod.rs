pub mod config;

pub use config::{Configuration, DEFAULT_CONFIG_FILE, NodeConfig};
