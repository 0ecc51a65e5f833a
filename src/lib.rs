// padlayer: layered controller-to-keyboard/mouse translation

pub mod cli;
pub mod config;
pub mod input;
pub mod logging;

pub use cli::Cli;
pub use config::EngineConfig;
pub use input::{Engine, EngineError};
pub use logging::LogLevel;
