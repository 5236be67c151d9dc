pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::cli::LocalStorage;
pub use config::toml_config::TomlConfig;
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::engine::{LookupEngine, RunReport};
pub use core::session::{LookupSession, Stage};
pub use utils::error::{LookupError, Result};
