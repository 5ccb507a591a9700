//! CLI command implementations

use discshelf_core::Settings;
use std::path::PathBuf;

/// Conditionally println based on silent mode
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

pub mod config;
pub mod edit;
pub mod hash;
pub mod info;
pub mod process;
pub mod scan;

/// Load settings from `--config` or the default location
pub fn load_settings(config_file: Option<PathBuf>) -> Settings {
    match config_file {
        Some(path) => Settings::load_from_path(Some(path)),
        None => Settings::load(),
    }
}
