pub mod config;
pub mod daemon;
pub mod progress;
pub mod settings;
pub mod sync;
