pub mod config;
pub mod manager;


pub use config::{OpenSolutions, Settings, ShowMode};
pub use manager::SettingsManager;
