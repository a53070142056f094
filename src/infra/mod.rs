pub mod api;
pub mod config;
pub mod constants;
pub mod frames;
pub mod logging;
