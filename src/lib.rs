pub mod activity;
pub mod app;
pub mod cli;
pub mod config;
pub mod hook;
pub mod monitor;
pub mod render;
pub mod state;
pub mod transcript;
pub mod usage;
pub mod util;
