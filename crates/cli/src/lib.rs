pub mod cli;
pub mod commands;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod output;
pub mod settings;
