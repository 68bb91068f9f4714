pub mod cli;
pub mod commands;
pub mod config;

pub use config::AppConfig;

pub use zendo_core as core;
pub use zendo_core::capture;
pub use zendo_core::database as db;
pub use zendo_core::model;
pub use zendo_core::parser;

pub use zendo_mcp as mcp;
