//! Wayfinder Server - standalone launcher for the discovery registry
//!
//! Loads the layered configuration, initializes logging, bridges an optional
//! catalog file into the registry, and closes everything on Ctrl+C / SIGTERM.

pub mod catalog;
pub mod config;
pub mod startup;

pub use catalog::{CatalogEntry, FileCatalogSource};
pub use config::{Cli, LoggingSettings, ServerConfig};
