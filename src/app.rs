//! Application module
//!
//! This module re-exports the main application type from the frontend
//! module. It provides a convenient access point for the main application
//! entry.

pub use crate::frontend::MonitorApp;
