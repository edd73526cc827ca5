//! boardview - aggregated multi-board table view over a work-management API
//!
//! This library crate exposes internal modules for integration testing.

pub mod config;
pub mod data;
pub mod integrations;
pub mod render;
pub mod session;
pub mod settings;
pub mod util;
