//! Shared types and utilities for the spout workspace.

pub mod types;
pub mod utils;
