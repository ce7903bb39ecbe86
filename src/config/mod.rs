//! # Configuration
//!
//! Environment-driven operator configuration.

pub mod controller;

pub use controller::ControllerConfig;
