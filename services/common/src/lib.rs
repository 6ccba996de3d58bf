//! Shared types and utilities for the FX risk engine services
//!
//! Crosscutting pieces every service needs:
//! - Currency pair and rate record types
//! - Engine error taxonomy
//! - Engine configuration surface
//! - Event channel for rate updates and alerts

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod types;

pub use config::*;
pub use errors::*;
pub use events::*;
pub use types::*;
