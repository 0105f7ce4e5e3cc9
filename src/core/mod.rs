//! Core module
//!
//! Ambient services shared by the facade and the HTTP layer:
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{ErrorContext, FacadeError, Result};
pub use logging::Logger;
