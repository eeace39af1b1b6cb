//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod build;
pub mod init;
pub mod query;
pub mod status;
pub mod validate;
pub mod validate_config;

use crate::domain::CorridorError;

/// Exit code for an error surfaced by a command
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CorridorError>()
        .map(CorridorError::exit_code)
        .unwrap_or(5)
}
