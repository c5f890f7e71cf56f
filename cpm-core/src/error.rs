//! Error types for the CP/M machine.
//!
//! Guest-visible BDOS status codes are plain bytes and never pass through
//! this type; `CpmError` covers host-side failures only.

use thiserror::Error;

/// Errors raised by host services, configuration and the boot loop.
#[derive(Error, Debug)]
pub enum CpmError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Drive not mounted: {0}")]
    DriveNotMounted(char),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to find CCP image {0}")]
    CcpNotFound(String),

    #[error("CPU halted at {pc:#06x}")]
    Halted { pc: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for CP/M operations.
pub type CpmResult<T> = Result<T, CpmError>;
