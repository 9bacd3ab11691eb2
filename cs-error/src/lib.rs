//! Unified error handling for cpusig
//!
//! Every fallible operation in the workspace (live capture, snapshot I/O,
//! register channel, affinity) reports through [`CpuidError`]. Decoding
//! itself never fails: undetermined values are left unknown instead.

use std::io;
use std::path::PathBuf;

/// Result type alias using CpuidError
pub type Result<T> = std::result::Result<T, CpuidError>;

/// Unified error type for all cpusig operations
#[derive(thiserror::Error, Debug)]
pub enum CpuidError {
    // ============================================================================
    // Instruction Availability
    // ============================================================================
    #[error("CPUID instruction is not supported")]
    NoCpuid,

    #[error("RDTSC instruction is not supported")]
    NoRdtsc,

    #[error("RDMSR instruction is not supported")]
    NoRdmsr,

    #[error("Memory allocation failed")]
    NoMem,

    // ============================================================================
    // Snapshot and File Errors
    // ============================================================================
    #[error("File open operation failed for {path}: {source}")]
    Open {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Bad file format at line {line}: {reason}")]
    BadFormat {
        line: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // ============================================================================
    // Register Channel Errors
    // ============================================================================
    #[error("RDMSR driver error: {0}")]
    NoDriver(String),

    #[error("No permissions to install RDMSR driver")]
    NoPerms,

    #[error("Cannot extract RDMSR driver (read only media?): {0}")]
    Extract(String),

    #[error("Bad handle")]
    InvalidHandle,

    #[error("Invalid MSR {index:#x}: {reason}")]
    InvalidMsr {
        index: u32,
        reason: String,
    },

    #[error("Invalid core number {core} (system has {total} logical CPUs)")]
    InvalidCoreNumber {
        core: u32,
        total: u32,
    },

    #[error("Error on handle read: {0}")]
    HandleRead(String),

    #[error("Invalid given range {high}:{low}")]
    InvalidRange {
        high: u8,
        low: u8,
    },

    #[error("Requested type not found: {0}")]
    NotFound(String),

    #[error("Invalid register request {0}")]
    InvalidRequest(i32),

    #[error("ioctl failed: {0}")]
    Ioctl(#[source] io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl CpuidError {
    /// Create a bad format error for the given 1-based line
    pub fn bad_format(line: usize, reason: impl Into<String>) -> Self {
        Self::BadFormat {
            line,
            reason: reason.into(),
        }
    }

    /// Create a file open error
    pub fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid MSR error from a string
    pub fn invalid_msr(index: u32, reason: impl Into<String>) -> Self {
        Self::InvalidMsr {
            index,
            reason: reason.into(),
        }
    }

    /// Create a driver error from a string
    pub fn no_driver(msg: impl Into<String>) -> Self {
        Self::NoDriver(msg.into())
    }

    /// Create a not implemented error from a string
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error comes from the privileged register channel
    pub fn is_channel_error(&self) -> bool {
        matches!(
            self,
            Self::NoRdmsr
                | Self::NoDriver(_)
                | Self::NoPerms
                | Self::Extract(_)
                | Self::InvalidHandle
                | Self::InvalidMsr { .. }
                | Self::InvalidCoreNumber { .. }
                | Self::HandleRead(_)
                | Self::InvalidRange { .. }
                | Self::InvalidRequest(_)
                | Self::Ioctl(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_format_message() {
        let err = CpuidError::bad_format(7, "missing '='");
        assert_eq!(err.to_string(), "Bad file format at line 7: missing '='");
    }

    #[test]
    fn test_io_conversion() {
        let err: CpuidError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, CpuidError::Io(_)));
        assert!(!err.is_channel_error());
    }

    #[test]
    fn test_channel_errors_classified() {
        assert!(CpuidError::InvalidHandle.is_channel_error());
        assert!(CpuidError::InvalidRange { high: 64, low: 0 }.is_channel_error());
        assert!(!CpuidError::NoCpuid.is_channel_error());
    }

    #[test]
    fn test_invalid_msr_formats_hex() {
        let err = CpuidError::invalid_msr(0x198, "short read");
        assert_eq!(err.to_string(), "Invalid MSR 0x198: short read");
    }
}
