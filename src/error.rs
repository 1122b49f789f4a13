//! Error handling for the gridhash search engine
//!
//! One error type covering the whole run lifecycle, from compute-context
//! acquisition through kernel compilation to result verification.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gridhash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gridhash search engine
#[derive(Error, Debug)]
pub enum Error {
    /// No usable compute adapter or device
    #[error("compute resource unavailable: {message}")]
    ResourceUnavailable { message: String },

    /// Kernel shader failed validation
    #[error("kernel compile error: {diagnostic}")]
    KernelCompile { diagnostic: String },

    /// Kernel pipeline creation failed
    #[error("kernel link error: {diagnostic}")]
    KernelLink { diagnostic: String },

    /// Kernel source override could not be read
    #[error("kernel source unavailable: {path:?}: {source}")]
    KernelSource {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input does not fit a single padded message block
    #[error("input too large for a single block: {len} bytes (max {max})")]
    InputTooLarge { len: usize, max: usize },

    /// Kernel-reported digest disagrees with the reference digest.
    ///
    /// This is a kernel-implementation defect, never an acceptable result;
    /// both digests are carried for diagnosis.
    #[error("hash mismatch: kernel {kernel} != reference {reference}")]
    HashMismatch { kernel: String, reference: String },

    /// Dispatch batch errors
    #[error("invalid dispatch batch: {message}")]
    Batch { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Cancellation of an in-flight operation
    #[error("operation was cancelled: {operation}")]
    Cancelled { operation: String },
}

impl Error {
    /// Create a resource-unavailable error
    pub fn resource_unavailable(message: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a kernel compile error
    pub fn kernel_compile(diagnostic: impl Into<String>) -> Self {
        Self::KernelCompile {
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a kernel link error
    pub fn kernel_link(diagnostic: impl Into<String>) -> Self {
        Self::KernelLink {
            diagnostic: diagnostic.into(),
        }
    }

    /// Create a kernel source error
    pub fn kernel_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::KernelSource {
            path: path.into(),
            source,
        }
    }

    /// Create a hash mismatch fault
    pub fn hash_mismatch(kernel: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::HashMismatch {
            kernel: kernel.into(),
            reference: reference.into(),
        }
    }

    /// Create a dispatch batch error
    pub fn batch(message: impl Into<String>) -> Self {
        Self::Batch {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether the error aborts the whole run before or instead of producing
    /// any result (as opposed to caller-correctable input problems).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ResourceUnavailable { .. }
                | Error::KernelCompile { .. }
                | Error::KernelLink { .. }
                | Error::KernelSource { .. }
                | Error::HashMismatch { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::ResourceUnavailable { .. } => "resource_unavailable",
            Error::KernelCompile { .. } => "kernel_compile",
            Error::KernelLink { .. } => "kernel_link",
            Error::KernelSource { .. } => "kernel_source",
            Error::InputTooLarge { .. } => "input_too_large",
            Error::HashMismatch { .. } => "hash_mismatch",
            Error::Batch { .. } => "batch",
            Error::Config { .. } => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Cancelled { .. } => "cancelled",
        }
    }
}
