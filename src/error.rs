//! Error types shared across scope analysis, IL compilation and snapshotting.
//!
//! The teacher crate this project is grounded on hand-rolls its error enums
//! with manual `Display` impls instead of reaching for `thiserror`; this
//! crate follows the same convention.

use std::fmt;

use crate::ast::SourceLocation;

/// Every error the compilation and snapshot pipeline can produce (spec §7).
#[derive(Debug, Clone, PartialEq)]
pub enum MicroviumError {
    /// Parser failure. The core treats the parser as an external collaborator,
    /// so this variant exists mainly so downstream tooling has one error type
    /// to match on; the scope analyzer and IL compiler never construct it.
    Syntax {
        message: String,
        filename: String,
        location: SourceLocation,
    },
    /// A user-visible language restriction: unsupported construct, duplicate
    /// declaration, assignment to `const`, a reserved operator, etc.
    Compile { message: String, location: SourceLocation },
    /// An intentional subset restriction (e.g. `??`, generators, labelled break).
    FeatureNotSupported { feature: String, location: SourceLocation },
    /// An invariant was violated inside the compiler itself. Signals a bug,
    /// not a problem with the input program.
    InternalCompile { message: String },
    /// The snapshot decoder rejected an image.
    InvalidBytecode(InvalidBytecodeReason),
    /// Runtime misuse of the host API (bad import map shape, wrong input count, ...).
    InvalidOperation(String),
}

/// Sub-reasons for `MicroviumError::InvalidBytecode` (spec §4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidBytecodeReason {
    SizeMismatch { expected: u32, actual: u32 },
    HeaderSizeMismatch { expected: u8, actual: u8 },
    CrcMismatch { expected: u16, actual: u16 },
    VersionMismatch { required: u16, actual: u16 },
    FeatureMismatch { required: u32, supported: u32 },
}

impl fmt::Display for MicroviumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax {
                message,
                filename,
                location,
            } => write!(f, "{filename}:{}:{}: {message}", location.line, location.column),
            Self::Compile { message, location } => {
                write!(f, "compile error at {}:{}: {message}", location.line, location.column)
            }
            Self::FeatureNotSupported { feature, location } => write!(
                f,
                "unsupported feature '{feature}' at {}:{}",
                location.line, location.column
            ),
            Self::InternalCompile { message } => write!(f, "internal compiler error: {message}"),
            Self::InvalidBytecode(reason) => write!(f, "invalid bytecode: {reason}"),
            Self::InvalidOperation(message) => write!(f, "invalid operation: {message}"),
        }
    }
}

impl fmt::Display for InvalidBytecodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch (bytecodeSize={expected}, file length={actual})")
            }
            Self::HeaderSizeMismatch { expected, actual } => {
                write!(f, "header size mismatch (expected={expected}, actual={actual})")
            }
            Self::CrcMismatch { expected, actual } => {
                write!(f, "CRC mismatch (expected={expected:#06x}, computed={actual:#06x})")
            }
            Self::VersionMismatch { required, actual } => {
                write!(f, "engine version mismatch (required={required}, have={actual})")
            }
            Self::FeatureMismatch { required, supported } => write!(
                f,
                "required feature flags {required:#010x} not satisfied by supported flags {supported:#010x}"
            ),
        }
    }
}

impl std::error::Error for MicroviumError {}

impl MicroviumError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalCompile { message: message.into() }
    }

    pub fn compile(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Compile {
            message: message.into(),
            location,
        }
    }

    pub fn feature_not_supported(feature: impl Into<String>, location: SourceLocation) -> Self {
        Self::FeatureNotSupported {
            feature: feature.into(),
            location,
        }
    }
}

/// Result alias used throughout scope analysis.
pub type ScopeResult<T> = Result<T, MicroviumError>;
/// Result alias used throughout IL compilation.
pub type CompileResult<T> = Result<T, MicroviumError>;
/// Result alias used throughout snapshot encode/decode.
pub type SnapshotResult<T> = Result<T, MicroviumError>;
/// Result alias used throughout the reference host VM.
pub type HostResult<T> = Result<T, MicroviumError>;
