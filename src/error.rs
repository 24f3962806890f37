//! Structured error handling and exit codes.

use serde::Serialize;

/// Exit codes for the oncutf application.
///
/// - 0: Success (every requested rename happened)
/// - 1: General error (unexpected failure)
/// - 2: Nothing to do (empty batch or no effective modules)
/// - 3: Partial success (completed with per-file skips or failures)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the batch completed fully.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// Nothing to do: no files or no effective rename modules.
    NothingToDo = 2,
    /// Partial success: completed but some files were skipped or failed.
    PartialSuccess = 3,
    /// Interrupted: the batch was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "OC000",
            Self::GeneralError => "OC001",
            Self::NothingToDo => "OC002",
            Self::PartialSuccess => "OC003",
            Self::Interrupted => "OC130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "OC001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
