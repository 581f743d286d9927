//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use std::process::ExitCode;

use crate::config::ConfigError;
use crate::core::protocol::{FrameError, NavError};
use crate::core::session::SessionError;
use crate::core::transport::TransportError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Receiver went silent
    pub const TIMEOUT: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 5;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 7;

    /// Protocol error (frame could not be built or decoded)
    pub const PROTOCOL_ERROR: u8 = 8;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 9;

    /// Transient bus faults persisted past the retry policy
    pub const RETRIES_EXHAUSTED: u8 = 10;

    /// Checksum errors seen in strict mode
    pub const VALIDATION_FAILED: u8 = 11;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a note for stderr
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit exit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Receiver went quiet past the watchdog limit
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::TIMEOUT, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
            ErrorKind::TimedOut => ExitCodes::TIMEOUT,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::ConnectionFailed(_) => ExitCodes::CONNECTION_FAILED,
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::IoError(_) => ExitCodes::ERROR,
            TransportError::RetriesExhausted { .. } => ExitCodes::RETRIES_EXHAUSTED,
            TransportError::Cancelled(_) => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<&anyhow::Error> for CliResult {
    /// Map the root cause of a command failure to an exit code
    fn from(err: &anyhow::Error) -> Self {
        let msg = format!("{:#}", err);

        if let Some(e) = err.downcast_ref::<TransportError>() {
            return Self::Error(Self::from(e).code(), msg);
        }
        if let Some(SessionError::Transport(e)) = err.downcast_ref::<SessionError>() {
            return Self::Error(Self::from(e).code(), msg);
        }
        if err.downcast_ref::<SessionError>().is_some()
            || err.downcast_ref::<FrameError>().is_some()
            || err.downcast_ref::<NavError>().is_some()
        {
            return Self::Error(ExitCodes::PROTOCOL_ERROR, msg);
        }
        if err.downcast_ref::<ConfigError>().is_some() {
            return Self::Error(ExitCodes::CONFIG_ERROR, msg);
        }
        if err.downcast_ref::<hex::FromHexError>().is_some() {
            return Self::Error(ExitCodes::INVALID_ARGS, msg);
        }
        if let Some(e) = err.downcast_ref::<std::io::Error>() {
            return Self::Error(Self::from(std::io::Error::from(e.kind())).code(), msg);
        }

        Self::Error(ExitCodes::ERROR, msg)
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Receiver silent (watchdog)",
        5 => "File not found",
        6 => "Permission denied",
        7 => "Configuration error",
        8 => "Protocol error",
        9 => "Port not found",
        10 => "Retries exhausted",
        11 => "Checksum validation failed",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
