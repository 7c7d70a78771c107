//! Host-side error types for the meterbridge sandbox.
//!
//! `HostError` is the error type returned by `HostApi` callbacks and by the
//! gas meter. Any `HostError` raised while a program runs aborts that run.

use std::fmt;

/// Host status codes.
///
/// `Ok` is the status the `payload` and `log` imports hand back to the guest.
/// The other codes classify host-side failures in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    BadPointer = 1,
    OutOfGas = 2,
}

impl ErrorCode {
    /// Return the i32 representation of this code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::BadPointer => write!(f, "ERR_BAD_POINTER"),
            Self::OutOfGas => write!(f, "ERR_OUT_OF_GAS"),
        }
    }
}

/// Host-side error type returned by `HostApi` methods and the gas meter.
///
/// The `Internal` variant carries a descriptive message for host failures
/// that have no dedicated code, e.g. an embedder callback that could not
/// produce its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// A classified host error.
    Code(ErrorCode),
    /// An internal host error with a message.
    Internal(String),
}

impl HostError {
    /// Create an out-of-gas error.
    pub fn out_of_gas() -> Self {
        Self::Code(ErrorCode::OutOfGas)
    }

    /// Create a bad-pointer error.
    pub fn bad_pointer() -> Self {
        Self::Code(ErrorCode::BadPointer)
    }

    /// Create an internal error with a message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for out-of-gas errors.
    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, Self::Code(ErrorCode::OutOfGas))
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "host error: {}", code),
            Self::Internal(msg) => write!(f, "internal host error: {}", msg),
        }
    }
}

impl std::error::Error for HostError {}

impl From<ErrorCode> for HostError {
    fn from(code: ErrorCode) -> Self {
        Self::Code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_status_is_zero() {
        assert_eq!(ErrorCode::Ok.as_i32(), 0);
    }

    #[test]
    fn test_display() {
        let s = format!("{}", HostError::out_of_gas());
        assert!(s.contains("ERR_OUT_OF_GAS"));

        let s = format!("{}", HostError::internal("payload source closed"));
        assert!(s.contains("payload source closed"));
    }

    #[test]
    fn test_is_out_of_gas() {
        assert!(HostError::out_of_gas().is_out_of_gas());
        assert!(!HostError::bad_pointer().is_out_of_gas());
        let err: HostError = ErrorCode::OutOfGas.into();
        assert!(err.is_out_of_gas());
    }
}
