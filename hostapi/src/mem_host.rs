//! In-memory host for embedders and tests.
//!
//! `MemHost` serves a fixed payload and records every log call it receives.

use std::sync::Mutex;

use crate::error::HostError;
use crate::traits::HostApi;

/// One recorded `log` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Guest pointer the message was read from.
    pub ptr: u32,
    /// Raw message bytes.
    pub message: Vec<u8>,
}

impl LogRecord {
    /// The message decoded lossily as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }
}

/// In-memory `HostApi` with a fixed payload.
#[derive(Debug, Default)]
pub struct MemHost {
    payload: Vec<u8>,
    logs: Mutex<Vec<LogRecord>>,
}

impl MemHost {
    /// Create a host with an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host serving `payload`.
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Snapshot of the recorded log calls.
    pub fn logs(&self) -> Vec<LogRecord> {
        self.lock_logs().clone()
    }

    fn lock_logs(&self) -> std::sync::MutexGuard<'_, Vec<LogRecord>> {
        // A poisoned lock only means another run panicked mid-push.
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HostApi for MemHost {
    fn payload_len(&self) -> Result<u32, HostError> {
        u32::try_from(self.payload.len())
            .map_err(|_| HostError::internal("payload exceeds 4 GiB"))
    }

    fn payload(&self, _dest_ptr: u32) -> Result<Vec<u8>, HostError> {
        Ok(self.payload.clone())
    }

    fn log(&self, ptr: u32, message: &[u8]) -> Result<(), HostError> {
        tracing::debug!(
            target: "meterbridge::guest",
            ptr,
            message = %String::from_utf8_lossy(message),
        );
        self.lock_logs().push(LogRecord {
            ptr,
            message: message.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_host() {
        let host = MemHost::new();
        assert_eq!(host.payload_len().unwrap(), 0);
        assert!(host.payload(0).unwrap().is_empty());
        assert!(host.logs().is_empty());
    }

    #[test]
    fn test_payload_served_verbatim() {
        let host = MemHost::with_payload(b"abc".to_vec());
        assert_eq!(host.payload_len().unwrap(), 3);
        assert_eq!(host.payload(128).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_log_records_in_order() {
        let host = MemHost::new();
        host.log(16, b"first").unwrap();
        host.log(32, b"second").unwrap();

        let logs = host.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].ptr, 16);
        assert_eq!(logs[0].text(), "first");
        assert_eq!(logs[1].text(), "second");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let record = LogRecord {
            ptr: 0,
            message: vec![0xff, b'o', b'k'],
        };
        assert!(record.text().ends_with("ok"));
    }
}
