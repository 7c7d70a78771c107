//! The embedder-facing bridge.
//!
//! [`Bridge::run_with_gas_limit`] is the single call an embedding host makes:
//! program bytes, a decimal gas limit, an optional memory image and an
//! entry name in; a packaged result or `None` out. Failures never escape as
//! errors or panics. They are reported on the `tracing` error channel and
//! the caller only sees the missing record.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use meterbridge_hostapi::HostApi;

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::result::{pack, Failure};
use crate::runtime::{Invocation, Sandbox};

/// Name the embedding host registers the bridge call under.
pub const ENTRY_POINT: &str = "run_with_gas_limit";

/// Built once by the embedder and shared by every call.
pub struct Bridge {
    sandbox: Sandbox,
    host: Arc<dyn HostApi>,
}

impl Bridge {
    /// Bridge with the default configuration.
    pub fn new(host: Arc<dyn HostApi>) -> Result<Self, SandboxError> {
        Ok(Self::with_sandbox(Sandbox::new(SandboxConfig::default())?, host))
    }

    pub fn with_sandbox(sandbox: Sandbox, host: Arc<dyn HostApi>) -> Self {
        Self { sandbox, host }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Run `entry` of `code` under `gas_limit`.
    ///
    /// Returns `{"Gas":<consumed>,"Result":"<value>"}` on success and `None`
    /// on any failure. An empty `memory` leaves the default zeroed memory.
    pub fn run_with_gas_limit(
        &self,
        code: &[u8],
        gas_limit: &str,
        memory: &[u8],
        entry: &str,
    ) -> Option<String> {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_run(code, gas_limit, memory, entry)
        }));
        match attempt {
            Ok(Ok(packed)) => Some(packed),
            Ok(Err(failure)) => {
                tracing::error!(
                    entry,
                    gas_consumed = failure.gas_consumed,
                    backtrace = failure.backtrace.as_deref().unwrap_or("<none>"),
                    error = %failure.error,
                    "run failed"
                );
                None
            }
            Err(payload) => {
                tracing::error!(entry, panic = %panic_message(payload.as_ref()), "run panicked");
                None
            }
        }
    }

    /// Same as [`run_with_gas_limit`](Self::run_with_gas_limit) but
    /// returning the failure instead of logging it. Panics are not caught.
    pub fn try_run(
        &self,
        code: &[u8],
        gas_limit: &str,
        memory: &[u8],
        entry: &str,
    ) -> Result<String, Failure> {
        let gas_limit = parse_gas_limit(gas_limit)?;
        let mut invocation = Invocation::new(entry, gas_limit);
        if !memory.is_empty() {
            invocation = invocation.with_memory_image(memory);
        }
        let outcome = self.sandbox.run(code, &invocation, self.host.clone())?;
        pack(&outcome).map_err(|e| Failure::new(e, outcome.gas_consumed))
    }
}

/// Parse a base-10 gas limit. Only ASCII digits are accepted: no sign, no
/// whitespace, no empty string.
pub fn parse_gas_limit(raw: &str) -> Result<u64, SandboxError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SandboxError::InvalidGasLimit(raw.to_string()));
    }
    raw.parse()
        .map_err(|_| SandboxError::InvalidGasLimit(raw.to_string()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
