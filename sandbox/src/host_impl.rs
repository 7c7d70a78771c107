//! Per-execution mutable state held in the Wasmtime Store.
//!
//! `HostState` combines the gas meter, the host callbacks, the linear
//! memory host imports operate on, and the cancellation token into a
//! single struct that lives inside `Store<HostState>` for one run.

use std::sync::Arc;

use meterbridge_hostapi::{HostApi, HostGasMeter};
use wasmtime::{Memory, StoreLimits, StoreLimitsBuilder};

use crate::cancel::CancelToken;
use crate::error::SandboxError;

/// Per-execution mutable state held in the Wasmtime `Store`.
///
/// Created fresh for each run. Dropped when the instance is discarded at
/// the end of execution.
pub struct HostState {
    /// Authoritative gas meter, fed by the injected `gas` import.
    pub gas_meter: HostGasMeter,
    /// Callbacks behind the `env` imports.
    pub host: Arc<dyn HostApi>,
    /// Detached buffer, used when the program has no memory of its own.
    pub memory: Option<Memory>,
    /// Checked on every gas charge.
    pub cancel: CancelToken,
    /// Memory growth bound for the store.
    pub limits: StoreLimits,
    /// Number of host import calls served.
    pub import_calls: u64,
}

impl HostState {
    /// Create a new host state for one run.
    pub fn new(
        gas_limit: u64,
        host: Arc<dyn HostApi>,
        cancel: CancelToken,
        max_memory_bytes: usize,
    ) -> Self {
        Self {
            gas_meter: HostGasMeter::new(gas_limit),
            host,
            memory: None,
            cancel,
            limits: StoreLimitsBuilder::new()
                .memory_size(max_memory_bytes)
                .build(),
            import_calls: 0,
        }
    }

    /// Charge the cost of the next metered block.
    ///
    /// Cancellation is observed here, so a cancelled run stops before its
    /// next block. On out-of-gas the meter keeps its pre-charge value.
    pub fn charge_gas(&mut self, amount: i64) -> Result<(), SandboxError> {
        if self.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        let requested = u64::try_from(amount)
            .map_err(|_| SandboxError::GuestTrapped(format!("negative gas charge {amount}")))?;
        self.gas_meter
            .charge(requested)
            .map_err(|_| SandboxError::OutOfGas {
                limit: self.gas_meter.limit(),
                consumed: self.gas_meter.consumed(),
                requested,
            })
    }

    /// Gas consumed so far.
    pub fn gas_consumed(&self) -> u64 {
        self.gas_meter.consumed()
    }
}
