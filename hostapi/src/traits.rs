//! Host API trait: the callbacks behind the `env` imports.
//!
//! The sandbox holds one `HostApi` per run and forwards each import call to
//! it. Pointer validation happens in the sandbox, not here: `log` receives
//! the already bounds-checked bytes, and the bytes returned by `payload` are
//! spliced into guest memory by the sandbox.

use crate::error::HostError;

/// Host-side implementation of the import surface.
///
/// Implementations must be `Send + Sync`: a single host may serve
/// concurrent runs, and any shared state it touches is its own to
/// synchronize. Returning an error from any method aborts the current run.
pub trait HostApi: Send + Sync {
    /// Length in bytes of the payload the program is about to request.
    fn payload_len(&self) -> Result<u32, HostError>;

    /// The payload bytes. `dest_ptr` is where the sandbox will splice them.
    fn payload(&self, dest_ptr: u32) -> Result<Vec<u8>, HostError>;

    /// Diagnostic output: the guest memory region `[ptr, ptr + message.len())`.
    ///
    /// Guests must not branch on log side effects.
    fn log(&self, ptr: u32, message: &[u8]) -> Result<(), HostError>;
}
