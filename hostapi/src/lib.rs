//! `meterbridge-hostapi`: host API trait definitions and types for the meterbridge sandbox.
//!
//! This crate defines the host side of the import boundary, independent of
//! the execution engine. It provides:
//!
//! - `HostApi` trait: the callbacks behind the `env` imports
//! - `HostGasMeter`: authoritative host-side gas counter
//! - `HostImport`: the fixed import table descriptor
//! - `MemHost`: in-memory `HostApi` with a fixed payload
//! - `HostError`: host-side error type and the `ErrorCode` status codes

pub mod error;
pub mod types;
pub mod gas_meter;
pub mod mem_host;
pub mod traits;

// Re-export commonly used types at the crate root.
pub use error::{ErrorCode, HostError};
pub use types::HostImport;
pub use gas_meter::HostGasMeter;
pub use mem_host::{LogRecord, MemHost};
pub use traits::HostApi;
