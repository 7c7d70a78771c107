//! `meterbridge-sandbox`: gas-metered Wasm execution behind a narrow host bridge.
//!
//! This crate loads untrusted Wasm programs, meters them, and runs them
//! inside a Wasmtime sandbox. It enforces:
//!
//! - **Determinism:** No SIMD, no threads, NaN canonicalization
//! - **Gas metering:** Every metered block charges its instructions' cost
//!   before it runs, priced by a pluggable [`GasPolicy`]
//! - **Memory limits:** Bounded linear memory growth
//! - **Import resolution:** Only the `env` host imports, resolved at load
//!   (or lazily, when configured); imported globals are refused
//! - **Crash-safe reporting:** [`Bridge`] turns every failure, panics
//!   included, into "no result" plus a diagnostic
//!
//! The embedder-facing entry point is [`Bridge::run_with_gas_limit`];
//! [`Sandbox`] exposes load and execute separately for program reuse.

pub mod error;
pub mod config;
pub mod memory;
pub mod gas_policy;
pub mod imports;
pub mod validation;
pub mod cancel;
pub mod host_impl;
pub mod linker;
pub mod result;
pub mod runtime;
pub mod bridge;

pub use bridge::{Bridge, ENTRY_POINT};
pub use cancel::CancelToken;
pub use config::{ImportResolution, SandboxConfig};
pub use error::SandboxError;
pub use gas_policy::{ConstantGasPolicy, CostTable, GasPolicy, Instruction, InstructionClass};
pub use result::{Failure, Outcome, PackedResult, ReturnValue};
pub use runtime::{Invocation, Program, Sandbox};
