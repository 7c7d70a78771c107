//! Run outcomes and result packaging.
//!
//! A successful run is packaged as `{"Gas": <consumed>, "Result": "<value>"}`.
//! Failed runs produce no record at all; the bridge reports them out of band.

use std::fmt;

use serde::{Deserialize, Serialize};
use wasmtime::Val;

use crate::error::SandboxError;

/// Value returned by the entry function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    /// The entry returned nothing. Rendered as `0`.
    None,
    I32(i32),
    I64(i64),
    /// Raw IEEE 754 bits.
    F32(u32),
    /// Raw IEEE 754 bits.
    F64(u64),
}

impl ReturnValue {
    /// Convert the entry function's results.
    pub fn from_results(entry: &str, results: &[Val]) -> Result<Self, SandboxError> {
        match results {
            [] => Ok(Self::None),
            [Val::I32(v)] => Ok(Self::I32(*v)),
            [Val::I64(v)] => Ok(Self::I64(*v)),
            [Val::F32(bits)] => Ok(Self::F32(*bits)),
            [Val::F64(bits)] => Ok(Self::F64(*bits)),
            _ => Err(SandboxError::EntrySignature {
                name: entry.to_string(),
                reason: "result is not a single numeric value".into(),
            }),
        }
    }
}

/// Integers render signed; floats render their raw bits unsigned.
impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("0"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(bits) => write!(f, "{bits}"),
            Self::F64(bits) => write!(f, "{bits}"),
        }
    }
}

/// A completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub gas_consumed: u64,
    pub value: ReturnValue,
}

/// A failed run, with the gas spent before it failed.
#[derive(Debug)]
pub struct Failure {
    pub error: SandboxError,
    pub gas_consumed: u64,
    /// Guest call stack at the point of failure, when the engine captured one.
    pub backtrace: Option<String>,
}

impl Failure {
    pub fn new(error: SandboxError, gas_consumed: u64) -> Self {
        Self {
            error,
            gas_consumed,
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }
}

impl From<SandboxError> for Failure {
    fn from(error: SandboxError) -> Self {
        Self::new(error, 0)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (gas consumed: {})", self.error, self.gas_consumed)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Wire form of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedResult {
    #[serde(rename = "Gas")]
    pub gas: u64,
    #[serde(rename = "Result")]
    pub result: String,
}

impl From<&Outcome> for PackedResult {
    fn from(outcome: &Outcome) -> Self {
        Self {
            gas: outcome.gas_consumed,
            result: outcome.value.to_string(),
        }
    }
}

/// Serialize a successful run.
pub fn pack(outcome: &Outcome) -> Result<String, SandboxError> {
    Ok(serde_json::to_string(&PackedResult::from(outcome))?)
}
