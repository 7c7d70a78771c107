//! Shared test helpers for integration tests.
//!
//! Provides WAT fixtures, hosts with scripted behavior, and sandbox/bridge
//! factory functions used across all integration test files.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use meterbridge_hostapi::{HostApi, HostError, MemHost};
use meterbridge_sandbox::{
    Bridge, Failure, Invocation, Outcome, PackedResult, Sandbox, SandboxConfig,
};

/// Gas limit large enough for every fixture that terminates.
pub const PLENTY: u64 = 1_000_000;

// ── WAT Fixtures ──

/// `main` returns `2 + 3`.
pub const ADD_WAT: &str = r#"
    (module
        (func (export "main") (result i32)
            i32.const 2
            i32.const 3
            i32.add)
    )
"#;

/// `main` never terminates.
pub const LOOP_WAT: &str = r#"
    (module
        (func (export "main")
            (loop $spin
                br $spin))
    )
"#;

/// `main` recurses without bound.
pub const RECURSE_WAT: &str = r#"
    (module
        (func $down (export "main") (result i32)
            call $down)
    )
"#;

/// One exported page. `splice` pulls the payload into offset 8; `at` reads
/// a byte back.
pub const PAYLOAD_WAT: &str = r#"
    (module
        (import "env" "payload_len" (func $payload_len (result i32)))
        (import "env" "payload" (func $payload (param i32) (result i32)))
        (memory (export "memory") 1)
        (func (export "len") (result i32)
            call $payload_len)
        (func (export "splice") (result i32)
            i32.const 8
            call $payload)
        (func (export "at") (param $addr i32) (result i32)
            local.get $addr
            i32.load8_u)
        (func (export "splice_then_byte_9") (result i32)
            i32.const 8
            call $payload
            drop
            i32.const 9
            i32.load8_u)
        (func (export "splice_then_byte_11") (result i32)
            i32.const 8
            call $payload
            drop
            i32.const 11
            i32.load8_u)
        (func (export "splice_out_of_bounds") (result i32)
            i32.const 65535
            call $payload)
    )
"#;

/// Logs the string stored in its data segment.
pub const LOG_WAT: &str = r#"
    (module
        (import "env" "log" (func $log (param i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 32) "hello, host")
        (func (export "main") (result i32)
            i32.const 32
            i32.const 11
            call $log)
        (func (export "twice") (result i32)
            i32.const 32
            i32.const 5
            call $log
            drop
            i32.const 39
            i32.const 4
            call $log)
        (func (export "past_end") (result i32)
            i32.const 65530
            i32.const 16
            call $log)
    )
"#;

/// Reads bytes 0, 2 and 3 of an exported page.
pub const IMAGE_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (func (export "byte0") (result i32) i32.const 0 i32.load8_u)
        (func (export "byte2") (result i32) i32.const 2 i32.load8_u)
        (func (export "byte3") (result i32) i32.const 3 i32.load8_u)
    )
"#;

/// Same reads as [`IMAGE_WAT`] plus byte 4, which a data segment sets to 7.
pub const SEGMENT_WAT: &str = r#"
    (module
        (memory (export "memory") 1)
        (data (i32.const 4) "\07")
        (func (export "byte0") (result i32) i32.const 0 i32.load8_u)
        (func (export "byte4") (result i32) i32.const 4 i32.load8_u)
    )
"#;

/// Defines a page of memory but does not export it.
pub const PRIVATE_MEMORY_WAT: &str = r#"
    (module
        (import "env" "payload" (func $payload (param i32) (result i32)))
        (memory 1)
        (data (i32.const 4) "\07")
        (func (export "byte0") (result i32) i32.const 0 i32.load8_u)
        (func (export "byte4") (result i32) i32.const 4 i32.load8_u)
        (func (export "splice_then_byte0") (result i32)
            i32.const 0
            call $payload
            drop
            i32.const 0
            i32.load8_u)
    )
"#;

/// A function of `n` `nop`s followed by a constant return.
pub fn nops_wat(n: usize) -> String {
    let body = "nop\n".repeat(n);
    format!(
        r#"(module (func (export "main") (result i32) {body} i32.const 7))"#
    )
}

// ── Hosts ──

pub fn mem_host() -> Arc<MemHost> {
    Arc::new(MemHost::new())
}

pub fn payload_host(payload: &[u8]) -> Arc<MemHost> {
    Arc::new(MemHost::with_payload(payload.to_vec()))
}

/// Host whose every callback panics.
pub struct PanicHost;

impl HostApi for PanicHost {
    fn payload_len(&self) -> Result<u32, HostError> {
        panic!("host exploded in payload_len")
    }

    fn payload(&self, _dest_ptr: u32) -> Result<Vec<u8>, HostError> {
        panic!("host exploded in payload")
    }

    fn log(&self, _ptr: u32, _message: &[u8]) -> Result<(), HostError> {
        panic!("host exploded in log")
    }
}

/// Host whose every callback fails.
pub struct FailingHost;

impl HostApi for FailingHost {
    fn payload_len(&self) -> Result<u32, HostError> {
        Err(HostError::internal("payload store offline"))
    }

    fn payload(&self, _dest_ptr: u32) -> Result<Vec<u8>, HostError> {
        Err(HostError::internal("payload store offline"))
    }

    fn log(&self, _ptr: u32, _message: &[u8]) -> Result<(), HostError> {
        Err(HostError::internal("log sink offline"))
    }
}

// ── Sandbox / Bridge Factories ──

/// Install a test-writer subscriber so diagnostics show up in failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Log sink shared between a subscriber and the test reading it.
#[derive(Clone, Default)]
pub struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with error-level events captured on this thread.
pub fn capture_errors<T>(f: impl FnOnce() -> T) -> (T, String) {
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_max_level(tracing::Level::ERROR)
        .with_ansi(false)
        .without_time()
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, log.contents())
}

pub fn sandbox() -> Sandbox {
    Sandbox::new(SandboxConfig::default()).expect("default sandbox")
}

pub fn sandbox_with(config: SandboxConfig) -> Sandbox {
    Sandbox::new(config).expect("sandbox with config")
}

pub fn bridge() -> Bridge {
    Bridge::new(mem_host()).expect("default bridge")
}

pub fn bridge_with_host(host: Arc<dyn HostApi>) -> Bridge {
    Bridge::new(host).expect("bridge with host")
}

// ── Run Helpers ──

/// Load and run `entry` of `wat` with the given gas limit and an empty host.
pub fn run(sandbox: &Sandbox, wat: &str, entry: &str, gas_limit: u64) -> Result<Outcome, Failure> {
    sandbox.run(wat.as_bytes(), &Invocation::new(entry, gas_limit), mem_host())
}

/// Gas `entry` of `wat` consumes when given plenty.
pub fn gas_of(sandbox: &Sandbox, wat: &str, entry: &str) -> u64 {
    run(sandbox, wat, entry, PLENTY)
        .expect("fixture should complete with plenty of gas")
        .gas_consumed
}

/// Parse a packaged bridge result.
pub fn unpack(packed: &str) -> PackedResult {
    serde_json::from_str(packed).expect("packed result is valid JSON")
}
