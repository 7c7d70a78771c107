//! Resource limit tests: traps, memory limits, cancellation.
//!
//! These tests verify that the sandbox turns every way a guest can go
//! wrong into a contained failure of that run.

mod common;

use std::thread;
use std::time::Duration;

use meterbridge_hostapi::types::WASM_PAGE_SIZE;
use meterbridge_sandbox::{
    CancelToken, Invocation, ReturnValue, SandboxConfig, SandboxError,
};

use common::*;

// ── Test: traps ──

#[test]
fn test_unreachable_traps() {
    let wat = r#"(module (func (export "main") (result i32) unreachable))"#;
    let failure = run(&sandbox(), wat, "main", PLENTY).unwrap_err();
    assert!(matches!(failure.error, SandboxError::GuestTrapped(_)));
    assert!(failure.backtrace.is_some());
}

#[test]
fn test_out_of_bounds_load_traps() {
    let wat = r#"
        (module
            (memory 1)
            (func (export "main") (result i32)
                i32.const 65536
                i32.load)
        )
    "#;
    let failure = run(&sandbox(), wat, "main", PLENTY).unwrap_err();
    assert!(matches!(failure.error, SandboxError::GuestTrapped(_)));
}

#[test]
fn test_stack_overflow_traps() {
    let failure = run(&sandbox(), RECURSE_WAT, "main", u64::MAX).unwrap_err();
    assert!(
        matches!(failure.error, SandboxError::GuestTrapped(_)),
        "got {:?}",
        failure.error
    );
}

#[test]
fn test_integer_divide_by_zero_traps() {
    let wat = r#"
        (module
            (func (export "main") (result i32)
                i32.const 1
                i32.const 0
                i32.div_s)
        )
    "#;
    let failure = run(&sandbox(), wat, "main", PLENTY).unwrap_err();
    assert!(matches!(failure.error, SandboxError::GuestTrapped(_)));
}

// ── Test: memory limit enforced via store limits ──

#[test]
fn test_memory_grow_past_limit_fails() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "main") (result i32)
                i32.const 300
                memory.grow)
        )
    "#;
    let outcome = run(&sandbox(), wat, "main", PLENTY).unwrap();
    assert_eq!(outcome.value, ReturnValue::I32(-1));
}

#[test]
fn test_memory_grow_within_limit_succeeds() {
    let wat = r#"
        (module
            (memory (export "memory") 1)
            (func (export "main") (result i32)
                i32.const 3
                memory.grow)
        )
    "#;
    // memory.grow returns the previous size
    let outcome = run(&sandbox(), wat, "main", PLENTY).unwrap();
    assert_eq!(outcome.value, ReturnValue::I32(1));
}

#[test]
fn test_default_memory_above_limit_fails() {
    let config = SandboxConfig {
        default_memory_pages: 64,
        max_memory_pages: 16,
        ..SandboxConfig::default()
    };
    let wat = r#"(module (func (export "main") (result i32) i32.const 0))"#;
    let failure = run(&sandbox_with(config), wat, "main", PLENTY).unwrap_err();
    assert!(matches!(failure.error, SandboxError::MemoryError(_)));
}

// ── Test: memory image bounds ──

#[test]
fn test_image_larger_than_detached_memory() {
    let wat = r#"(module (func (export "main") (result i32) i32.const 0))"#;
    let config = SandboxConfig {
        default_memory_pages: 1,
        ..SandboxConfig::default()
    };
    let sandbox = sandbox_with(config);
    let image = vec![0u8; WASM_PAGE_SIZE + 1];
    let failure = sandbox
        .run(
            wat.as_bytes(),
            &Invocation::new("main", PLENTY).with_memory_image(image),
            mem_host(),
        )
        .unwrap_err();
    match failure.error {
        SandboxError::MemoryImageTooLarge {
            image_len,
            memory_len,
        } => {
            assert_eq!(image_len, WASM_PAGE_SIZE + 1);
            assert_eq!(memory_len, WASM_PAGE_SIZE);
        }
        other => panic!("expected MemoryImageTooLarge, got {other:?}"),
    }
}

#[test]
fn test_image_replaces_data_segments() {
    let sandbox = sandbox();
    let program = sandbox.load(SEGMENT_WAT.as_bytes()).unwrap();
    let byte4 = |invocation: Invocation| {
        sandbox.execute(&program, &invocation, mem_host()).unwrap().value
    };
    assert_eq!(byte4(Invocation::new("byte4", PLENTY)), ReturnValue::I32(7));
    assert_eq!(
        byte4(Invocation::new("byte4", PLENTY).with_memory_image([1u8, 2])),
        ReturnValue::I32(0)
    );
}

#[test]
fn test_image_reaches_unexported_memory() {
    let sandbox = sandbox();
    let program = sandbox.load(PRIVATE_MEMORY_WAT.as_bytes()).unwrap();
    let run_with_image = |entry: &str| {
        sandbox
            .execute(
                &program,
                &Invocation::new(entry, PLENTY).with_memory_image([42u8]),
                mem_host(),
            )
            .unwrap()
            .value
    };
    assert_eq!(run_with_image("byte0"), ReturnValue::I32(42));
    assert_eq!(run_with_image("byte4"), ReturnValue::I32(0));
}

#[test]
fn test_image_exactly_memory_size() {
    let image = vec![9u8; WASM_PAGE_SIZE];
    let outcome = sandbox()
        .run(
            IMAGE_WAT.as_bytes(),
            &Invocation::new("byte3", PLENTY).with_memory_image(image),
            mem_host(),
        )
        .unwrap();
    assert_eq!(outcome.value, ReturnValue::I32(9));
}

// ── Test: cancellation ──

#[test]
fn test_cancelled_before_start() {
    let token = CancelToken::new();
    token.cancel();
    let failure = sandbox()
        .run(
            ADD_WAT.as_bytes(),
            &Invocation::new("main", PLENTY).with_cancel_token(token),
            mem_host(),
        )
        .unwrap_err();
    assert!(matches!(failure.error, SandboxError::Cancelled));
    assert_eq!(failure.gas_consumed, 0);
}

#[test]
fn test_cancel_stops_infinite_loop() {
    let sandbox = sandbox();
    let program = sandbox.load(LOOP_WAT.as_bytes()).unwrap();
    let token = CancelToken::new();

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };

    let failure = sandbox
        .execute(
            &program,
            &Invocation::new("main", u64::MAX).with_cancel_token(token),
            mem_host(),
        )
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(failure.error, SandboxError::Cancelled));
    assert!(failure.gas_consumed > 0);
}

// ── Test: a failed run does not affect the next ──

#[test]
fn test_failure_is_confined_to_its_run() {
    let sandbox = sandbox();
    assert!(run(&sandbox, LOOP_WAT, "main", 100).is_err());
    let outcome = run(&sandbox, ADD_WAT, "main", PLENTY).unwrap();
    assert_eq!(outcome.value, ReturnValue::I32(5));
}
