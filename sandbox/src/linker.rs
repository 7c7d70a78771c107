//! Host function registration via Wasmtime linker.
//!
//! Registers the injected gas import and the three `env` host imports with
//! the Wasmtime `Linker`. Each host import:
//! 1. Locates the linear memory it operates on
//! 2. Validates pointer/length arguments against that memory
//! 3. Forwards to the `HostApi` held in `HostState`
//! 4. Returns `0` (`ERR_OK`) to the guest
//!
//! Host imports never charge gas. Any failure (bad pointer, host error)
//! traps the run; the guest never sees an error code other than `0`.

use std::collections::BTreeSet;

use meterbridge_hostapi::types::{MEMORY_IMPORT, TABLE_IMPORT};
use meterbridge_hostapi::{ErrorCode, HostImport};
use wasmtime::{
    Caller, Linker, Memory, MemoryType, Module, Ref, RefType, Store, Table, TableType,
};

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::gas_policy::{GAS_FUNC, GAS_MODULE};
use crate::host_impl::HostState;
use crate::memory;
use crate::validation::{ImportLimits, ImportManifest};

/// Export name the guest memory is looked up under.
pub const MEMORY_EXPORT: &str = "memory";

type HostResult<T> = Result<T, wasmtime::Error>;

/// The memory host imports operate on: the program's own memory (always
/// exported after loading), else the detached buffer of a memoryless program.
pub fn guest_memory(caller: &mut Caller<'_, HostState>) -> Result<Memory, SandboxError> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(|e| e.into_memory())
        .or(caller.data().memory)
        .ok_or_else(|| SandboxError::MemoryError("program has no linear memory".into()))
}

/// Register the gas import and every `env` host import with the linker.
pub fn register_host_functions(
    linker: &mut Linker<HostState>,
    config: &SandboxConfig,
) -> Result<(), SandboxError> {
    register_gas(linker)?;
    register_payload_len(linker, &config.import_module)?;
    register_payload(linker, &config.import_module)?;
    register_log(linker, &config.import_module)?;
    Ok(())
}

// ── Gas ──

fn register_gas(linker: &mut Linker<HostState>) -> Result<(), SandboxError> {
    linker.func_wrap(
        GAS_MODULE,
        GAS_FUNC,
        |mut caller: Caller<'_, HostState>, amount: i64| -> HostResult<()> {
            caller
                .data_mut()
                .charge_gas(amount)
                .map_err(wasmtime::Error::new)
        },
    )?;
    Ok(())
}

// ── Host imports ──

fn register_payload_len(linker: &mut Linker<HostState>, module: &str) -> Result<(), SandboxError> {
    linker.func_wrap(
        module,
        HostImport::PayloadLen.field(),
        |mut caller: Caller<'_, HostState>| -> HostResult<i32> {
            let state = caller.data_mut();
            state.import_calls += 1;
            let len = state.host.payload_len().map_err(SandboxError::from)?;
            tracing::trace!(import = %HostImport::PayloadLen, len, "host import");
            // The guest sees an i32; lengths above i32::MAX wrap like any
            // unsigned value reinterpreted by the guest.
            Ok(len as i32)
        },
    )?;
    Ok(())
}

fn register_payload(linker: &mut Linker<HostState>, module: &str) -> Result<(), SandboxError> {
    linker.func_wrap(
        module,
        HostImport::Payload.field(),
        |mut caller: Caller<'_, HostState>, dest_ptr: i32| -> HostResult<i32> {
            let ptr = dest_ptr as u32;
            caller.data_mut().import_calls += 1;
            let mem = guest_memory(&mut caller)?;
            let bytes = caller.data().host.payload(ptr).map_err(SandboxError::from)?;

            let data = mem.data_mut(&mut caller);
            let memory_len = data.len();
            memory::splice(data, ptr, &bytes).map_err(|_| SandboxError::BadPointer {
                ptr,
                len: bytes.len() as u64,
                memory_len,
            })?;

            tracing::trace!(import = %HostImport::Payload, ptr, len = bytes.len(), "host import");
            Ok(ErrorCode::Ok.as_i32())
        },
    )?;
    Ok(())
}

fn register_log(linker: &mut Linker<HostState>, module: &str) -> Result<(), SandboxError> {
    linker.func_wrap(
        module,
        HostImport::Log.field(),
        |mut caller: Caller<'_, HostState>, msg_ptr: i32, msg_len: i32| -> HostResult<i32> {
            let (ptr, len) = (msg_ptr as u32, msg_len as u32);
            caller.data_mut().import_calls += 1;
            let mem = guest_memory(&mut caller)?;
            let host = caller.data().host.clone();

            let data = mem.data(&caller);
            let message = memory::region(data, ptr, len).map_err(|_| SandboxError::BadPointer {
                ptr,
                len: len as u64,
                memory_len: data.len(),
            })?;
            host.log(ptr, message).map_err(SandboxError::from)?;

            tracing::trace!(import = %HostImport::Log, ptr, len, "host import");
            Ok(ErrorCode::Ok.as_i32())
        },
    )?;
    Ok(())
}

// ── Lazy resolution ──

/// Bind every unresolved function import of `module` to a stub that fails
/// the run with `import not found` when called.
pub fn define_unresolved_stubs(
    linker: &mut Linker<HostState>,
    module: &Module,
    manifest: &ImportManifest,
) -> Result<(), SandboxError> {
    let mut defined = BTreeSet::new();
    for unresolved in manifest.unresolved() {
        if !defined.insert((unresolved.module.as_str(), unresolved.field.as_str())) {
            continue;
        }
        let ty = module
            .imports()
            .find(|i| i.module() == unresolved.module && i.name() == unresolved.field)
            .and_then(|i| i.ty().func().cloned());
        let Some(ty) = ty else {
            continue;
        };

        let (import_module, field) = (unresolved.module.clone(), unresolved.field.clone());
        linker.func_new(
            &unresolved.module,
            &unresolved.field,
            ty,
            move |_caller, _params, _results| {
                tracing::debug!(module = %import_module, field = %field, "unresolved import called");
                Err(wasmtime::Error::new(SandboxError::ImportNotFound {
                    module: import_module.clone(),
                    field: field.clone(),
                }))
            },
        )?;
    }
    Ok(())
}

// ── Host-provided memory and table ──

/// Size of a host-provided region: the configured default or the import's
/// minimum, whichever is larger, capped by the import's maximum.
fn provided_size(default: u32, limits: ImportLimits) -> u32 {
    let size = default.max(limits.initial);
    match limits.maximum {
        Some(max) => size.min(max).max(limits.initial),
        None => size,
    }
}

/// Create the memory a program imports and define it in the linker.
pub fn define_imported_memory(
    store: &mut Store<HostState>,
    linker: &mut Linker<HostState>,
    config: &SandboxConfig,
    limits: ImportLimits,
) -> Result<Memory, SandboxError> {
    let pages = provided_size(config.default_memory_pages, limits);
    let memory = Memory::new(&mut *store, MemoryType::new(pages, limits.maximum))
        .map_err(|e| SandboxError::MemoryError(format!("cannot provide {pages} pages: {e}")))?;
    linker.define(&*store, &config.import_module, MEMORY_IMPORT, memory)?;
    Ok(memory)
}

/// Create the function table a program imports and define it in the linker.
pub fn define_imported_table(
    store: &mut Store<HostState>,
    linker: &mut Linker<HostState>,
    config: &SandboxConfig,
    limits: ImportLimits,
) -> Result<Table, SandboxError> {
    let size = provided_size(config.default_table_size, limits);
    let table = Table::new(
        &mut *store,
        TableType::new(RefType::FUNCREF, size, limits.maximum),
        Ref::Func(None),
    )?;
    linker.define(&*store, &config.import_module, TABLE_IMPORT, table)?;
    Ok(table)
}

/// Create a host-owned memory for a program that has none of its own.
pub fn detached_memory(
    store: &mut Store<HostState>,
    config: &SandboxConfig,
) -> Result<Memory, SandboxError> {
    let pages = config.default_memory_pages;
    let memory = Memory::new(
        &mut *store,
        MemoryType::new(pages, Some(config.max_memory_pages.max(pages))),
    )
    .map_err(|e| SandboxError::MemoryError(format!("cannot provide {pages} pages: {e}")))?;
    store.data_mut().memory = Some(memory);
    Ok(memory)
}
