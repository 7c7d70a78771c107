//! Program validation: import manifest and entry export checks.
//!
//! Before a program is metered and compiled, its import section is walked
//! once:
//!
//! 1. Function imports are resolved against the host import table, and
//!    their signatures checked
//! 2. Imported globals are rejected
//! 3. `memory` / `table` imports under the import module are recorded so
//!    the host can provide them
//! 4. Nothing may import from the reserved gas module
//!
//! Entry exports are checked separately at invocation time.

use wasm_instrument::parity_wasm::elements::{self, External, ValueType};
use wasmtime::{ExternType, FuncType, Module, ValType};

use meterbridge_hostapi::types::{MEMORY_IMPORT, TABLE_IMPORT};
use meterbridge_hostapi::HostImport;

use crate::config::{ImportResolution, SandboxConfig};
use crate::error::SandboxError;
use crate::gas_policy::GAS_MODULE;
use crate::imports;

/// Initial/maximum size declared by a memory or table import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    pub initial: u32,
    pub maximum: Option<u32>,
}

/// One function import and what it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionImport {
    pub module: String,
    pub field: String,
    /// `None` when resolution was deferred to call time.
    pub binding: Option<HostImport>,
}

/// Everything a program expects the host to provide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportManifest {
    pub functions: Vec<FunctionImport>,
    pub memory: Option<ImportLimits>,
    pub table: Option<ImportLimits>,
}

impl ImportManifest {
    /// Function imports that will fail when called.
    pub fn unresolved(&self) -> impl Iterator<Item = &FunctionImport> {
        self.functions.iter().filter(|f| f.binding.is_none())
    }
}

/// Walk the import section and build the program's import manifest.
pub fn resolve_imports(
    module: &elements::Module,
    config: &SandboxConfig,
) -> Result<ImportManifest, SandboxError> {
    let mut manifest = ImportManifest::default();
    let entries = match module.import_section() {
        Some(section) => section.entries(),
        None => return Ok(manifest),
    };
    let types = module
        .type_section()
        .map(|section| section.types())
        .unwrap_or(&[]);

    for entry in entries {
        let (module_name, field) = (entry.module(), entry.field());

        if module_name == GAS_MODULE {
            return Err(SandboxError::ImportNotFound {
                module: module_name.to_string(),
                field: field.to_string(),
            });
        }

        match entry.external() {
            External::Function(type_idx) => {
                let binding = match imports::resolve(&config.import_module, module_name, field) {
                    Ok(import) => {
                        check_signature(import, types.get(*type_idx as usize), module_name, field)?;
                        Some(import)
                    }
                    Err(err) if config.import_resolution == ImportResolution::Eager => {
                        return Err(err)
                    }
                    Err(_) => {
                        tracing::debug!(
                            module = module_name,
                            field,
                            "deferring unresolved import to call time"
                        );
                        None
                    }
                };
                manifest.functions.push(FunctionImport {
                    module: module_name.to_string(),
                    field: field.to_string(),
                    binding,
                });
            }
            External::Global(_) => imports::resolve_global(module_name, field)?,
            External::Memory(memory_type) => {
                if module_name != config.import_module || field != MEMORY_IMPORT {
                    return Err(unsupported(module_name, field, "memory"));
                }
                let limits = memory_type.limits();
                manifest.memory = Some(ImportLimits {
                    initial: limits.initial(),
                    maximum: limits.maximum(),
                });
            }
            External::Table(table_type) => {
                if module_name != config.import_module || field != TABLE_IMPORT {
                    return Err(unsupported(module_name, field, "table"));
                }
                let limits = table_type.limits();
                manifest.table = Some(ImportLimits {
                    initial: limits.initial(),
                    maximum: limits.maximum(),
                });
            }
        }
    }

    Ok(manifest)
}

/// Check that the entry export exists and takes no parameters and
/// returns at most one numeric value.
pub fn resolve_entry(module: &Module, name: &str) -> Result<FuncType, SandboxError> {
    let func_ty = match module.get_export(name) {
        Some(ExternType::Func(ft)) => ft,
        Some(_) => {
            return Err(SandboxError::EntrySignature {
                name: name.to_string(),
                reason: "export is not a function".into(),
            })
        }
        None => return Err(SandboxError::EntryNotFound(name.to_string())),
    };

    if func_ty.params().len() != 0 {
        return Err(SandboxError::EntrySignature {
            name: name.to_string(),
            reason: format!("expected no parameters, got {}", func_ty.params().len()),
        });
    }

    let results: Vec<ValType> = func_ty.results().collect();
    if results.len() > 1 {
        return Err(SandboxError::EntrySignature {
            name: name.to_string(),
            reason: format!("expected at most one result, got {}", results.len()),
        });
    }
    if !results.iter().all(is_numeric) {
        return Err(SandboxError::EntrySignature {
            name: name.to_string(),
            reason: "result must be i32, i64, f32 or f64".into(),
        });
    }

    Ok(func_ty)
}

fn is_numeric(vt: &ValType) -> bool {
    matches!(vt, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
}

fn check_signature(
    import: HostImport,
    ty: Option<&elements::Type>,
    module: &str,
    field: &str,
) -> Result<(), SandboxError> {
    let matches = match ty {
        Some(elements::Type::Function(ft)) => {
            ft.params().len() == import.param_count()
                && ft.params().iter().all(|v| *v == ValueType::I32)
                && ft.results().len() == import.result_count()
                && ft.results().iter().all(|v| *v == ValueType::I32)
        }
        None => false,
    };
    if matches {
        Ok(())
    } else {
        Err(SandboxError::ImportSignature {
            module: module.to_string(),
            field: field.to_string(),
            expected_params: import.param_count(),
        })
    }
}

fn unsupported(module: &str, field: &str, kind: &'static str) -> SandboxError {
    SandboxError::UnsupportedImport {
        module: module.to_string(),
        field: field.to_string(),
        kind,
    }
}
