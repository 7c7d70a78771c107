//! Host import table resolution.
//!
//! Maps `(module, field)` pairs onto the fixed [`HostImport`] set. Anything
//! outside the set is unresolvable; imported globals are refused outright.

use meterbridge_hostapi::HostImport;

use crate::error::SandboxError;

/// Resolve a function import against the host import table.
pub fn resolve(import_module: &str, module: &str, field: &str) -> Result<HostImport, SandboxError> {
    if module == import_module {
        if let Some(import) = HostImport::from_field(field) {
            return Ok(import);
        }
    }
    Err(SandboxError::ImportNotFound {
        module: module.to_string(),
        field: field.to_string(),
    })
}

/// Resolve a global import. Always fails, whatever the name.
pub fn resolve_global(module: &str, field: &str) -> Result<(), SandboxError> {
    Err(SandboxError::GlobalImportUnsupported {
        module: module.to_string(),
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_every_host_import() {
        for import in HostImport::ALL {
            assert_eq!(resolve("env", "env", import.field()).unwrap(), import);
        }
    }

    #[test]
    fn test_unknown_field() {
        let err = resolve("env", "env", "abort").unwrap_err();
        assert_eq!(err.to_string(), "import not found: env:abort");
    }

    #[test]
    fn test_wrong_module() {
        let err = resolve("env", "wasi_snapshot_preview1", "payload").unwrap_err();
        assert!(matches!(err, SandboxError::ImportNotFound { .. }));
    }

    #[test]
    fn test_custom_module_name() {
        assert_eq!(resolve("host", "host", "log").unwrap(), HostImport::Log);
        assert!(resolve("host", "env", "log").is_err());
    }

    #[test]
    fn test_globals_never_resolve() {
        for (module, field) in [("env", "payload_len"), ("env", "g"), ("other", "x")] {
            let err = resolve_global(module, field).unwrap_err();
            assert!(matches!(err, SandboxError::GlobalImportUnsupported { .. }));
        }
    }
}
