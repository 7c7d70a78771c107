//! Sandbox configuration.

use meterbridge_hostapi::types::{
    DEFAULT_MEMORY_PAGES, DEFAULT_TABLE_SIZE, GAS_PER_INSTRUCTION, IMPORT_MODULE, WASM_PAGE_SIZE,
};

/// When host imports are resolved against the import table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportResolution {
    /// Every declared import is resolved at load; one unknown import fails
    /// the whole load.
    #[default]
    Eager,
    /// Unknown function imports are bound to stubs that fail the run with
    /// `import not found` when called. Imported globals still fail at load.
    Lazy,
}

/// Configuration for the metered sandbox.
///
/// Fixed at construction; nothing here is negotiable per run.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Pages given to host-provided linear memory (1 page = 64 KiB).
    /// Default: 128 pages = 8 MiB.
    pub default_memory_pages: u32,

    /// Upper bound on linear memory growth, in pages.
    /// Default: 256 pages = 16 MiB.
    pub max_memory_pages: u32,

    /// Elements in a host-provided function table.
    pub default_table_size: u32,

    /// Gas charged per executed instruction by the default policy.
    pub gas_per_instruction: u32,

    /// Module name host imports are resolved under.
    pub import_module: String,

    /// Import resolution policy.
    pub import_resolution: ImportResolution,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_memory_pages: DEFAULT_MEMORY_PAGES,
            max_memory_pages: 256,
            default_table_size: DEFAULT_TABLE_SIZE,
            gas_per_instruction: GAS_PER_INSTRUCTION,
            import_module: IMPORT_MODULE.to_string(),
            import_resolution: ImportResolution::Eager,
        }
    }
}

impl SandboxConfig {
    /// Maximum linear memory size in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_pages as usize) * WASM_PAGE_SIZE
    }
}
