//! Host import descriptors and bridge-wide constants.
//!
//! The import table is fixed: every program talks to the host through the
//! three functions listed in [`HostImport::ALL`], all living under
//! [`IMPORT_MODULE`]. Every parameter and result is an `i32`.

/// Size of one linear memory page in bytes.
pub const WASM_PAGE_SIZE: usize = 65536;

/// Default linear memory size in pages (8 MiB).
pub const DEFAULT_MEMORY_PAGES: u32 = 128;

/// Default table size in elements.
pub const DEFAULT_TABLE_SIZE: u32 = 65536;

/// Gas charged per executed instruction by the reference policy.
pub const GAS_PER_INSTRUCTION: u32 = 1;

/// Module name all host imports are resolved under.
pub const IMPORT_MODULE: &str = "env";

/// Field name of an imported linear memory.
pub const MEMORY_IMPORT: &str = "memory";

/// Field name of an imported function table.
pub const TABLE_IMPORT: &str = "table";

/// One entry of the host import table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostImport {
    /// `payload_len() -> i32`
    PayloadLen,
    /// `payload(dest_ptr: i32) -> i32`
    Payload,
    /// `log(ptr: i32, len: i32) -> i32`
    Log,
}

impl HostImport {
    /// Every import the host provides.
    pub const ALL: [HostImport; 3] = [Self::PayloadLen, Self::Payload, Self::Log];

    /// Look up an import by field name.
    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|import| import.field() == field)
    }

    /// The field name the program imports this function under.
    pub fn field(self) -> &'static str {
        match self {
            Self::PayloadLen => "payload_len",
            Self::Payload => "payload",
            Self::Log => "log",
        }
    }

    /// Number of `i32` parameters.
    pub fn param_count(self) -> usize {
        match self {
            Self::PayloadLen => 0,
            Self::Payload => 1,
            Self::Log => 2,
        }
    }

    /// Number of `i32` results. Always one.
    pub fn result_count(self) -> usize {
        1
    }
}

impl std::fmt::Display for HostImport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", IMPORT_MODULE, self.field())
    }
}
