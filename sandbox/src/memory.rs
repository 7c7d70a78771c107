//! Bounds-checked linear memory helpers.
//!
//! Every host import touches guest memory through these functions. A
//! region that does not fit inside the current memory is rejected with
//! `ERR_BAD_POINTER`; memory is never resized to make a write fit.
//! Guest pointers are `i32` on the wire and interpreted as unsigned.

use meterbridge_hostapi::HostError;
use wasm_instrument::parity_wasm::elements::{
    ExportEntry, ExportSection, External, Internal, Module, Section,
};

use crate::error::SandboxError;
use crate::linker::MEMORY_EXPORT;

/// Validate that `[ptr, ptr+len)` lies within a memory of `mem_size` bytes.
pub fn validate_range(mem_size: usize, ptr: u32, len: u64) -> Result<(), HostError> {
    let end = (ptr as u64)
        .checked_add(len)
        .ok_or_else(HostError::bad_pointer)?;
    if end > mem_size as u64 {
        return Err(HostError::bad_pointer());
    }
    Ok(())
}

/// Borrow `len` bytes of guest memory at `ptr`.
pub fn region(mem: &[u8], ptr: u32, len: u32) -> Result<&[u8], HostError> {
    validate_range(mem.len(), ptr, len as u64)?;
    let start = ptr as usize;
    Ok(&mem[start..start + len as usize])
}

/// Splice `data` into guest memory at `ptr`.
///
/// Bytes before `ptr` and from `ptr + data.len()` onward are preserved;
/// the memory length never changes.
pub fn splice(mem: &mut [u8], ptr: u32, data: &[u8]) -> Result<(), HostError> {
    validate_range(mem.len(), ptr, data.len() as u64)?;
    let start = ptr as usize;
    mem[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// Replace the contents of a fresh linear memory with a caller image.
///
/// The image fills the prefix and every byte past it is zeroed, including
/// anything the program's data segments wrote there.
pub fn apply_image(mem: &mut [u8], image: &[u8]) -> Result<(), SandboxError> {
    if image.len() > mem.len() {
        return Err(SandboxError::MemoryImageTooLarge {
            image_len: image.len(),
            memory_len: mem.len(),
        });
    }
    let (prefix, rest) = mem.split_at_mut(image.len());
    prefix.copy_from_slice(image);
    rest.fill(0);
    Ok(())
}

/// Export the program's linear memory under [`MEMORY_EXPORT`] if it is
/// not exported already.
///
/// Host imports and the caller's image work on the exported memory, so a
/// program that defines or imports memory 0 without exporting it gets the
/// export added. Programs without any memory are left unchanged.
pub(crate) fn expose_memory(module: &mut Module) -> Result<(), SandboxError> {
    let imports_memory = module.import_section().is_some_and(|section| {
        section
            .entries()
            .iter()
            .any(|entry| matches!(entry.external(), External::Memory(_)))
    });
    let defines_memory = module
        .memory_section()
        .is_some_and(|section| !section.entries().is_empty());
    if !imports_memory && !defines_memory {
        return Ok(());
    }

    let existing = module
        .export_section()
        .and_then(|section| section.entries().iter().find(|e| e.field() == MEMORY_EXPORT));
    if let Some(entry) = existing {
        return match entry.internal() {
            Internal::Memory(_) => Ok(()),
            _ => Err(SandboxError::InvalidProgram(format!(
                "export `{MEMORY_EXPORT}` is not a memory"
            ))),
        };
    }

    let entry = ExportEntry::new(MEMORY_EXPORT.to_string(), Internal::Memory(0));
    match module.export_section_mut() {
        Some(section) => section.entries_mut().push(entry),
        None => module
            .insert_section(Section::Export(ExportSection::with_entries(vec![entry])))
            .map_err(|e| SandboxError::Instrumentation(e.to_string()))?,
    }
    Ok(())
}
