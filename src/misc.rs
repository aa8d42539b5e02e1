//! Print, copy-private-data, and section-split helpers.
//!
//! These have no polymorphic `bfd*` handle to hang off of in this crate (the
//! real BFD host dispatches them through a generic vtable), so they are free
//! functions taking explicit source/destination values instead.

use core::fmt;

use crate::som::ExecAuxHeader;

/// A subspace larger than this is split at link time rather than referenced
/// by a single PA-RISC short branch.
///
/// The 240000 figure is the magic number the original HP-UX linker used; it
/// is kept verbatim but exposed as a named, overridable constant rather than
/// an inline literal.
pub const DEFAULT_SPLIT_THRESHOLD: u32 = 240_000;

/// Returns true if a subspace of `size` bytes should be split into multiple
/// link units rather than kept as one.
///
/// Callers that want the stock HP-UX behavior should pass
/// [`DEFAULT_SPLIT_THRESHOLD`] for `threshold`; the parameter exists so the
/// heuristic can be tuned without forking this function.
pub fn link_split_section(size: u32, threshold: u32) -> bool {
    size > threshold
}

/// A borrowed view over an [`ExecAuxHeader`] for human-readable display:
/// dumps the exec aux header fields the way a linker's "print private data"
/// dump would.
///
/// This is a `Display` impl over a borrowed view rather than a write
/// straight to a `File*`, the idiomatic Rust shape for the same operation.
pub struct PrintableExecHeader<'a>(pub &'a ExecAuxHeader);

impl fmt::Display for PrintableExecHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::endian::BigEndian as BE;
        let aux = self.0;
        writeln!(f, "SOM exec auxiliary header:")?;
        writeln!(f, "  text size     = {:#x}", aux.exec_tsize.get(BE))?;
        writeln!(f, "  text mem addr = {:#x}", aux.exec_tmem.get(BE))?;
        writeln!(f, "  text file off = {:#x}", aux.exec_tfile.get(BE))?;
        writeln!(f, "  data size     = {:#x}", aux.exec_dsize.get(BE))?;
        writeln!(f, "  data mem addr = {:#x}", aux.exec_dmem.get(BE))?;
        writeln!(f, "  data file off = {:#x}", aux.exec_dfile.get(BE))?;
        writeln!(f, "  bss size      = {:#x}", aux.exec_bsize.get(BE))?;
        writeln!(f, "  entry         = {:#x}", aux.exec_entry.get(BE))?;
        writeln!(f, "  flags         = {:#x}", aux.exec_flags.get(BE))?;
        write!(f, "  bfill         = {:#x}", aux.exec_bfill.get(BE))
    }
}

/// Data copyable between two SOM subspaces of this format, independent of
/// content: the per-section attributes a linker preserves across a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyableSubspaceData {
    pub access_control_bits: u8,
    pub sort_key: u8,
    pub quadrant: u8,
    pub is_comdat: bool,
    pub is_common: bool,
    pub dup_common: bool,
}

#[cfg(feature = "read_core")]
impl CopyableSubspaceData {
    /// Extract the copyable attributes from a parsed section.
    pub fn from_read(section: &crate::read::Section) -> Self {
        CopyableSubspaceData {
            access_control_bits: section.access_control_bits,
            sort_key: section.sort_key,
            quadrant: section.quadrant,
            is_comdat: section.comdat,
            is_common: section.is_common,
            dup_common: section.dup_common,
        }
    }
}

#[cfg(feature = "write_core")]
impl CopyableSubspaceData {
    /// Apply the copyable attributes to a section under construction. There
    /// is no separate `container` back-reference field here since
    /// [`crate::write::SectionBuilder`] resolves sections by index rather
    /// than by pointer, so unlike a generic BFD copy there's nothing to
    /// remap.
    pub fn apply(&self, section: &mut crate::write::SectionBuilder) {
        section.comdat = self.is_comdat || self.is_common || self.dup_common;
    }
}

/// Data copyable between two SOM symbols of this format: the arg-reloc
/// convention and privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyableSymbolData {
    pub arg_reloc: u32,
    pub xleast: u32,
    pub privilege: u32,
}

impl CopyableSymbolData {
    /// Extract the copyable attributes from a classified symbol.
    pub fn from_classified(symbol: &crate::symbol::ClassifiedSymbol) -> Self {
        CopyableSymbolData {
            arg_reloc: symbol.arg_reloc,
            xleast: symbol.xleast,
            privilege: symbol.privilege,
        }
    }

    /// Apply the copyable attributes onto a destination symbol.
    pub fn apply(&self, symbol: &mut crate::symbol::ClassifiedSymbol) {
        symbol.arg_reloc = self.arg_reloc;
        symbol.xleast = self.xleast;
        symbol.privilege = self.privilege;
    }
}

/// Data copyable at the whole-object level: the exec header's flags/bfill
/// words. Content sizes are not included since the destination object
/// computes those itself when it writes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyablePrivateData {
    pub exec_flags: u32,
    pub exec_bfill: u32,
}

impl CopyablePrivateData {
    /// Extract from a bare aux header, trusting `exec_flags` verbatim. Most
    /// callers should prefer [`CopyablePrivateData::from_object`], which
    /// accounts for the entry-point swap heuristic.
    pub fn from_exec_aux(aux: &ExecAuxHeader) -> Self {
        use crate::endian::BigEndian as BE;
        CopyablePrivateData {
            exec_flags: aux.exec_flags.get(BE),
            exec_bfill: aux.exec_bfill.get(BE),
        }
    }

    /// Extract from a parsed object, using its already-resolved
    /// `exec_private_flags` (which may have been swapped in from
    /// `exec_entry` by the read-side quirk heuristic) rather than the raw
    /// `exec_flags` word.
    #[cfg(feature = "read_core")]
    pub fn from_object(object: &crate::read::Object) -> Option<Self> {
        use crate::endian::BigEndian as BE;
        let aux = object.exec_aux.as_ref()?;
        Some(CopyablePrivateData {
            exec_flags: object.exec_private_flags.unwrap_or_else(|| aux.exec_flags.get(BE)),
            exec_bfill: aux.exec_bfill.get(BE),
        })
    }
}
