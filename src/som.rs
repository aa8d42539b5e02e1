//! SOM on-disk record definitions.
//!
//! These definitions are independent of read/write support, although we
//! implement some traits useful for those. This module is the equivalent of
//! `/usr/include/a.out.h` + `bfd/som.h`'s SOM-specific additions, and is
//! based heavily on the shape HP's linker/assembler and GNU `bfd/som.c`
//! agree on.
//!
//! Every multi-byte field is big-endian (`endian::BE`); SOM has no other
//! byte order. Bit-packed flag words are represented here as a single
//! `U32<BE>` field in the `#[repr(C)]` record, with a sibling non-`Pod`
//! struct (e.g. [`SpaceFlags`]) providing the typed, bit-exact view via
//! [`SpaceFlags::unpack`]/[`SpaceFlags::pack`] — the "swap in"/"swap out"
//! bijection of a single field.

use crate::endian::{pack_bits, unpack_bits, BigEndian as BE, U32};
use crate::pod::Pod;

/// CPU id accepted as the low end of the PA-RISC range.
pub const CPU_PA_RISC1_0: u32 = 0x20B;
/// CPU id for PA-RISC 1.1.
pub const CPU_PA_RISC1_1: u32 = 0x210;
/// CPU id for PA-RISC 2.0.
pub const CPU_PA_RISC2_0: u32 = 0x214;
/// The highest CPU id accepted as PA-RISC.
pub const CPU_PA_RISC_MAXID: u32 = 0x2FF;

/// Returns true if `system_id` falls within the accepted PA-RISC CPU id
/// range.
#[inline]
pub fn is_pa_risc_system_id(system_id: u32) -> bool {
    (CPU_PA_RISC1_0..=CPU_PA_RISC_MAXID).contains(&system_id)
}

/// Relocatable object (`.o` file).
pub const RELOC_MAGIC: u32 = 0x0106;
/// Executable, non-shared, non-demand-paged.
pub const EXEC_MAGIC: u32 = 0x0107;
/// Executable using shared libraries.
pub const SHARE_MAGIC: u32 = 0x0108;
/// Demand-paged executable.
pub const DEMAND_MAGIC: u32 = 0x010B;
/// Dynamic load library.
pub const DL_MAGIC: u32 = 0x010D;
/// Shared library.
pub const SHL_MAGIC: u32 = 0x010E;
/// An archive whose first member is a Library Symbol Table pointing at a
/// nested SOM (spec.md §4.5, §8 scenario 5).
pub const EXECLIBMAGIC: u32 = 0x0619;

/// The set of magics this back-end accepts on read (spec.md §6).
pub const ACCEPTED_MAGICS: &[u32] = &[
    RELOC_MAGIC,
    EXEC_MAGIC,
    SHARE_MAGIC,
    DEMAND_MAGIC,
    DL_MAGIC,
    SHL_MAGIC,
    EXECLIBMAGIC,
];

/// Returns true if `magic` names a format this back-end understands.
#[inline]
pub fn is_accepted_magic(magic: u32) -> bool {
    ACCEPTED_MAGICS.contains(&magic)
}

/// Returns true if `magic` implies an executable or dynamically loadable
/// layout (spec.md §4.4: "if executable/dynamic").
#[inline]
pub fn magic_is_exec_or_dynamic(magic: u32) -> bool {
    matches!(
        magic,
        EXEC_MAGIC | SHARE_MAGIC | DEMAND_MAGIC | DL_MAGIC | SHL_MAGIC
    )
}

/// The older of the two SOM version ids this back-end recognizes.
pub const OLD_VERSION_ID: u32 = 85082112;
/// The current SOM version id, written on output.
pub const NEW_VERSION_ID: u32 = 89093592;

/// LST (archive symbol directory) magic number.
pub const LIBMAGIC: u32 = 0x0223_0213;
/// Number of buckets in the LST hash table (spec.md §6).
pub const SOM_LST_HASH_SIZE: usize = 31;
/// Maximum number of archive members an LST can index (spec.md §6).
pub const SOM_LST_MODULE_LIMIT: usize = 1024;

/// A file timestamp: POSIX seconds plus nanoseconds, as SOM stores it.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SysClock {
    pub secs: U32<BE>,
    pub nanosecs: U32<BE>,
}
unsafe impl Pod for SysClock {}

/// The fixed-size header at the start of every SOM file.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Header {
    pub system_id: U32<BE>,
    pub a_magic: U32<BE>,
    pub version_id: U32<BE>,
    pub file_time: SysClock,
    pub entry_space: U32<BE>,
    pub entry_subspace: U32<BE>,
    pub entry_offset: U32<BE>,
    pub aux_header_location: U32<BE>,
    pub aux_header_size: U32<BE>,
    pub som_length: U32<BE>,
    pub presumed_dp: U32<BE>,
    pub space_location: U32<BE>,
    pub space_total: U32<BE>,
    pub subspace_location: U32<BE>,
    pub subspace_total: U32<BE>,
    pub loader_fixup_location: U32<BE>,
    pub loader_fixup_total: U32<BE>,
    pub space_strings_location: U32<BE>,
    pub space_strings_size: U32<BE>,
    pub init_array_location: U32<BE>,
    pub init_array_total: U32<BE>,
    pub compiler_location: U32<BE>,
    pub compiler_total: U32<BE>,
    pub symbol_location: U32<BE>,
    pub symbol_total: U32<BE>,
    pub fixup_request_location: U32<BE>,
    pub fixup_request_total: U32<BE>,
    pub symbol_strings_location: U32<BE>,
    pub symbol_strings_size: U32<BE>,
    pub unloadable_sp_location: U32<BE>,
    pub unloadable_sp_size: U32<BE>,
    pub checksum: U32<BE>,
}
unsafe impl Pod for Header {}

/// Compute the header checksum: XOR of all 32-bit words of the header with
/// the checksum field treated as zero (spec.md §3, §4.2).
pub fn header_checksum(header: &Header) -> u32 {
    let bytes = crate::pod::bytes_of(header);
    let mut sum: u32 = 0;
    // Every field of `Header` is a 4-byte `U32`, so chunking by 4 visits
    // each field (including `checksum`, which we skip explicitly below).
    let checksum_offset = {
        let base = header as *const Header as usize;
        let field = &header.checksum as *const U32<BE> as usize;
        field - base
    };
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        if i * 4 == checksum_offset {
            continue;
        }
        sum ^= u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    sum
}

/// An `aux_id` record, the common prefix of every auxiliary header
/// (spec.md §4.2).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct AuxId {
    /// `{mandatory:1, copy:1, append:1, ignore:1, type:28}`.
    pub flags_and_type: U32<BE>,
    pub length: U32<BE>,
}
unsafe impl Pod for AuxId {}

const AUX_MANDATORY_SHIFT: u32 = 31;
const AUX_COPY_SHIFT: u32 = 30;
const AUX_APPEND_SHIFT: u32 = 29;
const AUX_IGNORE_SHIFT: u32 = 28;
const AUX_TYPE_MASK: u32 = 0x0FFF_FFFF;

/// The typed view of [`AuxId::flags_and_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuxIdFlags {
    pub mandatory: bool,
    pub copy: bool,
    pub append: bool,
    pub ignore: bool,
    pub aux_type: u32,
}

impl AuxIdFlags {
    /// Swap in: unpack a raw flags word into its typed fields.
    pub fn unpack(word: u32) -> Self {
        AuxIdFlags {
            mandatory: unpack_bits(word, AUX_MANDATORY_SHIFT, 1 << AUX_MANDATORY_SHIFT) != 0,
            copy: unpack_bits(word, AUX_COPY_SHIFT, 1 << AUX_COPY_SHIFT) != 0,
            append: unpack_bits(word, AUX_APPEND_SHIFT, 1 << AUX_APPEND_SHIFT) != 0,
            ignore: unpack_bits(word, AUX_IGNORE_SHIFT, 1 << AUX_IGNORE_SHIFT) != 0,
            aux_type: unpack_bits(word, 0, AUX_TYPE_MASK),
        }
    }

    /// Swap out: pack the typed fields back into a raw flags word. Reserved
    /// bits (there are none left over here) are implicitly zero.
    pub fn pack(&self) -> u32 {
        let mut word = 0;
        word = pack_bits(word, AUX_MANDATORY_SHIFT, 1 << AUX_MANDATORY_SHIFT, self.mandatory as u32);
        word = pack_bits(word, AUX_COPY_SHIFT, 1 << AUX_COPY_SHIFT, self.copy as u32);
        word = pack_bits(word, AUX_APPEND_SHIFT, 1 << AUX_APPEND_SHIFT, self.append as u32);
        word = pack_bits(word, AUX_IGNORE_SHIFT, 1 << AUX_IGNORE_SHIFT, self.ignore as u32);
        word = pack_bits(word, 0, AUX_TYPE_MASK, self.aux_type);
        word
    }
}

/// Identifies the `EXEC_AUX_ID` executable auxiliary header.
pub const EXEC_AUX_ID: u32 = 0x0004;
/// Identifies a version-string auxiliary header.
pub const VERSION_AUX_ID: u32 = 0x8002;
/// Identifies a copyright-string auxiliary header.
pub const COPYRIGHT_AUX_ID: u32 = 0x8003;

/// Which string auxiliary header `Object::attach_som_aux_header` attaches
/// (spec.md §6's `bfd_som_attach_aux_hdr(abfd, type, string)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxHeaderKind {
    Version,
    Copyright,
}

impl AuxHeaderKind {
    pub fn aux_type(self) -> u32 {
        match self {
            AuxHeaderKind::Version => VERSION_AUX_ID,
            AuxHeaderKind::Copyright => COPYRIGHT_AUX_ID,
        }
    }
}

/// The executable auxiliary header (`som_exec_auxhdr`), present when the
/// file's magic is executable or dynamically loadable.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ExecAuxHeader {
    pub header: AuxId,
    pub exec_tsize: U32<BE>,
    pub exec_tmem: U32<BE>,
    pub exec_tfile: U32<BE>,
    pub exec_dsize: U32<BE>,
    pub exec_dmem: U32<BE>,
    pub exec_dfile: U32<BE>,
    pub exec_bsize: U32<BE>,
    pub exec_entry: U32<BE>,
    pub exec_flags: U32<BE>,
    pub exec_bfill: U32<BE>,
}
unsafe impl Pod for ExecAuxHeader {}

/// `{is_loadable, is_defined, is_private, has_intermediate_code,
/// is_tspecific, sort_key:8}`, the flags word of a space dictionary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpaceFlags {
    pub is_loadable: bool,
    pub is_defined: bool,
    pub is_private: bool,
    pub has_intermediate_code: bool,
    pub is_tspecific: bool,
    pub sort_key: u8,
}

impl SpaceFlags {
    pub fn unpack(word: u32) -> Self {
        SpaceFlags {
            is_loadable: unpack_bits(word, 31, 1 << 31) != 0,
            is_defined: unpack_bits(word, 30, 1 << 30) != 0,
            is_private: unpack_bits(word, 29, 1 << 29) != 0,
            has_intermediate_code: unpack_bits(word, 28, 1 << 28) != 0,
            is_tspecific: unpack_bits(word, 27, 1 << 27) != 0,
            sort_key: unpack_bits(word, 8, 0xFF00) as u8,
        }
    }

    pub fn pack(&self) -> u32 {
        let mut word = 0;
        word = pack_bits(word, 31, 1 << 31, self.is_loadable as u32);
        word = pack_bits(word, 30, 1 << 30, self.is_defined as u32);
        word = pack_bits(word, 29, 1 << 29, self.is_private as u32);
        word = pack_bits(word, 28, 1 << 28, self.has_intermediate_code as u32);
        word = pack_bits(word, 27, 1 << 27, self.is_tspecific as u32);
        word = pack_bits(word, 8, 0xFF00, self.sort_key as u32);
        word
    }
}

/// A space (logical address region) dictionary record (spec.md §3).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SpaceDictionaryRecord {
    pub name: U32<BE>,
    pub flags: U32<BE>,
    pub space_number: U32<BE>,
    pub subspace_index: U32<BE>,
    pub subspace_quantity: U32<BE>,
    pub loader_fix_index: U32<BE>,
    pub loader_fix_quantity: U32<BE>,
    pub init_pointer_index: U32<BE>,
    pub init_pointer_quantity: U32<BE>,
}
unsafe impl Pod for SpaceDictionaryRecord {}

/// `{access_control_bits:7, memory_resident, dup_common, is_common,
/// is_loadable, quadrant:2, initially_frozen, is_first, code_only,
/// sort_key:8, replicate_init, continuation, is_tspecific, is_comdat}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubspaceFlags {
    pub access_control_bits: u8,
    pub memory_resident: bool,
    pub dup_common: bool,
    pub is_common: bool,
    pub is_loadable: bool,
    pub quadrant: u8,
    pub initially_frozen: bool,
    pub is_first: bool,
    pub code_only: bool,
    pub sort_key: u8,
    pub replicate_init: bool,
    pub continuation: bool,
    pub is_tspecific: bool,
    pub is_comdat: bool,
}

impl SubspaceFlags {
    pub fn unpack(word: u32) -> Self {
        SubspaceFlags {
            access_control_bits: unpack_bits(word, 25, 0x7F << 25) as u8,
            memory_resident: unpack_bits(word, 24, 1 << 24) != 0,
            dup_common: unpack_bits(word, 23, 1 << 23) != 0,
            is_common: unpack_bits(word, 22, 1 << 22) != 0,
            is_loadable: unpack_bits(word, 21, 1 << 21) != 0,
            quadrant: unpack_bits(word, 19, 0x3 << 19) as u8,
            initially_frozen: unpack_bits(word, 18, 1 << 18) != 0,
            is_first: unpack_bits(word, 17, 1 << 17) != 0,
            code_only: unpack_bits(word, 16, 1 << 16) != 0,
            sort_key: unpack_bits(word, 8, 0xFF00) as u8,
            replicate_init: unpack_bits(word, 7, 1 << 7) != 0,
            continuation: unpack_bits(word, 6, 1 << 6) != 0,
            is_tspecific: unpack_bits(word, 5, 1 << 5) != 0,
            is_comdat: unpack_bits(word, 4, 1 << 4) != 0,
        }
    }

    pub fn pack(&self) -> u32 {
        let mut word = 0;
        word = pack_bits(word, 25, 0x7F << 25, self.access_control_bits as u32);
        word = pack_bits(word, 24, 1 << 24, self.memory_resident as u32);
        word = pack_bits(word, 23, 1 << 23, self.dup_common as u32);
        word = pack_bits(word, 22, 1 << 22, self.is_common as u32);
        word = pack_bits(word, 21, 1 << 21, self.is_loadable as u32);
        word = pack_bits(word, 19, 0x3 << 19, self.quadrant as u32);
        word = pack_bits(word, 18, 1 << 18, self.initially_frozen as u32);
        word = pack_bits(word, 17, 1 << 17, self.is_first as u32);
        word = pack_bits(word, 16, 1 << 16, self.code_only as u32);
        word = pack_bits(word, 8, 0xFF00, self.sort_key as u32);
        word = pack_bits(word, 7, 1 << 7, self.replicate_init as u32);
        word = pack_bits(word, 6, 1 << 6, self.continuation as u32);
        word = pack_bits(word, 5, 1 << 5, self.is_tspecific as u32);
        word = pack_bits(word, 4, 1 << 4, self.is_comdat as u32);
        word
    }
}

/// A subspace (concrete byte range within a space) dictionary record
/// (spec.md §3).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SubspaceDictionaryRecord {
    pub space_index: U32<BE>,
    pub flags: U32<BE>,
    pub file_loc_init_value: U32<BE>,
    pub initialization_length: U32<BE>,
    pub subspace_start: U32<BE>,
    pub subspace_length: U32<BE>,
    pub alignment: U32<BE>,
    pub name: U32<BE>,
    pub fixup_request_index: U32<BE>,
    pub fixup_request_quantity: U32<BE>,
}
unsafe impl Pod for SubspaceDictionaryRecord {}

/// Abstract SOM symbol type (spec.md §3), the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolType {
    Unknown = 0,
    Absolute = 1,
    Code = 2,
    Data = 3,
    Entry = 4,
    Millicode = 5,
    Plabel = 6,
    PriProg = 7,
    SecProg = 8,
    Storage = 9,
    Stub = 10,
    Null = 11,
    SymExt = 12,
    ArgExt = 13,
}

impl SymbolType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => SymbolType::Unknown,
            1 => SymbolType::Absolute,
            2 => SymbolType::Code,
            3 => SymbolType::Data,
            4 => SymbolType::Entry,
            5 => SymbolType::Millicode,
            6 => SymbolType::Plabel,
            7 => SymbolType::PriProg,
            8 => SymbolType::SecProg,
            9 => SymbolType::Storage,
            10 => SymbolType::Stub,
            11 => SymbolType::Null,
            12 => SymbolType::SymExt,
            13 => SymbolType::ArgExt,
            _ => return None,
        })
    }

    /// Functions and entry-like symbols carry a 2-bit privilege level in the
    /// low bits of their value (spec.md §4.4).
    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            SymbolType::Entry
                | SymbolType::PriProg
                | SymbolType::SecProg
                | SymbolType::Millicode
                | SymbolType::Code
                | SymbolType::Stub
        )
    }
}

/// Abstract SOM symbol scope (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SymbolScope {
    External = 0,
    Unsat = 1,
    Universal = 2,
    Local = 3,
}

impl SymbolScope {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => SymbolScope::External,
            1 => SymbolScope::Unsat,
            2 => SymbolScope::Universal,
            3 => SymbolScope::Local,
            _ => return None,
        })
    }
}

/// The typed view of a symbol record's `flags` word:
/// `{symbol_type:6, scope:4, arg_reloc:10, xleast:2, secondary_def,
/// is_common, dup_common}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolFlagsView {
    pub symbol_type: u32,
    pub scope: u32,
    pub arg_reloc: u32,
    pub xleast: u32,
    pub secondary_def: bool,
    pub is_common: bool,
    pub dup_common: bool,
}

impl SymbolFlagsView {
    pub fn unpack(word: u32) -> Self {
        SymbolFlagsView {
            symbol_type: unpack_bits(word, 26, 0x3F << 26),
            scope: unpack_bits(word, 22, 0xF << 22),
            arg_reloc: unpack_bits(word, 12, 0x3FF << 12),
            xleast: unpack_bits(word, 10, 0x3 << 10),
            secondary_def: unpack_bits(word, 9, 1 << 9) != 0,
            is_common: unpack_bits(word, 8, 1 << 8) != 0,
            dup_common: unpack_bits(word, 7, 1 << 7) != 0,
        }
    }

    pub fn pack(&self) -> u32 {
        let mut word = 0;
        word = pack_bits(word, 26, 0x3F << 26, self.symbol_type);
        word = pack_bits(word, 22, 0xF << 22, self.scope);
        word = pack_bits(word, 12, 0x3FF << 12, self.arg_reloc);
        word = pack_bits(word, 10, 0x3 << 10, self.xleast);
        word = pack_bits(word, 9, 1 << 9, self.secondary_def as u32);
        word = pack_bits(word, 8, 1 << 8, self.is_common as u32);
        word = pack_bits(word, 7, 1 << 7, self.dup_common as u32);
        word
    }
}

/// The typed view of a symbol record's `info` word: `{symbol_info:24,
/// is_comdat}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolInfoView {
    /// Subspace index for data/code symbols (spec.md §4.4).
    pub symbol_info: u32,
    pub is_comdat: bool,
}

impl SymbolInfoView {
    pub fn unpack(word: u32) -> Self {
        SymbolInfoView {
            symbol_info: unpack_bits(word, 8, 0xFFFFFF00),
            is_comdat: unpack_bits(word, 0, 1) != 0,
        }
    }

    pub fn pack(&self) -> u32 {
        let mut word = 0;
        word = pack_bits(word, 8, 0xFFFFFF00, self.symbol_info);
        word = pack_bits(word, 0, 1, self.is_comdat as u32);
        word
    }
}

/// A symbol dictionary record: 16 bytes on disk (spec.md §3).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SymbolDictionaryRecord {
    pub name: U32<BE>,
    pub flags: U32<BE>,
    pub info: U32<BE>,
    pub value: U32<BE>,
}
unsafe impl Pod for SymbolDictionaryRecord {}

/// A compilation-unit record: four string offsets, a reserved word, and a
/// timestamp (SPEC_FULL.md §3 addition).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct CompilationUnit {
    pub name: U32<BE>,
    pub language_name: U32<BE>,
    pub product_id: U32<BE>,
    pub version_id: U32<BE>,
    pub reserved: U32<BE>,
    pub time: SysClock,
}
unsafe impl Pod for CompilationUnit {}

/// The header of the archive Library Symbol Table (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct LstHeader {
    pub system_id: U32<BE>,
    pub a_magic: U32<BE>,
    pub version_id: U32<BE>,
    pub file_time: SysClock,
    pub hash_loc: U32<BE>,
    pub hash_size: U32<BE>,
    pub module_count: U32<BE>,
    pub module_limit: U32<BE>,
    pub dir_loc: U32<BE>,
    pub export_list_loc: U32<BE>,
    pub export_list_size: U32<BE>,
    pub import_list_loc: U32<BE>,
    pub import_list_count: U32<BE>,
    pub aux_loc: U32<BE>,
    pub aux_size: U32<BE>,
    pub string_loc: U32<BE>,
    pub string_size: U32<BE>,
    pub free_list: U32<BE>,
    pub file_end: U32<BE>,
    pub checksum: U32<BE>,
}
unsafe impl Pod for LstHeader {}

/// Compute the LST header checksum, using the same discipline as
/// [`header_checksum`] (spec.md §4.7).
pub fn lst_header_checksum(header: &LstHeader) -> u32 {
    let bytes = crate::pod::bytes_of(header);
    let mut sum: u32 = 0;
    let checksum_offset = {
        let base = header as *const LstHeader as usize;
        let field = &header.checksum as *const U32<BE> as usize;
        field - base
    };
    for (i, chunk) in bytes.chunks_exact(4).enumerate() {
        if i * 4 == checksum_offset {
            continue;
        }
        sum ^= u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    sum
}

/// A directory entry in the LST, describing one archive member (module).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SomEntry {
    pub location: U32<BE>,
    pub total_size: U32<BE>,
    pub subspace_location: U32<BE>,
    pub subspace_total_size: U32<BE>,
    pub lib_location: U32<BE>,
    pub space_strings_size: U32<BE>,
    pub time_stamp: U32<BE>,
    pub checksum: U32<BE>,
}
unsafe impl Pod for SomEntry {}

/// One record in an LST hash bucket's chain (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct LstSymbolRecord {
    pub hash_value: U32<BE>,
    /// Pointer into the string area, minus 4 for the length prefix
    /// (spec.md §4.7).
    pub name: U32<BE>,
    pub qualifier_name: U32<BE>,
    pub symbol_type: U32<BE>,
    pub symbol_scope: U32<BE>,
    pub symbol_info: U32<BE>,
    pub symbol_value: U32<BE>,
    /// Index of the archive member (directory entry) this symbol belongs
    /// to.
    pub som_index: U32<BE>,
    /// Offset, from the start of the LST's hash-chain area, of the next
    /// record in this bucket's chain; `u32::MAX` terminates the chain.
    pub next_entry: U32<BE>,
}
unsafe impl Pod for LstSymbolRecord {}

/// Sentinel `next_entry`/hash-bucket value meaning "no next record".
pub const LST_NO_NEXT_ENTRY: u32 = 0xFFFF_FFFF;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::bytes_of;

    fn zero_header() -> Header {
        // Safety: every field is a `Pod` integer wrapper, so the
        // all-zero bit pattern is a valid `Header`.
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn header_size_is_word_aligned() {
        assert_eq!(std::mem::size_of::<Header>() % 4, 0);
    }

    #[test]
    fn checksum_changes_when_any_bit_flips() {
        let mut h = zero_header();
        h.a_magic = U32::new(BE, RELOC_MAGIC);
        h.version_id = U32::new(BE, NEW_VERSION_ID);
        let base = header_checksum(&h);

        let bytes = bytes_of(&h).to_vec();
        let checksum_offset = std::mem::size_of::<Header>() - 4;
        for bit in 0..(bytes.len() * 8) {
            if bit / 8 >= checksum_offset {
                // Flipping the checksum field itself doesn't change what
                // checksum *should* be written; skip it.
                continue;
            }
            let mut flipped = bytes.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            let (flipped_header, _) = crate::pod::from_bytes::<Header>(&flipped).unwrap();
            assert_ne!(
                header_checksum(flipped_header),
                base,
                "checksum did not change for bit {}",
                bit
            );
        }
    }

    #[test]
    fn space_flags_roundtrip() {
        let flags = SpaceFlags {
            is_loadable: true,
            is_defined: true,
            is_private: false,
            has_intermediate_code: false,
            is_tspecific: true,
            sort_key: 0xAB,
        };
        let packed = flags.pack();
        assert_eq!(SpaceFlags::unpack(packed), flags);
    }

    #[test]
    fn subspace_flags_roundtrip_and_reserved_zero() {
        let flags = SubspaceFlags {
            access_control_bits: 0x7F,
            memory_resident: true,
            dup_common: false,
            is_common: true,
            is_loadable: true,
            quadrant: 0b11,
            initially_frozen: false,
            is_first: true,
            code_only: true,
            sort_key: 0x55,
            replicate_init: true,
            continuation: false,
            is_tspecific: true,
            is_comdat: false,
        };
        let packed = flags.pack();
        assert_eq!(SubspaceFlags::unpack(packed), flags);
        // The low 4 bits are reserved and must be zero.
        assert_eq!(packed & 0xF, 0);
    }

    #[test]
    fn symbol_flags_roundtrip() {
        let flags = SymbolFlagsView {
            symbol_type: SymbolType::Entry as u32,
            scope: SymbolScope::Universal as u32,
            arg_reloc: 0x3FF,
            xleast: 3,
            secondary_def: true,
            is_common: false,
            dup_common: true,
        };
        assert_eq!(SymbolFlagsView::unpack(flags.pack()), flags);
    }

    #[test]
    fn symbol_info_roundtrip() {
        let info = SymbolInfoView {
            symbol_info: 0xABCDEF,
            is_comdat: true,
        };
        assert_eq!(SymbolInfoView::unpack(info.pack()), info);
    }

    #[test]
    fn accepted_magics() {
        assert!(is_accepted_magic(RELOC_MAGIC));
        assert!(is_accepted_magic(EXECLIBMAGIC));
        assert!(!is_accepted_magic(0xDEAD));
    }

    #[test]
    fn pa_risc_range() {
        assert!(is_pa_risc_system_id(CPU_PA_RISC1_0));
        assert!(is_pa_risc_system_id(CPU_PA_RISC2_0));
        assert!(!is_pa_risc_system_id(0x1FF));
        assert!(!is_pa_risc_system_id(CPU_PA_RISC_MAXID + 1));
    }
}
