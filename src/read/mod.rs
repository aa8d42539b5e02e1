//! The object loader: turns the bytes of a SOM file into a host-neutral
//! [`Object`] of sections and symbols.
//!
//! This plays the role the `object` crate's per-format `read` modules play:
//! a concrete parser behind a small, format-agnostic surface
//! ([`ObjectSection`]/[`ObjectSymbol`]) that callers can use without caring
//! that the underlying format is SOM.

use crate::endian::BigEndian as BE;
use crate::error::{Error, ReadError, Result};
use crate::pod::Bytes;
use crate::reloc::{self, Relocation};
use crate::som::{self, *};
use crate::symbol::{self, ClassifiedSymbol, SectionResolver};

/// A host-neutral view of one SOM subspace.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub address: u32,
    pub size: u32,
    pub alignment: u32,
    pub kind: SectionKind,
    pub loadable: bool,
    pub comdat: bool,
    /// The subspace's raw 7-bit access control field, the source of
    /// [`classify_section`]'s coarser [`SectionKind`] and of
    /// `copy_private_section_data`'s exact round-trip (spec.md §4.8).
    pub access_control_bits: u8,
    pub sort_key: u8,
    pub quadrant: u8,
    pub is_common: bool,
    pub dup_common: bool,
    pub data: Vec<u8>,
    pub relocations: Vec<Relocation>,
}

/// A coarse section classification, derived from a subspace's
/// `access_control_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
    ReadOnlyData,
    Uninitialized,
    Debug,
    Unknown,
}

fn classify_section(flags: &SubspaceFlags, has_init_data: bool) -> SectionKind {
    if flags.code_only {
        SectionKind::Text
    } else if !has_init_data && flags.is_loadable {
        SectionKind::Uninitialized
    } else if flags.access_control_bits & 0x1 == 0 && flags.is_loadable {
        SectionKind::ReadOnlyData
    } else if flags.is_loadable {
        SectionKind::Data
    } else {
        SectionKind::Debug
    }
}

/// A resolved symbol plus its name, independent of the symbol dictionary's
/// on-disk representation.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: u32,
    pub section: Option<u32>,
    pub classified: ClassifiedSymbol,
}

/// A parsed SOM relocatable object, executable, or shared library.
#[derive(Debug, Clone)]
pub struct Object {
    pub header: Header,
    pub exec_aux: Option<ExecAuxHeader>,
    pub compilation_unit: Option<CompilationUnit>,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub entry: Option<u64>,
    /// The exec aux header's `exec_flags` word, as a caller would read it via
    /// `copy_private_bfd_data`/`print_private_bfd_data` — *not* necessarily
    /// `exec_aux.exec_flags` verbatim. When the entry-point swap heuristic
    /// below fires, `exec_entry` and `exec_flags` have traded places on disk,
    /// so this field holds whichever raw word is actually the flags word
    /// (DESIGN.md, open question (a)).
    pub exec_private_flags: Option<u32>,
}

/// Round a non-power-of-two alignment down is wrong; SOM requires an exact
/// power of two, so reject anything else.
fn exact_log2(value: u32) -> Result<u32> {
    if value == 0 {
        return Ok(0);
    }
    if !value.is_power_of_two() {
        return Err(Error::bad_value("subspace alignment is not a power of two"));
    }
    Ok(value.trailing_zeros())
}

/// Parse a standalone SOM object (not an archive member, and not an
/// `EXECLIBMAGIC` archive — see [`crate::archive`] for those).
pub fn parse(data: &[u8]) -> Result<Object> {
    let header: &Header = Bytes(data).read_at(0).read_error("truncated SOM header")?;
    let header = *header;

    if !som::is_pa_risc_system_id(header.system_id.get(BE)) {
        return Err(Error::wrong_format("not a PA-RISC SOM object"));
    }
    let magic = header.a_magic.get(BE);
    if magic == EXECLIBMAGIC {
        return Err(Error::wrong_format(
            "EXECLIBMAGIC is an archive format; use crate::archive",
        ));
    }
    if !som::is_accepted_magic(magic) {
        return Err(Error::wrong_format("unrecognized SOM a_magic"));
    }
    if som::header_checksum(&header) != header.checksum.get(BE) {
        return Err(Error::bad_value("SOM header checksum mismatch"));
    }

    let is_exec_or_dynamic = som::magic_is_exec_or_dynamic(magic);

    let exec_aux = if is_exec_or_dynamic && header.aux_header_size.get(BE) > 0 {
        Some(
            *Bytes(data)
                .read_at::<ExecAuxHeader>(header.aux_header_location.get(BE) as usize)
                .read_error("truncated exec aux header")?,
        )
    } else {
        None
    };

    let compilation_unit = if header.compiler_total.get(BE) > 0 {
        Some(
            *Bytes(data)
                .read_at::<CompilationUnit>(header.compiler_location.get(BE) as usize)
                .read_error("truncated compilation unit record")?,
        )
    } else {
        None
    };

    let spaces: &[SpaceDictionaryRecord] = Bytes(data)
        .read_slice_at(
            header.space_location.get(BE) as usize,
            header.space_total.get(BE) as usize,
        )
        .read_error("truncated space dictionary")?;
    let subspaces: &[SubspaceDictionaryRecord] = Bytes(data)
        .read_slice_at(
            header.subspace_location.get(BE) as usize,
            header.subspace_total.get(BE) as usize,
        )
        .read_error("truncated subspace dictionary")?;
    let _ = spaces; // space dictionary only contributes names/grouping here.

    let mut sections = Vec::with_capacity(subspaces.len());
    let mut subspace_ranges = Vec::with_capacity(subspaces.len());
    for ss in subspaces {
        let flags = SubspaceFlags::unpack(ss.flags.get(BE));
        let start = ss.subspace_start.get(BE);
        let length = ss.subspace_length.get(BE);
        subspace_ranges.push((start, length));

        let alignment = 1u32
            .checked_shl(exact_log2(ss.alignment.get(BE))?)
            .ok_or_else(|| Error::bad_value("subspace alignment overflow"))?;
        let name = Bytes(data)
            .read_string_at(header.space_strings_location.get(BE) as usize + ss.name.get(BE) as usize)
            .read_error("bad subspace name offset")?;
        let name = String::from_utf8_lossy(name).into_owned();

        let init_len = ss.initialization_length.get(BE) as usize;
        let data_bytes = if init_len > 0 {
            Bytes(data)
                .read_bytes_at(ss.file_loc_init_value.get(BE) as usize, init_len)
                .read_error("truncated subspace content")?
                .0
                .to_vec()
        } else {
            Vec::new()
        };

        let fixup_index = ss.fixup_request_index.get(BE) as usize;
        let fixup_len = ss.fixup_request_quantity.get(BE) as usize;
        let relocations = if fixup_len > 0 {
            let blob = Bytes(data)
                .read_bytes_at(
                    header.fixup_request_location.get(BE) as usize + fixup_index,
                    fixup_len,
                )
                .read_error("truncated fixup stream")?;
            let mut queue = reloc::RelocQueue::new();
            reloc::read::parse_relocations(blob.0, &data_bytes, &mut queue)?
        } else {
            Vec::new()
        };

        sections.push(Section {
            name,
            address: start,
            size: length,
            alignment,
            kind: classify_section(&flags, init_len > 0),
            loadable: flags.is_loadable,
            comdat: flags.is_comdat || flags.is_common || flags.dup_common,
            access_control_bits: flags.access_control_bits,
            sort_key: flags.sort_key,
            quadrant: flags.quadrant,
            is_common: flags.is_common,
            dup_common: flags.dup_common,
            data: data_bytes,
            relocations,
        });
    }

    let resolver = SectionResolver {
        is_exec_or_dynamic,
        subspace_ranges: &subspace_ranges,
    };

    let sym_records: &[SymbolDictionaryRecord] = Bytes(data)
        .read_slice_at(
            header.symbol_location.get(BE) as usize,
            header.symbol_total.get(BE) as usize,
        )
        .read_error("truncated symbol dictionary")?;

    let mut symbols = Vec::new();
    for record in sym_records {
        let Some(classified) = symbol::classify_read(record, BE, &resolver)? else {
            continue;
        };
        let name = Bytes(data)
            .read_string_at(
                header.symbol_strings_location.get(BE) as usize + record.name.get(BE) as usize,
            )
            .read_error("bad symbol name offset")?;
        symbols.push(Symbol {
            name: String::from_utf8_lossy(name).into_owned(),
            value: classified.value,
            section: classified.section,
            classified,
        });
    }

    // The entry point is nominally `exec_entry`, but several conditions mean
    // it cannot be trusted as a start address on its own: a zero value on a
    // non-dynamic executable, a value that isn't instruction aligned, or one
    // that doesn't land inside any text section. This is a known SOM quirk:
    // some tools swap `exec_entry` and `exec_flags` on write, so in any of
    // those cases `exec_flags` is treated as the real start address and
    // `exec_entry` is recorded as the private flags word instead (spec.md
    // §4.5; DESIGN.md, open question (a); kept verbatim as a compatibility
    // shim per spec.md §9).
    let is_dynamic = matches!(magic, SHARE_MAGIC | DL_MAGIC | SHL_MAGIC);
    let (entry, exec_private_flags) = match exec_aux {
        Some(aux) => {
            let raw_entry = aux.exec_entry.get(BE);
            let raw_flags = aux.exec_flags.get(BE);
            let zero_on_static = raw_entry == 0 && !is_dynamic;
            let misaligned = raw_entry & 3 != 0;
            let lands_in_code = sections
                .iter()
                .any(|s| s.kind == SectionKind::Text && {
                    let end = s.address as u64 + s.size as u64;
                    (raw_entry as u64) >= s.address as u64 && (raw_entry as u64) < end
                });
            if zero_on_static || misaligned || !lands_in_code {
                #[cfg(feature = "logging")]
                log::warn!(
                    "SOM entry-point swap heuristic fired: exec_entry={:#x} exec_flags={:#x}",
                    raw_entry,
                    raw_flags
                );
                (Some(raw_flags as u64), Some(raw_entry))
            } else {
                (Some(raw_entry as u64), Some(raw_flags))
            }
        }
        None => {
            let subspace_index = header.entry_subspace.get(BE) as usize;
            let entry = sections
                .get(subspace_index)
                .map(|s| s.address as u64 + header.entry_offset.get(BE) as u64);
            (entry, None)
        }
    };

    Ok(Object {
        header,
        exec_aux,
        compilation_unit,
        sections,
        symbols,
        entry,
        exec_private_flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rejects_non_power_of_two() {
        assert!(exact_log2(3).is_err());
        assert_eq!(exact_log2(1).unwrap(), 0);
        assert_eq!(exact_log2(4096).unwrap(), 12);
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert!(parse(&[0u8; 4]).is_err());
    }
}
