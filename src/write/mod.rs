//! The two-pass object writer: the inverse of [`crate::read::parse`].
//!
//! Mirrors the shape of the `object` crate's generic `write::Object`
//! builder: callers add sections, symbols and relocations without knowing
//! SOM's on-disk layout, then [`Object::write`] lays everything out and
//! returns the finished bytes in one pass over a pre-sized buffer.

use std::mem::size_of;

use indexmap::IndexMap;

use crate::endian::BigEndian as BE;
use crate::endian::U32;
use crate::error::{Error, Result};
use crate::pod::{bytes_of, bytes_of_slice};
use crate::read::SectionKind;
use crate::reloc::{self, Relocation};
use crate::som::*;
use crate::symbol::{self, ClassifiedSymbol};

const PAGE_SIZE: u32 = 0x1000;

fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// A section being built, added via [`Object::add_section`].
///
/// The space-level attributes (`defined`, `private`, `sort_key`,
/// `space_number`) and subspace-level attributes (`access_control_bits`,
/// `quadrant`, `is_common`, `dup_common`) default to the values a plain
/// relocatable section needs; [`SectionBuilder::set_som_attributes`] and
/// [`SectionBuilder::set_som_subsection_attributes`] are the host attachment
/// entry points named in spec.md §6
/// (`bfd_som_set_section_attributes`/`bfd_som_set_subsection_attributes`)
/// for callers that need to override them.
#[derive(Debug, Clone)]
pub struct SectionBuilder {
    pub name: String,
    pub kind: SectionKind,
    pub alignment: u32,
    pub loadable: bool,
    pub comdat: bool,
    /// Initialized content. May be shorter than `size` (the remainder is an
    /// uninitialized tail, as with `.bss`).
    pub data: Vec<u8>,
    pub size: u32,
    pub relocations: Vec<Relocation>,
    pub defined: bool,
    pub private: bool,
    pub sort_key: u8,
    pub space_number: Option<u32>,
    pub access_control_bits: Option<u8>,
    pub quadrant: u8,
    pub is_common: bool,
    pub dup_common: bool,
}

impl SectionBuilder {
    /// Space-level attachment entry point (`bfd_som_set_section_attributes`,
    /// spec.md §6).
    pub fn set_som_attributes(&mut self, defined: bool, private: bool, sort_key: u8, space_number: u32) {
        self.defined = defined;
        self.private = private;
        self.sort_key = sort_key;
        self.space_number = Some(space_number);
    }

    /// Subspace-level attachment entry point
    /// (`bfd_som_set_subsection_attributes`, spec.md §6).
    pub fn set_som_subsection_attributes(
        &mut self,
        access_control_bits: u8,
        sort_key: u8,
        quadrant: u8,
        comdat: bool,
        common: bool,
        dup_common: bool,
    ) {
        self.access_control_bits = Some(access_control_bits);
        self.sort_key = sort_key;
        self.quadrant = quadrant;
        self.comdat = comdat;
        self.is_common = common;
        self.dup_common = dup_common;
    }
}

impl Default for SectionBuilder {
    fn default() -> Self {
        SectionBuilder {
            name: String::new(),
            kind: SectionKind::Data,
            alignment: 4,
            loadable: true,
            comdat: false,
            data: Vec::new(),
            size: 0,
            relocations: Vec::new(),
            defined: true,
            private: false,
            sort_key: 0,
            space_number: None,
            access_control_bits: None,
            quadrant: 0,
            is_common: false,
            dup_common: false,
        }
    }
}

/// A symbol being built, added via [`Object::add_symbol`].
#[derive(Debug, Clone)]
pub struct SymbolBuilder {
    pub name: String,
    pub classified: ClassifiedSymbol,
}

impl SymbolBuilder {
    /// Symbol-type attachment entry point (`bfd_som_set_symbol_type`,
    /// spec.md §6).
    pub fn set_som_type(&mut self, kind: crate::symbol::SymbolKind, text_kind: Option<crate::symbol::TextKind>) {
        self.classified.kind = kind;
        self.classified.text_kind = text_kind;
    }
}

/// A string table that deduplicates entries by interning them in an
/// [`IndexMap`], the same collection the teacher's write-side code leans on
/// for section/symbol maps.
struct StringTable {
    offsets: IndexMap<String, u32>,
    next: u32,
}

impl StringTable {
    fn new() -> Self {
        // Offset 0 is reserved for "no name" (an empty string), matching
        // SOM's convention that a zero name offset means an absent name.
        let mut offsets = IndexMap::new();
        offsets.insert(String::new(), 0);
        StringTable { offsets, next: 1 }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let offset = self.next;
        self.next += s.len() as u32 + 1;
        self.offsets.insert(s.to_string(), offset);
        offset
    }

    fn finish(self) -> Vec<u8> {
        let mut entries: Vec<(String, u32)> = self.offsets.into_iter().collect();
        entries.sort_by_key(|&(_, offset)| offset);
        let mut bytes = Vec::new();
        for (s, offset) in entries {
            debug_assert_eq!(offset as usize, bytes.len());
            bytes.extend_from_slice(s.as_bytes());
            bytes.push(0);
        }
        bytes
    }
}

/// The object builder. Construct with [`Object::new`], populate with
/// `add_*`, then call [`Object::write`].
pub struct Object {
    magic: u32,
    sections: Vec<SectionBuilder>,
    symbols: Vec<SymbolBuilder>,
    compilation_unit: Option<(String, String, String, String)>,
    entry: Option<(usize, u32)>,
    aux_chain: Vec<(AuxHeaderKind, String)>,
}

impl Object {
    /// Start a new object with the given `a_magic`.
    pub fn new(magic: u32) -> Self {
        Object {
            magic,
            sections: Vec::new(),
            symbols: Vec::new(),
            compilation_unit: None,
            entry: None,
            aux_chain: Vec::new(),
        }
    }

    /// Add a section (space + single subspace), returning its index for use
    /// with [`Object::add_symbol`]/[`Object::set_entry`].
    pub fn add_section(&mut self, section: SectionBuilder) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }

    /// Add a symbol, resolved against a section index already added via
    /// [`Object::add_section`].
    pub fn add_symbol(&mut self, symbol: SymbolBuilder) -> usize {
        self.symbols.push(symbol);
        self.symbols.len() - 1
    }

    /// Record the module's `CompilationUnit` strings (name, language,
    /// product id, version id).
    pub fn set_compilation_unit(&mut self, name: &str, language: &str, product: &str, version: &str) {
        self.compilation_unit = Some((
            name.to_string(),
            language.to_string(),
            product.to_string(),
            version.to_string(),
        ));
    }

    /// Host attachment entry point for a compilation unit record, an alias
    /// for [`Object::set_compilation_unit`] under the name the attaching
    /// host calls it by.
    pub fn attach_som_compilation_unit(&mut self, name: &str, language: &str, product: &str, version: &str) {
        self.set_compilation_unit(name, language, product, version);
    }

    /// Attach a VERSION or COPYRIGHT string auxiliary header. Later calls
    /// for the same [`AuxHeaderKind`] replace the earlier one; an object
    /// may carry both kinds at once, each written as its own chained aux
    /// header record ahead of the exec aux header.
    pub fn attach_som_aux_header(&mut self, kind: AuxHeaderKind, string: &str) {
        self.aux_chain.retain(|&(k, _)| k != kind);
        self.aux_chain.push((kind, string.to_string()));
    }

    /// Record the entry point as a `(section_index, offset)` pair.
    pub fn set_entry(&mut self, section: usize, offset: u32) {
        self.entry = Some((section, offset));
    }

    /// Lay out and serialize the whole object.
    pub fn write(&self) -> Result<Vec<u8>> {
        #[cfg(feature = "logging")]
        log::debug!(
            "writing SOM object: {} sections, {} symbols",
            self.sections.len(),
            self.symbols.len()
        );

        let is_exec = crate::som::magic_is_exec_or_dynamic(self.magic);

        let mut space_strings = StringTable::new();
        let section_name_offsets: Vec<u32> = self
            .sections
            .iter()
            .map(|s| space_strings.intern(&s.name))
            .collect();
        let compilation_unit_offsets = self
            .compilation_unit
            .as_ref()
            .map(|(name, language, product, version)| {
                (
                    space_strings.intern(name),
                    space_strings.intern(language),
                    space_strings.intern(product),
                    space_strings.intern(version),
                )
            });

        // Symbols are emitted in descending order of (weighted) relocation
        // reference count (spec.md §4.4), so every relocation that names a
        // symbol must have its index remapped to match.
        let all_relocations: Vec<Relocation> = self
            .sections
            .iter()
            .flat_map(|s| s.relocations.iter().cloned())
            .collect();
        let counts = symbol::weighted_relocation_counts(&all_relocations, self.symbols.len());
        let mut indexed: Vec<(usize, &SymbolBuilder)> = self.symbols.iter().enumerate().collect();
        symbol::sort_by_relocation_count(&mut indexed, &counts);
        let mut old_to_new = vec![0u32; self.symbols.len()];
        for (new_pos, &(orig_idx, _)) in indexed.iter().enumerate() {
            old_to_new[orig_idx] = new_pos as u32;
        }
        let symbols: Vec<&SymbolBuilder> = indexed.into_iter().map(|(_, s)| s).collect();

        let mut symbol_strings = StringTable::new();
        let symbol_name_offsets: Vec<u32> = symbols
            .iter()
            .map(|s| symbol_strings.intern(&s.name))
            .collect();

        // Fixup streams: one per section, concatenated into a single blob.
        let mut fixup_blob = Vec::new();
        let mut fixup_ranges = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let mut sorted = section.relocations.clone();
            sorted.sort_by_key(|r| r.address);
            for r in &mut sorted {
                if let Some(s) = r.symbol {
                    r.symbol = Some(old_to_new[s as usize]);
                }
            }
            let mut queue = reloc::RelocQueue::new();
            let bytes = reloc::write::write_relocations(&sorted, &mut queue)?;
            let index = fixup_blob.len() as u32;
            let quantity = bytes.len() as u32;
            fixup_blob.extend_from_slice(&bytes);
            fixup_ranges.push((index, quantity));
        }

        // Section content, loadable sections first, each aligned to its
        // declared alignment (minimum 4 bytes).
        let mut content = Vec::new();
        let mut content_offsets = vec![0u32; self.sections.len()];
        let mut order: Vec<usize> = (0..self.sections.len()).collect();
        order.sort_by_key(|&i| !self.sections[i].loadable);
        for i in order {
            let section = &self.sections[i];
            if section.data.is_empty() {
                continue;
            }
            let align = section.alignment.max(4);
            let pad = align_up(content.len() as u32, align) - content.len() as u32;
            content.resize(content.len() + pad as usize, 0);
            content_offsets[i] = content.len() as u32;
            content.extend_from_slice(&section.data);
        }

        let space_strings_bytes = {
            let mut t = StringTable::new();
            std::mem::swap(&mut t, &mut space_strings);
            t.finish()
        };
        let symbol_strings_bytes = {
            let mut t = StringTable::new();
            std::mem::swap(&mut t, &mut symbol_strings);
            t.finish()
        };

        // Chained string auxiliary headers (version/copyright) precede the
        // exec aux header; each is an AuxId plus its NUL-padded string,
        // rounded up to a 4-byte boundary.
        let mut string_aux_bytes = Vec::new();
        for (kind, text) in &self.aux_chain {
            let mut payload = text.as_bytes().to_vec();
            payload.push(0);
            while payload.len() % 4 != 0 {
                payload.push(0);
            }
            let id = AuxId {
                flags_and_type: U32::new(
                    BE,
                    crate::som::AuxIdFlags {
                        mandatory: false,
                        copy: false,
                        append: false,
                        ignore: false,
                        aux_type: kind.aux_type(),
                    }
                    .pack(),
                ),
                length: U32::new(BE, payload.len() as u32),
            };
            string_aux_bytes.extend_from_slice(bytes_of(&id));
            string_aux_bytes.extend_from_slice(&payload);
        }

        let header_size = size_of::<Header>() as u32;
        let space_dict_size = (self.sections.len() * size_of::<SpaceDictionaryRecord>()) as u32;
        let subspace_dict_size =
            (self.sections.len() * size_of::<SubspaceDictionaryRecord>()) as u32;
        let exec_aux_size = if is_exec {
            size_of::<ExecAuxHeader>() as u32
        } else {
            0
        };
        let aux_size = string_aux_bytes.len() as u32 + exec_aux_size;
        let compiler_size = if self.compilation_unit.is_some() {
            size_of::<CompilationUnit>() as u32
        } else {
            0
        };
        let symbol_dict_size = (self.symbols.len() * size_of::<SymbolDictionaryRecord>()) as u32;

        let off_space = header_size;
        let off_subspace = off_space + space_dict_size;
        let off_aux = off_subspace + subspace_dict_size;
        let off_compiler = off_aux + aux_size;
        let off_symbols = off_compiler + compiler_size;
        let off_fixup = off_symbols + symbol_dict_size;
        let off_space_strings = off_fixup + fixup_blob.len() as u32;
        let off_symbol_strings = off_space_strings + space_strings_bytes.len() as u32;
        let off_content = align_up(
            off_symbol_strings + symbol_strings_bytes.len() as u32,
            PAGE_SIZE,
        );

        let mut running_address = 0u32;
        let mut space_records = Vec::with_capacity(self.sections.len());
        let mut subspace_records = Vec::with_capacity(self.sections.len());
        for (i, section) in self.sections.iter().enumerate() {
            let flags = SpaceFlags {
                is_loadable: section.loadable,
                is_defined: section.defined,
                is_private: section.private,
                has_intermediate_code: false,
                is_tspecific: false,
                sort_key: section.sort_key,
            };
            space_records.push(SpaceDictionaryRecord {
                name: U32::new(BE, section_name_offsets[i]),
                flags: U32::new(BE, flags.pack()),
                space_number: U32::new(BE, section.space_number.unwrap_or(i as u32)),
                subspace_index: U32::new(BE, i as u32),
                subspace_quantity: U32::new(BE, 1),
                loader_fix_index: U32::new(BE, 0),
                loader_fix_quantity: U32::new(BE, 0),
                init_pointer_index: U32::new(BE, 0),
                init_pointer_quantity: U32::new(BE, 0),
            });

            let sub_flags = SubspaceFlags {
                access_control_bits: section
                    .access_control_bits
                    .unwrap_or(if section.kind == SectionKind::Text { 0x4 } else { 0x0 }),
                memory_resident: false,
                dup_common: section.dup_common,
                is_common: section.is_common,
                is_loadable: section.loadable,
                quadrant: section.quadrant,
                initially_frozen: false,
                is_first: i == 0,
                code_only: section.kind == SectionKind::Text,
                sort_key: section.sort_key,
                replicate_init: false,
                continuation: false,
                is_tspecific: false,
                is_comdat: section.comdat,
            };
            let align_exp = section.alignment.max(1).trailing_zeros();
            let start = running_address;
            running_address = running_address
                .checked_add(section.size)
                .ok_or_else(|| Error::file_too_big())?;

            let file_loc = if section.data.is_empty() {
                0
            } else {
                off_content + content_offsets[i]
            };

            let (fixup_index, fixup_quantity) = fixup_ranges[i];
            subspace_records.push(SubspaceDictionaryRecord {
                space_index: U32::new(BE, i as u32),
                flags: U32::new(BE, sub_flags.pack()),
                file_loc_init_value: U32::new(BE, file_loc),
                initialization_length: U32::new(BE, section.data.len() as u32),
                subspace_start: U32::new(BE, start),
                subspace_length: U32::new(BE, section.size),
                alignment: U32::new(BE, 1u32 << align_exp),
                name: U32::new(BE, section_name_offsets[i]),
                fixup_request_index: U32::new(BE, fixup_index),
                fixup_request_quantity: U32::new(BE, fixup_quantity),
            });
        }

        let symbol_records: Vec<SymbolDictionaryRecord> = symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| symbol::classify_write(&sym.classified, symbol_name_offsets[i], BE))
            .collect();

        // `(tfile, tsize, dfile, dsize)` of the exec aux header, captured so
        // the file-range overflow check below (spec.md §4.6) can run once
        // `som_length` is known, further down.
        let mut exec_file_ranges: Option<(u32, u32, u32, u32)> = None;

        let aux_bytes = if is_exec {
            let tsize: u32 = self
                .sections
                .iter()
                .filter(|s| s.kind == SectionKind::Text)
                .map(|s| s.size)
                .sum();
            let dsize: u32 = self
                .sections
                .iter()
                .filter(|s| s.kind != SectionKind::Text && !s.data.is_empty())
                .map(|s| s.data.len() as u32)
                .sum();
            let bsize: u32 = self
                .sections
                .iter()
                .filter(|s| s.kind != SectionKind::Text)
                .map(|s| s.size.saturating_sub(s.data.len() as u32))
                .sum();
            // `exec_dsize` is rounded up to a full page and `exec_bsize` is
            // reduced by the padding that rounding added, since that
            // padding no longer needs to come out of the zero-filled bss
            // region (spec.md §4.6).
            let dsize_aligned = align_up(dsize, PAGE_SIZE);
            let bsize_adjusted = bsize.saturating_sub(dsize_aligned - dsize);
            exec_file_ranges = Some((tsize, tsize, dsize, dsize_aligned));
            let (entry_section, entry_offset) = self.entry.unwrap_or((0, 0));
            let entry_addr = self
                .sections
                .get(entry_section)
                .map(|_| {
                    subspace_records[entry_section].subspace_start.get(BE) + entry_offset
                })
                .unwrap_or(0);
            let aux = ExecAuxHeader {
                header: AuxId {
                    flags_and_type: U32::new(
                        BE,
                        crate::som::AuxIdFlags {
                            mandatory: true,
                            copy: false,
                            append: false,
                            ignore: false,
                            aux_type: EXEC_AUX_ID,
                        }
                        .pack(),
                    ),
                    length: U32::new(BE, (size_of::<ExecAuxHeader>() - size_of::<AuxId>()) as u32),
                },
                exec_tsize: U32::new(BE, tsize),
                exec_tmem: U32::new(BE, tsize),
                exec_tfile: U32::new(BE, tsize),
                exec_dsize: U32::new(BE, dsize_aligned),
                exec_dmem: U32::new(BE, dsize_aligned + bsize_adjusted),
                exec_dfile: U32::new(BE, dsize),
                exec_bsize: U32::new(BE, bsize_adjusted),
                exec_entry: U32::new(BE, entry_addr),
                exec_flags: U32::new(BE, 0),
                exec_bfill: U32::new(BE, 0),
            };
            bytes_of(&aux).to_vec()
        } else {
            Vec::new()
        };

        let compiler_bytes = if let Some((name, language, product, version)) =
            compilation_unit_offsets
        {
            let unit = CompilationUnit {
                name: U32::new(BE, name),
                language_name: U32::new(BE, language),
                product_id: U32::new(BE, product),
                version_id: U32::new(BE, version),
                reserved: U32::new(BE, 0),
                time: SysClock {
                    secs: U32::new(BE, 0),
                    nanosecs: U32::new(BE, 0),
                },
            };
            bytes_of(&unit).to_vec()
        } else {
            Vec::new()
        };

        let som_length = off_content
            .checked_add(content.len() as u32)
            .ok_or_else(Error::file_too_big)?;

        if let Some((tfile, tsize, dfile, dsize)) = exec_file_ranges {
            let text_end = tfile
                .checked_add(tsize)
                .ok_or_else(Error::file_too_big)?;
            if text_end > som_length {
                return Err(Error::bad_value(
                    "exec_tfile + exec_tsize exceeds som_length",
                ));
            }
            let data_end = dfile
                .checked_add(dsize)
                .ok_or_else(Error::file_too_big)?;
            if data_end > som_length {
                return Err(Error::bad_value(
                    "exec_dfile + exec_dsize exceeds som_length",
                ));
            }
        }

        let mut header = Header {
            system_id: U32::new(BE, CPU_PA_RISC1_1),
            a_magic: U32::new(BE, self.magic),
            version_id: U32::new(BE, NEW_VERSION_ID),
            file_time: SysClock {
                secs: U32::new(BE, 0),
                nanosecs: U32::new(BE, 0),
            },
            entry_space: U32::new(BE, 0),
            entry_subspace: U32::new(BE, self.entry.map(|(s, _)| s as u32).unwrap_or(0)),
            entry_offset: U32::new(BE, self.entry.map(|(_, o)| o).unwrap_or(0)),
            aux_header_location: U32::new(BE, off_aux),
            aux_header_size: U32::new(BE, aux_size),
            som_length: U32::new(BE, som_length),
            presumed_dp: U32::new(BE, 0),
            space_location: U32::new(BE, off_space),
            space_total: U32::new(BE, self.sections.len() as u32),
            subspace_location: U32::new(BE, off_subspace),
            subspace_total: U32::new(BE, self.sections.len() as u32),
            loader_fixup_location: U32::new(BE, 0),
            loader_fixup_total: U32::new(BE, 0),
            space_strings_location: U32::new(BE, off_space_strings),
            space_strings_size: U32::new(BE, space_strings_bytes.len() as u32),
            init_array_location: U32::new(BE, 0),
            init_array_total: U32::new(BE, 0),
            compiler_location: U32::new(BE, off_compiler),
            compiler_total: U32::new(BE, if compiler_bytes.is_empty() { 0 } else { 1 }),
            symbol_location: U32::new(BE, off_symbols),
            symbol_total: U32::new(BE, self.symbols.len() as u32),
            fixup_request_location: U32::new(BE, off_fixup),
            fixup_request_total: U32::new(BE, fixup_blob.len() as u32),
            symbol_strings_location: U32::new(BE, off_symbol_strings),
            symbol_strings_size: U32::new(BE, symbol_strings_bytes.len() as u32),
            unloadable_sp_location: U32::new(BE, 0),
            unloadable_sp_size: U32::new(BE, 0),
            checksum: U32::new(BE, 0),
        };
        header.checksum = U32::new(BE, crate::som::header_checksum(&header));

        let mut out = Vec::with_capacity(som_length as usize);
        out.extend_from_slice(bytes_of(&header));
        out.extend_from_slice(bytes_of_slice(&space_records));
        out.extend_from_slice(bytes_of_slice(&subspace_records));
        out.extend_from_slice(&string_aux_bytes);
        out.extend_from_slice(&aux_bytes);
        out.extend_from_slice(&compiler_bytes);
        out.extend_from_slice(bytes_of_slice(&symbol_records));
        out.extend_from_slice(&fixup_blob);
        out.extend_from_slice(&space_strings_bytes);
        out.extend_from_slice(&symbol_strings_bytes);
        out.resize(off_content as usize, 0);
        out.extend_from_slice(&content);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SymbolKind, Visibility};

    fn sample_symbol(name: &str, section: usize) -> SymbolBuilder {
        SymbolBuilder {
            name: name.to_string(),
            classified: ClassifiedSymbol {
                kind: SymbolKind::Data,
                text_kind: None,
                visibility: Visibility::Global,
                value: 0,
                section: Some(section as u32),
                arg_reloc: 0,
                xleast: 0,
                secondary_def: false,
                is_common: false,
                dup_common: false,
                is_comdat: false,
                privilege: 0,
            },
        }
    }

    #[test]
    fn minimal_relocatable_object_writes_and_parses() {
        let mut obj = Object::new(RELOC_MAGIC);
        let text = obj.add_section(SectionBuilder {
            name: "$CODE$".to_string(),
            kind: SectionKind::Text,
            data: vec![0x08, 0x00, 0x02, 0x40], // arbitrary PA-RISC nop-ish bytes
            size: 4,
            ..Default::default()
        });
        obj.add_symbol(sample_symbol("_start", text));

        let bytes = obj.write().unwrap();
        let parsed = crate::read::parse(&bytes).unwrap();
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].name, "$CODE$");
        assert_eq!(parsed.symbols.len(), 1);
        assert_eq!(parsed.symbols[0].name, "_start");
    }

    #[test]
    fn string_table_dedups_repeated_names() {
        let mut t = StringTable::new();
        let a = t.intern("foo");
        let b = t.intern("bar");
        let c = t.intern("foo");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}
