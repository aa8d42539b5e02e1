//! The symbol classifier: the bidirectional mapping between a host-neutral
//! abstract symbol and SOM's packed symbol dictionary record.

use crate::som::{
    SymbolDictionaryRecord, SymbolFlagsView, SymbolInfoView, SymbolScope, SymbolType,
};

/// A host-neutral symbol kind, the abstract side of the classifier.
///
/// This plays the role the `object` crate's `SymbolKind` plays for ELF/Mach-O
/// back-ends: something a caller can reason about without knowing SOM's
/// sixteen raw record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Unknown,
    Null,
    /// Executable code: `ENTRY`, `PRI_PROG`, `SEC_PROG`, `MILLICODE`, `CODE`
    /// or `STUB` on the SOM side, disambiguated by [`ClassifiedSymbol::entry_kind`].
    Text,
    Data,
    /// Procedure label (function descriptor), SOM's `PLABEL`.
    Plabel,
    /// `STORAGE`: an uninitialized common-block allocation.
    Common,
    /// `SYM_EXT`/`ARG_EXT`: a continuation record, not a symbol of its own.
    Extension,
}

/// Which of SOM's several executable-symbol record types a [`SymbolKind::Text`]
/// symbol came from or should be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Entry,
    Millicode,
    PriProg,
    SecProg,
    Code,
    Stub,
}

/// A host-neutral visibility, the abstract side of SOM's four symbol scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Local,
    Global,
    /// Declared but not defined here (`SS_UNSAT`).
    Undefined,
    /// Defined here, visible to other modules, but not exported as the
    /// canonical definition if duplicated (`SS_EXTERNAL`).
    External,
}

/// A symbol as decoded from (or about to be written to) a symbol dictionary
/// record, independent of the string table (names are resolved/interned by
/// the caller — [`crate::read`] and [`crate::write`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSymbol {
    pub kind: SymbolKind,
    pub text_kind: Option<TextKind>,
    pub visibility: Visibility,
    pub value: u32,
    /// Subspace index this symbol is defined in, if applicable.
    pub section: Option<u32>,
    pub arg_reloc: u32,
    /// Argument-relocation info digit; must be `3` ("xleast=3") whenever
    /// `arg_reloc` is meaningful.
    pub xleast: u32,
    pub secondary_def: bool,
    pub is_common: bool,
    pub dup_common: bool,
    pub is_comdat: bool,
    /// The 2-bit privilege level carried in the low bits of `value` for
    /// function-like symbols.
    pub privilege: u32,
}

/// How a symbol's defining subspace is found while reading.
///
/// SOM encodes this two different ways, and *which* way applies depends on
/// both the object's magic and the individual symbol's type (spec.md §4.4):
/// only executable/dynamic objects ever scan by value, and even there only
/// for the four text-symbol kinds named in [`scans_by_value`] — every other
/// symbol (including `DATA`/`STORAGE` inside an executable) still carries
/// its subspace index directly in `symbol_info`.
pub struct SectionResolver<'a> {
    pub is_exec_or_dynamic: bool,
    /// `(start, length)` of each subspace in file order, indexed by
    /// subspace index, used only when this symbol's type scans by value.
    pub subspace_ranges: &'a [(u32, u32)],
}

/// True for the symbol types that resolve their section by scanning
/// subspaces for one containing the symbol's value (masked to clear the
/// privilege bits), rather than via `symbol_info`'s direct subspace index —
/// and then only inside an executable or dynamic object (spec.md §4.4).
fn scans_by_value(ty: SymbolType) -> bool {
    matches!(
        ty,
        SymbolType::Entry | SymbolType::PriProg | SymbolType::SecProg | SymbolType::Millicode
    )
}

const PRIVILEGE_MASK: u32 = 0x3;

/// Classify one on-disk symbol record into its abstract form.
///
/// Returns `None` for `SYM_EXT`/`ARG_EXT` continuation records, which carry
/// no symbol of their own and must be skipped by the caller.
pub fn classify_read(
    record: &SymbolDictionaryRecord,
    endian: crate::endian::BigEndian,
    resolver: &SectionResolver<'_>,
) -> crate::error::Result<Option<ClassifiedSymbol>> {
    use crate::error::Error;

    let flags = SymbolFlagsView::unpack(record.flags.get(endian));
    let info = SymbolInfoView::unpack(record.info.get(endian));
    let value = record.value.get(endian);

    let som_type = SymbolType::from_u32(flags.symbol_type)
        .ok_or_else(|| Error::bad_value("unknown SOM symbol type"))?;
    let scope = SymbolScope::from_u32(flags.scope)
        .ok_or_else(|| Error::bad_value("unknown SOM symbol scope"))?;

    if matches!(som_type, SymbolType::SymExt | SymbolType::ArgExt) {
        return Ok(None);
    }

    let (kind, text_kind) = match som_type {
        SymbolType::Unknown | SymbolType::Null => (SymbolKind::Null, None),
        SymbolType::Absolute | SymbolType::Data => (SymbolKind::Data, None),
        SymbolType::Entry => (SymbolKind::Text, Some(TextKind::Entry)),
        SymbolType::Millicode => (SymbolKind::Text, Some(TextKind::Millicode)),
        SymbolType::PriProg => (SymbolKind::Text, Some(TextKind::PriProg)),
        SymbolType::SecProg => (SymbolKind::Text, Some(TextKind::SecProg)),
        SymbolType::Code => (SymbolKind::Text, Some(TextKind::Code)),
        SymbolType::Stub => (SymbolKind::Text, Some(TextKind::Stub)),
        SymbolType::Plabel => (SymbolKind::Plabel, None),
        SymbolType::Storage => (SymbolKind::Common, None),
        SymbolType::SymExt | SymbolType::ArgExt => unreachable!(),
    };

    let visibility = match scope {
        SymbolScope::Local => Visibility::Local,
        SymbolScope::Universal => Visibility::Global,
        SymbolScope::Unsat => Visibility::Undefined,
        SymbolScope::External => Visibility::External,
    };

    let privilege = if som_type.is_function_like() {
        value & PRIVILEGE_MASK
    } else {
        0
    };
    let resolved_value = if som_type.is_function_like() {
        value & !PRIVILEGE_MASK
    } else {
        value
    };

    let section = if resolver.is_exec_or_dynamic && scans_by_value(som_type) {
        resolver
            .subspace_ranges
            .iter()
            .position(|&(start, length)| {
                resolved_value >= start && resolved_value < start.wrapping_add(length)
            })
            .map(|i| i as u32)
    } else {
        Some(info.symbol_info)
    };

    Ok(Some(ClassifiedSymbol {
        kind,
        text_kind,
        visibility,
        value: resolved_value,
        section,
        arg_reloc: flags.arg_reloc,
        xleast: flags.xleast,
        secondary_def: flags.secondary_def,
        is_common: flags.is_common,
        dup_common: flags.dup_common,
        is_comdat: info.is_comdat,
        privilege,
    }))
}

/// Derive the SOM type/scope and packed `flags`/`info` words for an
/// abstract symbol, the write-side inverse of [`classify_read`].
///
/// `name_offset` is the string table offset resolved by the caller; `value`
/// is the pre-privilege-bits value (the privilege bits are folded back in
/// here for function-like symbols).
pub fn classify_write(
    sym: &ClassifiedSymbol,
    name_offset: u32,
    endian: crate::endian::BigEndian,
) -> SymbolDictionaryRecord {
    use crate::endian::U32;

    let som_type = match (sym.kind, sym.text_kind) {
        (SymbolKind::Null, _) => SymbolType::Null,
        (SymbolKind::Data, _) => SymbolType::Data,
        (SymbolKind::Plabel, _) => SymbolType::Plabel,
        (SymbolKind::Common, _) => SymbolType::Storage,
        (SymbolKind::Extension, _) => SymbolType::SymExt,
        (SymbolKind::Text, Some(TextKind::Entry)) | (SymbolKind::Text, None) => SymbolType::Entry,
        (SymbolKind::Text, Some(TextKind::Millicode)) => SymbolType::Millicode,
        (SymbolKind::Text, Some(TextKind::PriProg)) => SymbolType::PriProg,
        (SymbolKind::Text, Some(TextKind::SecProg)) => SymbolType::SecProg,
        (SymbolKind::Text, Some(TextKind::Code)) => SymbolType::Code,
        (SymbolKind::Text, Some(TextKind::Stub)) => SymbolType::Stub,
        (SymbolKind::Unknown, _) => SymbolType::Unknown,
    };

    let scope = match sym.visibility {
        Visibility::Local => SymbolScope::Local,
        Visibility::Global => SymbolScope::Universal,
        Visibility::Undefined => SymbolScope::Unsat,
        Visibility::External => SymbolScope::External,
    };

    let flags = SymbolFlagsView {
        symbol_type: som_type as u32,
        scope: scope as u32,
        arg_reloc: sym.arg_reloc,
        xleast: if sym.arg_reloc != 0 { 3 } else { sym.xleast },
        secondary_def: sym.secondary_def,
        is_common: sym.is_common,
        dup_common: sym.dup_common,
    };

    let info = SymbolInfoView {
        symbol_info: sym.section.unwrap_or(0),
        is_comdat: sym.is_comdat,
    };

    let value = if som_type.is_function_like() {
        (sym.value & !PRIVILEGE_MASK) | (sym.privilege & PRIVILEGE_MASK)
    } else {
        sym.value
    };

    SymbolDictionaryRecord {
        name: U32::new(endian, name_offset),
        flags: U32::new(endian, flags.pack()),
        info: U32::new(endian, info.pack()),
        value: U32::new(endian, value),
    }
}

/// Sort symbols in descending order of how many relocations reference them,
/// as required before emission: symbols referenced by `R_DP_RELATIVE` or
/// `R_CODE_ONE_SYMBOL` count twice toward this ranking.
///
/// `counts` maps a symbol's index in `symbols` to its (possibly
/// double-weighted) relocation count; symbols not present count as zero.
/// The sort is stable, so symbols with equal counts keep their relative
/// order.
pub fn sort_by_relocation_count<T>(symbols: &mut [T], counts: &[u32]) {
    let n = symbols.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(counts.get(i).copied().unwrap_or(0)));
    // `order[new_pos] = original_index`; invert it to a destination map so
    // the in-place cycle walk below (which needs "where does the element
    // at i end up") lands everything correctly without a `Clone` bound.
    let mut dest = vec![0usize; n];
    for (new_pos, &orig) in order.iter().enumerate() {
        dest[orig] = new_pos;
    }
    for i in 0..n {
        while dest[i] != i {
            let j = dest[i];
            symbols.swap(i, j);
            dest.swap(i, j);
        }
    }
}

/// Count, for each symbol index, how many relocations reference it, with
/// `R_DP_RELATIVE`/`R_CODE_ONE_SYMBOL` references weighted double.
pub fn weighted_relocation_counts(
    relocations: &[crate::reloc::Relocation],
    symbol_count: usize,
) -> Vec<u32> {
    use crate::reloc::RelocType;
    let mut counts = vec![0u32; symbol_count];
    for r in relocations {
        let Some(symbol) = r.symbol else { continue };
        let Some(slot) = counts.get_mut(symbol as usize) else {
            continue;
        };
        let weight = match r.kind {
            RelocType::DpRelative | RelocType::CodeOneSymbol => 2,
            _ => 1,
        };
        *slot += weight;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::BigEndian as BE;

    const DIRECT: SectionResolver<'static> = SectionResolver {
        is_exec_or_dynamic: false,
        subspace_ranges: &[],
    };

    fn sample(kind: SymbolKind, visibility: Visibility) -> ClassifiedSymbol {
        ClassifiedSymbol {
            kind,
            text_kind: None,
            visibility,
            value: 0x1000,
            section: Some(2),
            arg_reloc: 0,
            xleast: 0,
            secondary_def: false,
            is_common: false,
            dup_common: false,
            is_comdat: false,
            privilege: 0,
        }
    }

    #[test]
    fn data_symbol_round_trips() {
        let sym = sample(SymbolKind::Data, Visibility::Global);
        let record = classify_write(&sym, 40, BE);
        let resolved = classify_read(&record, BE, &DIRECT)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.kind, SymbolKind::Data);
        assert_eq!(resolved.visibility, Visibility::Global);
        assert_eq!(resolved.section, Some(2));
        assert_eq!(resolved.value, 0x1000);
    }

    #[test]
    fn function_privilege_bits_round_trip() {
        let mut sym = sample(SymbolKind::Text, Visibility::Local);
        sym.text_kind = Some(TextKind::Entry);
        sym.privilege = 3;
        let record = classify_write(&sym, 0, BE);
        let resolved = classify_read(&record, BE, &DIRECT)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.privilege, 3);
        assert_eq!(resolved.value, 0x1000);
        assert_eq!(resolved.text_kind, Some(TextKind::Entry));
    }

    #[test]
    fn scan_by_value_resolves_containing_subspace() {
        // Only ENTRY/PRI_PROG/SEC_PROG/MILLICODE scan by value, and only
        // inside an executable/dynamic object (spec.md §4.4).
        let subspaces = [(0u32, 0x100u32), (0x100, 0x100)];
        let mut sym = sample(SymbolKind::Text, Visibility::Global);
        sym.text_kind = Some(TextKind::Entry);
        sym.value = 0x150;
        let record = classify_write(&sym, 0, BE);
        let resolver = SectionResolver {
            is_exec_or_dynamic: true,
            subspace_ranges: &subspaces,
        };
        let resolved = classify_read(&record, BE, &resolver).unwrap().unwrap();
        assert_eq!(resolved.section, Some(1));
    }

    #[test]
    fn data_symbol_in_exec_object_still_resolves_via_symbol_info() {
        // A DATA symbol's section must come from `symbol_info` even inside
        // an executable/dynamic object — scan-by-value is reserved for the
        // four text-symbol kinds, so a subspace layout that would scan to
        // the wrong place must not affect it.
        let subspaces = [(0u32, 0x10u32)]; // doesn't contain `value` at all
        let sym = sample(SymbolKind::Data, Visibility::Global);
        let record = classify_write(&sym, 0, BE);
        let resolver = SectionResolver {
            is_exec_or_dynamic: true,
            subspace_ranges: &subspaces,
        };
        let resolved = classify_read(&record, BE, &resolver).unwrap().unwrap();
        assert_eq!(resolved.section, Some(2));
    }

    #[test]
    fn code_text_kind_does_not_scan_by_value() {
        // CODE is a text symbol but not one of the four scan-by-value
        // kinds; it must still resolve via `symbol_info`.
        let subspaces = [(0u32, 0x100u32), (0x100, 0x100)];
        let mut sym = sample(SymbolKind::Text, Visibility::Global);
        sym.text_kind = Some(TextKind::Code);
        sym.value = 0x150;
        let record = classify_write(&sym, 0, BE);
        let resolver = SectionResolver {
            is_exec_or_dynamic: true,
            subspace_ranges: &subspaces,
        };
        let resolved = classify_read(&record, BE, &resolver).unwrap().unwrap();
        assert_eq!(resolved.section, Some(2));
    }

    #[test]
    fn continuation_records_are_skipped() {
        let sym = ClassifiedSymbol {
            kind: SymbolKind::Extension,
            ..sample(SymbolKind::Extension, Visibility::Local)
        };
        let record = classify_write(&sym, 0, BE);
        assert!(classify_read(&record, BE, &DIRECT)
            .unwrap()
            .is_none());
    }

    #[test]
    fn descending_relocation_count_sort() {
        let mut symbols = vec!["a", "b", "c"];
        let counts = vec![1, 5, 2];
        sort_by_relocation_count(&mut symbols, &counts);
        assert_eq!(symbols, vec!["b", "c", "a"]);
    }
}
