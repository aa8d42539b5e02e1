use som::read::SectionKind;
use som::reloc::{RelocQueue, RelocType, Relocation};
use som::symbol::{ClassifiedSymbol, SymbolKind, Visibility};
use som::write::{Object, SectionBuilder, SymbolBuilder};
use som::{pod, read, som as fmt};

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

/// A relocatable object with a single text subspace and one exported data
/// symbol round-trips through write then read unchanged.
#[test]
fn minimal_relocatable_object_round_trips() {
    let mut obj = Object::new(fmt::RELOC_MAGIC);
    let text = obj.add_section(SectionBuilder {
        name: "$CODE$".to_string(),
        kind: SectionKind::Text,
        data: vec![0x08, 0x00, 0x02, 0x40],
        size: 4,
        ..Default::default()
    });
    obj.add_symbol(sample_symbol("_start", text));

    let bytes = obj.write().unwrap();
    let parsed = read::parse(&bytes).unwrap();
    assert_eq!(parsed.sections.len(), 1);
    assert_eq!(parsed.sections[0].name, "$CODE$");
    assert_eq!(parsed.sections[0].kind, SectionKind::Text);
    assert_eq!(parsed.symbols.len(), 1);
    assert_eq!(parsed.symbols[0].name, "_start");
}

/// A data subspace with several widely-spaced relocations compresses its
/// fixup stream with skip opcodes and still round-trips to the same
/// relocation list.
#[test]
fn data_section_with_gapped_relocations_round_trips() {
    let relocations = vec![
        Relocation {
            address: 0,
            kind: RelocType::DataOneSymbol,
            symbol: Some(0),
            addend: 0,
        },
        Relocation {
            address: 8,
            kind: RelocType::DataOneSymbol,
            symbol: Some(0),
            addend: 0,
        },
        Relocation {
            address: 16,
            kind: RelocType::DataOneSymbol,
            symbol: Some(0),
            addend: 0,
        },
    ];

    let mut obj = Object::new(fmt::RELOC_MAGIC);
    let data = obj.add_section(SectionBuilder {
        name: "$DATA$".to_string(),
        kind: SectionKind::Data,
        data: vec![0u8; 20],
        size: 20,
        relocations,
        ..Default::default()
    });
    obj.add_symbol(sample_symbol("g", data));

    let bytes = obj.write().unwrap();
    let parsed = read::parse(&bytes).unwrap();
    assert_eq!(parsed.sections[0].relocations.len(), 3);
    assert_eq!(parsed.sections[0].relocations[1].address, 8);
    assert_eq!(parsed.sections[0].relocations[2].address, 16);
}

/// Two identical multi-byte fixups in a row collapse to a queue reuse
/// (`R_PREV_FIXUP`) opcode but still decode back to two equal relocations.
#[test]
fn repeated_fixup_reuses_the_queue() {
    let relocations = vec![
        Relocation {
            address: 0,
            kind: RelocType::DataOneSymbol,
            symbol: Some(1000),
            addend: 7,
        },
        Relocation {
            address: 4,
            kind: RelocType::DataOneSymbol,
            symbol: Some(1000),
            addend: 7,
        },
    ];
    let mut wqueue = RelocQueue::new();
    let bytes = som::reloc::write::write_relocations(&relocations, &mut wqueue).unwrap();
    // shorter than two independent encodings of a 1000/7 fixup would be.
    assert!(bytes.len() < 16);
    let mut rqueue = RelocQueue::new();
    let decoded = som::reloc::read::parse_relocations(&bytes, &[], &mut rqueue).unwrap();
    assert_eq!(decoded, relocations);
}

/// A gap larger than the largest single skip opcode can express splits into
/// a maximal skip plus a remainder and still round-trips.
#[test]
fn oversized_gap_splits_and_round_trips() {
    let relocations = vec![
        Relocation {
            address: 0,
            kind: RelocType::DataOneSymbol,
            symbol: Some(1),
            addend: 0,
        },
        Relocation {
            address: 0x0180_0000,
            kind: RelocType::DataOneSymbol,
            symbol: Some(2),
            addend: 0,
        },
    ];
    let mut wqueue = RelocQueue::new();
    let bytes = som::reloc::write::write_relocations(&relocations, &mut wqueue).unwrap();
    // Both relocations have a zero addend, so the reader falls back to
    // reading the addend out of the section's own content; stand in a
    // zero-filled buffer large enough to cover the second relocation's word.
    let section = vec![0u8; 0x0180_0000 + 4];
    let mut rqueue = RelocQueue::new();
    let decoded = som::reloc::read::parse_relocations(&bytes, &section, &mut rqueue).unwrap();
    assert_eq!(decoded, relocations);
}

/// When a tool has swapped `exec_entry` and `exec_flags` on write (a known
/// SOM quirk), the loader detects it from context and recovers the real
/// entry address instead of trusting the swapped word.
#[test]
fn entry_point_swap_is_detected_and_recovered() {
    let mut obj = Object::new(fmt::EXEC_MAGIC);
    let text = obj.add_section(SectionBuilder {
        name: "$CODE$".to_string(),
        kind: SectionKind::Text,
        data: vec![0x08, 0x00, 0x02, 0x40],
        size: 4,
        ..Default::default()
    });
    obj.set_entry(text, 0);
    let mut bytes = obj.write().unwrap();

    let (header, _): (&fmt::Header, _) = pod::from_bytes(&bytes).unwrap();
    let aux_loc = header.aux_header_location.get(som::endian::BigEndian) as usize;

    // Swap the on-disk exec_entry/exec_flags words: a nonzero "flags" value
    // standing in as the real start address, with the real entry recorded
    // where flags would otherwise be.
    let entry_off = aux_loc + std::mem::size_of::<fmt::AuxId>() + 7 * 4;
    let flags_off = entry_off + 4;
    let real_entry: [u8; 4] = bytes[entry_off..entry_off + 4].try_into().unwrap();
    let swapped_flags: [u8; 4] = 0x1234_5678u32.to_be_bytes();
    bytes[entry_off..entry_off + 4].copy_from_slice(&swapped_flags);
    bytes[flags_off..flags_off + 4].copy_from_slice(&real_entry);

    // Recompute the header checksum over the mutated bytes.
    let (header, _): (&fmt::Header, _) = pod::from_bytes(&bytes).unwrap();
    let checksum = fmt::header_checksum(header);
    let checksum_off = {
        let base = bytes.as_ptr() as usize;
        let field = &header.checksum as *const som::endian::U32<som::endian::BigEndian> as usize;
        field - base
    };
    bytes[checksum_off..checksum_off + 4].copy_from_slice(&checksum.to_be_bytes());

    let parsed = read::parse(&bytes).unwrap();
    // The heuristic should have recovered the real entry address (0 within
    // $CODE$, whose start address is 0) rather than trusting the swapped
    // 0x12345678 "entry".
    assert_eq!(parsed.entry, Some(0));
    assert_eq!(parsed.exec_private_flags, Some(0x1234_5678));
}
