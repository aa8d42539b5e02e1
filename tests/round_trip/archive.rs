use som::archive::{self, ArchiveMember, ExportedSymbol};
use som::read::SectionKind;
use som::som as fmt;
use som::symbol::{ClassifiedSymbol, SymbolKind, Visibility};
use som::write::{self, SectionBuilder, SymbolBuilder};

fn minimal_module(code: u8) -> Vec<u8> {
    let mut obj = write::Object::new(fmt::RELOC_MAGIC);
    let text = obj.add_section(SectionBuilder {
        name: "$CODE$".to_string(),
        kind: SectionKind::Text,
        data: vec![code; 4],
        size: 4,
        ..Default::default()
    });
    obj.add_symbol(SymbolBuilder {
        name: "_start".to_string(),
        classified: ClassifiedSymbol {
            kind: SymbolKind::Text,
            text_kind: Some(som::symbol::TextKind::Entry),
            visibility: Visibility::Global,
            value: 0,
            section: Some(text as u32),
            arg_reloc: 0,
            xleast: 0,
            secondary_def: false,
            is_common: false,
            dup_common: false,
            is_comdat: false,
            privilege: 0,
        },
    });
    obj.write().unwrap()
}

fn exported(name: &str) -> ExportedSymbol {
    ExportedSymbol {
        name: name.to_string(),
        kind: SymbolKind::Data,
        visibility: Visibility::Global,
        symbol_type: fmt::SymbolType::Data as u32,
        symbol_scope: fmt::SymbolScope::Universal as u32,
        symbol_info: 0,
        symbol_value: 0,
    }
}

/// Building an archive with a one-character and a two-character exported
/// symbol name exercises both branches of the LST hash function, and both
/// symbols resolve back to their module through the hash-bucket chain.
#[test]
fn lst_hash_probe_for_short_names() {
    let data_a = vec![0u8; 8];
    let data_ab = vec![1u8; 8];
    let members = vec![
        ArchiveMember {
            name: "a.o".to_string(),
            data: &data_a,
            symbols: vec![exported("a")],
        },
        ArchiveMember {
            name: "ab.o".to_string(),
            data: &data_ab,
            symbols: vec![exported("ab")],
        },
    ];

    let bytes = archive::write_archive(&members).unwrap();
    let parsed = archive::parse(&bytes).unwrap();

    assert_eq!(parsed.modules.len(), 2);
    let by_name = |n: &str| parsed.symbols.iter().find(|s| s.name == n).unwrap();
    let a = by_name("a");
    let ab = by_name("ab");
    assert_eq!(a.module_index, 0);
    assert_eq!(ab.module_index, 1);
    assert_eq!(archive::lst_hash(b"a") % fmt::SOM_LST_HASH_SIZE as u32,
        archive::lst_hash(a.name.as_bytes()) % fmt::SOM_LST_HASH_SIZE as u32);
    assert_eq!(archive::lst_hash(b"ab") % fmt::SOM_LST_HASH_SIZE as u32,
        archive::lst_hash(ab.name.as_bytes()) % fmt::SOM_LST_HASH_SIZE as u32);
}

/// A single-file `EXECLIBMAGIC` container: an `LstHeader` with one directory
/// entry pointing straight at a nested SOM object, no `!<arch>` framing.
#[test]
fn execlib_indirection_resolves_the_nested_module() {
    use som::endian::{BigEndian as BE, U32};
    use som::pod::bytes_of;

    let module = minimal_module(0x08);

    let header_size = std::mem::size_of::<fmt::LstHeader>() as u32;
    let entry_size = std::mem::size_of::<fmt::SomEntry>() as u32;
    let dir_loc = header_size;
    let module_start = dir_loc + entry_size;

    let mut header = fmt::LstHeader {
        system_id: U32::new(BE, fmt::CPU_PA_RISC1_1),
        a_magic: U32::new(BE, fmt::EXECLIBMAGIC),
        version_id: U32::new(BE, fmt::NEW_VERSION_ID),
        file_time: fmt::SysClock {
            secs: U32::new(BE, 0),
            nanosecs: U32::new(BE, 0),
        },
        hash_loc: U32::new(BE, 0),
        hash_size: U32::new(BE, 0),
        module_count: U32::new(BE, 1),
        module_limit: U32::new(BE, fmt::SOM_LST_MODULE_LIMIT as u32),
        dir_loc: U32::new(BE, dir_loc),
        export_list_loc: U32::new(BE, 0),
        export_list_size: U32::new(BE, 0),
        import_list_loc: U32::new(BE, 0),
        import_list_count: U32::new(BE, 0),
        aux_loc: U32::new(BE, 0),
        aux_size: U32::new(BE, 0),
        string_loc: U32::new(BE, 0),
        string_size: U32::new(BE, 0),
        free_list: U32::new(BE, 0),
        file_end: U32::new(BE, module_start + module.len() as u32),
        checksum: U32::new(BE, 0),
    };
    header.checksum = U32::new(BE, fmt::lst_header_checksum(&header));

    let entry = fmt::SomEntry {
        location: U32::new(BE, module_start),
        total_size: U32::new(BE, module.len() as u32),
        subspace_location: U32::new(BE, 0),
        subspace_total_size: U32::new(BE, 0),
        lib_location: U32::new(BE, 0),
        space_strings_size: U32::new(BE, 0),
        time_stamp: U32::new(BE, 0),
        checksum: U32::new(BE, 0),
    };

    let mut bytes = Vec::new();
    bytes.extend_from_slice(bytes_of(&header));
    bytes.extend_from_slice(bytes_of(&entry));
    bytes.extend_from_slice(&module);

    let object = archive::open_execlib(&bytes).unwrap();
    assert_eq!(object.sections.len(), 1);
    assert_eq!(object.sections[0].name, "$CODE$");
    assert_eq!(object.symbols.len(), 1);
    assert_eq!(object.symbols[0].name, "_start");
}
