//! Archive support: the classic 60-byte ASCII member header, the Library
//! Symbol Table (LST), and `EXECLIBMAGIC` single-file indirection.

use crate::endian::{BigEndian as BE, U32};
use crate::error::{Error, Result};
use crate::pod::{bytes_of, bytes_of_slice, Bytes, Pod};
#[cfg(feature = "read_core")]
use crate::read::Object;
use crate::som::*;
use crate::symbol::{SymbolKind, Visibility};

/// Magic at the start of every classic Unix archive.
pub const ARMAG: &[u8; 8] = b"!<arch>\n";
/// Terminator of every archive member header.
pub const AR_FMAG: [u8; 2] = [0x60, 0x0a];
/// Size of the fixed ASCII archive member header.
pub const AR_HDR_SIZE: usize = 60;

/// The classic ASCII archive member header. Every field is fixed-width,
/// space-padded ASCII; `size` and the other numeric fields are decimal.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct ArHeader {
    pub name: [u8; 16],
    pub date: [u8; 12],
    pub uid: [u8; 6],
    pub gid: [u8; 6],
    pub mode: [u8; 8],
    pub size: [u8; 10],
    pub fmag: [u8; 2],
}
unsafe impl Pod for ArHeader {}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let mut s = bytes;
    while let [.., last] = s {
        if *last == b' ' {
            s = &s[..s.len() - 1];
        } else {
            break;
        }
    }
    s
}

fn parse_decimal(bytes: &[u8]) -> Result<u64> {
    let text = trim_ascii(bytes);
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| Error::malformed_archive("malformed decimal field in archive header"))
}

fn ascii_field<const N: usize>(s: &str) -> [u8; N] {
    let mut field = [b' '; N];
    let bytes = s.as_bytes();
    let n = bytes.len().min(N);
    field[..n].copy_from_slice(&bytes[..n]);
    field
}

fn decimal_field<const N: usize>(v: u64) -> [u8; N] {
    ascii_field(&v.to_string())
}

impl ArHeader {
    /// Build a member header for a member named `name` of `size` bytes. The
    /// timestamp/uid/gid/mode fields are written as zero, matching how a
    /// linker (rather than `ar` itself) emits archive members it does not
    /// need to round-trip ownership metadata for.
    pub fn build(name: &str, size: u32) -> ArHeader {
        ArHeader {
            name: ascii_field(name),
            date: decimal_field(0),
            uid: decimal_field(0),
            gid: decimal_field(0),
            mode: decimal_field(0),
            size: decimal_field(size as u64),
            fmag: AR_FMAG,
        }
    }

    /// The member name, with trailing space padding removed.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(trim_ascii(&self.name)).into_owned()
    }

    /// The member's content size in bytes.
    pub fn size(&self) -> Result<u64> {
        parse_decimal(&self.size)
    }
}

/// Compute the SOM archive symbol hash: a 1-character name uses a fixed
/// pattern; longer names fold the length and three characters.
pub fn lst_hash(name: &[u8]) -> u32 {
    if name.len() == 1 {
        let c = name[0] as u32;
        0x0100_0100 | (c << 16) | c
    } else {
        let len = name.len();
        let last = name[len - 1] as u32;
        let second_last = name[len - 2] as u32;
        let second = name.get(1).copied().unwrap_or(0) as u32;
        ((len as u32 & 0x7f) << 24) | (second << 16) | (second_last << 8) | last
    }
}

/// One symbol in a parsed LST, resolved to its defining module.
#[derive(Debug, Clone)]
pub struct LstSymbol {
    pub name: String,
    pub symbol_type: u32,
    pub symbol_scope: u32,
    pub symbol_info: u32,
    pub symbol_value: u32,
    pub module_index: u32,
}

/// A parsed archive: its Library Symbol Table and module directory.
#[derive(Debug, Clone)]
pub struct Archive {
    pub header: LstHeader,
    pub symbols: Vec<LstSymbol>,
    pub modules: Vec<SomEntry>,
}

// `LstSymbolRecord::name` points at the string's 4-byte length prefix; the
// string bytes themselves start 4 bytes later.
fn read_lst_string(data: &[u8], string_loc: u32, name_offset: u32) -> Result<String> {
    let len_at = string_loc as usize + name_offset as usize;
    let len: &U32<BE> = Bytes(data)
        .read_at(len_at)
        .map_err(|()| Error::malformed_archive("truncated LST string length prefix"))?;
    let bytes = Bytes(data)
        .read_bytes_at(len_at + 4, len.get(BE) as usize)
        .map_err(|()| Error::malformed_archive("truncated LST string bytes"))?;
    Ok(String::from_utf8_lossy(bytes.0).into_owned())
}

/// Parse a classic `.a` archive whose first member is the LST.
pub fn parse(data: &[u8]) -> Result<Archive> {
    if data.get(..ARMAG.len()) != Some(ARMAG.as_slice()) {
        return Err(Error::wrong_format("missing archive magic"));
    }
    let ar_header: &ArHeader = Bytes(data)
        .read_at(ARMAG.len())
        .map_err(|()| Error::malformed_archive("truncated LST member header"))?;
    if trim_ascii(&ar_header.name) != b"/" {
        return Err(Error::malformed_archive(
            "first archive member is not the LST",
        ));
    }

    let lst_offset = ARMAG.len() + AR_HDR_SIZE;
    let header: &LstHeader = Bytes(data)
        .read_at(lst_offset)
        .map_err(|()| Error::malformed_archive("truncated LST header"))?;
    if header.a_magic.get(BE) != LIBMAGIC {
        return Err(Error::malformed_archive("LST magic mismatch"));
    }
    if lst_header_checksum(header) != header.checksum.get(BE) {
        return Err(Error::malformed_archive("LST header checksum mismatch"));
    }
    let header = *header;

    let hash_table: &[U32<BE>] = Bytes(data)
        .read_slice_at(header.hash_loc.get(BE) as usize, header.hash_size.get(BE) as usize)
        .map_err(|()| Error::malformed_archive("truncated LST hash table"))?;

    let record_size = std::mem::size_of::<LstSymbolRecord>() as u32;
    let mut symbols = Vec::new();
    for &bucket in hash_table {
        let mut offset = bucket.get(BE);
        if offset == 0 {
            continue;
        }
        let mut previous: Option<u32> = None;
        loop {
            if let Some(prev) = previous {
                if offset <= prev + record_size {
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "malformed LST hash chain: next offset {:#x} did not advance past {:#x}",
                        offset,
                        prev + record_size
                    );
                    return Err(Error::malformed_archive(
                        "LST hash chain did not advance strictly forward",
                    ));
                }
            }
            let record: &LstSymbolRecord = Bytes(data)
                .read_at(offset as usize)
                .map_err(|()| Error::malformed_archive("truncated LST symbol record"))?;
            let name = read_lst_string(data, header.string_loc.get(BE), record.name.get(BE))?;
            let module_index = record.som_index.get(BE);
            if module_index >= header.module_count.get(BE) {
                return Err(Error::malformed_archive("LST symbol names an out-of-range module"));
            }
            symbols.push(LstSymbol {
                name,
                symbol_type: record.symbol_type.get(BE),
                symbol_scope: record.symbol_scope.get(BE),
                symbol_info: record.symbol_info.get(BE),
                symbol_value: record.symbol_value.get(BE),
                module_index,
            });
            previous = Some(offset);
            let next = record.next_entry.get(BE);
            if next == LST_NO_NEXT_ENTRY {
                break;
            }
            offset = next;
        }
    }

    let modules: &[SomEntry] = Bytes(data)
        .read_slice_at(header.dir_loc.get(BE) as usize, header.module_count.get(BE) as usize)
        .map_err(|()| Error::malformed_archive("truncated LST module directory"))?;

    Ok(Archive {
        header,
        symbols,
        modules: modules.to_vec(),
    })
}

/// Parse and return the SOM object for archive module `module_index`.
#[cfg(feature = "read_core")]
pub fn resolve_module(data: &[u8], archive: &Archive, module_index: u32) -> Result<Object> {
    let module = archive
        .modules
        .get(module_index as usize)
        .ok_or_else(|| Error::malformed_archive("module index out of range"))?;
    let start = module.location.get(BE) as usize;
    let bytes = data
        .get(start..)
        .ok_or_else(|| Error::malformed_archive("module location points outside the archive"))?;
    crate::read::parse(bytes)
}

/// Open a single-file `EXECLIBMAGIC` container: an LST header at offset 0
/// whose `dir_loc` names the one module entry to follow.
#[cfg(feature = "read_core")]
pub fn open_execlib(data: &[u8]) -> Result<Object> {
    let header: &LstHeader = Bytes(data).read_at(0).map_err(|()| Error::malformed_archive("truncated EXECLIB header"))?;
    if header.a_magic.get(BE) != EXECLIBMAGIC {
        return Err(Error::wrong_format("not an EXECLIBMAGIC container"));
    }
    if lst_header_checksum(header) != header.checksum.get(BE) {
        return Err(Error::malformed_archive("EXECLIB LST checksum mismatch"));
    }
    let entry: &SomEntry = Bytes(data)
        .read_at(header.dir_loc.get(BE) as usize)
        .map_err(|()| Error::malformed_archive("truncated EXECLIB directory entry"))?;
    let start = entry.location.get(BE) as usize;
    let bytes = data
        .get(start..)
        .ok_or_else(|| Error::malformed_archive("EXECLIB module location points outside the file"))?;
    crate::read::parse(bytes)
}

/// A symbol to export from one archive member, already classified by
/// [`crate::symbol::classify_read`].
#[derive(Debug, Clone)]
pub struct ExportedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub visibility: Visibility,
    pub symbol_type: u32,
    pub symbol_scope: u32,
    pub symbol_info: u32,
    pub symbol_value: u32,
}

/// Returns true if a symbol should be indexed in the LST: universal scope or
/// a common-block (`STORAGE`) definition, excluding continuation records and
/// unresolved references.
pub fn is_exported(kind: SymbolKind, visibility: Visibility) -> bool {
    if matches!(kind, SymbolKind::Null | SymbolKind::Extension) {
        return false;
    }
    if matches!(visibility, Visibility::Undefined) {
        return false;
    }
    visibility == Visibility::Global || kind == SymbolKind::Common
}

/// One archive member to be written by [`write_archive`].
#[cfg(feature = "write_core")]
pub struct ArchiveMember<'a> {
    pub name: String,
    pub data: &'a [u8],
    pub symbols: Vec<ExportedSymbol>,
}

// `hashbrown` rather than `std::collections::HashMap` so this interner keeps
// working under `write_core` without `std`.
#[cfg(feature = "write_core")]
struct LstStrings {
    bytes: Vec<u8>,
    offsets: hashbrown::HashMap<String, u32>,
}

#[cfg(feature = "write_core")]
impl LstStrings {
    fn new() -> Self {
        LstStrings {
            bytes: Vec::new(),
            offsets: hashbrown::HashMap::new(),
        }
    }

    /// Intern `s`, returning the `name` field value: the offset (from the
    /// start of the string area) of the string bytes themselves, four bytes
    /// past their length prefix.
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(s) {
            return offset;
        }
        let len = s.len() as u32;
        let name_offset = self.bytes.len() as u32 + 4;
        self.bytes.extend_from_slice(&len.to_be_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        let pad = (4 - (self.bytes.len() % 4)) % 4;
        self.bytes.resize(self.bytes.len() + pad, 0);
        self.offsets.insert(s.to_string(), name_offset);
        name_offset
    }
}

#[cfg(feature = "write_core")]
fn pad_to_even(out: &mut Vec<u8>) {
    if out.len() % 2 != 0 {
        out.push(b'\n');
    }
}

/// Build a classic `.a` archive containing `members`, with a freshly-built
/// LST as the first member.
#[cfg(feature = "write_core")]
pub fn write_archive(members: &[ArchiveMember<'_>]) -> Result<Vec<u8>> {
    #[cfg(feature = "logging")]
    log::debug!("writing SOM archive LST: {} members", members.len());
    if members.len() > SOM_LST_MODULE_LIMIT {
        return Err(Error::malformed_archive("too many archive members for the LST"));
    }

    struct Pending {
        name_offset: u32,
        hash: u32,
        symbol_type: u32,
        symbol_scope: u32,
        symbol_info: u32,
        symbol_value: u32,
        module_index: u32,
    }

    let mut strings = LstStrings::new();
    let mut pending = Vec::new();
    for (module_index, member) in members.iter().enumerate() {
        for sym in &member.symbols {
            if !is_exported(sym.kind, sym.visibility) {
                continue;
            }
            let name_offset = strings.intern(&sym.name);
            pending.push(Pending {
                name_offset,
                hash: lst_hash(sym.name.as_bytes()),
                symbol_type: sym.symbol_type,
                symbol_scope: sym.symbol_scope,
                symbol_info: sym.symbol_info,
                symbol_value: sym.symbol_value,
                module_index: module_index as u32,
            });
        }
    }

    let lst_header_offset = (ARMAG.len() + AR_HDR_SIZE) as u32;
    let hash_loc = lst_header_offset + std::mem::size_of::<LstHeader>() as u32;
    let hash_size = SOM_LST_HASH_SIZE as u32;
    let records_loc = hash_loc + hash_size * 4;
    let record_size = std::mem::size_of::<LstSymbolRecord>() as u32;
    let record_offsets: Vec<u32> = (0..pending.len() as u32)
        .map(|i| records_loc + i * record_size)
        .collect();
    let dir_loc = records_loc + pending.len() as u32 * record_size;
    let string_loc = dir_loc + members.len() as u32 * std::mem::size_of::<SomEntry>() as u32;

    let mut bucket_head = vec![0u32; SOM_LST_HASH_SIZE];
    let mut bucket_tail: Vec<Option<usize>> = vec![None; SOM_LST_HASH_SIZE];
    let mut next_entries = vec![LST_NO_NEXT_ENTRY; pending.len()];
    for (i, p) in pending.iter().enumerate() {
        let bucket = (p.hash % hash_size) as usize;
        let offset = record_offsets[i];
        if bucket_head[bucket] == 0 {
            bucket_head[bucket] = offset;
        } else if let Some(tail) = bucket_tail[bucket] {
            next_entries[tail] = offset;
        }
        bucket_tail[bucket] = Some(i);
    }

    let records: Vec<LstSymbolRecord> = pending
        .iter()
        .zip(next_entries.iter())
        .map(|(p, &next)| LstSymbolRecord {
            hash_value: U32::new(BE, p.hash),
            name: U32::new(BE, p.name_offset),
            qualifier_name: U32::new(BE, 0),
            symbol_type: U32::new(BE, p.symbol_type),
            symbol_scope: U32::new(BE, p.symbol_scope),
            symbol_info: U32::new(BE, p.symbol_info),
            symbol_value: U32::new(BE, p.symbol_value),
            som_index: U32::new(BE, p.module_index),
            next_entry: U32::new(BE, next),
        })
        .collect();

    let string_bytes_len = strings.bytes.len() as u32;
    let lst_content_len = (string_loc + string_bytes_len) - lst_header_offset;
    let members_start = lst_header_offset + lst_content_len;
    let members_start = members_start + (members_start % 2);

    let mut content_offsets = Vec::with_capacity(members.len());
    let mut cursor = members_start;
    for member in members {
        let member_start = cursor + AR_HDR_SIZE as u32;
        content_offsets.push(member_start);
        cursor = member_start + member.data.len() as u32;
        if cursor % 2 != 0 {
            cursor += 1;
        }
    }
    let file_end = cursor;

    let module_entries: Vec<SomEntry> = members
        .iter()
        .zip(content_offsets.iter())
        .map(|(member, &location)| SomEntry {
            location: U32::new(BE, location),
            total_size: U32::new(BE, member.data.len() as u32),
            subspace_location: U32::new(BE, 0),
            subspace_total_size: U32::new(BE, 0),
            lib_location: U32::new(BE, 0),
            space_strings_size: U32::new(BE, 0),
            time_stamp: U32::new(BE, 0),
            checksum: U32::new(BE, 0),
        })
        .collect();

    let mut header = LstHeader {
        system_id: U32::new(BE, CPU_PA_RISC1_1),
        a_magic: U32::new(BE, LIBMAGIC),
        version_id: U32::new(BE, NEW_VERSION_ID),
        file_time: SysClock {
            secs: U32::new(BE, 0),
            nanosecs: U32::new(BE, 0),
        },
        hash_loc: U32::new(BE, hash_loc),
        hash_size: U32::new(BE, hash_size),
        module_count: U32::new(BE, members.len() as u32),
        module_limit: U32::new(BE, SOM_LST_MODULE_LIMIT as u32),
        dir_loc: U32::new(BE, dir_loc),
        export_list_loc: U32::new(BE, 0),
        export_list_size: U32::new(BE, 0),
        import_list_loc: U32::new(BE, 0),
        import_list_count: U32::new(BE, 0),
        aux_loc: U32::new(BE, 0),
        aux_size: U32::new(BE, 0),
        string_loc: U32::new(BE, string_loc),
        string_size: U32::new(BE, string_bytes_len),
        free_list: U32::new(BE, 0),
        file_end: U32::new(BE, file_end),
        checksum: U32::new(BE, 0),
    };
    header.checksum = U32::new(BE, lst_header_checksum(&header));

    let hash_table: Vec<U32<BE>> = bucket_head.iter().map(|&h| U32::new(BE, h)).collect();

    let mut out = Vec::new();
    out.extend_from_slice(ARMAG);
    out.extend_from_slice(bytes_of(&ArHeader::build("/", lst_content_len)));
    out.extend_from_slice(bytes_of(&header));
    out.extend_from_slice(bytes_of_slice(&hash_table));
    out.extend_from_slice(bytes_of_slice(&records));
    out.extend_from_slice(bytes_of_slice(&module_entries));
    out.extend_from_slice(&strings.bytes);
    pad_to_even(&mut out);

    for member in members {
        out.extend_from_slice(bytes_of(&ArHeader::build(&member.name, member.data.len() as u32)));
        out.extend_from_slice(member.data);
        pad_to_even(&mut out);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_examples() {
        // one-character and two-character names take different paths above.
        assert_eq!(lst_hash(b"a"), 0x0100_0100 | (b'a' as u32) << 16 | b'a' as u32);
        assert_eq!(
            lst_hash(b"ab"),
            (2u32 << 24) | (b'b' as u32) << 16 | (b'a' as u32) << 8 | b'b' as u32
        );
    }

    #[cfg(feature = "write_core")]
    fn symbol(name: &str) -> ExportedSymbol {
        ExportedSymbol {
            name: name.to_string(),
            kind: SymbolKind::Data,
            visibility: Visibility::Global,
            symbol_type: SymbolType::Data as u32,
            symbol_scope: SymbolScope::Universal as u32,
            symbol_info: 0,
            symbol_value: 0,
        }
    }

    #[test]
    #[cfg(feature = "write_core")]
    fn write_then_parse_round_trips_exported_symbols() {
        let member_data = vec![0u8; 16];
        let members = vec![
            ArchiveMember {
                name: "a.o".to_string(),
                data: &member_data,
                symbols: vec![symbol("a")],
            },
            ArchiveMember {
                name: "ab.o".to_string(),
                data: &member_data,
                symbols: vec![symbol("ab")],
            },
        ];
        let bytes = write_archive(&members).unwrap();
        let archive = parse(&bytes).unwrap();
        assert_eq!(archive.modules.len(), 2);
        let names: Vec<&str> = archive.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"ab"));
    }

    #[test]
    fn non_exported_symbols_are_skipped() {
        assert!(!is_exported(SymbolKind::Null, Visibility::Global));
        assert!(!is_exported(SymbolKind::Data, Visibility::Undefined));
        assert!(!is_exported(SymbolKind::Common, Visibility::Undefined));
        assert!(is_exported(SymbolKind::Data, Visibility::Global));
        // STORAGE (Common) symbols are exported regardless of scope, as long
        // as they are not left undefined.
        assert!(is_exported(SymbolKind::Common, Visibility::Local));
    }
}
