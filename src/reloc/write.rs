//! The fixup stream emitter: the inverse of [`super::read::parse_relocations`].
//!
//! Relocations must be supplied in ascending address order (subspace
//! content order). Gaps between them are compressed into the smallest
//! `R_NO_RELOCATION` variant that fits; gaps of `0x1000000` bytes or more
//! are covered by repeated maximum-skip opcodes.
//! Any multi-byte-operand opcode is checked against `queue` before being
//! emitted literally, so repeated fixups collapse to a single-byte
//! `R_PREV_FIXUP` reference.

use super::opcodes::{self, prev_fixup_opcode};
use super::{RelocQueue, Relocation, RelocType};
use crate::error::{Error, Result};

/// Gaps of this many bytes or more are covered by the maximum-skip
/// `R_NO_RELOCATION` opcode, repeated as needed.
const MAX_SKIP: u32 = 0x0100_0000;

fn push_be(out: &mut Vec<u8>, value: u64, width: u8) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[8 - width as usize..]);
}

/// Encode a single `R_NO_RELOCATION` gap of `skip` bytes using the smallest
/// variant that represents it exactly.
fn encode_skip(skip: u32, out: &mut Vec<u8>) {
    if skip <= 23 {
        out.push(skip as u8);
    } else if skip <= 255 {
        out.push(0x18);
        push_be(out, skip as u64, 1);
    } else if skip <= 0xffff {
        out.push(0x1c);
        push_be(out, skip as u64, 2);
    } else if skip < 0x00ff_ffff {
        out.push(0x1f);
        push_be(out, skip as u64, 3);
    } else {
        debug_assert_eq!(skip, MAX_SKIP);
        out.push(0x1f);
        push_be(out, 0x00ff_ffff, 3);
    }
}

/// Emit the `R_NO_RELOCATION` opcodes covering a gap of `gap` bytes,
/// splitting gaps of `MAX_SKIP` or more into repeated maximum-skip opcodes
/// followed by a normal remainder skip.
fn encode_gap(mut gap: u32, out: &mut Vec<u8>) {
    while gap >= MAX_SKIP {
        encode_skip(MAX_SKIP, out);
        gap -= MAX_SKIP;
    }
    if gap == 0x00ff_ffff {
        // Would be read back as the all-ones max-skip sentinel; split off
        // one byte so the remainder round-trips exactly.
        encode_skip(gap - 1, out);
        encode_skip(1, out);
    } else if gap > 0 {
        encode_skip(gap, out);
    }
}

/// Pick the narrowest symbol-index width (1, 2 or 4 bytes) that represents
/// `symbol` exactly.
fn symbol_width(symbol: u32) -> u8 {
    if symbol <= 0xff {
        1
    } else if symbol <= 0xffff {
        2
    } else {
        4
    }
}

fn encode_relocation(r: &Relocation) -> Result<Vec<u8>> {
    use RelocType::*;
    let mut out = Vec::new();

    let symbol_family = |out: &mut Vec<u8>, opcodes_by_width: [u8; 3], symbol: u32| {
        let width = symbol_width(symbol);
        let opcode = match width {
            1 => opcodes_by_width[0],
            2 => opcodes_by_width[1],
            _ => opcodes_by_width[2],
        };
        out.push(opcode);
        push_be(out, symbol as u64, width);
    };

    match r.kind {
        Zeroes => {
            out.push(0x20);
            push_be(&mut out, r.addend as u64 & 0xff, 1);
        }
        Uninit => {
            out.push(0x21);
            push_be(&mut out, r.addend as u64 & 0xffff, 2);
        }
        Relocation => {
            out.push(0x22);
            push_be(&mut out, r.addend as u64 & 0xff, 1);
        }
        DataOneSymbol => symbol_family(
            &mut out,
            [0x23, 0x24, 0x25],
            r.symbol
                .ok_or_else(|| Error::bad_value("R_DATA_ONE_SYMBOL missing symbol"))?,
        ),
        DataPlabel => symbol_family(
            &mut out,
            [0x26, 0x27, 0x28],
            r.symbol
                .ok_or_else(|| Error::bad_value("R_DATA_PLABEL missing symbol"))?,
        ),
        SpaceRef => {
            out.push(0x29);
            push_be(
                &mut out,
                r.symbol
                    .ok_or_else(|| Error::bad_value("R_SPACE_REF missing symbol"))? as u64,
                1,
            );
        }
        DpRelative => symbol_family(
            &mut out,
            [0x31, 0x32, 0x33],
            r.symbol
                .ok_or_else(|| Error::bad_value("R_DP_RELATIVE missing symbol"))?,
        ),
        DataGprel => {
            out.push(0x34);
            push_be(
                &mut out,
                r.symbol
                    .ok_or_else(|| Error::bad_value("R_DATA_GPREL missing symbol"))? as u64,
                4,
            );
        }
        DltRel => {
            out.push(0x35);
            push_be(
                &mut out,
                r.symbol
                    .ok_or_else(|| Error::bad_value("R_DLT_REL missing symbol"))? as u64,
                4,
            );
        }
        CodeOneSymbol => symbol_family(
            &mut out,
            [0x36, 0x37, 0x38],
            r.symbol
                .ok_or_else(|| Error::bad_value("R_CODE_ONE_SYMBOL missing symbol"))?,
        ),
        MilliRel => {
            out.push(0x39);
            push_be(
                &mut out,
                r.symbol
                    .ok_or_else(|| Error::bad_value("R_MILLI_REL missing symbol"))? as u64,
                4,
            );
        }
        CodePlabel => {
            let symbol = r
                .symbol
                .ok_or_else(|| Error::bad_value("R_CODE_PLABEL missing symbol"))?;
            if symbol <= 0xff {
                out.push(0x3a);
                push_be(&mut out, symbol as u64, 1);
            } else {
                out.push(0x3b);
                push_be(&mut out, symbol as u64, 4);
            }
        }
        PcrelCall | AbsCall => {
            let symbol = r
                .symbol
                .ok_or_else(|| Error::bad_value("call relocation missing symbol"))?;
            let sub_opcode = opcodes::ARG_RELOC_ADDENDS
                .iter()
                .position(|&a| a as i64 == r.addend)
                .unwrap_or(0) as u64;
            let width = symbol_width(symbol);
            let opcode = match (r.kind, width) {
                (PcrelCall, 1) => 0x2b,
                (PcrelCall, 2) => 0x2c,
                (PcrelCall, _) => 0x2d,
                (_, 1) => 0x2e,
                (_, 2) => 0x2f,
                (_, _) => 0x30,
            };
            out.push(opcode);
            push_be(&mut out, sub_opcode, 1);
            push_be(&mut out, symbol as u64, width);
        }
        Entry => {
            out.push(0x3d);
            push_be(&mut out, r.addend as u64, 1);
        }
        Exit => {
            out.push(0x3f);
            push_be(&mut out, r.addend as u64, 1);
        }
        Breakpoint => out.push(0x3c),
        AltEntry => out.push(0x3e),
        BeginTry => out.push(0x40),
        BeginBrtab => out.push(0x42),
        EndBrtab => out.push(0x43),
        Fsel => out.push(0x49),
        Lsel => out.push(0x4a),
        Rsel => out.push(0x4b),
        NMode => out.push(0x4c),
        Translated => out.push(0x54),
        N0Sel => out.push(0x5e),
        N1Sel => out.push(0x5f),
        LtpOverride => out.push(0x62),
        _ => {
            return Err(Error::bad_value(
                "relocation kind not supported by the fixup writer",
            ));
        }
    }

    if r.addend != 0 && !matches!(r.kind, Zeroes | Uninit | Relocation | Entry | Exit | PcrelCall | AbsCall) {
        let mut prefix = Vec::new();
        let (opcode, width) = if r.addend >= i8::MIN as i64 && r.addend <= i8::MAX as i64 {
            (0x50, 1)
        } else if r.addend >= i16::MIN as i64 && r.addend <= i16::MAX as i64 {
            (0x51, 2)
        } else if r.addend >= -(1i64 << 23) && r.addend < (1i64 << 23) {
            (0x52, 3)
        } else {
            (0x53, 4)
        };
        prefix.push(opcode);
        push_be(&mut prefix, r.addend as u64 & mask_for(width), width);
        prefix.extend_from_slice(&out);
        out = prefix;
    }

    Ok(out)
}

fn mask_for(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (width * 8)) - 1
    }
}

/// Emit a subspace's entire fixup stream for `relocations`, which must
/// already be sorted into ascending `address` order by the caller (the
/// symbol classifier's descending relocation-count sort governs symbol
/// table order, not this one).
pub fn write_relocations(relocations: &[Relocation], queue: &mut RelocQueue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut cursor: u32 = 0;

    for r in relocations {
        if r.address < cursor {
            return Err(Error::bad_value(
                "relocations must be supplied in ascending address order",
            ));
        }
        encode_gap(r.address - cursor, &mut out);

        let encoded = encode_relocation(r)?;
        if encoded.len() > 1 {
            if let Some(slot) = queue.find(&encoded) {
                out.push(prev_fixup_opcode(slot));
                queue.use_slot(slot);
            } else {
                out.extend_from_slice(&encoded);
                queue.insert(&encoded);
            }
        } else {
            out.extend_from_slice(&encoded);
        }

        let length = match r.kind {
            RelocType::Zeroes | RelocType::Uninit | RelocType::Relocation => r.addend as u32,
            _ => 4,
        };
        cursor = r
            .address
            .checked_add(length)
            .ok_or_else(|| Error::file_too_big())?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reloc::read::parse_relocations;

    fn roundtrip(relocs: &[Relocation]) -> Vec<Relocation> {
        let mut wqueue = RelocQueue::new();
        let bytes = write_relocations(relocs, &mut wqueue).unwrap();
        // Zero-filled stand-in for the subspace's own content, sized to
        // cover every relocation's addend-fallback read (`R_DATA_ONE_SYMBOL`
        // with a zero addend reads its addend back out of this buffer).
        let section_len = relocs
            .iter()
            .map(|r| r.address as usize + 4)
            .max()
            .unwrap_or(0);
        let section = vec![0u8; section_len];
        let mut rqueue = RelocQueue::new();
        parse_relocations(&bytes, &section, &mut rqueue).unwrap()
    }

    #[test]
    fn single_symbol_roundtrips() {
        let relocs = vec![Relocation {
            address: 0,
            kind: RelocType::DataOneSymbol,
            symbol: Some(42),
            addend: 0,
        }];
        assert_eq!(roundtrip(&relocs), relocs);
    }

    #[test]
    fn gap_compression_uses_direct_variant() {
        let relocs = vec![
            Relocation {
                address: 0,
                kind: RelocType::DataOneSymbol,
                symbol: Some(1),
                addend: 0,
            },
            Relocation {
                address: 4,
                kind: RelocType::DataOneSymbol,
                symbol: Some(2),
                addend: 0,
            },
            Relocation {
                address: 8,
                kind: RelocType::DataOneSymbol,
                symbol: Some(3),
                addend: 0,
            },
        ];
        let mut queue = RelocQueue::new();
        let bytes = write_relocations(&relocs, &mut queue).unwrap();
        // gap(0)=nothing, gap(4)=single byte 0x04, gap(4)=single byte 0x04
        assert!(bytes.windows(1).filter(|w| w[0] == 0x04).count() >= 2);
        assert_eq!(roundtrip(&relocs), relocs);
    }

    #[test]
    fn oversized_gap_splits_into_max_skip_plus_remainder() {
        let relocs = vec![
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
        assert_eq!(roundtrip(&relocs), relocs);
    }

    #[test]
    fn repeated_fixup_collapses_to_prev_fixup() {
        let relocs = vec![
            Relocation {
                address: 0,
                kind: RelocType::DataOneSymbol,
                symbol: Some(1000),
                addend: 5,
            },
            Relocation {
                address: 4,
                kind: RelocType::DataOneSymbol,
                symbol: Some(1000),
                addend: 5,
            },
        ];
        let mut queue = RelocQueue::new();
        let bytes = write_relocations(&relocs, &mut queue).unwrap();
        assert!(bytes
            .iter()
            .any(|&b| opcodes::prev_fixup_slot(b).is_some()));
        assert_eq!(roundtrip(&relocs), relocs);
    }
}
