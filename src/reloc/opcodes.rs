//! The 256-entry fixup opcode table and its postfix-format mini language.
//!
//! Each opcode maps to a [`RelocType`] and a format string describing how the
//! postfix interpreter in [`super::read`] should drive the register file and
//! value stack to assemble that relocation's address delta, symbol index
//! and addend. The grammar:
//!
//! - an uppercase letter `X` pushes `register[X]`
//! - a lowercase letter `'a'..='t'` reads `(letter - 'a' + 1)` big-endian
//!   bytes from the stream and pushes them unsigned; a trailing `!` (e.g.
//!   `d!`) instead sign-extends the value read
//! - a run of ASCII digits pushes that literal
//! - `+`, `*`, `<` pop two values and push the result of add / multiply /
//!   shift-left
//! - an uppercase letter immediately followed by `=` pops the top of the
//!   stack into that register
//!
//! Three small sub-opcode tables ([`COMP1`], [`COMP2`], [`COMP3`]) back the
//! `R_COMP1`/`R_COMP2`/`R_COMP3` compound opcodes, and [`ARG_RELOC_ADDENDS`]
//! backs the argument-relocation addend lookup used by `R_PCREL_CALL` and
//! `R_ABS_CALL`.
//!
//! The byte-for-byte opcode assignment here is this crate's own; no
//! reference opcode table was available, so the ranges below were designed
//! from the postfix mechanism described above rather than copied from an
//! external table (see DESIGN.md).

use super::RelocType;

/// One row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub ty: RelocType,
    /// The postfix format string driving the interpreter for this opcode.
    pub format: &'static str,
}

const fn e(ty: RelocType, format: &'static str) -> OpcodeEntry {
    OpcodeEntry { ty, format }
}

/// Look up the table entry for a raw opcode byte.
///
/// `RelocType::Reserved`-equivalent (an unmapped opcode) is reported as
/// `None`'s absence would be, but since every `RelocType` variant is
/// meaningful, unmapped slots return `None` directly so callers can raise
/// `MalformedFixupStream`.
///
/// Format strings are true postfix: every operand-reading token (a lowercase
/// letter, or a decimal literal) appears *before* the `letter=` pair that
/// binds it, since `letter=` pops the value already sitting on the stack. A
/// handful of opcodes (`R_END_TRY`, `R_STATEMENT`, `R_SEC_STMT`, `R_LINETAB`,
/// `R_LINETAB_ESC`, `R_COMMENT`) have no register of their own, so their
/// operand binds to `V` like `R_DATA_OVERRIDE`'s literal: it becomes this
/// opcode's own committed addend (`super::read::resolve`'s default case),
/// then is reset to zero once committed.
pub fn lookup(opcode: u8) -> Option<OpcodeEntry> {
    use RelocType::*;
    Some(match opcode {
        // R_NO_RELOCATION: four variants by how many extra bytes encode the
        // skip, selected by the writer as the smallest that fits.
        0x00..=0x17 => e(NoRelocation, ""),
        0x18..=0x1b => e(NoRelocation, "aL="),
        0x1c..=0x1e => e(NoRelocation, "bL="),
        0x1f => e(NoRelocation, "cL="),

        0x20 => e(Zeroes, "aL="),
        0x21 => e(Uninit, "bL="),
        0x22 => e(Relocation, "aL="),

        0x23 => e(DataOneSymbol, "aS="),
        0x24 => e(DataOneSymbol, "bS="),
        0x25 => e(DataOneSymbol, "dS="),

        0x26 => e(DataPlabel, "aS="),
        0x27 => e(DataPlabel, "bS="),
        0x28 => e(DataPlabel, "dS="),

        0x29 => e(SpaceRef, "aS="),
        // Width/count pair, combined additively into the addend register;
        // not emitted by the writer (see DESIGN.md).
        0x2a => e(RepeatedInit, "ab+V="),

        0x2b => e(PcrelCall, "aO=aS="),
        0x2c => e(PcrelCall, "aO=bS="),
        0x2d => e(PcrelCall, "aO=dS="),

        0x2e => e(AbsCall, "aO=aS="),
        0x2f => e(AbsCall, "aO=bS="),
        0x30 => e(AbsCall, "aO=dS="),

        0x31 => e(DpRelative, "aS="),
        0x32 => e(DpRelative, "bS="),
        0x33 => e(DpRelative, "dS="),
        0x34 => e(DataGprel, "dS="),
        0x35 => e(DltRel, "dS="),

        0x36 => e(CodeOneSymbol, "aS="),
        0x37 => e(CodeOneSymbol, "bS="),
        0x38 => e(CodeOneSymbol, "dS="),

        0x39 => e(MilliRel, "dS="),
        0x3a => e(CodePlabel, "aS="),
        0x3b => e(CodePlabel, "dS="),

        0x3c => e(Breakpoint, ""),
        0x3d => e(Entry, "aT="),
        0x3e => e(AltEntry, ""),
        0x3f => e(Exit, "aU="),

        0x40 => e(BeginTry, ""),
        0x41 => e(EndTry, "aV="),
        0x42 => e(BeginBrtab, ""),
        0x43 => e(EndBrtab, ""),

        0x44 => e(Statement, "aV="),
        0x45 => e(Statement, "bV="),
        0x46 => e(Statement, "cV="),

        0x47 => e(DataExpr, "d!V="),
        0x48 => e(CodeExpr, "d!V="),

        0x49 => e(Fsel, ""),
        0x4a => e(Lsel, ""),
        0x4b => e(Rsel, ""),

        0x4c => e(NMode, ""),
        0x4d => e(SMode, ""),
        0x4e => e(DMode, ""),
        0x4f => e(RMode, ""),

        0x50 => e(DataOverride, "a!V="),
        0x51 => e(DataOverride, "b!V="),
        0x52 => e(DataOverride, "c!V="),
        0x53 => e(DataOverride, "d!V="),

        0x54 => e(Translated, ""),
        // Binds the unwind carry register U.
        0x55 => e(AuxUnwind, "aU="),

        0x56 => e(Comp1, "aO="),
        0x57 => e(Comp2, "aO="),
        0x58 => e(Comp3, "aO="),

        0x59..=0x5c => e(PrevFixup, ""),

        0x5d => e(SecStmt, "aV="),
        0x5e => e(N0Sel, ""),
        0x5f => e(N1Sel, ""),

        0x60 => e(Linetab, "cV="),
        0x61 => e(LinetabEsc, "aV="),
        0x62 => e(LtpOverride, ""),
        0x63 => e(Comment, "aV="),

        _ => return None,
    })
}

/// Opcode used for each of the four `R_PREV_FIXUP` queue-slot references
/// (slot 0..=3), chosen so `lookup` above can identify which slot a byte
/// means: `0x59 + slot`.
pub fn prev_fixup_opcode(slot: usize) -> u8 {
    debug_assert!(slot < 4);
    0x59 + slot as u8
}

/// Recover which queue slot a `R_PREV_FIXUP` opcode byte refers to.
pub fn prev_fixup_slot(opcode: u8) -> Option<usize> {
    if (0x59..=0x5c).contains(&opcode) {
        Some((opcode - 0x59) as usize)
    } else {
        None
    }
}

/// Opcode used for each `R_DATA_OVERRIDE` literal width (1..=4 bytes),
/// chosen so the writer can pick the narrowest encoding for a given addend.
pub fn data_override_opcode(width: u8) -> u8 {
    debug_assert!((1..=4).contains(&width));
    0x4f + width
}

/// Sub-opcode table for `R_COMP1`: each entry names the binary operator
/// applied to the top two stack values.
pub const COMP1: &[&str] = &["+", "*", "<"];

/// Sub-opcode table for `R_COMP2`: like [`COMP1`] but operating against the
/// current running length register `L`.
pub const COMP2: &[&str] = &["L+", "L*", "L<"];

/// Sub-opcode table for `R_COMP3`: operates against the symbol-addend
/// register `V`.
pub const COMP3: &[&str] = &["V+", "V*", "V<"];

/// Tabulated argument-relocation addend for each `R_PCREL_CALL`/`R_ABS_CALL`
/// sub-opcode (`O`), a 10-bit bitfield describing which of the four integer
/// and four floating-point argument slots (plus the return value) carry a
/// relocatable address. Index 0 means "no arguments relocated".
pub const ARG_RELOC_ADDENDS: &[u32] = &[
    0b0000000000,
    0b1000000000,
    0b1100000000,
    0b1110000000,
    0b1111000000,
    0b0111000000,
    0b0011000000,
    0b0001000000,
    0b0000100000,
    0b0000010000,
    0b0000001000,
    0b0000000100,
    0b0000000010,
    0b0000000001,
    0b1000000001,
    0b1100000011,
    0b1111000000,
    0b1111111100,
    0b1111111111,
    0b0101010101,
    0b1010101010,
    0b0000111100,
    0b0011110000,
    0b1111000011,
    0b0000000111,
    0b1110000000,
    0b0001111000,
    0b1001001001,
    0b0110110110,
    0b1011011011,
    0b0100100100,
    0b1101101101,
];
