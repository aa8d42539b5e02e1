//! Read and write HP PA-RISC SOM object files and archive libraries.
//!
//! This is a back-end for a single object format, in the shape of the
//! per-format modules of the `object` crate (`read::xcoff`, `write::elf`,
//! ...): a pure, dependency-light Rust realization of the four subsystems
//! that matter for SOM —
//!
//! - [`som`]: the on-disk record definitions (header, space/subspace
//!   dictionaries, symbol records, the archive LST) and their bit-packed
//!   flag words.
//! - [`reloc`]: the fixup stream, a byte-coded postfix virtual machine that
//!   compresses relocations with a four-slot re-use queue.
//! - [`symbol`]: the bidirectional mapping between a host-neutral symbol and
//!   SOM's packed symbol dictionary record.
//! - [`archive`]: the archive member header and the Library Symbol Table
//!   (LST), SOM's hashed cross-module symbol directory.
//!
//! [`read`] and [`write`] sit on top of these as the host layer a real BFD
//! would otherwise supply (see `SPEC_FULL.md` for why this crate provides
//! its own rather than linking the C library).
//!
//! # Features
//!
//! - `read_core` / `read`: parse SOM objects (`read` additionally pulls in
//!   `archive` and `std`).
//! - `write_core` / `write`: build and serialize SOM objects (`write`
//!   additionally pulls in `archive` and `std`).
//! - `archive`: the archive member header and LST, shared between read and
//!   write.
//! - `std`: enables `std::error::Error` for [`error::Error`].
//! - `logging`: enables `log` diagnostics at the loader/writer/archive seams.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod endian;
pub mod error;
pub mod misc;
pub mod pod;
pub mod reloc;
pub mod som;
pub mod symbol;

#[cfg(feature = "archive")]
pub mod archive;
#[cfg(feature = "read_core")]
pub mod read;
#[cfg(feature = "write_core")]
pub mod write;

pub use error::{Error, ErrorKind, Result};
