// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

//! Block-aligned binary diffing and patching with a self-describing patch format.
//!
//! This crate compares two byte streams block by block and produces a patch recording which spans
//! are unchanged, removed or added. The patch carries free-form metadata and whole-file digests in
//! a text header, and can be applied forwards, reverted to recover the old file, or applied in
//! place to a single file. Everything is streamed, so neither the inputs nor the patch are held in
//! memory as a whole.
//!
//! # Patch format
//!
//! A patch starts with the line `abindiff 001`, followed by `key: value` header lines and a blank
//! line. Records follow, each an action line terminated by a blank line:
//!
//! ```text
//! = 2            unchanged span of 2 bytes
//!
//! - 1            removed span, followed by the removed bytes and a blank line
//!
//! o
//!
//! + 1            added span, followed by the added bytes and a blank line
//!
//! O
//!
//! - 4 skip=1     removed span whose bytes were not stored
//! ```
//!
//! # Examples
//!
//! Creating a patch between two files:
//!
//! ```no_run
//! use std::fs::File;
//!
//! # fn main() -> Result<(), abindiff::Error> {
//! let old = File::open("app-v1.bin")?;
//! let new = File::open("app-v2.bin")?;
//! let mut patch = File::create("app-v1-to-v2.abindiff")?;
//!
//! abindiff::diff(old, new, &mut patch)?;
//!
//! # Ok(())
//! # }
//! ```
//!
//! Applying a patch to recreate the new file:
//!
//! ```no_run
//! use std::fs::File;
//! use abindiff::ApplyConfig;
//!
//! # fn main() -> Result<(), abindiff::Error> {
//! let old = File::open("app-v1.bin")?;
//! let patch = File::open("app-v1-to-v2.abindiff")?;
//! let mut new = File::create("app-v2.bin")?;
//!
//! abindiff::apply(old, patch, &mut new, &ApplyConfig::new())?;
//!
//! # Ok(())
//! # }
//! ```
//!
//! Reverting the same patch in place:
//!
//! ```no_run
//! use std::fs::{File, OpenOptions};
//! use abindiff::ApplyConfig;
//!
//! # fn main() -> Result<(), abindiff::Error> {
//! let mut file = OpenOptions::new().read(true).write(true).open("app-v2.bin")?;
//! let patch = File::open("app-v1-to-v2.abindiff")?;
//!
//! let mut config = ApplyConfig::new();
//! config.revert(true);
//! abindiff::apply_in_place(&mut file, patch, &config)?;
//!
//! # Ok(())
//! # }
//! ```

mod apply;
mod compare;
mod diff;
mod error;
mod hash;
mod header;
mod inplace;
mod io_util;
mod reader;
mod record;
mod verify;

pub use apply::{ApplyConfig, ApplyStats, apply, apply_reader};
pub use diff::{AppendOnly, DiffConfig, DiffStats, diff, diff_from_empty, diff_with_config};
pub use error::{Error, FormatError, IntegrityError, Side, Unsupported};
pub use hash::{HashAlgorithm, Hasher};
pub use header::{Headers, MAGIC, MAX_ACTION_SIZE, MAX_HEADER_SIZE, read_headers};
pub use inplace::{InPlaceStats, Truncate, apply_in_place, apply_in_place_reader};
pub use reader::PatchReader;
pub use record::{Action, Payload, Record, Tags};
pub use verify::HashCheck;
