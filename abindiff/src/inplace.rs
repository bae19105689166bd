// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs::File,
    io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write},
};

use crate::{
    apply::ApplyConfig,
    error::{Error, Side, Unsupported},
    hash::HashAlgorithm,
    io_util::{buffer_len, copy_span, read_full},
    reader::PatchReader,
    record::{Action, Payload},
    verify::{Verifier, logical_action},
};

/// A seekable byte store that can be cut short.
pub trait Truncate {
    /// Discards everything past the current position.
    fn truncate(&mut self) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self) -> io::Result<()> {
        let pos = self.stream_position()?;
        self.set_len(pos)
    }
}

impl Truncate for Cursor<Vec<u8>> {
    fn truncate(&mut self) -> io::Result<()> {
        let pos = usize::try_from(self.position()).map_err(io::Error::other)?;
        Vec::truncate(self.get_mut(), pos);
        Ok(())
    }
}

impl<T> Truncate for &mut T
where
    T: Truncate + ?Sized,
{
    fn truncate(&mut self) -> io::Result<()> {
        (**self).truncate()
    }
}

/// Statistics about a patch applied in place.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InPlaceStats {
    /// Size of the patched file
    pub bytes_written: u64,
    /// The algorithm used to verify the result, if any
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Verified digest of the patched file
    pub hash_out: Option<String>,
}

/// Applies `patch` to `file`, overwriting it with the result
///
/// The file is read and written through the same handle, starting from its beginning, and is
/// truncated to the size of the result at the end. Only the digest of the result is verified: the
/// `2-` digest when applying forwards, the `1-` digest when reverting. Removed spans are skipped
/// without comparing their contents.
///
/// An added span overwrites whatever bytes follow the current position, so in this mode a patch
/// reconstructs the target only if no added span is larger than the removals preceding it. Patches
/// that grow the file at its end, or replace spans with spans of the same size, always qualify.
///
/// # Errors
///
/// Returns an error if the patch is malformed or can't be reverted, if the file is shorter than the
/// patch expects, if the result doesn't match its declared digest, or if an I/O error occurs. The
/// file is left partially patched in that case.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use abindiff::ApplyConfig;
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let mut patch = Cursor::new(Vec::new());
/// abindiff::diff(b"hello world".as_ref(), b"hello".as_ref(), &mut patch)?;
///
/// let mut file = Cursor::new(b"hello world".to_vec());
/// let stats = abindiff::apply_in_place(&mut file, patch.get_ref().as_slice(), &ApplyConfig::new())?;
/// assert_eq!(file.get_ref(), b"hello");
/// assert_eq!(stats.bytes_written, 5);
/// # Ok(())
/// # }
/// ```
pub fn apply_in_place<F, P>(
    file: &mut F,
    patch: P,
    config: &ApplyConfig,
) -> Result<InPlaceStats, Error>
where
    F: Read + Write + Seek + Truncate + ?Sized,
    P: Read,
{
    let reader = PatchReader::new(patch)?.max_block_size(config.get_max_block_size());
    apply_in_place_reader(file, reader, config)
}

/// Applies the records of `reader` to `file` in place
///
/// This is [`apply_in_place()`] for a patch whose reader was already created.
///
/// # Errors
///
/// See [`apply_in_place()`].
pub fn apply_in_place_reader<F, P>(
    file: &mut F,
    reader: PatchReader<P>,
    config: &ApplyConfig,
) -> Result<InPlaceStats, Error>
where
    F: Read + Write + Seek + Truncate + ?Sized,
    P: Read,
{
    let revert = config.is_revert();
    let output_side = if revert { Side::Old } else { Side::New };
    let mut verifier = Verifier::select(reader.headers(), config.get_check_hashsum())?;

    file.rewind()?;

    let mut file_size = 0;
    // Distance skipped over by removals but not yet rewound
    let mut seek_back = 0;

    for record in reader {
        let record = record?;
        let action = logical_action(&record, revert)?;

        if action != Action::Remove && seek_back > 0 {
            rewind_by(file, seek_back)?;
            seek_back = 0;
        }

        match (action, &record.payload) {
            (Action::Equal, _) => {
                let len = record.len();
                copy_span(file, None::<&mut io::Sink>, len, |chunk| {
                    if let Some(verifier) = verifier.as_mut() {
                        verifier.update(output_side, chunk);
                    }
                })?;
                file_size += len;
            }
            (Action::Remove, _) => seek_back += skip_tolerant(file, record.len())?,
            (Action::Add, Payload::Data(data)) => {
                file.write_all(data)?;
                if let Some(verifier) = verifier.as_mut() {
                    verifier.update(output_side, data);
                }
                file_size += record.len();
            }
            (Action::Add, Payload::Len(_)) => return Err(Unsupported::NotRevertible.into()),
        }
    }

    if seek_back > 0 {
        rewind_by(file, seek_back)?;
    }

    file.flush()?;
    file.truncate()?;
    tracing::debug!(file_size, "truncated patched file");

    // Some platforms report a stale size right after truncating, so read the last byte back
    if file_size > 0 {
        file.seek(SeekFrom::Start(file_size - 1))?;
        let mut tail = [0; 2];
        let read = read_full(file, &mut tail)?;
        if read != 1 {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("patched file does not end at offset {file_size}"),
            )
            .into());
        }
        file.seek(SeekFrom::Start(file_size))?;
    }

    let mut stats = InPlaceStats {
        bytes_written: file_size,
        ..InPlaceStats::default()
    };
    if let Some(verifier) = verifier {
        stats.hash_out = Some(verifier.verify(output_side, Side::Output)?);
        stats.hash_algorithm = Some(verifier.algorithm());
    }

    Ok(stats)
}

/// Reads past up to `len` bytes, returning how many were actually there.
fn skip_tolerant<F>(file: &mut F, len: u64) -> io::Result<u64>
where
    F: Read + ?Sized,
{
    let mut buf = vec![0; buffer_len(len)];
    let mut skipped = 0;
    while skipped < len {
        let want = buffer_len(len - skipped);
        let read = read_full(file, &mut buf[..want])?;
        skipped += read as u64;
        if read < want {
            break;
        }
    }
    Ok(skipped)
}

fn rewind_by<F>(file: &mut F, distance: u64) -> io::Result<()>
where
    F: Seek + ?Sized,
{
    let distance = i64::try_from(distance).map_err(io::Error::other)?;
    file.seek(SeekFrom::Current(-distance))?;
    Ok(())
}
