// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Read, Write};

use crate::{
    error::{Error, IntegrityError, Side, Unsupported},
    hash::HashAlgorithm,
    io_util::copy_span,
    reader::PatchReader,
    record::{Action, Payload},
    verify::{HashCheck, Verifier, logical_action, real_side},
};

/// Configuration for applying a patch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ApplyConfig {
    revert: bool,
    check_hashsum: HashCheck,
    max_block_size: usize,
}

impl ApplyConfig {
    /// Creates a new configuration for applying patches
    ///
    /// This configuration can be reused across patch operations.
    pub const fn new() -> Self {
        Self {
            revert: false,
            check_hashsum: HashCheck::Auto,
            max_block_size: Self::DEFAULT_MAX_BLOCK_SIZE,
        }
    }

    /// Sets whether the patch is applied backwards, reconstructing the old file from the new one.
    ///
    /// Patches created with [`DiffConfig::skip_del()`](crate::DiffConfig::skip_del) can't be
    /// reverted.
    pub fn revert(&mut self, revert: bool) -> &mut Self {
        self.revert = revert;
        self
    }

    /// Sets whether the whole-file digests declared in the patch are verified.
    pub fn check_hashsum(&mut self, check: HashCheck) -> &mut Self {
        self.check_hashsum = check;
        self
    }

    /// Sets the largest piece of a stored payload held in memory at once.
    ///
    /// See [`PatchReader::max_block_size()`] for details.
    pub fn max_block_size(&mut self, size: usize) -> &mut Self {
        self.max_block_size = size;
        self
    }

    /// Returns whether the patch is applied backwards.
    pub fn is_revert(&self) -> bool {
        self.revert
    }

    /// Returns how the declared digests are checked.
    pub fn get_check_hashsum(&self) -> HashCheck {
        self.check_hashsum
    }

    /// Returns the largest piece of a stored payload held in memory at once.
    pub fn get_max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// The default largest piece of a stored payload held in memory at once
    pub const DEFAULT_MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about an applied patch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyStats {
    /// Number of bytes written to the destination
    pub bytes_written: u64,
    /// The algorithm used to verify the files, if any
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Verified digest of the old file
    pub hash_old: Option<String>,
    /// Verified digest of the new file
    pub hash_new: Option<String>,
}

/// Applies `patch` to `source`, writing the result to `dest`
///
/// When applying forwards, `source` is the old file and `dest` receives the new file. When
/// reverting, `source` is the new file and `dest` receives the old one. Removed spans stored in the
/// patch are compared with `source`, and the whole-file digests are verified as configured. Both
/// digests always describe the files the patch was created from, whichever direction it is applied
/// in.
///
/// # Errors
///
/// Returns an error if the patch is malformed, if `source` doesn't match the patch, if the patch
/// can't be reverted, or if an I/O error occurs. `dest` holds partial output in that case.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use abindiff::ApplyConfig;
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let mut patch = Cursor::new(Vec::new());
/// abindiff::diff(b"foobar".as_ref(), b"foObar".as_ref(), &mut patch)?;
///
/// let mut new = Vec::new();
/// abindiff::apply(b"foobar".as_ref(), patch.get_ref().as_slice(), &mut new, &ApplyConfig::new())?;
/// assert_eq!(new, b"foObar");
///
/// let mut old = Vec::new();
/// let mut config = ApplyConfig::new();
/// config.revert(true);
/// abindiff::apply(new.as_slice(), patch.get_ref().as_slice(), &mut old, &config)?;
/// assert_eq!(old, b"foobar");
/// # Ok(())
/// # }
/// ```
pub fn apply<S, P, D>(
    source: S,
    patch: P,
    dest: &mut D,
    config: &ApplyConfig,
) -> Result<ApplyStats, Error>
where
    S: Read,
    P: Read,
    D: Write + ?Sized,
{
    let reader = PatchReader::new(patch)?.max_block_size(config.max_block_size);
    apply_reader(source, reader, dest, config)
}

/// Applies the records of `reader` to `source`, writing the result to `dest`
///
/// This is [`apply()`] for a patch whose reader was already created, e.g. with headers read ahead
/// of time. The reader's own maximum block size is used.
///
/// # Errors
///
/// See [`apply()`].
pub fn apply_reader<S, P, D>(
    mut source: S,
    reader: PatchReader<P>,
    dest: &mut D,
    config: &ApplyConfig,
) -> Result<ApplyStats, Error>
where
    S: Read,
    P: Read,
    D: Write + ?Sized,
{
    let mut verifier = Verifier::select(reader.headers(), config.check_hashsum)?;
    let mut source_offset = 0;
    let mut written = 0;

    for record in reader {
        let record = record?;
        let action = logical_action(&record, config.revert)?;
        let side = real_side(record.action);
        let len = record.len();

        match (action, &record.payload) {
            (Action::Equal, _) => {
                copy_span(&mut source, Some(&mut *dest), len, |chunk| {
                    if let Some(verifier) = verifier.as_mut() {
                        verifier.update(Side::Old, chunk);
                        verifier.update(Side::New, chunk);
                    }
                })?;
                source_offset += len;
                written += len;
            }
            (Action::Remove, Payload::Len(_)) => {
                copy_span(&mut source, None::<&mut io::Sink>, len, |chunk| {
                    if let Some(verifier) = verifier.as_mut() {
                        verifier.update(side, chunk);
                    }
                })?;
                source_offset += len;
            }
            (Action::Remove, Payload::Data(expected)) => {
                let mut removed = vec![0; expected.len()];
                source.read_exact(&mut removed)?;
                if removed != *expected {
                    return Err(IntegrityError::RemovedDataMismatch {
                        offset: source_offset,
                    }
                    .into());
                }
                if let Some(verifier) = verifier.as_mut() {
                    verifier.update(side, &removed);
                }
                source_offset += len;
            }
            (Action::Add, Payload::Data(data)) => {
                dest.write_all(data)?;
                if let Some(verifier) = verifier.as_mut() {
                    verifier.update(side, data);
                }
                written += len;
            }
            (Action::Add, Payload::Len(_)) => return Err(Unsupported::NotRevertible.into()),
        }
    }

    dest.flush()?;

    let mut stats = ApplyStats {
        bytes_written: written,
        ..ApplyStats::default()
    };
    if let Some(verifier) = verifier {
        stats.hash_old = Some(verifier.verify(Side::Old, Side::Old)?);
        stats.hash_new = Some(verifier.verify(Side::New, Side::New)?);
        stats.hash_algorithm = Some(verifier.algorithm());
    }

    tracing::debug!(bytes_written = written, revert = config.revert, "patch applied");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FormatError, Headers};

    const HASH_1234: &str = "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4";
    const HASH_1934: &str = "914c948388ae30bdb0179a2f7bc91836d6af004171af735188fc1b69c286c864";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    /// A patch with `+` before `-`, as seen when reverting; never produced by diffing
    const SWAPPED: &[u8] = b"= 1\n\n+ 1\n\n9\n\n- 1\n\n2\n\n= 2\n\n";

    fn swapped_reader() -> PatchReader<&'static [u8]> {
        PatchReader::with_headers(
            SWAPPED,
            Headers::from_iter([("1-sha256sum", HASH_1234), ("2-sha256sum", HASH_1934)]),
        )
    }

    fn run(source: &[u8], patch: &[u8], config: &ApplyConfig) -> Result<Vec<u8>, Error> {
        let mut dest = Vec::new();
        apply(source, patch, &mut dest, config)?;
        Ok(dest)
    }

    fn reverted() -> ApplyConfig {
        let mut config = ApplyConfig::new();
        config.revert(true);
        config
    }

    #[test]
    fn applies_swapped_records() {
        let mut dest = Vec::new();
        let stats = apply_reader(&b"1234"[..], swapped_reader(), &mut dest, &ApplyConfig::new())
            .unwrap();

        assert_eq!(dest, b"1934");
        assert_eq!(stats.bytes_written, 4);
        assert_eq!(stats.hash_algorithm, Some(HashAlgorithm::Sha256));
        assert_eq!(stats.hash_old.as_deref(), Some(HASH_1234));
        assert_eq!(stats.hash_new.as_deref(), Some(HASH_1934));
    }

    #[test]
    fn reverts_swapped_records() {
        let mut dest = Vec::new();
        apply_reader(&b"1934"[..], swapped_reader(), &mut dest, &reverted()).unwrap();
        assert_eq!(dest, b"1234");
    }

    #[test]
    fn rejects_mismatching_removed_data() {
        let err = run(
            b"foxbar",
            b"abindiff 001\n\n= 2\n\n- 1\n\no\n\n+ 1\n\nO\n\n= 3\n\n",
            &ApplyConfig::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::RemovedDataMismatch { offset: 2 }),
        ));
    }

    #[test]
    fn skipped_removal_is_not_checked_but_not_revertible() {
        let patch = b"abindiff 001\n\n= 2\n\n- 1 skip=1\n\n+ 1\n\nO\n\n= 3\n\n";
        assert_eq!(run(b"foxbar", patch, &ApplyConfig::new()).unwrap(), b"foObar");
        assert!(matches!(
            run(b"foObar", patch, &reverted()),
            Err(Error::Unsupported(Unsupported::NotRevertible)),
        ));
    }

    #[test]
    fn reports_mismatching_side() {
        let patch = format!(
            "abindiff 001\n1-sha256sum: {EMPTY_SHA256}\n2-sha256sum: {HASH_1234}\n\n= 4\n\n"
        );
        let err = run(b"1234", patch.as_bytes(), &ApplyConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::HashMismatch { side: Side::Old, .. }),
        ));

        let patch = format!(
            "abindiff 001\n1-sha256sum: {HASH_1234}\n2-sha256sum: {EMPTY_SHA256}\n\n= 4\n\n"
        );
        let err = run(b"1234", patch.as_bytes(), &ApplyConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::Integrity(IntegrityError::HashMismatch { side: Side::New, .. }),
        ));

        let mut config = ApplyConfig::new();
        config.check_hashsum(HashCheck::Skip);
        assert_eq!(run(b"1234", patch.as_bytes(), &config).unwrap(), b"1234");
    }

    #[test]
    fn empty_patch_with_forced_check() {
        let mut config = ApplyConfig::new();
        config.check_hashsum(HashCheck::Force);
        let patch = format!(
            "abindiff 001\n1-sha256sum: {EMPTY_SHA256}\n2-sha256sum: {EMPTY_SHA256}\n\n"
        );
        assert_eq!(run(b"", patch.as_bytes(), &config).unwrap(), b"");

        let patch = format!(
            "abindiff 001\n1-sha256sum: {EMPTY_SHA256}\n2-sha256sum: {}f\n\n",
            &EMPTY_SHA256[..63],
        );
        assert!(matches!(
            run(b"", patch.as_bytes(), &config),
            Err(Error::Integrity(_)),
        ));

        assert!(matches!(
            run(b"", b"abindiff 001\n\n", &config),
            Err(Error::Unsupported(Unsupported::MissingHashsums)),
        ));
    }

    #[test]
    fn short_source_is_an_io_error() {
        let err = run(b"ab", b"abindiff 001\n\n= 3\n\n", &ApplyConfig::new()).unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn malformed_patch_is_a_format_error() {
        let err = run(b"abc", b"abindiff 001\n\n= x\n\n", &ApplyConfig::new()).unwrap_err();
        assert!(matches!(err, Error::Format(FormatError::BadLength(_))));
    }
}
