// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::BTreeMap,
    io::{self, Read, Seek, SeekFrom, Write},
};

use crate::{
    compare::{Block, BlockAction, Blocks},
    error::{Error, Side, Unsupported},
    hash::{HashAlgorithm, Hasher},
    header::{Headers, MAGIC},
    io_util::{COPY_BUFFER_SIZE, read_full},
    record::{Action, ActionLine, SEPARATOR, Tags},
};

/// Constructs a patch between two streams with default options
///
/// This function is a shorthand for [`diff_with_config()`] called with the default options. If you
/// want to tune the block sizes, hashes or metadata, see that function instead.
///
/// # Errors
///
/// Returns an error if an I/O error occurs while reading the inputs or writing the patch.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let old = b"Hello";
/// let new = b"Hero";
/// let mut patch = Cursor::new(Vec::new());
///
/// abindiff::diff(old.as_ref(), new.as_ref(), &mut patch)?;
///
/// # Ok(())
/// # }
/// ```
pub fn diff<A, B, W>(old: A, new: B, patch: &mut W) -> Result<DiffStats, Error>
where
    A: Read,
    B: Read,
    W: Write + Seek + ?Sized,
{
    diff_with_config(old, new, patch, &DiffConfig::default())
}

/// Constructs a patch between two streams
///
/// Both streams are read block by block in lockstep. Runs of equal or differing blocks are merged
/// into single records of at most [`DiffConfig::block_size_out()`] bytes. The requested whole-file
/// digests are computed along the way and written into space reserved in the header block, which
/// requires seeking in `patch`. If no digests are requested, `patch` is only ever written to, so
/// append-only sinks can be used through [`AppendOnly`].
///
/// # Errors
///
/// Returns an error if an I/O error occurs while reading the inputs or writing the patch. The
/// patch is incomplete in that case.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use abindiff::{DiffConfig, HashAlgorithm};
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let mut patch = Cursor::new(Vec::new());
/// let mut config = DiffConfig::new();
/// config.block_size_in(1).skip_del(true).hashsums([HashAlgorithm::Md5]);
///
/// let stats = abindiff::diff_with_config(b"foobar".as_ref(), b"foObar".as_ref(), &mut patch, &config)?;
///
/// assert_eq!(stats.changed_blocks_count, 1);
/// assert!(patch.get_ref().ends_with(b"\n= 2\n\n- 1 skip=1\n\n+ 1\n\nO\n\n= 3\n\n"));
/// # Ok(())
/// # }
/// ```
pub fn diff_with_config<A, B, W>(
    old: A,
    new: B,
    patch: &mut W,
    config: &DiffConfig,
) -> Result<DiffStats, Error>
where
    A: Read,
    B: Read,
    W: Write + Seek + ?Sized,
{
    let block_size = config.effective_block_size_in();
    let reservations = config
        .hashsums
        .iter()
        .flat_map(|&algorithm| [(Side::Old, algorithm), (Side::New, algorithm)])
        .collect();
    let mut writer = PatchWriter::begin(patch, &config.meta, reservations)?;

    let mut stats = DiffStats {
        block_size,
        ..DiffStats::default()
    };
    let mut run = Run::new();
    for block in Blocks::new(old, new, block_size) {
        let block = block?;
        stats.blocks_count += 1;
        stats.bytes_processed += block.span() as u64;

        if block.action != run.action {
            writer.flush_run(&mut run, config.skip_del)?;
            run.action = block.action;
        }
        if block.action == BlockAction::Differ {
            stats.changed_blocks_count += 1;
        }

        // Keep every record within block_size_out, even when it isn't a multiple of the block size
        if config.block_size_out != 0 && run.size + block.span() > config.block_size_out {
            writer.flush_run(&mut run, config.skip_del)?;
        }
        run.push(&block);
        if config.block_size_out != 0 && run.size >= config.block_size_out {
            writer.flush_run(&mut run, config.skip_del)?;
        }

        writer.update_digests(&block.old, &block.new);
    }
    writer.flush_run(&mut run, config.skip_del)?;

    writer.finish(&mut stats)?;

    tracing::debug!(
        blocks = stats.blocks_count,
        changed = stats.changed_blocks_count,
        patch_size = stats.patch_size,
        "diff finished",
    );

    Ok(stats)
}

/// Constructs a patch that creates `new` from an empty file
///
/// Instead of comparing blocks, the whole of `new` is stored as a single `+` record, streamed in
/// fixed-size chunks. `len` must be the exact size of `new`, since the record length is written
/// before its payload. Only the hashes and metadata of `config` are used; the old-side digests are
/// the digests of no data.
///
/// # Errors
///
/// Returns [`Unsupported::SizeMismatch`] if `new` doesn't hold exactly `len` bytes, or an error if
/// an I/O error occurs. The patch is incomplete in both cases.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use abindiff::DiffConfig;
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let mut patch = Cursor::new(Vec::new());
/// let mut config = DiffConfig::new();
/// config.hashsums([]);
///
/// abindiff::diff_from_empty(b"hi".as_ref(), 2, &mut patch, &config)?;
///
/// assert_eq!(patch.into_inner(), b"abindiff 001\n\n+ 2\n\nhi\n\n");
/// # Ok(())
/// # }
/// ```
pub fn diff_from_empty<B, W>(
    mut new: B,
    len: u64,
    patch: &mut W,
    config: &DiffConfig,
) -> Result<DiffStats, Error>
where
    B: Read,
    W: Write + Seek + ?Sized,
{
    let mut headers = config.meta.clone();
    for &algorithm in &config.hashsums {
        headers.insert(algorithm.old_key(), Hasher::new(algorithm).hex_digest());
    }
    let reservations = config
        .hashsums
        .iter()
        .map(|&algorithm| (Side::New, algorithm))
        .collect();
    let mut writer = PatchWriter::begin(patch, &headers, reservations)?;

    writer.write_line(Action::Add, len, Tags::new())?;
    let mut buf = vec![0; COPY_BUFFER_SIZE];
    let mut copied = 0;
    loop {
        let n = read_full(&mut new, &mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_bytes(&buf[..n])?;
        writer.update_digests(&[], &buf[..n]);
        copied += n as u64;
    }
    if copied != len {
        return Err(Unsupported::SizeMismatch {
            declared: len,
            actual: copied,
        }
        .into());
    }
    writer.write_bytes(SEPARATOR)?;

    let mut stats = DiffStats {
        bytes_processed: len,
        block_size: usize::try_from(len).unwrap_or(usize::MAX),
        blocks_count: 1,
        changed_blocks_count: 1,
        ..DiffStats::default()
    };
    writer.finish(&mut stats)?;
    for &algorithm in &config.hashsums {
        stats
            .hashsums_old
            .insert(algorithm, Hasher::new(algorithm).hex_digest());
    }

    Ok(stats)
}

/// Configuration for a diff operation.
///
/// This struct can be used to fine-tune the block sizes, the whole-file digests and the metadata
/// written into the patch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffConfig {
    block_size_in: usize,
    block_size_out: usize,
    skip_del: bool,
    hashsums: Vec<HashAlgorithm>,
    meta: Headers,
}

impl DiffConfig {
    /// Creates a new configuration for diff operations
    ///
    /// This configuration can be reused across diff operations.
    pub fn new() -> Self {
        Self {
            block_size_in: Self::DEFAULT_BLOCK_SIZE_IN,
            block_size_out: Self::DEFAULT_BLOCK_SIZE_OUT,
            skip_del: false,
            hashsums: vec![HashAlgorithm::Sha256],
            meta: Headers::new(),
        }
    }

    /// Sets the size of the blocks compared at a time.
    ///
    /// A size of 1 produces a byte-by-byte diff. Values below 1 are raised to 1, and values above a
    /// nonzero [`block_size_out()`](Self::block_size_out) are lowered to it.
    pub fn block_size_in(&mut self, size: usize) -> &mut Self {
        self.block_size_in = size.max(1);
        self
    }

    /// Sets the largest record written to the patch.
    ///
    /// Runs of equal or differing blocks are flushed as soon as they reach this size, which bounds
    /// memory use. A value of 0 means runs are never split, which may need memory for the largest
    /// differing span of the inputs.
    pub fn block_size_out(&mut self, size: usize) -> &mut Self {
        self.block_size_out = size;
        self
    }

    /// Sets whether removed data is left out of the patch.
    ///
    /// Such a patch is roughly half as large, but it can't be reverted, and removed spans are not
    /// checked against the old file when applying it.
    pub fn skip_del(&mut self, skip: bool) -> &mut Self {
        self.skip_del = skip;
        self
    }

    /// Sets the whole-file digests recorded in the patch headers.
    ///
    /// Duplicates are ignored. Requesting any digest requires the patch stream to be seekable.
    pub fn hashsums(&mut self, algorithms: impl IntoIterator<Item = HashAlgorithm>) -> &mut Self {
        self.hashsums.clear();
        for algorithm in algorithms {
            if !self.hashsums.contains(&algorithm) {
                self.hashsums.push(algorithm);
            }
        }
        self
    }

    /// Sets the recorded digests by name, e.g. `["sha256sum", "md5sum"]`.
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported::UnknownHashAlgorithm`] and leaves the configuration untouched if any
    /// name is unknown.
    pub fn hashsum_names<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<&mut Self, Unsupported> {
        let algorithms = HashAlgorithm::parse_list(names)?;
        Ok(self.hashsums(algorithms))
    }

    /// Sets the free-form metadata written at the top of the patch.
    ///
    /// Keys are written lower-cased.
    pub fn meta(&mut self, meta: Headers) -> &mut Self {
        self.meta = meta;
        self
    }

    /// Returns the largest record written to the patch, or 0 if unbounded.
    pub fn get_block_size_out(&self) -> usize {
        self.block_size_out
    }

    /// Returns the recorded digests.
    pub fn get_hashsums(&self) -> &[HashAlgorithm] {
        &self.hashsums
    }

    fn effective_block_size_in(&self) -> usize {
        match self.block_size_out {
            0 => self.block_size_in,
            out => self.block_size_in.min(out),
        }
    }

    /// The default size of the blocks compared at a time
    pub const DEFAULT_BLOCK_SIZE_IN: usize = 1024;

    /// The default largest record written to the patch
    ///
    /// We set this to 32 MiB to keep memory use bounded without fragmenting large changes.
    pub const DEFAULT_BLOCK_SIZE_OUT: usize = 32 * 1024 * 1024;
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about a finished diff.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiffStats {
    /// Size of the written patch in bytes
    pub patch_size: u64,
    /// Number of bytes compared, counting the longer input
    pub bytes_processed: u64,
    /// The block size actually used for comparing
    pub block_size: usize,
    /// Number of block pairs compared
    pub blocks_count: u64,
    /// Number of block pairs that differed
    pub changed_blocks_count: u64,
    /// Digests of the old input
    pub hashsums_old: BTreeMap<HashAlgorithm, String>,
    /// Digests of the new input
    pub hashsums_new: BTreeMap<HashAlgorithm, String>,
}

/// A patch sink that can't seek
///
/// Wraps a writer such as standard output so that it can be passed where a seekable patch stream
/// is expected. Every seek fails with [`io::ErrorKind::Unsupported`], so this only works for
/// patches written without digests.
#[derive(Debug)]
pub struct AppendOnly<W>(pub W);

impl<W> Write for AppendOnly<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W> Seek for AppendOnly<W> {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "patch stream is append-only",
        ))
    }
}

/// Consecutive blocks sharing one action, waiting to be written as records.
struct Run {
    action: BlockAction,
    old: Vec<u8>,
    new: Vec<u8>,
    size: usize,
}

impl Run {
    fn new() -> Self {
        Self {
            action: BlockAction::Equal,
            old: Vec::new(),
            new: Vec::new(),
            size: 0,
        }
    }

    fn push(&mut self, block: &Block) {
        self.old.extend_from_slice(&block.old);
        self.new.extend_from_slice(&block.new);
        self.size += block.span();
    }

    fn clear(&mut self) {
        self.old.clear();
        self.new.clear();
        self.size = 0;
    }
}

/// A digest whose header value is a placeholder until the input is consumed.
struct ReservedDigest {
    side: Side,
    offset: u64,
    hasher: Hasher,
}

/// Writes a patch in three phases: the header skeleton with reserved digest fields, the records,
/// and finally the digests over their placeholders.
struct PatchWriter<'a, W>
where
    W: Write + Seek + ?Sized,
{
    out: &'a mut W,
    written: u64,
    reserved: Vec<ReservedDigest>,
}

impl<'a, W> PatchWriter<'a, W>
where
    W: Write + Seek + ?Sized,
{
    /// Writes the magic line, `headers` and one placeholder per reservation.
    ///
    /// The stream position is queried only for reservations, so nothing but writes happen without
    /// them.
    fn begin(
        out: &'a mut W,
        headers: &Headers,
        reservations: Vec<(Side, HashAlgorithm)>,
    ) -> Result<Self, Error> {
        let mut writer = Self {
            out,
            written: 0,
            reserved: Vec::with_capacity(reservations.len()),
        };

        writer.write_bytes(MAGIC)?;
        writer.written += headers.write_lines(&mut *writer.out)?;

        for (side, algorithm) in reservations {
            let key = match side {
                Side::Old => algorithm.old_key(),
                _ => algorithm.new_key(),
            };
            writer.write_bytes(format!("{key}: ").as_bytes())?;
            let offset = writer.out.stream_position()?;
            let placeholder = "X".repeat(algorithm.hex_len());
            writer.write_bytes(placeholder.as_bytes())?;
            writer.write_bytes(b"\n")?;

            writer.reserved.push(ReservedDigest {
                side,
                offset,
                hasher: Hasher::new(algorithm),
            });
        }

        writer.write_bytes(b"\n")?;

        tracing::debug!(
            headers = headers.len(),
            reserved = writer.reserved.len(),
            "wrote patch headers",
        );

        Ok(writer)
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn write_line(&mut self, action: Action, len: u64, tags: Tags) -> io::Result<()> {
        self.written += ActionLine { action, len, tags }.write(&mut *self.out)?;
        Ok(())
    }

    fn write_record(&mut self, action: Action, data: &[u8]) -> io::Result<()> {
        self.write_line(action, data.len() as u64, Tags::new())?;
        self.write_bytes(data)?;
        self.write_bytes(SEPARATOR)
    }

    /// Writes the records for `run` and empties it. An empty run writes nothing.
    fn flush_run(&mut self, run: &mut Run, skip_del: bool) -> io::Result<()> {
        match run.action {
            BlockAction::Equal => {
                debug_assert_eq!(run.old, run.new, "equal run holds different data");
                if !run.old.is_empty() {
                    self.write_line(Action::Equal, run.old.len() as u64, Tags::new())?;
                }
            }
            BlockAction::Differ => {
                if !run.old.is_empty() && !run.new.is_empty() {
                    debug_assert_ne!(run.old, run.new, "differing run holds equal data");
                }
                if !run.old.is_empty() {
                    if skip_del {
                        self.write_line(Action::Remove, run.old.len() as u64, Tags::skip())?;
                    } else {
                        self.write_record(Action::Remove, &run.old)?;
                    }
                }
                if !run.new.is_empty() {
                    self.write_record(Action::Add, &run.new)?;
                }
            }
        }

        if run.size > 0 {
            tracing::trace!(
                action = ?run.action,
                old = run.old.len(),
                new = run.new.len(),
                "flushed run",
            );
        }
        run.clear();

        Ok(())
    }

    fn update_digests(&mut self, old: &[u8], new: &[u8]) {
        for digest in &mut self.reserved {
            match digest.side {
                Side::Old => digest.hasher.update(old),
                _ => digest.hasher.update(new),
            }
        }
    }

    /// Overwrites every placeholder with its final digest and returns to the end of the patch.
    fn finish(mut self, stats: &mut DiffStats) -> Result<(), Error> {
        self.out.flush()?;

        if !self.reserved.is_empty() {
            self.reserved.sort_by_key(|digest| digest.offset);
            for digest in &self.reserved {
                let hex = digest.hasher.hex_digest();
                self.out.seek(SeekFrom::Start(digest.offset))?;
                self.out.write_all(hex.as_bytes())?;

                let algorithm = digest.hasher.algorithm();
                match digest.side {
                    Side::Old => stats.hashsums_old.insert(algorithm, hex),
                    _ => stats.hashsums_new.insert(algorithm, hex),
                };
            }
            self.out.seek(SeekFrom::End(0))?;
            self.out.flush()?;

            tracing::debug!(count = self.reserved.len(), "backpatched digests");
        }

        stats.patch_size = self.written;

        Ok(())
    }
}
