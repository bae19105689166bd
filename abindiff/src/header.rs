// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Read, Write};

use crate::{
    error::{Error, FormatError},
    io_util::{read_byte, read_full},
};

/// The magic and version line every patch starts with.
pub const MAGIC: &[u8] = b"abindiff 001\n";

/// The largest accepted header block, in bytes.
pub const MAX_HEADER_SIZE: usize = 65535;

/// The largest accepted action line, in bytes, including its terminating blank line.
pub const MAX_ACTION_SIZE: usize = 255;

/// The header set at the top of a patch.
///
/// Keys are case-insensitive: they are stored lower-cased and looked up lower-cased. Insertion
/// order is kept so that headers are written back in the order they were given.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header set.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `key` to `value`, replacing any previous value in place.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().trim().to_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges every header of `other` into `self`.
    pub fn extend(&mut self, other: &Headers) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    /// Writes the headers as `key: value` lines, returning the number of bytes written.
    pub(crate) fn write_lines<W>(&self, w: &mut W) -> io::Result<u64>
    where
        W: Write + ?Sized,
    {
        let mut written = 0;
        for (k, v) in self.iter() {
            let line = format!("{k}: {v}\n");
            w.write_all(line.as_bytes())?;
            written += line.len() as u64;
        }
        Ok(written)
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}

/// Reads the magic line and the header block from the start of a patch.
///
/// Reading stops right after the blank line closing the header block, so `patch` is left
/// positioned at the first record and can be handed to
/// [`PatchReader::with_headers()`](crate::PatchReader::with_headers) afterwards. The block is
/// read one byte at a time for that reason; wrap unbuffered streams in a
/// [`BufReader`](std::io::BufReader) only if nothing else reads from them later.
///
/// # Errors
///
/// Returns a [`FormatError`] if the magic line is wrong, the block exceeds
/// [`MAX_HEADER_SIZE`], the stream ends before the blank line or a line has no `:`.
///
/// # Examples
///
/// ```
/// let mut patch = b"abindiff 001\n1-Mode: rw-r--r--\n\n= 3\n\n".as_ref();
/// let headers = abindiff::read_headers(&mut patch)?;
///
/// assert_eq!(headers.get("1-mode"), Some("rw-r--r--"));
/// assert_eq!(patch, b"= 3\n\n");
/// # Ok::<(), abindiff::Error>(())
/// ```
pub fn read_headers<R>(patch: &mut R) -> Result<Headers, Error>
where
    R: Read + ?Sized,
{
    let mut magic = [0; MAGIC.len()];
    if read_full(patch, &mut magic)? != MAGIC.len() || magic != MAGIC {
        return Err(FormatError::UnknownFormat.into());
    }

    // The magic line's newline counts towards the terminating blank line
    let mut data = vec![b'\n'];
    while !data.ends_with(b"\n\n") {
        let Some(byte) = read_byte(patch)? else {
            return Err(FormatError::UnterminatedHeader.into());
        };
        data.push(byte);
        if data.len() > MAX_HEADER_SIZE {
            return Err(FormatError::HeaderTooLarge.into());
        }
    }

    let text = String::from_utf8(data).map_err(|_| FormatError::NonUtf8Header)?;
    let mut headers = Headers::new();
    for line in text.split('\n').filter(|line| !line.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| FormatError::MalformedHeaderLine(line.to_owned()))?;
        headers.insert(key, value.trim());
    }

    tracing::debug!(count = headers.len(), "read patch headers");

    Ok(headers)
}
