// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, ErrorKind, Read, Write};

/// Size of the scratch buffer used when streaming spans that aren't kept in memory.
pub(crate) const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Reads a single byte, returning `None` at end of stream.
pub(crate) fn read_byte<R>(r: &mut R) -> io::Result<Option<u8>>
where
    R: Read + ?Sized,
{
    let mut byte = [0];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Fills as much of `buf` as the stream allows, returning the count of bytes read.
///
/// Unlike [`Read::read_exact()`], hitting end of stream early is not an error.
pub(crate) fn read_full<R>(r: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + ?Sized,
{
    let mut cnt = 0;
    while cnt < buf.len() {
        match r.read(&mut buf[cnt..]) {
            Ok(0) => break,
            Ok(n) => cnt += n,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(cnt)
}

/// Streams exactly `len` bytes from `r` to `w` (if any), handing every chunk to `inspect`.
///
/// Fails with [`ErrorKind::UnexpectedEof`] if `r` runs out first.
pub(crate) fn copy_span<R, W, F>(
    r: &mut R,
    mut w: Option<&mut W>,
    len: u64,
    mut inspect: F,
) -> io::Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    F: FnMut(&[u8]),
{
    let mut buf = vec![0; buffer_len(len)];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = &mut buf[..buffer_len(remaining)];
        r.read_exact(chunk)?;
        if let Some(w) = w.as_deref_mut() {
            w.write_all(chunk)?;
        }
        inspect(chunk);
        remaining -= chunk.len() as u64;
    }
    Ok(())
}

/// Returns a scratch buffer length suited to a span of `len` bytes.
pub(crate) fn buffer_len(len: u64) -> usize {
    len.min(COPY_BUFFER_SIZE as u64) as usize
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// A reader returning at most one byte per call
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn read_full_collects_short_reads() {
        let mut buf = [0; 4];
        assert_eq!(read_full(&mut Trickle(b"abcdef"), &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(read_full(&mut Trickle(b"ab"), &mut buf).unwrap(), 2);
    }

    #[test]
    fn read_byte_reports_end() {
        let mut r = Cursor::new(b"x");
        assert_eq!(read_byte(&mut r).unwrap(), Some(b'x'));
        assert_eq!(read_byte(&mut r).unwrap(), None);
    }

    #[test]
    fn copy_span_streams_in_chunks() {
        let data = vec![3; COPY_BUFFER_SIZE * 2 + 5];
        let mut out = Vec::new();
        let mut chunks = Vec::new();
        copy_span(&mut &data[..], Some(&mut out), data.len() as u64, |chunk| {
            chunks.push(chunk.len())
        })
        .unwrap();

        assert_eq!(out, data);
        assert_eq!(chunks, [COPY_BUFFER_SIZE, COPY_BUFFER_SIZE, 5]);
    }

    #[test]
    fn copy_span_rejects_short_input() {
        let mut out = Vec::new();
        let err = copy_span(&mut Cursor::new(b"abc"), Some(&mut out), 4, |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
