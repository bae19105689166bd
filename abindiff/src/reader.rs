// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{BufReader, Read};

use crate::{
    error::{Error, FormatError},
    header::{Headers, MAX_ACTION_SIZE, read_headers},
    io_util::{read_byte, read_full},
    record::{Action, ActionLine, Payload, Record, SEPARATOR, Tags},
};

/// A streaming patch parser
///
/// The reader consumes the header block when created and then hands out one [`Record`] at a time
/// through its [`Iterator`] implementation, so a patch is never held in memory as a whole. Stored
/// payloads longer than the maximum block size are split into several records on the fly.
///
/// After the first error the iterator is exhausted.
///
/// # Examples
///
/// ```
/// use abindiff::{Action, Payload, PatchReader};
///
/// # fn main() -> Result<(), abindiff::Error> {
/// let patch = b"abindiff 001\na: 5\n\n= 3\n\n+ 5\n\nhello\n\n";
/// let mut reader = PatchReader::new(patch.as_ref())?.max_block_size(4);
///
/// assert_eq!(reader.headers().get("a"), Some("5"));
/// assert_eq!(reader.next().transpose()?.map(|r| r.payload), Some(Payload::Len(3)));
/// assert_eq!(reader.next().transpose()?.map(|r| r.payload), Some(Payload::Data(b"hell".to_vec())));
/// assert_eq!(reader.next().transpose()?.map(|r| r.payload), Some(Payload::Data(b"o".to_vec())));
/// assert!(reader.next().is_none());
/// # Ok(())
/// # }
/// ```
pub struct PatchReader<R>
where
    R: Read,
{
    patch: BufReader<R>,
    headers: Headers,
    max_block_size: usize,
    state: ReaderState,
}

enum ReaderState {
    AtNextAction,
    Payload {
        action: Action,
        tags: Tags,
        remaining: u64,
    },
    Done,
}

impl<R> PatchReader<R>
where
    R: Read,
{
    /// The default maximum size of a payload handed out in one record
    pub const DEFAULT_MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

    /// Creates a reader, consuming the magic line and the header block of `patch`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the header block fails or it is malformed. See
    /// [`read_headers()`] for details.
    pub fn new(patch: R) -> Result<Self, Error> {
        let mut patch = BufReader::new(patch);
        let headers = read_headers(&mut patch)?;

        Ok(Self::from_parts(patch, headers))
    }

    /// Creates a reader for a patch whose header block was already consumed with
    /// [`read_headers()`].
    ///
    /// Reading starts directly at the first record of `patch`.
    pub fn with_headers(patch: R, headers: Headers) -> Self {
        Self::from_parts(BufReader::new(patch), headers)
    }

    fn from_parts(patch: BufReader<R>, headers: Headers) -> Self {
        Self {
            patch,
            headers,
            max_block_size: Self::DEFAULT_MAX_BLOCK_SIZE,
            state: ReaderState::AtNextAction,
        }
    }

    /// Sets the maximum size of a payload handed out in one record.
    ///
    /// Larger payloads are split into consecutive records carrying the same action and tags. A
    /// value of 0 means payloads are never split, which requires memory for the largest payload in
    /// the patch.
    pub fn max_block_size(mut self, size: usize) -> Self {
        self.max_block_size = size;
        self
    }

    /// Returns the headers of the patch.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    fn read_action(&mut self) -> Result<Option<Record>, Error> {
        let mut line = Vec::new();
        while !line.ends_with(SEPARATOR) {
            let Some(byte) = read_byte(&mut self.patch)? else {
                if line.is_empty() {
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                return Err(FormatError::TruncatedAction.into());
            };
            line.push(byte);
            if line.len() > MAX_ACTION_SIZE {
                return Err(FormatError::ActionTooLarge.into());
            }
        }

        let line = ActionLine::parse(&line)?;
        if !line.has_payload() {
            return Ok(Some(Record {
                action: line.action,
                tags: line.tags,
                payload: Payload::Len(line.len),
            }));
        }

        self.state = ReaderState::Payload {
            action: line.action,
            tags: line.tags,
            remaining: line.len,
        };
        self.read_payload().map(Some)
    }

    fn read_payload(&mut self) -> Result<Record, Error> {
        let ReaderState::Payload {
            action,
            tags,
            remaining,
        } = &mut self.state
        else {
            unreachable!("payload is only read in the payload state");
        };

        let chunk_len = match self.max_block_size {
            0 => *remaining,
            max => (*remaining).min(max as u64),
        };
        // Grow the buffer as data arrives instead of trusting the declared length up front
        let mut data = Vec::new();
        (&mut self.patch).take(chunk_len).read_to_end(&mut data)?;
        if (data.len() as u64) < chunk_len {
            return Err(FormatError::TruncatedPayload.into());
        }
        *remaining -= chunk_len;

        let record = Record {
            action: *action,
            tags: tags.clone(),
            payload: Payload::Data(data),
        };

        if *remaining == 0 {
            let mut terminator = [0; SEPARATOR.len()];
            self.state = match read_full(&mut self.patch, &mut terminator)? {
                // A patch cut off right after its last payload is still complete
                0 => ReaderState::Done,
                n if terminator[..n] == *SEPARATOR => ReaderState::AtNextAction,
                _ => return Err(FormatError::BadTerminator.into()),
            };
        }

        Ok(record)
    }
}

impl<R> Iterator for PatchReader<R>
where
    R: Read,
{
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.state {
            ReaderState::Done => return None,
            ReaderState::AtNextAction => self.read_action(),
            ReaderState::Payload { .. } => self.read_payload().map(Some),
        };

        match result {
            Ok(Some(record)) => {
                tracing::trace!(action = %record.action, len = record.len(), "read patch record");
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => {
                self.state = ReaderState::Done;
                Some(Err(e))
            }
        }
    }
}
