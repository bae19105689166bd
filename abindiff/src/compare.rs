// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Read};

use crate::io_util::read_full;

/// Whether two blocks read in lockstep matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BlockAction {
    Equal,
    Differ,
}

/// A pair of blocks read at the same offset of both streams.
///
/// Either side is shorter than the block size only at the end of its stream, and empty once that
/// stream is exhausted.
#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) action: BlockAction,
    pub(crate) old: Vec<u8>,
    pub(crate) new: Vec<u8>,
}

impl Block {
    /// Returns the number of bytes this block covers in the longer stream.
    pub(crate) fn span(&self) -> usize {
        self.old.len().max(self.new.len())
    }
}

/// Reads fixed-size blocks from two streams in lockstep until both are exhausted.
pub(crate) struct Blocks<A, B>
where
    A: Read,
    B: Read,
{
    old: A,
    new: B,
    block_size: usize,
    done: bool,
}

impl<A, B> Blocks<A, B>
where
    A: Read,
    B: Read,
{
    pub(crate) fn new(old: A, new: B, block_size: usize) -> Self {
        Self {
            old,
            new,
            block_size,
            done: false,
        }
    }

    fn read_pair(&mut self) -> io::Result<Option<Block>> {
        let mut old = vec![0; self.block_size];
        let old_len = read_full(&mut self.old, &mut old)?;
        old.truncate(old_len);

        let mut new = vec![0; self.block_size];
        let new_len = read_full(&mut self.new, &mut new)?;
        new.truncate(new_len);

        if old.is_empty() && new.is_empty() {
            return Ok(None);
        }

        let action = if old == new {
            BlockAction::Equal
        } else {
            BlockAction::Differ
        };
        Ok(Some(Block { action, old, new }))
    }
}

impl<A, B> Iterator for Blocks<A, B>
where
    A: Read,
    B: Read,
{
    type Item = io::Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.read_pair().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(old: &[u8], new: &[u8], block_size: usize) -> Vec<(BlockAction, Vec<u8>, Vec<u8>)> {
        Blocks::new(old, new, block_size)
            .map(|block| {
                let block = block.unwrap();
                (block.action, block.old, block.new)
            })
            .collect()
    }

    #[test]
    fn compares_in_lockstep() {
        assert_eq!(
            blocks(b"foobar", b"foObar", 2),
            [
                (BlockAction::Equal, b"fo".to_vec(), b"fo".to_vec()),
                (BlockAction::Differ, b"ob".to_vec(), b"Ob".to_vec()),
                (BlockAction::Equal, b"ar".to_vec(), b"ar".to_vec()),
            ],
        );
    }

    #[test]
    fn shorter_stream_yields_empty_blocks() {
        assert_eq!(
            blocks(b"abc", b"abcdefg", 3),
            [
                (BlockAction::Equal, b"abc".to_vec(), b"abc".to_vec()),
                (BlockAction::Differ, Vec::new(), b"def".to_vec()),
                (BlockAction::Differ, Vec::new(), b"g".to_vec()),
            ],
        );
        assert_eq!(
            blocks(b"abcd", b"", 3),
            [
                (BlockAction::Differ, b"abc".to_vec(), Vec::new()),
                (BlockAction::Differ, b"d".to_vec(), Vec::new()),
            ],
        );
    }

    #[test]
    fn empty_streams_yield_nothing() {
        assert!(blocks(b"", b"", 4).is_empty());
    }

    #[test]
    fn propagates_read_errors() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("broken"))
            }
        }

        let mut iter = Blocks::new(Broken, &b"abc"[..], 2);
        assert!(matches!(iter.next(), Some(Err(_))));
        assert!(iter.next().is_none());
    }
}
