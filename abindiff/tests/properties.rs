// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use std::io::Cursor;

use abindiff::{ApplyConfig, DiffConfig, HashAlgorithm, PatchReader};
use proptest::{prelude::*, test_runner::TestCaseError};

/// Pairs of inputs, mostly sharing content so that both equal and differing runs show up
fn file_pair() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    let related = (
        prop::collection::vec(any::<u8>(), 0..2048),
        prop::collection::vec((any::<prop::sample::Index>(), any::<u8>()), 0..16),
        0usize..2048,
    )
        .prop_map(|(old, edits, new_len)| {
            let mut new = old.clone();
            for (index, byte) in edits {
                if !new.is_empty() {
                    let i = index.index(new.len());
                    new[i] = byte;
                }
            }
            new.resize(new_len.min(old.len() + 64), 0xaa);
            (old, new)
        });
    let unrelated = (
        prop::collection::vec(any::<u8>(), 0..512),
        prop::collection::vec(any::<u8>(), 0..512),
    );
    prop_oneof![3 => related, 1 => unrelated]
}

fn make_patch(old: &[u8], new: &[u8], config: &DiffConfig) -> Result<Vec<u8>, TestCaseError> {
    let mut patch = Cursor::new(Vec::new());
    abindiff::diff_with_config(old, new, &mut patch, config)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    Ok(patch.into_inner())
}

fn run_apply(source: &[u8], patch: &[u8], config: &ApplyConfig) -> Result<Vec<u8>, TestCaseError> {
    let mut out = Vec::new();
    abindiff::apply(source, patch, &mut out, config)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    Ok(out)
}

proptest! {
    /// Applying a patch to the old input always yields the new input
    #[test]
    fn apply_reconstructs_new(
        (old, new) in file_pair(),
        block_size in 1usize..64,
        skip_del in any::<bool>(),
    ) {
        let mut config = DiffConfig::new();
        config.block_size_in(block_size).skip_del(skip_del).hashsums(HashAlgorithm::ALL);
        let patch = make_patch(&old, &new, &config)?;

        prop_assert_eq!(run_apply(&old, &patch, &ApplyConfig::new())?, new);
    }

    /// Reverting a patch with stored removals always yields the old input
    #[test]
    fn revert_reconstructs_old(
        (old, new) in file_pair(),
        block_size in 1usize..64,
    ) {
        let mut config = DiffConfig::new();
        config.block_size_in(block_size);
        let patch = make_patch(&old, &new, &config)?;

        let mut revert = ApplyConfig::new();
        revert.revert(true);
        prop_assert_eq!(run_apply(&new, &patch, &revert)?, old);
    }

    /// Splitting stored payloads while reading never changes the result
    #[test]
    fn max_block_size_is_transparent(
        (old, new) in file_pair(),
        max_block_size in 1usize..32,
    ) {
        let mut config = DiffConfig::new();
        config.block_size_in(16);
        let patch = make_patch(&old, &new, &config)?;

        let mut apply = ApplyConfig::new();
        apply.max_block_size(max_block_size);
        prop_assert_eq!(run_apply(&old, &patch, &apply)?, new.clone());

        let records = PatchReader::new(patch.as_slice())
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .max_block_size(max_block_size)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        for record in records {
            if let Some(data) = record.payload.data() {
                prop_assert!(data.len() <= max_block_size, "payload piece exceeds the limit");
            }
        }
    }

    /// No record exceeds the output block size
    #[test]
    fn records_respect_block_size_out(
        (old, new) in file_pair(),
        block_size_in in 1usize..32,
        block_size_out in 1usize..128,
    ) {
        let mut config = DiffConfig::new();
        config.block_size_in(block_size_in).block_size_out(block_size_out).hashsums([]);
        let patch = make_patch(&old, &new, &config)?;

        let reader = PatchReader::new(patch.as_slice())
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .max_block_size(0);
        for record in reader {
            let record = record.map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert!(record.len() <= block_size_out as u64, "record exceeds block_size_out");
        }
    }
}
