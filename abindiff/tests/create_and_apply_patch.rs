// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use abindiff::{ApplyConfig, DiffConfig, HashAlgorithm};
use blake3::Hasher;

const OLD_FILE_NAME: &str = "firmware-1.0.bin";
const NEW_FILE_NAME: &str = "firmware-1.1.bin";

/// Deterministic filler so the test needs no fixtures
fn pseudo_random(len: usize, mut seed: u64) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 56) as u8
        })
        .collect()
}

/// Returns a scratch directory unique to `test`
fn workspace(test: &str) -> io::Result<PathBuf> {
    let dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join(test);
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Writes an old and a new file differing in a few scattered places, the new one shorter
fn write_inputs(dir: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let old = pseudo_random(300 * 1024, 1);
    let mut new = old.clone();
    new[5000..5100].copy_from_slice(&pseudo_random(100, 2));
    new[100_000..140_000].fill(0);
    new.truncate(250 * 1024 + 17);

    let old_path = dir.join(OLD_FILE_NAME);
    let new_path = dir.join(NEW_FILE_NAME);
    fs::write(&old_path, old)?;
    fs::write(&new_path, new)?;
    Ok((old_path, new_path))
}

fn file_hash(path: &Path) -> io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

#[test]
fn apply_and_revert_files() -> Result<(), Box<dyn Error>> {
    let dir = workspace("apply_and_revert_files")?;
    let (old_path, new_path) = write_inputs(&dir)?;
    let patch_path = dir.join("update.abindiff");

    // Create a patch file
    let mut config = DiffConfig::new();
    config.hashsums(HashAlgorithm::ALL);
    let stats = {
        let old = File::open(&old_path)?;
        let new = File::open(&new_path)?;
        let mut patch = File::create(&patch_path)?;
        abindiff::diff_with_config(old, new, &mut patch, &config)?
    };
    assert_eq!(stats.patch_size, fs::metadata(&patch_path)?.len());
    assert_eq!(stats.bytes_processed, 300 * 1024);
    assert!(stats.changed_blocks_count > 0);
    assert!(stats.changed_blocks_count < stats.blocks_count);

    // Reconstruct the new file from the old file and the patch file
    let rebuilt_new = dir.join("rebuilt-new.bin");
    {
        let old = File::open(&old_path)?;
        let patch = File::open(&patch_path)?;
        let mut new = File::create(&rebuilt_new)?;
        let stats = abindiff::apply(old, patch, &mut new, &ApplyConfig::new())?;
        assert_eq!(stats.hash_algorithm, Some(HashAlgorithm::Sha256));
    }
    assert_eq!(file_hash(&new_path)?, file_hash(&rebuilt_new)?);

    // Reconstruct the old file from the new file and the same patch file
    let rebuilt_old = dir.join("rebuilt-old.bin");
    {
        let new = File::open(&new_path)?;
        let patch = File::open(&patch_path)?;
        let mut old = File::create(&rebuilt_old)?;
        let mut config = ApplyConfig::new();
        config.revert(true);
        abindiff::apply(new, patch, &mut old, &config)?;
    }
    assert_eq!(file_hash(&old_path)?, file_hash(&rebuilt_old)?);

    Ok(())
}

#[test]
fn shrink_file_in_place() -> Result<(), Box<dyn Error>> {
    let dir = workspace("shrink_file_in_place")?;
    let (old_path, new_path) = write_inputs(&dir)?;
    let patch_path = dir.join("update.abindiff");

    {
        let old = File::open(&old_path)?;
        let new = File::open(&new_path)?;
        let mut patch = File::create(&patch_path)?;
        abindiff::diff(old, new, &mut patch)?;
    }

    let stats = {
        let mut file = OpenOptions::new().read(true).write(true).open(&old_path)?;
        let patch = File::open(&patch_path)?;
        abindiff::apply_in_place(&mut file, patch, &ApplyConfig::new())?
    };

    assert_eq!(stats.bytes_written, 250 * 1024 + 17);
    assert_eq!(fs::metadata(&old_path)?.len(), stats.bytes_written);
    assert_eq!(file_hash(&new_path)?, file_hash(&old_path)?);

    Ok(())
}

#[test]
fn skipped_removals_only_work_forwards() -> Result<(), Box<dyn Error>> {
    let dir = workspace("skipped_removals_only_work_forwards")?;
    let (old_path, new_path) = write_inputs(&dir)?;

    let mut full = Vec::new();
    let mut slim = Vec::new();
    abindiff::diff_with_config(
        File::open(&old_path)?,
        File::open(&new_path)?,
        &mut io::Cursor::new(&mut full),
        &DiffConfig::new(),
    )?;
    abindiff::diff_with_config(
        File::open(&old_path)?,
        File::open(&new_path)?,
        &mut io::Cursor::new(&mut slim),
        DiffConfig::new().skip_del(true),
    )?;
    assert!(slim.len() < full.len());

    let mut rebuilt = Vec::new();
    abindiff::apply(File::open(&old_path)?, slim.as_slice(), &mut rebuilt, &ApplyConfig::new())?;
    assert_eq!(rebuilt, fs::read(&new_path)?);

    let mut config = ApplyConfig::new();
    config.revert(true);
    let err = abindiff::apply(File::open(&new_path)?, slim.as_slice(), &mut io::sink(), &config)
        .unwrap_err();
    assert!(matches!(
        err,
        abindiff::Error::Unsupported(abindiff::Unsupported::NotRevertible),
    ));

    Ok(())
}
