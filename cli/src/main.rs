// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use abindiff::{AppendOnly, ApplyConfig, DiffConfig, HashCheck, Headers, PatchReader};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Block-aligned binary diff and patch
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Log more details (repeat for even more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a patch turning OLD into NEW
    Diff {
        /// Digests of both files to record, comma separated (md5sum, sha1sum, sha256sum)
        #[arg(short = 'H', long = "hash", default_value = "sha256sum")]
        hash: String,
        /// Don't store removed data, making the patch smaller but irreversible
        #[arg(short = 'd', long)]
        skip_del: bool,
        /// Size of the compared blocks in bytes
        #[arg(short, long, default_value_t = DiffConfig::DEFAULT_BLOCK_SIZE_IN)]
        block_size: usize,
        /// Treat a missing OLD file as empty
        #[arg(short = 'e', long)]
        allow_empty: bool,
        /// Extra metadata to store in the patch header
        #[arg(short, long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
        meta: Vec<(String, String)>,
        old: PathBuf,
        new: PathBuf,
        /// Patch file to create, or `-` for standard output
        patch: PathBuf,
    },
    /// Apply a patch to INPUT, writing the result to OUTPUT
    Patch {
        /// Revert the patch, recreating the old file from the new one
        #[arg(short = 'R', long, visible_alias = "reverse")]
        revert: bool,
        /// Don't verify the digests stored in the patch
        #[arg(long)]
        no_hash: bool,
        /// Treat a missing INPUT file as empty
        #[arg(short = 'e', long)]
        allow_empty: bool,
        /// Patch INPUT itself instead of writing OUTPUT
        #[arg(short, long)]
        in_place: bool,
        patch: PathBuf,
        input: PathBuf,
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Diff {
            hash,
            skip_del,
            block_size,
            allow_empty,
            meta,
            old,
            new,
            patch,
        } => {
            let mut config = DiffConfig::new();
            config
                .block_size_in(block_size)
                .skip_del(skip_del)
                .meta(meta.into_iter().collect::<Headers>())
                .hashsum_names(hash.split(',').map(str::trim).filter(|name| !name.is_empty()))
                .context("Invalid hash list")?;
            diff_files(&old, &new, &patch, allow_empty, &config)?;
        }
        Command::Patch {
            revert,
            no_hash,
            allow_empty,
            in_place,
            patch,
            input,
            output,
        } => {
            let mut config = ApplyConfig::new();
            config.revert(revert);
            if no_hash {
                config.check_hashsum(HashCheck::Skip);
            }
            patch_files(&patch, &input, output.as_deref(), in_place, allow_empty, &config)?;
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_meta(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value))
            if !key.is_empty() && !key.contains([':', '\n']) && !value.contains('\n') =>
        {
            Ok((key.to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn diff_files(
    old: &Path,
    new: &Path,
    patch: &Path,
    allow_empty: bool,
    config: &DiffConfig,
) -> anyhow::Result<()> {
    let old_len = match fs::metadata(old) {
        Ok(metadata) => Some(metadata.len()),
        Err(e) if allow_empty && e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read metadata of old file '{}'", old.display()));
        }
    };

    let new_file = File::open(new)
        .with_context(|| format!("Failed to open new file '{}'", new.display()))?;
    let new_len = new_file
        .metadata()
        .with_context(|| format!("Failed to read metadata of new file '{}'", new.display()))?
        .len();

    let to_stdout = patch == Path::new("-");
    if to_stdout && !config.get_hashsums().is_empty() {
        bail!("Digests can't be written to standard output, disable them with -H ''");
    }

    let result = if allow_empty && old_len.is_none_or(|len| len == 0) {
        tracing::info!("old file is empty, storing the new file as a whole");
        if to_stdout {
            let mut out = AppendOnly(BufWriter::new(io::stdout().lock()));
            abindiff::diff_from_empty(new_file, new_len, &mut out, config)
        } else {
            let mut out = create_patch(patch)?;
            abindiff::diff_from_empty(new_file, new_len, &mut out, config)
        }
    } else {
        let old_file = File::open(old)
            .with_context(|| format!("Failed to open old file '{}'", old.display()))?;
        if to_stdout {
            let mut out = AppendOnly(BufWriter::new(io::stdout().lock()));
            abindiff::diff_with_config(old_file, new_file, &mut out, config)
        } else {
            let mut out = create_patch(patch)?;
            abindiff::diff_with_config(old_file, new_file, &mut out, config)
        }
    };
    let stats = result.context("Failed to generate patch")?;

    tracing::info!(
        patch_size = stats.patch_size,
        blocks = stats.blocks_count,
        changed_blocks = stats.changed_blocks_count,
        "patch created",
    );
    for (algorithm, digest) in &stats.hashsums_new {
        tracing::info!(%algorithm, %digest, "new file digest");
    }

    Ok(())
}

fn create_patch(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create patch file '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

fn patch_files(
    patch: &Path,
    input: &Path,
    output: Option<&Path>,
    in_place: bool,
    allow_empty: bool,
    config: &ApplyConfig,
) -> anyhow::Result<()> {
    let mut patch_file = File::open(patch)
        .with_context(|| format!("Failed to open patch file '{}'", patch.display()))?;
    // Fail on a malformed patch before touching any output
    let headers = abindiff::read_headers(&mut patch_file).context("Failed to read patch header")?;
    let reader = PatchReader::with_headers(patch_file, headers);

    let output = match output {
        Some(output) if !in_place && !same_file(input, output)? => output,
        Some(_) => input,
        None if in_place => input,
        None => bail!("Set an output file or use --in-place"),
    };

    if output == input {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(input)
            .with_context(|| format!("Failed to open input file '{}'", input.display()))?;
        let stats = abindiff::apply_in_place_reader(&mut file, reader, config)
            .context("Failed to apply patch in place")?;
        tracing::info!(bytes_written = stats.bytes_written, "patched in place");
        return Ok(());
    }

    let source: Box<dyn io::Read> = match File::open(input) {
        Ok(file) => Box::new(file),
        Err(e) if allow_empty && e.kind() == io::ErrorKind::NotFound => Box::new(io::empty()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to open input file '{}'", input.display()));
        }
    };

    let out_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(output)
        .with_context(|| format!("Failed to create output file '{}'", output.display()))?;
    let mut out = BufWriter::new(out_file);

    let result = abindiff::apply_reader(source, reader, &mut out, config)
        .context("Failed to apply patch")
        .and_then(|stats| {
            out.flush().context("Failed to write output file")?;
            Ok(stats)
        });
    match result {
        Ok(stats) => {
            tracing::info!(bytes_written = stats.bytes_written, "patch applied");
            Ok(())
        }
        Err(e) => {
            drop(out);
            if let Err(remove_err) = fs::remove_file(output) {
                tracing::warn!(%remove_err, "failed to remove partial output");
            }
            Err(e)
        }
    }
}

fn same_file(a: &Path, b: &Path) -> anyhow::Result<bool> {
    if a == b {
        return Ok(true);
    }
    if !b.exists() {
        return Ok(false);
    }
    let a = fs::canonicalize(a).with_context(|| format!("Failed to resolve '{}'", a.display()))?;
    let b = fs::canonicalize(b).with_context(|| format!("Failed to resolve '{}'", b.display()))?;
    Ok(a == b)
}
