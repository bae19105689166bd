// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::Sha256;

use crate::error::Unsupported;

/// A whole-file hash algorithm that can be recorded in patch headers.
///
/// The header keys for an algorithm are `1-<name>` for the old file and `2-<name>` for the new
/// file, e.g., `1-sha256sum`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum HashAlgorithm {
    /// MD5, named `md5sum`
    Md5,
    /// SHA-1, named `sha1sum`
    Sha1,
    /// SHA-256, named `sha256sum`
    Sha256,
}

impl HashAlgorithm {
    /// Every supported algorithm
    pub const ALL: [HashAlgorithm; 3] = [HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256];

    /// The order in which algorithms are preferred when verifying a patch, strongest first
    pub const VERIFY_PRIORITY: [HashAlgorithm; 3] =
        [HashAlgorithm::Sha256, HashAlgorithm::Sha1, HashAlgorithm::Md5];

    /// Returns the name used in header keys and on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5sum",
            HashAlgorithm::Sha1 => "sha1sum",
            HashAlgorithm::Sha256 => "sha256sum",
        }
    }

    /// Returns the length of a hex digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        let output_size = match self {
            HashAlgorithm::Md5 => <Md5 as Digest>::output_size(),
            HashAlgorithm::Sha1 => <Sha1 as Digest>::output_size(),
            HashAlgorithm::Sha256 => <Sha256 as Digest>::output_size(),
        };
        output_size * 2
    }

    /// Returns the header key holding this algorithm's digest of the old file.
    pub fn old_key(self) -> String {
        format!("1-{}", self.name())
    }

    /// Returns the header key holding this algorithm's digest of the new file.
    pub fn new_key(self) -> String {
        format!("2-{}", self.name())
    }

    /// Parses a list of algorithm names, rejecting the whole list if any name is unknown.
    ///
    /// Names are trimmed and lower-cased, and blank names are ignored, so `"sha256sum, MD5SUM,"`
    /// is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported::UnknownHashAlgorithm`] for the first unknown name.
    pub fn parse_list<'a, I>(names: I) -> Result<Vec<HashAlgorithm>, Unsupported>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names
            .into_iter()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Unsupported;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name() == lower)
            .ok_or_else(|| Unsupported::UnknownHashAlgorithm(s.to_owned()))
    }
}

/// A streaming hasher for one [`HashAlgorithm`].
#[derive(Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: State,
}

#[derive(Clone)]
enum State {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    /// Creates a hasher with an empty state.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Md5 => State::Md5(Md5::new()),
            HashAlgorithm::Sha1 => State::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
        };
        Self { algorithm, state }
    }

    /// Returns the algorithm of this hasher.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feeds `data` into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Md5(h) => h.update(data),
            State::Sha1(h) => h.update(data),
            State::Sha256(h) => h.update(data),
        }
    }

    /// Returns the lower-case hex digest of everything fed so far.
    ///
    /// The hasher stays usable afterwards.
    pub fn hex_digest(&self) -> String {
        match &self.state {
            State::Md5(h) => hex::encode(h.clone().finalize()),
            State::Sha1(h) => hex::encode(h.clone().finalize()),
            State::Sha256(h) => hex::encode(h.clone().finalize()),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
