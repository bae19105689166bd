// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{Error, IntegrityError, Side, Unsupported},
    hash::{HashAlgorithm, Hasher},
    header::Headers,
    record::{Action, Record},
};

/// Whether to verify the whole-file digests declared in a patch.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum HashCheck {
    /// Verify when the patch declares a digest pair, silently skip otherwise
    #[default]
    Auto,
    /// Always verify, failing if the patch declares no usable digest pair
    Force,
    /// Never verify
    Skip,
}

/// Running digests of both files, checked against the patch headers at the end.
#[derive(Debug)]
pub(crate) struct Verifier {
    old: Hasher,
    new: Hasher,
    expected_old: String,
    expected_new: String,
}

impl Verifier {
    /// Picks the strongest algorithm declared for both files in `headers`.
    ///
    /// Returns `None` if verification is skipped, or if it is optional and no pair is declared.
    pub(crate) fn select(headers: &Headers, check: HashCheck) -> Result<Option<Self>, Error> {
        if check == HashCheck::Skip {
            return Ok(None);
        }

        let selected = HashAlgorithm::VERIFY_PRIORITY.into_iter().find_map(|algorithm| {
            let old = headers.get(&algorithm.old_key())?;
            let new = headers.get(&algorithm.new_key())?;
            Some((algorithm, old, new))
        });

        match selected {
            Some((algorithm, old, new)) => {
                tracing::debug!(%algorithm, "verifying patch digests");
                Ok(Some(Self {
                    old: Hasher::new(algorithm),
                    new: Hasher::new(algorithm),
                    expected_old: old.to_ascii_lowercase(),
                    expected_new: new.to_ascii_lowercase(),
                }))
            }
            None if check == HashCheck::Force => Err(Unsupported::MissingHashsums.into()),
            None => Ok(None),
        }
    }

    pub(crate) fn algorithm(&self) -> HashAlgorithm {
        self.old.algorithm()
    }

    /// Feeds `data` into the digest of `side`.
    pub(crate) fn update(&mut self, side: Side, data: &[u8]) {
        match side {
            Side::Old => self.old.update(data),
            _ => self.new.update(data),
        }
    }

    /// Compares the digest of `side` with the declared one, returning the computed digest.
    ///
    /// A mismatch is reported as concerning `reported`.
    pub(crate) fn verify(&self, side: Side, reported: Side) -> Result<String, IntegrityError> {
        let (hasher, expected) = match side {
            Side::Old => (&self.old, &self.expected_old),
            _ => (&self.new, &self.expected_new),
        };

        let actual = hasher.hex_digest();
        if actual != *expected {
            return Err(IntegrityError::HashMismatch {
                side: reported,
                algorithm: hasher.algorithm(),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(actual)
    }
}

/// Returns the action to perform for `record`, swapping old and new when reverting.
///
/// # Errors
///
/// Returns [`Unsupported::NotRevertible`] when reverting a record tagged `skip=1`, since nothing
/// was stored that could be added back.
pub(crate) fn logical_action(record: &Record, revert: bool) -> Result<Action, Unsupported> {
    if !revert || record.action == Action::Equal {
        return Ok(record.action);
    }
    if record.tags.is_skip() {
        return Err(Unsupported::NotRevertible);
    }
    Ok(record.action.reverse())
}

/// Returns the file a record's bytes truly belong to, regardless of reverting.
pub(crate) fn real_side(action: Action) -> Side {
    match action {
        Action::Add => Side::New,
        _ => Side::Old,
    }
}
