// Copyright 2024 Logan Magee
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    io::{self, Write},
};

use crate::error::FormatError;

/// The separator following every action line and every payload.
pub(crate) const SEPARATOR: &[u8] = b"\n\n";

/// The type of a patch record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    /// `=`: the span is identical in both files
    Equal,
    /// `-`: the span exists only in the old file
    Remove,
    /// `+`: the span exists only in the new file
    Add,
}

impl Action {
    /// Returns the character denoting this action on the wire.
    pub const fn symbol(self) -> char {
        match self {
            Action::Equal => '=',
            Action::Remove => '-',
            Action::Add => '+',
        }
    }

    /// Returns the action with old and new swapped, as seen when reverting a patch.
    pub const fn reverse(self) -> Self {
        match self {
            Action::Equal => Action::Equal,
            Action::Remove => Action::Add,
            Action::Add => Action::Remove,
        }
    }

    fn from_symbol(s: &str) -> Result<Self, FormatError> {
        match s {
            "=" => Ok(Action::Equal),
            "-" => Ok(Action::Remove),
            "+" => Ok(Action::Add),
            _ => Err(FormatError::UnknownAction(s.to_owned())),
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Extension tags attached to a record, e.g. `skip=1`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// The tag marking a `-` record whose payload was left out of the patch.
    pub const SKIP: &'static str = "skip";

    /// Creates an empty tag set.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates the tag set of a `-` record without payload.
    pub fn skip() -> Self {
        let mut tags = Self::new();
        tags.insert(Self::SKIP, "1");
        tags
    }

    /// Sets tag `key` to `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the value of tag `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns `true` if the record carries `skip=1`.
    pub fn is_skip(&self) -> bool {
        self.get(Self::SKIP) == Some("1")
    }

    /// Returns `true` if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn parse(raw: &str) -> Result<Self, FormatError> {
        let mut tags = Self::new();
        for fragment in raw.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let (k, v) = fragment
                .split_once('=')
                .ok_or_else(|| FormatError::MalformedTag(fragment.to_owned()))?;
            tags.insert(k, v);
        }
        Ok(tags)
    }
}

impl Display for Tags {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for Tags
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// What a record carries besides its type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Payload {
    /// Only a length: `=` records and `-` records tagged `skip=1`
    Len(u64),
    /// Bytes read from the patch, possibly one piece of a larger record
    Data(Vec<u8>),
}

impl Payload {
    /// Returns the number of bytes this payload stands for.
    pub fn len(&self) -> u64 {
        match self {
            Payload::Len(len) => *len,
            Payload::Data(data) => data.len() as u64,
        }
    }

    /// Returns `true` if this payload stands for no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored bytes, if the patch carries them.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Payload::Len(_) => None,
            Payload::Data(data) => Some(data),
        }
    }
}

/// A single record read from a patch.
///
/// A record whose payload is larger than the reader's maximum block size is handed out as several
/// consecutive `Record`s with the same action and tags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    /// The record type as written in the patch
    pub action: Action,
    /// The record's extension tags
    pub tags: Tags,
    /// The record's length or bytes
    pub payload: Payload,
}

impl Record {
    /// Returns the number of bytes this record stands for.
    pub fn len(&self) -> u64 {
        self.payload.len()
    }

    /// Returns `true` if this record stands for no bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// The parsed form of an action line.
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct ActionLine {
    pub(crate) action: Action,
    pub(crate) len: u64,
    pub(crate) tags: Tags,
}

impl ActionLine {
    /// Returns `true` if payload bytes follow this action line on the wire.
    pub(crate) fn has_payload(&self) -> bool {
        match self.action {
            Action::Equal => false,
            Action::Remove => !self.tags.is_skip(),
            Action::Add => true,
        }
    }

    /// Parses an action line such as `- 15 skip=1\n\n`.
    pub(crate) fn parse(line: &[u8]) -> Result<Self, FormatError> {
        let line = std::str::from_utf8(line.trim_ascii_end())
            .map_err(|_| FormatError::MalformedAction)?;
        let (action, rest) = line.split_once(' ').ok_or(FormatError::MalformedAction)?;
        let (len, raw_tags) = rest.split_once(' ').unwrap_or((rest, ""));

        let action = Action::from_symbol(action)?;
        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FormatError::BadLength(len.to_owned()));
        }
        let len = len
            .parse()
            .map_err(|_| FormatError::BadLength(len.to_owned()))?;
        let tags = Tags::parse(raw_tags)?;

        Ok(Self { action, len, tags })
    }

    /// Writes the action line, returning the number of bytes written.
    pub(crate) fn write<W>(&self, w: &mut W) -> io::Result<u64>
    where
        W: Write + ?Sized,
    {
        let line = if self.tags.is_empty() {
            format!("{} {}\n\n", self.action, self.len)
        } else {
            format!("{} {} {}\n\n", self.action, self.len, self.tags)
        };
        w.write_all(line.as_bytes())?;
        Ok(line.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_line() {
        assert_eq!(
            ActionLine::parse(b"= 3\n\n"),
            Ok(ActionLine {
                action: Action::Equal,
                len: 3,
                tags: Tags::new(),
            }),
        );
    }

    #[test]
    fn parses_tags() {
        let line = ActionLine::parse(b"- 2 foo=bar;baz=baq;  ; ;e=f\n\n").unwrap();
        assert_eq!(
            line.tags,
            Tags::from_iter([("foo", "bar"), ("baz", "baq"), ("e", "f")]),
        );
        assert!(line.has_payload());

        let line = ActionLine::parse(b"+ 5 ;;;;;\n\n").unwrap();
        assert!(line.tags.is_empty());
    }

    #[test]
    fn skip_has_no_payload() {
        let line = ActionLine::parse(b"- 3 skip=1\n\n").unwrap();
        assert!(line.tags.is_skip());
        assert!(!line.has_payload());
        assert!(ActionLine::parse(b"+ 3 skip=1\n\n").unwrap().has_payload());
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(ActionLine::parse(b"=3\n\n"), Err(FormatError::MalformedAction));
        assert_eq!(
            ActionLine::parse(b"* 3\n\n"),
            Err(FormatError::UnknownAction("*".to_owned())),
        );
        assert_eq!(
            ActionLine::parse(b"= -3\n\n"),
            Err(FormatError::BadLength("-3".to_owned())),
        );
        assert_eq!(
            ActionLine::parse(b"= 99999999999999999999999\n\n"),
            Err(FormatError::BadLength("99999999999999999999999".to_owned())),
        );
        assert_eq!(
            ActionLine::parse(b"- 3 skip\n\n"),
            Err(FormatError::MalformedTag("skip".to_owned())),
        );
    }

    #[test]
    fn writes_lines() {
        let mut out = Vec::new();
        ActionLine {
            action: Action::Remove,
            len: 1,
            tags: Tags::skip(),
        }
        .write(&mut out)
        .unwrap();
        ActionLine {
            action: Action::Add,
            len: 12,
            tags: Tags::new(),
        }
        .write(&mut out)
        .unwrap();

        assert_eq!(out, b"- 1 skip=1\n\n+ 12\n\n");
    }

    #[test]
    fn reverse_swaps_sides() {
        assert_eq!(Action::Equal.reverse(), Action::Equal);
        assert_eq!(Action::Add.reverse(), Action::Remove);
        assert_eq!(Action::Remove.reverse(), Action::Add);
    }
}
