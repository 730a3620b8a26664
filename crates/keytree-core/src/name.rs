//! The key-name codec.
//!
//! A key name exists in two forms at once:
//!
//! - the *escaped canonical* form, a human-readable path like
//!   `user/sw/app/my\.key` with `/` separating parts and `\` escaping;
//! - the *unescaped* form, the same path as NUL-terminated raw segments
//!   (`user\0sw\0app\0my.key\0`), whose plain byte order is the
//!   hierarchical order every key set sorts by.
//!
//! The two are bijective: [`escape_part`] and [`unescape_part`] are exact
//! inverses on canonical names, and re-canonicalising a canonical name is a
//! no-op. Cascading names start with `/`; their unescaped form uses a lone
//! `/` segment, which sorts before every concrete namespace token.
//!
//! # Escape rules
//!
//! - `\` escapes exactly the bytes `\`, `/`, `.` and `%`.
//! - An escaped `/` does not introduce a new part; an even run of `\`
//!   before `/` leaves the separator active.
//! - A part that is a bare `.` is elided; a bare `..` removes the previous
//!   part. `\.` and `\..` are the literal parts.
//! - A bare `%` is the empty part; `\%` is a part starting with `%`.
//! - A stray `\` is accepted only as the very last byte of the input and
//!   canonicalises to `\\`.

use std::cmp::Ordering;
use std::fmt;

use keytree_error::{KeyTreeError, Result};
use keytree_types::limits::MAX_NAME_SIZE;
use keytree_types::Namespace;

/// Byte terminating each unescaped segment.
const SEGMENT_TERMINATOR: u8 = 0;

/// A validated, canonical key name with both representations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyName {
    escaped: String,
    unescaped: Vec<u8>,
}

impl KeyName {
    /// The empty name: namespace `empty`, escaped size 1 (the lone NUL),
    /// unescaped size 0.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse and canonicalise a full key name.
    ///
    /// Accepts cascading names (`/app/x`) and rooted names
    /// (`system/hosts`, `user:alice/sw`). A `user:owner` prefix is split
    /// off and returned separately; the canonical name never carries the
    /// owner. Meta names (no recognised root) are rejected here, see
    /// [`KeyName::parse_meta`].
    pub fn parse(input: &str) -> Result<(Self, Option<String>)> {
        if input.is_empty() {
            return Ok((Self::empty(), None));
        }
        validate_escaped(input)?;

        match Namespace::classify(input) {
            Namespace::Cascading => {
                let parts = canonical_parts(one_level(&input[1..]), Vec::new(), true)?;
                Ok((Self::build_cascading(parts)?, None))
            }
            Namespace::User => {
                let mut levels = one_level(input);
                let first = levels.next().unwrap_or_default();
                let owner = first
                    .strip_prefix("user:")
                    .filter(|o| !o.is_empty())
                    .map(str::to_owned);
                let parts = canonical_parts(levels, Vec::new(), false)?;
                Ok((Self::build_rooted("user", parts)?, owner))
            }
            ns @ (Namespace::Spec
            | Namespace::Proc
            | Namespace::Dir
            | Namespace::System
            | Namespace::Default) => {
                let rest = &input[ns.token().len()..];
                let parts = canonical_parts(one_level(rest), Vec::new(), false)?;
                Ok((Self::build_rooted(ns.token(), parts)?, None))
            }
            _ => Err(KeyTreeError::invalid_name(input, "unknown namespace")),
        }
    }

    /// Parse and canonicalise an unrooted meta name (`owner`,
    /// `check/validation`, `warnings/#00/reason`).
    pub fn parse_meta(input: &str) -> Result<Self> {
        validate_escaped(input)?;
        let mut levels = one_level(input);
        let Some(first) = levels.next() else {
            return Err(KeyTreeError::invalid_name(input, "empty meta name"));
        };
        if first == "." || first == ".." {
            return Err(KeyTreeError::invalid_name(input, "meta name has no root"));
        }
        let root = normalize_part(first);
        let parts = canonical_parts(levels, Vec::new(), false)?;
        Self::build_rooted(&root, parts)
    }

    /// The escaped canonical form. `""` for the empty name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.escaped
    }

    /// The unescaped form: NUL-terminated segments, the first being the
    /// namespace token (a lone `/` for cascading names).
    #[must_use]
    pub fn unescaped(&self) -> &[u8] {
        &self.unescaped
    }

    /// Bytes needed to store the escaped name including its terminating
    /// NUL; 1 for the empty name.
    #[must_use]
    pub fn name_size(&self) -> usize {
        self.escaped.len() + 1
    }

    /// Length of the unescaped form in bytes; 0 for the empty name.
    #[must_use]
    pub fn unescaped_size(&self) -> usize {
        self.unescaped.len()
    }

    /// Whether this is the empty name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.escaped.is_empty()
    }

    /// The namespace of this name.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace::classify(&self.escaped)
    }

    /// Iterate the unescaped segments, namespace token first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let body = match self.unescaped.split_last() {
            Some((&SEGMENT_TERMINATOR, body)) => body,
            _ => &[],
        };
        let non_empty = !body.is_empty() || !self.unescaped.is_empty();
        body.split(|&b| b == SEGMENT_TERMINATOR)
            .filter(move |_| non_empty)
            .map(|seg| std::str::from_utf8(seg).map_or("", |s| s))
    }

    /// Iterate the escaped parts, one level at a time, escape-aware. The
    /// root token of a rooted name is the first part; the `/` of a
    /// cascading name yields no part of its own.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        one_level(&self.escaped)
    }

    /// The unescaped last segment, or `""` for root-only and empty names.
    #[must_use]
    pub fn base_name(&self) -> &str {
        let mut segs = self.segments();
        let Some(mut last) = segs.next() else {
            return "";
        };
        let mut count = 1;
        for seg in segs {
            last = seg;
            count += 1;
        }
        if count > 1 { last } else { "" }
    }

    /// Canonicalise `suffix` against this name, as if each part had been
    /// appended in turn. `.` is elided, `..` removes the previous part
    /// (clamped at the root for cascading names, one absorption at the
    /// root for rooted names, an error beyond that). The namespace cannot
    /// change. An empty or slashes-only suffix is a no-op.
    pub fn append(&self, suffix: &str) -> Result<Self> {
        if self.is_empty() {
            return Err(KeyTreeError::invalid_name(suffix, "key has no name"));
        }
        validate_escaped(suffix)?;
        let cascading = self.namespace() == Namespace::Cascading;
        let (root, parts) = self.decompose();
        let parts = canonical_parts(one_level(suffix), parts, cascading)?;
        match root {
            None => Self::build_cascading(parts),
            Some(root) => Self::build_rooted(&root, parts),
        }
    }

    /// Escape `base` as a single part and append it. Fails on the empty
    /// name.
    pub fn appending_base(&self, base: &str) -> Result<Self> {
        if self.is_empty() {
            return Err(KeyTreeError::invalid_name(base, "key has no name"));
        }
        let (root, mut parts) = self.decompose();
        parts.push(escape_part(base));
        match root {
            None => Self::build_cascading(parts),
            Some(root) => Self::build_rooted(&root, parts),
        }
    }

    /// Escape `base` as a single part and replace the last part with it.
    /// Fails on root-only and empty names.
    pub fn with_base(&self, base: &str) -> Result<Self> {
        let (root, mut parts) = self.decompose();
        if parts.is_empty() {
            return Err(KeyTreeError::invalid_name(
                &self.escaped,
                "name has no base name to replace",
            ));
        }
        if let Some(last) = parts.last_mut() {
            *last = escape_part(base);
        }
        match root {
            None => Self::build_cascading(parts),
            Some(root) => Self::build_rooted(&root, parts),
        }
    }

    /// Whether `other` lies strictly below this name in the hierarchy.
    ///
    /// True iff this unescaped name is a proper prefix of `other`'s; the
    /// NUL terminators make every byte prefix segment-aligned. Empty names
    /// are below nothing and have nothing below them.
    #[must_use]
    pub fn is_below(&self, other: &Self) -> bool {
        !self.unescaped.is_empty()
            && other.unescaped.len() > self.unescaped.len()
            && other.unescaped.starts_with(&self.unescaped)
    }

    /// Whether `other` is this name or lies below it.
    #[must_use]
    pub fn is_below_or_same(&self, other: &Self) -> bool {
        self.unescaped == other.unescaped || self.is_below(other)
    }

    /// Whether `other` is below this name with exactly one extra segment.
    #[must_use]
    pub fn is_directly_below(&self, other: &Self) -> bool {
        self.is_below(other) && segment_count(&other.unescaped) == segment_count(&self.unescaped) + 1
    }

    /// Resolve a cascading name into a concrete namespace, keeping the
    /// parts. Returns `None` for non-cascading names.
    #[must_use]
    pub fn resolved_in(&self, ns: Namespace) -> Option<Self> {
        if self.namespace() != Namespace::Cascading || !ns.is_concrete() {
            return None;
        }
        let escaped = if self.escaped == "/" {
            ns.token().to_owned()
        } else {
            format!("{}{}", ns.token(), self.escaped)
        };
        let mut unescaped = Vec::with_capacity(ns.token().len() + self.unescaped.len());
        unescaped.extend_from_slice(ns.token().as_bytes());
        unescaped.push(SEGMENT_TERMINATOR);
        unescaped.extend_from_slice(&self.unescaped[2..]);
        Some(Self { escaped, unescaped })
    }

    /// Split into root token and escaped parts below it. Cascading names
    /// report no root (all one-level parts are below the `/`).
    fn decompose(&self) -> (Option<String>, Vec<String>) {
        let mut parts: Vec<String> = one_level(&self.escaped).map(str::to_owned).collect();
        if self.namespace() == Namespace::Cascading {
            (None, parts)
        } else {
            let root = if parts.is_empty() {
                String::new()
            } else {
                parts.remove(0)
            };
            (Some(root), parts)
        }
    }

    fn build_cascading(parts: Vec<String>) -> Result<Self> {
        let escaped = if parts.is_empty() {
            "/".to_owned()
        } else {
            format!("/{}", parts.join("/"))
        };
        let mut unescaped = vec![b'/', SEGMENT_TERMINATOR];
        push_segments(&mut unescaped, &parts);
        Self::finish(escaped, unescaped)
    }

    fn build_rooted(root: &str, parts: Vec<String>) -> Result<Self> {
        let escaped = if parts.is_empty() {
            root.to_owned()
        } else {
            format!("{root}/{}", parts.join("/"))
        };
        let mut unescaped = Vec::with_capacity(escaped.len() + 2);
        unescaped.extend_from_slice(unescape_part(root).as_bytes());
        unescaped.push(SEGMENT_TERMINATOR);
        push_segments(&mut unescaped, &parts);
        Self::finish(escaped, unescaped)
    }

    fn finish(escaped: String, unescaped: Vec<u8>) -> Result<Self> {
        if escaped.len() + 1 > MAX_NAME_SIZE {
            return Err(KeyTreeError::invalid_argument("key name exceeds size limit"));
        }
        Ok(Self { escaped, unescaped })
    }
}

impl PartialOrd for KeyName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyName {
    /// Hierarchical order: plain byte comparison of the unescaped form.
    fn cmp(&self, other: &Self) -> Ordering {
        self.unescaped.cmp(&other.unescaped)
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.escaped)
    }
}

fn segment_count(unescaped: &[u8]) -> usize {
    unescaped
        .iter()
        .filter(|&&b| b == SEGMENT_TERMINATOR)
        .count()
}

fn push_segments(unescaped: &mut Vec<u8>, parts: &[String]) {
    for part in parts {
        unescaped.extend_from_slice(unescape_part(part).as_bytes());
        unescaped.push(SEGMENT_TERMINATOR);
    }
}

/// Validate the escape discipline of an escaped name or name fragment.
///
/// Rejects embedded NUL bytes and any `\` that does not introduce one of
/// the escapable bytes `\`, `/`, `.`, `%`. The exception is a single
/// stray `\` as the very last byte, which is accepted.
pub fn validate_escaped(input: &str) -> Result<()> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            0 => {
                return Err(KeyTreeError::invalid_name(
                    input.replace('\0', "\\0"),
                    "embedded NUL byte",
                ));
            }
            b'\\' => {
                if i + 1 == bytes.len() {
                    break; // trailing stray escape
                }
                if !matches!(bytes[i + 1], b'\\' | b'/' | b'.' | b'%') {
                    return Err(KeyTreeError::invalid_name(input, "unpaired escape"));
                }
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Whether `input` is a valid full key name: escape discipline holds and
/// the first segment is a recognised namespace. The empty name is valid.
#[must_use]
pub fn is_valid_name(input: &str) -> bool {
    if input.is_empty() {
        return true;
    }
    if validate_escaped(input).is_err() {
        return false;
    }
    !matches!(
        Namespace::classify(input),
        Namespace::Meta | Namespace::None
    )
}

/// Escape a raw string as a single key name part.
///
/// The empty part becomes `%`; `\`, `/` and `.` are backslash-escaped
/// everywhere; a leading `%` is escaped so the part is not mistaken for
/// the empty part. Idempotent composed with [`unescape_part`].
#[must_use]
pub fn escape_part(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_owned();
    }
    let mut out = String::with_capacity(raw.len() + 2);
    for (i, c) in raw.char_indices() {
        match c {
            '\\' | '/' | '.' => {
                out.push('\\');
                out.push(c);
            }
            '%' if i == 0 => {
                out.push('\\');
                out.push('%');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Unescape a single escaped part back to its raw string.
///
/// The exact `%` becomes the empty part; `\` before an escapable byte is
/// dropped; a stray trailing `\` stays literal.
#[must_use]
pub fn unescape_part(part: &str) -> String {
    if part == "%" {
        return String::new();
    }
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '\\' | '/' | '.' | '%') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Re-escape a part minimally: strip the escapes it has, re-apply the
/// canonical ones. Turns `my.key` into `my\.key` and leaves canonical
/// parts untouched.
fn normalize_part(part: &str) -> String {
    escape_part(&unescape_part(part))
}

/// Iterate the escaped parts of a name fragment, escape-aware.
///
/// Runs of separators collapse; an escaped `/` (odd backslash run before
/// it) does not split.
pub(crate) fn one_level(input: &str) -> Parts<'_> {
    Parts { rest: input }
}

pub(crate) struct Parts<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Parts<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start_matches('/');
        if s.is_empty() {
            self.rest = s;
            return None;
        }
        let bytes = s.as_bytes();
        let mut escaped = false;
        let mut end = bytes.len();
        for (i, &b) in bytes.iter().enumerate() {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'/' {
                end = i;
                break;
            }
        }
        let (token, rest) = s.split_at(end);
        self.rest = rest;
        Some(token)
    }
}

/// Fold one-level tokens into a canonical part list.
///
/// `.` is elided and `..` pops a part. With `clamp_at_root` (cascading
/// names) a `..` at the root is absorbed indefinitely; otherwise one
/// absorption is allowed (`system/..` stays `system`) and a second fails.
fn canonical_parts<'a>(
    tokens: impl Iterator<Item = &'a str>,
    initial: Vec<String>,
    clamp_at_root: bool,
) -> Result<Vec<String>> {
    let mut parts = initial;
    let mut floored = false;
    for token in tokens {
        match token {
            "." => {}
            ".." => {
                if parts.pop().is_none() && !clamp_at_root {
                    if floored {
                        return Err(KeyTreeError::invalid_name(
                            token,
                            "name escapes above its root",
                        ));
                    }
                    floored = true;
                }
            }
            other => parts.push(normalize_part(other)),
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> KeyName {
        KeyName::parse(input).expect("name should parse").0
    }

    #[test]
    fn empty_name_sizes() {
        let n = KeyName::empty();
        assert_eq!(n.as_str(), "");
        assert_eq!(n.name_size(), 1);
        assert_eq!(n.unescaped_size(), 0);
        assert_eq!(n.namespace(), Namespace::Empty);
        assert_eq!(n.base_name(), "");
    }

    #[test]
    fn cascading_root_is_canonical() {
        let n = parse("/");
        assert_eq!(n.as_str(), "/");
        assert_eq!(n.unescaped(), b"/\0");
        assert_eq!(n.namespace(), Namespace::Cascading);
    }

    #[test]
    fn canonicalisation_table() {
        assert_eq!(parse("/a//b").as_str(), "/a/b");
        assert_eq!(parse("/a/./b").as_str(), "/a/b");
        assert_eq!(parse("/a/../b").as_str(), "/b");
        assert_eq!(parse("/../a").as_str(), "/a");
        assert_eq!(parse("system/..").as_str(), "system");
        assert_eq!(parse("user/").as_str(), "user");
        assert_eq!(parse("user///sw/../sw//././MyApp").as_str(), "user/sw/MyApp");
    }

    #[test]
    fn dotdot_above_rooted_root_is_invalid() {
        assert!(matches!(
            KeyName::parse("system/../.."),
            Err(KeyTreeError::InvalidName { .. })
        ));
    }

    #[test]
    fn cascading_clamps_at_root() {
        assert_eq!(parse("/../../a").as_str(), "/a");
        assert_eq!(parse("/..").as_str(), "/");
    }

    #[test]
    fn unescaped_segments() {
        let n = parse("user/sw/app");
        assert_eq!(n.unescaped(), b"user\0sw\0app\0");
        assert_eq!(n.segments().collect::<Vec<_>>(), vec!["user", "sw", "app"]);
        assert_eq!(n.base_name(), "app");
    }

    #[test]
    fn unescaped_root_sizes_match_wire_format() {
        assert_eq!(parse("user").unescaped_size(), 5);
        assert_eq!(parse("system").unescaped_size(), 7);
        assert_eq!(parse("/").unescaped_size(), 2);
    }

    #[test]
    fn owner_is_split_off() {
        let (n, owner) = KeyName::parse("user:alice/sw").expect("name should parse");
        assert_eq!(n.as_str(), "user/sw");
        assert_eq!(owner.as_deref(), Some("alice"));

        let (n, owner) = KeyName::parse("user/sw").expect("name should parse");
        assert_eq!(n.as_str(), "user/sw");
        assert_eq!(owner, None);

        // An empty owner is no owner.
        let (_, owner) = KeyName::parse("user:/sw").expect("name should parse");
        assert_eq!(owner, None);
    }

    #[test]
    fn owner_only_for_user() {
        assert!(KeyName::parse("system:alice/x").is_err());
    }

    #[test]
    fn meta_names_are_rejected_by_parse() {
        assert!(KeyName::parse("owner").is_err());
        assert!(KeyName::parse("username/sw").is_err());
    }

    #[test]
    fn parse_meta_accepts_unrooted_names() {
        let n = KeyName::parse_meta("check/validation").expect("meta name should parse");
        assert_eq!(n.as_str(), "check/validation");
        assert_eq!(n.unescaped(), b"check\0validation\0");
        assert_eq!(n.namespace(), Namespace::Meta);
        assert_eq!(n.base_name(), "validation");

        let n = KeyName::parse_meta("owner").expect("meta name should parse");
        assert_eq!(n.base_name(), "");
    }

    #[test]
    fn escape_part_rules() {
        assert_eq!(escape_part(""), "%");
        assert_eq!(escape_part("."), "\\.");
        assert_eq!(escape_part(".."), "\\.\\.");
        assert_eq!(escape_part("%"), "\\%");
        assert_eq!(escape_part("%profile"), "\\%profile");
        assert_eq!(escape_part("a%b"), "a%b");
        assert_eq!(escape_part("my.key"), "my\\.key");
        assert_eq!(escape_part("a/b"), "a\\/b");
        assert_eq!(escape_part("a\\b"), "a\\\\b");
    }

    #[test]
    fn unescape_part_rules() {
        assert_eq!(unescape_part("%"), "");
        assert_eq!(unescape_part("\\%"), "%");
        assert_eq!(unescape_part("\\."), ".");
        assert_eq!(unescape_part("my\\.key"), "my.key");
        assert_eq!(unescape_part("a\\/b"), "a/b");
        assert_eq!(unescape_part("a\\\\b"), "a\\b");
        // Stray trailing escape stays literal.
        assert_eq!(unescape_part("abc\\"), "abc\\");
    }

    #[test]
    fn escape_unescape_roundtrip() {
        for raw in ["", ".", "..", "%", "a.b.c", "a/b\\c", "%x%", "plain"] {
            assert_eq!(unescape_part(&escape_part(raw)), raw, "raw part {raw:?}");
        }
    }

    #[test]
    fn trailing_stray_escape_is_accepted() {
        let n = parse("user/abc\\");
        assert_eq!(n.as_str(), "user/abc\\\\");
        assert_eq!(n.segments().collect::<Vec<_>>(), vec!["user", "abc\\"]);
    }

    #[test]
    fn unpaired_escape_is_rejected() {
        assert!(KeyName::parse("user/a\\b").is_err());
        assert!(validate_escaped("a\\b").is_err());
        assert!(validate_escaped("a\\").is_ok());
        assert!(validate_escaped("a\\\\b").is_ok());
    }

    #[test]
    fn embedded_nul_is_rejected() {
        assert!(KeyName::parse("user/a\0b").is_err());
    }

    #[test]
    fn parts_iterates_escaped_levels() {
        let n = parse("user/sw/my\\/key");
        assert_eq!(n.parts().collect::<Vec<_>>(), vec!["user", "sw", "my\\/key"]);
        assert_eq!(parse("/a/b").parts().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(parse("/").parts().next().is_none());
    }

    #[test]
    fn one_level_respects_escape_runs() {
        let toks: Vec<_> = one_level("a\\/b/c").collect();
        assert_eq!(toks, vec!["a\\/b", "c"]);

        // Even backslash run: the separator stays active.
        let toks: Vec<_> = one_level("a\\\\/b").collect();
        assert_eq!(toks, vec!["a\\\\", "b"]);

        // Odd run: separator escaped.
        let toks: Vec<_> = one_level("a\\\\\\/b").collect();
        assert_eq!(toks, vec!["a\\\\\\/b"]);

        let toks: Vec<_> = one_level("///x//y/").collect();
        assert_eq!(toks, vec!["x", "y"]);
    }

    #[test]
    fn mid_part_dots_are_normalized() {
        assert_eq!(parse("user/my.key").as_str(), "user/my\\.key");
        assert_eq!(parse("user/my\\.key").as_str(), "user/my\\.key");
    }

    #[test]
    fn empty_part_is_percent() {
        let n = parse("user/%/x");
        assert_eq!(n.as_str(), "user/%/x");
        assert_eq!(n.unescaped(), b"user\0\0x\0");
        assert_eq!(n.segments().collect::<Vec<_>>(), vec!["user", "", "x"]);
    }

    #[test]
    fn append_canonicalises() {
        let base = parse("user/sw");
        assert_eq!(base.append("app").expect("append").as_str(), "user/sw/app");
        assert_eq!(base.append("../other").expect("append").as_str(), "user/other");
        assert_eq!(base.append("//x/./y").expect("append").as_str(), "user/sw/x/y");
        // Empty and slashes-only suffixes are no-ops.
        assert_eq!(base.append("").expect("append").as_str(), "user/sw");
        assert_eq!(base.append("///").expect("append").as_str(), "user/sw");
    }

    #[test]
    fn append_does_not_change_namespace() {
        let base = parse("system/a");
        assert_eq!(
            base.append("user/x").expect("append").as_str(),
            "system/a/user/x"
        );
    }

    #[test]
    fn append_past_root() {
        let base = parse("system/a");
        assert_eq!(base.append("../..").expect("append").as_str(), "system");
        assert!(base.append("../../..").is_err());

        let casc = parse("/a");
        assert_eq!(casc.append("../../../b").expect("append").as_str(), "/b");
    }

    #[test]
    fn append_on_empty_name_fails() {
        assert!(KeyName::empty().append("x").is_err());
    }

    #[test]
    fn base_name_editing() {
        let n = parse("user/sw/app");
        assert_eq!(n.with_base("my.key").expect("with_base").as_str(), "user/sw/my\\.key");
        assert_eq!(
            n.appending_base("my.key").expect("appending_base").as_str(),
            "user/sw/app/my\\.key"
        );
        assert_eq!(n.appending_base("").expect("appending_base").as_str(), "user/sw/app/%");
        assert_eq!(n.appending_base(".").expect("appending_base").as_str(), "user/sw/app/\\.");

        // Root-only names have no base to replace.
        assert!(parse("user").with_base("x").is_err());
        assert!(parse("/").with_base("x").is_err());
        assert!(KeyName::empty().appending_base("x").is_err());
    }

    #[test]
    fn containment() {
        let root = parse("user");
        let tests = parse("user/tests");
        let deep = parse("user/tests/a");
        let other = parse("user/testsz");

        assert!(root.is_below(&tests));
        assert!(tests.is_below(&deep));
        assert!(root.is_below(&deep));
        assert!(!tests.is_below(&other));
        assert!(!tests.is_below(&tests));
        assert!(tests.is_below_or_same(&tests));

        assert!(tests.is_directly_below(&deep));
        assert!(!root.is_directly_below(&deep));

        let casc_root = parse("/");
        let casc = parse("/a");
        assert!(casc_root.is_below(&casc));
        assert!(casc_root.is_directly_below(&casc));
    }

    #[test]
    fn containment_ignores_empty_names() {
        let empty = KeyName::empty();
        let k = parse("user/a");
        assert!(!empty.is_below(&k));
        assert!(!k.is_below(&empty));
    }

    #[test]
    fn order_is_hierarchical() {
        let mut names = vec![
            parse("user/a"),
            parse("system/b"),
            parse("system/a"),
            parse("/x"),
            parse("system/a/sub"),
        ];
        names.sort();
        let order: Vec<_> = names.iter().map(KeyName::as_str).collect();
        assert_eq!(order, vec!["/x", "system/a", "system/a/sub", "system/b", "user/a"]);
    }

    #[test]
    fn parent_sorts_before_sibling_suffixes() {
        // `user/tests` descendants group before `user/tests-x` because the
        // segment terminator sorts below every printable byte.
        let a = parse("user/tests");
        let b = parse("user/tests/a");
        let c = parse("user/tests-x");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn resolved_in_concrete_namespaces() {
        let casc = parse("/app/x");
        let user = casc.resolved_in(Namespace::User).expect("resolves");
        assert_eq!(user.as_str(), "user/app/x");
        assert_eq!(user.unescaped(), b"user\0app\0x\0");

        let root = parse("/");
        assert_eq!(
            root.resolved_in(Namespace::System).expect("resolves").as_str(),
            "system"
        );

        assert!(parse("user/a").resolved_in(Namespace::User).is_none());
        assert!(casc.resolved_in(Namespace::Cascading).is_none());
    }

    #[test]
    fn is_valid_name_checks_namespace() {
        assert!(is_valid_name(""));
        assert!(is_valid_name("/app"));
        assert!(is_valid_name("user:alice/sw"));
        assert!(!is_valid_name("owner"));
        assert!(!is_valid_name("user/a\\b"));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let long = format!("user/{}", "x".repeat(MAX_NAME_SIZE));
        assert!(matches!(
            KeyName::parse(&long),
            Err(KeyTreeError::InvalidArgument { .. })
        ));
    }
}
