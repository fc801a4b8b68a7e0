//! Cryptomatte channel-name grammar.
//!
//! # Grammar
//! A cryptomatte data channel is named `<typename><NN>.<chan>` where `NN`
//! is exactly two decimal digits and `<chan>` is one of
//! `r|R|red|g|G|green|b|B|blue|a|A|alpha` (case-insensitive).  The legacy
//! preview channels drop the index: `<typename>.<chan>`.
//!
//! The typename may contain any character including `.` — parsing anchors
//! on the *last* dot and on the maximal trailing digit run before it, so
//! `beauty.CryptoAsset00.r` has typename `beauty.CryptoAsset`.
//!
//! # Ordering
//! [`ChannelRef`] orders lexicographically over (typename, index, type)
//! with red < green < blue < alpha.  After sorting, channels alternate
//! rank/coverage: within a quad, `.r`/`.g` is the first rank/coverage pair
//! and `.b`/`.a` the second.

use crate::error::{Error, Result};
use std::fmt;

// ── Channel type ─────────────────────────────────────────────────────────────

/// The color slot a channel occupies within its quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelType {
    Red,
    Green,
    Blue,
    Alpha,
}

impl ChannelType {
    /// Parse a `<chan>` token.  Accepts the one-letter and long forms,
    /// case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("r") || s.eq_ignore_ascii_case("red") {
            Some(ChannelType::Red)
        } else if s.eq_ignore_ascii_case("g") || s.eq_ignore_ascii_case("green") {
            Some(ChannelType::Green)
        } else if s.eq_ignore_ascii_case("b") || s.eq_ignore_ascii_case("blue") {
            Some(ChannelType::Blue)
        } else if s.eq_ignore_ascii_case("a") || s.eq_ignore_ascii_case("alpha") {
            Some(ChannelType::Alpha)
        } else {
            None
        }
    }

    /// Canonical one-letter lowercase form.
    pub fn letter(self) -> char {
        match self {
            ChannelType::Red   => 'r',
            ChannelType::Green => 'g',
            ChannelType::Blue  => 'b',
            ChannelType::Alpha => 'a',
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

// ── ChannelRef ───────────────────────────────────────────────────────────────

/// A parsed cryptomatte data channel name.
///
/// Field order matters: the derived `Ord` is the canonical channel ordering
/// (typename, then index, then type).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelRef {
    pub typename: String,
    pub index:    u8,
    pub ty:       ChannelType,
}

impl ChannelRef {
    /// Parse a full channel name such as `CryptoAsset00.r`.
    pub fn parse(name: &str) -> Result<Self> {
        let (prefix, chan) = split_at_last_dot(name)?;
        let ty = ChannelType::parse(chan).ok_or_else(|| malformed(name, "unrecognized channel suffix"))?;

        // The index is the maximal trailing digit run of the prefix and must
        // be exactly two digits; anything else is a different grammar.
        let digits = prefix
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            return Err(malformed(name, "missing two-digit index"));
        }
        if digits != 2 {
            return Err(malformed(name, "index must be exactly two decimal digits"));
        }

        let (typename, index_str) = prefix.split_at(prefix.len() - 2);
        if typename.is_empty() {
            return Err(malformed(name, "empty typename"));
        }
        // Cannot fail: both chars are ASCII digits.
        let index: u8 = index_str.parse().expect("two ASCII digits");

        Ok(ChannelRef {
            typename: typename.to_string(),
            index,
            ty,
        })
    }

    /// Render the canonical form: two-digit index, lowercase one-letter
    /// channel.  `ChannelRef::parse(r.render()) == r` for every parseable
    /// `r`.
    pub fn render(&self) -> String {
        format!("{}{:02}.{}", self.typename, self.index, self.ty.letter())
    }
}

// ── LegacyChannelRef ─────────────────────────────────────────────────────────

/// A parsed legacy (preview) channel name, `<typename>.<chan>` — same
/// grammar as [`ChannelRef`] minus the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LegacyChannelRef {
    pub typename: String,
    pub ty:       ChannelType,
}

impl LegacyChannelRef {
    pub fn parse(name: &str) -> Result<Self> {
        let (typename, chan) = split_at_last_dot(name)?;
        let ty = ChannelType::parse(chan).ok_or_else(|| malformed(name, "unrecognized channel suffix"))?;
        if typename.is_empty() {
            return Err(malformed(name, "empty typename"));
        }
        Ok(LegacyChannelRef {
            typename: typename.to_string(),
            ty,
        })
    }

    pub fn render(&self) -> String {
        format!("{}.{}", self.typename, self.ty.letter())
    }
}

// ── Sort and validate ────────────────────────────────────────────────────────

/// Sort a cryptomatte's channel names into canonical order and validate the
/// set's structure.
///
/// Accepted shapes: indices `00..K-1` with no gaps, every index carrying
/// exactly the four types r/g/b/a, except the last index which may carry
/// exactly r/g (one trailing rank/coverage pair instead of two).  Returns
/// the *original* name strings reordered — they are the keys into the
/// caller's channel map.
pub fn sort_and_validate(names: &[String]) -> Result<Vec<String>> {
    if names.is_empty() {
        return Err(Error::MalformedCryptomatte {
            reason: "cryptomatte has no channels".to_string(),
        });
    }

    let mut parsed: Vec<(ChannelRef, &String)> = names
        .iter()
        .map(|n| ChannelRef::parse(n).map(|r| (r, n)))
        .collect::<Result<_>>()?;
    parsed.sort_by(|a, b| a.0.cmp(&b.0));

    // One typename per cryptomatte.
    let typename = &parsed[0].0.typename;
    if let Some((other, _)) = parsed.iter().find(|(r, _)| &r.typename != typename) {
        return Err(Error::MalformedCryptomatte {
            reason: format!(
                "channels mix typenames '{}' and '{}'",
                typename, other.typename
            ),
        });
    }

    // Walk index groups: contiguous from zero, full quads except possibly a
    // trailing r/g pair.
    let last_index = parsed.last().expect("non-empty").0.index;
    let mut cursor = 0usize;
    for expected_index in 0..=last_index {
        let group: Vec<ChannelType> = parsed[cursor..]
            .iter()
            .take_while(|(r, _)| r.index == expected_index)
            .map(|(r, _)| r.ty)
            .collect();
        if group.is_empty() {
            return Err(Error::MalformedCryptomatte {
                reason: format!("channel index {expected_index:02} is missing — indices must be contiguous"),
            });
        }

        let full   = [ChannelType::Red, ChannelType::Green, ChannelType::Blue, ChannelType::Alpha];
        let partial = [ChannelType::Red, ChannelType::Green];
        let is_last = expected_index == last_index;
        if group != full && !(is_last && group == partial) {
            return Err(Error::MalformedCryptomatte {
                reason: format!(
                    "channel index {expected_index:02} holds [{}] — expected r/g/b/a{}",
                    group.iter().map(|t| t.letter()).collect::<String>(),
                    if is_last { " (or a trailing r/g pair)" } else { "" },
                ),
            });
        }
        cursor += group.len();
    }

    Ok(parsed.into_iter().map(|(_, n)| n.clone()).collect())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn split_at_last_dot(name: &str) -> Result<(&str, &str)> {
    let dot = name
        .rfind('.')
        .ok_or_else(|| malformed(name, "missing '.' separator"))?;
    let (prefix, chan) = (&name[..dot], &name[dot + 1..]);
    if chan.is_empty() {
        return Err(malformed(name, "empty channel suffix"));
    }
    Ok((prefix, chan))
}

fn malformed(name: &str, reason: &str) -> Error {
    Error::MalformedChannelName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_types() {
        for (s, want) in [
            ("r", ChannelType::Red), ("R", ChannelType::Red), ("red", ChannelType::Red),
            ("g", ChannelType::Green), ("G", ChannelType::Green), ("green", ChannelType::Green),
            ("b", ChannelType::Blue), ("B", ChannelType::Blue), ("blue", ChannelType::Blue),
            ("a", ChannelType::Alpha), ("A", ChannelType::Alpha), ("alpha", ChannelType::Alpha),
        ] {
            assert_eq!(ChannelType::parse(s), Some(want), "{s}");
        }
        assert_eq!(ChannelType::parse("foo"), None);
        assert_eq!(ChannelType::parse(""), None);
    }

    #[test]
    fn parse_valid_refs() {
        let r = ChannelRef::parse("MyCrypto00.R").unwrap();
        assert_eq!(r.typename, "MyCrypto");
        assert_eq!(r.index, 0);
        assert_eq!(r.ty, ChannelType::Red);
        assert_eq!(r.render(), "MyCrypto00.r");

        let r = ChannelRef::parse("SomeVal00.a").unwrap();
        assert_eq!(r.typename, "SomeVal");
        assert_eq!(r.ty, ChannelType::Alpha);

        let r = ChannelRef::parse("typename99.red").unwrap();
        assert_eq!(r.typename, "typename");
        assert_eq!(r.index, 99);

        // Typenames can contain dots — anchor on the last one.
        let r = ChannelRef::parse("beauty.CryptoAsset01.g").unwrap();
        assert_eq!(r.typename, "beauty.CryptoAsset");
        assert_eq!(r.index, 1);
    }

    #[test]
    fn parse_invalid_refs() {
        assert!(ChannelRef::parse("00.R").is_err());             // no typename
        assert!(ChannelRef::parse("CryptoAsset.R").is_err());    // no index
        assert!(ChannelRef::parse("CryptoAsset00.").is_err());   // no channel type
        assert!(ChannelRef::parse("CryptoAsset1.R").is_err());   // one-digit index
        assert!(ChannelRef::parse("CryptoAsset123.R").is_err()); // three-digit index
        assert!(ChannelRef::parse("CryptoAsset00.x").is_err());  // bad channel type
        assert!(ChannelRef::parse("CryptoAsset00r").is_err());   // no dot
    }

    #[test]
    fn render_parse_roundtrip() {
        for name in ["X00.r", "X00.a", "Crypto.Mat42.b", "n99.g"] {
            let r = ChannelRef::parse(name).unwrap();
            assert_eq!(ChannelRef::parse(&r.render()).unwrap(), r);
        }
    }

    #[test]
    fn legacy_parse() {
        let l = LegacyChannelRef::parse("CryptoAsset.r").unwrap();
        assert_eq!(l.typename, "CryptoAsset");
        assert_eq!(l.ty, ChannelType::Red);
        assert_eq!(l.render(), "CryptoAsset.r");

        // "CryptoAsset00.r" legacy-parses with typename "CryptoAsset00";
        // metadata filtering rejects it by typename mismatch, not here.
        let l = LegacyChannelRef::parse("CryptoAsset00.r").unwrap();
        assert_eq!(l.typename, "CryptoAsset00");

        assert!(LegacyChannelRef::parse(".r").is_err());
        assert!(LegacyChannelRef::parse("CryptoAsset.").is_err());
    }

    #[test]
    fn ordering() {
        let by = |s: &str| ChannelRef::parse(s).unwrap();
        assert!(by("CryptoAsset01.R") < by("CryptoAsset02.R"));
        assert!(by("CryptoAsset00.R") < by("CryptoAsset00.alpha"));
        assert!(by("CryptoAsset00.red") < by("CryptoAsset00.g"));
        // Index takes precedence over channel type.
        assert!(by("CryptoAsset00.alpha") < by("CryptoAsset01.R"));
        // Typename takes precedence over everything.
        assert!(by("Aaa99.a") < by("Bbb00.r"));
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sort_already_sorted() {
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g", "Cryptomatte00.b", "Cryptomatte00.a",
            "Cryptomatte01.r", "Cryptomatte01.g", "Cryptomatte01.b", "Cryptomatte01.a",
        ]);
        assert_eq!(sort_and_validate(&input).unwrap(), input);
    }

    #[test]
    fn sort_out_of_order() {
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.b", "Cryptomatte00.a", "Cryptomatte00.g",
            "Cryptomatte01.r", "Cryptomatte01.g", "Cryptomatte01.a", "Cryptomatte01.b",
        ]);
        let expected = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g", "Cryptomatte00.b", "Cryptomatte00.a",
            "Cryptomatte01.r", "Cryptomatte01.g", "Cryptomatte01.b", "Cryptomatte01.a",
        ]);
        assert_eq!(sort_and_validate(&input).unwrap(), expected);
    }

    #[test]
    fn sort_accepts_trailing_pair() {
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.b", "Cryptomatte00.a", "Cryptomatte00.g",
            "Cryptomatte01.r", "Cryptomatte01.g",
        ]);
        let expected = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g", "Cryptomatte00.b", "Cryptomatte00.a",
            "Cryptomatte01.r", "Cryptomatte01.g",
        ]);
        assert_eq!(sort_and_validate(&input).unwrap(), expected);
    }

    #[test]
    fn sort_rejects_incomplete_quad() {
        // Missing the trailing alpha.
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g", "Cryptomatte00.b", "Cryptomatte00.a",
            "Cryptomatte01.r", "Cryptomatte01.g", "Cryptomatte01.b",
        ]);
        assert!(sort_and_validate(&input).is_err());

        // Missing blue+alpha in a non-final quad.
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g",
            "Cryptomatte01.r", "Cryptomatte01.g", "Cryptomatte01.b", "Cryptomatte01.a",
        ]);
        assert!(sort_and_validate(&input).is_err());
    }

    #[test]
    fn sort_rejects_index_gap() {
        let input = strings(&[
            "Cryptomatte00.r", "Cryptomatte00.g", "Cryptomatte00.b", "Cryptomatte00.a",
            "Cryptomatte02.r", "Cryptomatte02.g", "Cryptomatte02.b", "Cryptomatte02.a",
        ]);
        assert!(sort_and_validate(&input).is_err());
    }

    #[test]
    fn sort_rejects_empty_and_duplicates() {
        assert!(sort_and_validate(&[]).is_err());
        let input = strings(&["X00.r", "X00.r", "X00.g", "X00.b"]);
        assert!(sort_and_validate(&input).is_err());
    }
}
